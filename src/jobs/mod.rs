//! Built-in jobs and common cron expressions.
//!
//! These are the jobs the `cronjob` binary schedules. Library users can
//! declare them next to their own or ignore them entirely.

use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::core::job::{CronJob, JobDefinition, JobError};
use crate::notes::{Note, NoteStore};

/// Every second.
pub const EVERY_SECOND: &str = "0/1 * * * * ? *";
/// Every fifth second, from second 0.
pub const EVERY_5TH_SECOND: &str = "0/5 * * * * ? *";
/// Every tenth second, from second 0.
pub const EVERY_10TH_SECOND: &str = "0/10 * * * * ? *";
/// Every minute at second 0.
pub const EVERY_MINUTE: &str = "0 * * * * ? *";
/// Every fifth minute, from minute 0.
pub const EVERY_5TH_MINUTE: &str = "0 0/5 * * * ? *";
/// Every day at 03:00:00.
pub const EVERY_DAY_AT_0300: &str = "0 0 3 * * ? *";

/// Group of jobs that keep the scheduler itself observable.
pub const CORE: &str = "Core";
/// Group of application jobs.
pub const USER: &str = "User";

/// Notes kept by [`DeleteNotesJob`].
pub const NOTES_TO_KEEP: usize = 2;

fn store_error(e: crate::notes::StoreError) -> JobError {
    JobError::Other(Box::new(e))
}

/// Logs that the scheduler is alive.
#[derive(Debug, Default, Clone, Copy)]
pub struct SchedulerAliveJob;

impl SchedulerAliveJob {
    pub const NAME: &'static str = "SchedulerAliveJob";

    /// Declare this job under the core group.
    pub fn definition(self) -> JobDefinition {
        JobDefinition::new(Self::NAME, CORE, EVERY_10TH_SECOND, Arc::new(self))
            .with_description("Checking that scheduler is alive.")
    }
}

#[async_trait]
impl CronJob for SchedulerAliveJob {
    async fn execute(&self, _cancel: CancellationToken) -> Result<(), JobError> {
        tracing::info!(utc_now = %Utc::now(), "Cron job scheduler is alive");
        Ok(())
    }
}

/// Logs every time it runs.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingJob;

impl LoggingJob {
    pub const NAME: &'static str = "LoggingJob";

    pub fn definition(self) -> JobDefinition {
        JobDefinition::new(Self::NAME, USER, EVERY_SECOND, Arc::new(self))
            .with_description("Logs each time it is executed.")
    }
}

#[async_trait]
impl CronJob for LoggingJob {
    async fn execute(&self, _cancel: CancellationToken) -> Result<(), JobError> {
        tracing::info!(job = Self::NAME, utc_now = %Utc::now(), "Job is executed");
        Ok(())
    }
}

/// Adds one note per run.
pub struct CreateNoteJob {
    store: Arc<dyn NoteStore>,
}

impl CreateNoteJob {
    pub const NAME: &'static str = "CreateNoteJob";

    pub fn new(store: Arc<dyn NoteStore>) -> Self {
        Self { store }
    }

    pub fn definition(self) -> JobDefinition {
        JobDefinition::new(Self::NAME, USER, EVERY_5TH_SECOND, Arc::new(self))
            .with_description("Creates one note each time it is executed.")
    }
}

#[async_trait]
impl CronJob for CreateNoteJob {
    async fn execute(&self, _cancel: CancellationToken) -> Result<(), JobError> {
        let now = Utc::now();
        let note = Note::created_at(format!("Created by '{}' at '{}'.", Self::NAME, now), now);
        self.store.add_note(note).await.map_err(store_error)
    }
}

/// Deletes every note except the [`NOTES_TO_KEEP`] newest.
pub struct DeleteNotesJob {
    store: Arc<dyn NoteStore>,
}

impl DeleteNotesJob {
    pub const NAME: &'static str = "DeleteNotesJob";

    pub fn new(store: Arc<dyn NoteStore>) -> Self {
        Self { store }
    }

    pub fn definition(self) -> JobDefinition {
        JobDefinition::new(Self::NAME, USER, EVERY_MINUTE, Arc::new(self))
            .with_description("Deletes all notes except the two latest notes.")
    }
}

#[async_trait]
impl CronJob for DeleteNotesJob {
    async fn execute(&self, cancel: CancellationToken) -> Result<(), JobError> {
        let stale = self
            .store
            .list_notes_descending(NOTES_TO_KEEP)
            .await
            .map_err(store_error)?;
        if cancel.is_cancelled() {
            return Err(JobError::Cancelled);
        }

        let ids: Vec<_> = stale.iter().map(|note| note.id).collect();
        let removed = self.store.remove_notes(&ids).await.map_err(store_error)?;
        tracing::debug!(removed, "Deleted old notes");
        Ok(())
    }
}

/// Every built-in job, in declaration order.
pub fn builtin_jobs(store: Arc<dyn NoteStore>) -> Vec<JobDefinition> {
    vec![
        SchedulerAliveJob.definition(),
        LoggingJob.definition(),
        CreateNoteJob::new(Arc::clone(&store)).definition(),
        DeleteNotesJob::new(store).definition(),
    ]
}
