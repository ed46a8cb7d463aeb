//! Job definitions and the executable unit contract.
//!
//! A job is an executable unit plus metadata: a key (name and group), a cron
//! expression and a description. The scheduler never looks inside the unit.

use async_trait::async_trait;
use std::future::Future;
use std::sync::Arc;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use super::schedule::CronSchedule;
use super::types::JobKey;

/// Errors an executable unit can report.
#[derive(Debug, Error)]
pub enum JobError {
    /// The job body failed with a message.
    #[error("execution failed: {0}")]
    Failed(String),

    /// The job stopped because its cancellation signal fired.
    #[error("job was cancelled")]
    Cancelled,

    /// The job body panicked.
    #[error("job panicked: {0}")]
    Panicked(String),

    /// Generic error wrapper.
    #[error(transparent)]
    Other(#[from] Box<dyn std::error::Error + Send + Sync>),
}

/// The unit of work a job runs on every fire.
///
/// Implementations should watch `cancel` and return early once it fires;
/// the scheduler cancels it when shutting down.
///
/// # Example
///
/// ```
/// use async_trait::async_trait;
/// use cronjob::{CronJob, JobError};
/// use tokio_util::sync::CancellationToken;
///
/// struct Heartbeat;
///
/// #[async_trait]
/// impl CronJob for Heartbeat {
///     async fn execute(&self, _cancel: CancellationToken) -> Result<(), JobError> {
///         tracing::info!("still alive");
///         Ok(())
///     }
/// }
/// ```
#[async_trait]
pub trait CronJob: Send + Sync {
    /// Run the job once.
    async fn execute(&self, cancel: CancellationToken) -> Result<(), JobError>;
}

/// A [`CronJob`] backed by a closure.
pub struct FnJob<F> {
    f: F,
}

#[async_trait]
impl<F, Fut> CronJob for FnJob<F>
where
    F: Fn(CancellationToken) -> Fut + Send + Sync,
    Fut: Future<Output = Result<(), JobError>> + Send + 'static,
{
    async fn execute(&self, cancel: CancellationToken) -> Result<(), JobError> {
        (self.f)(cancel).await
    }
}

/// Wrap a closure returning a future as an executable unit.
pub fn job_fn<F, Fut>(f: F) -> Arc<dyn CronJob>
where
    F: Fn(CancellationToken) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), JobError>> + Send + 'static,
{
    Arc::new(FnJob { f })
}

/// A job as declared by the embedding application.
#[derive(Clone)]
pub struct JobDefinition {
    key: JobKey,
    cron_expression: String,
    description: String,
    unit: Arc<dyn CronJob>,
}

impl std::fmt::Debug for JobDefinition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobDefinition")
            .field("key", &self.key)
            .field("cron_expression", &self.cron_expression)
            .field("description", &self.description)
            .finish_non_exhaustive()
    }
}

impl JobDefinition {
    /// Create a definition. The expression is validated at registration.
    pub fn new(
        name: impl Into<String>,
        group: impl Into<String>,
        cron_expression: impl Into<String>,
        unit: Arc<dyn CronJob>,
    ) -> Self {
        Self {
            key: JobKey::new(name, group),
            cron_expression: cron_expression.into(),
            description: String::new(),
            unit,
        }
    }

    /// Set the free-text description.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Replace the cron expression.
    pub fn with_cron_expression(mut self, cron_expression: impl Into<String>) -> Self {
        self.cron_expression = cron_expression.into();
        self
    }

    /// Get the job key.
    pub fn key(&self) -> &JobKey {
        &self.key
    }

    /// Get the job name.
    pub fn name(&self) -> &str {
        self.key.name()
    }

    /// Get the job group.
    pub fn group(&self) -> &str {
        self.key.group()
    }

    /// Get the cron expression as declared.
    pub fn cron_expression(&self) -> &str {
        &self.cron_expression
    }

    /// Get the description.
    pub fn description(&self) -> &str {
        &self.description
    }

    /// Get the executable unit.
    pub fn unit(&self) -> &Arc<dyn CronJob> {
        &self.unit
    }
}

/// A definition paired with its parsed schedule.
///
/// Only the registry creates these, so every `ScheduledJob` carries an
/// expression that parsed and has at least one upcoming fire time.
#[derive(Debug, Clone)]
pub struct ScheduledJob {
    definition: Arc<JobDefinition>,
    schedule: Arc<CronSchedule>,
}

impl ScheduledJob {
    pub(crate) fn new(definition: JobDefinition, schedule: CronSchedule) -> Self {
        Self {
            definition: Arc::new(definition),
            schedule: Arc::new(schedule),
        }
    }

    /// Get the job key.
    pub fn key(&self) -> &JobKey {
        self.definition.key()
    }

    /// Get the definition.
    pub fn definition(&self) -> &JobDefinition {
        &self.definition
    }

    /// Get the parsed schedule.
    pub fn schedule(&self) -> &CronSchedule {
        &self.schedule
    }
}
