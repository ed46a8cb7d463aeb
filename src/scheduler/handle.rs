//! Scheduler handle for controlling the scheduler.
//!
//! This module provides the `SchedulerHandle` type that allows external control
//! of a running scheduler: replacing the declared job set, inspecting the
//! trigger table, and shutting down.

use std::sync::Arc;

use tokio::sync::{RwLock, mpsc, oneshot};

use crate::core::job::JobDefinition;

use super::table::TriggerEntry;
use super::types::{SchedulerCommand, SchedulerError, SchedulerState};

/// Buffer size for the command channel between SchedulerHandle and Scheduler.
pub(crate) const COMMAND_CHANNEL_BUFFER: usize = 32;

/// Handle for controlling the scheduler.
#[derive(Clone)]
pub struct SchedulerHandle {
    pub(crate) command_tx: mpsc::Sender<SchedulerCommand>,
    pub(crate) state: Arc<RwLock<SchedulerState>>,
}

impl SchedulerHandle {
    /// Helper to send a command and wait for its reply.
    async fn send_command<T>(
        &self,
        build_command: impl FnOnce(oneshot::Sender<T>) -> SchedulerCommand,
        operation: &str,
    ) -> Result<T, SchedulerError> {
        let (response_tx, response_rx) = oneshot::channel();
        self.command_tx
            .send(build_command(response_tx))
            .await
            .map_err(|_| SchedulerError::AlreadyStopped)?;

        response_rx.await.map_err(|_| {
            SchedulerError::ChannelError(format!("failed to receive {} response", operation))
        })
    }

    /// Replace the declared job set.
    ///
    /// The batch is validated as a whole; on error the live schedule is left
    /// untouched. Otherwise jobs missing from `definitions` stop firing and
    /// every declared job is installed with a fresh fire time.
    pub async fn reschedule(&self, definitions: Vec<JobDefinition>) -> Result<(), SchedulerError> {
        self.send_command(
            |response| SchedulerCommand::Reschedule {
                definitions,
                response,
            },
            "reschedule",
        )
        .await?
    }

    /// Snapshot of the installed triggers, earliest fire time first.
    pub async fn triggers(&self) -> Result<Vec<TriggerEntry>, SchedulerError> {
        self.send_command(|response| SchedulerCommand::Triggers { response }, "triggers")
            .await
    }

    /// Shutdown the scheduler.
    ///
    /// Returns once running jobs have finished or been abandoned.
    pub async fn shutdown(&self) -> Result<(), SchedulerError> {
        self.send_command(
            |response| SchedulerCommand::Shutdown { response },
            "shutdown",
        )
        .await
    }

    /// Get the current scheduler state.
    pub async fn state(&self) -> SchedulerState {
        *self.state.read().await
    }

    /// Check if the scheduler is running.
    pub async fn is_running(&self) -> bool {
        *self.state.read().await == SchedulerState::Running
    }
}
