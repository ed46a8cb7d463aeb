//! Scheduler type definitions.
//!
//! This module contains error types, state enums, and command types for the scheduler.

use thiserror::Error;
use tokio::sync::oneshot;

use crate::core::job::JobDefinition;
use crate::core::registry::RegistryError;

use super::table::TriggerEntry;

/// Errors that can occur in the scheduler.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// A declared job set was rejected.
    #[error("registry error: {0}")]
    Registry(#[from] RegistryError),

    /// Channel error.
    #[error("channel error: {0}")]
    ChannelError(String),

    /// The scheduler loop has already stopped.
    #[error("scheduler is not running")]
    AlreadyStopped,
}

/// State of the scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    /// Scheduler is stopped.
    Stopped,
    /// Scheduler is installing the declared jobs.
    Starting,
    /// Scheduler is dispatching jobs.
    Running,
    /// Scheduler is waiting for running jobs before stopping.
    Draining,
}

/// Commands that can be sent to the scheduler.
pub(crate) enum SchedulerCommand {
    /// Replace the declared job set.
    Reschedule {
        definitions: Vec<JobDefinition>,
        response: oneshot::Sender<Result<(), SchedulerError>>,
    },
    /// Snapshot the trigger table.
    Triggers {
        response: oneshot::Sender<Vec<TriggerEntry>>,
    },
    /// Shutdown the scheduler.
    Shutdown { response: oneshot::Sender<()> },
}
