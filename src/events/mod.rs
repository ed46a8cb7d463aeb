//! Lifecycle events and event handling.
//!
//! The scheduler reports what it does as [`Event`]s on an [`EventBus`].
//! Handlers decide what to do with them: [`LoggingHandler`] writes them to
//! `tracing`, tests record them, a metrics exporter could count them.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

use crate::core::types::{JobKey, RunId};

/// Lifecycle events emitted by the scheduler.
#[derive(Debug, Clone)]
pub enum Event {
    /// The scheduler finished starting and is dispatching jobs.
    SchedulerStarted { jobs: usize, timestamp: Instant },

    /// A declared job set was reconciled against the trigger table.
    ScheduleReconciled {
        removed: usize,
        installed: usize,
        timestamp: Instant,
    },

    /// A job reached its fire time and was dispatched.
    JobFired {
        key: JobKey,
        run_id: RunId,
        scheduled_for: DateTime<Utc>,
        timestamp: Instant,
    },

    /// A job run completed successfully.
    JobSucceeded {
        key: JobKey,
        run_id: RunId,
        duration: Duration,
        timestamp: Instant,
    },

    /// A job run failed, panicked or was cancelled.
    JobFailed {
        key: JobKey,
        run_id: RunId,
        error: String,
        duration: Duration,
        timestamp: Instant,
    },

    /// A fire time arrived while the previous run was still active.
    JobSkipped {
        key: JobKey,
        scheduled_for: DateTime<Utc>,
        timestamp: Instant,
    },

    /// A job was removed because its next fire time could not be computed.
    JobDropped {
        key: JobKey,
        error: String,
        timestamp: Instant,
    },

    /// Runs still active when the shutdown grace period ran out.
    JobsAbandoned {
        keys: Vec<JobKey>,
        timestamp: Instant,
    },

    /// The scheduler stopped.
    SchedulerStopped { timestamp: Instant },
}

impl Event {
    /// Get the timestamp of the event.
    pub fn timestamp(&self) -> Instant {
        match self {
            Event::SchedulerStarted { timestamp, .. } => *timestamp,
            Event::ScheduleReconciled { timestamp, .. } => *timestamp,
            Event::JobFired { timestamp, .. } => *timestamp,
            Event::JobSucceeded { timestamp, .. } => *timestamp,
            Event::JobFailed { timestamp, .. } => *timestamp,
            Event::JobSkipped { timestamp, .. } => *timestamp,
            Event::JobDropped { timestamp, .. } => *timestamp,
            Event::JobsAbandoned { timestamp, .. } => *timestamp,
            Event::SchedulerStopped { timestamp } => *timestamp,
        }
    }

    /// The job this event concerns, if any.
    pub fn key(&self) -> Option<&JobKey> {
        match self {
            Event::JobFired { key, .. }
            | Event::JobSucceeded { key, .. }
            | Event::JobFailed { key, .. }
            | Event::JobSkipped { key, .. }
            | Event::JobDropped { key, .. } => Some(key),
            _ => None,
        }
    }

    /// Create a SchedulerStarted event.
    pub fn scheduler_started(jobs: usize) -> Self {
        Event::SchedulerStarted {
            jobs,
            timestamp: Instant::now(),
        }
    }

    /// Create a ScheduleReconciled event.
    pub fn schedule_reconciled(removed: usize, installed: usize) -> Self {
        Event::ScheduleReconciled {
            removed,
            installed,
            timestamp: Instant::now(),
        }
    }

    /// Create a JobFired event.
    pub fn job_fired(key: JobKey, run_id: RunId, scheduled_for: DateTime<Utc>) -> Self {
        Event::JobFired {
            key,
            run_id,
            scheduled_for,
            timestamp: Instant::now(),
        }
    }

    /// Create a JobSucceeded event.
    pub fn job_succeeded(key: JobKey, run_id: RunId, duration: Duration) -> Self {
        Event::JobSucceeded {
            key,
            run_id,
            duration,
            timestamp: Instant::now(),
        }
    }

    /// Create a JobFailed event.
    pub fn job_failed(key: JobKey, run_id: RunId, error: String, duration: Duration) -> Self {
        Event::JobFailed {
            key,
            run_id,
            error,
            duration,
            timestamp: Instant::now(),
        }
    }

    /// Create a JobSkipped event.
    pub fn job_skipped(key: JobKey, scheduled_for: DateTime<Utc>) -> Self {
        Event::JobSkipped {
            key,
            scheduled_for,
            timestamp: Instant::now(),
        }
    }

    /// Create a JobDropped event.
    pub fn job_dropped(key: JobKey, error: String) -> Self {
        Event::JobDropped {
            key,
            error,
            timestamp: Instant::now(),
        }
    }

    /// Create a JobsAbandoned event.
    pub fn jobs_abandoned(keys: Vec<JobKey>) -> Self {
        Event::JobsAbandoned {
            keys,
            timestamp: Instant::now(),
        }
    }

    /// Create a SchedulerStopped event.
    pub fn scheduler_stopped() -> Self {
        Event::SchedulerStopped {
            timestamp: Instant::now(),
        }
    }
}

/// Handler for receiving lifecycle events.
#[async_trait]
pub trait EventHandler: Send + Sync {
    /// Handle an event.
    async fn handle(&self, event: &Event);
}

/// Event bus for distributing events to registered handlers.
pub struct EventBus {
    handlers: RwLock<Vec<Arc<dyn EventHandler>>>,
}

impl EventBus {
    /// Create a new event bus with no handlers.
    pub fn new() -> Self {
        Self {
            handlers: RwLock::new(Vec::new()),
        }
    }

    /// Register an event handler.
    pub async fn register(&self, handler: Arc<dyn EventHandler>) {
        let mut handlers = self.handlers.write().await;
        handlers.push(handler);
    }

    /// Emit an event to all registered handlers.
    pub async fn emit(&self, event: Event) {
        let handlers = self.handlers.read().await;
        for handler in handlers.iter() {
            handler.handle(&event).await;
        }
    }

    /// Get the number of registered handlers.
    pub async fn handler_count(&self) -> usize {
        self.handlers.read().await.len()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

/// Writes every event to `tracing` with structured fields.
pub struct LoggingHandler;

#[async_trait]
impl EventHandler for LoggingHandler {
    async fn handle(&self, event: &Event) {
        match event {
            Event::SchedulerStarted { jobs, .. } => {
                tracing::info!(jobs = *jobs, "Scheduler started");
            }
            Event::ScheduleReconciled {
                removed, installed, ..
            } => {
                tracing::info!(
                    removed = *removed,
                    installed = *installed,
                    "Schedule reconciled"
                );
            }
            Event::JobFired {
                key,
                run_id,
                scheduled_for,
                ..
            } => {
                tracing::info!(job = %key, run_id = %run_id, scheduled_for = %scheduled_for, "Job fired");
            }
            Event::JobSucceeded {
                key,
                run_id,
                duration,
                ..
            } => {
                tracing::info!(job = %key, run_id = %run_id, duration = ?duration, "Job succeeded");
            }
            Event::JobFailed {
                key,
                run_id,
                error,
                duration,
                ..
            } => {
                tracing::error!(job = %key, run_id = %run_id, duration = ?duration, error = %error, "Job failed");
            }
            Event::JobSkipped {
                key, scheduled_for, ..
            } => {
                tracing::warn!(job = %key, scheduled_for = %scheduled_for, "Job skipped, previous run still active");
            }
            Event::JobDropped { key, error, .. } => {
                tracing::error!(job = %key, error = %error, "Job dropped from schedule");
            }
            Event::JobsAbandoned { keys, .. } => {
                let keys: Vec<String> = keys.iter().map(ToString::to_string).collect();
                tracing::warn!(jobs = ?keys, "Abandoned running jobs at shutdown");
            }
            Event::SchedulerStopped { .. } => {
                tracing::info!("Scheduler stopped");
            }
        }
    }
}
