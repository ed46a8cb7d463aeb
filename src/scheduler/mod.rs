//! Scheduler engine for cron jobs.
//!
//! This module provides the main scheduling loop that keeps the trigger
//! table, fires due jobs, skips overlapping runs, and drains on shutdown.

mod dispatcher;
mod engine;
mod handle;
mod reconcile;
mod table;
mod types;

pub use dispatcher::Dispatcher;
pub use engine::{
    DEFAULT_MAX_BATCH_SIZE, DEFAULT_SHUTDOWN_TIMEOUT, DEFAULT_START_DELAY, Scheduler,
};
pub use handle::SchedulerHandle;
pub use reconcile::{ReconcilePlan, reconcile};
pub use table::{Completion, DuePass, DueTrigger, TriggerEntry, TriggerState, TriggerTable};
pub use types::{SchedulerError, SchedulerState};
