//! Runs due jobs and returns them to the trigger table.

use std::any::Any;
use std::sync::Arc;
use tokio::sync::{Mutex, Notify};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::AbortOnDropHandle;

use crate::core::clock::Clock;
use crate::core::job::JobError;
use crate::events::{Event, EventBus};

use super::table::{Completion, DueTrigger, TriggerTable};

/// Executes dispatched triggers, each on its own task.
///
/// A run always ends by handing the trigger back to the table, whatever the
/// unit did: returned an error, panicked or ignored cancellation.
#[derive(Clone)]
pub struct Dispatcher {
    table: Arc<Mutex<TriggerTable>>,
    event_bus: Arc<EventBus>,
    clock: Arc<dyn Clock>,
    wake: Arc<Notify>,
    shutdown: CancellationToken,
}

impl Dispatcher {
    /// Create a dispatcher writing completions into `table`.
    ///
    /// `wake` is notified after every completion; `shutdown` is the parent of
    /// every run's cancellation token.
    pub fn new(
        table: Arc<Mutex<TriggerTable>>,
        event_bus: Arc<EventBus>,
        clock: Arc<dyn Clock>,
        wake: Arc<Notify>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            table,
            event_bus,
            clock,
            wake,
            shutdown,
        }
    }

    /// Start a run of `due` in the background.
    ///
    /// The trigger must already be marked running in the table.
    pub fn dispatch(&self, due: DueTrigger) -> JoinHandle<()> {
        let dispatcher = self.clone();
        tokio::spawn(async move { dispatcher.run(due).await })
    }

    async fn run(&self, due: DueTrigger) {
        let key = due.job.key().clone();
        let run_id = due.run_id;

        self.event_bus
            .emit(Event::job_fired(key.clone(), run_id, due.scheduled_for))
            .await;

        let start = tokio::time::Instant::now();
        let outcome = self.execute(&due).await;
        let duration = start.elapsed();

        let completion = {
            let mut table = self.table.lock().await;
            table.complete(&key, run_id, self.clock.now())
        };
        self.wake.notify_one();

        match outcome {
            Ok(()) => {
                self.event_bus
                    .emit(Event::job_succeeded(key.clone(), run_id, duration))
                    .await;
            }
            Err(e) => {
                self.event_bus
                    .emit(Event::job_failed(key.clone(), run_id, e.to_string(), duration))
                    .await;
            }
        }

        match completion {
            Completion::Rescheduled(next) => {
                tracing::debug!(job = %key, next_fire_at = %next, "Job rescheduled");
            }
            Completion::Retired => {
                tracing::debug!(job = %key, "Removed job finished its last run");
            }
            Completion::Dropped(e) => {
                tracing::error!(job = %key, error = %e, "No further fire time, dropping job");
                self.event_bus
                    .emit(Event::job_dropped(key, e.to_string()))
                    .await;
            }
            Completion::Stale => {
                tracing::debug!(job = %key, run_id = %run_id, "Run no longer tracked by the trigger table");
            }
        }
    }

    /// Run the unit on its own task so a panic surfaces as a `JoinError`.
    async fn execute(&self, due: &DueTrigger) -> Result<(), JobError> {
        let unit = Arc::clone(due.job.definition().unit());
        let cancel = self.shutdown.child_token();
        let task = AbortOnDropHandle::new(tokio::spawn(async move { unit.execute(cancel).await }));

        match task.await {
            Ok(result) => result,
            Err(e) if e.is_panic() => Err(JobError::Panicked(panic_message(e.into_panic()))),
            Err(e) => Err(JobError::Failed(e.to_string())),
        }
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
