//! Scheduler engine implementation.
//!
//! The scheduler is responsible for:
//! - Installing the declared job set into the trigger table
//! - Sleeping until the earliest fire time and dispatching due jobs
//! - Skipping fire times of jobs whose previous run is still active
//! - Replacing the declared job set while running
//! - Draining running jobs on shutdown
//! - Event emission

use chrono_tz::Tz;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, Notify, RwLock, mpsc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::core::clock::{Clock, SystemClock};
use crate::core::job::{JobDefinition, ScheduledJob};
use crate::core::registry::{JobRegistry, RegistryError};
use crate::core::types::{JobKey, RunId};
use crate::events::{Event, EventBus};

use super::dispatcher::Dispatcher;
use super::handle::{COMMAND_CHANNEL_BUFFER, SchedulerHandle};
use super::reconcile::reconcile;
use super::table::TriggerTable;
use super::types::{SchedulerCommand, SchedulerError, SchedulerState};

/// Default grace period for running jobs at shutdown.
pub const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

/// Default number of due jobs dispatched per pass.
pub const DEFAULT_MAX_BATCH_SIZE: usize = 5;

/// Default delay between `start` and installing the declared jobs.
pub const DEFAULT_START_DELAY: Duration = Duration::from_millis(1000);

/// Interval at which running jobs are polled while draining.
const DRAIN_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Main scheduler for cron jobs.
pub struct Scheduler {
    /// Declared jobs, installed when the scheduler starts.
    registry: JobRegistry,
    /// Event bus for emitting events.
    event_bus: Arc<EventBus>,
    /// Source of wall-clock time.
    clock: Arc<dyn Clock>,
    /// Trigger table shared with the dispatcher.
    table: Arc<Mutex<TriggerTable>>,
    /// Notified whenever a run completes.
    wake: Arc<Notify>,
    /// Parent of every run's cancellation token.
    shutdown_token: CancellationToken,
    /// Currently running job handles mapped to (JobKey, Handle).
    running_jobs: HashMap<RunId, (JobKey, JoinHandle<()>)>,
    /// Graceful shutdown timeout (default: 30 seconds).
    shutdown_timeout: Duration,
    /// Maximum due jobs dispatched in one pass.
    max_batch_size: usize,
    /// Delay before the declared jobs are installed.
    start_delay: Duration,
}

impl Scheduler {
    /// Create a new scheduler with no jobs.
    pub fn new() -> Self {
        Self {
            registry: JobRegistry::new(),
            event_bus: Arc::new(EventBus::new()),
            clock: Arc::new(SystemClock),
            table: Arc::new(Mutex::new(TriggerTable::new())),
            wake: Arc::new(Notify::new()),
            shutdown_token: CancellationToken::new(),
            running_jobs: HashMap::new(),
            shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT,
            max_batch_size: DEFAULT_MAX_BATCH_SIZE,
            start_delay: DEFAULT_START_DELAY,
        }
    }

    /// Set the event bus.
    pub fn with_event_bus(mut self, event_bus: EventBus) -> Self {
        self.event_bus = Arc::new(event_bus);
        self
    }

    /// Set the clock.
    pub fn with_clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    /// Set the graceful shutdown timeout.
    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    /// Set the maximum number of due jobs dispatched per pass.
    pub fn with_max_batch_size(mut self, max: usize) -> Self {
        self.max_batch_size = max.max(1);
        self
    }

    /// Set the delay between `start` and installing the declared jobs.
    pub fn with_start_delay(mut self, delay: Duration) -> Self {
        self.start_delay = delay;
        self
    }

    /// Replace the declared jobs with an already validated registry.
    pub fn with_registry(mut self, registry: JobRegistry) -> Self {
        self.registry = registry;
        self
    }

    /// Declare a batch of jobs.
    ///
    /// The batch is rejected as a whole if any key is duplicated, any
    /// expression is invalid, or any expression can never fire.
    pub fn register(&mut self, definitions: Vec<JobDefinition>) -> Result<(), RegistryError> {
        let now = self.clock.now();
        self.registry.register_at(definitions, now)
    }

    /// Get the declared jobs.
    pub fn registry(&self) -> &JobRegistry {
        &self.registry
    }

    /// Get the event bus.
    pub fn event_bus(&self) -> &EventBus {
        &self.event_bus
    }

    /// Start the scheduler and return a handle for controlling it.
    pub fn start(self) -> (SchedulerHandle, JoinHandle<()>) {
        let (command_tx, command_rx) = mpsc::channel(COMMAND_CHANNEL_BUFFER);
        let state = Arc::new(RwLock::new(SchedulerState::Starting));

        let handle = SchedulerHandle {
            command_tx,
            state: Arc::clone(&state),
        };

        let scheduler_task = tokio::spawn(async move {
            self.run(command_rx, state).await;
        });

        (handle, scheduler_task)
    }

    /// Main scheduler loop.
    async fn run(
        mut self,
        mut command_rx: mpsc::Receiver<SchedulerCommand>,
        state: Arc<RwLock<SchedulerState>>,
    ) {
        if !self.start_delay.is_zero() {
            tokio::time::sleep(self.start_delay).await;
        }

        let timezone = self.registry.timezone();
        let declared = std::mem::take(&mut self.registry).into_jobs();
        self.install(declared).await;

        *state.write().await = SchedulerState::Running;
        let jobs = self.table.lock().await.len();
        tracing::info!(jobs, "Scheduler running");
        self.event_bus.emit(Event::scheduler_started(jobs)).await;

        let dispatcher = Dispatcher::new(
            Arc::clone(&self.table),
            Arc::clone(&self.event_bus),
            Arc::clone(&self.clock),
            Arc::clone(&self.wake),
            self.shutdown_token.clone(),
        );

        loop {
            let sleep_for = self.time_until_next_fire().await;

            tokio::select! {
                _ = tokio::time::sleep(sleep_for.unwrap_or_default()), if sleep_for.is_some() => {
                    self.fire_due(&dispatcher).await;
                }

                _ = self.wake.notified() => {
                    // A run completed; its next fire time may be the earliest now.
                    self.cleanup_finished_jobs();
                }

                command = command_rx.recv() => {
                    match command {
                        Some(SchedulerCommand::Reschedule { definitions, response }) => {
                            let result = self.reschedule(definitions, timezone).await;
                            let _ = response.send(result);
                        }
                        Some(SchedulerCommand::Triggers { response }) => {
                            let snapshot = self.table.lock().await.snapshot();
                            let _ = response.send(snapshot);
                        }
                        Some(SchedulerCommand::Shutdown { response }) => {
                            self.drain(&state).await;
                            let _ = response.send(());
                            break;
                        }
                        None => {
                            tracing::info!("All scheduler handles dropped, shutting down");
                            self.drain(&state).await;
                            break;
                        }
                    }
                }
            }
        }
    }

    /// Time until the earliest pending fire, or `None` when nothing is pending.
    async fn time_until_next_fire(&self) -> Option<Duration> {
        let next = self.table.lock().await.next_fire_at()?;
        Some(
            (next - self.clock.now())
                .to_std()
                .unwrap_or(Duration::ZERO),
        )
    }

    /// Dispatch every idle trigger that is due and report skipped fires.
    async fn fire_due(&mut self, dispatcher: &Dispatcher) {
        let now = self.clock.now();
        let pass = self.table.lock().await.take_due(now, self.max_batch_size);

        for (key, scheduled_for) in pass.skipped {
            tracing::debug!(job = %key, scheduled_for = %scheduled_for, "Previous run still active, skipping fire");
            self.event_bus
                .emit(Event::job_skipped(key, scheduled_for))
                .await;
        }

        for (key, error) in pass.dropped {
            tracing::error!(job = %key, error = %error, "No further fire time, dropping job");
            self.event_bus
                .emit(Event::job_dropped(key, error.to_string()))
                .await;
        }

        for due in pass.dispatched {
            let key = due.job.key().clone();
            let run_id = due.run_id;
            tracing::debug!(job = %key, run_id = %run_id, "Dispatching job");
            let handle = dispatcher.dispatch(due);
            self.running_jobs.insert(run_id, (key, handle));
        }

        self.cleanup_finished_jobs();
    }

    /// Validate a new declared set and reconcile it against the table.
    async fn reschedule(
        &self,
        definitions: Vec<JobDefinition>,
        timezone: Tz,
    ) -> Result<(), SchedulerError> {
        let mut registry = JobRegistry::new().with_timezone(timezone);
        registry.register_at(definitions, self.clock.now())?;
        self.install(registry.into_jobs()).await;
        Ok(())
    }

    /// Reconcile `declared` against the table: remove stale keys, then
    /// install every declared job.
    async fn install(&self, declared: Vec<ScheduledJob>) {
        let now = self.clock.now();
        let mut dropped = Vec::new();

        let (removed, installed) = {
            let mut table = self.table.lock().await;
            let plan = reconcile(declared, table.keys());

            for key in &plan.to_remove {
                table.remove(key);
            }

            let mut installed = 0;
            for job in plan.to_install {
                let key = job.key().clone();
                match table.install(job, now) {
                    Ok(next) => {
                        tracing::debug!(job = %key, next_fire_at = %next, "Installed trigger");
                        installed += 1;
                    }
                    Err(e) => dropped.push((key, e)),
                }
            }
            (plan.to_remove.len(), installed)
        };

        for (key, error) in dropped {
            tracing::error!(job = %key, error = %error, "Cannot schedule job, dropping it");
            self.event_bus
                .emit(Event::job_dropped(key, error.to_string()))
                .await;
        }

        tracing::info!(removed, installed, "Reconciled declared jobs");
        self.event_bus
            .emit(Event::schedule_reconciled(removed, installed))
            .await;
    }

    /// Clean up finished job handles.
    fn cleanup_finished_jobs(&mut self) {
        self.running_jobs
            .retain(|_, (_, handle)| !handle.is_finished());
    }

    /// Stop dispatching, cancel running jobs and wait for them, then stop.
    async fn drain(&mut self, state: &RwLock<SchedulerState>) {
        *state.write().await = SchedulerState::Draining;
        self.shutdown_token.cancel();

        let abandoned = self.await_running_jobs().await;
        if !abandoned.is_empty() {
            let mut keys = Vec::with_capacity(abandoned.len());
            for (key, handle) in abandoned {
                handle.abort();
                keys.push(key);
            }
            keys.sort();
            self.event_bus.emit(Event::jobs_abandoned(keys)).await;
        }

        self.table.lock().await.clear();
        *state.write().await = SchedulerState::Stopped;
        tracing::info!("Scheduler stopped");
        self.event_bus.emit(Event::scheduler_stopped()).await;
    }

    /// Wait for all running jobs to complete with a timeout.
    ///
    /// Returns the jobs still running when the timeout expired.
    async fn await_running_jobs(&mut self) -> Vec<(JobKey, JoinHandle<()>)> {
        self.cleanup_finished_jobs();
        let running_count = self.running_jobs.len();

        if running_count == 0 {
            tracing::info!("No running jobs to wait for during shutdown");
            return Vec::new();
        }

        tracing::info!(
            "Graceful shutdown: waiting for {} running job(s) to complete (timeout: {:?})",
            running_count,
            self.shutdown_timeout
        );

        let start = tokio::time::Instant::now();
        let deadline = start + self.shutdown_timeout;

        loop {
            self.cleanup_finished_jobs();
            let remaining = self.running_jobs.len();

            if remaining == 0 {
                let elapsed = start.elapsed();
                tracing::info!("All running jobs completed gracefully in {:?}", elapsed);
                return Vec::new();
            }

            if tokio::time::Instant::now() >= deadline {
                tracing::warn!(
                    "Graceful shutdown timeout ({:?}) exceeded with {} job(s) still running",
                    self.shutdown_timeout,
                    remaining
                );
                return self.running_jobs.drain().map(|(_, entry)| entry).collect();
            }

            tokio::time::sleep(DRAIN_POLL_INTERVAL).await;
        }
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}
