//! Testing utilities for users of the cronjob library.
//!
//! This module provides helpers for testing schedules and jobs:
//!
//! - [`RecordingHandler`]: An event handler that keeps every event it sees
//! - [`CountingJob`]: A job that counts its runs and concurrent executions
//! - [`FailingJob`]: A job that fails N times (or always) before succeeding
//! - [`SlowJob`]: A job that takes a fixed time, optionally ignoring cancellation
//! - [`PanickingJob`]: A job that panics on every run

use async_trait::async_trait;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use crate::core::job::{CronJob, JobError};
use crate::core::types::JobKey;
use crate::events::{Event, EventHandler};

/// An event handler that records received events.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use cronjob::events::{Event, EventBus};
/// use cronjob::testing::RecordingHandler;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let recorder = Arc::new(RecordingHandler::new());
/// let bus = EventBus::new();
/// bus.register(recorder.clone()).await;
///
/// bus.emit(Event::scheduler_started(2)).await;
/// assert_eq!(recorder.events().await.len(), 1);
/// # }
/// ```
#[derive(Default)]
pub struct RecordingHandler {
    events: Mutex<Vec<Event>>,
}

impl RecordingHandler {
    /// Create an empty recorder.
    pub fn new() -> Self {
        Self::default()
    }

    /// All events recorded so far, in order.
    pub async fn events(&self) -> Vec<Event> {
        self.events.lock().await.clone()
    }

    /// Events concerning `key`, in order.
    pub async fn events_for(&self, key: &JobKey) -> Vec<Event> {
        self.events
            .lock()
            .await
            .iter()
            .filter(|event| event.key() == Some(key))
            .cloned()
            .collect()
    }

    /// Forget every recorded event.
    pub async fn clear(&self) {
        self.events.lock().await.clear();
    }
}

#[async_trait]
impl EventHandler for RecordingHandler {
    async fn handle(&self, event: &Event) {
        self.events.lock().await.push(event.clone());
    }
}

/// Tracks how many runs are in flight and the highest count seen.
#[derive(Debug, Default)]
struct ConcurrencyGauge {
    current: AtomicUsize,
    max: AtomicUsize,
}

impl ConcurrencyGauge {
    fn enter(&self) {
        let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.max.fetch_max(now, Ordering::SeqCst);
    }

    fn exit(&self) {
        self.current.fetch_sub(1, Ordering::SeqCst);
    }

    fn max(&self) -> usize {
        self.max.load(Ordering::SeqCst)
    }
}

/// A job that succeeds immediately and counts its runs.
#[derive(Debug, Default)]
pub struct CountingJob {
    runs: AtomicU32,
    gauge: ConcurrencyGauge,
}

impl CountingJob {
    /// Create a job with a zero count.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of completed runs.
    pub fn count(&self) -> u32 {
        self.runs.load(Ordering::SeqCst)
    }

    /// Highest number of simultaneous runs observed.
    pub fn max_concurrency(&self) -> usize {
        self.gauge.max()
    }
}

#[async_trait]
impl CronJob for CountingJob {
    async fn execute(&self, _cancel: CancellationToken) -> Result<(), JobError> {
        self.gauge.enter();
        tokio::task::yield_now().await;
        self.runs.fetch_add(1, Ordering::SeqCst);
        self.gauge.exit();
        Ok(())
    }
}

/// A job that fails a configurable number of times, then succeeds.
#[derive(Debug)]
pub struct FailingJob {
    failures: Option<u32>,
    error_message: String,
    attempts: AtomicU32,
}

impl FailingJob {
    /// Create a job that fails on every run.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            failures: None,
            error_message: message.into(),
            attempts: AtomicU32::new(0),
        }
    }

    /// Create a job that fails `times` times, then succeeds.
    pub fn times(times: u32, message: impl Into<String>) -> Self {
        Self {
            failures: Some(times),
            ..Self::new(message)
        }
    }

    /// Number of runs so far.
    pub fn attempts(&self) -> u32 {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CronJob for FailingJob {
    async fn execute(&self, _cancel: CancellationToken) -> Result<(), JobError> {
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
        match self.failures {
            Some(failures) if attempt > failures => Ok(()),
            _ => Err(JobError::Failed(self.error_message.clone())),
        }
    }
}

/// A job that takes a fixed amount of time.
///
/// By default it returns [`JobError::Cancelled`] as soon as it is cancelled;
/// [`SlowJob::ignoring_cancellation`] makes it run to the end regardless.
#[derive(Debug)]
pub struct SlowJob {
    duration: Duration,
    honors_cancellation: bool,
    runs: AtomicU32,
    gauge: ConcurrencyGauge,
}

impl SlowJob {
    /// Create a job that runs for `duration`.
    pub fn new(duration: Duration) -> Self {
        Self {
            duration,
            honors_cancellation: true,
            runs: AtomicU32::new(0),
            gauge: ConcurrencyGauge::default(),
        }
    }

    /// Keep running after cancellation.
    pub fn ignoring_cancellation(mut self) -> Self {
        self.honors_cancellation = false;
        self
    }

    /// Number of runs started.
    pub fn runs(&self) -> u32 {
        self.runs.load(Ordering::SeqCst)
    }

    /// Highest number of simultaneous runs observed.
    pub fn max_concurrency(&self) -> usize {
        self.gauge.max()
    }
}

#[async_trait]
impl CronJob for SlowJob {
    async fn execute(&self, cancel: CancellationToken) -> Result<(), JobError> {
        self.runs.fetch_add(1, Ordering::SeqCst);
        self.gauge.enter();

        let result = if self.honors_cancellation {
            tokio::select! {
                _ = tokio::time::sleep(self.duration) => Ok(()),
                _ = cancel.cancelled() => Err(JobError::Cancelled),
            }
        } else {
            tokio::time::sleep(self.duration).await;
            Ok(())
        };

        self.gauge.exit();
        result
    }
}

/// A job that panics on every run.
#[derive(Debug)]
pub struct PanickingJob {
    message: String,
}

impl PanickingJob {
    /// Create a job panicking with `message`.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

#[async_trait]
impl CronJob for PanickingJob {
    async fn execute(&self, _cancel: CancellationToken) -> Result<(), JobError> {
        panic!("{}", self.message);
    }
}
