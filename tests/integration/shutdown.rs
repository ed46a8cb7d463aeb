//! Graceful shutdown integration tests.
//!
//! Tests that verify the scheduler cancels running jobs on shutdown, waits
//! for them within the grace period, and abandons the ones that ignore it.

use cronjob::testing::{CountingJob, SlowJob};
use cronjob::{Event, JobDefinition, JobKey, SchedulerError, SchedulerState};
use std::sync::Arc;
use std::time::Duration;

use crate::common::{count, monday_noon, paused_scheduler};

/// Test: Shutdown cancels a cooperative job and waits for it.
#[tokio::test(start_paused = true)]
async fn test_shutdown_cancels_running_job() {
    let (mut scheduler, recorder) = paused_scheduler(monday_noon()).await;
    let slow = Arc::new(SlowJob::new(Duration::from_secs(60)));
    scheduler
        .register(vec![JobDefinition::new(
            "Export",
            "User",
            "0/1 * * * * ? *",
            slow.clone(),
        )])
        .unwrap();

    let (handle, task) = scheduler.start();
    tokio::time::sleep(Duration::from_millis(1_500)).await;
    assert_eq!(slow.runs(), 1);

    let started = tokio::time::Instant::now();
    handle.shutdown().await.unwrap();
    task.await.unwrap();

    // Cancellation is observed on the next drain poll.
    assert!(started.elapsed() < Duration::from_secs(1));
    assert_eq!(handle.state().await, SchedulerState::Stopped);

    let events = recorder.events().await;
    assert!(events.iter().any(|e| matches!(
        e,
        Event::JobFailed { error, .. } if error == "job was cancelled"
    )));
    assert_eq!(count(&events, |e| matches!(e, Event::JobsAbandoned { .. })), 0);
    assert!(matches!(events.last(), Some(Event::SchedulerStopped { .. })));
}

/// Test: Jobs still running after the grace period are abandoned together.
#[tokio::test(start_paused = true)]
async fn test_uncooperative_jobs_are_abandoned() {
    let (scheduler, recorder) = paused_scheduler(monday_noon()).await;
    let mut scheduler = scheduler.with_shutdown_timeout(Duration::from_secs(3));
    scheduler
        .register(vec![
            JobDefinition::new(
                "Zeta",
                "Batch",
                "0/1 * * * * ? *",
                Arc::new(SlowJob::new(Duration::from_secs(600)).ignoring_cancellation()),
            ),
            JobDefinition::new(
                "Alpha",
                "Batch",
                "0/1 * * * * ? *",
                Arc::new(SlowJob::new(Duration::from_secs(600)).ignoring_cancellation()),
            ),
        ])
        .unwrap();

    let (handle, task) = scheduler.start();
    tokio::time::sleep(Duration::from_millis(1_500)).await;

    let started = tokio::time::Instant::now();
    handle.shutdown().await.unwrap();
    task.await.unwrap();

    assert!(started.elapsed() >= Duration::from_secs(3));
    assert!(started.elapsed() < Duration::from_secs(4));

    let events = recorder.events().await;
    let abandoned: Vec<_> = events
        .iter()
        .filter_map(|e| match e {
            Event::JobsAbandoned { keys, .. } => Some(keys.clone()),
            _ => None,
        })
        .collect();
    assert_eq!(
        abandoned,
        vec![vec![JobKey::new("Alpha", "Batch"), JobKey::new("Zeta", "Batch")]]
    );
    assert!(matches!(events.last(), Some(Event::SchedulerStopped { .. })));
}

/// Test: No job fires once shutdown has been requested.
#[tokio::test(start_paused = true)]
async fn test_no_fires_after_shutdown() {
    let (mut scheduler, recorder) = paused_scheduler(monday_noon()).await;
    let job = Arc::new(CountingJob::new());
    scheduler
        .register(vec![JobDefinition::new(
            "Tick",
            "User",
            "0/1 * * * * ? *",
            job.clone(),
        )])
        .unwrap();

    let (handle, task) = scheduler.start();
    tokio::time::sleep(Duration::from_millis(2_500)).await;
    handle.shutdown().await.unwrap();
    task.await.unwrap();
    let fired_before = job.count();

    tokio::time::sleep(Duration::from_secs(5)).await;

    assert_eq!(fired_before, 2);
    assert_eq!(job.count(), fired_before);
    let events = recorder.events().await;
    assert_eq!(count(&events, |e| matches!(e, Event::SchedulerStopped { .. })), 1);
}

/// Test: A stopped scheduler rejects further commands.
#[tokio::test(start_paused = true)]
async fn test_commands_after_stop_fail() {
    let (scheduler, _recorder) = paused_scheduler(monday_noon()).await;

    let (handle, task) = scheduler.start();
    handle.shutdown().await.unwrap();
    task.await.unwrap();

    assert!(matches!(
        handle.shutdown().await,
        Err(SchedulerError::AlreadyStopped)
    ));
    assert!(matches!(
        handle.triggers().await,
        Err(SchedulerError::AlreadyStopped)
    ));
    assert!(matches!(
        handle.reschedule(Vec::new()).await,
        Err(SchedulerError::AlreadyStopped)
    ));
}
