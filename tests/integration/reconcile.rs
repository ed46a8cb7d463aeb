//! Reconciliation integration tests.
//!
//! Tests that verify replacing the declared job set on a running scheduler:
//! stale jobs stop firing, new ones start, and runs in flight are respected.

use chrono::{DateTime, TimeDelta, Utc};
use cronjob::testing::{CountingJob, SlowJob};
use cronjob::{Event, JobDefinition, JobKey, RegistryError, SchedulerError};
use std::sync::Arc;
use std::time::Duration;

use crate::common::{count, fired, monday_noon, paused_scheduler};

fn at(seconds: &[i64]) -> Vec<DateTime<Utc>> {
    seconds
        .iter()
        .map(|s| monday_noon() + TimeDelta::seconds(*s))
        .collect()
}

/// Test: Jobs missing from the new set stop firing; new jobs start.
#[tokio::test(start_paused = true)]
async fn test_reschedule_replaces_job_set() {
    let (mut scheduler, recorder) = paused_scheduler(monday_noon()).await;
    let old = Arc::new(CountingJob::new());
    let kept = Arc::new(CountingJob::new());
    let new = Arc::new(CountingJob::new());
    scheduler
        .register(vec![
            JobDefinition::new("Old", "User", "0/1 * * * * ? *", old.clone()),
            JobDefinition::new("Kept", "User", "0/1 * * * * ? *", kept.clone()),
        ])
        .unwrap();

    let (handle, task) = scheduler.start();
    tokio::time::sleep(Duration::from_millis(2_500)).await;

    handle
        .reschedule(vec![
            JobDefinition::new("Kept", "User", "0/2 * * * * ? *", kept.clone()),
            JobDefinition::new("New", "User", "0/1 * * * * ? *", new.clone()),
        ])
        .await
        .unwrap();

    tokio::time::sleep(Duration::from_secs(3)).await;
    handle.shutdown().await.unwrap();
    task.await.unwrap();

    let events = recorder.events().await;
    assert_eq!(fired(&events, &JobKey::new("Old", "User")), at(&[1, 2]));
    assert_eq!(fired(&events, &JobKey::new("Kept", "User")), at(&[1, 2, 4]));
    assert_eq!(fired(&events, &JobKey::new("New", "User")), at(&[3, 4, 5]));

    let reconciled: Vec<_> = events
        .iter()
        .filter_map(|e| match e {
            Event::ScheduleReconciled {
                removed, installed, ..
            } => Some((*removed, *installed)),
            _ => None,
        })
        .collect();
    assert_eq!(reconciled, vec![(0, 2), (1, 2)]);
}

/// Test: Removing a running job lets the run finish but never fires again.
#[tokio::test(start_paused = true)]
async fn test_removed_running_job_finishes_then_stops() {
    let (mut scheduler, recorder) = paused_scheduler(monday_noon()).await;
    let slow = Arc::new(SlowJob::new(Duration::from_secs(3)));
    scheduler
        .register(vec![JobDefinition::new(
            "Slow",
            "User",
            "0/1 * * * * ? *",
            slow.clone(),
        )])
        .unwrap();

    let (handle, task) = scheduler.start();
    tokio::time::sleep(Duration::from_millis(1_500)).await;

    handle.reschedule(Vec::new()).await.unwrap();
    assert!(handle.triggers().await.unwrap().is_empty());

    tokio::time::sleep(Duration::from_secs(5)).await;
    handle.shutdown().await.unwrap();
    task.await.unwrap();

    let key = JobKey::new("Slow", "User");
    let events = recorder.events_for(&key).await;
    assert_eq!(slow.runs(), 1);
    assert_eq!(fired(&events, &key), at(&[1]));
    assert_eq!(count(&events, |e| matches!(e, Event::JobSucceeded { .. })), 1);
    assert_eq!(count(&events, |e| matches!(e, Event::JobSkipped { .. })), 0);
}

/// Test: Re-declaring a running job keeps the run and follows the new
/// expression afterwards.
#[tokio::test(start_paused = true)]
async fn test_redeclared_running_job_keeps_running() {
    let (mut scheduler, recorder) = paused_scheduler(monday_noon()).await;
    let slow = Arc::new(SlowJob::new(Duration::from_millis(3_500)));
    scheduler
        .register(vec![JobDefinition::new(
            "Slow",
            "User",
            "0/1 * * * * ? *",
            slow.clone(),
        )])
        .unwrap();

    let (handle, task) = scheduler.start();
    tokio::time::sleep(Duration::from_millis(1_500)).await;

    handle
        .reschedule(vec![JobDefinition::new(
            "Slow",
            "User",
            "0/2 * * * * ? *",
            slow.clone(),
        )])
        .await
        .unwrap();

    let triggers = handle.triggers().await.unwrap();
    assert_eq!(triggers.len(), 1);
    assert!(triggers[0].is_running());
    assert_eq!(triggers[0].next_fire_at(), at(&[2])[0]);

    tokio::time::sleep(Duration::from_secs(5)).await;
    handle.shutdown().await.unwrap();
    task.await.unwrap();

    // Run 12:00:01-04.5 skips :02 and :04; the next run is at :06.
    let key = JobKey::new("Slow", "User");
    let events = recorder.events_for(&key).await;
    assert_eq!(fired(&events, &key), at(&[1, 6]));
    assert_eq!(slow.max_concurrency(), 1);
}

/// Test: A rejected batch leaves the live schedule as it was.
#[tokio::test(start_paused = true)]
async fn test_infeasible_batch_rejected() {
    let (mut scheduler, _recorder) = paused_scheduler(monday_noon()).await;
    scheduler
        .register(vec![JobDefinition::new(
            "Minutely",
            "User",
            "0 * * * * ? *",
            Arc::new(CountingJob::new()),
        )])
        .unwrap();

    let (handle, task) = scheduler.start();
    let before = handle.triggers().await.unwrap();

    // February 30th never happens.
    let result = handle
        .reschedule(vec![JobDefinition::new(
            "Never",
            "User",
            "0 0 0 30 2 ? *",
            Arc::new(CountingJob::new()),
        )])
        .await;

    assert!(matches!(
        result,
        Err(SchedulerError::Registry(RegistryError::NoFeasibleFireTime { .. }))
    ));

    let after = handle.triggers().await.unwrap();
    handle.shutdown().await.unwrap();
    task.await.unwrap();

    let keys = |entries: &[cronjob::scheduler::TriggerEntry]| -> Vec<JobKey> {
        entries.iter().map(|e| e.key().clone()).collect()
    };
    assert_eq!(keys(&before), keys(&after));
    assert_eq!(before[0].next_fire_at(), after[0].next_fire_at());
}

/// Test: Declaring the same set twice reinstalls everything and leaves the
/// same trigger table behind.
#[tokio::test(start_paused = true)]
async fn test_same_set_twice_yields_same_table() {
    let (mut scheduler, recorder) = paused_scheduler(monday_noon()).await;
    let slow = Arc::new(SlowJob::new(Duration::from_secs(3)));
    let minutely = Arc::new(CountingJob::new());
    let declared = || {
        vec![
            JobDefinition::new("Slow", "User", "0/1 * * * * ? *", slow.clone()),
            JobDefinition::new("Minutely", "User", "0 * * * * ? *", minutely.clone()),
        ]
    };
    scheduler.register(declared()).unwrap();

    let (handle, task) = scheduler.start();
    tokio::time::sleep(Duration::from_millis(1_500)).await;

    handle.reschedule(declared()).await.unwrap();
    let first = handle.triggers().await.unwrap();
    handle.reschedule(declared()).await.unwrap();
    let second = handle.triggers().await.unwrap();

    handle.shutdown().await.unwrap();
    task.await.unwrap();

    let summary = |entries: &[cronjob::scheduler::TriggerEntry]| {
        entries
            .iter()
            .map(|e| (e.key().clone(), e.next_fire_at(), e.state()))
            .collect::<Vec<_>>()
    };
    assert_eq!(first.len(), 2);
    assert_eq!(summary(&first), summary(&second));
    assert!(first.iter().any(|e| e.is_running()));

    let reconciled: Vec<_> = recorder
        .events()
        .await
        .iter()
        .filter_map(|e| match e {
            Event::ScheduleReconciled {
                removed, installed, ..
            } => Some((*removed, *installed)),
            _ => None,
        })
        .collect();
    assert_eq!(reconciled, vec![(0, 2), (0, 2), (0, 2)]);
}
