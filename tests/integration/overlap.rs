//! Overlap protection integration tests.
//!
//! Tests that verify a job never runs twice at once: fire times that arrive
//! while a run is active are skipped, not queued.

use chrono::{DateTime, TimeDelta, Utc};
use cronjob::testing::{CountingJob, SlowJob};
use cronjob::{Event, JobDefinition, JobKey};
use std::sync::Arc;
use std::time::Duration;

use crate::common::{fired, monday_noon, paused_scheduler};

fn seconds_after_noon(seconds: &[i64]) -> Vec<DateTime<Utc>> {
    seconds
        .iter()
        .map(|s| monday_noon() + TimeDelta::seconds(*s))
        .collect()
}

fn skipped(events: &[Event]) -> Vec<DateTime<Utc>> {
    events
        .iter()
        .filter_map(|event| match event {
            Event::JobSkipped { scheduled_for, .. } => Some(*scheduled_for),
            _ => None,
        })
        .collect()
}

/// Test: Fire times during a run are skipped and the next fire follows the
/// completion.
#[tokio::test(start_paused = true)]
async fn test_slow_job_skips_fires_while_running() {
    let (mut scheduler, recorder) = paused_scheduler(monday_noon()).await;
    let slow = Arc::new(SlowJob::new(Duration::from_millis(2_500)));
    scheduler
        .register(vec![JobDefinition::new(
            "Slow",
            "User",
            "0/1 * * * * ? *",
            slow.clone(),
        )])
        .unwrap();

    let (handle, task) = scheduler.start();
    tokio::time::sleep(Duration::from_millis(7_500)).await;
    handle.shutdown().await.unwrap();
    task.await.unwrap();

    let key = JobKey::new("Slow", "User");
    let events = recorder.events_for(&key).await;

    // Runs 12:00:01-03.5 and 12:00:04-06.5, then 12:00:07 until shutdown.
    assert_eq!(fired(&events, &key), seconds_after_noon(&[1, 4, 7]));
    assert_eq!(skipped(&events), seconds_after_noon(&[2, 3, 5, 6]));
    assert_eq!(slow.max_concurrency(), 1);
}

/// Test: A skipped job does not hold back other jobs due at the same time.
#[tokio::test(start_paused = true)]
async fn test_skip_does_not_block_other_jobs() {
    let (mut scheduler, recorder) = paused_scheduler(monday_noon()).await;
    let slow = Arc::new(SlowJob::new(Duration::from_secs(10)));
    let fast = Arc::new(CountingJob::new());
    scheduler
        .register(vec![
            JobDefinition::new("Slow", "User", "0/1 * * * * ? *", slow.clone()),
            JobDefinition::new("Fast", "User", "0/1 * * * * ? *", fast.clone()),
        ])
        .unwrap();

    let (handle, task) = scheduler.start();
    tokio::time::sleep(Duration::from_millis(5_500)).await;

    let triggers = handle.triggers().await.unwrap();
    let slow_trigger = triggers
        .iter()
        .find(|t| t.key().name() == "Slow")
        .unwrap();
    assert!(slow_trigger.is_running());

    handle.shutdown().await.unwrap();
    task.await.unwrap();

    let events = recorder.events().await;
    assert_eq!(slow.runs(), 1);
    assert_eq!(fast.count(), 5);
    assert_eq!(skipped(&events).len(), 4);
    assert_eq!(fast.max_concurrency(), 1);
}

/// Test: No combination of job duration and fire pattern lets a job overlap
/// itself, including when it is removed and re-declared mid-run.
#[tokio::test(start_paused = true)]
async fn test_no_overlap_across_durations_and_expressions() {
    let durations_ms = [0, 1, 999, 1_000, 1_001, 2_000, 3_333, 5_000, 7_001];
    let expressions = [
        "0/1 * * * * ? *",
        "0/2 * * * * ? *",
        "0/5 * * * * ? *",
        "1,2,3,7 * * * * ? *",
    ];

    for expression in expressions {
        for duration_ms in durations_ms {
            let (mut scheduler, _recorder) = paused_scheduler(monday_noon()).await;
            let slow = Arc::new(SlowJob::new(Duration::from_millis(duration_ms)));
            let definition =
                || JobDefinition::new("Sweep", "User", expression, slow.clone());
            scheduler.register(vec![definition()]).unwrap();

            let (handle, task) = scheduler.start();
            tokio::time::sleep(Duration::from_millis(3_500)).await;

            // Drop the job while a run may be active, then bring it back.
            handle.reschedule(Vec::new()).await.unwrap();
            tokio::time::sleep(Duration::from_millis(700)).await;
            handle.reschedule(vec![definition()]).await.unwrap();

            tokio::time::sleep(Duration::from_secs(12)).await;
            handle.shutdown().await.unwrap();
            task.await.unwrap();

            assert!(
                slow.runs() > 0,
                "{} with {} ms never ran",
                expression,
                duration_ms
            );
            assert_eq!(
                slow.max_concurrency(),
                1,
                "{} with {} ms overlapped",
                expression,
                duration_ms
            );
        }
    }
}
