//! Built-in job integration tests.
//!
//! Tests that verify the bundled note jobs running under the scheduler, with
//! the job set shaped by a YAML configuration.

use cronjob::config::{JobSetBuilder, YamlLoader};
use cronjob::jobs::builtin_jobs;
use cronjob::notes::{InMemoryNoteStore, NoteStore};
use cronjob::testing::RecordingHandler;
use cronjob::{Event, EventBus, JobKey, TokioClock};
use std::sync::Arc;
use std::time::Duration;

use crate::common::{count, monday_noon};

const CONFIG: &str = r#"
scheduler:
  start_delay_ms: 0
  shutdown_timeout_secs: 5
jobs:
  - name: SchedulerAliveJob
    group: Core
    enabled: false
  - name: LoggingJob
    group: User
    enabled: false
  - name: DeleteNotesJob
    group: User
    cron: "32 * * * * ? *"
"#;

/// Test: Notes accumulate every five seconds and are pruned to the two
/// latest once a minute.
#[tokio::test(start_paused = true)]
async fn test_note_jobs_create_and_prune() {
    let store = Arc::new(InMemoryNoteStore::new());
    let recorder = Arc::new(RecordingHandler::new());
    let bus = EventBus::new();
    bus.register(recorder.clone()).await;

    let builder = JobSetBuilder::new(YamlLoader::parse_config(CONFIG).unwrap());
    let scheduler = builder
        .build_scheduler(builtin_jobs(store.clone()))
        .unwrap()
        .with_event_bus(bus)
        .with_clock(TokioClock::starting_at(monday_noon()));
    assert_eq!(scheduler.registry().len(), 2);

    let (handle, task) = scheduler.start();

    // Notes at :05 through :30, then pruning at :32.
    tokio::time::sleep(Duration::from_millis(31_500)).await;
    assert_eq!(store.len().unwrap(), 6);

    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(store.len().unwrap(), 2);

    // Notes at :35 and :40.
    tokio::time::sleep(Duration::from_secs(8)).await;
    assert_eq!(store.len().unwrap(), 4);

    handle.shutdown().await.unwrap();
    task.await.unwrap();

    let events = recorder.events().await;
    let delete_runs = count(&events, |e| {
        matches!(e, Event::JobSucceeded { key, .. } if key == &JobKey::new("DeleteNotesJob", "User"))
    });
    assert_eq!(delete_runs, 1);
    assert_eq!(count(&events, |e| matches!(e, Event::JobFailed { .. })), 0);

    let notes = store.list_notes_descending(0).await.unwrap();
    assert!(
        notes
            .iter()
            .all(|n| n.content.starts_with("Created by 'CreateNoteJob' at '"))
    );
}

/// Test: Without the pruning job the notes keep growing.
#[tokio::test(start_paused = true)]
async fn test_disabled_pruning_keeps_all_notes() {
    let store = Arc::new(InMemoryNoteStore::new());
    let yaml = r#"
scheduler:
  start_delay_ms: 0
jobs:
  - name: SchedulerAliveJob
    group: Core
    enabled: false
  - name: LoggingJob
    group: User
    enabled: false
  - name: DeleteNotesJob
    group: User
    enabled: false
  - name: CreateNoteJob
    group: User
    cron: "0/1 * * * * ? *"
"#;

    let builder = JobSetBuilder::new(YamlLoader::parse_config(yaml).unwrap());
    let scheduler = builder
        .build_scheduler(builtin_jobs(store.clone()))
        .unwrap()
        .with_clock(TokioClock::starting_at(monday_noon()));

    let (handle, task) = scheduler.start();
    tokio::time::sleep(Duration::from_millis(65_500)).await;
    handle.shutdown().await.unwrap();
    task.await.unwrap();

    assert_eq!(store.len().unwrap(), 65);
}
