//! Common test utilities shared across integration tests.

#![allow(dead_code)]

use chrono::{DateTime, TimeZone, Utc};
use cronjob::testing::RecordingHandler;
use cronjob::{Event, EventBus, JobKey, Scheduler, TokioClock};
use std::sync::Arc;
use std::time::Duration;

/// Monday 2024-01-15 12:00:00 UTC.
pub fn monday_noon() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 15, 12, 0, 0).unwrap()
}

/// A scheduler on a paused-time clock starting at `anchor`, recording every
/// event it emits.
///
/// Must be called from a `#[tokio::test(start_paused = true)]` test.
pub async fn paused_scheduler(anchor: DateTime<Utc>) -> (Scheduler, Arc<RecordingHandler>) {
    let recorder = Arc::new(RecordingHandler::new());
    let bus = EventBus::new();
    bus.register(recorder.clone()).await;
    let scheduler = Scheduler::new()
        .with_event_bus(bus)
        .with_clock(TokioClock::starting_at(anchor))
        .with_start_delay(Duration::ZERO);
    (scheduler, recorder)
}

/// Fire times recorded for `key`, in order.
pub fn fired(events: &[Event], key: &JobKey) -> Vec<DateTime<Utc>> {
    events
        .iter()
        .filter_map(|event| match event {
            Event::JobFired {
                key: fired_key,
                scheduled_for,
                ..
            } if fired_key == key => Some(*scheduled_for),
            _ => None,
        })
        .collect()
}

/// Number of events matching `predicate`.
pub fn count(events: &[Event], predicate: impl Fn(&Event) -> bool) -> usize {
    events.iter().filter(|event| predicate(event)).count()
}
