//! The trigger table: one entry per installed job, ordered by fire time.

use chrono::{DateTime, Utc};
use std::collections::{BTreeSet, HashMap};

use crate::core::job::ScheduledJob;
use crate::core::schedule::ScheduleError;
use crate::core::types::{JobKey, RunId};

/// Execution state of a trigger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerState {
    /// Waiting for the next fire time.
    Idle,
    /// A run is in flight.
    Running { run_id: RunId },
}

/// A single scheduled job.
#[derive(Debug, Clone)]
pub struct TriggerEntry {
    job: ScheduledJob,
    next_fire_at: DateTime<Utc>,
    state: TriggerState,
    /// Removed from the declared set while running; deleted when the run ends.
    retired: bool,
}

impl TriggerEntry {
    /// Get the job key.
    pub fn key(&self) -> &JobKey {
        self.job.key()
    }

    /// Get the scheduled job.
    pub fn job(&self) -> &ScheduledJob {
        &self.job
    }

    /// The next instant this trigger fires.
    pub fn next_fire_at(&self) -> DateTime<Utc> {
        self.next_fire_at
    }

    /// Get the execution state.
    pub fn state(&self) -> TriggerState {
        self.state
    }

    /// Whether a run is in flight.
    pub fn is_running(&self) -> bool {
        matches!(self.state, TriggerState::Running { .. })
    }
}

/// A trigger that reached its fire time and must be dispatched.
#[derive(Debug, Clone)]
pub struct DueTrigger {
    pub job: ScheduledJob,
    pub run_id: RunId,
    pub scheduled_for: DateTime<Utc>,
}

/// Everything that came due in one pass over the table.
#[derive(Debug, Default)]
pub struct DuePass {
    /// Idle triggers now marked running.
    pub dispatched: Vec<DueTrigger>,
    /// Fire times that arrived while the previous run was still active.
    pub skipped: Vec<(JobKey, DateTime<Utc>)>,
    /// Triggers whose next fire time could not be computed.
    pub dropped: Vec<(JobKey, ScheduleError)>,
}

/// Outcome of marking a run as finished.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Completion {
    /// Back to idle with a fresh fire time.
    Rescheduled(DateTime<Utc>),
    /// The job was removed while running and is now gone.
    Retired,
    /// No further fire time exists; the entry was removed.
    Dropped(ScheduleError),
    /// The run is not the one the table is tracking.
    Stale,
}

/// Trigger entries keyed by job, with an index ordered by next fire time.
#[derive(Debug, Default)]
pub struct TriggerTable {
    entries: HashMap<JobKey, TriggerEntry>,
    queue: BTreeSet<(DateTime<Utc>, JobKey)>,
}

impl TriggerTable {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Install or replace the trigger for `job`, firing after `now`.
    ///
    /// Replacing a running trigger keeps it running: the run in flight
    /// finishes and the next fire time follows the new schedule. If no fire
    /// time exists the key is removed and the error returned.
    pub fn install(
        &mut self,
        job: ScheduledJob,
        now: DateTime<Utc>,
    ) -> Result<DateTime<Utc>, ScheduleError> {
        let key = job.key().clone();
        let next = match job.schedule().next_fire_after(now) {
            Ok(next) => next,
            Err(e) => {
                self.remove(&key);
                return Err(e);
            }
        };

        match self.entries.get_mut(&key) {
            Some(entry) => {
                self.queue.remove(&(entry.next_fire_at, key.clone()));
                entry.job = job;
                entry.next_fire_at = next;
                entry.retired = false;
            }
            None => {
                self.entries.insert(
                    key.clone(),
                    TriggerEntry {
                        job,
                        next_fire_at: next,
                        state: TriggerState::Idle,
                        retired: false,
                    },
                );
            }
        }
        self.queue.insert((next, key));
        Ok(next)
    }

    /// Remove the trigger for `key`. Returns whether it was installed.
    ///
    /// A running trigger stops firing immediately and disappears once its run
    /// completes.
    pub fn remove(&mut self, key: &JobKey) -> bool {
        let Some(entry) = self.entries.get_mut(key) else {
            return false;
        };
        if entry.retired {
            return false;
        }

        self.queue.remove(&(entry.next_fire_at, key.clone()));
        if entry.is_running() {
            entry.retired = true;
        } else {
            self.entries.remove(key);
        }
        true
    }

    /// Remove every trigger.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.queue.clear();
    }

    /// Get the trigger for `key`.
    pub fn get(&self, key: &JobKey) -> Option<&TriggerEntry> {
        self.entries.get(key).filter(|entry| !entry.retired)
    }

    /// Keys of all installed triggers.
    pub fn keys(&self) -> impl Iterator<Item = &JobKey> {
        self.entries
            .iter()
            .filter(|(_, entry)| !entry.retired)
            .map(|(key, _)| key)
    }

    /// Installed triggers, earliest fire time first.
    pub fn snapshot(&self) -> Vec<TriggerEntry> {
        let mut entries: Vec<TriggerEntry> = self
            .entries
            .values()
            .filter(|entry| !entry.retired)
            .cloned()
            .collect();
        entries.sort_by(|a, b| {
            a.next_fire_at
                .cmp(&b.next_fire_at)
                .then_with(|| a.key().cmp(b.key()))
        });
        entries
    }

    /// Number of installed triggers.
    pub fn len(&self) -> usize {
        self.keys().count()
    }

    /// Whether no trigger is installed.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of runs in flight, including retired triggers.
    pub fn running_count(&self) -> usize {
        self.entries.values().filter(|e| e.is_running()).count()
    }

    /// The earliest pending fire time.
    pub fn next_fire_at(&self) -> Option<DateTime<Utc>> {
        self.queue.first().map(|(at, _)| *at)
    }

    /// Collect every trigger due at `now`.
    ///
    /// Idle triggers are marked running, up to `max_batch` of them; the rest
    /// stay due for the next pass. Running triggers have their fire time
    /// skipped. Both advance to the next fire time after `now`.
    pub fn take_due(&mut self, now: DateTime<Utc>, max_batch: usize) -> DuePass {
        let due: Vec<(DateTime<Utc>, JobKey)> = self
            .queue
            .iter()
            .take_while(|(at, _)| *at <= now)
            .cloned()
            .collect();

        let mut pass = DuePass::default();
        for (at, key) in due {
            let Some(entry) = self.entries.get_mut(&key) else {
                self.queue.remove(&(at, key));
                continue;
            };

            let was_running = entry.is_running();
            if !was_running {
                if pass.dispatched.len() >= max_batch {
                    continue;
                }
                let run_id = RunId::new();
                entry.state = TriggerState::Running { run_id };
                pass.dispatched.push(DueTrigger {
                    job: entry.job.clone(),
                    run_id,
                    scheduled_for: at,
                });
            } else {
                pass.skipped.push((key.clone(), at));
            }

            self.queue.remove(&(at, key.clone()));
            match entry.job.schedule().next_fire_after(now) {
                Ok(next) => {
                    entry.next_fire_at = next;
                    self.queue.insert((next, key));
                }
                Err(e) => {
                    // The entry leaves the queue; the run in flight (if any)
                    // completes first and the entry is deleted afterwards.
                    entry.retired = true;
                    pass.dropped.push((key, e));
                }
            }
        }
        pass
    }

    /// Mark `run_id` of `key` as finished and schedule the next fire after
    /// `now`.
    pub fn complete(&mut self, key: &JobKey, run_id: RunId, now: DateTime<Utc>) -> Completion {
        let Some(entry) = self.entries.get_mut(key) else {
            return Completion::Stale;
        };
        if entry.state != (TriggerState::Running { run_id }) {
            return Completion::Stale;
        }

        self.queue.remove(&(entry.next_fire_at, key.clone()));
        if entry.retired {
            self.entries.remove(key);
            return Completion::Retired;
        }

        entry.state = TriggerState::Idle;
        match entry.job.schedule().next_fire_after(now) {
            Ok(next) => {
                entry.next_fire_at = next;
                self.queue.insert((next, key.clone()));
                Completion::Rescheduled(next)
            }
            Err(e) => {
                self.entries.remove(key);
                Completion::Dropped(e)
            }
        }
    }
}
