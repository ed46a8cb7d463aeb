//! Job registry: the validated set of declared jobs.
//!
//! Registration is all-or-nothing per batch. Every definition is checked for
//! a unique key, a parseable expression and at least one upcoming fire time
//! before any of them is accepted.

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use std::collections::HashSet;
use thiserror::Error;

use super::job::{JobDefinition, ScheduledJob};
use super::schedule::{CronSchedule, ParseError, ScheduleError};
use super::types::JobKey;

/// Errors that can occur when registering jobs.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// Two definitions share a (name, group) key.
    #[error("duplicate job key: {0}")]
    DuplicateKey(JobKey),

    /// A definition's cron expression does not parse.
    #[error("invalid cron expression for job {key}: {source}")]
    InvalidExpression {
        key: JobKey,
        #[source]
        source: ParseError,
    },

    /// A definition's cron expression never fires within the horizon.
    #[error("job {key} can never fire: {source}")]
    NoFeasibleFireTime {
        key: JobKey,
        #[source]
        source: ScheduleError,
    },
}

/// Validated job definitions, in declaration order.
#[derive(Debug, Clone)]
pub struct JobRegistry {
    jobs: Vec<ScheduledJob>,
    timezone: Tz,
}

impl JobRegistry {
    /// Create an empty registry evaluating expressions in UTC.
    pub fn new() -> Self {
        Self {
            jobs: Vec::new(),
            timezone: Tz::UTC,
        }
    }

    /// Evaluate expressions registered from now on in `timezone`.
    pub fn with_timezone(mut self, timezone: Tz) -> Self {
        self.timezone = timezone;
        self
    }

    /// Zone that registered expressions are evaluated in.
    pub fn timezone(&self) -> Tz {
        self.timezone
    }

    /// Build a registry from a single batch.
    pub fn from_definitions(definitions: Vec<JobDefinition>) -> Result<Self, RegistryError> {
        let mut registry = Self::new();
        registry.register(definitions)?;
        Ok(registry)
    }

    /// Register a batch of definitions.
    ///
    /// On error nothing from the batch is installed.
    pub fn register(&mut self, definitions: Vec<JobDefinition>) -> Result<(), RegistryError> {
        self.register_at(definitions, Utc::now())
    }

    /// Register a batch, checking feasibility relative to `now`.
    pub fn register_at(
        &mut self,
        definitions: Vec<JobDefinition>,
        now: DateTime<Utc>,
    ) -> Result<(), RegistryError> {
        let mut seen: HashSet<JobKey> = self.jobs.iter().map(|job| job.key().clone()).collect();
        let mut validated = Vec::with_capacity(definitions.len());

        for definition in definitions {
            let key = definition.key().clone();
            if !seen.insert(key.clone()) {
                return Err(RegistryError::DuplicateKey(key));
            }

            let schedule = CronSchedule::parse(definition.cron_expression())
                .map_err(|source| RegistryError::InvalidExpression {
                    key: key.clone(),
                    source,
                })?
                .in_timezone(self.timezone);

            schedule
                .next_fire_after(now)
                .map_err(|source| RegistryError::NoFeasibleFireTime { key, source })?;

            validated.push(ScheduledJob::new(definition, schedule));
        }

        self.jobs.extend(validated);
        Ok(())
    }

    /// Get a registered job by key.
    pub fn get(&self, key: &JobKey) -> Option<&ScheduledJob> {
        self.jobs.iter().find(|job| job.key() == key)
    }

    /// All registered jobs, in declaration order.
    pub fn jobs(&self) -> &[ScheduledJob] {
        &self.jobs
    }

    /// Keys of all registered jobs.
    pub fn keys(&self) -> impl Iterator<Item = &JobKey> {
        self.jobs.iter().map(|job| job.key())
    }

    /// Number of registered jobs.
    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    /// Whether no job is registered.
    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    /// Consume the registry, yielding its jobs.
    pub fn into_jobs(self) -> Vec<ScheduledJob> {
        self.jobs
    }
}

impl Default for JobRegistry {
    fn default() -> Self {
        Self::new()
    }
}
