//! Declared job set from YAML configuration.
//!
//! This module applies configured overrides to a catalog of job definitions
//! and builds a scheduler from the result.

use chrono_tz::Tz;

use crate::core::job::JobDefinition;
use crate::core::registry::JobRegistry;
use crate::scheduler::Scheduler;

use super::error::ConfigError;
use super::types::{Config, JobOverride};

/// Builder for the declared job set.
pub struct JobSetBuilder {
    config: Config,
}

impl JobSetBuilder {
    /// Create a builder for a loaded configuration.
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    /// Get the configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Zone cron expressions are evaluated in.
    pub fn timezone(&self) -> Result<Tz, ConfigError> {
        let name = &self.config.scheduler.timezone;
        name.parse::<Tz>()
            .map_err(|_| ConfigError::InvalidConfig(format!("unknown timezone '{}'", name)))
    }

    /// Apply the overrides to `catalog`.
    ///
    /// Disabled jobs are left out; catalog order is kept.
    pub fn apply(&self, catalog: Vec<JobDefinition>) -> Result<Vec<JobDefinition>, ConfigError> {
        for job in &self.config.jobs {
            let key = job.key();
            if !catalog.iter().any(|definition| definition.key() == &key) {
                return Err(ConfigError::UnknownJob(key));
            }
        }

        let declared = catalog
            .into_iter()
            .filter_map(|definition| match self.override_for(&definition) {
                Some(job) => Self::apply_override(definition, job),
                None => Some(definition),
            })
            .collect();
        Ok(declared)
    }

    /// Apply the overrides and validate the result as one batch.
    pub fn build_registry(&self, catalog: Vec<JobDefinition>) -> Result<JobRegistry, ConfigError> {
        let mut registry = JobRegistry::new().with_timezone(self.timezone()?);
        registry.register(self.apply(catalog)?)?;
        Ok(registry)
    }

    /// Build a scheduler with the configured settings and job set.
    pub fn build_scheduler(&self, catalog: Vec<JobDefinition>) -> Result<Scheduler, ConfigError> {
        let settings = &self.config.scheduler;
        let registry = self.build_registry(catalog)?;
        Ok(Scheduler::new()
            .with_shutdown_timeout(settings.shutdown_timeout())
            .with_max_batch_size(settings.max_batch_size)
            .with_start_delay(settings.start_delay())
            .with_registry(registry))
    }

    fn override_for(&self, definition: &JobDefinition) -> Option<&JobOverride> {
        self.config
            .jobs
            .iter()
            .find(|job| job.name == definition.name() && job.group == definition.group())
    }

    fn apply_override(definition: JobDefinition, job: &JobOverride) -> Option<JobDefinition> {
        if !job.enabled {
            tracing::debug!(job = %definition.key(), "Job disabled by configuration");
            return None;
        }
        let mut definition = definition;
        if let Some(cron) = &job.cron {
            definition = definition.with_cron_expression(cron);
        }
        if let Some(description) = &job.description {
            definition = definition.with_description(description);
        }
        Some(definition)
    }
}
