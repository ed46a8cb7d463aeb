//! Configuration type definitions.
//!
//! This module contains the type definitions for the YAML configuration:
//! scheduler settings and per-job overrides.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::core::types::JobKey;

/// Top-level configuration file (cronjob.yaml).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Scheduler settings.
    pub scheduler: SchedulerConfig,
    /// Overrides for declared jobs.
    pub jobs: Vec<JobOverride>,
}

/// Scheduler settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Grace period for running jobs while draining.
    pub shutdown_timeout_secs: u64,
    /// Due jobs dispatched per pass.
    pub max_batch_size: usize,
    /// Delay between start and installing the declared jobs.
    pub start_delay_ms: u64,
    /// IANA zone cron expressions are evaluated in.
    pub timezone: String,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            shutdown_timeout_secs: 30,
            max_batch_size: 5,
            start_delay_ms: 1000,
            timezone: "UTC".to_string(),
        }
    }
}

impl SchedulerConfig {
    /// Shutdown grace period as a duration.
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs)
    }

    /// Start delay as a duration.
    pub fn start_delay(&self) -> Duration {
        Duration::from_millis(self.start_delay_ms)
    }
}

/// Override for one declared job, matched by name and group.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobOverride {
    /// Job name.
    pub name: String,
    /// Job group.
    pub group: String,
    /// Replacement cron expression.
    pub cron: Option<String>,
    /// Replacement description.
    pub description: Option<String>,
    /// Whether the job is declared at all.
    #[serde(default = "default_true")]
    pub enabled: bool,
}

fn default_true() -> bool {
    true
}

impl JobOverride {
    /// Key of the job this override applies to.
    pub fn key(&self) -> JobKey {
        JobKey::new(&self.name, &self.group)
    }
}
