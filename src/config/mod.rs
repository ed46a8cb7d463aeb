//! Configuration loading and parsing.
//!
//! This module provides YAML-based configuration for scheduler settings and
//! overrides of the declared jobs.

mod builder;
mod error;
mod types;
mod yaml;

pub use builder::JobSetBuilder;
pub use error::ConfigError;
pub use types::{Config, JobOverride, SchedulerConfig};
pub use yaml::YamlLoader;
