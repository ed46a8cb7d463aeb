//! YAML configuration parsing.
//!
//! Parses scheduler settings and job overrides from YAML files.

use chrono_tz::Tz;
use std::collections::HashSet;
use std::path::Path;

use super::error::ConfigError;
use super::types::Config;

/// Loader for YAML configuration files.
pub struct YamlLoader;

impl YamlLoader {
    /// Load configuration from a file.
    pub fn load_config(path: impl AsRef<Path>) -> Result<Config, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::FileReadError {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Config =
            serde_yaml::from_str(&content).map_err(|source| ConfigError::YamlFileError {
                path: path.to_path_buf(),
                source,
            })?;
        Self::validate_config(&config)?;
        Ok(config)
    }

    /// Parse configuration from a YAML string.
    pub fn parse_config(yaml: &str) -> Result<Config, ConfigError> {
        let config: Config = serde_yaml::from_str(yaml)?;
        Self::validate_config(&config)?;
        Ok(config)
    }

    /// Validate a configuration.
    fn validate_config(config: &Config) -> Result<(), ConfigError> {
        let scheduler = &config.scheduler;

        if scheduler.max_batch_size == 0 {
            return Err(ConfigError::InvalidConfig(
                "max_batch_size cannot be zero".into(),
            ));
        }

        if scheduler.timezone.parse::<Tz>().is_err() {
            return Err(ConfigError::InvalidConfig(format!(
                "unknown timezone '{}'",
                scheduler.timezone
            )));
        }

        let mut seen = HashSet::new();
        for job in &config.jobs {
            if job.name.is_empty() {
                return Err(ConfigError::MissingField("jobs[].name".into()));
            }
            if job.group.is_empty() {
                return Err(ConfigError::MissingField("jobs[].group".into()));
            }
            if !seen.insert(job.key()) {
                return Err(ConfigError::InvalidConfig(format!(
                    "job {} is configured more than once",
                    job.key()
                )));
            }
        }

        Ok(())
    }
}
