//! Configuration for the Cascade engine
//!
//! Defaults can be overridden from a YAML document or from environment variables.

use serde::{Deserialize, Serialize};
use std::env;
use std::str::FromStr;
use tracing::warn;

use crate::EngineError;

/// Engine configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// How many instances of a batch migrate concurrently
    #[serde(default = "default_migration_parallelism")]
    pub migration_parallelism: usize,

    /// Retries of a single instance migration after an optimistic lock conflict
    #[serde(default = "default_optimistic_lock_retries")]
    pub optimistic_lock_retries: u32,

    /// Retries assigned to new jobs
    #[serde(default = "default_job_retries")]
    pub default_job_retries: u32,

    /// Priority of jobs whose activity declares none
    #[serde(default)]
    pub default_job_priority: i64,

    /// Log level
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_migration_parallelism() -> usize {
    4
}

fn default_optimistic_lock_retries() -> u32 {
    3
}

fn default_job_retries() -> u32 {
    3
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            migration_parallelism: default_migration_parallelism(),
            optimistic_lock_retries: default_optimistic_lock_retries(),
            default_job_retries: default_job_retries(),
            default_job_priority: 0,
            log_level: default_log_level(),
        }
    }
}

impl EngineConfig {
    /// Load configuration from environment variables on top of the defaults
    pub fn load() -> Self {
        Self::load_from(|key| env::var(key).ok())
    }

    /// Load configuration from an arbitrary variable source
    pub fn load_from(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        override_parsed(
            &lookup,
            "CASCADE_MIGRATION_PARALLELISM",
            &mut config.migration_parallelism,
        );
        override_parsed(
            &lookup,
            "CASCADE_OPTIMISTIC_LOCK_RETRIES",
            &mut config.optimistic_lock_retries,
        );
        override_parsed(
            &lookup,
            "CASCADE_DEFAULT_JOB_RETRIES",
            &mut config.default_job_retries,
        );
        override_parsed(
            &lookup,
            "CASCADE_DEFAULT_JOB_PRIORITY",
            &mut config.default_job_priority,
        );
        if let Some(log_level) = lookup("CASCADE_LOG_LEVEL") {
            config.log_level = log_level;
        }

        if config.migration_parallelism == 0 {
            warn!("CASCADE_MIGRATION_PARALLELISM must be positive, using 1");
            config.migration_parallelism = 1;
        }
        config
    }

    /// Parse a YAML document; missing fields take their defaults
    pub fn from_yaml(document: &str) -> Result<Self, EngineError> {
        let config: Self = serde_yaml::from_str(document)?;
        if config.migration_parallelism == 0 {
            return Err(EngineError::ConfigurationError(
                "migration_parallelism must be positive".to_string(),
            ));
        }
        Ok(config)
    }
}

fn override_parsed<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    target: &mut T,
) {
    if let Some(raw) = lookup(key) {
        match raw.parse::<T>() {
            Ok(value) => *target = value,
            Err(_) => warn!("Invalid {} value: {}", key, raw),
        }
    }
}
