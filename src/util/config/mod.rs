//! animscript configuration system
//!
//! A single TOML document configures the scheduler, the default simulated
//! time range and logging. Every field has a default, so an empty file (or
//! no file at all) is a valid configuration.
//!
//! ```toml
//! [scheduler]
//! stack_size = 262144
//! max_journal_len = 1048576
//! max_steps_per_pass = 100000
//! max_frames = 250
//! time_epsilon = 1e-9
//!
//! [time]
//! begin = 0.0
//! end = 10.0
//! step = 0.04
//!
//! [logging]
//! level = "debug"
//! ```
//!
//! # Usage
//!
//! ```rust
//! use animscript::util::config::parse_config;
//!
//! let config = parse_config("[time]\nend = 2.0\n").unwrap();
//! assert_eq!(config.time.end, 2.0);
//! ```

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::runtime::backend::TimeRange;
use crate::runtime::scheduler::SchedulerConfig;
use crate::util::logger::LogLevel;

/// Top-level runtime configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct RuntimeConfig {
    /// Scheduler settings
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    /// Default simulated time range handed to solvers
    #[serde(default)]
    pub time: TimeRange,
    /// Logging settings
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct LoggingConfig {
    /// Minimum level that is printed
    #[serde(default)]
    pub level: LogLevel,
}

impl RuntimeConfig {
    /// Check the values serde cannot check on its own
    pub fn validate(&self) -> Result<(), ConfigError> {
        let time = &self.time;
        if !(time.step > 0.0) {
            return Err(ConfigError::Invalid(format!(
                "time.step must be positive, got {}",
                time.step
            )));
        }
        if time.end < time.begin {
            return Err(ConfigError::Invalid(format!(
                "time.end ({}) is before time.begin ({})",
                time.end, time.begin
            )));
        }
        if self.scheduler.max_steps_per_pass == 0 {
            return Err(ConfigError::Invalid(
                "scheduler.max_steps_per_pass must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Parse and validate a configuration document
pub fn parse_config(text: &str) -> Result<RuntimeConfig, ConfigError> {
    let config: RuntimeConfig = toml::from_str(text)?;
    config.validate()?;
    Ok(config)
}

/// Load a configuration file
pub fn load_config(path: &Path) -> Result<RuntimeConfig, ConfigError> {
    let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse_config(&content)
}

/// Load a configuration file if given, defaults otherwise
pub fn load_or_default(path: Option<&Path>) -> Result<RuntimeConfig, ConfigError> {
    match path {
        Some(path) => load_config(path),
        None => Ok(RuntimeConfig::default()),
    }
}

/// Render a configuration back to TOML
pub fn render_config(config: &RuntimeConfig) -> Result<String, ConfigError> {
    Ok(toml::to_string_pretty(config)?)
}

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("config parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("config serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}
