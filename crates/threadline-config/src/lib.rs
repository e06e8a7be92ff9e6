#![deny(unsafe_code)]

//! Configuration loading and validation for threadline.
//!
//! Loads TOML configuration files and validates them. [`AppConfig`] is the
//! central configuration structure; every field has a default so an empty
//! file (or no file at all) yields a working setup.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

/// Token timeout applied when `agent.token_timeout_secs` is zero.
pub const MIN_TOKEN_TIMEOUT: Duration = Duration::from_millis(250);

/// Shortest reaper sweep interval; smaller values are raised to this.
pub const MIN_REAPER_INTERVAL: Duration = Duration::from_millis(1);

/// Log levels accepted by `logging.level`.
const VALID_LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// Errors that can occur during configuration loading and validation.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("validation error: {0}")]
    Validation(String),
}

/// Top-level application configuration.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Reference agent configuration.
    #[serde(default)]
    pub agent: AgentConfig,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Reference tracing agent configuration.
///
/// ## TOML Example
///
/// ```toml
/// [agent]
/// app_name = "checkout"
/// token_timeout_secs = 30
/// reaper_interval_ms = 500
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Application name reported with every transaction.
    #[serde(default = "default_app_name")]
    pub app_name: String,

    /// Seconds an unexpired token may stay active before the reaper times it
    /// out. Zero selects [`MIN_TOKEN_TIMEOUT`].
    #[serde(default = "default_token_timeout_secs")]
    pub token_timeout_secs: u64,

    /// How often the reaper sweeps live transactions, in milliseconds.
    #[serde(default = "default_reaper_interval_ms")]
    pub reaper_interval_ms: u64,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            app_name: default_app_name(),
            token_timeout_secs: default_token_timeout_secs(),
            reaper_interval_ms: default_reaper_interval_ms(),
        }
    }
}

impl AgentConfig {
    /// Effective token timeout.
    pub fn token_timeout(&self) -> Duration {
        if self.token_timeout_secs == 0 {
            MIN_TOKEN_TIMEOUT
        } else {
            Duration::from_secs(self.token_timeout_secs)
        }
    }

    /// Effective reaper sweep interval, never below [`MIN_REAPER_INTERVAL`].
    pub fn reaper_interval(&self) -> Duration {
        Duration::from_millis(self.reaper_interval_ms).max(MIN_REAPER_INTERVAL)
    }
}

fn default_app_name() -> String {
    "threadline".to_string()
}

fn default_token_timeout_secs() -> u64 {
    180
}

fn default_reaper_interval_ms() -> u64 {
    1000
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level filter (e.g. "info", "debug", "trace").
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

impl AppConfig {
    /// Load configuration from a TOML file at the given path using async I/O.
    pub async fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = tokio::fs::read_to_string(path).await?;
        let config = Self::parse(&content)?;
        debug!(path = %path.display(), "Configuration loaded");
        Ok(config)
    }

    /// Parse configuration from a TOML string.
    pub fn parse(s: &str) -> Result<Self, ConfigError> {
        let config: AppConfig = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.agent.app_name.trim().is_empty() {
            return Err(ConfigError::Validation(
                "agent.app_name must not be empty".to_string(),
            ));
        }

        // One day is far beyond any sane async hand-off.
        if self.agent.token_timeout_secs > 86_400 {
            return Err(ConfigError::Validation(format!(
                "agent.token_timeout_secs must be at most 86400, got {}",
                self.agent.token_timeout_secs
            )));
        }

        if self.agent.reaper_interval_ms == 0 {
            return Err(ConfigError::Validation(
                "agent.reaper_interval_ms must be non-zero".to_string(),
            ));
        }

        let level = self.logging.level.to_ascii_lowercase();
        if !VALID_LOG_LEVELS.contains(&level.as_str()) {
            return Err(ConfigError::Validation(format!(
                "logging.level must be one of {:?}, got {:?}",
                VALID_LOG_LEVELS, self.logging.level
            )));
        }

        Ok(())
    }
}
