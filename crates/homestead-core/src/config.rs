//! Configuration loading and typed config structures for Homestead.
//!
//! The canonical configuration lives in `homestead-config.yaml` next to the
//! engine binary. This module defines strongly-typed structs that mirror the
//! YAML structure, and provides a loader that reads and validates the file.
//! Every field has a default, so an empty file (or no file) is valid.

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use homestead_farm::{
    CropTypeSeed, DEFAULT_WITHER_GRACE_SECS, FarmError, GrowthPolicy, default_seeds,
    validate_seeds,
};

/// Errors that can occur when loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read the configuration file from disk.
    #[error("failed to read config file: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// Failed to parse YAML content.
    #[error("failed to parse config YAML: {source}")]
    Yaml {
        /// The underlying YAML parse error.
        source: serde_yml::Error,
    },

    /// The configuration parsed but a value is out of range.
    #[error("invalid configuration: {reason}")]
    Invalid {
        /// Explanation of what is wrong with the configuration.
        reason: String,
    },
}

impl From<serde_yml::Error> for ConfigError {
    fn from(source: serde_yml::Error) -> Self {
        Self::Yaml { source }
    }
}

impl From<FarmError> for ConfigError {
    fn from(err: FarmError) -> Self {
        Self::Invalid {
            reason: err.to_string(),
        }
    }
}

/// Top-level configuration.
///
/// Mirrors the structure of `homestead-config.yaml`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct FarmConfig {
    /// Sweep scheduling.
    #[serde(default)]
    pub updater: UpdaterConfig,

    /// Growth policy defaults.
    #[serde(default)]
    pub growth: GrowthConfig,

    /// User action settings.
    #[serde(default)]
    pub actions: ActionsConfig,

    /// Crop catalog seed list, persisted on first start.
    #[serde(default = "default_seeds")]
    pub crop_types: Vec<CropTypeSeed>,

    /// Infrastructure connection strings.
    #[serde(default)]
    pub infrastructure: InfrastructureConfig,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Default for FarmConfig {
    fn default() -> Self {
        Self {
            updater: UpdaterConfig::default(),
            growth: GrowthConfig::default(),
            actions: ActionsConfig::default(),
            crop_types: default_seeds(),
            infrastructure: InfrastructureConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl FarmConfig {
    /// Load configuration from a YAML file at the given path.
    ///
    /// Environment variables override YAML values for infrastructure URLs:
    /// - `DRAGONFLY_URL` overrides `infrastructure.dragonfly_url`
    /// - `NATS_URL` overrides `infrastructure.nats_url`
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] if the file cannot be read,
    /// [`ConfigError::Yaml`] if the content is not valid YAML, or
    /// [`ConfigError::Invalid`] if validation fails.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::parse(&contents)
    }

    /// Parse and validate configuration from a YAML string.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Yaml`] if the string is not valid YAML, or
    /// [`ConfigError::Invalid`] if validation fails.
    pub fn parse(yaml: &str) -> Result<Self, ConfigError> {
        let mut config: Self = if yaml.trim().is_empty() {
            Self::default()
        } else {
            serde_yml::from_str(yaml)?
        };
        config.infrastructure.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Check value ranges and the crop seed list.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] describing the first problem found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.updater.sweep_interval_secs == 0 {
            return Err(ConfigError::Invalid {
                reason: "updater.sweep_interval_secs must be at least 1".to_owned(),
            });
        }
        if self.updater.sweep_concurrency == 0 {
            return Err(ConfigError::Invalid {
                reason: "updater.sweep_concurrency must be at least 1".to_owned(),
            });
        }
        if self.actions.write_attempts == 0 {
            return Err(ConfigError::Invalid {
                reason: "actions.write_attempts must be at least 1".to_owned(),
            });
        }
        validate_seeds(&self.crop_types)?;
        Ok(())
    }

    /// The growth policy described by this configuration.
    pub const fn growth_policy(&self) -> GrowthPolicy {
        GrowthPolicy::new(self.growth.default_wither_grace_secs)
    }
}

/// Updater sweep scheduling.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct UpdaterConfig {
    /// Seconds between the start of consecutive sweeps.
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,

    /// Maximum crops reconciled in parallel within one sweep.
    #[serde(default = "default_sweep_concurrency")]
    pub sweep_concurrency: usize,
}

impl UpdaterConfig {
    /// The sweep period as a [`Duration`].
    pub const fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
}

impl Default for UpdaterConfig {
    fn default() -> Self {
        Self {
            sweep_interval_secs: default_sweep_interval_secs(),
            sweep_concurrency: default_sweep_concurrency(),
        }
    }
}

/// Growth policy defaults.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct GrowthConfig {
    /// Grace after the watering interval for crop types without their own.
    #[serde(default = "default_wither_grace_secs")]
    pub default_wither_grace_secs: u64,
}

impl Default for GrowthConfig {
    fn default() -> Self {
        Self {
            default_wither_grace_secs: default_wither_grace_secs(),
        }
    }
}

/// User action settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ActionsConfig {
    /// Attempts for follow-up writes that are safe to retry (crediting a
    /// farmer, clearing a plot) when they lose a compare-and-swap.
    #[serde(default = "default_write_attempts")]
    pub write_attempts: u32,
}

impl Default for ActionsConfig {
    fn default() -> Self {
        Self {
            write_attempts: default_write_attempts(),
        }
    }
}

/// Infrastructure connection strings.
///
/// An empty URL disables that backend: no `Dragonfly` URL means the
/// in-memory store, no NATS URL means notifications are only logged.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct InfrastructureConfig {
    /// Dragonfly (Redis-compatible) URL.
    #[serde(default)]
    pub dragonfly_url: String,

    /// NATS messaging URL for notification publishing.
    #[serde(default)]
    pub nats_url: String,

    /// Subject prefix for published notifications.
    #[serde(default = "default_notification_subject")]
    pub notification_subject: String,
}

impl InfrastructureConfig {
    /// Override infrastructure URLs with environment variables when set.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var("DRAGONFLY_URL") {
            self.dragonfly_url = val;
        }
        if let Ok(val) = std::env::var("NATS_URL") {
            self.nats_url = val;
        }
        if self.notification_subject.is_empty() {
            self.notification_subject = default_notification_subject();
        }
    }
}

impl Default for InfrastructureConfig {
    fn default() -> Self {
        Self {
            dragonfly_url: String::new(),
            nats_url: String::new(),
            notification_subject: default_notification_subject(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LoggingConfig {
    /// Log level filter used when `RUST_LOG` is unset.
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Emit JSON lines instead of human-readable output.
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

// ---------------------------------------------------------------------------
// Default value functions (serde default requires named functions)
// ---------------------------------------------------------------------------

const fn default_sweep_interval_secs() -> u64 {
    60
}

const fn default_sweep_concurrency() -> usize {
    16
}

const fn default_wither_grace_secs() -> u64 {
    DEFAULT_WITHER_GRACE_SECS
}

const fn default_write_attempts() -> u32 {
    5
}

fn default_notification_subject() -> String {
    "homestead.notifications".to_owned()
}

fn default_log_level() -> String {
    "info".to_owned()
}
