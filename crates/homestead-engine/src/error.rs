//! Error types for the engine binary.
//!
//! [`EngineError`] wraps every failure mode of startup, the run loop, and
//! teardown so `main` can propagate with `?`.

use homestead_core::{ConfigError, RegistryError, UpdaterError};
use homestead_db::DbError;

/// Top-level error for the engine binary.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Configuration loading failed.
    #[error("config error: {source}")]
    Config {
        /// The underlying config error.
        #[from]
        source: ConfigError,
    },

    /// Connecting to or disconnecting from the store failed.
    #[error("store error: {source}")]
    Store {
        /// The underlying store error.
        #[from]
        source: DbError,
    },

    /// Seeding or loading the crop catalog failed.
    #[error("registry error: {source}")]
    Registry {
        /// The underlying registry error.
        #[from]
        source: RegistryError,
    },

    /// Starting or stopping the Updater failed.
    #[error("updater error: {source}")]
    Updater {
        /// The underlying updater error.
        #[from]
        source: UpdaterError,
    },

    /// NATS connection or messaging failed.
    #[error("NATS error: {message}")]
    Nats {
        /// Description of the NATS failure.
        message: String,
    },

    /// Waiting for the shutdown signal failed.
    #[error("signal error: {message}")]
    Signal {
        /// Description of the signal failure.
        message: String,
    },
}
