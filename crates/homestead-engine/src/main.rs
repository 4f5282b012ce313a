//! Engine binary for the Homestead simulation.
//!
//! Wires the store, the notifier, the crop catalog, and the Updater sweep
//! together, then runs until interrupted.
//!
//! # Startup Sequence
//!
//! 1. Load configuration from `homestead-config.yaml` (or defaults)
//! 2. Initialize structured logging (tracing)
//! 3. Connect the store (`Dragonfly` if configured, in-memory otherwise)
//! 4. Connect the notifier (NATS if configured, log-only otherwise)
//! 5. Seed or load the crop catalog
//! 6. Start the Updater and wait for Ctrl-C
//!
//! Teardown runs in reverse: stop the Updater, flush the notifier, then
//! disconnect the store.

mod error;
mod notifier;

use std::path::Path;
use std::sync::Arc;

use homestead_core::config::LoggingConfig;
use homestead_core::{Clock, FarmConfig, FarmContext, SystemClock, Updater};
use homestead_db::{DragonflyStore, MemoryStore, Store};
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::error::EngineError;
use crate::notifier::EngineNotifier;

/// Config file used when `HOMESTEAD_CONFIG` is unset.
const DEFAULT_CONFIG_PATH: &str = "homestead-config.yaml";

/// Application entry point for the engine.
///
/// # Errors
///
/// Returns an error if any startup step fails, or if teardown does.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 1. Load configuration.
    let (config, source) = load_config()?;

    // 2. Initialize structured logging.
    init_logging(&config.logging);
    info!(
        source = %source,
        sweep_interval_secs = config.updater.sweep_interval_secs,
        sweep_concurrency = config.updater.sweep_concurrency,
        crop_types = config.crop_types.len(),
        "homestead-engine starting"
    );

    // 3. Connect the store and run.
    let url = config.infrastructure.dragonfly_url.clone();
    if url.is_empty() {
        info!("no Dragonfly URL configured, using the in-memory store");
        run(MemoryStore::new(), &config).await?;
    } else {
        info!(dragonfly_url = %url, "connecting to Dragonfly");
        let store = DragonflyStore::connect(&url).await.map_err(EngineError::from)?;
        let result = run(store.clone(), &config).await;
        store.disconnect().await.map_err(EngineError::from)?;
        result?;
    }

    info!("homestead-engine shutdown complete");
    Ok(())
}

/// Everything after the store is connected, up to and including the
/// Updater's shutdown.
async fn run<S: Store>(store: S, config: &FarmConfig) -> Result<(), EngineError> {
    // 4. Connect the notifier.
    let notifier = EngineNotifier::from_config(
        &config.infrastructure.nats_url,
        &config.infrastructure.notification_subject,
    )
    .await?;

    // 5. Seed or load the crop catalog.
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let ctx = Arc::new(FarmContext::initialize(store, notifier, config, clock).await?);
    let names: Vec<&str> = ctx.catalog().iter().map(|t| t.name.as_str()).collect();
    info!(crop_types = ?names, "crop catalog ready");

    // 6. Start the Updater and wait for Ctrl-C.
    let updater = Updater::new(Arc::clone(&ctx), &config.updater);
    updater.start().await?;

    let signal = tokio::signal::ctrl_c().await;
    info!("shutdown requested");
    updater.stop().await?;
    ctx.notifier().flush().await;

    signal.map_err(|e| EngineError::Signal {
        message: format!("failed to listen for Ctrl-C: {e}"),
    })
}

/// Load configuration from `HOMESTEAD_CONFIG` or `homestead-config.yaml`.
///
/// A missing file means defaults; environment overrides apply either way.
/// Returns the config and a description of where it came from.
fn load_config() -> Result<(FarmConfig, String), EngineError> {
    let path = std::env::var("HOMESTEAD_CONFIG")
        .unwrap_or_else(|_err| DEFAULT_CONFIG_PATH.to_owned());
    let config_path = Path::new(&path);
    if config_path.exists() {
        Ok((FarmConfig::from_file(config_path)?, path))
    } else {
        Ok((FarmConfig::parse("")?, "defaults".to_owned()))
    }
}

/// Install the global tracing subscriber.
///
/// `RUST_LOG` wins over the configured level when set.
fn init_logging(config: &LoggingConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_err| EnvFilter::new(&config.level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true);
    if config.json {
        builder.json().init();
    } else {
        builder.init();
    }
}
