//! Runtime core of the Homestead simulation.
//!
//! Ties the pure lifecycle rules of `homestead-farm` to a [`Store`] and a
//! [`Notifier`]: user actions, read accessors, and the background
//! [`Updater`] sweep all go through [`FarmContext::settle`], so every path
//! applies the same transition rule and the same notification contract.
//!
//! # Modules
//!
//! - [`config`] -- YAML configuration with environment overrides
//! - [`clock`] -- System and manual time sources
//! - [`notifier`] -- The notification-trigger contract and local notifiers
//! - [`registry`] -- Crop catalog seeding
//! - [`context`] -- The shared [`FarmContext`]
//! - [`actions`] -- Plant, water, harvest, tear-up, and read accessors
//! - [`updater`] -- The periodic sweep and its scheduler
//!
//! [`Store`]: homestead_db::Store

pub mod actions;
pub mod clock;
pub mod config;
pub mod context;
pub mod notifier;
pub mod registry;
pub mod updater;

#[cfg(test)]
mod testing;

// Re-export primary types for convenience.
pub use actions::{ActionError, CropView, HarvestOutcome, PlotView, Settled};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{ConfigError, FarmConfig};
pub use context::FarmContext;
pub use notifier::{ChannelNotifier, LogNotifier, Notifier, NotifyError};
pub use registry::{RegistryError, ensure_initial_data};
pub use updater::{SweepSummary, Updater, UpdaterError, run_sweep};
