//! The process-wide farm context.
//!
//! A [`FarmContext`] bundles everything the lifecycle needs at runtime: the
//! store, the notifier, the loaded crop catalog, the growth policy, and the
//! clock. It is built once at startup and shared (behind an `Arc`) between
//! the request path and the [`Updater`](crate::Updater).

use std::sync::Arc;

use chrono::{DateTime, Utc};

use homestead_db::Store;
use homestead_farm::{CropCatalog, GrowthPolicy};

use crate::clock::Clock;
use crate::config::FarmConfig;
use crate::notifier::Notifier;
use crate::registry::{RegistryError, ensure_initial_data};

/// Default attempts for follow-up writes when none is configured.
const DEFAULT_WRITE_ATTEMPTS: u32 = 5;

/// Shared runtime state for actions and sweeps.
pub struct FarmContext<S, N> {
    store: S,
    notifier: N,
    catalog: CropCatalog,
    policy: GrowthPolicy,
    clock: Arc<dyn Clock>,
    write_attempts: u32,
}

impl<S: Store, N: Notifier> FarmContext<S, N> {
    /// Assemble a context from already-loaded parts.
    pub fn new(
        store: S,
        notifier: N,
        catalog: CropCatalog,
        policy: GrowthPolicy,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            notifier,
            catalog,
            policy,
            clock,
            write_attempts: DEFAULT_WRITE_ATTEMPTS,
        }
    }

    /// Seed the crop catalog if needed and build the context from `config`.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError`] if the seeds are invalid or the store fails.
    pub async fn initialize(
        store: S,
        notifier: N,
        config: &FarmConfig,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, RegistryError> {
        let catalog = ensure_initial_data(&store, &config.crop_types).await?;
        Ok(Self::new(store, notifier, catalog, config.growth_policy(), clock)
            .with_write_attempts(config.actions.write_attempts))
    }

    /// Override how many times follow-up writes retry on conflict.
    #[must_use]
    pub fn with_write_attempts(mut self, attempts: u32) -> Self {
        self.write_attempts = attempts.max(1);
        self
    }

    /// The backing store.
    pub const fn store(&self) -> &S {
        &self.store
    }

    /// The notifier transitions are reported to.
    pub const fn notifier(&self) -> &N {
        &self.notifier
    }

    /// The read-only crop catalog.
    pub const fn catalog(&self) -> &CropCatalog {
        &self.catalog
    }

    /// The growth policy in force.
    pub const fn policy(&self) -> &GrowthPolicy {
        &self.policy
    }

    /// Attempts for retried follow-up writes.
    pub const fn write_attempts(&self) -> u32 {
        self.write_attempts
    }

    /// The current time according to the context's clock.
    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }
}
