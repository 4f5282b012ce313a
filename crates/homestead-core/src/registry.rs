//! Crop type registry seeding.
//!
//! The catalog is written once, the first time a process starts against an
//! empty store, and loaded from the store on every start after that.

use tracing::info;

use homestead_db::{Criteria, DbError, Record, Store};
use homestead_farm::{CropCatalog, CropTypeSeed, FarmError, validate_seeds};
use homestead_types::CropType;

/// Errors raised while seeding or loading the crop catalog.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    /// The seed list failed validation.
    #[error(transparent)]
    Seed(#[from] FarmError),

    /// The store could not be read or written.
    #[error("crop catalog store error: {0}")]
    Store(#[from] DbError),
}

/// Persist `seeds` if no crop types exist yet, then return the catalog.
///
/// Idempotent: when the store already holds crop types the seeds are only
/// validated, never written, and the stored catalog wins.
///
/// # Errors
///
/// Returns [`RegistryError::Seed`] for an invalid seed list and
/// [`RegistryError::Store`] if the store fails.
pub async fn ensure_initial_data<S: Store>(
    store: &S,
    seeds: &[CropTypeSeed],
) -> Result<CropCatalog, RegistryError> {
    validate_seeds(seeds)?;

    let existing: Vec<Record<CropType>> = store.query(Criteria::All).await?;
    if !existing.is_empty() {
        info!(count = existing.len(), "crop catalog loaded from store");
        return Ok(CropCatalog::from_types(
            existing.into_iter().map(|record| record.entity),
        ));
    }

    let mut created = Vec::with_capacity(seeds.len());
    for seed in seeds {
        let saved = store.save(Record::new(seed.clone().into_crop_type())).await?;
        created.push(saved.entity);
    }
    info!(count = created.len(), "crop catalog seeded");
    Ok(CropCatalog::from_types(created))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use homestead_db::MemoryStore;
    use homestead_farm::default_seeds;

    use super::*;

    #[tokio::test]
    async fn seeds_an_empty_store_once() {
        let store = MemoryStore::new();
        let first = ensure_initial_data(&store, &default_seeds()).await.unwrap();
        assert_eq!(first.len(), default_seeds().len());

        let second = ensure_initial_data(&store, &default_seeds()).await.unwrap();
        let first_ids: Vec<_> = first.iter().map(|t| t.id).collect();
        let second_ids: Vec<_> = second.iter().map(|t| t.id).collect();
        assert_eq!(first_ids, second_ids);
        assert_eq!(store.len().await, default_seeds().len());
    }

    #[tokio::test]
    async fn stored_catalog_wins_over_new_seeds() {
        let store = MemoryStore::new();
        ensure_initial_data(&store, &default_seeds()).await.unwrap();

        let mut fewer = default_seeds();
        fewer.truncate(1);
        let catalog = ensure_initial_data(&store, &fewer).await.unwrap();
        assert_eq!(catalog.len(), default_seeds().len());
        assert!(catalog.by_name("Carrot").is_some());
    }

    #[tokio::test]
    async fn invalid_seeds_are_rejected_before_writing() {
        let store = MemoryStore::new();
        let mut seeds = default_seeds();
        seeds.push(seeds.first().unwrap().clone());

        let err = ensure_initial_data(&store, &seeds).await.unwrap_err();
        assert!(matches!(err, RegistryError::Seed(FarmError::InvalidSeed { .. })));
        assert!(store.is_empty().await);
    }
}
