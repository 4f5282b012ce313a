//! The crop type catalog: seed definitions and the read-only lookup table.
//!
//! Seeds come from configuration (or [`default_seeds`]) and are persisted
//! once, the first time the process starts against an empty store. After
//! that the catalog is loaded from the store and never mutated, so it can be
//! shared across tasks without locking.

use std::collections::{BTreeMap, BTreeSet};

use rust_decimal::Decimal;
use serde::Deserialize;

use homestead_types::{CropType, CropTypeId};

use crate::error::FarmError;

// ---------------------------------------------------------------------------
// Seeds
// ---------------------------------------------------------------------------

/// A crop species definition as written in configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CropTypeSeed {
    /// Display name, unique across seeds.
    pub name: String,
    /// Seconds from planting to maturity.
    pub growth_secs: u64,
    /// Seconds a crop tolerates without water.
    pub watering_interval_secs: u64,
    /// Per-species grace override; `None` uses the configured default.
    #[serde(default)]
    pub wither_grace_secs: Option<u64>,
    /// Value credited on harvest.
    pub yield_value: Decimal,
}

impl CropTypeSeed {
    /// Turn the seed into a catalog entry with a fresh identifier.
    pub fn into_crop_type(self) -> CropType {
        CropType {
            id: CropTypeId::new(),
            name: self.name,
            growth_secs: self.growth_secs,
            watering_interval_secs: self.watering_interval_secs,
            wither_grace_secs: self.wither_grace_secs,
            yield_value: self.yield_value,
        }
    }
}

/// The built-in seed list used when configuration does not provide one.
pub fn default_seeds() -> Vec<CropTypeSeed> {
    vec![
        CropTypeSeed {
            name: "Carrot".to_owned(),
            growth_secs: 3_600,
            watering_interval_secs: 1_200,
            wither_grace_secs: None,
            yield_value: Decimal::new(15, 0),
        },
        CropTypeSeed {
            name: "Potato".to_owned(),
            growth_secs: 7_200,
            watering_interval_secs: 1_800,
            wither_grace_secs: None,
            yield_value: Decimal::new(25, 0),
        },
        CropTypeSeed {
            name: "Tomato".to_owned(),
            growth_secs: 14_400,
            watering_interval_secs: 2_400,
            wither_grace_secs: Some(1_200),
            yield_value: Decimal::new(60, 0),
        },
        CropTypeSeed {
            name: "Pumpkin".to_owned(),
            growth_secs: 43_200,
            watering_interval_secs: 7_200,
            wither_grace_secs: Some(3_600),
            yield_value: Decimal::new(250, 0),
        },
    ]
}

/// Check a seed list before it is persisted.
///
/// Every seed needs a non-empty unique name, a non-zero growth duration and
/// watering interval, and a non-negative yield.
///
/// # Errors
///
/// Returns [`FarmError::InvalidSeed`] naming the first offending seed.
pub fn validate_seeds(seeds: &[CropTypeSeed]) -> Result<(), FarmError> {
    let mut names = BTreeSet::new();
    for seed in seeds {
        let invalid = |reason: &str| FarmError::InvalidSeed {
            name: seed.name.clone(),
            reason: reason.to_owned(),
        };
        if seed.name.trim().is_empty() {
            return Err(invalid("name must not be empty"));
        }
        if seed.growth_secs == 0 {
            return Err(invalid("growth_secs must be at least 1"));
        }
        if seed.watering_interval_secs == 0 {
            return Err(invalid("watering_interval_secs must be at least 1"));
        }
        if seed.yield_value.is_sign_negative() {
            return Err(invalid("yield_value must not be negative"));
        }
        if !names.insert(seed.name.to_lowercase()) {
            return Err(invalid("duplicate name"));
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// CropCatalog
// ---------------------------------------------------------------------------

/// Read-only lookup table of crop species keyed by identifier.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CropCatalog {
    types: BTreeMap<CropTypeId, CropType>,
}

impl CropCatalog {
    /// Build a catalog from loaded crop types.
    pub fn from_types(types: impl IntoIterator<Item = CropType>) -> Self {
        Self {
            types: types.into_iter().map(|t| (t.id, t)).collect(),
        }
    }

    /// Look up a crop type by identifier.
    ///
    /// # Errors
    ///
    /// Returns [`FarmError::CropTypeNotFound`] if the id is not cataloged.
    pub fn get(&self, id: CropTypeId) -> Result<&CropType, FarmError> {
        self.types.get(&id).ok_or(FarmError::CropTypeNotFound(id))
    }

    /// Look up a crop type by display name, ignoring case.
    pub fn by_name(&self, name: &str) -> Option<&CropType> {
        self.types
            .values()
            .find(|t| t.name.eq_ignore_ascii_case(name))
    }

    /// Iterate over all crop types in identifier order.
    pub fn iter(&self) -> impl Iterator<Item = &CropType> {
        self.types.values()
    }

    /// Number of cataloged species.
    pub fn len(&self) -> usize {
        self.types.len()
    }

    /// Whether the catalog has no species.
    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }
}
