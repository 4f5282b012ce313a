//! Persisted entities, revisioned records, and query criteria.
//!
//! Every stored value is wrapped in a [`Record`] carrying the revision the
//! store assigned on its last write. Saving a record is a compare-and-swap
//! on that revision: a writer holding a stale copy gets
//! [`DbError::Conflict`](crate::DbError::Conflict) instead of silently
//! overwriting a newer state.

use core::fmt::Display;

use serde::Serialize;
use serde::de::DeserializeOwned;

use homestead_types::{Crop, CropId, CropType, CropTypeId, Farmer, FarmerId, Plot, PlotId};

/// A type the store knows how to key, index, and serialize.
pub trait Entity: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    /// Strongly-typed identifier.
    type Id: Copy + Ord + Display + Send + Sync + 'static;

    /// Key namespace, e.g. `crop`.
    const KIND: &'static str;

    /// This entity's identifier.
    fn id(&self) -> Self::Id;

    /// Farmer this entity belongs to, for [`Criteria::OwnedBy`].
    fn owner(&self) -> Option<FarmerId> {
        None
    }

    /// Whether this entity matches [`Criteria::Active`].
    fn is_active(&self) -> bool {
        true
    }
}

impl Entity for CropType {
    type Id = CropTypeId;
    const KIND: &'static str = "crop_type";

    fn id(&self) -> CropTypeId {
        self.id
    }
}

impl Entity for Farmer {
    type Id = FarmerId;
    const KIND: &'static str = "farmer";

    fn id(&self) -> FarmerId {
        self.id
    }
}

impl Entity for Plot {
    type Id = PlotId;
    const KIND: &'static str = "plot";

    fn id(&self) -> PlotId {
        self.id
    }

    fn owner(&self) -> Option<FarmerId> {
        Some(self.owner)
    }
}

impl Entity for Crop {
    type Id = CropId;
    const KIND: &'static str = "crop";

    fn id(&self) -> CropId {
        self.id
    }

    fn owner(&self) -> Option<FarmerId> {
        Some(self.farmer)
    }

    /// Crops leave the active set once terminal or removed.
    fn is_active(&self) -> bool {
        Crop::is_active(self)
    }
}

/// An entity together with the store revision it was read at.
///
/// Revision `0` means "never persisted"; the first successful save moves it
/// to `1`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record<E> {
    /// Revision the entity was read at (or `0` if new).
    pub revision: u64,
    /// The entity value.
    pub entity: E,
}

impl<E: Entity> Record<E> {
    /// Wrap a not-yet-persisted entity.
    pub const fn new(entity: E) -> Self {
        Self {
            revision: 0,
            entity,
        }
    }

    /// The wrapped entity's id.
    pub fn id(&self) -> E::Id {
        self.entity.id()
    }

    /// Whether this record has never been saved.
    pub const fn is_new(&self) -> bool {
        self.revision == 0
    }
}

/// Which records a query returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Criteria {
    /// Every record of the kind.
    All,
    /// Records whose [`Entity::is_active`] was true at their last save.
    Active,
    /// Records whose [`Entity::owner`] is the given farmer.
    OwnedBy(FarmerId),
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::Utc;
    use homestead_types::{CropPhase, Removal, RemovalKind};

    use super::*;

    fn crop() -> Crop {
        let now = Utc::now();
        Crop {
            id: CropId::new(),
            crop_type: CropTypeId::new(),
            plot: PlotId::new(),
            farmer: FarmerId::new(),
            planted_at: now,
            last_watered_at: now,
            mature_at: now,
            phase: CropPhase::Growing,
            reminder_sent: false,
            removal: None,
        }
    }

    #[test]
    fn new_record_has_revision_zero() {
        let record = Record::new(crop());
        assert!(record.is_new());
        assert_eq!(record.id(), record.entity.id);
    }

    #[test]
    fn crop_activity_follows_phase_and_removal() {
        let mut c = crop();
        assert!(Entity::is_active(&c));
        c.phase = CropPhase::Withered;
        assert!(!Entity::is_active(&c));
        c.phase = CropPhase::NeedsWater;
        c.removal = Some(Removal {
            kind: RemovalKind::Harvested,
            at: Utc::now(),
        });
        assert!(!Entity::is_active(&c));
    }

    #[test]
    fn owners_are_indexed_for_plots_and_crops() {
        let c = crop();
        assert_eq!(c.owner(), Some(c.farmer));
        let plot = Plot::new(FarmerId::new(), Utc::now());
        assert_eq!(plot.owner(), Some(plot.owner));
        let farmer = Farmer::new("Bo", Utc::now());
        assert_eq!(Entity::owner(&farmer), None);
    }
}
