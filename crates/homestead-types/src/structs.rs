//! Core entity structs: crop types, plots, crops, farmers, notifications.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::enums::{CropPhase, NotificationKind, RemovalKind};
use crate::ids::{CropId, CropTypeId, FarmerId, PlotId};

// ---------------------------------------------------------------------------
// CropType
// ---------------------------------------------------------------------------

/// Immutable species definition from the crop catalog.
///
/// Durations are whole seconds. `wither_grace_secs` is optional; when absent
/// the configured default grace applies.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct CropType {
    /// Catalog identifier.
    pub id: CropTypeId,
    /// Display name, unique within the catalog.
    pub name: String,
    /// Seconds from planting until the crop is ready to harvest.
    pub growth_secs: u64,
    /// Seconds a crop tolerates without water before it needs watering.
    pub watering_interval_secs: u64,
    /// Extra seconds after the watering interval before the crop withers.
    pub wither_grace_secs: Option<u64>,
    /// Balance credited to the farmer on harvest.
    #[ts(as = "String")]
    pub yield_value: Decimal,
}

// ---------------------------------------------------------------------------
// Plot
// ---------------------------------------------------------------------------

/// A unit of ownable land hosting at most one crop.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct Plot {
    /// Plot identifier.
    pub id: PlotId,
    /// The farmer who owns this plot.
    pub owner: FarmerId,
    /// The crop currently planted here, if any.
    pub crop: Option<CropId>,
    /// When the plot was granted to its owner.
    pub created_at: DateTime<Utc>,
}

impl Plot {
    /// Create an empty plot owned by `owner`.
    pub fn new(owner: FarmerId, now: DateTime<Utc>) -> Self {
        Self {
            id: PlotId::new(),
            owner,
            crop: None,
            created_at: now,
        }
    }
}

// ---------------------------------------------------------------------------
// Crop
// ---------------------------------------------------------------------------

/// Marker recorded when a crop leaves its plot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct Removal {
    /// Harvest or tear-up.
    pub kind: RemovalKind,
    /// When the crop was removed.
    pub at: DateTime<Utc>,
}

/// A planted instance of a [`CropType`].
///
/// The maturity deadline is fixed at planting. The withering deadline moves
/// forward every time the crop is watered, so it is derived on demand from
/// `last_watered_at` rather than stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct Crop {
    /// Crop identifier.
    pub id: CropId,
    /// Species of this crop.
    pub crop_type: CropTypeId,
    /// Plot hosting the crop.
    pub plot: PlotId,
    /// Owner of the hosting plot at planting time.
    pub farmer: FarmerId,
    /// When the crop was planted.
    pub planted_at: DateTime<Utc>,
    /// When the crop was last watered (planting counts as watering).
    pub last_watered_at: DateTime<Utc>,
    /// When the crop becomes ready to harvest.
    pub mature_at: DateTime<Utc>,
    /// Current lifecycle phase.
    pub phase: CropPhase,
    /// Whether a needs-water reminder already went out for the current
    /// watering window.
    pub reminder_sent: bool,
    /// Set once the crop is harvested or torn up.
    pub removal: Option<Removal>,
}

impl Crop {
    /// Whether the crop has been harvested or torn up.
    pub const fn is_removed(&self) -> bool {
        self.removal.is_some()
    }

    /// Whether the sweep still has work to do on this crop.
    pub const fn is_active(&self) -> bool {
        self.removal.is_none() && !self.phase.is_terminal()
    }
}

// ---------------------------------------------------------------------------
// Farmer
// ---------------------------------------------------------------------------

/// An account that owns plots and receives notifications.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct Farmer {
    /// Farmer identifier.
    pub id: FarmerId,
    /// Display name.
    pub name: String,
    /// Accumulated harvest value.
    #[ts(as = "String")]
    pub balance: Decimal,
    /// When the account was registered.
    pub created_at: DateTime<Utc>,
}

impl Farmer {
    /// Create a farmer with a zero balance.
    pub fn new(name: &str, now: DateTime<Utc>) -> Self {
        Self {
            id: FarmerId::new(),
            name: name.to_owned(),
            balance: Decimal::ZERO,
            created_at: now,
        }
    }
}

// ---------------------------------------------------------------------------
// Notification
// ---------------------------------------------------------------------------

/// A request to alert a farmer about a crop lifecycle event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct Notification {
    /// Recipient.
    pub farmer: FarmerId,
    /// What happened.
    pub kind: NotificationKind,
    /// The crop it happened to.
    pub crop: CropId,
    /// The reconciliation time that produced the event.
    pub at: DateTime<Utc>,
}
