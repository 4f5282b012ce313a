//! Enumeration types for the Homestead simulation.

use serde::{Deserialize, Serialize};
use ts_rs::TS;

// ---------------------------------------------------------------------------
// Crop lifecycle
// ---------------------------------------------------------------------------

/// Lifecycle phase of a planted crop.
///
/// `Growing` and `NeedsWater` may alternate any number of times. Both
/// `ReadyToHarvest` and `Withered` are terminal: no automatic transition
/// leaves them, only harvest or tear-up removes the crop from its plot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub enum CropPhase {
    /// Watered recently enough and not yet mature.
    Growing,
    /// Past its watering interval but still inside the withering grace.
    NeedsWater,
    /// Mature and waiting for its owner to harvest it.
    ReadyToHarvest,
    /// Neglected past its grace period. Can only be torn up.
    Withered,
}

impl CropPhase {
    /// Whether no further automatic transition can happen from this phase.
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::ReadyToHarvest | Self::Withered)
    }

    /// Whether watering has any effect in this phase.
    pub const fn accepts_water(self) -> bool {
        matches!(self, Self::Growing | Self::NeedsWater)
    }
}

impl core::fmt::Display for CropPhase {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let label = match self {
            Self::Growing => "growing",
            Self::NeedsWater => "needs_water",
            Self::ReadyToHarvest => "ready_to_harvest",
            Self::Withered => "withered",
        };
        f.write_str(label)
    }
}

/// How a crop left its plot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub enum RemovalKind {
    /// Harvested for its yield.
    Harvested,
    /// Torn up by its owner without reward.
    TornUp,
}

// ---------------------------------------------------------------------------
// Notifications
// ---------------------------------------------------------------------------

/// The lifecycle event a farmer is notified about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[serde(rename_all = "snake_case")]
#[ts(export, export_to = "bindings/")]
pub enum NotificationKind {
    /// The crop matured and can be harvested.
    Ready,
    /// The crop withered from lack of water.
    Withered,
    /// The crop is past its watering interval.
    NeedsWater,
}

impl NotificationKind {
    /// Stable lowercase label, also used as a message subject segment.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Ready => "ready",
            Self::Withered => "withered",
            Self::NeedsWater => "needs_water",
        }
    }
}
