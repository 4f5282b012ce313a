//! Crop lifecycle: deadlines, the time-driven transition rule, and the
//! user-driven mutations (plant, water, harvest, tear up).
//!
//! [`reconcile`] is the only place phase advancement is computed. The
//! background sweep and every request path call it with their own "now",
//! so both always agree on what a crop's phase should be.
//!
//! ```text
//!   Growing ──(water due)──> NeedsWater ──(watered)──> Growing
//!      │                         │
//!      └──(mature)──> ReadyToHarvest <──(mature)──┘
//!                         NeedsWater ──(grace over)──> Withered
//! ```
//!
//! Rule order matters: maturity is checked before withering, so a crop that
//! reaches its maturity deadline is ready even if its watering lapsed.

use chrono::{DateTime, TimeDelta, Utc};
use rust_decimal::Decimal;

use homestead_types::{
    Crop, CropId, CropPhase, CropType, FarmerId, Notification, NotificationKind, Plot, Removal,
    RemovalKind,
};

use crate::error::FarmError;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Default seconds after the watering interval before a dry crop withers.
pub const DEFAULT_WITHER_GRACE_SECS: u64 = 600;

// ---------------------------------------------------------------------------
// CropAction
// ---------------------------------------------------------------------------

/// A user-driven operation on a crop, used in error reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CropAction {
    /// Planting a new crop on a plot.
    Plant,
    /// Watering a crop.
    Water,
    /// Harvesting a ready crop.
    Harvest,
    /// Tearing a crop out of its plot.
    TearUp,
}

impl core::fmt::Display for CropAction {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let label = match self {
            Self::Plant => "plant",
            Self::Water => "water",
            Self::Harvest => "harvest",
            Self::TearUp => "tear up",
        };
        f.write_str(label)
    }
}

// ---------------------------------------------------------------------------
// GrowthPolicy
// ---------------------------------------------------------------------------

/// Process-wide growth settings that crop types may override.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GrowthPolicy {
    default_wither_grace_secs: u64,
}

impl GrowthPolicy {
    /// Create a policy with the given default withering grace.
    pub const fn new(default_wither_grace_secs: u64) -> Self {
        Self {
            default_wither_grace_secs,
        }
    }

    /// The grace applied to crop types without their own override.
    pub const fn default_wither_grace_secs(&self) -> u64 {
        self.default_wither_grace_secs
    }

    /// The effective withering grace for `crop_type`.
    pub fn wither_grace_secs(&self, crop_type: &CropType) -> u64 {
        crop_type
            .wither_grace_secs
            .unwrap_or(self.default_wither_grace_secs)
    }
}

impl Default for GrowthPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_WITHER_GRACE_SECS)
    }
}

// ---------------------------------------------------------------------------
// Deadlines
// ---------------------------------------------------------------------------

/// The three instants that drive a crop's automatic transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Deadlines {
    /// Ready to harvest from this instant.
    pub mature_at: DateTime<Utc>,
    /// Needs water from this instant.
    pub water_due_at: DateTime<Utc>,
    /// Withers from this instant (the grace stacks after the interval).
    pub wither_at: DateTime<Utc>,
}

/// Add `secs` whole seconds to `at` with overflow checks.
fn offset(at: DateTime<Utc>, secs: u64) -> Result<DateTime<Utc>, FarmError> {
    let secs = i64::try_from(secs).map_err(|_err| FarmError::ArithmeticOverflow)?;
    let delta = TimeDelta::try_seconds(secs).ok_or(FarmError::ArithmeticOverflow)?;
    at.checked_add_signed(delta)
        .ok_or(FarmError::ArithmeticOverflow)
}

/// Compute the deadlines of `crop` under `policy`.
///
/// # Errors
///
/// Returns [`FarmError::ArithmeticOverflow`] if a deadline is out of range.
pub fn deadlines(
    crop: &Crop,
    crop_type: &CropType,
    policy: &GrowthPolicy,
) -> Result<Deadlines, FarmError> {
    let water_due_at = offset(crop.last_watered_at, crop_type.watering_interval_secs)?;
    let wither_at = offset(water_due_at, policy.wither_grace_secs(crop_type))?;
    Ok(Deadlines {
        mature_at: crop.mature_at,
        water_due_at,
        wither_at,
    })
}

// ---------------------------------------------------------------------------
// Reconciliation
// ---------------------------------------------------------------------------

/// The outcome of evaluating a crop against a point in time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reconciliation {
    /// The phase the crop should be in.
    pub phase: CropPhase,
    /// The reminder dedup flag the crop should carry.
    pub reminder_sent: bool,
    /// Events the farmer should hear about, in the order they occurred.
    pub events: Vec<NotificationKind>,
}

impl Reconciliation {
    fn unchanged(crop: &Crop) -> Self {
        Self {
            phase: crop.phase,
            reminder_sent: crop.reminder_sent,
            events: Vec::new(),
        }
    }

    /// Whether applying this reconciliation would modify `crop`.
    pub fn changes(&self, crop: &Crop) -> bool {
        self.phase != crop.phase || self.reminder_sent != crop.reminder_sent
    }

    /// Write the reconciled phase and flag into `crop`.
    pub const fn apply_to(&self, crop: &mut Crop) {
        crop.phase = self.phase;
        crop.reminder_sent = self.reminder_sent;
    }

    /// Build the notifications this reconciliation triggers for `crop`.
    pub fn notifications(&self, crop: &Crop, at: DateTime<Utc>) -> Vec<Notification> {
        self.events
            .iter()
            .map(|&kind| Notification {
                farmer: crop.farmer,
                kind,
                crop: crop.id,
                at,
            })
            .collect()
    }
}

/// Evaluate the transition rule for `crop` at `now`.
///
/// Pure: the crop is not modified, and calling it twice with the same
/// inputs gives the same result. Removed and terminal crops never change.
///
/// # Errors
///
/// Returns [`FarmError::ArithmeticOverflow`] if a deadline is out of range.
pub fn reconcile(
    crop: &Crop,
    crop_type: &CropType,
    policy: &GrowthPolicy,
    now: DateTime<Utc>,
) -> Result<Reconciliation, FarmError> {
    if crop.is_removed() || crop.phase.is_terminal() {
        return Ok(Reconciliation::unchanged(crop));
    }

    let deadlines = deadlines(crop, crop_type, policy)?;

    if now >= deadlines.mature_at {
        return Ok(Reconciliation {
            phase: CropPhase::ReadyToHarvest,
            reminder_sent: false,
            events: vec![NotificationKind::Ready],
        });
    }

    if now >= deadlines.wither_at {
        return Ok(Reconciliation {
            phase: CropPhase::Withered,
            reminder_sent: crop.reminder_sent,
            events: vec![NotificationKind::Withered],
        });
    }

    if now >= deadlines.water_due_at {
        let events = if crop.reminder_sent {
            Vec::new()
        } else {
            vec![NotificationKind::NeedsWater]
        };
        return Ok(Reconciliation {
            phase: CropPhase::NeedsWater,
            reminder_sent: true,
            events,
        });
    }

    Ok(Reconciliation {
        phase: CropPhase::Growing,
        reminder_sent: crop.reminder_sent,
        events: Vec::new(),
    })
}

// ---------------------------------------------------------------------------
// User-driven mutations
// ---------------------------------------------------------------------------

/// Check that `farmer` owns `plot`.
///
/// # Errors
///
/// Returns [`FarmError::NotOwner`] otherwise.
pub fn ensure_owner(plot: &Plot, farmer: FarmerId) -> Result<(), FarmError> {
    if plot.owner == farmer {
        Ok(())
    } else {
        Err(FarmError::NotOwner {
            farmer,
            plot: plot.id,
        })
    }
}

/// Create a new crop of `crop_type` on `plot`.
///
/// `occupant` is the crop the plot currently references, if it could be
/// loaded. A removed occupant does not block planting.
///
/// # Errors
///
/// Returns [`FarmError::NotOwner`] if `farmer` does not own the plot,
/// [`FarmError::PlotOccupied`] if a live crop is still planted there, or
/// [`FarmError::ArithmeticOverflow`] if the maturity deadline overflows.
pub fn plant(
    plot: &Plot,
    occupant: Option<&Crop>,
    crop_type: &CropType,
    farmer: FarmerId,
    now: DateTime<Utc>,
) -> Result<Crop, FarmError> {
    ensure_owner(plot, farmer)?;
    if let Some(existing) = occupant.filter(|c| !c.is_removed()) {
        return Err(FarmError::PlotOccupied {
            plot: plot.id,
            crop: existing.id,
        });
    }

    Ok(Crop {
        id: CropId::new(),
        crop_type: crop_type.id,
        plot: plot.id,
        farmer,
        planted_at: now,
        last_watered_at: now,
        mature_at: offset(now, crop_type.growth_secs)?,
        phase: CropPhase::Growing,
        reminder_sent: false,
        removal: None,
    })
}

fn ensure_not_removed(crop: &Crop) -> Result<(), FarmError> {
    if crop.is_removed() {
        Err(FarmError::AlreadyRemoved(crop.id))
    } else {
        Ok(())
    }
}

/// Water a reconciled crop, restarting its watering window.
///
/// # Errors
///
/// Returns [`FarmError::AlreadyRemoved`] for a removed crop, or
/// [`FarmError::InvalidPhase`] if the crop is ready or withered.
pub fn water(crop: &mut Crop, now: DateTime<Utc>) -> Result<(), FarmError> {
    ensure_not_removed(crop)?;
    if !crop.phase.accepts_water() {
        return Err(FarmError::InvalidPhase {
            crop: crop.id,
            phase: crop.phase,
            action: CropAction::Water,
        });
    }
    crop.last_watered_at = now;
    crop.phase = CropPhase::Growing;
    crop.reminder_sent = false;
    Ok(())
}

/// Harvest a reconciled crop and return the value owed to its farmer.
///
/// # Errors
///
/// Returns [`FarmError::AlreadyRemoved`] for a removed crop, or
/// [`FarmError::InvalidPhase`] unless the crop is ready to harvest.
pub fn harvest(
    crop: &mut Crop,
    crop_type: &CropType,
    now: DateTime<Utc>,
) -> Result<Decimal, FarmError> {
    ensure_not_removed(crop)?;
    if crop.phase != CropPhase::ReadyToHarvest {
        return Err(FarmError::InvalidPhase {
            crop: crop.id,
            phase: crop.phase,
            action: CropAction::Harvest,
        });
    }
    crop.removal = Some(Removal {
        kind: RemovalKind::Harvested,
        at: now,
    });
    Ok(crop_type.yield_value)
}

/// Tear a crop out of its plot without reward.
///
/// # Errors
///
/// Returns [`FarmError::AlreadyRemoved`] if the crop was already removed, or
/// [`FarmError::InvalidPhase`] if it is ready to harvest.
pub fn tear_up(crop: &mut Crop, now: DateTime<Utc>) -> Result<(), FarmError> {
    ensure_not_removed(crop)?;
    if crop.phase == CropPhase::ReadyToHarvest {
        return Err(FarmError::InvalidPhase {
            crop: crop.id,
            phase: crop.phase,
            action: CropAction::TearUp,
        });
    }
    crop.removal = Some(Removal {
        kind: RemovalKind::TornUp,
        at: now,
    });
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
