//! Error types for the `homestead-farm` crate.
//!
//! All fallible operations in this crate return [`FarmError`].

use homestead_types::{CropId, CropPhase, CropTypeId, FarmerId, PlotId};

use crate::lifecycle::CropAction;

/// Errors raised by catalog lookups and lifecycle rules.
#[derive(Debug, thiserror::Error)]
pub enum FarmError {
    /// A crop type was not found in the catalog.
    #[error("crop type not found: {0}")]
    CropTypeNotFound(CropTypeId),

    /// The actor does not own the plot.
    #[error("farmer {farmer} does not own plot {plot}")]
    NotOwner {
        /// The requesting farmer.
        farmer: FarmerId,
        /// The plot they tried to act on.
        plot: PlotId,
    },

    /// The crop's phase does not allow the requested action.
    #[error("cannot {action} crop {crop} while it is {phase}")]
    InvalidPhase {
        /// The crop.
        crop: CropId,
        /// Its reconciled phase.
        phase: CropPhase,
        /// The rejected action.
        action: CropAction,
    },

    /// The crop was already harvested or torn up.
    #[error("crop {0} has already been removed from its plot")]
    AlreadyRemoved(CropId),

    /// The plot already hosts a live crop.
    #[error("plot {plot} already hosts crop {crop}")]
    PlotOccupied {
        /// The plot.
        plot: PlotId,
        /// The crop occupying it.
        crop: CropId,
    },

    /// A crop type seed failed validation.
    #[error("invalid crop type seed {name:?}: {reason}")]
    InvalidSeed {
        /// Seed name.
        name: String,
        /// What is wrong with it.
        reason: String,
    },

    /// Arithmetic overflow during a deadline or balance calculation.
    #[error("arithmetic overflow in farm calculation")]
    ArithmeticOverflow,
}
