//! Crop catalog and crop lifecycle rules for the Homestead simulation.
//!
//! This crate holds the pure domain logic: it never touches storage or the
//! clock. Callers load entities, pass in "now", and persist what comes back.
//!
//! # Modules
//!
//! - [`catalog`] -- Crop type seeds, seed validation, and the read-only
//!   [`CropCatalog`].
//! - [`error`] -- Error types for catalog lookups and lifecycle rules.
//! - [`lifecycle`] -- Deadlines, the [`reconcile`] transition rule, and the
//!   plant/water/harvest/tear-up mutations.

pub mod catalog;
pub mod error;
pub mod lifecycle;

// Re-export primary types at crate root.
pub use catalog::{CropCatalog, CropTypeSeed, default_seeds, validate_seeds};
pub use error::FarmError;
pub use lifecycle::{
    CropAction, DEFAULT_WITHER_GRACE_SECS, Deadlines, GrowthPolicy, Reconciliation, deadlines,
    reconcile,
};
