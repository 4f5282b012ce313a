//! Shared type definitions for the Homestead farming simulation.
//!
//! This crate is the single source of truth for entity types used across
//! the workspace. Types flow downstream to `TypeScript` via `ts-rs` for the
//! view layer.
//!
//! # Modules
//!
//! - [`ids`] -- Type-safe UUID wrappers for all entity identifiers
//! - [`enums`] -- Crop phases, removal kinds, notification kinds
//! - [`structs`] -- Crop types, plots, crops, farmers, notifications

pub mod enums;
pub mod ids;
pub mod structs;

// Re-export all public types at crate root for convenience.
pub use enums::{CropPhase, NotificationKind, RemovalKind};
pub use ids::{CropId, CropTypeId, FarmerId, PlotId};
pub use structs::{Crop, CropType, Farmer, Notification, Plot, Removal};

#[cfg(test)]
mod tests {
    //! `TypeScript` binding generation.

    #[test]
    fn export_bindings() {
        // ts-rs writes bindings for every type with #[ts(export)] into
        // `bindings/` relative to the crate root.
        use ts_rs::TS;

        // IDs
        let _ = crate::ids::FarmerId::export_all();
        let _ = crate::ids::PlotId::export_all();
        let _ = crate::ids::CropId::export_all();
        let _ = crate::ids::CropTypeId::export_all();

        // Enums
        let _ = crate::enums::CropPhase::export_all();
        let _ = crate::enums::RemovalKind::export_all();
        let _ = crate::enums::NotificationKind::export_all();

        // Structs
        let _ = crate::structs::CropType::export_all();
        let _ = crate::structs::Plot::export_all();
        let _ = crate::structs::Removal::export_all();
        let _ = crate::structs::Crop::export_all();
        let _ = crate::structs::Farmer::export_all();
        let _ = crate::structs::Notification::export_all();
    }
}
