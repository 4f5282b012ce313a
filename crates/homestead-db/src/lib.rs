//! Data layer for the Homestead simulation.
//!
//! The simulation core depends only on the [`Store`] contract: `get` by id,
//! compare-and-swap `save`, and `query` by [`Criteria`]. Two backends are
//! provided.
//!
//! # Architecture
//!
//! ```text
//! Actions / Updater sweep
//!     |
//!     +-- get / save / query --> Store
//!                                  |-- MemoryStore     (in-process map)
//!                                  +-- DragonflyStore  (Lua CAS + index sets)
//! ```
//!
//! # Modules
//!
//! - [`entity`] -- [`Entity`] trait, revisioned [`Record`], [`Criteria`]
//! - [`store`] -- The [`Store`] trait and optimistic retry helper
//! - [`memory`] -- In-memory backend
//! - [`dragonfly`] -- `Dragonfly` (Redis-compatible) backend
//! - [`error`] -- Shared error types

pub mod dragonfly;
pub mod entity;
pub mod error;
pub mod memory;
pub mod store;

// Re-export primary types for convenience.
pub use dragonfly::DragonflyStore;
pub use entity::{Criteria, Entity, Record};
pub use error::DbError;
pub use memory::MemoryStore;
pub use store::{Store, update_with_retry};
