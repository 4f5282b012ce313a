//! Error types for the data layer.
//!
//! All errors are propagated via [`DbError`]. `NotFound` and `Conflict` are
//! part of the store contract and callers branch on them; the remaining
//! variants wrap backend failures.

/// Errors that can occur in the data layer.
#[derive(Debug, thiserror::Error)]
pub enum DbError {
    /// No record exists for the requested id.
    #[error("{kind} {id} not found")]
    NotFound {
        /// Entity kind (e.g. `crop`).
        kind: &'static str,
        /// The missing id.
        id: String,
    },

    /// A conditional write lost a race: the stored revision moved on.
    #[error("{kind} {id} was modified concurrently (expected revision {expected})")]
    Conflict {
        /// Entity kind.
        kind: &'static str,
        /// The contested id.
        id: String,
        /// The revision the writer read.
        expected: u64,
    },

    /// A `Dragonfly`/Redis operation failed.
    #[error("Dragonfly error: {0}")]
    Dragonfly(#[from] fred::error::Error),

    /// A serialization or deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Stored data is inconsistent (e.g. an index points at a missing key).
    #[error("Corrupt store data: {0}")]
    Corrupt(String),

    /// A configuration error.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl DbError {
    /// Whether this is a missing-record error.
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Whether this is a lost compare-and-swap.
    pub const fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }
}
