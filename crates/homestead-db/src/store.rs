//! The persistence contract consumed by the simulation core.
//!
//! The core only ever calls [`Store::get`], [`Store::save`], and
//! [`Store::query`]. Whatever sits behind them (a map in memory, a
//! `Dragonfly` instance) is invisible to the lifecycle rules.

use core::future::Future;

use crate::entity::{Criteria, Entity, Record};
use crate::error::DbError;

/// A key-value store with compare-and-swap writes.
pub trait Store: Send + Sync + 'static {
    /// Load the current record for `id`.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::NotFound`] if no record exists.
    fn get<E: Entity>(&self, id: E::Id) -> impl Future<Output = Result<Record<E>, DbError>> + Send;

    /// Write `record` if the stored revision still equals `record.revision`.
    ///
    /// A record with revision `0` is only written if nothing is stored
    /// under its id. On success the returned record carries the new
    /// revision.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Conflict`] if the stored revision differs.
    fn save<E: Entity>(
        &self,
        record: Record<E>,
    ) -> impl Future<Output = Result<Record<E>, DbError>> + Send;

    /// Load every record of kind `E` matching `criteria`.
    ///
    /// # Errors
    ///
    /// Returns a backend error if the lookup itself fails.
    fn query<E: Entity>(
        &self,
        criteria: Criteria,
    ) -> impl Future<Output = Result<Vec<Record<E>>, DbError>> + Send;
}

/// Read-modify-write `id` with optimistic retries.
///
/// `apply` is called on a freshly read entity each attempt. If it returns an
/// error, that error is returned without writing. Conflicts are retried up
/// to `attempts` times in total; the last conflict is returned if every
/// attempt loses.
///
/// # Errors
///
/// Returns the error from `apply`, or the store error from the last
/// attempt.
pub async fn update_with_retry<S, E, F, Err>(
    store: &S,
    id: E::Id,
    attempts: u32,
    mut apply: F,
) -> Result<Record<E>, Err>
where
    S: Store,
    E: Entity,
    F: FnMut(&mut E) -> Result<(), Err> + Send,
    Err: From<DbError>,
{
    let mut remaining = attempts.max(1);
    loop {
        let mut record = store.get::<E>(id).await?;
        apply(&mut record.entity)?;
        match store.save(record).await {
            Ok(saved) => return Ok(saved),
            Err(err) if err.is_conflict() && remaining > 1 => {
                remaining = remaining.saturating_sub(1);
                tracing::debug!(kind = E::KIND, %id, remaining, "retrying after write conflict");
            }
            Err(err) => return Err(err.into()),
        }
    }
}
