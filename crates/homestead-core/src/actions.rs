//! User-facing farm actions and read accessors.
//!
//! Every action re-reads the plot and crop it touches, reconciles the crop
//! against "now" (persisting and notifying any automatic transition it
//! finds), and only then applies the requested mutation with a
//! compare-and-swap write. Watering is the exception for a due reminder:
//! the watering itself supersedes it in the same write. A write that loses
//! a race with the Updater or another request surfaces as
//! [`ActionError::Conflict`].

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tracing::{debug, info, warn};

use homestead_db::{Criteria, DbError, Record, Store, update_with_retry};
use homestead_farm::lifecycle::{self, ensure_owner};
use homestead_farm::{Deadlines, FarmError, deadlines, reconcile};
use homestead_types::{Crop, CropId, CropTypeId, Farmer, FarmerId, Notification, Plot, PlotId};

use crate::context::FarmContext;
use crate::notifier::Notifier;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors surfaced by user actions.
#[derive(Debug, thiserror::Error)]
pub enum ActionError {
    /// The referenced farmer, plot, crop, or crop type does not exist.
    #[error("{kind} {id} not found")]
    NotFound {
        /// Entity kind.
        kind: &'static str,
        /// The missing id.
        id: String,
    },

    /// The crop or plot is not in a state that allows the action.
    #[error("invalid state: {0}")]
    InvalidState(#[source] FarmError),

    /// The requester does not own the plot.
    #[error("farmer {farmer} does not own plot {plot}")]
    Ownership {
        /// The requesting farmer.
        farmer: FarmerId,
        /// The plot they tried to act on.
        plot: PlotId,
    },

    /// Another writer changed the record first. Re-read and retry.
    #[error("{kind} {id} was modified concurrently")]
    Conflict {
        /// Entity kind.
        kind: &'static str,
        /// The contested id.
        id: String,
    },

    /// Request input was rejected before touching the store.
    #[error("invalid input: {reason}")]
    InvalidInput {
        /// What is wrong with it.
        reason: String,
    },

    /// A deadline or balance calculation overflowed.
    #[error("calculation failed: {0}")]
    Calculation(#[source] FarmError),

    /// The store failed for a reason unrelated to the request.
    #[error("store error: {0}")]
    Store(#[source] DbError),
}

impl From<DbError> for ActionError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::NotFound { kind, id } => Self::NotFound { kind, id },
            DbError::Conflict { kind, id, .. } => Self::Conflict { kind, id },
            other => Self::Store(other),
        }
    }
}

impl From<FarmError> for ActionError {
    fn from(err: FarmError) -> Self {
        match err {
            FarmError::CropTypeNotFound(id) => Self::NotFound {
                kind: "crop_type",
                id: id.to_string(),
            },
            FarmError::NotOwner { farmer, plot } => Self::Ownership { farmer, plot },
            err @ (FarmError::InvalidPhase { .. }
            | FarmError::AlreadyRemoved(_)
            | FarmError::PlotOccupied { .. }) => Self::InvalidState(err),
            err @ (FarmError::ArithmeticOverflow | FarmError::InvalidSeed { .. }) => {
                Self::Calculation(err)
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Results
// ---------------------------------------------------------------------------

/// The outcome of reconciling one crop record against "now".
#[derive(Debug, Clone)]
pub struct Settled {
    /// The record as it now stands in the store.
    pub record: Record<Crop>,
    /// Whether a transition was persisted.
    pub transitioned: bool,
    /// Notifications accepted by the notifier.
    pub notifications_sent: usize,
    /// Notifications the notifier rejected.
    pub notification_failures: usize,
}

impl Settled {
    const fn unchanged(record: Record<Crop>) -> Self {
        Self {
            record,
            transitioned: false,
            notifications_sent: 0,
            notification_failures: 0,
        }
    }
}

/// A reconciled crop with its upcoming deadlines.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CropView {
    /// The crop, reconciled against the time of the read.
    pub crop: Crop,
    /// Store revision of the crop.
    pub revision: u64,
    /// Display name of the crop type.
    pub crop_type_name: String,
    /// Maturity, water-due, and wither instants.
    pub deadlines: Deadlines,
}

/// A plot and the live crop it hosts, if any.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlotView {
    /// The plot.
    pub plot: Plot,
    /// The hosted crop; `None` for an empty plot.
    pub crop: Option<CropView>,
}

/// What a successful harvest produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HarvestOutcome {
    /// The crop, now marked as harvested.
    pub crop: Crop,
    /// Value credited to the farmer.
    pub yield_value: Decimal,
    /// The farmer's balance after the credit.
    pub balance: Decimal,
}

// ---------------------------------------------------------------------------
// Reconciliation plumbing shared with the Updater
// ---------------------------------------------------------------------------

impl<S: Store, N: Notifier> FarmContext<S, N> {
    /// Reconcile `record` at `now`, persist any change, and notify.
    ///
    /// Notifications go out only after the write succeeds, so a lost race
    /// never produces one. Notifier failures are logged and counted.
    ///
    /// # Errors
    ///
    /// Returns [`ActionError::Conflict`] if the record is stale, or the
    /// store or catalog error otherwise.
    pub async fn settle(
        &self,
        mut record: Record<Crop>,
        now: DateTime<Utc>,
    ) -> Result<Settled, ActionError> {
        let crop_type = self.catalog().get(record.entity.crop_type)?;
        let outcome = reconcile(&record.entity, crop_type, self.policy(), now)?;
        if !outcome.changes(&record.entity) {
            return Ok(Settled::unchanged(record));
        }

        outcome.apply_to(&mut record.entity);
        let saved = self.store().save(record).await?;
        debug!(
            crop = %saved.entity.id,
            phase = %saved.entity.phase,
            revision = saved.revision,
            "crop transitioned"
        );

        let (sent, failed) = self
            .dispatch(&outcome.notifications(&saved.entity, now))
            .await;
        Ok(Settled {
            record: saved,
            transitioned: true,
            notifications_sent: sent,
            notification_failures: failed,
        })
    }

    async fn dispatch(&self, notifications: &[Notification]) -> (usize, usize) {
        let mut sent: usize = 0;
        let mut failed: usize = 0;
        for notification in notifications {
            match self.notifier().notify(notification).await {
                Ok(()) => sent = sent.saturating_add(1),
                Err(err) => {
                    failed = failed.saturating_add(1);
                    warn!(
                        farmer = %notification.farmer,
                        crop = %notification.crop,
                        kind = notification.kind.as_str(),
                        error = %err,
                        "notification failed"
                    );
                }
            }
        }
        (sent, failed)
    }

    /// Settle for a read. If another writer got there first, show its state
    /// reconciled in memory instead of failing the read.
    async fn settle_for_read(
        &self,
        record: Record<Crop>,
        now: DateTime<Utc>,
    ) -> Result<Record<Crop>, ActionError> {
        let id = record.id();
        match self.settle(record, now).await {
            Ok(settled) => Ok(settled.record),
            Err(ActionError::Conflict { .. }) => {
                let mut fresh = self.store().get::<Crop>(id).await?;
                let crop_type = self.catalog().get(fresh.entity.crop_type)?;
                reconcile(&fresh.entity, crop_type, self.policy(), now)?.apply_to(&mut fresh.entity);
                Ok(fresh)
            }
            Err(err) => Err(err),
        }
    }

    /// Load `crop` and check that `farmer` owns the plot it grows on.
    async fn owned_crop(
        &self,
        crop: CropId,
        farmer: FarmerId,
    ) -> Result<Record<Crop>, ActionError> {
        let record = self.store().get::<Crop>(crop).await?;
        let plot = self.store().get::<Plot>(record.entity.plot).await?;
        ensure_owner(&plot.entity, farmer)?;
        Ok(record)
    }

    /// Clear the plot's crop reference if it still points at `crop`.
    ///
    /// Runs after the crop's removal is committed. A removed occupant
    /// already reads as an empty plot, so failure is logged, not returned.
    async fn detach(&self, plot: PlotId, crop: CropId) {
        let result = update_with_retry(self.store(), plot, self.write_attempts(), |p: &mut Plot| {
            if p.crop == Some(crop) {
                p.crop = None;
            }
            Ok::<(), ActionError>(())
        })
        .await;
        if let Err(err) = result {
            warn!(plot = %plot, crop = %crop, error = %err, "failed to clear plot reference");
        }
    }

    fn view_of(&self, record: Record<Crop>) -> Result<CropView, ActionError> {
        let crop_type = self.catalog().get(record.entity.crop_type)?;
        Ok(CropView {
            deadlines: deadlines(&record.entity, crop_type, self.policy())?,
            crop_type_name: crop_type.name.clone(),
            revision: record.revision,
            crop: record.entity,
        })
    }
}

// ---------------------------------------------------------------------------
// Crop actions
// ---------------------------------------------------------------------------

impl<S: Store, N: Notifier> FarmContext<S, N> {
    /// Plant a new crop of `crop_type` on `plot`.
    ///
    /// The plot is claimed first; losing that write to a concurrent plant
    /// surfaces as [`ActionError::Conflict`] and nothing is created.
    ///
    /// # Errors
    ///
    /// [`ActionError::NotFound`] for an unknown plot or crop type,
    /// [`ActionError::Ownership`] if `farmer` does not own the plot,
    /// [`ActionError::InvalidState`] if a live crop is already planted.
    pub async fn plant(
        &self,
        plot: PlotId,
        crop_type: CropTypeId,
        farmer: FarmerId,
    ) -> Result<Crop, ActionError> {
        let now = self.now();
        let mut plot = self.store().get::<Plot>(plot).await?;
        ensure_owner(&plot.entity, farmer)?;
        let crop_type = self.catalog().get(crop_type)?;

        let occupant = match plot.entity.crop {
            Some(id) => match self.store().get::<Crop>(id).await {
                Ok(record) => Some(record.entity),
                Err(err) if err.is_not_found() => {
                    warn!(plot = %plot.entity.id, crop = %id, "plot references a missing crop");
                    None
                }
                Err(err) => return Err(err.into()),
            },
            None => None,
        };

        let crop = lifecycle::plant(&plot.entity, occupant.as_ref(), crop_type, farmer, now)?;
        plot.entity.crop = Some(crop.id);
        self.store().save(plot).await?;
        let saved = self.store().save(Record::new(crop)).await?;

        info!(
            crop = %saved.entity.id,
            plot = %saved.entity.plot,
            farmer = %farmer,
            crop_type = %crop_type.name,
            "crop planted"
        );
        Ok(saved.entity)
    }

    /// Water `crop`, restarting its watering window.
    ///
    /// # Errors
    ///
    /// [`ActionError::Ownership`] if `farmer` does not own the plot,
    /// [`ActionError::InvalidState`] if the crop is ready, withered, or
    /// removed, [`ActionError::Conflict`] if the crop changed meanwhile.
    pub async fn water(&self, crop: CropId, farmer: FarmerId) -> Result<Crop, ActionError> {
        let now = self.now();
        let mut record = self.owned_crop(crop, farmer).await?;

        // Only a terminal transition is persisted and announced before the
        // rejection. A due reminder is superseded by this watering, which
        // lands in the same write.
        let crop_type = self.catalog().get(record.entity.crop_type)?;
        let outcome = reconcile(&record.entity, crop_type, self.policy(), now)?;
        if outcome.phase.is_terminal() {
            record = self.settle(record, now).await?.record;
        }

        lifecycle::water(&mut record.entity, now)?;
        let saved = self.store().save(record).await?;
        debug!(crop = %crop, farmer = %farmer, "crop watered");
        Ok(saved.entity)
    }

    /// Harvest a ready crop and credit its yield to the farmer.
    ///
    /// The crop write decides the race. The farmer is credited right after
    /// it, with retries on conflict; clearing the plot comes last and only
    /// logs on failure.
    ///
    /// # Errors
    ///
    /// [`ActionError::Ownership`] if `farmer` does not own the plot,
    /// [`ActionError::InvalidState`] unless the crop is ready to harvest,
    /// [`ActionError::Conflict`] if the crop changed meanwhile.
    pub async fn harvest(
        &self,
        crop: CropId,
        farmer: FarmerId,
    ) -> Result<HarvestOutcome, ActionError> {
        let now = self.now();
        let record = self.owned_crop(crop, farmer).await?;
        let mut record = self.settle(record, now).await?.record;

        let crop_type = self.catalog().get(record.entity.crop_type)?;
        let yield_value = lifecycle::harvest(&mut record.entity, crop_type, now)?;
        let saved = self.store().save(record).await?;

        let credited = update_with_retry(
            self.store(),
            saved.entity.farmer,
            self.write_attempts(),
            |f: &mut Farmer| {
                f.balance = f
                    .balance
                    .checked_add(yield_value)
                    .ok_or(ActionError::Calculation(FarmError::ArithmeticOverflow))?;
                Ok::<(), ActionError>(())
            },
        )
        .await
        .inspect_err(|err| {
            warn!(
                crop = %crop,
                farmer = %saved.entity.farmer,
                yield_value = %yield_value,
                error = %err,
                "harvested crop was not credited"
            );
        })?;
        self.detach(saved.entity.plot, saved.entity.id).await;

        info!(
            crop = %crop,
            farmer = %farmer,
            yield_value = %yield_value,
            balance = %credited.entity.balance,
            "crop harvested"
        );
        Ok(HarvestOutcome {
            crop: saved.entity,
            yield_value,
            balance: credited.entity.balance,
        })
    }

    /// Tear `crop` out of its plot without reward.
    ///
    /// # Errors
    ///
    /// [`ActionError::Ownership`] if `farmer` does not own the plot,
    /// [`ActionError::InvalidState`] if the crop is ready to harvest or was
    /// already removed, [`ActionError::Conflict`] if the crop changed
    /// meanwhile.
    pub async fn tear_up(&self, crop: CropId, farmer: FarmerId) -> Result<Crop, ActionError> {
        let now = self.now();
        let record = self.owned_crop(crop, farmer).await?;
        let mut record = self.settle(record, now).await?.record;

        lifecycle::tear_up(&mut record.entity, now)?;
        let saved = self.store().save(record).await?;
        self.detach(saved.entity.plot, saved.entity.id).await;

        info!(crop = %crop, farmer = %farmer, phase = %saved.entity.phase, "crop torn up");
        Ok(saved.entity)
    }

    /// Read `crop`, reconciled against now.
    ///
    /// # Errors
    ///
    /// [`ActionError::NotFound`] for an unknown crop.
    pub async fn crop_view(&self, crop: CropId) -> Result<CropView, ActionError> {
        let now = self.now();
        let record = self.store().get::<Crop>(crop).await?;
        let record = self.settle_for_read(record, now).await?;
        self.view_of(record)
    }

    /// Read `plot` together with its live crop, reconciled against now.
    ///
    /// # Errors
    ///
    /// [`ActionError::NotFound`] for an unknown plot.
    pub async fn plot_view(&self, plot: PlotId) -> Result<PlotView, ActionError> {
        let now = self.now();
        let plot = self.store().get::<Plot>(plot).await?.entity;

        let Some(crop_id) = plot.crop else {
            return Ok(PlotView { plot, crop: None });
        };
        let record = match self.store().get::<Crop>(crop_id).await {
            Ok(record) if !record.entity.is_removed() => record,
            Ok(_) => return Ok(PlotView { plot, crop: None }),
            Err(err) if err.is_not_found() => return Ok(PlotView { plot, crop: None }),
            Err(err) => return Err(err.into()),
        };
        let record = self.settle_for_read(record, now).await?;
        Ok(PlotView {
            crop: Some(self.view_of(record)?),
            plot,
        })
    }
}

// ---------------------------------------------------------------------------
// Farmers and plots
// ---------------------------------------------------------------------------

impl<S: Store, N: Notifier> FarmContext<S, N> {
    /// Create a farmer account with a zero balance.
    ///
    /// # Errors
    ///
    /// [`ActionError::InvalidInput`] for a blank name.
    pub async fn register_farmer(&self, name: &str) -> Result<Farmer, ActionError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(ActionError::InvalidInput {
                reason: "farmer name must not be blank".to_owned(),
            });
        }
        let saved = self
            .store()
            .save(Record::new(Farmer::new(name, self.now())))
            .await?;
        info!(farmer = %saved.entity.id, name = %saved.entity.name, "farmer registered");
        Ok(saved.entity)
    }

    /// Load a farmer.
    ///
    /// # Errors
    ///
    /// [`ActionError::NotFound`] for an unknown farmer.
    pub async fn farmer(&self, farmer: FarmerId) -> Result<Farmer, ActionError> {
        Ok(self.store().get::<Farmer>(farmer).await?.entity)
    }

    /// Give `farmer` a new, empty plot.
    ///
    /// # Errors
    ///
    /// [`ActionError::NotFound`] for an unknown farmer.
    pub async fn grant_plot(&self, farmer: FarmerId) -> Result<Plot, ActionError> {
        self.store().get::<Farmer>(farmer).await?;
        let saved = self
            .store()
            .save(Record::new(Plot::new(farmer, self.now())))
            .await?;
        info!(plot = %saved.entity.id, farmer = %farmer, "plot granted");
        Ok(saved.entity)
    }

    /// Every plot `farmer` owns, oldest first.
    ///
    /// # Errors
    ///
    /// [`ActionError::Store`] if the query fails.
    pub async fn farmer_plots(&self, farmer: FarmerId) -> Result<Vec<Plot>, ActionError> {
        let records: Vec<Record<Plot>> = self.store().query(Criteria::OwnedBy(farmer)).await?;
        let mut plots: Vec<Plot> = records.into_iter().map(|record| record.entity).collect();
        plots.sort_by_key(|plot| (plot.created_at, plot.id));
        Ok(plots)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use homestead_types::{CropPhase, NotificationKind, RemovalKind};

    use super::*;
    use crate::testing::{FlakyStore, Mode, at, farm, farm_with};

    #[tokio::test]
    async fn carrot_lifecycle_through_reads() {
        let mut farm = farm().await;
        let carrot = farm.crop_type("Carrot");
        let crop = farm.ctx.plant(farm.plot.id, carrot, farm.farmer.id).await.unwrap();
        assert_eq!(crop.phase, CropPhase::Growing);

        farm.set_time(29);
        assert_eq!(farm.ctx.crop_view(crop.id).await.unwrap().crop.phase, CropPhase::Growing);
        assert!(farm.drain().is_empty());

        farm.set_time(31);
        let view = farm.ctx.crop_view(crop.id).await.unwrap();
        assert_eq!(view.crop.phase, CropPhase::NeedsWater);
        assert!(view.crop.reminder_sent);
        assert_eq!(farm.drain(), vec![NotificationKind::NeedsWater]);

        farm.set_time(61);
        let view = farm.ctx.plot_view(farm.plot.id).await.unwrap();
        assert_eq!(view.crop.unwrap().crop.phase, CropPhase::ReadyToHarvest);
        assert_eq!(farm.drain(), vec![NotificationKind::Ready]);

        farm.set_time(62);
        let outcome = farm.ctx.harvest(crop.id, farm.farmer.id).await.unwrap();
        assert_eq!(outcome.yield_value, Decimal::new(15, 0));
        assert_eq!(outcome.balance, Decimal::new(15, 0));
        assert_eq!(
            outcome.crop.removal.map(|r| r.kind),
            Some(RemovalKind::Harvested)
        );

        let view = farm.ctx.plot_view(farm.plot.id).await.unwrap();
        assert_eq!(view.plot.crop, None);
        assert!(view.crop.is_none());
        let ada = farm.ctx.farmer(farm.farmer.id).await.unwrap();
        assert_eq!(ada.balance, Decimal::new(15, 0));
        assert!(farm.drain().is_empty());
    }

    #[tokio::test]
    async fn watering_rearms_the_reminder() {
        let mut farm = farm().await;
        let pumpkin = farm.crop_type("Pumpkin");
        let crop = farm.ctx.plant(farm.plot.id, pumpkin, farm.farmer.id).await.unwrap();

        farm.set_time(31);
        farm.ctx.crop_view(crop.id).await.unwrap();
        farm.set_time(35);
        farm.ctx.crop_view(crop.id).await.unwrap();
        assert_eq!(farm.drain(), vec![NotificationKind::NeedsWater]);

        farm.set_time(36);
        let watered = farm.ctx.water(crop.id, farm.farmer.id).await.unwrap();
        assert_eq!(watered.phase, CropPhase::Growing);
        assert!(!watered.reminder_sent);

        farm.set_time(67);
        let view = farm.ctx.crop_view(crop.id).await.unwrap();
        assert_eq!(view.crop.phase, CropPhase::NeedsWater);
        assert_eq!(farm.drain(), vec![NotificationKind::NeedsWater]);
    }

    #[tokio::test]
    async fn withered_crop_can_only_be_torn_up() {
        let mut farm = farm().await;
        let carrot = farm.crop_type("Carrot");
        let crop = farm.ctx.plant(farm.plot.id, carrot, farm.farmer.id).await.unwrap();

        farm.set_time(41);
        let err = farm.ctx.harvest(crop.id, farm.farmer.id).await.unwrap_err();
        assert!(matches!(err, ActionError::InvalidState(_)));
        assert_eq!(farm.drain(), vec![NotificationKind::Withered]);

        let err = farm.ctx.water(crop.id, farm.farmer.id).await.unwrap_err();
        assert!(matches!(err, ActionError::InvalidState(_)));

        let torn = farm.ctx.tear_up(crop.id, farm.farmer.id).await.unwrap();
        assert_eq!(torn.phase, CropPhase::Withered);
        assert_eq!(torn.removal.map(|r| r.kind), Some(RemovalKind::TornUp));
        assert_eq!(farm.ctx.plot_view(farm.plot.id).await.unwrap().plot.crop, None);

        let err = farm.ctx.tear_up(crop.id, farm.farmer.id).await.unwrap_err();
        assert!(matches!(err, ActionError::InvalidState(FarmError::AlreadyRemoved(_))));
        assert_eq!(farm.ctx.farmer(farm.farmer.id).await.unwrap().balance, Decimal::ZERO);
    }

    #[tokio::test]
    async fn ready_crop_cannot_be_torn_up() {
        let mut farm = farm().await;
        let carrot = farm.crop_type("Carrot");
        let crop = farm.ctx.plant(farm.plot.id, carrot, farm.farmer.id).await.unwrap();

        farm.set_time(61);
        let err = farm.ctx.tear_up(crop.id, farm.farmer.id).await.unwrap_err();
        assert!(matches!(
            err,
            ActionError::InvalidState(FarmError::InvalidPhase {
                phase: CropPhase::ReadyToHarvest,
                ..
            })
        ));
        assert_eq!(farm.drain(), vec![NotificationKind::Ready]);

        let view = farm.ctx.plot_view(farm.plot.id).await.unwrap();
        assert_eq!(view.crop.map(|c| c.crop.id), Some(crop.id));
        let outcome = farm.ctx.harvest(crop.id, farm.farmer.id).await.unwrap();
        assert_eq!(outcome.balance, Decimal::new(15, 0));
    }

    #[tokio::test]
    async fn harvest_pays_out_when_plot_cannot_be_cleared() {
        let store = FlakyStore::default();
        let farm = farm_with(store.clone()).await;
        let carrot = farm.crop_type("Carrot");
        let crop = farm.ctx.plant(farm.plot.id, carrot, farm.farmer.id).await.unwrap();

        farm.set_time(62);
        store.set_mode(Mode::FailPlotSaves);
        let outcome = farm.ctx.harvest(crop.id, farm.farmer.id).await.unwrap();
        assert_eq!(outcome.balance, Decimal::new(15, 0));
        assert_eq!(
            farm.ctx.farmer(farm.farmer.id).await.unwrap().balance,
            Decimal::new(15, 0)
        );

        // The stale reference still reads as an empty plot.
        let view = farm.ctx.plot_view(farm.plot.id).await.unwrap();
        assert_eq!(view.plot.crop, Some(crop.id));
        assert!(view.crop.is_none());

        let err = farm.ctx.harvest(crop.id, farm.farmer.id).await.unwrap_err();
        assert!(matches!(err, ActionError::InvalidState(FarmError::AlreadyRemoved(_))));
        assert_eq!(
            farm.ctx.farmer(farm.farmer.id).await.unwrap().balance,
            Decimal::new(15, 0)
        );

        store.set_mode(Mode::Normal);
        let replanted = farm.ctx.plant(farm.plot.id, carrot, farm.farmer.id).await.unwrap();
        let view = farm.ctx.plot_view(farm.plot.id).await.unwrap();
        assert_eq!(view.crop.map(|c| c.crop.id), Some(replanted.id));
    }

    #[tokio::test]
    async fn watering_a_due_crop_sends_no_reminder() {
        let mut farm = farm().await;
        let carrot = farm.crop_type("Carrot");
        let crop = farm.ctx.plant(farm.plot.id, carrot, farm.farmer.id).await.unwrap();

        farm.set_time(31);
        let watered = farm.ctx.water(crop.id, farm.farmer.id).await.unwrap();
        assert_eq!(watered.phase, CropPhase::Growing);
        assert!(!watered.reminder_sent);
        assert_eq!(watered.last_watered_at, at(31));
        assert!(farm.drain().is_empty());

        let stored = farm.ctx.store().get::<Crop>(crop.id).await.unwrap();
        assert_eq!(stored.revision, 2);
        assert_eq!(farm.ctx.crop_view(crop.id).await.unwrap().crop.phase, CropPhase::Growing);
        assert!(farm.drain().is_empty());
    }

    #[tokio::test]
    async fn harvest_requires_ready_crop() {
        let farm = farm().await;
        let carrot = farm.crop_type("Carrot");
        let crop = farm.ctx.plant(farm.plot.id, carrot, farm.farmer.id).await.unwrap();

        farm.set_time(10);
        let err = farm.ctx.harvest(crop.id, farm.farmer.id).await.unwrap_err();
        assert!(matches!(err, ActionError::InvalidState(FarmError::InvalidPhase { .. })));

        farm.set_time(70);
        farm.ctx.harvest(crop.id, farm.farmer.id).await.unwrap();
        let err = farm.ctx.harvest(crop.id, farm.farmer.id).await.unwrap_err();
        assert!(matches!(err, ActionError::InvalidState(FarmError::AlreadyRemoved(_))));
        assert_eq!(
            farm.ctx.farmer(farm.farmer.id).await.unwrap().balance,
            Decimal::new(15, 0)
        );
    }

    #[tokio::test]
    async fn ownership_is_checked_in_every_phase() {
        let farm = farm().await;
        let carrot = farm.crop_type("Carrot");
        let stranger = farm.ctx.register_farmer("Bo").await.unwrap();

        let err = farm.ctx.plant(farm.plot.id, carrot, stranger.id).await.unwrap_err();
        assert!(matches!(err, ActionError::Ownership { .. }));

        let crop = farm.ctx.plant(farm.plot.id, carrot, farm.farmer.id).await.unwrap();
        for secs in [0, 31, 41] {
            farm.set_time(secs);
            let water = farm.ctx.water(crop.id, stranger.id).await.unwrap_err();
            let harvest = farm.ctx.harvest(crop.id, stranger.id).await.unwrap_err();
            let tear = farm.ctx.tear_up(crop.id, stranger.id).await.unwrap_err();
            for err in [water, harvest, tear] {
                assert!(matches!(err, ActionError::Ownership { farmer, .. } if farmer == stranger.id));
            }
        }
    }

    #[tokio::test]
    async fn plot_holds_one_live_crop() {
        let farm = farm().await;
        let carrot = farm.crop_type("Carrot");
        let first = farm.ctx.plant(farm.plot.id, carrot, farm.farmer.id).await.unwrap();

        let err = farm.ctx.plant(farm.plot.id, carrot, farm.farmer.id).await.unwrap_err();
        assert!(matches!(err, ActionError::InvalidState(FarmError::PlotOccupied { .. })));

        farm.ctx.tear_up(first.id, farm.farmer.id).await.unwrap();
        let second = farm.ctx.plant(farm.plot.id, carrot, farm.farmer.id).await.unwrap();
        let view = farm.ctx.plot_view(farm.plot.id).await.unwrap();
        assert_eq!(view.crop.map(|c| c.crop.id), Some(second.id));
    }

    #[tokio::test]
    async fn unknown_references_are_not_found() {
        let farm = farm().await;
        let err = farm
            .ctx
            .plant(farm.plot.id, CropTypeId::new(), farm.farmer.id)
            .await
            .unwrap_err();
        assert!(matches!(err, ActionError::NotFound { kind: "crop_type", .. }));

        let err = farm.ctx.water(CropId::new(), farm.farmer.id).await.unwrap_err();
        assert!(matches!(err, ActionError::NotFound { kind: "crop", .. }));

        let err = farm.ctx.grant_plot(FarmerId::new()).await.unwrap_err();
        assert!(matches!(err, ActionError::NotFound { kind: "farmer", .. }));

        let err = farm.ctx.plot_view(PlotId::new()).await.unwrap_err();
        assert!(matches!(err, ActionError::NotFound { kind: "plot", .. }));
    }

    #[tokio::test]
    async fn stale_writer_gets_conflict() {
        let mut farm = farm().await;
        let carrot = farm.crop_type("Carrot");
        let crop = farm.ctx.plant(farm.plot.id, carrot, farm.farmer.id).await.unwrap();
        let stale = farm.ctx.store().get::<Crop>(crop.id).await.unwrap();

        farm.set_time(20);
        farm.ctx.water(crop.id, farm.farmer.id).await.unwrap();

        let err = farm.ctx.settle(stale, at(41)).await.unwrap_err();
        assert!(matches!(err, ActionError::Conflict { kind: "crop", .. }));
        assert!(farm.drain().is_empty());

        // Watered at t=20, so nothing is due yet at t=41.
        farm.set_time(41);
        let view = farm.ctx.crop_view(crop.id).await.unwrap();
        assert_eq!(view.crop.phase, CropPhase::Growing);
    }

    #[tokio::test]
    async fn user_actions_surface_conflicts_for_retry() {
        let store = FlakyStore::default();
        let mut farm = farm_with(store.clone()).await;
        let carrot = farm.crop_type("Carrot");
        let crop = farm.ctx.plant(farm.plot.id, carrot, farm.farmer.id).await.unwrap();

        // Another writer saves the crop between the action's read and write.
        farm.set_time(5);
        store.set_mode(Mode::BumpNextGet);
        let err = farm.ctx.water(crop.id, farm.farmer.id).await.unwrap_err();
        assert!(matches!(err, ActionError::Conflict { kind: "crop", .. }));
        let stored = farm.ctx.store().get::<Crop>(crop.id).await.unwrap();
        assert_eq!(stored.entity.last_watered_at, at(0));

        let watered = farm.ctx.water(crop.id, farm.farmer.id).await.unwrap();
        assert_eq!(watered.last_watered_at, at(5));

        farm.set_time(61);
        farm.ctx.crop_view(crop.id).await.unwrap();
        assert_eq!(farm.drain(), vec![NotificationKind::Ready]);

        store.set_mode(Mode::BumpNextGet);
        let err = farm.ctx.harvest(crop.id, farm.farmer.id).await.unwrap_err();
        assert!(matches!(err, ActionError::Conflict { kind: "crop", .. }));
        assert_eq!(farm.ctx.farmer(farm.farmer.id).await.unwrap().balance, Decimal::ZERO);
        assert!(!farm.ctx.store().get::<Crop>(crop.id).await.unwrap().entity.is_removed());

        let outcome = farm.ctx.harvest(crop.id, farm.farmer.id).await.unwrap();
        assert_eq!(outcome.balance, Decimal::new(15, 0));
        assert!(farm.drain().is_empty());
    }

    #[tokio::test]
    async fn read_falls_back_when_racing_another_writer() {
        let farm = farm().await;
        let carrot = farm.crop_type("Carrot");
        let crop = farm.ctx.plant(farm.plot.id, carrot, farm.farmer.id).await.unwrap();

        // Simulate a writer that settled the crop in between our read and write.
        let stale = farm.ctx.store().get::<Crop>(crop.id).await.unwrap();
        farm.ctx.store().save(stale.clone()).await.unwrap();
        let fresh = farm.ctx.settle_for_read(stale, at(31)).await.unwrap();
        assert_eq!(fresh.entity.phase, CropPhase::NeedsWater);
        assert_eq!(fresh.revision, 2);
    }

    #[tokio::test]
    async fn farmers_and_plots() {
        let farm = farm().await;
        let err = farm.ctx.register_farmer("   ").await.unwrap_err();
        assert!(matches!(err, ActionError::InvalidInput { .. }));

        farm.set_time(5);
        let second = farm.ctx.grant_plot(farm.farmer.id).await.unwrap();
        let plots = farm.ctx.farmer_plots(farm.farmer.id).await.unwrap();
        let ids: Vec<PlotId> = plots.iter().map(|p| p.id).collect();
        assert_eq!(ids, vec![farm.plot.id, second.id]);

        let stranger = farm.ctx.register_farmer("Bo").await.unwrap();
        assert!(farm.ctx.farmer_plots(stranger.id).await.unwrap().is_empty());
    }
}
