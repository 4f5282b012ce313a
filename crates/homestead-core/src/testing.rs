//! Shared fixtures for the action and updater tests.

#![allow(clippy::unwrap_used)]

use std::sync::{Arc, Mutex};

use chrono::{DateTime, TimeDelta, Utc};
use rust_decimal::Decimal;
use tokio::sync::Notify;
use tokio::sync::mpsc::UnboundedReceiver;

use homestead_db::{Criteria, DbError, Entity, MemoryStore, Record, Store};
use homestead_farm::CropTypeSeed;
use homestead_types::{CropTypeId, Farmer, Notification, NotificationKind, Plot};

use crate::clock::ManualClock;
use crate::config::FarmConfig;
use crate::context::FarmContext;
use crate::notifier::ChannelNotifier;

/// Wall-clock origin of every scenario.
pub const T0: i64 = 1_800_000_000;

/// `T0 + secs`.
pub fn at(secs: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(T0, 0)
        .unwrap()
        .checked_add_signed(TimeDelta::seconds(secs))
        .unwrap()
}

/// 60s growth, 30s watering interval, 10s grace, yield 15.
pub fn carrot() -> CropTypeSeed {
    CropTypeSeed {
        name: "Carrot".to_owned(),
        growth_secs: 60,
        watering_interval_secs: 30,
        wither_grace_secs: Some(10),
        yield_value: Decimal::new(15, 0),
    }
}

/// Same watering rhythm as [`carrot`] but slow to mature.
pub fn pumpkin() -> CropTypeSeed {
    CropTypeSeed {
        name: "Pumpkin".to_owned(),
        growth_secs: 600,
        watering_interval_secs: 30,
        wither_grace_secs: Some(10),
        yield_value: Decimal::new(80, 0),
    }
}

/// One farmer with one plot, a manual clock at `T0`, and a notification
/// receiver.
pub struct Farm<S = MemoryStore> {
    pub ctx: Arc<FarmContext<S, ChannelNotifier>>,
    pub clock: Arc<ManualClock>,
    pub notes: UnboundedReceiver<Notification>,
    pub farmer: Farmer,
    pub plot: Plot,
}

pub async fn farm() -> Farm {
    farm_with(MemoryStore::new()).await
}

pub async fn farm_with<S: Store>(store: S) -> Farm<S> {
    let config = FarmConfig {
        crop_types: vec![carrot(), pumpkin()],
        ..FarmConfig::default()
    };
    let clock = Arc::new(ManualClock::new(at(0)));
    let (notifier, notes) = ChannelNotifier::channel();
    let ctx = FarmContext::initialize(store, notifier, &config, clock.clone())
        .await
        .unwrap();
    let farmer = ctx.register_farmer("Ada").await.unwrap();
    let plot = ctx.grant_plot(farmer.id).await.unwrap();
    Farm {
        ctx: Arc::new(ctx),
        clock,
        notes,
        farmer,
        plot,
    }
}

impl<S> Farm<S> {
    /// Move the manual clock to `T0 + secs`.
    pub fn set_time(&self, secs: i64) {
        self.clock.set(at(secs));
    }

    /// Everything notified since the last drain, in order.
    pub fn drain(&mut self) -> Vec<NotificationKind> {
        let mut kinds = Vec::new();
        while let Ok(note) = self.notes.try_recv() {
            kinds.push(note.kind);
        }
        kinds
    }
}

impl<S: Store> Farm<S> {
    pub fn crop_type(&self, name: &str) -> CropTypeId {
        self.ctx.catalog().by_name(name).unwrap().id
    }
}

/// How a [`FlakyStore`] misbehaves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Pass everything through.
    Normal,
    /// Every query fails.
    FailQueries,
    /// Every queried record is rewritten before being returned, so callers
    /// hold stale revisions.
    BumpOnQuery,
    /// The next `get` rewrites its record before returning it, then the
    /// store goes back to [`Mode::Normal`].
    BumpNextGet,
    /// Every plot write fails.
    FailPlotSaves,
    /// Queries wait for [`FlakyStore::release`] before running.
    HoldQueries,
}

/// A [`MemoryStore`] wrapper that can fail or race queries on demand.
#[derive(Debug, Clone)]
pub struct FlakyStore {
    mode: Arc<Mutex<Mode>>,
    gate: Arc<Notify>,
    inner: MemoryStore,
}

impl Default for FlakyStore {
    fn default() -> Self {
        Self {
            mode: Arc::new(Mutex::new(Mode::Normal)),
            gate: Arc::new(Notify::new()),
            inner: MemoryStore::new(),
        }
    }
}

impl FlakyStore {
    pub fn set_mode(&self, mode: Mode) {
        *self.mode.lock().unwrap() = mode;
    }

    /// Switch back to [`Mode::Normal`] and let one held query through.
    pub fn release(&self) {
        self.set_mode(Mode::Normal);
        self.gate.notify_one();
    }

    fn mode(&self) -> Mode {
        *self.mode.lock().unwrap()
    }
}

impl Store for FlakyStore {
    async fn get<E: Entity>(&self, id: E::Id) -> Result<Record<E>, DbError> {
        let record: Record<E> = self.inner.get(id).await?;
        if self.mode() == Mode::BumpNextGet {
            self.set_mode(Mode::Normal);
            self.inner.save(record.clone()).await?;
        }
        Ok(record)
    }

    async fn save<E: Entity>(&self, record: Record<E>) -> Result<Record<E>, DbError> {
        if self.mode() == Mode::FailPlotSaves && E::KIND == Plot::KIND {
            return Err(DbError::Corrupt("plot write refused".to_owned()));
        }
        self.inner.save(record).await
    }

    async fn query<E: Entity>(&self, criteria: Criteria) -> Result<Vec<Record<E>>, DbError> {
        match self.mode() {
            Mode::Normal | Mode::BumpNextGet | Mode::FailPlotSaves => {
                self.inner.query(criteria).await
            }
            Mode::HoldQueries => {
                self.gate.notified().await;
                self.inner.query(criteria).await
            }
            Mode::FailQueries => Err(DbError::Corrupt("query refused".to_owned())),
            Mode::BumpOnQuery => {
                let records: Vec<Record<E>> = self.inner.query(criteria).await?;
                for record in &records {
                    self.inner.save(record.clone()).await?;
                }
                Ok(records)
            }
        }
    }
}
