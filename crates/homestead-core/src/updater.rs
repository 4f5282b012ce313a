//! The Updater: a periodic sweep that advances every active crop.
//!
//! Each sweep loads the active crops, reconciles each one against a single
//! sweep-wide "now", and persists the ones that changed. Crops are handled
//! with bounded concurrency and every id at most once per sweep.
//!
//! # Sweep outcomes per crop
//!
//! | Outcome | Meaning |
//! |---------|---------|
//! | unchanged | Still in the phase it was stored in |
//! | transitioned | New phase persisted, notifications sent |
//! | conflict | A user action wrote first; picked up next sweep |
//! | missing | The crop or its type vanished; skipped |
//! | failed | Any other error; logged and skipped |
//!
//! A failing active-crop query aborts only the sweep it happened in.

use std::collections::BTreeMap;
use std::collections::btree_map::Entry;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use homestead_db::{Criteria, DbError, Record, Store};
use homestead_types::{Crop, CropId};

use crate::actions::ActionError;
use crate::config::UpdaterConfig;
use crate::context::FarmContext;
use crate::notifier::Notifier;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors raised by the Updater.
#[derive(Debug, thiserror::Error)]
pub enum UpdaterError {
    /// `start` was called while the sweep task is running.
    #[error("updater is already running")]
    AlreadyRunning,

    /// The active-crop query failed; the sweep was abandoned.
    #[error("active crop query failed: {0}")]
    Query(#[source] DbError),

    /// The sweep task panicked or was cancelled.
    #[error("sweep task ended abnormally: {reason}")]
    Task {
        /// Description from the join error.
        reason: String,
    },
}

// ---------------------------------------------------------------------------
// Sweep summary
// ---------------------------------------------------------------------------

/// Counters describing one sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepSummary {
    /// Distinct active crops loaded.
    pub examined: usize,
    /// Crops whose new state was persisted.
    pub transitioned: usize,
    /// Crops skipped because another writer got there first.
    pub conflicts: usize,
    /// Crops skipped because a record they depend on is gone.
    pub missing: usize,
    /// Crops skipped because of any other error.
    pub failed: usize,
    /// Notifications accepted by the notifier.
    pub notifications_sent: usize,
    /// Notifications the notifier rejected.
    pub notification_failures: usize,
    /// Wall time the sweep took.
    pub elapsed: Duration,
}

impl SweepSummary {
    fn record(&mut self, outcome: CropOutcome) {
        match outcome {
            CropOutcome::Unchanged => {}
            CropOutcome::Transitioned { sent, failed } => {
                self.transitioned = self.transitioned.saturating_add(1);
                self.notifications_sent = self.notifications_sent.saturating_add(sent);
                self.notification_failures = self.notification_failures.saturating_add(failed);
            }
            CropOutcome::Conflict => self.conflicts = self.conflicts.saturating_add(1),
            CropOutcome::Missing => self.missing = self.missing.saturating_add(1),
            CropOutcome::Failed => self.failed = self.failed.saturating_add(1),
        }
    }

    fn log(&self, now: DateTime<Utc>) {
        let quiet = self.transitioned == 0 && self.failed == 0 && self.notification_failures == 0;
        if quiet {
            debug!(
                %now,
                examined = self.examined,
                conflicts = self.conflicts,
                elapsed_ms = self.elapsed.as_millis(),
                "sweep complete"
            );
        } else {
            info!(
                %now,
                examined = self.examined,
                transitioned = self.transitioned,
                conflicts = self.conflicts,
                missing = self.missing,
                failed = self.failed,
                notifications_sent = self.notifications_sent,
                notification_failures = self.notification_failures,
                elapsed_ms = self.elapsed.as_millis(),
                "sweep complete"
            );
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CropOutcome {
    Unchanged,
    Transitioned { sent: usize, failed: usize },
    Conflict,
    Missing,
    Failed,
}

// ---------------------------------------------------------------------------
// One sweep
// ---------------------------------------------------------------------------

/// Reconcile every active crop against `now`.
///
/// # Errors
///
/// Returns [`UpdaterError::Query`] if the active crops cannot be loaded.
/// Per-crop failures are counted in the summary, not returned.
pub async fn run_sweep<S: Store, N: Notifier>(
    ctx: &Arc<FarmContext<S, N>>,
    now: DateTime<Utc>,
    concurrency: usize,
) -> Result<SweepSummary, UpdaterError> {
    let started = Instant::now();
    let records: Vec<Record<Crop>> = ctx
        .store()
        .query(Criteria::Active)
        .await
        .map_err(UpdaterError::Query)?;

    // Keep the newest copy of each id.
    let mut unique: BTreeMap<CropId, Record<Crop>> = BTreeMap::new();
    for record in records {
        match unique.entry(record.id()) {
            Entry::Vacant(slot) => {
                slot.insert(record);
            }
            Entry::Occupied(mut slot) => {
                if record.revision > slot.get().revision {
                    slot.insert(record);
                }
            }
        }
    }

    let mut summary = SweepSummary {
        examined: unique.len(),
        ..SweepSummary::default()
    };
    let outcomes: Vec<CropOutcome> = stream::iter(unique.into_values())
        .map(|record| sweep_crop(Arc::clone(ctx), record, now))
        .buffer_unordered(concurrency.max(1))
        .collect()
        .await;
    for outcome in outcomes {
        summary.record(outcome);
    }
    summary.elapsed = started.elapsed();
    Ok(summary)
}

async fn sweep_crop<S: Store, N: Notifier>(
    ctx: Arc<FarmContext<S, N>>,
    record: Record<Crop>,
    now: DateTime<Utc>,
) -> CropOutcome {
    let crop = record.id();
    match ctx.settle(record, now).await {
        Ok(settled) if settled.transitioned => CropOutcome::Transitioned {
            sent: settled.notifications_sent,
            failed: settled.notification_failures,
        },
        Ok(_) => CropOutcome::Unchanged,
        Err(ActionError::Conflict { .. }) => {
            debug!(%crop, "crop changed during sweep, deferring to next sweep");
            CropOutcome::Conflict
        }
        Err(ActionError::NotFound { kind, id }) => {
            debug!(%crop, kind, %id, "crop dependency missing, skipping");
            CropOutcome::Missing
        }
        Err(err) => {
            warn!(%crop, error = %err, "failed to reconcile crop");
            CropOutcome::Failed
        }
    }
}

// ---------------------------------------------------------------------------
// Scheduler
// ---------------------------------------------------------------------------

struct Running {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

/// Runs [`run_sweep`] on a fixed interval in a background task.
pub struct Updater<S, N> {
    ctx: Arc<FarmContext<S, N>>,
    interval: Duration,
    concurrency: usize,
    sweeps: Arc<AtomicU64>,
    running: Mutex<Option<Running>>,
}

impl<S: Store, N: Notifier> Updater<S, N> {
    /// Create a stopped Updater.
    pub fn new(ctx: Arc<FarmContext<S, N>>, config: &UpdaterConfig) -> Self {
        Self {
            ctx,
            interval: config.sweep_interval().max(Duration::from_secs(1)),
            concurrency: config.sweep_concurrency.max(1),
            sweeps: Arc::new(AtomicU64::new(0)),
            running: Mutex::new(None),
        }
    }

    /// Start sweeping: once immediately, then every interval.
    ///
    /// # Errors
    ///
    /// Returns [`UpdaterError::AlreadyRunning`] if the sweep task is live.
    pub async fn start(&self) -> Result<(), UpdaterError> {
        let mut running = self.running.lock().await;
        if running.as_ref().is_some_and(|r| !r.task.is_finished()) {
            return Err(UpdaterError::AlreadyRunning);
        }

        let (shutdown, shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(sweep_loop(
            Arc::clone(&self.ctx),
            self.interval,
            self.concurrency,
            Arc::clone(&self.sweeps),
            shutdown_rx,
        ));
        *running = Some(Running { shutdown, task });

        info!(
            interval_secs = self.interval.as_secs(),
            concurrency = self.concurrency,
            "updater started"
        );
        Ok(())
    }

    /// Stop sweeping and wait for the task to end.
    ///
    /// A sweep in progress runs to completion first. Stopping an idle
    /// Updater does nothing. The run lock is held until the task has ended,
    /// so a concurrent [`Updater::start`] waits rather than spawning a
    /// second loop.
    ///
    /// # Errors
    ///
    /// Returns [`UpdaterError::Task`] if the sweep task panicked.
    pub async fn stop(&self) -> Result<(), UpdaterError> {
        let mut guard = self.running.lock().await;
        let Some(running) = guard.take() else {
            return Ok(());
        };
        if running.shutdown.send(true).is_err() {
            debug!("sweep task had already exited");
        }
        let joined = running.task.await;
        drop(guard);

        joined.map_err(|err| UpdaterError::Task {
            reason: err.to_string(),
        })?;
        info!(sweeps = self.sweeps_run(), "updater stopped");
        Ok(())
    }

    /// Whether the sweep task is live.
    pub async fn is_running(&self) -> bool {
        self.running
            .lock()
            .await
            .as_ref()
            .is_some_and(|r| !r.task.is_finished())
    }

    /// Sweeps finished (successfully or not) since construction.
    pub fn sweeps_run(&self) -> u64 {
        self.sweeps.load(Ordering::Acquire)
    }

    /// Run one sweep at `now` on the caller's task.
    ///
    /// # Errors
    ///
    /// Returns [`UpdaterError::Query`] if the active crops cannot be loaded.
    pub async fn run_sweep_once(&self, now: DateTime<Utc>) -> Result<SweepSummary, UpdaterError> {
        let summary = run_sweep(&self.ctx, now, self.concurrency).await?;
        summary.log(now);
        Ok(summary)
    }
}

async fn sweep_loop<S: Store, N: Notifier>(
    ctx: Arc<FarmContext<S, N>>,
    interval: Duration,
    concurrency: usize,
    sweeps: Arc<AtomicU64>,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            _ = shutdown.changed() => break,
            _ = ticker.tick() => {}
        }

        let now = ctx.now();
        match run_sweep(&ctx, now, concurrency).await {
            Ok(summary) => summary.log(now),
            Err(err) => warn!(%now, error = %err, "sweep aborted, retrying next interval"),
        }
        sweeps.fetch_add(1, Ordering::AcqRel);
    }
    debug!("sweep loop exited");
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
