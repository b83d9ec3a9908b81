//! Reconciliation processor.
//!
//! Replays the pending-change queue against the fleet, exactly once per
//! change. Changes are taken in timestamp order. Changes for the same lock
//! run in that order within one lane; lanes for different locks may run
//! concurrently. A change with no lock id targets the whole fleet and acts
//! as a barrier: every lane queued before it finishes first, then it runs
//! alone.
//!
//! A failing change is recorded with its message and never retried here.

use std::collections::{BTreeMap, HashSet};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use lockcode_core::{CreateKeyCodeRequest, CreateKeyCodeResult, DeviceOutcome, FleetController};
use serde::Serialize;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::hash::request_hash;
use crate::storage::{DatabaseError, PendingChange, ProcessedRecord};
use crate::store::ReconcileStore;

/// Default number of locks reconciled at the same time.
const DEFAULT_MAX_CONCURRENCY: usize = 4;

/// What happened to one pending change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordOutcome {
    /// Applied to the device(s) and recorded as a success.
    Applied,
    /// Attempted and recorded as a failure.
    Failed { message: String },
    /// Its hash was already recorded; nothing was sent to any device.
    Skipped,
}

/// Tally of one pass over the queue.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileReport {
    pub applied: usize,
    pub failed: usize,
    pub skipped: usize,
    /// Changes left pending because storage failed while handling them.
    pub errors: usize,
}

impl ReconcileReport {
    pub const fn total(&self) -> usize {
        self.applied + self.failed + self.skipped + self.errors
    }

    fn tally(&mut self, outcome: &RecordOutcome) {
        match outcome {
            RecordOutcome::Applied => self.applied += 1,
            RecordOutcome::Failed { .. } => self.failed += 1,
            RecordOutcome::Skipped => self.skipped += 1,
        }
    }

    const fn merge(&mut self, other: Self) {
        self.applied += other.applied;
        self.failed += other.failed;
        self.skipped += other.skipped;
        self.errors += other.errors;
    }
}

#[derive(Clone)]
pub struct ReconcileProcessor {
    store: Arc<dyn ReconcileStore>,
    fleet: FleetController,
    lanes: Arc<Semaphore>,
    max_concurrency: usize,
}

impl ReconcileProcessor {
    pub fn new(store: Arc<dyn ReconcileStore>, fleet: FleetController) -> Self {
        Self {
            store,
            fleet,
            lanes: Arc::new(Semaphore::new(DEFAULT_MAX_CONCURRENCY)),
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
        }
    }

    /// Bound the number of lanes running at once. `0` falls back to the
    /// default; `1` processes the queue strictly sequentially.
    #[must_use]
    pub fn with_max_concurrency(mut self, max_concurrency: usize) -> Self {
        let limit = if max_concurrency == 0 {
            DEFAULT_MAX_CONCURRENCY
        } else {
            max_concurrency
        };
        self.lanes = Arc::new(Semaphore::new(limit));
        self.max_concurrency = limit;
        self
    }

    pub const fn max_concurrency(&self) -> usize {
        self.max_concurrency
    }

    /// Process every pending change once.
    ///
    /// Only a failure to read the queue aborts the pass; per-change storage
    /// errors are logged, counted in `errors`, and leave that change pending
    /// for the next pass.
    pub async fn run_once(&self) -> Result<ReconcileReport, DatabaseError> {
        let pending = self.store.fetch_pending().await?;
        if pending.is_empty() {
            return Ok(ReconcileReport::default());
        }
        debug!(pending = pending.len(), "Reconciling pending changes");

        let mut report = ReconcileReport::default();
        let mut batch = Vec::new();
        for change in pending {
            if change.lock_id.is_some() {
                batch.push(change);
                continue;
            }
            report.merge(self.run_lanes(std::mem::take(&mut batch)).await);
            report.merge(self.run_lane(vec![change]).await);
        }
        report.merge(self.run_lanes(batch).await);

        info!(
            applied = report.applied,
            failed = report.failed,
            skipped = report.skipped,
            errors = report.errors,
            "Reconcile pass complete"
        );
        Ok(report)
    }

    /// Poll the queue every `poll_interval` until `shutdown` resolves.
    pub async fn run_until(&self, poll_interval: Duration, shutdown: impl Future<Output = ()>) {
        tokio::pin!(shutdown);
        let mut interval = tokio::time::interval(poll_interval);
        info!(interval_secs = poll_interval.as_secs(), "Reconciler started");
        loop {
            tokio::select! {
                () = &mut shutdown => {
                    info!("Reconciler stopping");
                    break;
                }
                _ = interval.tick() => {
                    if let Err(e) = self.run_once().await {
                        warn!(error = %e, "Reconcile pass failed");
                    }
                }
            }
        }
    }

    /// Handle a single pending change: dedup, apply, record, mark.
    pub async fn process_record(
        &self,
        change: &PendingChange,
    ) -> Result<RecordOutcome, DatabaseError> {
        let hash = request_hash(change.timestamp, &change.code, &change.username);

        if self.store.is_processed(&hash).await? {
            debug!(
                pending_id = change.id,
                request_hash = %hash,
                "Change already processed, skipping"
            );
            self.store.mark_processed(change.id).await?;
            return Ok(RecordOutcome::Skipped);
        }

        let (success, message) = self.apply(change).await;
        let recorded = self
            .store
            .record_processed(&ProcessedRecord {
                request_hash: hash.clone(),
                lock_id: change.lock_id,
                code: change.code.clone(),
                username: change.username.clone(),
                success,
                message: message.clone(),
            })
            .await?;
        if !recorded {
            warn!(
                pending_id = change.id,
                request_hash = %hash,
                "Outcome for this change was recorded concurrently"
            );
        }
        self.store.mark_processed(change.id).await?;

        if success {
            info!(pending_id = change.id, lock_id = ?change.lock_id, "Change applied");
            Ok(RecordOutcome::Applied)
        } else {
            warn!(pending_id = change.id, lock_id = ?change.lock_id, message = %message, "Change failed");
            Ok(RecordOutcome::Failed { message })
        }
    }

    async fn apply(&self, change: &PendingChange) -> (bool, String) {
        let request = CreateKeyCodeRequest::new(
            change.code.clone(),
            change.username.clone(),
            change.lock_id,
        );
        match self.fleet.create_key_code(request) {
            Ok(results) => summarize(change.lock_id, &results.collect_outcomes().await),
            Err(e) => (false, e.to_string()),
        }
    }

    /// Split `batch` into per-lock lanes and run them under the lane limit.
    ///
    /// Only the first change per request hash goes into a lane. Repeats run
    /// after every lane has finished, so they find the first outcome
    /// recorded and are skipped.
    async fn run_lanes(&self, batch: Vec<PendingChange>) -> ReconcileReport {
        if batch.is_empty() {
            return ReconcileReport::default();
        }
        if self.max_concurrency == 1 {
            return self.run_lane(batch).await;
        }

        let mut seen = HashSet::new();
        let mut repeats = Vec::new();
        let mut lanes: BTreeMap<i64, Vec<PendingChange>> = BTreeMap::new();
        for change in batch {
            if !seen.insert(request_hash(change.timestamp, &change.code, &change.username)) {
                repeats.push(change);
                continue;
            }
            lanes
                .entry(change.lock_id.unwrap_or_default())
                .or_default()
                .push(change);
        }

        let mut tasks = JoinSet::new();
        for (lock_id, lane) in lanes {
            let this = self.clone();
            tasks.spawn(async move {
                let _permit = Arc::clone(&this.lanes).acquire_owned().await;
                debug!(lock_id, changes = lane.len(), "Lane started");
                this.run_lane(lane).await
            });
        }

        let mut report = ReconcileReport::default();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(lane_report) => report.merge(lane_report),
                Err(e) => {
                    warn!(error = %e, "Reconcile lane aborted");
                    report.errors += 1;
                }
            }
        }
        if !repeats.is_empty() {
            debug!(repeats = repeats.len(), "Replaying repeated changes after lanes");
            report.merge(self.run_lane(repeats).await);
        }
        report
    }

    async fn run_lane(&self, lane: Vec<PendingChange>) -> ReconcileReport {
        let mut report = ReconcileReport::default();
        for change in &lane {
            match self.process_record(change).await {
                Ok(outcome) => report.tally(&outcome),
                Err(e) => {
                    warn!(pending_id = change.id, error = %e, "Failed to record change");
                    report.errors += 1;
                }
            }
        }
        report
    }
}

/// Collapse per-device outcomes into the `(success, message)` stored in the
/// processed log.
fn summarize(lock_id: Option<i64>, outcomes: &[DeviceOutcome<CreateKeyCodeResult>]) -> (bool, String) {
    if lock_id.is_some() {
        return match outcomes.first() {
            Some(DeviceOutcome { result: Ok(r), .. }) => {
                (true, format!("Key code created at position {}", r.position))
            }
            Some(DeviceOutcome { result: Err(e), .. }) => (false, e.to_string()),
            None => (false, "No result from device".to_string()),
        };
    }

    if outcomes.is_empty() {
        return (false, "No locks in fleet".to_string());
    }
    let success = outcomes.iter().all(DeviceOutcome::is_success);
    let message = outcomes
        .iter()
        .map(|o| match &o.result {
            Ok(r) => format!("device {}: position {}", o.device.id, r.position),
            Err(e) => format!("device {}: {e}", o.device.id),
        })
        .collect::<Vec<_>>()
        .join("; ");
    (success, message)
}
