//! Price snapshot cache
//!
//! Latest `MarketSnapshot` per instrument. A refresh overwrites the entries
//! the batch returned and keeps every other entry as last known; only an
//! empty instrument set clears the cache.

use std::collections::BTreeMap;

use tracing::{debug, warn};
use types::ids::InstrumentId;
use types::snapshot::MarketSnapshot;

use crate::error::FeedError;
use crate::source::SnapshotSource;

/// What a refresh did to the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// Empty instrument set; cache emptied, nothing requested.
    Cleared,
    /// Batch merged; `updated` entries overwritten or inserted.
    Merged { updated: usize },
}

/// Per-instrument snapshot cache.
#[derive(Debug, Default)]
pub struct PriceSnapshotCache {
    snapshots: BTreeMap<InstrumentId, MarketSnapshot>,
    last_error: Option<String>,
    refreshes: u64,
    failures: u64,
}

impl PriceSnapshotCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fetch snapshots for `ids` and merge them.
    ///
    /// On failure the cache is left untouched, the error is recorded in
    /// [`last_error`](Self::last_error) and returned.
    pub async fn refresh<S>(&mut self, source: &S, ids: &[InstrumentId]) -> Result<RefreshOutcome, FeedError>
    where
        S: SnapshotSource + ?Sized,
    {
        if ids.is_empty() {
            self.clear();
            return Ok(RefreshOutcome::Cleared);
        }

        match source.fetch_snapshots(ids).await {
            Ok(batch) => Ok(self.apply(batch)),
            Err(err) => {
                self.record_failure(&err);
                Err(err)
            }
        }
    }

    /// Merge a fetched batch.
    pub fn apply(&mut self, batch: Vec<MarketSnapshot>) -> RefreshOutcome {
        let updated = batch.len();
        for snapshot in batch {
            self.snapshots.insert(snapshot.instrument_id.clone(), snapshot);
        }
        self.last_error = None;
        self.refreshes += 1;
        debug!(updated, cached = self.snapshots.len(), "Merged price snapshots");
        RefreshOutcome::Merged { updated }
    }

    /// Record a failed fetch without touching cached values.
    pub fn record_failure(&mut self, err: &FeedError) {
        warn!(error = %err, kind = err.kind(), cached = self.snapshots.len(), "Snapshot refresh failed; keeping last known prices");
        self.last_error = Some(err.to_string());
        self.failures += 1;
    }

    pub fn clear(&mut self) {
        if !self.snapshots.is_empty() {
            debug!(dropped = self.snapshots.len(), "Clearing price snapshots");
        }
        self.snapshots.clear();
        self.last_error = None;
    }

    pub fn get(&self, id: &InstrumentId) -> Option<&MarketSnapshot> {
        self.snapshots.get(id)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&InstrumentId, &MarketSnapshot)> {
        self.snapshots.iter()
    }

    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }

    /// Message of the most recent failed refresh, cleared by the next success.
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn refresh_count(&self) -> u64 {
        self.refreshes
    }

    pub fn failure_count(&self) -> u64 {
        self.failures
    }
}
