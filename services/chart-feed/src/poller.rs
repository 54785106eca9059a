//! Snapshot polling task
//!
//! Keeps a shared [`PriceSnapshotCache`] fresh: one refresh when the task
//! starts, then one per period, plus an immediate refresh whenever the
//! watched instrument set changes. Readers take the lock synchronously; the
//! lock is never held across the network fetch.

use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};
use types::ids::InstrumentId;

use crate::error::FeedError;
use crate::snapshot_cache::{PriceSnapshotCache, RefreshOutcome};
use crate::source::SnapshotSource;

/// Cache handle shared between the poller and its readers.
pub type SharedSnapshotCache = Arc<RwLock<PriceSnapshotCache>>;

/// Poller settings.
#[derive(Debug, Clone, PartialEq)]
pub struct PollerConfig {
    pub refresh_period: Duration,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            refresh_period: Duration::from_secs(3),
        }
    }
}

/// Read access that survives a poisoned lock.
pub fn read_cache(cache: &SharedSnapshotCache) -> RwLockReadGuard<'_, PriceSnapshotCache> {
    cache.read().unwrap_or_else(PoisonError::into_inner)
}

fn write_cache(cache: &SharedSnapshotCache) -> RwLockWriteGuard<'_, PriceSnapshotCache> {
    cache.write().unwrap_or_else(PoisonError::into_inner)
}

/// One refresh against a shared cache. The fetch runs unlocked; the merge
/// happens under a short write lock.
pub async fn refresh_shared<S>(
    source: &S,
    cache: &SharedSnapshotCache,
    ids: &[InstrumentId],
) -> Result<RefreshOutcome, FeedError>
where
    S: SnapshotSource + ?Sized,
{
    if ids.is_empty() {
        write_cache(cache).clear();
        return Ok(RefreshOutcome::Cleared);
    }

    let result = source.fetch_snapshots(ids).await;
    let mut guard = write_cache(cache);
    match result {
        Ok(batch) => Ok(guard.apply(batch)),
        Err(err) => {
            guard.record_failure(&err);
            Err(err)
        }
    }
}

fn normalize_ids(mut ids: Vec<InstrumentId>) -> Vec<InstrumentId> {
    ids.sort();
    ids.dedup();
    ids
}

/// Handle to a running polling task. Dropping it stops the task.
pub struct SnapshotPoller {
    cache: SharedSnapshotCache,
    instruments: watch::Sender<Vec<InstrumentId>>,
    handle: Option<JoinHandle<()>>,
}

impl SnapshotPoller {
    /// Spawn the polling task on the current runtime.
    pub fn spawn<S>(source: Arc<S>, config: PollerConfig, instruments: Vec<InstrumentId>) -> Self
    where
        S: SnapshotSource + ?Sized + 'static,
    {
        let cache: SharedSnapshotCache = Arc::new(RwLock::new(PriceSnapshotCache::new()));
        let instruments = normalize_ids(instruments);
        info!(
            instruments = instruments.len(),
            period_ms = config.refresh_period.as_millis() as u64,
            "Starting snapshot poller"
        );

        let (tx, rx) = watch::channel(instruments);
        let handle = tokio::spawn(run(source, cache.clone(), rx, config.refresh_period));

        Self {
            cache,
            instruments: tx,
            handle: Some(handle),
        }
    }

    pub fn cache(&self) -> SharedSnapshotCache {
        self.cache.clone()
    }

    /// Replace the watched set; a changed set triggers an immediate refresh.
    pub fn set_instruments(&self, instruments: Vec<InstrumentId>) -> bool {
        let next = normalize_ids(instruments);
        self.instruments.send_if_modified(|current| {
            if *current == next {
                false
            } else {
                *current = next;
                true
            }
        })
    }

    pub fn instruments(&self) -> Vec<InstrumentId> {
        self.instruments.borrow().clone()
    }

    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Stop polling. Safe to call any number of times.
    pub fn stop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
            info!("Snapshot poller stopped");
        }
    }
}

impl Drop for SnapshotPoller {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn run<S>(
    source: Arc<S>,
    cache: SharedSnapshotCache,
    mut instruments: watch::Receiver<Vec<InstrumentId>>,
    period: Duration,
) where
    S: SnapshotSource + ?Sized,
{
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            changed = instruments.changed() => {
                if changed.is_err() {
                    break;
                }
                debug!("Instrument set changed; refreshing now");
                ticker.reset();
            }
        }

        let ids = instruments.borrow_and_update().clone();
        // failures are recorded on the cache; keep polling
        let _ = refresh_shared(source.as_ref(), &cache, &ids).await;
    }
}
