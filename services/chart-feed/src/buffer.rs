//! Rolling candle buffer
//!
//! Owns the live candle history per (instrument, interval). A historical
//! fetch seeds a series wholesale; live ticks then either replace the last
//! candle (the exchange is still aggregating the same bucket) or append a
//! new one. Series are bounded: once over `max_len` the oldest candles are
//! evicted from the front.
//!
//! From the caller's perspective the buffer is append/replace-only. Interior
//! candles are never reordered or removed except by bounded eviction.
//!
//! Every mutation bumps a version number taken from a buffer-wide counter,
//! so consumers can cache derived data and recompute only when the version
//! they computed from is no longer current.

use std::collections::{BTreeMap, VecDeque};

use tracing::{debug, info, warn};
use types::candle::Candle;
use types::ids::InstrumentId;
use types::interval::Interval;

/// Buffer key.
pub type SeriesKey = (InstrumentId, Interval);

/// What to do with a tick older than the last buffered candle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutOfOrderPolicy {
    /// Append anyway; the sanitizer's sort restores ordering downstream.
    #[default]
    Append,
    /// Drop the tick.
    Reject,
}

/// Configuration for the candle buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BufferConfig {
    /// Maximum candles retained per series.
    pub max_len: usize,
    /// Handling of out-of-order ticks.
    pub out_of_order: OutOfOrderPolicy,
    /// Floor tick times to the interval boundary before comparing.
    pub align_to_bucket: bool,
    /// Ignore ticks for a series that has not been seeded yet.
    pub require_seed: bool,
    /// Open each appended candle at the previous close and widen its
    /// high/low to cover open and close.
    pub enforce_continuity: bool,
}

impl Default for BufferConfig {
    fn default() -> Self {
        Self {
            max_len: 500,
            out_of_order: OutOfOrderPolicy::Append,
            align_to_bucket: false,
            require_seed: false,
            enforce_continuity: false,
        }
    }
}

/// Why a tick was not merged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IgnoreReason {
    /// Tick belongs to another interval than the series.
    IntervalMismatch,
    /// Tick is older than the last candle and the policy is `Reject`.
    OutOfOrder,
    /// Series not seeded yet and `require_seed` is set.
    NotSeeded,
}

/// Result of merging a tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeOutcome {
    /// Last candle replaced in place; length unchanged.
    Replaced,
    /// New candle appended; `evicted` oldest candles dropped to stay bounded.
    Appended { evicted: usize },
    /// Buffer untouched.
    Ignored(IgnoreReason),
}

impl MergeOutcome {
    /// Whether the buffer changed.
    pub fn is_applied(&self) -> bool {
        !matches!(self, MergeOutcome::Ignored(_))
    }
}

/// Candle history for one (instrument, interval).
#[derive(Debug, Clone, Default)]
pub struct CandleSeries {
    candles: VecDeque<Candle>,
    version: u64,
    seeded: bool,
    needs_auto_fit: bool,
}

impl CandleSeries {
    pub fn len(&self) -> usize {
        self.candles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candles.is_empty()
    }

    /// Most recent candle.
    pub fn last(&self) -> Option<&Candle> {
        self.candles.back()
    }

    /// Candles oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &Candle> {
        self.candles.iter()
    }

    pub fn to_vec(&self) -> Vec<Candle> {
        self.candles.iter().copied().collect()
    }

    /// Version of the last mutation.
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Whether a historical seed has been applied.
    pub fn is_seeded(&self) -> bool {
        self.seeded
    }

    /// Whether the chart should re-fit its time scale (set on every seed).
    pub fn needs_auto_fit(&self) -> bool {
        self.needs_auto_fit
    }

    fn trim_front(&mut self, max_len: usize) -> usize {
        let mut evicted = 0;
        while self.candles.len() > max_len {
            self.candles.pop_front();
            evicted += 1;
        }
        evicted
    }
}

/// Per-(instrument, interval) candle store with seed/merge semantics.
///
/// Uses BTreeMap for deterministic iteration.
#[derive(Debug)]
pub struct CandleStreamBuffer {
    series: BTreeMap<SeriesKey, CandleSeries>,
    config: BufferConfig,
    /// Buffer-wide version counter; every mutation takes the next value.
    version_counter: u64,
    ticks_merged: u64,
    ticks_ignored: u64,
    out_of_order_ticks: u64,
}

impl CandleStreamBuffer {
    /// Create a new buffer with the given configuration.
    pub fn new(config: BufferConfig) -> Self {
        info!(
            max_len = config.max_len,
            out_of_order = ?config.out_of_order,
            "CandleStreamBuffer initialized"
        );
        Self {
            series: BTreeMap::new(),
            config,
            version_counter: 0,
            ticks_merged: 0,
            ticks_ignored: 0,
            out_of_order_ticks: 0,
        }
    }

    /// Create a new buffer with default configuration.
    pub fn with_defaults() -> Self {
        Self::new(BufferConfig::default())
    }

    pub fn config(&self) -> &BufferConfig {
        &self.config
    }

    /// Replace a series wholesale, e.g. after a historical re-fetch.
    ///
    /// Candles tagged with another interval are discarded. If more than
    /// `max_len` candles are supplied only the newest are kept. Resets the
    /// auto-fit flag so the chart re-fits once. Returns the new length.
    pub fn seed(&mut self, instrument: &InstrumentId, interval: Interval, candles: Vec<Candle>) -> usize {
        let supplied = candles.len();
        let mut kept: VecDeque<Candle> = candles
            .into_iter()
            .filter(|c| c.interval == interval)
            .collect();
        if kept.len() < supplied {
            warn!(
                instrument = %instrument,
                interval = %interval,
                discarded = supplied - kept.len(),
                "Seed contained candles for another interval"
            );
        }
        while kept.len() > self.config.max_len {
            kept.pop_front();
        }

        let version = self.next_version();
        let series = self
            .series
            .entry((instrument.clone(), interval))
            .or_default();
        series.candles = kept;
        series.version = version;
        series.seeded = true;
        series.needs_auto_fit = true;

        info!(
            instrument = %instrument,
            interval = %interval,
            len = series.len(),
            version,
            "Series seeded"
        );
        series.len()
    }

    /// Merge a live tick into a series.
    ///
    /// Same time as the last candle ⇒ replace it; otherwise append and evict
    /// from the front down to `max_len`. With `enforce_continuity` an
    /// appended candle opens at the previous close.
    pub fn merge(&mut self, instrument: &InstrumentId, interval: Interval, incoming: Candle) -> MergeOutcome {
        if incoming.interval != interval {
            self.ticks_ignored += 1;
            debug!(
                instrument = %instrument,
                selected = %interval,
                tick_interval = %incoming.interval,
                "Ignoring tick for unselected interval"
            );
            return MergeOutcome::Ignored(IgnoreReason::IntervalMismatch);
        }

        let mut incoming = incoming;
        if self.config.align_to_bucket {
            incoming.time = interval.align(incoming.time);
        }

        let key = (instrument.clone(), interval);
        let seeded = self.series.get(&key).map(|s| s.seeded).unwrap_or(false);
        if self.config.require_seed && !seeded {
            self.ticks_ignored += 1;
            debug!(instrument = %instrument, interval = %interval, "Ignoring tick before seed");
            return MergeOutcome::Ignored(IgnoreReason::NotSeeded);
        }

        let last_time = self.series.get(&key).and_then(|s| s.last()).map(|c| c.time);
        if let Some(last) = last_time {
            if incoming.time < last {
                self.out_of_order_ticks += 1;
                match self.config.out_of_order {
                    OutOfOrderPolicy::Reject => {
                        self.ticks_ignored += 1;
                        warn!(
                            instrument = %instrument,
                            interval = %interval,
                            last_time = last,
                            tick_time = incoming.time,
                            "Rejecting out-of-order tick"
                        );
                        return MergeOutcome::Ignored(IgnoreReason::OutOfOrder);
                    }
                    OutOfOrderPolicy::Append => {
                        warn!(
                            instrument = %instrument,
                            interval = %interval,
                            last_time = last,
                            tick_time = incoming.time,
                            "Appending out-of-order tick"
                        );
                    }
                }
            }
        }

        let version = self.next_version();
        let max_len = self.config.max_len;
        let continuity = self.config.enforce_continuity;
        let series = self.series.entry(key).or_default();
        series.version = version;
        self.ticks_merged += 1;

        if last_time == Some(incoming.time) {
            if let Some(last) = series.candles.back_mut() {
                *last = incoming;
            }
            debug!(
                instrument = %instrument,
                time = incoming.time,
                close = incoming.close,
                "Tick replaced last candle"
            );
            MergeOutcome::Replaced
        } else {
            if continuity {
                if let Some(previous) = series.candles.back() {
                    force_continuity(&mut incoming, previous.close);
                }
            }
            series.candles.push_back(incoming);
            let evicted = series.trim_front(max_len);
            debug!(
                instrument = %instrument,
                time = incoming.time,
                len = series.len(),
                evicted,
                "Tick appended new candle"
            );
            MergeOutcome::Appended { evicted }
        }
    }

    /// Series for a key, if any.
    pub fn series(&self, instrument: &InstrumentId, interval: Interval) -> Option<&CandleSeries> {
        self.series.get(&(instrument.clone(), interval))
    }

    /// Length of a series (0 when absent).
    pub fn len(&self, instrument: &InstrumentId, interval: Interval) -> usize {
        self.series(instrument, interval).map(CandleSeries::len).unwrap_or(0)
    }

    /// Version of a series (0 when absent).
    pub fn version(&self, instrument: &InstrumentId, interval: Interval) -> u64 {
        self.series(instrument, interval).map(CandleSeries::version).unwrap_or(0)
    }

    /// Clear the auto-fit flag once the chart has re-fitted.
    pub fn acknowledge_auto_fit(&mut self, instrument: &InstrumentId, interval: Interval) {
        if let Some(series) = self.series.get_mut(&(instrument.clone(), interval)) {
            series.needs_auto_fit = false;
        }
    }

    /// Drop a series entirely.
    pub fn clear(&mut self, instrument: &InstrumentId, interval: Interval) -> bool {
        self.series.remove(&(instrument.clone(), interval)).is_some()
    }

    /// Number of series held.
    pub fn series_count(&self) -> usize {
        self.series.len()
    }

    /// Total ticks merged (replaced or appended) since creation.
    pub fn ticks_merged(&self) -> u64 {
        self.ticks_merged
    }

    /// Total ticks ignored since creation.
    pub fn ticks_ignored(&self) -> u64 {
        self.ticks_ignored
    }

    /// Total ticks that arrived older than the last candle.
    pub fn out_of_order_ticks(&self) -> u64 {
        self.out_of_order_ticks
    }

    fn next_version(&mut self) -> u64 {
        self.version_counter += 1;
        self.version_counter
    }
}

/// Open at `previous_close`; clamp high/low so the body stays inside the wick.
fn force_continuity(candle: &mut Candle, previous_close: f64) {
    candle.open = previous_close;
    candle.high = candle.high.max(candle.open).max(candle.close);
    candle.low = candle.low.min(candle.open).min(candle.close);
}

impl Default for CandleStreamBuffer {
    fn default() -> Self {
        Self::with_defaults()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id() -> InstrumentId {
        InstrumentId::new("AAPL")
    }

    fn candle(time: i64, close: f64) -> Candle {
        Candle::new(time, close, close, close, close, 10.0, Interval::M1)
    }

    #[test]
    fn test_seed_replaces_series() {
        let mut buffer = CandleStreamBuffer::with_defaults();
        buffer.seed(&id(), Interval::M1, vec![candle(60, 1.0), candle(120, 2.0)]);
        assert_eq!(buffer.len(&id(), Interval::M1), 2);

        buffer.seed(&id(), Interval::M1, vec![candle(180, 3.0)]);
        let series = buffer.series(&id(), Interval::M1).unwrap();
        assert_eq!(series.len(), 1);
        assert_eq!(series.last().unwrap().close, 3.0);
        assert!(series.is_seeded());
    }

    #[test]
    fn test_seed_resets_auto_fit() {
        let mut buffer = CandleStreamBuffer::with_defaults();
        buffer.seed(&id(), Interval::M1, vec![candle(60, 1.0)]);
        assert!(buffer.series(&id(), Interval::M1).unwrap().needs_auto_fit());

        buffer.acknowledge_auto_fit(&id(), Interval::M1);
        assert!(!buffer.series(&id(), Interval::M1).unwrap().needs_auto_fit());

        // Live ticks do not reset the flag, a re-seed does
        buffer.merge(&id(), Interval::M1, candle(120, 2.0));
        assert!(!buffer.series(&id(), Interval::M1).unwrap().needs_auto_fit());
        buffer.seed(&id(), Interval::M1, vec![candle(60, 1.0)]);
        assert!(buffer.series(&id(), Interval::M1).unwrap().needs_auto_fit());
    }

    #[test]
    fn test_seed_truncates_and_filters_interval() {
        let config = BufferConfig {
            max_len: 2,
            ..BufferConfig::default()
        };
        let mut buffer = CandleStreamBuffer::new(config);
        let mut foreign = candle(30, 9.0);
        foreign.interval = Interval::H1;
        let len = buffer.seed(
            &id(),
            Interval::M1,
            vec![candle(60, 1.0), foreign, candle(120, 2.0), candle(180, 3.0)],
        );
        assert_eq!(len, 2);
        let closes: Vec<f64> = buffer
            .series(&id(), Interval::M1)
            .unwrap()
            .iter()
            .map(|c| c.close)
            .collect();
        assert_eq!(closes, vec![2.0, 3.0]);
    }

    #[test]
    fn test_merge_same_time_replaces() {
        let mut buffer = CandleStreamBuffer::with_defaults();
        buffer.seed(&id(), Interval::M1, vec![candle(60, 1.0), candle(120, 2.0)]);

        let outcome = buffer.merge(&id(), Interval::M1, candle(120, 2.5));
        assert_eq!(outcome, MergeOutcome::Replaced);
        assert_eq!(buffer.len(&id(), Interval::M1), 2);
        assert_eq!(buffer.series(&id(), Interval::M1).unwrap().last().unwrap().close, 2.5);
    }

    #[test]
    fn test_merge_new_time_appends() {
        let mut buffer = CandleStreamBuffer::with_defaults();
        buffer.seed(&id(), Interval::M1, vec![candle(60, 1.0)]);

        let outcome = buffer.merge(&id(), Interval::M1, candle(120, 2.0));
        assert_eq!(outcome, MergeOutcome::Appended { evicted: 0 });
        assert_eq!(buffer.len(&id(), Interval::M1), 2);
        assert_eq!(buffer.ticks_merged(), 1);
    }

    #[test]
    fn test_merge_interval_mismatch_ignored() {
        let mut buffer = CandleStreamBuffer::with_defaults();
        buffer.seed(&id(), Interval::M1, vec![candle(60, 1.0)]);
        let version = buffer.version(&id(), Interval::M1);

        let mut tick = candle(120, 2.0);
        tick.interval = Interval::M5;
        let outcome = buffer.merge(&id(), Interval::M1, tick);
        assert_eq!(outcome, MergeOutcome::Ignored(IgnoreReason::IntervalMismatch));
        assert_eq!(buffer.len(&id(), Interval::M1), 1);
        assert_eq!(buffer.version(&id(), Interval::M1), version);
        assert_eq!(buffer.ticks_ignored(), 1);
    }

    #[test]
    fn test_bounded_eviction() {
        let config = BufferConfig {
            max_len: 3,
            ..BufferConfig::default()
        };
        let mut buffer = CandleStreamBuffer::new(config);
        buffer.seed(&id(), Interval::M1, vec![candle(60, 1.0), candle(120, 2.0), candle(180, 3.0)]);

        let outcome = buffer.merge(&id(), Interval::M1, candle(240, 4.0));
        assert_eq!(outcome, MergeOutcome::Appended { evicted: 1 });
        let series = buffer.series(&id(), Interval::M1).unwrap();
        assert_eq!(series.len(), 3);
        assert_eq!(series.iter().next().unwrap().time, 120);
    }

    #[test]
    fn test_default_cap_is_500() {
        let mut buffer = CandleStreamBuffer::with_defaults();
        for i in 0..600 {
            buffer.merge(&id(), Interval::M1, candle(i * 60, i as f64));
        }
        let series = buffer.series(&id(), Interval::M1).unwrap();
        assert_eq!(series.len(), 500);
        assert_eq!(series.iter().next().unwrap().time, 100 * 60);
    }

    #[test]
    fn test_out_of_order_append_policy() {
        let mut buffer = CandleStreamBuffer::with_defaults();
        buffer.seed(&id(), Interval::M1, vec![candle(60, 1.0), candle(120, 2.0)]);

        let outcome = buffer.merge(&id(), Interval::M1, candle(30, 0.5));
        assert_eq!(outcome, MergeOutcome::Appended { evicted: 0 });
        assert_eq!(buffer.out_of_order_ticks(), 1);
        // Unsorted tail is preserved as delivered
        assert_eq!(buffer.series(&id(), Interval::M1).unwrap().last().unwrap().time, 30);
    }

    #[test]
    fn test_out_of_order_reject_policy() {
        let config = BufferConfig {
            out_of_order: OutOfOrderPolicy::Reject,
            ..BufferConfig::default()
        };
        let mut buffer = CandleStreamBuffer::new(config);
        buffer.seed(&id(), Interval::M1, vec![candle(60, 1.0), candle(120, 2.0)]);

        let outcome = buffer.merge(&id(), Interval::M1, candle(30, 0.5));
        assert_eq!(outcome, MergeOutcome::Ignored(IgnoreReason::OutOfOrder));
        assert_eq!(buffer.len(&id(), Interval::M1), 2);
    }

    #[test]
    fn test_require_seed_and_alignment() {
        let config = BufferConfig {
            require_seed: true,
            align_to_bucket: true,
            ..BufferConfig::default()
        };
        let mut buffer = CandleStreamBuffer::new(config);
        assert_eq!(
            buffer.merge(&id(), Interval::M1, candle(65, 1.0)),
            MergeOutcome::Ignored(IgnoreReason::NotSeeded)
        );

        buffer.seed(&id(), Interval::M1, vec![candle(60, 1.0)]);
        // 65s falls in the 60s bucket
        assert_eq!(buffer.merge(&id(), Interval::M1, candle(65, 1.5)), MergeOutcome::Replaced);
        assert_eq!(buffer.series(&id(), Interval::M1).unwrap().last().unwrap().time, 60);
    }

    #[test]
    fn test_continuity_clamps_appended_candle() {
        let config = BufferConfig {
            enforce_continuity: true,
            ..BufferConfig::default()
        };
        let mut buffer = CandleStreamBuffer::new(config);
        buffer.seed(&id(), Interval::M1, vec![candle(60, 10.0)]);

        // gapped open and a wick that excludes the previous close
        let tick = Candle::new(120, 12.0, 12.5, 11.5, 12.2, 5.0, Interval::M1);
        assert_eq!(buffer.merge(&id(), Interval::M1, tick), MergeOutcome::Appended { evicted: 0 });
        let last = *buffer.series(&id(), Interval::M1).unwrap().last().unwrap();
        assert_eq!(last.open, 10.0);
        assert_eq!(last.high, 12.5);
        assert_eq!(last.low, 10.0);
        assert_eq!(last.close, 12.2);

        // a same-bucket replace is taken as delivered
        let update = Candle::new(120, 12.0, 12.6, 11.9, 12.4, 6.0, Interval::M1);
        assert_eq!(buffer.merge(&id(), Interval::M1, update), MergeOutcome::Replaced);
        assert_eq!(buffer.series(&id(), Interval::M1).unwrap().last().unwrap().open, 12.0);
    }

    #[test]
    fn test_continuity_off_by_default() {
        let mut buffer = CandleStreamBuffer::with_defaults();
        buffer.seed(&id(), Interval::M1, vec![candle(60, 10.0)]);
        buffer.merge(&id(), Interval::M1, Candle::new(120, 12.0, 12.5, 11.5, 12.2, 5.0, Interval::M1));
        let last = buffer.series(&id(), Interval::M1).unwrap().last().unwrap();
        assert_eq!(last.open, 12.0);
        assert_eq!(last.low, 11.5);
    }

    #[test]
    fn test_versions_are_monotonic_across_reseed() {
        let mut buffer = CandleStreamBuffer::with_defaults();
        buffer.seed(&id(), Interval::M1, vec![candle(60, 1.0)]);
        let v1 = buffer.version(&id(), Interval::M1);
        buffer.merge(&id(), Interval::M1, candle(120, 2.0));
        let v2 = buffer.version(&id(), Interval::M1);
        assert!(buffer.clear(&id(), Interval::M1));
        assert_eq!(buffer.version(&id(), Interval::M1), 0);
        buffer.seed(&id(), Interval::M1, vec![]);
        let v3 = buffer.version(&id(), Interval::M1);
        assert!(v1 < v2 && v2 < v3);
    }
}
