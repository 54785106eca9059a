//! End-to-end pipeline tests for the chart feed
//!
//! Walks candles from raw wire records through sanitation, buffering,
//! indicators and layout, the same path a chart view takes.
//!
//! Tests include:
//! - History seed then SMA
//! - Live tick replacing the open bucket
//! - Oscillator pane layout
//! - Partial snapshot batches
//! - Sanitizer idempotence (property)

use async_trait::async_trait;
use chart_feed::buffer::{CandleStreamBuffer, MergeOutcome};
use chart_feed::error::FeedError;
use chart_feed::indicators::{self, closes, sma, IndicatorKind, IndicatorOutput};
use chart_feed::layout::{allocate, ActiveOscillators};
use chart_feed::preferences::IndicatorPreferences;
use chart_feed::sanitizer::{sanitize, sanitize_candles};
use chart_feed::snapshot_cache::{PriceSnapshotCache, RefreshOutcome};
use chart_feed::source::SnapshotSource;
use chrono::Utc;
use proptest::prelude::*;
use types::candle::{Candle, RawCandle, RawNumber, RawTime};
use types::ids::InstrumentId;
use types::interval::Interval;
use types::snapshot::MarketSnapshot;

const NOW: i64 = 1_700_000_000;

fn raw(time: i64, o: f64, h: f64, l: f64, c: f64, v: f64) -> RawCandle {
    RawCandle {
        instrument_id: None,
        interval: None,
        time: RawTime::Integer(time),
        open: Some(RawNumber::Number(o)),
        high: Some(RawNumber::Number(h)),
        low: Some(RawNumber::Number(l)),
        close: Some(RawNumber::Number(c)),
        volume: Some(RawNumber::Number(v)),
    }
}

fn scenario_a_buffer() -> (CandleStreamBuffer, InstrumentId) {
    let instrument = InstrumentId::new("A");
    let candles = sanitize(
        &[raw(1, 10.0, 12.0, 9.0, 11.0, 100.0), raw(2, 11.0, 11.0, 10.0, 10.0, 50.0)],
        Interval::M1,
        NOW,
    );
    let mut buffer = CandleStreamBuffer::with_defaults();
    buffer.seed(&instrument, Interval::M1, candles);
    (buffer, instrument)
}

#[test]
fn test_scenario_a_seed_then_sma() {
    let (buffer, instrument) = scenario_a_buffer();
    let series = buffer.series(&instrument, Interval::M1).unwrap();
    let candles = sanitize_candles(series.iter(), NOW);
    assert_eq!(sma(&closes(&candles), 2), vec![10.5]);
}

#[test]
fn test_scenario_b_tick_replaces_open_bucket() {
    let (mut buffer, instrument) = scenario_a_buffer();
    let tick = Candle::new(2, 11.0, 11.0, 10.0, 10.5, 60.0, Interval::M1);
    assert_eq!(buffer.merge(&instrument, Interval::M1, tick), MergeOutcome::Replaced);

    let series = buffer.series(&instrument, Interval::M1).unwrap();
    assert_eq!(series.len(), 2);
    let last = series.last().unwrap();
    assert_eq!(last.close, 10.5);
    assert_eq!(last.volume, 60.0);
}

#[test]
fn test_scenario_c_both_oscillators() {
    let layout = allocate(ActiveOscillators { rsi: true, macd: true });
    assert_eq!(layout.main.top, 0.05);
    assert_eq!(layout.main.bottom, 0.55);
    let rsi = layout.rsi.unwrap();
    assert_eq!((rsi.top, rsi.bottom), (0.45, 0.30));
    assert_eq!(layout.macd.unwrap().top, 0.75);
    assert_eq!(layout.rsi_reference_lines(), Some([70.0, 30.0]));
}

#[test]
fn test_layout_follows_preferences() {
    let instrument = InstrumentId::new("A");
    let mut prefs = IndicatorPreferences::new();
    assert_eq!(allocate(prefs.active_oscillators(&instrument)).main.bottom, 0.15);
    prefs.toggle(&instrument, IndicatorKind::Macd);
    assert_eq!(allocate(prefs.active_oscillators(&instrument)).main.bottom, 0.35);
    prefs.toggle(&instrument, IndicatorKind::Rsi);
    assert_eq!(allocate(prefs.active_oscillators(&instrument)).main.bottom, 0.55);
}

struct OnlyA;

#[async_trait]
impl SnapshotSource for OnlyA {
    async fn fetch_snapshots(&self, _ids: &[InstrumentId]) -> Result<Vec<MarketSnapshot>, FeedError> {
        Ok(vec![snapshot("A", 101.0)])
    }
}

fn snapshot(id: &str, price: f64) -> MarketSnapshot {
    MarketSnapshot {
        instrument_id: InstrumentId::new(id),
        symbol: id.to_string(),
        last_price: price,
        change: 1.0,
        change_pct: 1.0,
        prev_close: price - 1.0,
        open: price - 1.0,
        high: price,
        low: price - 1.0,
        volume: 1_000.0,
        updated_at: Utc::now(),
    }
}

#[tokio::test]
async fn test_scenario_d_partial_batch() {
    let a = InstrumentId::new("A");
    let b = InstrumentId::new("B");
    let mut cache = PriceSnapshotCache::new();
    cache.apply(vec![snapshot("A", 100.0), snapshot("B", 50.0)]);
    let b_before = cache.get(&b).cloned();

    let outcome = cache.refresh(&OnlyA, &[a.clone(), b.clone()]).await.unwrap();
    assert_eq!(outcome, RefreshOutcome::Merged { updated: 1 });
    assert_eq!(cache.get(&a).unwrap().last_price, 101.0);
    assert_eq!(cache.get(&b).cloned(), b_before);
    assert!(cache.get(&InstrumentId::new("C")).is_none());
}

#[test]
fn test_buffer_cap_and_indicators_over_long_history() {
    let instrument = InstrumentId::new("A");
    let mut buffer = CandleStreamBuffer::with_defaults();
    buffer.seed(&instrument, Interval::M1, vec![]);
    for i in 0..600i64 {
        let price = 100.0 + (i as f64 * 0.1).sin() * 5.0;
        buffer.merge(
            &instrument,
            Interval::M1,
            Candle::new(i * 60, price, price + 1.0, price - 1.0, price, 10.0, Interval::M1),
        );
    }
    let series = buffer.series(&instrument, Interval::M1).unwrap();
    assert_eq!(series.len(), 500);
    assert_eq!(series.iter().next().unwrap().time, 100 * 60);

    let candles = sanitize_candles(series.iter(), NOW);
    let prefs = IndicatorPreferences::new().get(&instrument);
    for kind in IndicatorKind::all() {
        let result = indicators::compute(*kind, prefs.get(*kind), &candles);
        assert!(result.warnings.is_empty(), "{kind}: {:?}", result.warnings);
        match &result.output {
            IndicatorOutput::Lines(lines) => {
                for line in lines {
                    assert_eq!(line.offset + line.len(), candles.len());
                }
            }
            IndicatorOutput::Macd(series) => assert_eq!(series.offset + series.len(), candles.len()),
            IndicatorOutput::Bollinger(series) => assert_eq!(series.offset + series.len(), candles.len()),
        }
    }
}

fn raw_candle_strategy() -> impl Strategy<Value = RawCandle> {
    (
        0i64..200,
        prop::option::of(1.0f64..1000.0),
        1.0f64..1000.0,
        0.0f64..10_000.0,
    )
        .prop_map(|(time, close, open, volume)| RawCandle {
            instrument_id: None,
            interval: None,
            time: RawTime::Integer(time),
            open: Some(RawNumber::Number(open)),
            high: Some(RawNumber::Number(open.max(close.unwrap_or(open)) + 1.0)),
            low: Some(RawNumber::Number(open.min(close.unwrap_or(open)) - 0.5)),
            close: close.map(RawNumber::Number),
            volume: Some(RawNumber::Text(volume.to_string())),
        })
}

proptest! {
    #[test]
    fn prop_sanitize_is_idempotent(input in prop::collection::vec(raw_candle_strategy(), 0..60)) {
        let once = sanitize(&input, Interval::M1, 150);
        let replayed: Vec<RawCandle> = once.iter().copied().map(RawCandle::from).collect();
        prop_assert_eq!(&sanitize(&replayed, Interval::M1, 150), &once);
        prop_assert_eq!(&sanitize_candles(&once, 150), &once);
        prop_assert!(once.windows(2).all(|w| w[0].time < w[1].time));
        prop_assert!(once.iter().all(|c| c.time <= 150));
    }
}
