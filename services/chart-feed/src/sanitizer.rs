//! Candle sanitation
//!
//! Normalizes whatever the history endpoint or the stream delivered into the
//! canonical series every downstream computation derives from:
//!
//! 1. drop candles timestamped after `now`
//! 2. drop candles missing open, high, low or close
//! 3. coerce time to epoch seconds and all prices/volume to `f64`
//! 4. stable sort ascending by time
//! 5. keep only the first candle at each distinct time
//!
//! Records whose time cannot be parsed or whose values are non-finite are
//! dropped as malformed. Nothing here fails; bad input only shrinks the
//! output. All functions are pure.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::debug;
use types::candle::{Candle, RawCandle, RawNumber};
use types::interval::Interval;

/// Why a raw record was dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    /// Time could not be parsed.
    BadTime,
    /// Time is after "now".
    FutureTime,
    /// One of open/high/low/close is missing or null.
    MissingPrice,
    /// Interval tag present but not a supported label.
    BadInterval,
    /// A price or volume did not coerce to a finite number.
    NonFinite,
}

/// Coerce a single raw record into a `Candle`.
///
/// `default_interval` is used when the record carries no interval tag.
pub fn normalize(raw: &RawCandle, default_interval: Interval, now: i64) -> Result<Candle, Rejection> {
    let time = raw.time.to_epoch_secs().map_err(|_| Rejection::BadTime)?;
    if time > now {
        return Err(Rejection::FutureTime);
    }
    if !raw.has_prices() {
        return Err(Rejection::MissingPrice);
    }
    let interval = match raw.interval() {
        Some(Ok(interval)) => interval,
        Some(Err(_)) => return Err(Rejection::BadInterval),
        None => default_interval,
    };

    let num = |field: &Option<RawNumber>| field.as_ref().and_then(RawNumber::to_f64);
    let (Some(open), Some(high), Some(low), Some(close)) =
        (num(&raw.open), num(&raw.high), num(&raw.low), num(&raw.close))
    else {
        return Err(Rejection::NonFinite);
    };
    let volume = match &raw.volume {
        None => 0.0,
        Some(v) => v.to_f64().ok_or(Rejection::NonFinite)?,
    };

    let candle = Candle::new(time, open, high, low, close, volume, interval);
    if !candle.is_finite() {
        return Err(Rejection::NonFinite);
    }
    Ok(candle)
}

/// Sanitize a raw batch against an explicit "now" (epoch seconds).
pub fn sanitize(raw: &[RawCandle], default_interval: Interval, now: i64) -> Vec<Candle> {
    let mut dropped = 0usize;
    let candles: Vec<Candle> = raw
        .iter()
        .filter_map(|record| match normalize(record, default_interval, now) {
            Ok(candle) => Some(candle),
            Err(reason) => {
                dropped += 1;
                debug!(?reason, time = ?record.time, "Skipping invalid candle data");
                None
            }
        })
        .collect();

    let out = sort_and_dedup(candles);
    if dropped > 0 {
        debug!(input = raw.len(), output = out.len(), dropped, "Sanitized candle batch");
    }
    out
}

/// Sanitize a raw batch against the wall clock.
pub fn sanitize_now(raw: &[RawCandle], default_interval: Interval) -> Vec<Candle> {
    sanitize(raw, default_interval, Utc::now().timestamp())
}

/// Re-sanitize an already typed series (e.g. the live buffer after a merge).
///
/// Same steps as [`sanitize`]; the coercion step is a no-op for typed
/// candles apart from dropping non-finite values.
pub fn sanitize_candles<'a, I>(candles: I, now: i64) -> Vec<Candle>
where
    I: IntoIterator<Item = &'a Candle>,
{
    let kept: Vec<Candle> = candles
        .into_iter()
        .filter(|c| c.time <= now && c.is_finite())
        .copied()
        .collect();
    sort_and_dedup(kept)
}

fn sort_and_dedup(mut candles: Vec<Candle>) -> Vec<Candle> {
    // sort_by_key is stable, so the first record per time wins the dedup
    candles.sort_by_key(|c| c.time);
    candles.dedup_by_key(|c| c.time);
    candles
}

/// One volume histogram bar.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VolumeBar {
    pub time: i64,
    pub value: f64,
    /// Close at or above open.
    pub rising: bool,
}

/// Derive volume bars from a sanitized series.
pub fn volume_bars(candles: &[Candle]) -> Vec<VolumeBar> {
    candles
        .iter()
        .map(|c| VolumeBar {
            time: c.time,
            value: c.volume,
            rising: c.is_rising(),
        })
        .collect()
}
