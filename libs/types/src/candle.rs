//! OHLCV candles
//!
//! Two shapes live here:
//! - [`Candle`]: the canonical, fully-populated record every chart
//!   computation works on (epoch-second time, finite `f64` fields).
//! - [`RawCandle`]: the record as the history endpoint and the live stream
//!   deliver it. Times arrive as RFC 3339 strings or epoch numbers, prices
//!   may be numbers, numeric strings, `null` or missing entirely.
//!
//! Turning a `RawCandle` into a `Candle` is the sanitizer's job; this module
//! only provides the per-field coercions.

use chrono::DateTime;
use serde::{Deserialize, Serialize};

use crate::errors::ParseError;
use crate::ids::InstrumentId;
use crate::interval::Interval;

/// Epoch values at or above this magnitude are taken to be milliseconds.
/// (1e11 seconds is past the year 5000.)
const MILLIS_THRESHOLD: i64 = 100_000_000_000;

/// A single OHLCV candle.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    /// Bucket start, epoch seconds.
    pub time: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
    pub interval: Interval,
}

impl Candle {
    pub fn new(
        time: i64,
        open: f64,
        high: f64,
        low: f64,
        close: f64,
        volume: f64,
        interval: Interval,
    ) -> Self {
        Self {
            time,
            open,
            high,
            low,
            close,
            volume,
            interval,
        }
    }

    /// Whether every numeric field is finite.
    pub fn is_finite(&self) -> bool {
        self.open.is_finite()
            && self.high.is_finite()
            && self.low.is_finite()
            && self.close.is_finite()
            && self.volume.is_finite()
    }

    /// Up candle (close at or above open). Drives volume bar colouring.
    pub fn is_rising(&self) -> bool {
        self.close >= self.open
    }

    /// Typical price `(high + low + close) / 3`.
    pub fn typical_price(&self) -> f64 {
        (self.high + self.low + self.close) / 3.0
    }
}

/// A numeric field as it appears on the wire: a JSON number or a string.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawNumber {
    Number(f64),
    Text(String),
}

impl RawNumber {
    /// Coerce to `f64`. Unparseable strings yield `None`; the result may
    /// still be non-finite (e.g. `"NaN"`), callers check that separately.
    pub fn to_f64(&self) -> Option<f64> {
        match self {
            RawNumber::Number(n) => Some(*n),
            RawNumber::Text(s) => s.trim().parse::<f64>().ok(),
        }
    }
}

impl From<f64> for RawNumber {
    fn from(value: f64) -> Self {
        RawNumber::Number(value)
    }
}

/// A timestamp as it appears on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawTime {
    /// Epoch seconds or epoch milliseconds.
    Integer(i64),
    /// Fractional epoch value.
    Float(f64),
    /// RFC 3339 string, or a numeric string.
    Text(String),
}

impl RawTime {
    /// Coerce to integer epoch seconds.
    pub fn to_epoch_secs(&self) -> Result<i64, ParseError> {
        match self {
            RawTime::Integer(t) => Ok(normalize_epoch(*t)),
            RawTime::Float(t) => {
                if !t.is_finite() || t.abs() >= i64::MAX as f64 {
                    return Err(ParseError::InvalidTimestamp(t.to_string()));
                }
                Ok(normalize_epoch(t.floor() as i64))
            }
            RawTime::Text(s) => {
                let trimmed = s.trim();
                if let Ok(t) = trimmed.parse::<i64>() {
                    return Ok(normalize_epoch(t));
                }
                DateTime::parse_from_rfc3339(trimmed)
                    .map(|dt| dt.timestamp())
                    .map_err(|_| ParseError::InvalidTimestamp(s.clone()))
            }
        }
    }
}

fn normalize_epoch(t: i64) -> i64 {
    if t.abs() >= MILLIS_THRESHOLD {
        t.div_euclid(1000)
    } else {
        t
    }
}

/// A candle record exactly as received from the backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawCandle {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instrument_id: Option<InstrumentId>,
    /// Interval label; kept as text so one bad tag cannot fail a whole batch.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interval: Option<String>,
    pub time: RawTime,
    #[serde(default)]
    pub open: Option<RawNumber>,
    #[serde(default)]
    pub high: Option<RawNumber>,
    #[serde(default)]
    pub low: Option<RawNumber>,
    #[serde(default)]
    pub close: Option<RawNumber>,
    #[serde(default)]
    pub volume: Option<RawNumber>,
}

impl RawCandle {
    /// Parsed interval tag, `None` when absent.
    pub fn interval(&self) -> Option<Result<Interval, ParseError>> {
        self.interval.as_deref().map(str::parse)
    }

    /// Whether all four price fields are present (not missing, not `null`).
    pub fn has_prices(&self) -> bool {
        self.open.is_some() && self.high.is_some() && self.low.is_some() && self.close.is_some()
    }
}

impl From<Candle> for RawCandle {
    fn from(candle: Candle) -> Self {
        Self {
            instrument_id: None,
            interval: Some(candle.interval.as_str().to_string()),
            time: RawTime::Integer(candle.time),
            open: Some(candle.open.into()),
            high: Some(candle.high.into()),
            low: Some(candle.low.into()),
            close: Some(candle.close.into()),
            volume: Some(candle.volume.into()),
        }
    }
}
