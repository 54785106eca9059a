//! Technical indicator engine
//!
//! Pure functions over the sanitized close series (or the full candle series
//! for VWAP). They share one data-sufficiency policy: an input shorter than
//! the indicator's minimum length yields an empty output, never a padded or
//! partial one.
//!
//! Outputs are tail-aligned: `output[i]` belongs to
//! `input[input_len - output_len + i]`. [`Series`] carries that offset so
//! the rendering side can pair values with candle times without recomputing
//! it.
//!
//! | Indicator | Minimum length |
//! |---|---|
//! | SMA(p), EMA(p), Bollinger(p) | p |
//! | RSI(p) | p + 1 |
//! | MACD(fast, slow, signal) | slow + signal |
//! | VWAP | none |

pub mod bollinger;
pub mod macd;
pub mod moving_average;
pub mod rsi;
pub mod vwap;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use types::candle::Candle;

use crate::preferences::{IndicatorConfig, IndicatorSettings};

pub use bollinger::{bollinger_bands, BollingerPoint, DEFAULT_BOLLINGER_PERIOD, DEFAULT_STD_DEV};
pub use macd::{
    macd, macd_min_length, MacdPoint, DEFAULT_FAST_PERIOD, DEFAULT_SIGNAL_PERIOD,
    DEFAULT_SLOW_PERIOD,
};
pub use moving_average::{ema, sma};
pub use rsi::{rsi, DEFAULT_RSI_PERIOD};
pub use vwap::vwap;

/// Default SMA periods when none are configured.
pub const DEFAULT_SMA_PERIODS: [usize; 3] = [20, 50, 200];
/// Default EMA periods when none are configured.
pub const DEFAULT_EMA_PERIODS: [usize; 3] = [9, 21, 50];

/// Stable tag for each indicator the chart offers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum IndicatorKind {
    Sma,
    Ema,
    Rsi,
    Macd,
    BollingerBands,
    Vwap,
}

impl IndicatorKind {
    /// All kinds in display order.
    pub fn all() -> &'static [IndicatorKind] {
        &[
            IndicatorKind::Sma,
            IndicatorKind::Ema,
            IndicatorKind::Rsi,
            IndicatorKind::Macd,
            IndicatorKind::BollingerBands,
            IndicatorKind::Vwap,
        ]
    }

    /// Oscillators get their own sub-pane; everything else overlays price.
    pub fn is_oscillator(&self) -> bool {
        matches!(self, IndicatorKind::Rsi | IndicatorKind::Macd)
    }

    /// Key used in preference storage.
    pub fn as_str(&self) -> &'static str {
        match self {
            IndicatorKind::Sma => "sma",
            IndicatorKind::Ema => "ema",
            IndicatorKind::Rsi => "rsi",
            IndicatorKind::Macd => "macd",
            IndicatorKind::BollingerBands => "bollingerBands",
            IndicatorKind::Vwap => "vwap",
        }
    }
}

impl fmt::Display for IndicatorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for IndicatorKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        IndicatorKind::all()
            .iter()
            .copied()
            .find(|kind| kind.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unknown indicator: {s}"))
    }
}

/// A tail-aligned indicator series.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Series<T> {
    /// Display label, e.g. `SMA(20)`.
    pub label: String,
    /// Index of the input candle the first point belongs to.
    pub offset: usize,
    pub points: Vec<T>,
}

/// A single-valued line.
pub type Line = Series<f64>;

impl<T> Series<T> {
    /// Wrap a computed output, deriving the offset from the input length.
    pub fn aligned(label: impl Into<String>, input_len: usize, points: Vec<T>) -> Self {
        Self {
            label: label.into(),
            offset: tail_offset(input_len, points.len()),
            points,
        }
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Pair each point with the time of the candle it belongs to.
    pub fn with_times<'a>(&'a self, candles: &'a [Candle]) -> impl Iterator<Item = (i64, &'a T)> + 'a {
        candles
            .iter()
            .skip(self.offset)
            .map(|c| c.time)
            .zip(self.points.iter())
    }
}

/// Computed output for one indicator kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "series", rename_all = "camelCase")]
pub enum IndicatorOutput {
    /// SMA/EMA (one line per period), RSI, VWAP.
    Lines(Vec<Line>),
    Macd(Series<MacdPoint>),
    Bollinger(Series<BollingerPoint>),
}

impl IndicatorOutput {
    /// Whether nothing was produced (all lines empty).
    pub fn is_empty(&self) -> bool {
        match self {
            IndicatorOutput::Lines(lines) => lines.iter().all(Series::is_empty),
            IndicatorOutput::Macd(series) => series.is_empty(),
            IndicatorOutput::Bollinger(series) => series.is_empty(),
        }
    }
}

/// Result of computing one indicator over a candle series.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndicatorResult {
    pub kind: IndicatorKind,
    pub output: IndicatorOutput,
    /// Advisory insufficient-data messages; computation is unaffected.
    pub warnings: Vec<String>,
}

/// `input_len - output_len`, the alignment offset of a tail-aligned output.
pub fn tail_offset(input_len: usize, output_len: usize) -> usize {
    input_len.saturating_sub(output_len)
}

/// Closing prices of a candle series.
pub fn closes(candles: &[Candle]) -> Vec<f64> {
    candles.iter().map(|c| c.close).collect()
}

/// Advisory message when fewer candles are available than required.
pub fn sufficiency_warning(indicator: &str, required: usize, available: usize) -> Option<String> {
    if available < required {
        Some(format!(
            "{indicator} requires {required} candles, only {available} available. Results may be incomplete."
        ))
    } else {
        None
    }
}

/// Periods for SMA/EMA: `periods`, else `period`, else the defaults.
fn line_periods(settings: &IndicatorSettings, defaults: &[usize]) -> Vec<usize> {
    match (&settings.periods, settings.period) {
        (Some(periods), _) if !periods.is_empty() => periods.clone(),
        (_, Some(period)) => vec![period],
        _ => defaults.to_vec(),
    }
}

struct MacdParams {
    fast: usize,
    slow: usize,
    signal: usize,
}

fn macd_params(settings: &IndicatorSettings) -> MacdParams {
    MacdParams {
        fast: settings.fast_period.unwrap_or(DEFAULT_FAST_PERIOD),
        slow: settings.slow_period.unwrap_or(DEFAULT_SLOW_PERIOD),
        signal: settings.signal_period.unwrap_or(DEFAULT_SIGNAL_PERIOD),
    }
}

/// Minimum input length for an indicator to produce any output.
pub fn min_length(kind: IndicatorKind, settings: &IndicatorSettings) -> usize {
    match kind {
        IndicatorKind::Sma => line_periods(settings, &DEFAULT_SMA_PERIODS).into_iter().min().unwrap_or(0),
        IndicatorKind::Ema => line_periods(settings, &DEFAULT_EMA_PERIODS).into_iter().min().unwrap_or(0),
        IndicatorKind::Rsi => settings.period.unwrap_or(DEFAULT_RSI_PERIOD).saturating_add(1),
        IndicatorKind::Macd => {
            let p = macd_params(settings);
            macd_min_length(p.fast, p.slow, p.signal)
        }
        IndicatorKind::BollingerBands => settings.period.unwrap_or(DEFAULT_BOLLINGER_PERIOD),
        IndicatorKind::Vwap => 1,
    }
}

/// Compute one indicator over a sanitized candle series using its settings.
pub fn compute(kind: IndicatorKind, config: &IndicatorConfig, candles: &[Candle]) -> IndicatorResult {
    let settings = &config.settings;
    let n = candles.len();
    let mut warnings = Vec::new();
    let mut check = |label: &str, required: usize| {
        if let Some(warning) = sufficiency_warning(label, required, n) {
            warnings.push(warning);
        }
    };

    let output = match kind {
        IndicatorKind::Sma | IndicatorKind::Ema => {
            let (name, defaults): (&str, &[usize]) = if kind == IndicatorKind::Sma {
                ("SMA", &DEFAULT_SMA_PERIODS)
            } else {
                ("EMA", &DEFAULT_EMA_PERIODS)
            };
            let values = closes(candles);
            let lines = line_periods(settings, defaults)
                .into_iter()
                .map(|period| {
                    let label = format!("{name}({period})");
                    check(&label, period);
                    let points = if kind == IndicatorKind::Sma {
                        sma(&values, period)
                    } else {
                        ema(&values, period)
                    };
                    Series::aligned(label, n, points)
                })
                .collect();
            IndicatorOutput::Lines(lines)
        }
        IndicatorKind::Rsi => {
            let period = settings.period.unwrap_or(DEFAULT_RSI_PERIOD);
            let label = format!("RSI({period})");
            check(&label, period.saturating_add(1));
            let points = rsi(&closes(candles), period);
            IndicatorOutput::Lines(vec![Series::aligned(label, n, points)])
        }
        IndicatorKind::Macd => {
            let p = macd_params(settings);
            let label = format!("MACD({},{},{})", p.fast, p.slow, p.signal);
            check(&label, macd_min_length(p.fast, p.slow, p.signal));
            let points = macd(&closes(candles), p.fast, p.slow, p.signal);
            IndicatorOutput::Macd(Series::aligned(label, n, points))
        }
        IndicatorKind::BollingerBands => {
            let period = settings.period.unwrap_or(DEFAULT_BOLLINGER_PERIOD);
            let std_dev = settings.std_dev.unwrap_or(DEFAULT_STD_DEV);
            let label = format!("BB({period},{std_dev})");
            check(&label, period);
            let points = bollinger_bands(&closes(candles), period, std_dev);
            IndicatorOutput::Bollinger(Series::aligned(label, n, points))
        }
        IndicatorKind::Vwap => IndicatorOutput::Lines(vec![Series::aligned("VWAP", n, vwap(candles))]),
    };

    IndicatorResult {
        kind,
        output,
        warnings,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use types::interval::Interval;

    fn candles(closes: &[f64]) -> Vec<Candle> {
        closes
            .iter()
            .enumerate()
            .map(|(i, &c)| Candle::new(i as i64 * 60, c, c + 1.0, c - 1.0, c, 10.0, Interval::M1))
            .collect()
    }

    fn config_with(settings: IndicatorSettings) -> IndicatorConfig {
        IndicatorConfig {
            enabled: true,
            settings,
            color: None,
            line_width: 2,
        }
    }

    #[test]
    fn test_kind_labels_and_oscillators() {
        assert_eq!(IndicatorKind::BollingerBands.as_str(), "bollingerBands");
        assert_eq!(
            serde_json::to_string(&IndicatorKind::BollingerBands).unwrap(),
            "\"bollingerBands\""
        );
        assert_eq!("RSI".parse::<IndicatorKind>(), Ok(IndicatorKind::Rsi));
        assert!("adx".parse::<IndicatorKind>().is_err());
        let oscillators: Vec<_> = IndicatorKind::all().iter().filter(|k| k.is_oscillator()).collect();
        assert_eq!(oscillators, vec![&IndicatorKind::Rsi, &IndicatorKind::Macd]);
    }

    #[test]
    fn test_sufficiency_warning() {
        assert!(sufficiency_warning("SMA(20)", 20, 20).is_none());
        let msg = sufficiency_warning("SMA(200)", 200, 150).unwrap();
        assert!(msg.contains("SMA(200) requires 200 candles, only 150 available"));
    }

    #[test]
    fn test_min_length_per_kind() {
        let defaults = IndicatorSettings::default();
        assert_eq!(min_length(IndicatorKind::Sma, &defaults), 20);
        assert_eq!(min_length(IndicatorKind::Ema, &defaults), 9);
        assert_eq!(min_length(IndicatorKind::Rsi, &defaults), 15);
        assert_eq!(min_length(IndicatorKind::Macd, &defaults), 35);
        assert_eq!(min_length(IndicatorKind::BollingerBands, &defaults), 20);
        assert_eq!(min_length(IndicatorKind::Vwap, &defaults), 1);
    }

    #[test]
    fn test_compute_sma_multi_period_with_warnings() {
        let series = candles(&(0..60).map(|i| i as f64).collect::<Vec<_>>());
        let config = config_with(IndicatorSettings {
            periods: Some(vec![20, 50, 200]),
            ..IndicatorSettings::default()
        });
        let result = compute(IndicatorKind::Sma, &config, &series);
        let IndicatorOutput::Lines(lines) = &result.output else {
            panic!("expected lines");
        };
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0].len(), 41);
        assert_eq!(lines[0].offset, 19);
        assert_eq!(lines[1].len(), 11);
        assert!(lines[2].is_empty());
        assert_eq!(lines[2].offset, 60);
        assert_eq!(result.warnings.len(), 1);
        assert!(result.warnings[0].starts_with("SMA(200)"));
    }

    #[test]
    fn test_compute_single_period_fallback() {
        let series = candles(&[1.0, 2.0, 3.0]);
        let config = config_with(IndicatorSettings {
            period: Some(2),
            ..IndicatorSettings::default()
        });
        let result = compute(IndicatorKind::Ema, &config, &series);
        let IndicatorOutput::Lines(lines) = &result.output else {
            panic!("expected lines");
        };
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].label, "EMA(2)");
        assert_eq!(lines[0].points[0], 1.5);
    }

    #[test]
    fn test_compute_macd_and_bollinger_alignment() {
        let series = candles(&(0..80).map(|i| 100.0 + (i as f64 * 0.4).sin()).collect::<Vec<_>>());
        let config = config_with(IndicatorSettings::default());

        let macd_result = compute(IndicatorKind::Macd, &config, &series);
        let IndicatorOutput::Macd(m) = &macd_result.output else {
            panic!("expected macd");
        };
        assert_eq!(m.offset + m.len(), series.len());
        assert!(macd_result.warnings.is_empty());

        let bb_result = compute(IndicatorKind::BollingerBands, &config, &series);
        let IndicatorOutput::Bollinger(b) = &bb_result.output else {
            panic!("expected bollinger");
        };
        assert_eq!(b.offset, 19);
        assert_eq!(b.label, "BB(20,2)");
    }

    #[test]
    fn test_compute_oversized_periods_is_empty() {
        let series = candles(&[1.0, 2.0, 3.0]);
        let config = config_with(IndicatorSettings {
            period: Some(usize::MAX),
            periods: Some(vec![usize::MAX]),
            fast_period: Some(12),
            slow_period: Some(usize::MAX),
            signal_period: Some(usize::MAX),
            ..IndicatorSettings::default()
        });
        for kind in IndicatorKind::all().iter().copied().filter(|k| *k != IndicatorKind::Vwap) {
            let result = compute(kind, &config, &series);
            assert!(result.output.is_empty(), "{kind} produced output");
            assert_eq!(result.warnings.len(), 1);
            assert_eq!(min_length(kind, &config.settings), usize::MAX);
        }
    }

    #[test]
    fn test_compute_insufficient_is_empty() {
        let series = candles(&[1.0, 2.0]);
        let config = config_with(IndicatorSettings::default());
        for kind in [IndicatorKind::Rsi, IndicatorKind::Macd, IndicatorKind::BollingerBands] {
            let result = compute(kind, &config, &series);
            assert!(result.output.is_empty());
            assert_eq!(result.warnings.len(), 1);
        }
        let vwap_result = compute(IndicatorKind::Vwap, &config, &series);
        assert!(!vwap_result.output.is_empty());
        assert!(vwap_result.warnings.is_empty());
    }

    #[test]
    fn test_with_times_pairs_tail() {
        let series = candles(&[1.0, 2.0, 3.0, 4.0]);
        let line = Series::aligned("SMA(3)", series.len(), sma(&closes(&series), 3));
        let pairs: Vec<(i64, f64)> = line.with_times(&series).map(|(t, v)| (t, *v)).collect();
        assert_eq!(pairs, vec![(120, 2.0), (180, 3.0)]);
    }
}

// ── Property-Based Tests ────────────────────────────────────────────
