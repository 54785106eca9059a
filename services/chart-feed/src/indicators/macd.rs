//! Moving Average Convergence Divergence.

use serde::{Deserialize, Serialize};

use super::moving_average::ema;

pub const DEFAULT_FAST_PERIOD: usize = 12;
pub const DEFAULT_SLOW_PERIOD: usize = 26;
pub const DEFAULT_SIGNAL_PERIOD: usize = 9;

/// One MACD sample.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MacdPoint {
    /// `EMA(fast) − EMA(slow)`
    pub macd: f64,
    /// `EMA(signal)` of the MACD line
    pub signal: f64,
    /// `macd − signal`
    pub histogram: f64,
}

/// Minimum input length for MACD. Saturates for oversized periods.
pub fn macd_min_length(fast: usize, slow: usize, signal: usize) -> usize {
    fast.max(slow).saturating_add(signal)
}

/// MACD with EMA oscillator and EMA signal line.
///
/// Only samples where MACD, signal and histogram are all defined are
/// returned, so the output is tail-aligned to the input. Requires
/// `slow + signal` values.
pub fn macd(values: &[f64], fast: usize, slow: usize, signal: usize) -> Vec<MacdPoint> {
    if fast == 0 || slow == 0 || signal == 0 || values.len() < macd_min_length(fast, slow, signal) {
        return Vec::new();
    }

    let fast_ema = ema(values, fast);
    let slow_ema = ema(values, slow);
    // Index into `values` where both EMAs are defined
    let start = fast.max(slow) - 1;
    let macd_line: Vec<f64> = (start..values.len())
        .map(|i| fast_ema[i + 1 - fast] - slow_ema[i + 1 - slow])
        .collect();

    let signal_line = ema(&macd_line, signal);
    let skip = signal - 1;
    macd_line[skip..]
        .iter()
        .zip(signal_line.iter())
        .map(|(&m, &s)| MacdPoint {
            macd: m,
            signal: s,
            histogram: m - s,
        })
        .collect()
}
