//! Simple and exponential moving averages.

/// Simple moving average: mean of each trailing `period` window.
///
/// Returns `n - period + 1` values, or nothing when `n < period`.
pub fn sma(values: &[f64], period: usize) -> Vec<f64> {
    if period == 0 || values.len() < period {
        return Vec::new();
    }
    let p = period as f64;
    values
        .windows(period)
        .map(|w| w.iter().sum::<f64>() / p)
        .collect()
}

/// Exponential moving average seeded with the SMA of the first `period`
/// values, then `ema = value·k + prev·(1−k)` with `k = 2/(period+1)`.
///
/// Same length as [`sma`] for the same input.
pub fn ema(values: &[f64], period: usize) -> Vec<f64> {
    if period == 0 || values.len() < period {
        return Vec::new();
    }
    let k = 2.0 / (period as f64 + 1.0);
    let seed = values[..period].iter().sum::<f64>() / period as f64;

    let mut out = Vec::with_capacity(values.len() - period + 1);
    out.push(seed);
    let mut prev = seed;
    for &value in &values[period..] {
        prev = value * k + prev * (1.0 - k);
        out.push(prev);
    }
    out
}
