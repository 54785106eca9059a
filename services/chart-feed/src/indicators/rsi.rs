//! Relative Strength Index with Wilder smoothing.

/// Default RSI lookback.
pub const DEFAULT_RSI_PERIOD: usize = 14;

/// Relative Strength Index.
///
/// The first average gain/loss is the plain mean of the first `period`
/// price changes; later averages use Wilder smoothing
/// `avg = (avg·(period−1) + x) / period`. `RSI = 100 − 100/(1+RS)`.
/// A window without losses reads 100.
///
/// Needs `period + 1` values and returns `n − period` values in `[0, 100]`.
pub fn rsi(values: &[f64], period: usize) -> Vec<f64> {
    if period == 0 || values.len() <= period {
        return Vec::new();
    }
    let p = period as f64;

    let mut gain_sum = 0.0;
    let mut loss_sum = 0.0;
    for pair in values[..=period].windows(2) {
        let change = pair[1] - pair[0];
        if change > 0.0 {
            gain_sum += change;
        } else {
            loss_sum -= change;
        }
    }
    let mut avg_gain = gain_sum / p;
    let mut avg_loss = loss_sum / p;

    let mut out = Vec::with_capacity(values.len() - period);
    out.push(rsi_value(avg_gain, avg_loss));

    for pair in values[period..].windows(2) {
        let change = pair[1] - pair[0];
        let gain = if change > 0.0 { change } else { 0.0 };
        let loss = if change < 0.0 { -change } else { 0.0 };
        avg_gain = (avg_gain * (p - 1.0) + gain) / p;
        avg_loss = (avg_loss * (p - 1.0) + loss) / p;
        out.push(rsi_value(avg_gain, avg_loss));
    }
    out
}

fn rsi_value(avg_gain: f64, avg_loss: f64) -> f64 {
    if avg_loss == 0.0 {
        return 100.0;
    }
    let rs = avg_gain / avg_loss;
    (100.0 - 100.0 / (1.0 + rs)).clamp(0.0, 100.0)
}
