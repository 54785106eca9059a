//! Volume Weighted Average Price.

use types::candle::Candle;

/// Cumulative VWAP over the whole supplied window (no session reset).
///
/// Running `Σ(typical·volume) / Σvolume` with `typical = (h+l+c)/3`. While
/// cumulative volume is zero the candle's close stands in. One value per
/// candle.
pub fn vwap(candles: &[Candle]) -> Vec<f64> {
    let mut cumulative_tpv = 0.0;
    let mut cumulative_volume = 0.0;
    candles
        .iter()
        .map(|candle| {
            cumulative_tpv += candle.typical_price() * candle.volume;
            cumulative_volume += candle.volume;
            if cumulative_volume > 0.0 {
                cumulative_tpv / cumulative_volume
            } else {
                candle.close
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use types::interval::Interval;

    fn candle(time: i64, high: f64, low: f64, close: f64, volume: f64) -> Candle {
        Candle::new(time, close, high, low, close, volume, Interval::M1)
    }

    #[test]
    fn test_vwap_empty() {
        assert!(vwap(&[]).is_empty());
    }

    #[test]
    fn test_vwap_cumulative() {
        let candles = [candle(1, 12.0, 9.0, 12.0, 100.0), candle(2, 11.0, 10.0, 9.0, 50.0)];
        let out = vwap(&candles);
        // typical prices 11 and 10
        assert!((out[0] - 11.0).abs() < 1e-12);
        assert!((out[1] - (11.0 * 100.0 + 10.0 * 50.0) / 150.0).abs() < 1e-12);
    }

    #[test]
    fn test_vwap_zero_volume_falls_back_to_close() {
        let candles = [candle(1, 12.0, 9.0, 10.5, 0.0), candle(2, 12.0, 9.0, 11.0, 10.0)];
        let out = vwap(&candles);
        assert_eq!(out[0], 10.5);
        assert!((out[1] - 32.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_vwap_replay_does_not_reset() {
        let first = [candle(1, 12.0, 8.0, 10.0, 100.0), candle(2, 20.0, 16.0, 18.0, 300.0)];
        let doubled: Vec<Candle> = first.iter().chain(first.iter()).copied().collect();
        let once = vwap(&first);
        let twice = vwap(&doubled);
        assert_eq!(twice.len(), 4);
        // Replaying the same candles keeps the cumulative average where it was
        assert!((twice[3] - once[1]).abs() < 1e-12);
        // but the third point reflects the first half, unlike a fresh start
        assert!((twice[2] - once[0]).abs() > 1.0);
    }
}
