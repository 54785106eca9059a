//! Bollinger Bands with %B.

use serde::{Deserialize, Serialize};

pub const DEFAULT_BOLLINGER_PERIOD: usize = 20;
pub const DEFAULT_STD_DEV: f64 = 2.0;

/// One Bollinger sample.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BollingerPoint {
    pub upper: f64,
    pub middle: f64,
    pub lower: f64,
    /// %B: where the window's last close sits within the band.
    pub pb: f64,
}

/// Bollinger Bands over rolling `period` windows.
///
/// `middle` is the SMA, the bands are `middle ± std_dev·σ` with population
/// σ. `pb = (close − lower)/(upper − lower)`; a zero-width band (flat
/// window) reads 0.5.
pub fn bollinger_bands(values: &[f64], period: usize, std_dev: f64) -> Vec<BollingerPoint> {
    if period == 0 || values.len() < period {
        return Vec::new();
    }
    let p = period as f64;
    values
        .windows(period)
        .map(|window| {
            let middle = window.iter().sum::<f64>() / p;
            let variance = window.iter().map(|v| (v - middle).powi(2)).sum::<f64>() / p;
            let sigma = variance.sqrt();
            let upper = middle + std_dev * sigma;
            let lower = middle - std_dev * sigma;
            let close = window[period - 1];
            let width = upper - lower;
            let pb = if width.abs() <= f64::EPSILON * middle.abs().max(1.0) {
                0.5
            } else {
                (close - lower) / width
            };
            BollingerPoint {
                upper,
                middle,
                lower,
                pb,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicators::moving_average::sma;

    #[test]
    fn test_bollinger_insufficient() {
        assert!(bollinger_bands(&[1.0; 19], 20, 2.0).is_empty());
    }

    #[test]
    fn test_bollinger_known_window() {
        // mean 5, population σ = 2
        let values = [2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0];
        let out = bollinger_bands(&values, 8, 2.0);
        assert_eq!(out.len(), 1);
        let b = out[0];
        assert!((b.middle - 5.0).abs() < 1e-12);
        assert!((b.upper - 9.0).abs() < 1e-12);
        assert!((b.lower - 1.0).abs() < 1e-12);
        // close 9 sits on the upper band
        assert!((b.pb - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_bollinger_middle_is_sma() {
        let values: Vec<f64> = (0..50).map(|i| 100.0 + (i as f64 * 0.9).cos() * 3.0).collect();
        let bands = bollinger_bands(&values, 20, 2.0);
        let averages = sma(&values, 20);
        assert_eq!(bands.len(), averages.len());
        for (b, m) in bands.iter().zip(averages.iter()) {
            assert!((b.middle - m).abs() < 1e-9);
            assert!(b.upper >= b.middle && b.middle >= b.lower);
        }
    }

    #[test]
    fn test_bollinger_flat_window_pb() {
        let out = bollinger_bands(&[0.1; 25], 20, 2.0);
        assert!(out.iter().all(|b| b.pb == 0.5));
    }
}
