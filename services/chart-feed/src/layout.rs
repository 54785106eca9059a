//! Pane layout allocation
//!
//! Splits the chart height between the price pane, the volume overlay and
//! the oscillator sub-panes. Margins are fractions of total height
//! (0 = top, 1 = bottom) reserved above and below a pane, so a pane with
//! margins `(top, bottom)` occupies `[top, 1 - bottom]`.

use serde::{Deserialize, Serialize};

/// Main pane top margin.
const MAIN_TOP: f64 = 0.05;
/// Main pane bottom margin with no oscillators.
const MAIN_BOTTOM_BASE: f64 = 0.15;
/// Main pane bottom margin with one oscillator.
const MAIN_BOTTOM_ONE: f64 = 0.35;
/// Main pane bottom margin with both oscillators.
const MAIN_BOTTOM_BOTH: f64 = 0.55;

/// Volume overlay spans `[0.85, 1.0]` of the chart.
const VOLUME_MARGINS: ScaleMargins = ScaleMargins { top: 0.85, bottom: 0.0 };
const RSI_STACKED: ScaleMargins = ScaleMargins { top: 0.45, bottom: 0.30 };
const RSI_ALONE: ScaleMargins = ScaleMargins { top: 0.70, bottom: 0.05 };
const MACD_MARGINS: ScaleMargins = ScaleMargins { top: 0.75, bottom: 0.0 };

/// Overbought/oversold guides drawn on the RSI pane.
pub const RSI_REFERENCE_LINES: [f64; 2] = [70.0, 30.0];

/// Which oscillator panes are enabled.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ActiveOscillators {
    pub rsi: bool,
    pub macd: bool,
}

impl ActiveOscillators {
    pub fn count(&self) -> usize {
        usize::from(self.rsi) + usize::from(self.macd)
    }
}

/// Reserved margins above and below a pane.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScaleMargins {
    pub top: f64,
    pub bottom: f64,
}

impl ScaleMargins {
    /// Vertical span the pane occupies, `(top, 1 - bottom)`.
    pub fn occupied(&self) -> (f64, f64) {
        (self.top, 1.0 - self.bottom)
    }
}

/// Margins for every pane of one chart.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PaneLayout {
    pub main: ScaleMargins,
    pub volume: ScaleMargins,
    pub rsi: Option<ScaleMargins>,
    pub macd: Option<ScaleMargins>,
}

impl PaneLayout {
    /// RSI guide values, present only when the RSI pane is.
    pub fn rsi_reference_lines(&self) -> Option<[f64; 2]> {
        self.rsi.map(|_| RSI_REFERENCE_LINES)
    }
}

impl Default for PaneLayout {
    fn default() -> Self {
        allocate(ActiveOscillators::default())
    }
}

/// Allocate pane margins for the enabled oscillators.
pub fn allocate(active: ActiveOscillators) -> PaneLayout {
    let main_bottom = match active.count() {
        0 => MAIN_BOTTOM_BASE,
        1 => MAIN_BOTTOM_ONE,
        _ => MAIN_BOTTOM_BOTH,
    };

    let rsi = active
        .rsi
        .then_some(if active.macd { RSI_STACKED } else { RSI_ALONE });

    PaneLayout {
        main: ScaleMargins {
            top: MAIN_TOP,
            bottom: main_bottom,
        },
        volume: VOLUME_MARGINS,
        rsi,
        macd: active.macd.then_some(MACD_MARGINS),
    }
}
