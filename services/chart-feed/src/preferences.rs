//! Indicator preferences
//!
//! Per-instrument indicator toggles and settings. An instrument that has
//! never been touched reads as the defaults; the first mutation inserts its
//! entry and entries are never removed.
//!
//! Storage is the caller's concern: this module only produces and accepts
//! the versioned JSON document.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};
use types::ids::InstrumentId;

use crate::indicators::{
    IndicatorKind, DEFAULT_BOLLINGER_PERIOD, DEFAULT_EMA_PERIODS, DEFAULT_FAST_PERIOD,
    DEFAULT_RSI_PERIOD, DEFAULT_SIGNAL_PERIOD, DEFAULT_SLOW_PERIOD, DEFAULT_SMA_PERIODS,
    DEFAULT_STD_DEV,
};
use crate::layout::ActiveOscillators;

/// Current persisted schema version.
pub const PREFERENCES_VERSION: u32 = 1;

const DEFAULT_LINE_WIDTH: u32 = 2;

/// Largest lookback accepted for any indicator period.
pub const MAX_INDICATOR_PERIOD: usize = 10_000;

/// Errors loading or updating preferences.
#[derive(Debug, Error)]
pub enum PreferencesError {
    #[error("failed to decode preferences: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("unsupported preferences version {0} (expected {})", PREFERENCES_VERSION)]
    UnsupportedVersion(u32),

    #[error("invalid {field} for {indicator}: {value}")]
    InvalidSetting {
        indicator: IndicatorKind,
        field: &'static str,
        value: String,
    },
}

/// Tunable parameters. Only the fields an indicator uses are meaningful.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndicatorSettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub period: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub periods: Option<Vec<usize>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fast_period: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slow_period: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signal_period: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub std_dev: Option<f64>,
}

fn check_period(indicator: IndicatorKind, field: &'static str, period: Option<usize>) -> Result<(), PreferencesError> {
    match period {
        Some(value) if value > MAX_INDICATOR_PERIOD => Err(PreferencesError::InvalidSetting {
            indicator,
            field,
            value: value.to_string(),
        }),
        _ => Ok(()),
    }
}

impl IndicatorSettings {
    /// Reject periods above [`MAX_INDICATOR_PERIOD`] and non-finite or
    /// negative band widths.
    pub fn validate(&self, indicator: IndicatorKind) -> Result<(), PreferencesError> {
        check_period(indicator, "period", self.period)?;
        for period in self.periods.iter().flatten() {
            check_period(indicator, "periods", Some(*period))?;
        }
        check_period(indicator, "fastPeriod", self.fast_period)?;
        check_period(indicator, "slowPeriod", self.slow_period)?;
        check_period(indicator, "signalPeriod", self.signal_period)?;
        if let Some(std_dev) = self.std_dev {
            if !std_dev.is_finite() || std_dev < 0.0 {
                return Err(PreferencesError::InvalidSetting {
                    indicator,
                    field: "stdDev",
                    value: std_dev.to_string(),
                });
            }
        }
        Ok(())
    }

    /// Overlay the fields present in `partial`.
    pub fn merge(&mut self, partial: &IndicatorSettings) {
        if partial.period.is_some() {
            self.period = partial.period;
        }
        if partial.periods.is_some() {
            self.periods = partial.periods.clone();
        }
        if partial.fast_period.is_some() {
            self.fast_period = partial.fast_period;
        }
        if partial.slow_period.is_some() {
            self.slow_period = partial.slow_period;
        }
        if partial.signal_period.is_some() {
            self.signal_period = partial.signal_period;
        }
        if partial.std_dev.is_some() {
            self.std_dev = partial.std_dev;
        }
    }
}

/// One indicator's toggle, settings and style.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndicatorConfig {
    pub enabled: bool,
    #[serde(default)]
    pub settings: IndicatorSettings,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    #[serde(default = "default_line_width")]
    pub line_width: u32,
}

fn default_line_width() -> u32 {
    DEFAULT_LINE_WIDTH
}

impl IndicatorConfig {
    fn disabled(settings: IndicatorSettings, color: Option<&str>, line_width: u32) -> Self {
        Self {
            enabled: false,
            settings,
            color: color.map(str::to_string),
            line_width,
        }
    }
}

/// All indicator configs for one instrument.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstrumentIndicators {
    pub sma: IndicatorConfig,
    pub ema: IndicatorConfig,
    pub rsi: IndicatorConfig,
    pub macd: IndicatorConfig,
    pub bollinger_bands: IndicatorConfig,
    pub vwap: IndicatorConfig,
}

impl Default for InstrumentIndicators {
    fn default() -> Self {
        Self {
            sma: IndicatorConfig::disabled(
                IndicatorSettings {
                    periods: Some(DEFAULT_SMA_PERIODS.to_vec()),
                    ..Default::default()
                },
                None,
                DEFAULT_LINE_WIDTH,
            ),
            ema: IndicatorConfig::disabled(
                IndicatorSettings {
                    periods: Some(DEFAULT_EMA_PERIODS.to_vec()),
                    ..Default::default()
                },
                None,
                DEFAULT_LINE_WIDTH,
            ),
            rsi: IndicatorConfig::disabled(
                IndicatorSettings {
                    period: Some(DEFAULT_RSI_PERIOD),
                    ..Default::default()
                },
                Some("#9C27B0"),
                DEFAULT_LINE_WIDTH,
            ),
            macd: IndicatorConfig::disabled(
                IndicatorSettings {
                    fast_period: Some(DEFAULT_FAST_PERIOD),
                    slow_period: Some(DEFAULT_SLOW_PERIOD),
                    signal_period: Some(DEFAULT_SIGNAL_PERIOD),
                    ..Default::default()
                },
                None,
                DEFAULT_LINE_WIDTH,
            ),
            bollinger_bands: IndicatorConfig::disabled(
                IndicatorSettings {
                    period: Some(DEFAULT_BOLLINGER_PERIOD),
                    std_dev: Some(DEFAULT_STD_DEV),
                    ..Default::default()
                },
                Some("#757575"),
                1,
            ),
            vwap: IndicatorConfig::disabled(IndicatorSettings::default(), Some("#FFC107"), DEFAULT_LINE_WIDTH),
        }
    }
}

impl InstrumentIndicators {
    pub fn get(&self, kind: IndicatorKind) -> &IndicatorConfig {
        match kind {
            IndicatorKind::Sma => &self.sma,
            IndicatorKind::Ema => &self.ema,
            IndicatorKind::Rsi => &self.rsi,
            IndicatorKind::Macd => &self.macd,
            IndicatorKind::BollingerBands => &self.bollinger_bands,
            IndicatorKind::Vwap => &self.vwap,
        }
    }

    pub fn get_mut(&mut self, kind: IndicatorKind) -> &mut IndicatorConfig {
        match kind {
            IndicatorKind::Sma => &mut self.sma,
            IndicatorKind::Ema => &mut self.ema,
            IndicatorKind::Rsi => &mut self.rsi,
            IndicatorKind::Macd => &mut self.macd,
            IndicatorKind::BollingerBands => &mut self.bollinger_bands,
            IndicatorKind::Vwap => &mut self.vwap,
        }
    }

    /// Validate every indicator's settings.
    pub fn validate(&self) -> Result<(), PreferencesError> {
        IndicatorKind::all()
            .iter()
            .try_for_each(|kind| self.get(*kind).settings.validate(*kind))
    }

    /// Enabled kinds in display order.
    pub fn enabled_kinds(&self) -> Vec<IndicatorKind> {
        IndicatorKind::all()
            .iter()
            .copied()
            .filter(|kind| self.get(*kind).enabled)
            .collect()
    }

    /// Which oscillator panes are needed.
    pub fn active_oscillators(&self) -> ActiveOscillators {
        ActiveOscillators {
            rsi: self.rsi.enabled,
            macd: self.macd.enabled,
        }
    }
}

/// Versioned document handed to storage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistedPreferences {
    pub version: u32,
    pub instruments: BTreeMap<InstrumentId, InstrumentIndicators>,
}

/// Preferences for every instrument the user has touched.
#[derive(Debug, Clone, Default)]
pub struct IndicatorPreferences {
    instruments: BTreeMap<InstrumentId, InstrumentIndicators>,
    /// Bumped on every mutation.
    version: u64,
}

impl IndicatorPreferences {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get-or-insert the entry for an instrument.
    pub fn entry(&mut self, instrument: &InstrumentId) -> &mut InstrumentIndicators {
        self.instruments.entry(instrument.clone()).or_insert_with(|| {
            debug!(instrument = %instrument, "Initializing indicator preferences");
            InstrumentIndicators::default()
        })
    }

    /// Read without inserting; untouched instruments read as the defaults.
    pub fn get(&self, instrument: &InstrumentId) -> InstrumentIndicators {
        self.instruments.get(instrument).cloned().unwrap_or_default()
    }

    pub fn contains(&self, instrument: &InstrumentId) -> bool {
        self.instruments.contains_key(instrument)
    }

    /// Flip an indicator; returns the new enabled state.
    pub fn toggle(&mut self, instrument: &InstrumentId, kind: IndicatorKind) -> bool {
        let config = self.entry(instrument).get_mut(kind);
        config.enabled = !config.enabled;
        let enabled = config.enabled;
        self.version += 1;
        info!(instrument = %instrument, indicator = %kind, enabled, "Indicator toggled");
        enabled
    }

    pub fn set_enabled(&mut self, instrument: &InstrumentId, kind: IndicatorKind, enabled: bool) {
        self.entry(instrument).get_mut(kind).enabled = enabled;
        self.version += 1;
    }

    /// Merge partial settings into an indicator's current settings.
    ///
    /// Invalid settings are rejected before anything is applied.
    pub fn update_settings(
        &mut self,
        instrument: &InstrumentId,
        kind: IndicatorKind,
        partial: &IndicatorSettings,
    ) -> Result<(), PreferencesError> {
        partial.validate(kind)?;
        self.entry(instrument).get_mut(kind).settings.merge(partial);
        self.version += 1;
        debug!(instrument = %instrument, indicator = %kind, "Indicator settings updated");
        Ok(())
    }

    pub fn enabled_kinds(&self, instrument: &InstrumentId) -> Vec<IndicatorKind> {
        self.instruments
            .get(instrument)
            .map(InstrumentIndicators::enabled_kinds)
            .unwrap_or_default()
    }

    pub fn active_oscillators(&self, instrument: &InstrumentId) -> ActiveOscillators {
        self.instruments
            .get(instrument)
            .map(InstrumentIndicators::active_oscillators)
            .unwrap_or_default()
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn len(&self) -> usize {
        self.instruments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instruments.is_empty()
    }

    pub fn to_persisted(&self) -> PersistedPreferences {
        PersistedPreferences {
            version: PREFERENCES_VERSION,
            instruments: self.instruments.clone(),
        }
    }

    pub fn to_json(&self) -> Result<String, PreferencesError> {
        Ok(serde_json::to_string(&self.to_persisted())?)
    }

    /// Load a persisted document, rejecting unknown schema versions and
    /// out-of-range settings.
    pub fn from_json(json: &str) -> Result<Self, PreferencesError> {
        let persisted: PersistedPreferences = serde_json::from_str(json)?;
        if persisted.version != PREFERENCES_VERSION {
            return Err(PreferencesError::UnsupportedVersion(persisted.version));
        }
        for (instrument, indicators) in &persisted.instruments {
            if let Err(err) = indicators.validate() {
                warn!(instrument = %instrument, error = %err, "Rejecting persisted preferences");
                return Err(err);
            }
        }
        info!(instruments = persisted.instruments.len(), "Loaded indicator preferences");
        Ok(Self {
            instruments: persisted.instruments,
            version: 0,
        })
    }
}
