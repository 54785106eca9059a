//! Batch price snapshots
//!
//! One `MarketSnapshot` per instrument, as returned by the batch prices
//! endpoint. The whole record is overwritten on every refresh.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::InstrumentId;

/// Latest trade summary for one instrument.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarketSnapshot {
    pub instrument_id: InstrumentId,
    #[serde(default)]
    pub symbol: String,
    pub last_price: f64,
    pub change: f64,
    pub change_pct: f64,
    pub prev_close: f64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub volume: f64,
    pub updated_at: DateTime<Utc>,
}

impl MarketSnapshot {
    /// Whether the last price is above the previous close.
    pub fn is_up(&self) -> bool {
        self.change > 0.0
    }
}
