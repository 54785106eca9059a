//! Candle intervals
//!
//! The bucket widths the chart supports. Wire form is the short label the
//! backend uses in query strings and candle records (`"1m"`, `"1h"`, ...).

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::errors::ParseError;

/// Supported candle intervals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Interval {
    /// 1 minute
    #[serde(rename = "1m")]
    M1,
    /// 5 minutes
    #[serde(rename = "5m")]
    M5,
    /// 15 minutes
    #[serde(rename = "15m")]
    M15,
    /// 1 hour
    #[serde(rename = "1h")]
    H1,
    /// 1 day
    #[serde(rename = "1d")]
    D1,
}

impl Interval {
    /// Duration of this interval in seconds.
    pub fn duration_secs(&self) -> i64 {
        match self {
            Interval::M1 => 60,
            Interval::M5 => 5 * 60,
            Interval::M15 => 15 * 60,
            Interval::H1 => 3600,
            Interval::D1 => 86_400,
        }
    }

    /// All supported intervals, shortest first.
    pub fn all() -> &'static [Interval] {
        &[
            Interval::M1,
            Interval::M5,
            Interval::M15,
            Interval::H1,
            Interval::D1,
        ]
    }

    /// Floor an epoch-second timestamp to this interval's bucket boundary.
    pub fn align(&self, time_secs: i64) -> i64 {
        time_secs.div_euclid(self.duration_secs()) * self.duration_secs()
    }

    /// Wire label.
    pub fn as_str(&self) -> &'static str {
        match self {
            Interval::M1 => "1m",
            Interval::M5 => "5m",
            Interval::M15 => "15m",
            Interval::H1 => "1h",
            Interval::D1 => "1d",
        }
    }
}

impl Default for Interval {
    fn default() -> Self {
        Interval::M1
    }
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Interval {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "1m" => Ok(Interval::M1),
            "5m" => Ok(Interval::M5),
            "15m" => Ok(Interval::M15),
            "1h" => Ok(Interval::H1),
            "1d" => Ok(Interval::D1),
            other => Err(ParseError::InvalidInterval(other.to_string())),
        }
    }
}
