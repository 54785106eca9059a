//! Identifier types for market-data entities
//!
//! Instruments are identified by the opaque id the backend assigns them
//! (a hex object id in practice). The chart pipeline never interprets the
//! id; it only uses it as a key, so ordering is lexical.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::errors::ParseError;

/// Instrument identifier
///
/// Used as the key for candle buffers, indicator preferences and the
/// price snapshot cache. `Ord` gives deterministic iteration in `BTreeMap`s.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InstrumentId(String);

impl InstrumentId {
    /// Create a new InstrumentId from a string
    ///
    /// # Panics
    /// Panics if the id is empty or only whitespace
    pub fn new(id: impl Into<String>) -> Self {
        let s = id.into();
        assert!(!s.trim().is_empty(), "InstrumentId must not be empty");
        Self(s)
    }

    /// Try to create an InstrumentId, rejecting empty ids
    pub fn try_new(id: impl Into<String>) -> Result<Self, ParseError> {
        let s = id.into();
        if s.trim().is_empty() {
            Err(ParseError::InvalidInstrumentId(s))
        } else {
            Ok(Self(s))
        }
    }

    /// Get the id string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for InstrumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<&str> for InstrumentId {
    type Error = ParseError;

    fn try_from(s: &str) -> Result<Self, Self::Error> {
        Self::try_new(s)
    }
}

impl FromStr for InstrumentId {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::try_new(s)
    }
}
