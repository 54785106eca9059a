//! Error types for the market-data type library
//!
//! Parsing failures for identifiers, intervals and timestamps. Everything
//! else (transport, decoding) belongs to the service crates.

use thiserror::Error;

/// Failure to interpret a wire value as a domain type
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("Invalid interval: {0} (expected one of 1m, 5m, 15m, 1h, 1d)")]
    InvalidInterval(String),

    #[error("Invalid instrument id: {0:?}")]
    InvalidInstrumentId(String),

    #[error("Invalid timestamp: {0}")]
    InvalidTimestamp(String),
}
