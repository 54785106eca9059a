//! Types library for the trading chart pipeline
//!
//! This library provides the core market-data type definitions shared by the
//! chart services, covering both the canonical in-memory shapes and the
//! loosely-typed records the backend puts on the wire.
//!
//! # Modules
//! - `ids`: Instrument identifiers
//! - `interval`: Candle bucket widths
//! - `candle`: Canonical OHLCV candles and raw wire records
//! - `snapshot`: Batch price snapshots
//! - `response`: Backend response envelope
//! - `errors`: Error taxonomy

// Public modules
pub mod ids;
pub mod interval;
pub mod candle;
pub mod snapshot;
pub mod response;
pub mod errors;

// Library version constant
pub const LIB_VERSION: &str = "1.0.0";

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::ids::*;
    pub use crate::interval::*;
    pub use crate::candle::*;
    pub use crate::snapshot::*;
    pub use crate::response::*;
    pub use crate::errors::*;
}
