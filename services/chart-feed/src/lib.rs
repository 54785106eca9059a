//! Chart Feed Service
//!
//! Turns backend market data into what a price chart draws:
//! - Sanitized OHLCV candle series (history plus live ticks)
//! - Technical indicators (SMA, EMA, RSI, MACD, Bollinger Bands, VWAP)
//! - Pane layout for the price, volume and oscillator panes
//! - A batch price snapshot cache refreshed on a timer
//!
//! # Architecture
//!
//! ```text
//!  GET /market/candles      candle stream
//!        │                       │
//!   ┌────▼─────┐           ┌─────▼──────┐
//!   │Sanitizer │           │StreamRouter│
//!   └────┬─────┘           └─────┬──────┘
//!        │ seed                  │ merge
//!   ┌────▼───────────────────────▼──┐
//!   │      CandleStreamBuffer       │
//!   └────┬──────────────────────────┘
//!        │ re-sanitize on version change
//!   ┌────▼─────┐    ┌───────────┐
//!   │Indicators│ ←  │Preferences│
//!   └────┬─────┘    └─────┬─────┘
//!        │          ┌─────▼─────┐
//!        │          │  Layout   │
//!        │          └─────┬─────┘
//!   ┌────▼────────────────▼─────┐
//!   │   ChartSession → Frame    │
//!   └───────────────────────────┘
//!
//!  GET /market/prices → SnapshotPoller → PriceSnapshotCache
//! ```

pub mod buffer;
pub mod config;
pub mod error;
pub mod indicators;
pub mod layout;
pub mod poller;
pub mod preferences;
pub mod sanitizer;
pub mod session;
pub mod snapshot_cache;
pub mod source;
pub mod stream;

// Library version
pub const SERVICE_VERSION: &str = "0.1.0";
