//! Error taxonomy for the chart feed
//!
//! Nothing here is fatal to the application: every variant degrades to
//! "stale or missing data" at the call site.

use thiserror::Error;
use types::errors::ParseError;

/// Errors surfaced by market-data fetches and configuration.
#[derive(Debug, Error)]
pub enum FeedError {
    #[error("http transport error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("failed to decode response: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("api error {status}: {message}")]
    Api { status: u16, message: String },

    #[error("parse error: {0}")]
    Parse(#[from] ParseError),

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl FeedError {
    /// Short label for structured logs.
    pub fn kind(&self) -> &'static str {
        match self {
            FeedError::Http(_) => "http",
            FeedError::Decode(_) => "decode",
            FeedError::Api { .. } => "api",
            FeedError::Parse(_) => "parse",
            FeedError::Config(_) => "config",
        }
    }
}
