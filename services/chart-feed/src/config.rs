//! Runtime configuration
//!
//! `FeedConfig` is read from `CHART_FEED_*` environment variables, falling
//! back to the defaults the web client ships with. The component configs
//! (`BufferConfig`, `PollerConfig`) are derived from it.

use std::env;
use std::time::Duration;

use crate::buffer::{BufferConfig, OutOfOrderPolicy};
use crate::error::FeedError;
use crate::poller::PollerConfig;

/// Default REST base URL.
pub const DEFAULT_BASE_URL: &str = "http://localhost:8080/api";

/// Chart feed configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct FeedConfig {
    /// REST base URL, without trailing slash.
    pub base_url: String,
    /// Candles requested per historical fetch.
    pub history_limit: u32,
    /// Maximum candles retained per (instrument, interval).
    pub max_candles: usize,
    /// Snapshot refresh period.
    pub refresh_period: Duration,
    /// Reject ticks older than the last buffered candle instead of appending.
    pub reject_out_of_order: bool,
    /// Per-request timeout for the HTTP client.
    pub request_timeout: Duration,
    /// Open appended candles at the previous close.
    pub enforce_continuity: bool,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            history_limit: 100,
            max_candles: 500,
            refresh_period: Duration::from_millis(3000),
            reject_out_of_order: false,
            request_timeout: Duration::from_millis(10_000),
            enforce_continuity: false,
        }
    }
}

fn env_str(name: &str, default: &str) -> String {
    env::var(name)
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| default.to_string())
}

fn env_u64(name: &str, default: u64) -> u64 {
    env::var(name)
        .ok()
        .and_then(|s| s.trim().parse().ok())
        .unwrap_or(default)
}

fn env_bool(name: &str, default: bool) -> bool {
    env::var(name)
        .ok()
        .map(|s| matches!(s.trim().to_lowercase().as_str(), "1" | "true" | "yes" | "y" | "on"))
        .unwrap_or(default)
}

impl FeedConfig {
    /// Load from the environment and validate.
    pub fn from_env() -> Result<Self, FeedError> {
        let defaults = Self::default();
        let config = Self {
            base_url: env_str("CHART_FEED_BASE_URL", &defaults.base_url)
                .trim_end_matches('/')
                .to_string(),
            history_limit: env_u64("CHART_FEED_HISTORY_LIMIT", defaults.history_limit as u64)
                .min(u32::MAX as u64) as u32,
            max_candles: env_u64("CHART_FEED_MAX_CANDLES", defaults.max_candles as u64) as usize,
            refresh_period: Duration::from_millis(env_u64(
                "CHART_FEED_REFRESH_MS",
                defaults.refresh_period.as_millis() as u64,
            )),
            reject_out_of_order: env_bool(
                "CHART_FEED_REJECT_OUT_OF_ORDER",
                defaults.reject_out_of_order,
            ),
            request_timeout: Duration::from_millis(env_u64(
                "CHART_FEED_REQUEST_TIMEOUT_MS",
                defaults.request_timeout.as_millis() as u64,
            )),
            enforce_continuity: env_bool(
                "CHART_FEED_ENFORCE_CONTINUITY",
                defaults.enforce_continuity,
            ),
        };
        config.validate()?;
        Ok(config)
    }

    /// Reject values the pipeline cannot run with.
    pub fn validate(&self) -> Result<(), FeedError> {
        if !(self.base_url.starts_with("http://") || self.base_url.starts_with("https://")) {
            return Err(FeedError::Config(format!(
                "base url must be http(s): {}",
                self.base_url
            )));
        }
        if self.max_candles == 0 {
            return Err(FeedError::Config("max candles must be positive".into()));
        }
        if self.history_limit == 0 {
            return Err(FeedError::Config("history limit must be positive".into()));
        }
        if self.refresh_period.is_zero() {
            return Err(FeedError::Config("refresh period must be positive".into()));
        }
        Ok(())
    }

    /// Buffer settings derived from this config.
    pub fn buffer_config(&self) -> BufferConfig {
        BufferConfig {
            max_len: self.max_candles,
            out_of_order: if self.reject_out_of_order {
                OutOfOrderPolicy::Reject
            } else {
                OutOfOrderPolicy::Append
            },
            enforce_continuity: self.enforce_continuity,
            ..BufferConfig::default()
        }
    }

    /// Poller settings derived from this config.
    pub fn poller_config(&self) -> PollerConfig {
        PollerConfig {
            refresh_period: self.refresh_period,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = FeedConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.max_candles, 500);
        assert_eq!(config.refresh_period, Duration::from_secs(3));
        assert_eq!(config.history_limit, 100);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let config = FeedConfig {
            base_url: "ftp://example".into(),
            ..FeedConfig::default()
        };
        assert!(matches!(config.validate(), Err(FeedError::Config(_))));

        let config = FeedConfig {
            max_candles: 0,
            ..FeedConfig::default()
        };
        assert!(config.validate().is_err());

        let config = FeedConfig {
            refresh_period: Duration::ZERO,
            ..FeedConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_derived_buffer_config() {
        let config = FeedConfig {
            max_candles: 42,
            reject_out_of_order: true,
            enforce_continuity: true,
            ..FeedConfig::default()
        };
        let buffer = config.buffer_config();
        assert_eq!(buffer.max_len, 42);
        assert_eq!(buffer.out_of_order, OutOfOrderPolicy::Reject);
        assert!(buffer.enforce_continuity);
        assert!(!FeedConfig::default().buffer_config().enforce_continuity);
        assert_eq!(config.poller_config().refresh_period, Duration::from_secs(3));
    }
}
