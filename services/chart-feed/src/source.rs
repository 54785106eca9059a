//! Market-data sources
//!
//! Async traits for the two REST reads the pipeline needs, plus the reqwest
//! implementation against the backend's `/market` routes. Tests and the
//! session driver depend on the traits only.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};
use types::candle::RawCandle;
use types::ids::InstrumentId;
use types::interval::Interval;
use types::response::ApiResponse;
use types::snapshot::MarketSnapshot;

use crate::config::FeedConfig;
use crate::error::FeedError;

/// Default number of candles per history request.
pub const DEFAULT_HISTORY_LIMIT: u32 = 100;

/// Parameters of a historical candle fetch.
#[derive(Debug, Clone, PartialEq)]
pub struct HistoryQuery {
    pub instrument: InstrumentId,
    pub interval: Interval,
    pub limit: u32,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}

impl HistoryQuery {
    pub fn new(instrument: InstrumentId, interval: Interval) -> Self {
        Self {
            instrument,
            interval,
            limit: DEFAULT_HISTORY_LIMIT,
            from: None,
            to: None,
        }
    }

    pub fn with_limit(mut self, limit: u32) -> Self {
        self.limit = limit;
        self
    }

    pub fn with_range(mut self, from: Option<DateTime<Utc>>, to: Option<DateTime<Utc>>) -> Self {
        self.from = from;
        self.to = to;
        self
    }

    /// Query-string pairs in request order.
    pub fn to_query_pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs = vec![
            ("interval", self.interval.as_str().to_string()),
            ("limit", self.limit.to_string()),
        ];
        if let Some(from) = self.from {
            pairs.push(("from", from.to_rfc3339()));
        }
        if let Some(to) = self.to {
            pairs.push(("to", to.to_rfc3339()));
        }
        pairs
    }
}

/// Historical candles for one instrument.
#[async_trait]
pub trait CandleSource: Send + Sync {
    async fn fetch_candles(&self, query: &HistoryQuery) -> Result<Vec<RawCandle>, FeedError>;
}

/// Batch price snapshots.
#[async_trait]
pub trait SnapshotSource: Send + Sync {
    async fn fetch_snapshots(&self, ids: &[InstrumentId]) -> Result<Vec<MarketSnapshot>, FeedError>;
}

/// reqwest client for the backend market routes.
#[derive(Debug, Clone)]
pub struct HttpMarketClient {
    client: Client,
    base_url: String,
    history_limit: u32,
}

impl HttpMarketClient {
    pub fn new(config: &FeedConfig) -> Result<Self, FeedError> {
        let client = Client::builder().timeout(config.request_timeout).build()?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            history_limit: config.history_limit,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// History query using the configured default limit.
    pub fn history_query(&self, instrument: InstrumentId, interval: Interval) -> HistoryQuery {
        HistoryQuery::new(instrument, interval).with_limit(self.history_limit)
    }

    pub fn candles_url(&self, instrument: &InstrumentId) -> String {
        format!("{}/market/candles/{}", self.base_url, instrument)
    }

    pub fn prices_url(&self) -> String {
        format!("{}/market/prices", self.base_url)
    }

    /// GET a list endpoint and unwrap the response envelope.
    async fn get_list<T>(&self, url: &str, query: &[(&str, String)]) -> Result<Vec<T>, FeedError>
    where
        T: DeserializeOwned,
    {
        let response = self.client.get(url).query(query).send().await?;
        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            let message = serde_json::from_str::<ApiResponse<serde_json::Value>>(&body)
                .map(|envelope| envelope.message)
                .unwrap_or(body);
            warn!(url, status = status.as_u16(), %message, "Market request failed");
            return Err(FeedError::Api {
                status: status.as_u16(),
                message,
            });
        }

        decode_list(&body)
    }
}

/// Decode an envelope body; `data: null` reads as an empty list.
pub fn decode_list<T: DeserializeOwned>(body: &str) -> Result<Vec<T>, FeedError> {
    let envelope: ApiResponse<Vec<T>> = serde_json::from_str(body)?;
    if envelope.status_code >= 400 {
        return Err(FeedError::Api {
            status: envelope.status_code,
            message: envelope.message,
        });
    }
    Ok(envelope.into_data_or_default())
}

#[async_trait]
impl CandleSource for HttpMarketClient {
    async fn fetch_candles(&self, query: &HistoryQuery) -> Result<Vec<RawCandle>, FeedError> {
        let url = self.candles_url(&query.instrument);
        let candles: Vec<RawCandle> = self.get_list(&url, &query.to_query_pairs()).await?;
        debug!(
            instrument = %query.instrument,
            interval = %query.interval,
            count = candles.len(),
            "Fetched candle history"
        );
        Ok(candles)
    }
}

#[async_trait]
impl SnapshotSource for HttpMarketClient {
    async fn fetch_snapshots(&self, ids: &[InstrumentId]) -> Result<Vec<MarketSnapshot>, FeedError> {
        let joined = ids.iter().map(InstrumentId::as_str).collect::<Vec<_>>().join(",");
        let snapshots: Vec<MarketSnapshot> = self.get_list(&self.prices_url(), &[("ids", joined)]).await?;
        debug!(requested = ids.len(), returned = snapshots.len(), "Fetched price snapshots");
        Ok(snapshots)
    }
}
