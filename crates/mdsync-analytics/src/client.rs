//! HTTP client for the analytics snapshot endpoint.
//!
//! One POST per poll:
//! `{"exchangeName": .., "pair": .., "startTime": .., "endTime": .., "currentTime": ..}`
//! (epoch milliseconds), answered with a [`MarketSnapshot`] document.

use crate::error::{AnalyticsError, AnalyticsResult};
use mdsync_core::{InstrumentKey, MarketSnapshot};
use parking_lot::Mutex;
use reqwest::Client;
use serde::Serialize;
use std::collections::VecDeque;
use std::pin::Pin;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// Default timeout for snapshot requests.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Boxed future for dyn-compatible async trait methods.
pub type BoxFuture<'a, T> = Pin<Box<dyn std::future::Future<Output = T> + Send + 'a>>;

/// Snapshot request body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotRequest {
    pub exchange_name: String,
    pub pair: String,
    pub start_time: i64,
    pub end_time: i64,
    pub current_time: i64,
}

impl SnapshotRequest {
    /// Request covering `window_ms` of history and `horizon_ms` of forecast
    /// around `now_ms`.
    pub fn for_window(key: &InstrumentKey, now_ms: u64, window_ms: u64, horizon_ms: u64) -> Self {
        let now = now_ms as i64;
        Self {
            exchange_name: key.venue.clone(),
            pair: key.pair.clone(),
            start_time: now.saturating_sub(window_ms as i64),
            end_time: now.saturating_add(horizon_ms as i64),
            current_time: now,
        }
    }
}

/// Anything that can answer a snapshot request.
pub trait SnapshotSource: Send + Sync {
    fn fetch(&self, request: SnapshotRequest) -> BoxFuture<'_, AnalyticsResult<MarketSnapshot>>;
}

/// Arc wrapper for SnapshotSource trait objects.
pub type DynSnapshotSource = Arc<dyn SnapshotSource>;

/// Client for the analytics endpoint.
pub struct AnalyticsClient {
    client: Client,
    url: String,
}

impl AnalyticsClient {
    /// Create a new client with [`DEFAULT_TIMEOUT`].
    pub fn new(url: impl Into<String>) -> AnalyticsResult<Self> {
        Self::with_timeout(url, DEFAULT_TIMEOUT)
    }

    pub fn with_timeout(url: impl Into<String>, timeout: Duration) -> AnalyticsResult<Self> {
        let client = Client::builder().timeout(timeout).build().map_err(|e| {
            AnalyticsError::HttpClient(format!("Failed to create HTTP client: {e}"))
        })?;

        Ok(Self {
            client,
            url: url.into(),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Fetch one snapshot.
    pub async fn fetch_snapshot(&self, request: &SnapshotRequest) -> AnalyticsResult<MarketSnapshot> {
        debug!(
            exchange = %request.exchange_name,
            pair = %request.pair,
            start = request.start_time,
            end = request.end_time,
            "Fetching analytics snapshot"
        );
        let started = Instant::now();

        let response = self
            .client
            .post(&self.url)
            .json(request)
            .send()
            .await
            .map_err(|e| AnalyticsError::HttpClient(format!("HTTP request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AnalyticsError::HttpStatus {
                status: status.as_u16(),
                body,
            });
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| AnalyticsError::HttpClient(format!("Failed to read response: {e}")))?;
        let snapshot = parse_snapshot(&body)?;

        info!(
            pair = %request.pair,
            bars = snapshot.interval_stats.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Analytics snapshot received"
        );
        Ok(snapshot)
    }
}

impl SnapshotSource for AnalyticsClient {
    fn fetch(&self, request: SnapshotRequest) -> BoxFuture<'_, AnalyticsResult<MarketSnapshot>> {
        Box::pin(async move { self.fetch_snapshot(&request).await })
    }
}

/// Decode a snapshot response body.
///
/// A `null` body is the endpoint's way of saying "nothing for this pair" and
/// decodes to an empty snapshot.
pub fn parse_snapshot(body: &[u8]) -> AnalyticsResult<MarketSnapshot> {
    let value: serde_json::Value = serde_json::from_slice(body)?;
    if value.is_null() {
        return Ok(MarketSnapshot::default());
    }
    if !value.is_object() {
        return Err(AnalyticsError::Decode(
            "snapshot response is not an object".to_string(),
        ));
    }
    serde_json::from_value(value).map_err(|e| AnalyticsError::Decode(e.to_string()))
}

/// Scripted snapshot source for testing.
#[derive(Debug, Default)]
pub struct MockSnapshotSource {
    requests: Mutex<Vec<SnapshotRequest>>,
    responses: Mutex<VecDeque<Result<MarketSnapshot, String>>>,
}

impl MockSnapshotSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a successful response.
    pub fn push_snapshot(&self, snapshot: MarketSnapshot) {
        self.responses.lock().push_back(Ok(snapshot));
    }

    /// Queue a transport failure.
    pub fn push_error(&self, message: impl Into<String>) {
        self.responses.lock().push_back(Err(message.into()));
    }

    /// Recorded requests, oldest first.
    pub fn requests(&self) -> Vec<SnapshotRequest> {
        self.requests.lock().clone()
    }
}

impl SnapshotSource for MockSnapshotSource {
    fn fetch(&self, request: SnapshotRequest) -> BoxFuture<'_, AnalyticsResult<MarketSnapshot>> {
        Box::pin(async move {
            self.requests.lock().push(request);
            // An exhausted script answers with an empty snapshot.
            match self.responses.lock().pop_front() {
                Some(Ok(snapshot)) => Ok(snapshot),
                Some(Err(message)) => Err(AnalyticsError::HttpClient(message)),
                None => Ok(MarketSnapshot::default()),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_serializes_camel_case() {
        let key = InstrumentKey::new("binance", "BTC-USDT");
        let request = SnapshotRequest::for_window(&key, 10_000_000, 3_600_000, 1_800_000);
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(
            value,
            serde_json::json!({
                "exchangeName": "binance",
                "pair": "BTC-USDT",
                "startTime": 6_400_000,
                "endTime": 11_800_000,
                "currentTime": 10_000_000
            })
        );
    }

    #[test]
    fn test_parse_snapshot_null_and_garbage() {
        assert!(parse_snapshot(b"null").unwrap().is_structurally_empty());
        assert!(matches!(
            parse_snapshot(b"[1,2]"),
            Err(AnalyticsError::Decode(_))
        ));
        assert!(matches!(parse_snapshot(b"{"), Err(AnalyticsError::Json(_))));
    }

    #[test]
    fn test_parse_snapshot_partial_document() {
        let snapshot = parse_snapshot(
            br#"{"interval_stats": [{"timestamp": 1, "open": 1, "high": 1, "low": 1, "close": 1}]}"#,
        )
        .unwrap();
        assert_eq!(snapshot.interval_stats.len(), 1);
        assert!(snapshot.pv.is_empty());
        assert!(snapshot.evr.is_none());
    }

    #[test]
    fn test_mock_source_replays_script() {
        let source = MockSnapshotSource::new();
        source.push_error("boom");
        let key = InstrumentKey::new("okx", "ETH-USDT");
        let request = SnapshotRequest::for_window(&key, 0, 0, 0);

        assert!(tokio_test::block_on(source.fetch(request.clone())).is_err());
        let empty = tokio_test::block_on(source.fetch(request)).unwrap();
        assert!(empty.is_structurally_empty());
        assert_eq!(source.requests().len(), 2);
    }
}
