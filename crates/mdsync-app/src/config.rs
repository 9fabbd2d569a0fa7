//! Application configuration.

use crate::error::{AppError, AppResult};
use mdsync_analytics::{PollerConfig, DEFAULT_POLL_INTERVAL_MS, DEFAULT_TIMEOUT};
use mdsync_core::InstrumentKey;
use mdsync_feed::DEFAULT_BOOK_DEPTH;
use mdsync_ws::{
    ConnectionConfig, StalenessPolicy, WatchdogConfig, DEFAULT_MAX_RESUBSCRIBE_ATTEMPTS,
    DEFAULT_STALENESS_THRESHOLD_MS,
};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

const HOUR_MS: u64 = 3_600_000;

/// Instrument selected at startup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstrumentConfig {
    /// Venue identifier (e.g., "binance").
    pub venue: String,
    /// Pair symbol (e.g., "BTC-USDT").
    pub pair: String,
}

impl InstrumentConfig {
    pub fn key(&self) -> InstrumentKey {
        InstrumentKey::new(&self.venue, &self.pair)
    }
}

impl Default for InstrumentConfig {
    fn default() -> Self {
        Self {
            venue: "binance".to_string(),
            pair: "BTC-USDT".to_string(),
        }
    }
}

/// WebSocket configuration subset.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WsConfig {
    /// Maximum consecutive failed connects (0 = infinite).
    #[serde(default)]
    pub max_reconnect_attempts: u32,
    /// Base delay for reconnection backoff (ms).
    #[serde(default = "default_reconnect_base_delay_ms")]
    pub reconnect_base_delay_ms: u64,
    /// Backoff ceiling (ms).
    #[serde(default = "default_reconnect_max_delay_ms")]
    pub reconnect_max_delay_ms: u64,
    /// Outbound command buffer.
    #[serde(default = "default_outbound_buffer")]
    pub outbound_buffer: usize,
}

fn default_reconnect_base_delay_ms() -> u64 {
    1_000
}

fn default_reconnect_max_delay_ms() -> u64 {
    30_000
}

fn default_outbound_buffer() -> usize {
    256
}

impl Default for WsConfig {
    fn default() -> Self {
        Self {
            max_reconnect_attempts: 0,
            reconnect_base_delay_ms: default_reconnect_base_delay_ms(),
            reconnect_max_delay_ms: default_reconnect_max_delay_ms(),
            outbound_buffer: default_outbound_buffer(),
        }
    }
}

/// Staleness watchdog configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatchdogSection {
    /// Tick period (ms). Default: 1,000.
    #[serde(default = "default_tick_ms")]
    pub tick_ms: u64,
    /// Silence before a channel counts as stale (ms). Default: 6,000.
    #[serde(default = "default_threshold_ms")]
    pub threshold_ms: u64,
    /// Resubscribes before NoData. Default: 3.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Send an application keep-alive every tick.
    #[serde(default = "default_keep_alive")]
    pub keep_alive: bool,
}

fn default_tick_ms() -> u64 {
    1_000
}

fn default_threshold_ms() -> u64 {
    DEFAULT_STALENESS_THRESHOLD_MS
}

fn default_max_attempts() -> u32 {
    DEFAULT_MAX_RESUBSCRIBE_ATTEMPTS
}

fn default_keep_alive() -> bool {
    true
}

impl Default for WatchdogSection {
    fn default() -> Self {
        Self {
            tick_ms: default_tick_ms(),
            threshold_ms: default_threshold_ms(),
            max_attempts: default_max_attempts(),
            keep_alive: default_keep_alive(),
        }
    }
}

/// Analytics poller configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollerSection {
    /// Poll cadence (ms). Default: 15,000.
    #[serde(default = "default_poll_interval_ms")]
    pub interval_ms: u64,
    /// History window (ms). Default: 6 hours.
    #[serde(default = "default_window_ms")]
    pub window_ms: u64,
    /// Forecast horizon (ms). Default: 1 hour.
    #[serde(default = "default_horizon_ms")]
    pub horizon_ms: u64,
    /// HTTP timeout (ms). Default: 10,000.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    /// Consecutive empty answers before NoData. Default: 1.
    #[serde(default = "default_empty_polls")]
    pub empty_polls_before_no_data: u32,
}

fn default_poll_interval_ms() -> u64 {
    DEFAULT_POLL_INTERVAL_MS
}

fn default_window_ms() -> u64 {
    6 * HOUR_MS
}

fn default_horizon_ms() -> u64 {
    HOUR_MS
}

fn default_timeout_ms() -> u64 {
    DEFAULT_TIMEOUT.as_millis() as u64
}

fn default_empty_polls() -> u32 {
    1
}

impl Default for PollerSection {
    fn default() -> Self {
        Self {
            interval_ms: default_poll_interval_ms(),
            window_ms: default_window_ms(),
            horizon_ms: default_horizon_ms(),
            timeout_ms: default_timeout_ms(),
            empty_polls_before_no_data: default_empty_polls(),
        }
    }
}

/// Order book display configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookConfig {
    /// Levels kept per side.
    #[serde(default = "default_book_depth")]
    pub depth: usize,
}

fn default_book_depth() -> usize {
    DEFAULT_BOOK_DEPTH
}

impl Default for BookConfig {
    fn default() -> Self {
        Self {
            depth: default_book_depth(),
        }
    }
}

/// Main application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Streaming endpoint.
    #[serde(default = "default_ws_url")]
    pub ws_url: String,
    /// Analytics snapshot endpoint.
    #[serde(default = "default_analytics_url")]
    pub analytics_url: String,
    #[serde(default)]
    pub instrument: InstrumentConfig,
    #[serde(default)]
    pub websocket: WsConfig,
    #[serde(default)]
    pub watchdog: WatchdogSection,
    #[serde(default)]
    pub poller: PollerSection,
    #[serde(default)]
    pub book: BookConfig,
}

fn default_ws_url() -> String {
    "wss://stream.example.com/ws".to_string()
}

fn default_analytics_url() -> String {
    "https://analytics.example.com/snapshot".to_string()
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            ws_url: default_ws_url(),
            analytics_url: default_analytics_url(),
            instrument: InstrumentConfig::default(),
            websocket: WsConfig::default(),
            watchdog: WatchdogSection::default(),
            poller: PollerSection::default(),
            book: BookConfig::default(),
        }
    }
}

impl AppConfig {
    /// Load configuration from file.
    pub fn from_file(path: impl AsRef<Path>) -> AppResult<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| AppError::Config(format!("Failed to read config: {e}")))?;
        Self::from_toml(&content)
    }

    /// Parse configuration from TOML text.
    pub fn from_toml(content: &str) -> AppResult<Self> {
        let config: Self = toml::from_str(content)
            .map_err(|e| AppError::Config(format!("Failed to parse config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Replace the startup instrument with a `VENUE:PAIR` override.
    pub fn override_instrument(&mut self, spec: &str) -> AppResult<()> {
        let key: InstrumentKey = spec
            .parse()
            .map_err(|e| AppError::Config(format!("Invalid instrument: {e}")))?;
        self.instrument.venue = key.venue;
        self.instrument.pair = key.pair;
        Ok(())
    }

    /// Reject values the engine cannot run with.
    pub fn validate(&self) -> AppResult<()> {
        if self.ws_url.is_empty() {
            return Err(AppError::Config("ws_url must not be empty".to_string()));
        }
        if self.analytics_url.is_empty() {
            return Err(AppError::Config("analytics_url must not be empty".to_string()));
        }
        if self.instrument.venue.is_empty() || self.instrument.pair.is_empty() {
            return Err(AppError::Config(
                "instrument venue and pair must not be empty".to_string(),
            ));
        }
        if self.watchdog.tick_ms == 0 {
            return Err(AppError::Config("watchdog.tick_ms must be > 0".to_string()));
        }
        if self.watchdog.threshold_ms < self.watchdog.tick_ms {
            return Err(AppError::Config(
                "watchdog.threshold_ms must be >= watchdog.tick_ms".to_string(),
            ));
        }
        if self.poller.interval_ms == 0 {
            return Err(AppError::Config("poller.interval_ms must be > 0".to_string()));
        }
        if self.book.depth == 0 {
            return Err(AppError::Config("book.depth must be > 0".to_string()));
        }
        Ok(())
    }

    pub fn connection_config(&self) -> ConnectionConfig {
        ConnectionConfig {
            url: self.ws_url.clone(),
            max_reconnect_attempts: self.websocket.max_reconnect_attempts,
            reconnect_base_delay_ms: self.websocket.reconnect_base_delay_ms,
            reconnect_max_delay_ms: self.websocket.reconnect_max_delay_ms,
            outbound_buffer: self.websocket.outbound_buffer,
        }
    }

    pub fn watchdog_config(&self) -> WatchdogConfig {
        WatchdogConfig {
            tick_interval: Duration::from_millis(self.watchdog.tick_ms),
            policy: StalenessPolicy {
                threshold_ms: self.watchdog.threshold_ms,
                max_attempts: self.watchdog.max_attempts,
            },
            keep_alive: self.watchdog.keep_alive,
        }
    }

    pub fn poller_config(&self) -> PollerConfig {
        PollerConfig {
            interval_ms: self.poller.interval_ms,
            window_ms: self.poller.window_ms,
            horizon_ms: self.poller.horizon_ms,
            empty_polls_before_no_data: self.poller.empty_polls_before_no_data,
        }
    }

    pub fn poll_timeout(&self) -> Duration {
        Duration::from_millis(self.poller.timeout_ms)
    }
}
