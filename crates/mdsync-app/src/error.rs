//! Application error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("WebSocket error: {0}")]
    WebSocket(#[from] mdsync_ws::WsError),

    #[error("Feed error: {0}")]
    Feed(#[from] mdsync_feed::FeedError),

    #[error("Analytics error: {0}")]
    Analytics(#[from] mdsync_analytics::AnalyticsError),

    #[error("Telemetry error: {0}")]
    Telemetry(#[from] mdsync_telemetry::TelemetryError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Market view has shut down")]
    Shutdown,
}

pub type AppResult<T> = Result<T, AppError>;
