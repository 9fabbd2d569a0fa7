//! Analytics error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AnalyticsError {
    #[error("HTTP client error: {0}")]
    HttpClient(String),

    #[error("HTTP {status}: {body}")]
    HttpStatus { status: u16, body: String },

    #[error("Snapshot decode error: {0}")]
    Decode(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type AnalyticsResult<T> = Result<T, AnalyticsError>;
