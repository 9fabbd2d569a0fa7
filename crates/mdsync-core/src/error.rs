//! Error types for mdsync-core.

use thiserror::Error;

/// Core error types.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Expected `VENUE:PAIR`.
    #[error("Invalid instrument key: {0}")]
    InvalidInstrumentKey(String),
}

/// Result type alias for core operations.
pub type Result<T> = std::result::Result<T, CoreError>;
