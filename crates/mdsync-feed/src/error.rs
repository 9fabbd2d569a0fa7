//! Feed error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum FeedError {
    #[error("Invalid data: {0}")]
    InvalidData(String),

    #[error("Instrument mismatch: expected {expected}, got {actual}")]
    InstrumentMismatch { expected: String, actual: String },
}

pub type FeedResult<T> = Result<T, FeedError>;
