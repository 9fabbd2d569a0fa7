//! mdsync market view.
//!
//! Orchestrates the engine for one selected instrument:
//! - Shared WebSocket connection and subscription lifecycle
//! - Staleness watchdog with bounded resubscribes
//! - Order book aggregation and live price
//! - Analytics snapshot polling, alignment and summary metrics
//! - Fill probability estimates

pub mod app;
pub mod config;
pub mod error;

pub use app::{fill_probability, MarketView, MarketViewHandle, ViewCommand};
pub use config::AppConfig;
pub use error::{AppError, AppResult};
