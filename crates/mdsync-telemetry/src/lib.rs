//! Prometheus metrics and structured logging for mdsync.
//!
//! - Prometheus metrics for connection health, staleness and polling
//! - Structured logging with tracing (JSON in production)

pub mod error;
pub mod logging;
pub mod metrics;

pub use error::{TelemetryError, TelemetryResult};
pub use logging::init_logging;
pub use metrics::Metrics;
