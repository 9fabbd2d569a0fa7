//! Analytics side of the mdsync engine.
//!
//! Polls the analytics snapshot endpoint on a fixed cadence, aligns
//! historical bars with forecast series, derives summary metrics and
//! estimates touch probabilities from realized volatility.
//!
//! Ticket-based polling: the poller hands out generation-tagged tickets and
//! discards any result whose ticket no longer matches the selected instrument.

pub mod aligner;
pub mod client;
pub mod error;
pub mod fill_probability;
pub mod poller;
pub mod summary;

pub use aligner::{align, AlignedTimeline};
pub use client::{
    parse_snapshot, AnalyticsClient, BoxFuture, DynSnapshotSource, MockSnapshotSource,
    SnapshotRequest, SnapshotSource, DEFAULT_TIMEOUT,
};
pub use error::{AnalyticsError, AnalyticsResult};
pub use fill_probability::{estimate, normal_cdf, probability, FillEstimate};
pub use poller::{
    PollOutcome, PollTicket, PollerConfig, PollerState, SnapshotPoller, SnapshotView,
    VolumeChartData, DEFAULT_POLL_INTERVAL_MS,
};
pub use summary::{summarize, SummaryMetrics};
