//! Core domain types for the mdsync market-data engine.
//!
//! This crate provides fundamental types shared by the streaming and
//! analytics sides:
//! - `InstrumentKey`, `ChannelType`: what a subscription or poll is about
//! - `Price`, `Size`: decimal book values
//! - `OrderBookSnapshot`: a full venue book
//! - `MarketSnapshot`: one analytics poll result
//! - `Clock`: the single tick source

pub mod book;
pub mod clock;
pub mod decimal;
pub mod error;
pub mod instrument;
pub mod snapshot;

pub use book::{OrderBookLevel, OrderBookSnapshot};
pub use clock::{Clock, DynClock, ManualClock, SystemClock};
pub use decimal::{Price, Size};
pub use error::{CoreError, Result};
pub use instrument::{ChannelType, InstrumentKey};
pub use snapshot::{IntervalBar, MarketSnapshot, SeriesPoint};
