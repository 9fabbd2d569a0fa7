//! Instrument and channel identification.
//!
//! A market view is keyed by venue + pair. Every subscription, cache entry
//! and in-flight snapshot request carries an [`InstrumentKey`].

use crate::error::{CoreError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Unique market identifier combining venue and pair.
///
/// Format: `{venue}:{pair}` (e.g., "binance:BTC-USDT").
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct InstrumentKey {
    pub venue: String,
    pub pair: String,
}

impl InstrumentKey {
    pub fn new(venue: impl Into<String>, pair: impl Into<String>) -> Self {
        Self {
            venue: venue.into(),
            pair: pair.into(),
        }
    }

    /// Case-insensitive venue match; venues echo names in varying case.
    pub fn venue_matches(&self, venue: &str) -> bool {
        self.venue.eq_ignore_ascii_case(venue)
    }

    /// Check whether an inbound (venue, pair) tag refers to this instrument.
    ///
    /// An absent pair matches, since price and book pushes may only carry
    /// the exchange name.
    pub fn matches(&self, venue: &str, pair: Option<&str>) -> bool {
        self.venue_matches(venue) && pair.map_or(true, |p| self.pair.eq_ignore_ascii_case(p))
    }
}

impl fmt::Display for InstrumentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.venue, self.pair)
    }
}

impl FromStr for InstrumentKey {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        match s.split_once(':') {
            Some((venue, pair)) if !venue.is_empty() && !pair.is_empty() => {
                Ok(Self::new(venue, pair))
            }
            _ => Err(CoreError::InvalidInstrumentKey(s.to_string())),
        }
    }
}

/// Logical stream for one instrument.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ChannelType {
    /// Aggregated order book levels.
    OrderBook,
    /// Last traded pair price.
    LastPrice,
}

impl ChannelType {
    pub const ALL: [ChannelType; 2] = [ChannelType::OrderBook, ChannelType::LastPrice];

    /// Wire `data_type` name used in subscribe commands.
    pub fn data_type(&self) -> &'static str {
        match self {
            Self::OrderBook => "order_book",
            Self::LastPrice => "pair_price",
        }
    }

    /// Short label for logs and metrics.
    pub fn label(&self) -> &'static str {
        match self {
            Self::OrderBook => "orderbook",
            Self::LastPrice => "last_price",
        }
    }
}

impl fmt::Display for ChannelType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}
