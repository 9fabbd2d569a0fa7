//! Order book snapshot types.
//!
//! The venue pushes full books; a snapshot is replaced wholesale on every
//! update and never patched incrementally.

use crate::{Price, Size};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// One price level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderBookLevel {
    pub price: Price,
    pub size: Size,
}

impl OrderBookLevel {
    pub fn new(price: Price, size: Size) -> Self {
        Self { price, size }
    }

    /// A level is usable only with positive price and size.
    pub fn is_valid(&self) -> bool {
        self.price.is_positive() && self.size.is_positive()
    }
}

/// Full order book as delivered by the venue.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct OrderBookSnapshot {
    /// Bid levels, best (highest) first.
    pub bids: Vec<OrderBookLevel>,
    /// Ask levels, best (lowest) first.
    pub asks: Vec<OrderBookLevel>,
    /// Venue-reported mid price.
    pub venue_mid: Option<Price>,
    /// Venue-reported spread in basis points.
    pub venue_spread_bps: Option<f64>,
    /// Contract multiplier for derivatives.
    pub contract_value: Option<Decimal>,
    /// Inverse (coin-margined) contract flag.
    pub is_inverse: Option<bool>,
}

impl OrderBookSnapshot {
    pub fn new(bids: Vec<OrderBookLevel>, asks: Vec<OrderBookLevel>) -> Self {
        Self {
            bids,
            asks,
            ..Default::default()
        }
    }

    pub fn with_venue_mid(mut self, mid: Price) -> Self {
        self.venue_mid = Some(mid);
        self
    }

    pub fn with_venue_spread_bps(mut self, spread_bps: f64) -> Self {
        self.venue_spread_bps = Some(spread_bps);
        self
    }

    /// No levels on either side.
    pub fn is_empty(&self) -> bool {
        self.bids.is_empty() && self.asks.is_empty()
    }

    /// Best bid by price, regardless of input ordering.
    pub fn best_bid(&self) -> Option<OrderBookLevel> {
        self.bids
            .iter()
            .filter(|l| l.is_valid())
            .max_by_key(|l| l.price)
            .copied()
    }

    /// Best ask by price, regardless of input ordering.
    pub fn best_ask(&self) -> Option<OrderBookLevel> {
        self.asks
            .iter()
            .filter(|l| l.is_valid())
            .min_by_key(|l| l.price)
            .copied()
    }
}
