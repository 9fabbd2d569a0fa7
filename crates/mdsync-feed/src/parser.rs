//! Conversion of routed stream events into typed market events.
//!
//! The connection layer has already validated the envelope and matched it to
//! a subscription. This layer turns raw decimals into book and price types and
//! rejects values that cannot describe a real market (non-positive prices).

use crate::error::{FeedError, FeedResult};
use mdsync_core::{InstrumentKey, OrderBookLevel, OrderBookSnapshot, Price, Size};
use mdsync_ws::{InboundMessage, RawBook, RawLevel, StreamEvent};
use rust_decimal::Decimal;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, warn};

/// Parsed market data event.
#[derive(Debug, Clone, PartialEq)]
pub enum MarketEvent {
    /// Full order book replacement.
    Book {
        key: InstrumentKey,
        book: OrderBookSnapshot,
    },
    /// Last traded price.
    Price { key: InstrumentKey, price: Price },
}

impl MarketEvent {
    pub fn key(&self) -> &InstrumentKey {
        match self {
            Self::Book { key, .. } | Self::Price { key, .. } => key,
        }
    }
}

/// Parser statistics.
#[derive(Debug, Default)]
pub struct ParseStats {
    accepted: AtomicU64,
    rejected: AtomicU64,
    dropped_levels: AtomicU64,
}

impl ParseStats {
    pub fn accepted(&self) -> u64 {
        self.accepted.load(Ordering::Relaxed)
    }

    pub fn rejected(&self) -> u64 {
        self.rejected.load(Ordering::Relaxed)
    }

    /// Book levels discarded for a non-positive price.
    pub fn dropped_levels(&self) -> u64 {
        self.dropped_levels.load(Ordering::Relaxed)
    }
}

/// Message parser.
#[derive(Debug, Default)]
pub struct MessageParser {
    stats: ParseStats,
}

impl MessageParser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stats(&self) -> &ParseStats {
        &self.stats
    }

    /// Parse one routed event.
    pub fn parse(&self, event: &StreamEvent) -> FeedResult<MarketEvent> {
        let result = match &event.message {
            InboundMessage::OrderBookUpdate { book, .. } => self
                .parse_book(book)
                .map(|book| MarketEvent::Book {
                    key: event.key.clone(),
                    book,
                }),
            InboundMessage::PriceUpdate { price, .. } => {
                parse_price(price.value()).map(|price| MarketEvent::Price {
                    key: event.key.clone(),
                    price,
                })
            }
        };

        match &result {
            Ok(_) => {
                self.stats.accepted.fetch_add(1, Ordering::Relaxed);
            }
            Err(e) => {
                self.stats.rejected.fetch_add(1, Ordering::Relaxed);
                warn!(instrument = %event.key, channel = %event.channel, error = %e, "Rejected stream event");
            }
        }
        result
    }

    fn parse_book(&self, raw: &RawBook) -> FeedResult<OrderBookSnapshot> {
        let bids = self.parse_levels(&raw.bids);
        let asks = self.parse_levels(&raw.asks);

        let mut book = OrderBookSnapshot::new(bids, asks);
        // A zero or negative venue mid is treated as absent.
        book.venue_mid = raw.mid_price.map(Price::new).filter(Price::is_positive);
        book.venue_spread_bps = raw.spread_bps.filter(|s| s.is_finite() && *s >= 0.0);
        book.contract_value = raw.contract_value;
        book.is_inverse = raw.is_inverse;

        debug!(
            bids = book.bids.len(),
            asks = book.asks.len(),
            venue_mid = ?book.venue_mid,
            "Order book parsed"
        );
        Ok(book)
    }

    fn parse_levels(&self, raw: &[RawLevel]) -> Vec<OrderBookLevel> {
        let mut levels = Vec::with_capacity(raw.len());
        for level in raw {
            let price = Price::new(level.price());
            if !price.is_positive() {
                self.stats.dropped_levels.fetch_add(1, Ordering::Relaxed);
                continue;
            }
            levels.push(OrderBookLevel::new(price, Size::new(level.size())));
        }
        levels
    }
}

fn parse_price(value: Decimal) -> FeedResult<Price> {
    let price = Price::new(value);
    if !price.is_positive() {
        return Err(FeedError::InvalidData(format!(
            "non-positive last price: {value}"
        )));
    }
    Ok(price)
}
