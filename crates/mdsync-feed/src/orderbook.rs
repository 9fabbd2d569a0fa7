//! Order book aggregation.
//!
//! Turns a raw venue book into the metrics a depth ladder needs: mid, spread,
//! per-row depth bars, distance from mid and buy/sell sentiment. Aggregation is
//! a pure function of the snapshot and the display depth.

use mdsync_core::{OrderBookLevel, OrderBookSnapshot, Price, Size};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::Serialize;

/// Default number of levels shown per side.
pub const DEFAULT_BOOK_DEPTH: usize = 20;

/// One displayed book row.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BookRow {
    pub price: Price,
    pub size: Size,
    /// `size / max_level_size`, for the relative depth bar.
    pub depth_ratio: f64,
    /// Absolute distance from mid in basis points. Informational.
    pub distance_bps: Option<f64>,
}

/// Buy/sell volume split, in percent.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Sentiment {
    pub buy_pct: f64,
    pub sell_pct: f64,
}

impl Sentiment {
    pub const NEUTRAL: Self = Self {
        buy_pct: 50.0,
        sell_pct: 50.0,
    };

    fn from_volumes(bid_volume: Size, ask_volume: Size) -> Self {
        let total = bid_volume + ask_volume;
        if total.is_zero() {
            return Self::NEUTRAL;
        }
        let buy_pct = bid_volume.ratio_of(total) * 100.0;
        Self {
            buy_pct,
            sell_pct: 100.0 - buy_pct,
        }
    }
}

/// Aggregated view of a non-empty book.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AggregatedBook {
    /// Bids, best first.
    pub bids: Vec<BookRow>,
    /// Asks, best first.
    pub asks: Vec<BookRow>,
    pub mid: Price,
    /// `None` when one side is empty and the venue gave no spread.
    pub spread_bps: Option<f64>,
    pub max_level_size: Size,
    pub bid_volume: Size,
    pub ask_volume: Size,
    pub sentiment: Sentiment,
}

impl AggregatedBook {
    pub fn best_bid(&self) -> Option<&BookRow> {
        self.bids.first()
    }

    pub fn best_ask(&self) -> Option<&BookRow> {
        self.asks.first()
    }
}

/// Order book as presented to consumers.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
#[serde(tag = "status", content = "book", rename_all = "snake_case")]
pub enum BookView {
    /// Empty or missing book. Never rendered as a zeroed ladder.
    #[default]
    NoData,
    Ready(AggregatedBook),
}

impl BookView {
    pub fn is_no_data(&self) -> bool {
        matches!(self, Self::NoData)
    }

    pub fn as_ready(&self) -> Option<&AggregatedBook> {
        match self {
            Self::Ready(book) => Some(book),
            Self::NoData => None,
        }
    }
}

/// Normalize one side: drop unusable levels, sort best first, cap depth.
fn normalize(levels: &[OrderBookLevel], descending: bool, depth: usize) -> Vec<OrderBookLevel> {
    let mut side: Vec<OrderBookLevel> = levels.iter().filter(|l| l.is_valid()).copied().collect();
    if descending {
        side.sort_by(|a, b| b.price.cmp(&a.price));
    } else {
        side.sort_by(|a, b| a.price.cmp(&b.price));
    }
    side.truncate(depth);
    side
}

fn rows(levels: &[OrderBookLevel], mid: Price, max_level_size: Size) -> Vec<BookRow> {
    levels
        .iter()
        .map(|level| BookRow {
            price: level.price,
            size: level.size,
            depth_ratio: level.size.ratio_of(max_level_size),
            distance_bps: level.price.bps_from(mid).map(f64::abs),
        })
        .collect()
}

/// `(ask - bid) / mid * 10_000`.
fn spread_bps(bid: Price, ask: Price, mid: Price) -> Option<f64> {
    if !mid.is_positive() {
        return None;
    }
    ((ask.inner() - bid.inner()) / mid.inner() * Decimal::from(10_000)).to_f64()
}

/// Aggregate `book`, showing at most `depth` levels per side.
pub fn aggregate(book: &OrderBookSnapshot, depth: usize) -> BookView {
    let bids = normalize(&book.bids, true, depth);
    let asks = normalize(&book.asks, false, depth);

    let (best_bid, best_ask) = (bids.first(), asks.first());
    let derived_mid = match (best_bid, best_ask) {
        (Some(bid), Some(ask)) => Some(Price::midpoint(bid.price, ask.price)),
        (Some(only), None) | (None, Some(only)) => Some(only.price),
        (None, None) => return BookView::NoData,
    };

    // Venue mid wins; the level midpoint is only a fallback.
    let Some(mid) = book.venue_mid.or(derived_mid) else {
        return BookView::NoData;
    };

    let spread_bps = book.venue_spread_bps.or_else(|| match (best_bid, best_ask) {
        (Some(bid), Some(ask)) => spread_bps(bid.price, ask.price, mid),
        _ => None,
    });

    let max_level_size = bids
        .iter()
        .chain(asks.iter())
        .map(|l| l.size)
        .max()
        .unwrap_or(Size::ZERO);
    let bid_volume: Size = bids.iter().map(|l| l.size).sum();
    let ask_volume: Size = asks.iter().map(|l| l.size).sum();

    BookView::Ready(AggregatedBook {
        bids: rows(&bids, mid, max_level_size),
        asks: rows(&asks, mid, max_level_size),
        mid,
        spread_bps,
        max_level_size,
        bid_volume,
        ask_volume,
        sentiment: Sentiment::from_volumes(bid_volume, ask_volume),
    })
}

/// Stateless aggregator bound to a display depth.
#[derive(Debug, Clone, Copy)]
pub struct OrderBookAggregator {
    depth: usize,
}

impl Default for OrderBookAggregator {
    fn default() -> Self {
        Self::new(DEFAULT_BOOK_DEPTH)
    }
}

impl OrderBookAggregator {
    pub fn new(depth: usize) -> Self {
        Self {
            depth: depth.max(1),
        }
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn aggregate(&self, book: &OrderBookSnapshot) -> BookView {
        aggregate(book, self.depth)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn level(px: Decimal, sz: Decimal) -> OrderBookLevel {
        OrderBookLevel::new(Price::new(px), Size::new(sz))
    }

    fn scenario_a() -> OrderBookSnapshot {
        OrderBookSnapshot::new(vec![level(dec!(100), dec!(5))], vec![level(dec!(101), dec!(3))])
    }

    #[test]
    fn test_single_level_book_metrics() {
        let BookView::Ready(book) = aggregate(&scenario_a(), 10) else {
            panic!("expected ready book");
        };
        assert_eq!(book.mid.inner(), dec!(100.5));
        let spread = book.spread_bps.unwrap();
        assert!((spread - 99.502_487_562).abs() < 1e-6, "spread {spread}");
        assert!((book.sentiment.buy_pct - 62.5).abs() < 1e-9);
        assert!((book.sentiment.sell_pct - 37.5).abs() < 1e-9);
        assert_eq!(book.max_level_size.inner(), dec!(5));
        assert!((book.asks[0].depth_ratio - 0.6).abs() < 1e-12);
    }

    #[test]
    fn test_aggregate_is_pure() {
        let book = scenario_a();
        let first = aggregate(&book, 10);
        let second = aggregate(&book, 10);
        assert_eq!(first, second);
        assert_eq!(book, scenario_a());
    }

    #[test]
    fn test_venue_mid_and_spread_take_precedence() {
        let book = scenario_a()
            .with_venue_mid(Price::new(dec!(100.7)))
            .with_venue_spread_bps(12.0);
        let view = aggregate(&book, 10);
        let agg = view.as_ready().unwrap();
        assert_eq!(agg.mid.inner(), dec!(100.7));
        assert_eq!(agg.spread_bps, Some(12.0));
    }

    #[test]
    fn test_normalization_sorts_filters_and_caps() {
        let book = OrderBookSnapshot::new(
            vec![
                level(dec!(98), dec!(1)),
                level(dec!(100), dec!(0)),
                level(dec!(99), dec!(2)),
                level(dec!(97), dec!(4)),
            ],
            vec![level(dec!(103), dec!(1)), level(dec!(101), dec!(1))],
        );
        let view = aggregate(&book, 2);
        let agg = view.as_ready().unwrap();
        let bid_prices: Vec<_> = agg.bids.iter().map(|r| r.price.inner()).collect();
        let ask_prices: Vec<_> = agg.asks.iter().map(|r| r.price.inner()).collect();
        assert_eq!(bid_prices, vec![dec!(99), dec!(98)]);
        assert_eq!(ask_prices, vec![dec!(101), dec!(103)]);
        assert_eq!(agg.mid.inner(), dec!(100));
        assert!((agg.bids[0].distance_bps.unwrap() - 100.0).abs() < 1e-9);
    }

    #[test]
    fn test_empty_book_is_no_data() {
        assert!(aggregate(&OrderBookSnapshot::default(), 10).is_no_data());
        // Only zero-size levels: nothing usable.
        let book = OrderBookSnapshot::new(vec![level(dec!(100), dec!(0))], vec![]);
        assert!(aggregate(&book, 10).is_no_data());
    }

    #[test]
    fn test_one_sided_book() {
        let book = OrderBookSnapshot::new(vec![level(dec!(100), dec!(2))], vec![]);
        let view = aggregate(&book, 10);
        let agg = view.as_ready().unwrap();
        assert_eq!(agg.mid.inner(), dec!(100));
        assert!(agg.spread_bps.is_none());
        assert_eq!(agg.sentiment.buy_pct, 100.0);
    }

    #[test]
    fn test_neutral_sentiment_at_zero_volume() {
        assert_eq!(
            Sentiment::from_volumes(Size::ZERO, Size::ZERO),
            Sentiment::NEUTRAL
        );
    }
}
