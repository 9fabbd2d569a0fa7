//! Streaming-side consumer state.
//!
//! Holds what the streaming channels currently say about the selected
//! instrument and publishes every change to listeners through a
//! `tokio::sync::watch` channel. The UI is one listener; tests are another.

use crate::error::{FeedError, FeedResult};
use crate::orderbook::{BookView, OrderBookAggregator};
use crate::parser::MarketEvent;
use mdsync_core::{ChannelType, InstrumentKey, Price};
use rust_decimal::Decimal;
use serde::Serialize;
use tokio::sync::watch;
use tracing::{debug, info};

/// Streaming outputs for one instrument.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct StreamingView {
    pub instrument: Option<InstrumentKey>,
    pub order_book: BookView,
    pub live_pair_price: Option<Price>,
    /// Change from the previous price tick.
    pub live_price_change: Option<Decimal>,
    /// Subscribed, no book received yet.
    pub is_l2_data_loading: bool,
    /// Book channel is empty or gave up after its resubscribe budget.
    pub no_l2_data: bool,
    /// Price channel gave up after its resubscribe budget.
    pub no_price_data: bool,
    pub contract_value: Option<Decimal>,
    pub is_inverse: Option<bool>,
    pub last_book_at_ms: Option<u64>,
    pub last_price_at_ms: Option<u64>,
}

/// Owner of the streaming view and its publisher.
pub struct StreamingState {
    aggregator: OrderBookAggregator,
    view: StreamingView,
    tx: watch::Sender<StreamingView>,
}

impl StreamingState {
    pub fn new(aggregator: OrderBookAggregator) -> Self {
        let (tx, _rx) = watch::channel(StreamingView::default());
        Self {
            aggregator,
            view: StreamingView::default(),
            tx,
        }
    }

    /// New listener; sees the current view immediately.
    pub fn subscribe(&self) -> watch::Receiver<StreamingView> {
        self.tx.subscribe()
    }

    pub fn view(&self) -> &StreamingView {
        &self.view
    }

    pub fn instrument(&self) -> Option<&InstrumentKey> {
        self.view.instrument.as_ref()
    }

    /// Start over for `key`: everything cleared, book loading.
    pub fn reset(&mut self, key: InstrumentKey) {
        info!(instrument = %key, "Streaming state reset");
        self.view = StreamingView {
            instrument: Some(key),
            is_l2_data_loading: true,
            ..Default::default()
        };
        self.publish();
    }

    /// Apply one parsed event. Events for another instrument are rejected.
    pub fn apply(&mut self, event: MarketEvent, received_at_ms: u64) -> FeedResult<()> {
        match &self.view.instrument {
            Some(current) if current == event.key() => {}
            current => {
                return Err(FeedError::InstrumentMismatch {
                    expected: current
                        .as_ref()
                        .map_or_else(|| "<none>".to_string(), ToString::to_string),
                    actual: event.key().to_string(),
                });
            }
        }

        match event {
            MarketEvent::Book { book, .. } => {
                let order_book = self.aggregator.aggregate(&book);
                self.view.no_l2_data = order_book.is_no_data();
                self.view.order_book = order_book;
                self.view.is_l2_data_loading = false;
                self.view.last_book_at_ms = Some(received_at_ms);
                if book.contract_value.is_some() {
                    self.view.contract_value = book.contract_value;
                }
                if book.is_inverse.is_some() {
                    self.view.is_inverse = book.is_inverse;
                }
            }
            MarketEvent::Price { price, .. } => {
                self.view.live_price_change = self
                    .view
                    .live_pair_price
                    .map(|prev| price.inner() - prev.inner());
                self.view.live_pair_price = Some(price);
                self.view.no_price_data = false;
                self.view.last_price_at_ms = Some(received_at_ms);
            }
        }

        self.publish();
        Ok(())
    }

    /// A channel exhausted its resubscribe budget.
    pub fn mark_no_data(&mut self, channel: ChannelType) {
        debug!(%channel, "Streaming channel marked NoData");
        match channel {
            ChannelType::OrderBook => {
                self.view.order_book = BookView::NoData;
                self.view.no_l2_data = true;
                self.view.is_l2_data_loading = false;
            }
            ChannelType::LastPrice => {
                self.view.no_price_data = true;
            }
        }
        self.publish();
    }

    fn publish(&self) {
        self.tx.send_replace(self.view.clone());
    }
}

impl Default for StreamingState {
    fn default() -> Self {
        Self::new(OrderBookAggregator::default())
    }
}
