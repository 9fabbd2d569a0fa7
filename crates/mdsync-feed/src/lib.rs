//! Streaming market data for the mdsync engine.
//!
//! Turns routed stream events into typed book/price events, aggregates order
//! books into depth-ladder metrics and publishes the streaming view.

pub mod error;
pub mod market_state;
pub mod orderbook;
pub mod parser;

pub use error::{FeedError, FeedResult};
pub use market_state::{StreamingState, StreamingView};
pub use orderbook::{
    aggregate, AggregatedBook, BookRow, BookView, OrderBookAggregator, Sentiment,
    DEFAULT_BOOK_DEPTH,
};
pub use parser::{MarketEvent, MessageParser, ParseStats};
