//! Streaming client for the market-data sync engine.
//!
//! Provides:
//! - One shared WebSocket per view with reconnection and exponential backoff
//! - Per-(instrument, channel) subscription lifecycle tracking
//! - A fixed-tick staleness watchdog with bounded resubscribes
//! - Routing of inbound data to the subscription it belongs to

pub mod connection;
pub mod error;
pub mod message;
pub mod subscription;
pub mod watchdog;
pub mod ws_write_handle;

pub use connection::{
    route_inbound, ConnectionConfig, ConnectionManager, ConnectionState, ConnectionStatsSnapshot,
    RouteOutcome, StreamEvent,
};
pub use error::{WsError, WsResult};
pub use message::{
    decode_inbound, CommandKind, DataType, Decoded, InboundMessage, RawBook, RawLevel, RawPrice,
    WsCommand,
};
pub use subscription::{
    ChannelSubscription, StalenessPolicy, StalenessVerdict, SubscriptionRegistry,
    SubscriptionState, DEFAULT_MAX_RESUBSCRIBE_ATTEMPTS, DEFAULT_STALENESS_THRESHOLD_MS,
};
pub use watchdog::{StalenessWatchdog, WatchdogConfig, WatchdogReport};
pub use ws_write_handle::{CommandSink, SendOutcome, WsWriteHandle};

use std::sync::Once;

static INIT_CRYPTO: Once = Once::new();

/// Initialize the TLS crypto provider.
/// Must be called before any WebSocket connections are made.
pub fn init_crypto() {
    INIT_CRYPTO.call_once(|| {
        let _ = rustls::crypto::ring::default_provider().install_default();
    });
}
