//! WebSocket connection manager.
//!
//! Owns the single physical connection of a market view. Handles connection
//! lifecycle, automatic reconnection with exponential backoff, restoration of
//! every desired subscription on (re)connect, and routing of inbound data to
//! the matching [`ChannelSubscription`](crate::subscription::ChannelSubscription).

use crate::error::{WsError, WsResult};
use crate::message::{decode_inbound, Decoded, InboundMessage};
use crate::subscription::{SubscriptionRegistry, SubscriptionState};
use crate::ws_write_handle::WsWriteHandle;
use futures_util::{SinkExt, StreamExt};
use mdsync_core::{ChannelType, DynClock, InstrumentKey};
use parking_lot::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex as TokioMutex};
use tokio_tungstenite::{connect_async_tls_with_config, tungstenite::Message};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Connection configuration.
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// WebSocket URL.
    pub url: String,
    /// Maximum consecutive failed connects (0 = infinite).
    pub max_reconnect_attempts: u32,
    /// Base delay for exponential backoff.
    pub reconnect_base_delay_ms: u64,
    /// Maximum delay for exponential backoff.
    pub reconnect_max_delay_ms: u64,
    /// Outbound command buffer.
    pub outbound_buffer: usize,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            max_reconnect_attempts: 0, // Infinite
            reconnect_base_delay_ms: 1000,
            reconnect_max_delay_ms: 30_000,
            outbound_buffer: 256,
        }
    }
}

/// Connection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
}

impl ConnectionState {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Reconnecting => "reconnecting",
        }
    }
}

/// Inbound traffic counters.
#[derive(Debug, Default)]
pub struct ConnectionStats {
    routed: AtomicU64,
    unrouted: AtomicU64,
    malformed: AtomicU64,
    control: AtomicU64,
    reconnects: AtomicU64,
}

/// Point-in-time copy of [`ConnectionStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConnectionStatsSnapshot {
    pub routed: u64,
    pub unrouted: u64,
    pub malformed: u64,
    pub control: u64,
    pub reconnects: u64,
}

impl ConnectionStats {
    fn record(&self, outcome: &RouteOutcome) {
        let counter = match outcome {
            RouteOutcome::Routed(_) => &self.routed,
            RouteOutcome::Unrouted { .. } => &self.unrouted,
            RouteOutcome::Malformed(_) => &self.malformed,
            RouteOutcome::Control(_) => &self.control,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> ConnectionStatsSnapshot {
        ConnectionStatsSnapshot {
            routed: self.routed.load(Ordering::Relaxed),
            unrouted: self.unrouted.load(Ordering::Relaxed),
            malformed: self.malformed.load(Ordering::Relaxed),
            control: self.control.load(Ordering::Relaxed),
            reconnects: self.reconnects.load(Ordering::Relaxed),
        }
    }
}

/// Data routed to a live subscription.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamEvent {
    pub key: InstrumentKey,
    pub channel: ChannelType,
    /// Subscription state before this update was applied.
    pub previous_state: SubscriptionState,
    pub received_at_ms: u64,
    pub message: InboundMessage,
}

/// What happened to one inbound frame.
#[derive(Debug, Clone, PartialEq)]
pub enum RouteOutcome {
    /// Applied to a subscription and ready to forward.
    Routed(StreamEvent),
    /// Valid data nobody is subscribed to (e.g. a late frame after a switch).
    Unrouted { venue: String, channel: ChannelType },
    /// Non-data frame.
    Control(String),
    /// Dropped; does not refresh any subscription.
    Malformed(String),
}

/// Decode a text frame and apply it to the registry.
///
/// Only well-formed data for a desired subscription refreshes its
/// last-update time and resets its attempt counter.
pub fn route_inbound(text: &str, registry: &SubscriptionRegistry, now_ms: u64) -> RouteOutcome {
    match decode_inbound(text) {
        Decoded::Data(message) => {
            let channel = message.channel();
            match registry.record_update(message.exchange(), message.pair(), channel, now_ms) {
                Some((key, previous_state)) => RouteOutcome::Routed(StreamEvent {
                    key,
                    channel,
                    previous_state,
                    received_at_ms: now_ms,
                    message,
                }),
                None => RouteOutcome::Unrouted {
                    venue: message.exchange().to_string(),
                    channel,
                },
            }
        }
        Decoded::Control(kind) => RouteOutcome::Control(kind),
        Decoded::Malformed(reason) => RouteOutcome::Malformed(reason),
    }
}

/// WebSocket connection manager.
pub struct ConnectionManager {
    config: ConnectionConfig,
    state: Arc<RwLock<ConnectionState>>,
    registry: Arc<SubscriptionRegistry>,
    clock: DynClock,
    event_tx: mpsc::Sender<StreamEvent>,
    stats: Arc<ConnectionStats>,
    reconnect_count: Arc<RwLock<u32>>,
    /// Outbound message sender (for WsWriteHandle).
    outbound_tx: mpsc::Sender<String>,
    /// Outbound message receiver (consumed by message loop).
    outbound_rx: Arc<TokioMutex<mpsc::Receiver<String>>>,
    /// Cancellation token for graceful shutdown.
    shutdown_token: CancellationToken,
}

impl ConnectionManager {
    /// Create a new connection manager.
    pub fn new(
        config: ConnectionConfig,
        registry: Arc<SubscriptionRegistry>,
        clock: DynClock,
        event_tx: mpsc::Sender<StreamEvent>,
    ) -> Self {
        let (outbound_tx, outbound_rx) = mpsc::channel(config.outbound_buffer.max(1));
        Self {
            config,
            state: Arc::new(RwLock::new(ConnectionState::Disconnected)),
            registry,
            clock,
            event_tx,
            stats: Arc::new(ConnectionStats::default()),
            reconnect_count: Arc::new(RwLock::new(0)),
            outbound_tx,
            outbound_rx: Arc::new(TokioMutex::new(outbound_rx)),
            shutdown_token: CancellationToken::new(),
        }
    }

    /// Get a write handle for sending commands.
    ///
    /// The handle can be cloned and shared; it is the only write path.
    pub fn write_handle(&self) -> WsWriteHandle {
        WsWriteHandle::new(self.outbound_tx.clone(), self.state.clone())
    }

    pub fn registry(&self) -> &Arc<SubscriptionRegistry> {
        &self.registry
    }

    /// Get current connection state.
    pub fn state(&self) -> ConnectionState {
        *self.state.read()
    }

    pub fn stats(&self) -> ConnectionStatsSnapshot {
        self.stats.snapshot()
    }

    /// Signal graceful shutdown.
    pub fn shutdown(&self) {
        info!("ConnectionManager shutdown requested");
        self.shutdown_token.cancel();
    }

    pub fn is_shutdown(&self) -> bool {
        self.shutdown_token.is_cancelled()
    }

    /// Connect and run the message loop until shutdown or the reconnect
    /// budget is exhausted.
    pub async fn connect(&self) -> WsResult<()> {
        self.connect_with_retry().await
    }

    async fn connect_with_retry(&self) -> WsResult<()> {
        loop {
            if self.is_shutdown() {
                info!("Shutdown requested, exiting connect loop");
                self.set_state(ConnectionState::Disconnected);
                return Ok(());
            }

            self.set_state(ConnectionState::Connecting);

            match self.try_connect().await {
                Ok(()) => info!("WebSocket connection closed"),
                Err(e) => error!(?e, "WebSocket connection error"),
            }

            // Every subscription waits for the re-issue on the next open.
            self.registry.mark_all_connecting(self.clock.now_ms());

            if self.is_shutdown() {
                info!("Shutdown requested after disconnect, not reconnecting");
                self.set_state(ConnectionState::Disconnected);
                return Ok(());
            }

            // try_connect zeroes the count once a link is established.
            let attempt = {
                let mut count = self.reconnect_count.write();
                *count += 1;
                *count
            };
            self.stats.reconnects.fetch_add(1, Ordering::Relaxed);

            if self.config.max_reconnect_attempts > 0
                && attempt >= self.config.max_reconnect_attempts
            {
                error!(attempt, "Max reconnection attempts reached");
                self.set_state(ConnectionState::Disconnected);
                return Err(WsError::ReconnectExhausted { attempts: attempt });
            }

            self.set_state(ConnectionState::Reconnecting);

            let delay = self.calculate_backoff_delay(attempt);
            warn!(attempt, delay_ms = delay.as_millis(), "Reconnecting");

            tokio::select! {
                () = tokio::time::sleep(delay) => {}
                () = self.shutdown_token.cancelled() => {
                    info!("Shutdown requested during backoff, exiting");
                    self.set_state(ConnectionState::Disconnected);
                    return Ok(());
                }
            }
        }
    }

    async fn try_connect(&self) -> WsResult<()> {
        info!(url = %self.config.url, "Connecting to WebSocket");

        let (ws_stream, _response) =
            connect_async_tls_with_config(&self.config.url, None, true, None).await?;
        let (mut write, mut read) = ws_stream.split();

        // Commands queued against the previous link are not replayed;
        // the restore below re-issues what is still wanted.
        let mut outbound_rx = self.outbound_rx.lock().await;
        let mut discarded = 0usize;
        while outbound_rx.try_recv().is_ok() {
            discarded += 1;
        }
        if discarded > 0 {
            debug!(discarded, "Discarded commands queued before reconnect");
        }

        self.set_state(ConnectionState::Connected);
        *self.reconnect_count.write() = 0;
        info!("WebSocket connected");

        let restore = self.registry.restore_commands(self.clock.now_ms());
        info!(count = restore.len(), "Restoring subscriptions");
        for command in &restore {
            write.send(Message::Text(command.to_json()?)).await?;
        }

        loop {
            tokio::select! {
                () = self.shutdown_token.cancelled() => {
                    info!("Shutdown signal received in message loop");
                    if let Err(e) = write.send(Message::Close(None)).await {
                        warn!(?e, "Failed to send Close frame during shutdown");
                    }
                    return Ok(());
                }

                msg = read.next() => {
                    match msg {
                        Some(Ok(Message::Text(text))) => {
                            self.handle_text_message(&text).await;
                        }
                        Some(Ok(Message::Ping(data))) => {
                            debug!("Received ping, sending pong");
                            write.send(Message::Pong(data)).await?;
                        }
                        Some(Ok(Message::Close(frame))) => {
                            let (code, reason) = frame
                                .map(|f| (f.code.into(), f.reason.to_string()))
                                .unwrap_or((1000, "Normal close".to_string()));
                            warn!(code, %reason, "WebSocket closed by server");
                            self.set_state(ConnectionState::Reconnecting);
                            return Err(WsError::ConnectionClosed { code, reason });
                        }
                        Some(Err(e)) => {
                            error!(?e, "WebSocket read error");
                            self.set_state(ConnectionState::Reconnecting);
                            return Err(e.into());
                        }
                        None => {
                            warn!("WebSocket stream ended");
                            self.set_state(ConnectionState::Reconnecting);
                            return Ok(());
                        }
                        _ => {}
                    }
                }

                outbound = outbound_rx.recv() => {
                    if let Some(text) = outbound {
                        write.send(Message::Text(text)).await?;
                    }
                }
            }
        }
    }

    async fn handle_text_message(&self, text: &str) {
        let outcome = route_inbound(text, &self.registry, self.clock.now_ms());
        self.stats.record(&outcome);

        match outcome {
            RouteOutcome::Routed(event) => {
                if self.event_tx.send(event).await.is_err() {
                    warn!("Stream event receiver dropped");
                }
            }
            RouteOutcome::Unrouted { venue, channel } => {
                debug!(%venue, %channel, "No subscription for inbound data, dropping");
            }
            RouteOutcome::Control(kind) => {
                debug!(%kind, "Control frame");
            }
            RouteOutcome::Malformed(reason) => {
                warn!(%reason, "Malformed frame dropped");
            }
        }
    }

    fn set_state(&self, state: ConnectionState) {
        *self.state.write() = state;
    }

    fn calculate_backoff_delay(&self, attempt: u32) -> Duration {
        let base = self.config.reconnect_base_delay_ms;
        let max = self.config.reconnect_max_delay_ms;

        // base * 2^(attempt-1), capped
        let exponent = attempt.saturating_sub(1).min(10);
        let delay = base.saturating_mul(1u64 << exponent).min(max);

        Duration::from_millis(delay + rand_jitter())
    }
}

/// Generate random jitter (0-1000ms).
fn rand_jitter() -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.subsec_nanos())
        .unwrap_or(0);
    (nanos % 1000) as u64
}
