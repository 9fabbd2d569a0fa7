//! Market view orchestration.
//!
//! One cooperative event loop per view. It owns:
//! - the shared WebSocket (spawned `ConnectionManager`) and subscription registry
//! - the staleness watchdog, driven by the fixed tick
//! - streaming state (order book, live price)
//! - the analytics snapshot poller, whose fetches run in spawned tasks
//!
//! Consumers hold a [`MarketViewHandle`]: commands go in through an mpsc
//! channel, state comes out through `tokio::sync::watch` listeners.

use crate::config::AppConfig;
use crate::error::{AppError, AppResult};
use mdsync_analytics::{
    estimate, AnalyticsClient, AnalyticsError, DynSnapshotSource, FillEstimate, PollOutcome,
    PollTicket, SnapshotPoller, SnapshotView,
};
use mdsync_core::{ChannelType, DynClock, InstrumentKey, MarketSnapshot, SystemClock};
use mdsync_feed::{MessageParser, OrderBookAggregator, StreamingState, StreamingView};
use mdsync_telemetry::Metrics;
use mdsync_ws::{
    CommandKind, CommandSink, ConnectionManager, ConnectionStatsSnapshot, StalenessWatchdog,
    StreamEvent, SubscriptionRegistry, WatchdogReport, WsCommand, WsWriteHandle,
};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, watch};
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

const EVENT_BUFFER: usize = 1_000;
const COMMAND_BUFFER: usize = 32;
const POLL_RESULT_BUFFER: usize = 8;
const CONNECTION_JOIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Commands accepted by the view loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ViewCommand {
    /// Drop interest in the current instrument and select another.
    SwitchInstrument(InstrumentKey),
    Shutdown,
}

/// A finished snapshot fetch.
struct PollResult {
    ticket: PollTicket,
    result: Result<MarketSnapshot, AnalyticsError>,
    started: Instant,
}

/// Touch probability from the current streaming and snapshot outputs.
///
/// Uses the live price, falling back to the last snapshot close, and the
/// snapshot's hourly volatility.
pub fn fill_probability(
    streaming: &StreamingView,
    snapshot: &SnapshotView,
    target: f64,
) -> Option<FillEstimate> {
    let metrics = snapshot.market_summary_metrics.as_ref();
    let current = streaming
        .live_pair_price
        .map(|p| p.to_f64())
        .or_else(|| metrics.and_then(|m| m.last_close))?;
    let hourly_volatility_pct = metrics.and_then(|m| m.hourly_volatility_pct)?;
    estimate(current, target, hourly_volatility_pct)
}

/// Cloneable consumer side of a running [`MarketView`].
#[derive(Clone)]
pub struct MarketViewHandle {
    commands: mpsc::Sender<ViewCommand>,
    streaming: watch::Receiver<StreamingView>,
    snapshot: watch::Receiver<SnapshotView>,
}

impl MarketViewHandle {
    pub async fn switch_instrument(&self, key: InstrumentKey) -> AppResult<()> {
        self.commands
            .send(ViewCommand::SwitchInstrument(key))
            .await
            .map_err(|_| AppError::Shutdown)
    }

    pub async fn shutdown(&self) -> AppResult<()> {
        self.commands
            .send(ViewCommand::Shutdown)
            .await
            .map_err(|_| AppError::Shutdown)
    }

    /// Streaming listener; sees the current value immediately.
    pub fn subscribe_streaming(&self) -> watch::Receiver<StreamingView> {
        self.streaming.clone()
    }

    /// Snapshot listener; sees the current value immediately.
    pub fn subscribe_snapshot(&self) -> watch::Receiver<SnapshotView> {
        self.snapshot.clone()
    }

    pub fn fill_probability(&self, target: f64) -> Option<FillEstimate> {
        fill_probability(&self.streaming.borrow(), &self.snapshot.borrow(), target)
    }
}

/// Market view event loop.
pub struct MarketView {
    initial: InstrumentKey,
    clock: DynClock,
    registry: Arc<SubscriptionRegistry>,
    connection: Arc<ConnectionManager>,
    write_handle: WsWriteHandle,
    watchdog: StalenessWatchdog<WsWriteHandle>,
    parser: MessageParser,
    streaming: StreamingState,
    poller: SnapshotPoller,
    source: DynSnapshotSource,
    event_rx: mpsc::Receiver<StreamEvent>,
    poll_tx: mpsc::Sender<PollResult>,
    poll_rx: mpsc::Receiver<PollResult>,
    command_tx: mpsc::Sender<ViewCommand>,
    command_rx: mpsc::Receiver<ViewCommand>,
    reported_stats: ConnectionStatsSnapshot,
}

impl MarketView {
    /// Build a view with an explicit snapshot source and clock.
    pub fn new(config: &AppConfig, source: DynSnapshotSource, clock: DynClock) -> Self {
        let registry = Arc::new(SubscriptionRegistry::new());
        let (event_tx, event_rx) = mpsc::channel(EVENT_BUFFER);
        let connection = Arc::new(ConnectionManager::new(
            config.connection_config(),
            registry.clone(),
            clock.clone(),
            event_tx,
        ));
        let write_handle = connection.write_handle();
        let watchdog = StalenessWatchdog::new(
            config.watchdog_config(),
            registry.clone(),
            write_handle.clone(),
        );
        let (poll_tx, poll_rx) = mpsc::channel(POLL_RESULT_BUFFER);
        let (command_tx, command_rx) = mpsc::channel(COMMAND_BUFFER);

        Self {
            initial: config.instrument.key(),
            clock,
            registry,
            connection,
            write_handle,
            watchdog,
            parser: MessageParser::new(),
            streaming: StreamingState::new(OrderBookAggregator::new(config.book.depth)),
            poller: SnapshotPoller::new(config.poller_config()),
            source,
            event_rx,
            poll_tx,
            poll_rx,
            command_tx,
            command_rx,
            reported_stats: ConnectionStatsSnapshot::default(),
        }
    }

    /// Build a view against the configured analytics endpoint and wall clock.
    pub fn from_config(config: &AppConfig) -> AppResult<Self> {
        let client = AnalyticsClient::with_timeout(&config.analytics_url, config.poll_timeout())?;
        Ok(Self::new(
            config,
            Arc::new(client),
            Arc::new(SystemClock::new()),
        ))
    }

    pub fn handle(&self) -> MarketViewHandle {
        MarketViewHandle {
            commands: self.command_tx.clone(),
            streaming: self.streaming.subscribe(),
            snapshot: self.poller.subscribe(),
        }
    }

    pub fn registry(&self) -> &Arc<SubscriptionRegistry> {
        &self.registry
    }

    /// Run until a shutdown command arrives.
    pub async fn run(mut self) -> AppResult<()> {
        info!(instrument = %self.initial, "Starting market view");

        let connection = self.connection.clone();
        let ws_task = tokio::spawn(async move {
            if let Err(e) = connection.connect().await {
                error!(?e, "WebSocket connection failed");
            }
        });

        let initial = self.initial.clone();
        self.select_instrument(initial);

        let mut tick = tokio::time::interval(self.watchdog.config().tick_interval);
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!("Entering market view loop");
        loop {
            tokio::select! {
                Some(event) = self.event_rx.recv() => {
                    self.handle_stream_event(event);
                }

                _ = tick.tick() => {
                    self.on_tick();
                }

                Some(result) = self.poll_rx.recv() => {
                    self.handle_poll_result(result);
                }

                command = self.command_rx.recv() => {
                    match command {
                        Some(ViewCommand::SwitchInstrument(key)) => self.select_instrument(key),
                        Some(ViewCommand::Shutdown) | None => {
                            info!("Shutdown requested");
                            break;
                        }
                    }
                }
            }
        }

        self.connection.shutdown();
        if tokio::time::timeout(CONNECTION_JOIN_TIMEOUT, ws_task)
            .await
            .is_err()
        {
            warn!("WebSocket task did not stop in time");
        }
        Metrics::ws_state_set(self.connection.state().label());
        info!("Market view stopped");
        Ok(())
    }

    /// Point every consumer at `key`.
    ///
    /// Re-selecting the current instrument also restarts its subscriptions
    /// and polling.
    fn select_instrument(&mut self, key: InstrumentKey) {
        let now = self.clock.now_ms();
        info!(instrument = %key, "Selecting instrument");

        let commands = self
            .registry
            .switch_instrument(&key, &ChannelType::ALL, now);
        self.send_commands(&commands);

        self.streaming.reset(key.clone());
        let ticket = self.poller.reset(key, now);
        self.spawn_fetch(ticket);
    }

    fn send_commands(&self, commands: &[WsCommand]) {
        for command in commands {
            let outcome = self.write_handle.send(command);
            Metrics::ws_command(command_label(command.command), outcome.is_sent());
        }
    }

    fn handle_stream_event(&mut self, event: StreamEvent) {
        let received_at_ms = event.received_at_ms;
        let parsed = match self.parser.parse(&event) {
            Ok(parsed) => parsed,
            Err(e) => {
                warn!(instrument = %event.key, channel = %event.channel, error = %e, "Rejected stream payload");
                return;
            }
        };

        let is_book = event.channel == ChannelType::OrderBook;
        if let Err(e) = self.streaming.apply(parsed, received_at_ms) {
            debug!(error = %e, "Stream event for another instrument ignored");
            return;
        }

        if is_book {
            if let Some(spread) = self
                .streaming
                .view()
                .order_book
                .as_ready()
                .and_then(|book| book.spread_bps)
            {
                Metrics::spread(spread);
            }
        }
    }

    fn on_tick(&mut self) {
        let now = self.clock.now_ms();
        let report = self.watchdog.tick(now);
        self.apply_watchdog_report(&report);

        for sub in self.registry.all() {
            Metrics::channel_age(sub.channel.label(), sub.age_ms(now) as f64);
        }
        Metrics::ws_state_set(self.connection.state().label());
        self.report_connection_stats();

        if let Some(ticket) = self.poller.poll_due(now) {
            self.spawn_fetch(ticket);
        }
    }

    fn apply_watchdog_report(&mut self, report: &WatchdogReport) {
        if self.watchdog.config().keep_alive {
            Metrics::ws_command("keep_alive", report.keep_alive_sent);
        }
        for (_, channel, _) in &report.resubscribed {
            Metrics::resubscribe(channel.label());
        }
        for (key, channel) in &report.declared_no_data {
            Metrics::no_data(channel.label());
            if self.streaming.instrument() == Some(key) {
                self.streaming.mark_no_data(*channel);
            }
        }
    }

    fn report_connection_stats(&mut self) {
        let stats = self.connection.stats();
        let prev = self.reported_stats;
        Metrics::ws_inbound("routed", stats.routed.saturating_sub(prev.routed));
        Metrics::ws_inbound("unrouted", stats.unrouted.saturating_sub(prev.unrouted));
        Metrics::ws_inbound("malformed", stats.malformed.saturating_sub(prev.malformed));
        Metrics::ws_inbound("control", stats.control.saturating_sub(prev.control));
        Metrics::ws_reconnects(stats.reconnects.saturating_sub(prev.reconnects));
        self.reported_stats = stats;
    }

    fn spawn_fetch(&self, ticket: PollTicket) {
        let source = self.source.clone();
        let tx = self.poll_tx.clone();
        tokio::spawn(async move {
            let started = Instant::now();
            let result = source.fetch(ticket.request.clone()).await;
            if tx
                .send(PollResult {
                    ticket,
                    result,
                    started,
                })
                .await
                .is_err()
            {
                debug!("Market view gone, dropping snapshot result");
            }
        });
    }

    fn handle_poll_result(&mut self, poll: PollResult) {
        let latency_ms = poll.started.elapsed().as_secs_f64() * 1_000.0;
        let outcome = self
            .poller
            .complete(&poll.ticket, poll.result, self.clock.now_ms());
        let label = match &outcome {
            PollOutcome::Applied => "applied",
            PollOutcome::Empty { .. } => "empty",
            PollOutcome::Failed(_) => "failed",
            PollOutcome::Discarded => "discarded",
        };
        debug!(instrument = %poll.ticket.key, outcome = label, latency_ms, "Snapshot poll completed");
        Metrics::poll(label, latency_ms);
    }
}

fn command_label(kind: CommandKind) -> &'static str {
    match kind {
        CommandKind::Subscribe => "subscribe",
        CommandKind::Unsubscribe => "unsubscribe",
        CommandKind::KeepAlive => "keep_alive",
    }
}
