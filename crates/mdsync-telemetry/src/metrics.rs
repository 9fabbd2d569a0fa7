//! Prometheus metrics for the mdsync engine.
//!
//! Covers:
//! - Connection state and reconnects
//! - Inbound traffic by outcome and malformed drops
//! - Subscription resubscribes and NoData declarations
//! - Snapshot poll outcomes and latency
//!
//! # Panics
//!
//! Metric registration uses `unwrap()` intentionally. If registration fails,
//! it indicates a fatal configuration error (e.g., duplicate metric names)
//! that should cause an immediate crash at startup rather than silent failure.
//! These panics only occur during static initialization, never at runtime.

use crate::error::{TelemetryError, TelemetryResult};
use once_cell::sync::Lazy;
use prometheus::{
    register_counter_vec, register_gauge, register_gauge_vec, register_histogram_vec,
    register_int_counter, CounterVec, Encoder, Gauge, GaugeVec, HistogramVec, IntCounter,
    TextEncoder,
};

/// WebSocket connection state (1 = connected, 0 = not connected).
pub static WS_CONNECTED: Lazy<Gauge> = Lazy::new(|| {
    register_gauge!(
        "mdsync_ws_connected",
        "WebSocket connection state (1=connected)"
    )
    .unwrap()
});

/// WebSocket state machine current state.
/// Labels: state (disconnected/connecting/connected/reconnecting)
pub static WS_STATE: Lazy<GaugeVec> = Lazy::new(|| {
    register_gauge_vec!(
        "mdsync_ws_state",
        "WebSocket state machine current state (1=active, 0=inactive)",
        &["state"]
    )
    .unwrap()
});

/// Total WebSocket reconnection attempts.
pub static WS_RECONNECT_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "mdsync_ws_reconnect_total",
        "Total WebSocket reconnection attempts"
    )
    .unwrap()
});

/// Inbound frames by outcome.
/// Labels: kind (order_book/last_price/control/unrouted/malformed)
pub static WS_INBOUND_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "mdsync_ws_inbound_total",
        "Inbound WebSocket frames by outcome",
        &["kind"]
    )
    .unwrap()
});

/// Commands queued for the link.
/// Labels: command (subscribe/unsubscribe/keep_alive), outcome (sent/dropped)
pub static WS_COMMANDS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "mdsync_ws_commands_total",
        "Outbound commands by verb and outcome",
        &["command", "outcome"]
    )
    .unwrap()
});

/// Resubscribes issued by the staleness watchdog.
pub static RESUBSCRIBE_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "mdsync_resubscribe_total",
        "Resubscribes issued for silent channels",
        &["channel"]
    )
    .unwrap()
});

/// Channels declared NoData after exhausting resubscribes.
pub static NO_DATA_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "mdsync_no_data_total",
        "Channels declared NoData",
        &["channel"]
    )
    .unwrap()
});

/// Age of the newest update per channel, in milliseconds.
pub static CHANNEL_AGE_MS: Lazy<GaugeVec> = Lazy::new(|| {
    register_gauge_vec!(
        "mdsync_channel_age_ms",
        "Milliseconds since the last update on a channel",
        &["channel"]
    )
    .unwrap()
});

/// Current spread in basis points.
pub static SPREAD_BPS: Lazy<Gauge> = Lazy::new(|| {
    register_gauge!("mdsync_spread_bps", "Current spread in basis points").unwrap()
});

/// Snapshot poll outcomes.
/// Labels: outcome (applied/empty/failed/discarded)
pub static POLL_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "mdsync_poll_total",
        "Analytics snapshot polls by outcome",
        &["outcome"]
    )
    .unwrap()
});

/// Snapshot round-trip latency in milliseconds.
pub static POLL_LATENCY_MS: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "mdsync_poll_latency_ms",
        "Analytics snapshot round-trip latency in milliseconds",
        &["outcome"],
        vec![10.0, 25.0, 50.0, 100.0, 250.0, 500.0, 1000.0, 2500.0, 5000.0, 10000.0]
    )
    .unwrap()
});

const WS_STATES: [&str; 4] = ["disconnected", "connecting", "connected", "reconnecting"];

/// Metrics facade for easy access.
pub struct Metrics;

impl Metrics {
    /// Set WebSocket state machine state.
    /// Only the active state is set to 1, all others to 0.
    pub fn ws_state_set(state: &str) {
        for s in WS_STATES {
            WS_STATE.with_label_values(&[s]).set(0.0);
        }
        WS_STATE.with_label_values(&[state]).set(1.0);
        WS_CONNECTED.set(if state == "connected" { 1.0 } else { 0.0 });
    }

    /// Record reconnects since the last observation.
    pub fn ws_reconnects(count: u64) {
        WS_RECONNECT_TOTAL.inc_by(count);
    }

    /// Record inbound frames of one kind.
    pub fn ws_inbound(kind: &str, count: u64) {
        WS_INBOUND_TOTAL
            .with_label_values(&[kind])
            .inc_by(count as f64);
    }

    /// Record an outbound command.
    pub fn ws_command(command: &str, sent: bool) {
        let outcome = if sent { "sent" } else { "dropped" };
        WS_COMMANDS_TOTAL
            .with_label_values(&[command, outcome])
            .inc();
    }

    /// Record a resubscribe.
    pub fn resubscribe(channel: &str) {
        RESUBSCRIBE_TOTAL.with_label_values(&[channel]).inc();
    }

    /// Record a NoData declaration.
    pub fn no_data(channel: &str) {
        NO_DATA_TOTAL.with_label_values(&[channel]).inc();
    }

    /// Update channel age.
    pub fn channel_age(channel: &str, age_ms: f64) {
        CHANNEL_AGE_MS.with_label_values(&[channel]).set(age_ms);
    }

    /// Update spread.
    pub fn spread(spread_bps: f64) {
        SPREAD_BPS.set(spread_bps);
    }

    /// Record a completed poll.
    pub fn poll(outcome: &str, latency_ms: f64) {
        POLL_TOTAL.with_label_values(&[outcome]).inc();
        POLL_LATENCY_MS
            .with_label_values(&[outcome])
            .observe(latency_ms);
    }

    /// Render every registered metric in the Prometheus text format.
    pub fn gather_text() -> TelemetryResult<String> {
        let mut buffer = Vec::new();
        TextEncoder::new()
            .encode(&prometheus::gather(), &mut buffer)
            .map_err(|e| TelemetryError::Metrics(e.to_string()))?;
        String::from_utf8(buffer).map_err(|e| TelemetryError::Metrics(e.to_string()))
    }
}
