//! Fixed-cadence analytics snapshot poller.
//!
//! State machine: `Idle → Loading → {Ready | NoData}`.
//!
//! The poller never performs I/O itself. It hands out [`PollTicket`]s; the
//! owner runs the fetch off-loop and feeds the result back through
//! [`SnapshotPoller::complete`]. Every ticket carries the generation and
//! instrument it was issued for, so a response that arrives after an
//! instrument switch is discarded instead of overwriting fresher state.
//!
//! An empty answer (zero interval bars) is terminal for the instrument: the
//! cadence stops and only [`SnapshotPoller::reset`] restarts it. Transport and
//! decode failures are surfaced through `last_error` and the cadence goes on.

use crate::aligner::{align, AlignedTimeline};
use crate::client::SnapshotRequest;
use crate::error::AnalyticsError;
use crate::summary::{summarize, SummaryMetrics};
use mdsync_core::{InstrumentKey, IntervalBar, MarketSnapshot, SeriesPoint};
use serde::Serialize;
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// Default poll cadence.
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 15_000;

/// Poller configuration.
#[derive(Debug, Clone)]
pub struct PollerConfig {
    /// Delay between a completed poll and the next one.
    pub interval_ms: u64,
    /// History requested per poll.
    pub window_ms: u64,
    /// Forecast horizon requested per poll.
    pub horizon_ms: u64,
    /// Consecutive empty answers before the instrument is declared NoData.
    pub empty_polls_before_no_data: u32,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            interval_ms: DEFAULT_POLL_INTERVAL_MS,
            window_ms: 6 * 3_600_000,
            horizon_ms: 3_600_000,
            empty_polls_before_no_data: 1,
        }
    }
}

/// Poller lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PollerState {
    /// No instrument selected.
    #[default]
    Idle,
    /// First poll for the instrument outstanding (or failed so far).
    Loading,
    /// Holding a snapshot.
    Ready,
    /// Endpoint has nothing for this instrument. Terminal until reset.
    NoData,
}

/// Handle for one outstanding fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollTicket {
    pub generation: u64,
    pub key: InstrumentKey,
    pub request: SnapshotRequest,
}

/// What `complete` did with a result.
#[derive(Debug, Clone, PartialEq)]
pub enum PollOutcome {
    /// Snapshot replaced.
    Applied,
    /// Empty answer; `true` when it made the instrument NoData.
    Empty { terminal: bool },
    /// Fetch failed; prior data retained.
    Failed(String),
    /// Stale ticket; ignored.
    Discarded,
}

/// Volume chart: actual bars and forecast, rendered distinctly.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct VolumeChartData {
    pub actual: Vec<SeriesPoint>,
    pub forecast: Vec<SeriesPoint>,
}

/// Snapshot-side outputs.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct SnapshotView {
    pub instrument: Option<InstrumentKey>,
    pub state: PollerState,
    pub price_chart_data: Vec<IntervalBar>,
    pub volume_chart_data: VolumeChartData,
    pub future_price_volatility: Vec<SeriesPoint>,
    pub market_summary_metrics: Option<SummaryMetrics>,
    /// Opaque overlay payload from the last snapshot.
    pub order_overlay_data: serde_json::Value,
    pub no_data: bool,
    /// A poll is in flight while older data is shown.
    pub reloading: bool,
    /// Last fetch failure, cleared by the next success.
    pub last_error: Option<String>,
    pub updated_at_ms: Option<u64>,
}

/// Snapshot poller.
pub struct SnapshotPoller {
    config: PollerConfig,
    key: Option<InstrumentKey>,
    generation: u64,
    state: PollerState,
    in_flight: bool,
    next_poll_at_ms: Option<u64>,
    consecutive_empty: u32,
    snapshot: Option<MarketSnapshot>,
    timeline: Option<AlignedTimeline>,
    view: SnapshotView,
    tx: watch::Sender<SnapshotView>,
}

impl SnapshotPoller {
    pub fn new(config: PollerConfig) -> Self {
        let (tx, _rx) = watch::channel(SnapshotView::default());
        Self {
            config,
            key: None,
            generation: 0,
            state: PollerState::Idle,
            in_flight: false,
            next_poll_at_ms: None,
            consecutive_empty: 0,
            snapshot: None,
            timeline: None,
            view: SnapshotView::default(),
            tx,
        }
    }

    pub fn config(&self) -> &PollerConfig {
        &self.config
    }

    /// New listener; sees the current view immediately.
    pub fn subscribe(&self) -> watch::Receiver<SnapshotView> {
        self.tx.subscribe()
    }

    pub fn view(&self) -> &SnapshotView {
        &self.view
    }

    pub fn state(&self) -> PollerState {
        self.state
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn snapshot(&self) -> Option<&MarketSnapshot> {
        self.snapshot.as_ref()
    }

    pub fn timeline(&self) -> Option<&AlignedTimeline> {
        self.timeline.as_ref()
    }

    pub fn next_poll_at_ms(&self) -> Option<u64> {
        self.next_poll_at_ms
    }

    pub fn is_in_flight(&self) -> bool {
        self.in_flight
    }

    /// Switch to `key` and issue the immediate first poll.
    ///
    /// Bumps the generation so any outstanding ticket is discarded on return.
    pub fn reset(&mut self, key: InstrumentKey, now_ms: u64) -> PollTicket {
        self.generation += 1;
        info!(instrument = %key, generation = self.generation, "Snapshot poller reset");

        self.key = Some(key.clone());
        self.snapshot = None;
        self.timeline = None;
        self.consecutive_empty = 0;
        self.next_poll_at_ms = None;
        self.state = PollerState::Loading;
        self.view = SnapshotView {
            instrument: Some(key.clone()),
            state: PollerState::Loading,
            ..Default::default()
        };

        let ticket = self.issue(key, now_ms);
        self.publish();
        ticket
    }

    /// Next ticket if a poll is due at `now_ms`.
    pub fn poll_due(&mut self, now_ms: u64) -> Option<PollTicket> {
        if self.in_flight {
            return None;
        }
        let key = self.key.clone()?;
        if matches!(self.state, PollerState::Idle | PollerState::NoData) {
            return None;
        }
        match self.next_poll_at_ms {
            Some(due) if now_ms >= due => {}
            _ => return None,
        }

        let ticket = self.issue(key, now_ms);
        if self.snapshot.is_some() {
            self.view.reloading = true;
            self.publish();
        }
        Some(ticket)
    }

    fn issue(&mut self, key: InstrumentKey, now_ms: u64) -> PollTicket {
        self.in_flight = true;
        self.next_poll_at_ms = None;
        debug!(instrument = %key, generation = self.generation, "Snapshot poll issued");
        PollTicket {
            generation: self.generation,
            request: SnapshotRequest::for_window(
                &key,
                now_ms,
                self.config.window_ms,
                self.config.horizon_ms,
            ),
            key,
        }
    }

    /// Feed back the result for `ticket`.
    pub fn complete(
        &mut self,
        ticket: &PollTicket,
        result: Result<MarketSnapshot, AnalyticsError>,
        now_ms: u64,
    ) -> PollOutcome {
        if ticket.generation != self.generation || self.key.as_ref() != Some(&ticket.key) {
            debug!(
                ticket_generation = ticket.generation,
                current_generation = self.generation,
                instrument = %ticket.key,
                "Discarding stale snapshot result"
            );
            return PollOutcome::Discarded;
        }

        self.in_flight = false;
        self.view.reloading = false;

        let outcome = match result {
            Ok(snapshot) if snapshot.is_structurally_empty() => self.apply_empty(now_ms),
            Ok(snapshot) => {
                self.apply_snapshot(snapshot, ticket, now_ms);
                PollOutcome::Applied
            }
            Err(e) => {
                let message = e.to_string();
                warn!(instrument = %ticket.key, error = %message, "Snapshot poll failed");
                self.view.last_error = Some(message.clone());
                self.next_poll_at_ms = Some(now_ms + self.config.interval_ms);
                PollOutcome::Failed(message)
            }
        };

        self.view.state = self.state;
        self.publish();
        outcome
    }

    fn apply_empty(&mut self, now_ms: u64) -> PollOutcome {
        self.consecutive_empty += 1;
        if self.consecutive_empty < self.config.empty_polls_before_no_data.max(1) {
            debug!(count = self.consecutive_empty, "Empty snapshot, polling again");
            self.next_poll_at_ms = Some(now_ms + self.config.interval_ms);
            return PollOutcome::Empty { terminal: false };
        }

        info!(instrument = ?self.key, "Analytics returned no data, polling stopped");
        self.state = PollerState::NoData;
        self.next_poll_at_ms = None;
        self.snapshot = None;
        self.timeline = None;
        self.view = SnapshotView {
            instrument: self.key.clone(),
            state: PollerState::NoData,
            no_data: true,
            last_error: self.view.last_error.take(),
            updated_at_ms: Some(now_ms),
            ..Default::default()
        };
        PollOutcome::Empty { terminal: true }
    }

    fn apply_snapshot(&mut self, snapshot: MarketSnapshot, ticket: &PollTicket, now_ms: u64) {
        self.consecutive_empty = 0;
        let timeline = align(&snapshot, ticket.request.start_time);
        if timeline.is_none() {
            debug!(instrument = %ticket.key, "No forecast series, timeline not aligned");
        }
        let metrics = summarize(&snapshot, timeline.as_ref(), now_ms);

        // Replace everything the consumer sees in one step.
        self.view = SnapshotView {
            instrument: Some(ticket.key.clone()),
            state: PollerState::Ready,
            price_chart_data: timeline
                .as_ref()
                .map_or_else(|| snapshot.interval_stats.clone(), |t| t.actual.clone()),
            volume_chart_data: timeline
                .as_ref()
                .map(|t| VolumeChartData {
                    actual: t.actual_volume(),
                    forecast: t.forecast_volume.clone(),
                })
                .unwrap_or_default(),
            future_price_volatility: timeline
                .as_ref()
                .map(|t| t.forecast_volatility.clone())
                .unwrap_or_default(),
            market_summary_metrics: Some(metrics),
            order_overlay_data: snapshot.order_overlay_data.clone(),
            no_data: false,
            reloading: false,
            last_error: None,
            updated_at_ms: Some(now_ms),
        };

        self.state = PollerState::Ready;
        self.snapshot = Some(snapshot);
        self.timeline = timeline;
        self.next_poll_at_ms = Some(now_ms + self.config.interval_ms);
    }

    fn publish(&self) {
        self.tx.send_replace(self.view.clone());
    }
}

impl Default for SnapshotPoller {
    fn default() -> Self {
        Self::new(PollerConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key() -> InstrumentKey {
        InstrumentKey::new("binance", "BTC-USDT")
    }

    fn snapshot_with_bars() -> MarketSnapshot {
        MarketSnapshot {
            interval_stats: vec![IntervalBar {
                timestamp: 1_000,
                open: 1.0,
                high: 2.0,
                low: 0.5,
                close: 1.5,
                volume: 10.0,
            }],
            esv: vec![SeriesPoint::new(5_000, 3.0)],
            price_volatility: Some(2.0),
            ..Default::default()
        }
    }

    fn err() -> AnalyticsError {
        AnalyticsError::HttpClient("connection reset".to_string())
    }

    #[test]
    fn test_reset_issues_immediate_poll() {
        let mut poller = SnapshotPoller::default();
        let ticket = poller.reset(key(), 0);
        assert_eq!(poller.state(), PollerState::Loading);
        assert_eq!(ticket.generation, 1);
        assert_eq!(ticket.request.pair, "BTC-USDT");
        assert!(poller.poll_due(0).is_none(), "already in flight");
    }

    #[test]
    fn test_success_schedules_next_poll() {
        let mut poller = SnapshotPoller::default();
        let rx = poller.subscribe();
        let ticket = poller.reset(key(), 0);
        assert_eq!(poller.complete(&ticket, Ok(snapshot_with_bars()), 100), PollOutcome::Applied);
        assert_eq!(poller.state(), PollerState::Ready);
        assert_eq!(poller.next_poll_at_ms(), Some(15_100));

        let view = rx.borrow().clone();
        assert_eq!(view.state, PollerState::Ready);
        assert_eq!(view.price_chart_data.len(), 1);
        assert!(view.market_summary_metrics.is_some());

        assert!(poller.poll_due(15_099).is_none());
        let next = poller.poll_due(15_100).unwrap();
        assert!(poller.view().reloading);
        assert_eq!(next.generation, ticket.generation);
    }

    #[test]
    fn test_empty_result_stops_polling() {
        let mut poller = SnapshotPoller::default();
        let ticket = poller.reset(key(), 0);
        assert_eq!(
            poller.complete(&ticket, Ok(MarketSnapshot::default()), 100),
            PollOutcome::Empty { terminal: true }
        );
        assert_eq!(poller.state(), PollerState::NoData);
        assert!(poller.view().no_data);

        for now in (0..600_000).step_by(1_000) {
            assert!(poller.poll_due(now).is_none());
        }

        // Only an instrument reset restarts the cycle.
        let ticket = poller.reset(InstrumentKey::new("okx", "BTC-USDT"), 700_000);
        assert_eq!(poller.state(), PollerState::Loading);
        assert_eq!(ticket.generation, 2);
        assert!(!poller.view().no_data);
    }

    #[test]
    fn test_empty_after_data_is_terminal() {
        let mut poller = SnapshotPoller::default();
        let ticket = poller.reset(key(), 0);
        poller.complete(&ticket, Ok(snapshot_with_bars()), 0);
        let ticket = poller.poll_due(15_000).unwrap();
        poller.complete(&ticket, Ok(MarketSnapshot::default()), 15_100);
        assert_eq!(poller.state(), PollerState::NoData);
        assert!(poller.snapshot().is_none());
        assert!(poller.view().price_chart_data.is_empty());
    }

    #[test]
    fn test_failure_keeps_prior_snapshot_and_cadence() {
        let mut poller = SnapshotPoller::default();
        let ticket = poller.reset(key(), 0);
        poller.complete(&ticket, Ok(snapshot_with_bars()), 0);

        let ticket = poller.poll_due(15_000).unwrap();
        let outcome = poller.complete(&ticket, Err(err()), 15_200);
        assert!(matches!(outcome, PollOutcome::Failed(_)));
        assert_eq!(poller.state(), PollerState::Ready);
        assert!(poller.snapshot().is_some());
        assert_eq!(poller.view().price_chart_data.len(), 1);
        assert!(poller.view().last_error.is_some());
        assert!(!poller.view().reloading);

        let ticket = poller.poll_due(30_200).unwrap();
        poller.complete(&ticket, Ok(snapshot_with_bars()), 30_300);
        assert!(poller.view().last_error.is_none());
    }

    #[test]
    fn test_failure_before_first_data_stays_loading() {
        let mut poller = SnapshotPoller::default();
        let ticket = poller.reset(key(), 0);
        poller.complete(&ticket, Err(err()), 50);
        assert_eq!(poller.state(), PollerState::Loading);
        assert!(poller.poll_due(15_050).is_some());
    }

    #[test]
    fn test_late_result_after_switch_discarded() {
        let mut poller = SnapshotPoller::default();
        let old = poller.reset(key(), 0);
        let new = poller.reset(InstrumentKey::new("binance", "ETH-USDT"), 10);

        assert_eq!(
            poller.complete(&old, Ok(snapshot_with_bars()), 20),
            PollOutcome::Discarded
        );
        assert_eq!(poller.state(), PollerState::Loading);
        assert!(poller.is_in_flight());
        assert_eq!(poller.complete(&new, Ok(snapshot_with_bars()), 30), PollOutcome::Applied);
        assert_eq!(
            poller.view().instrument,
            Some(InstrumentKey::new("binance", "ETH-USDT"))
        );
    }

    #[test]
    fn test_two_empty_polls_when_configured() {
        let mut poller = SnapshotPoller::new(PollerConfig {
            empty_polls_before_no_data: 2,
            ..Default::default()
        });
        let ticket = poller.reset(key(), 0);
        assert_eq!(
            poller.complete(&ticket, Ok(MarketSnapshot::default()), 0),
            PollOutcome::Empty { terminal: false }
        );
        let ticket = poller.poll_due(15_000).unwrap();
        assert_eq!(
            poller.complete(&ticket, Ok(MarketSnapshot::default()), 15_000),
            PollOutcome::Empty { terminal: true }
        );
        assert_eq!(poller.state(), PollerState::NoData);
    }
}
