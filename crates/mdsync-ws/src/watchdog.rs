//! Staleness watchdog.
//!
//! Driven by the market view's fixed 1s tick. Every tick it:
//! - sends an application keep-alive so idle links are not reaped
//! - ages every subscription, resubscribing silent ones up to the attempt
//!   budget and declaring `NoData` once the budget is spent
//!
//! Ageing is skipped while the link is down; reconnect handling restores
//! every subscription and restarts its window.

use crate::message::WsCommand;
use crate::subscription::{StalenessPolicy, StalenessVerdict, SubscriptionRegistry};
use crate::ws_write_handle::CommandSink;
use mdsync_core::{ChannelType, InstrumentKey};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Watchdog configuration.
#[derive(Debug, Clone)]
pub struct WatchdogConfig {
    /// Tick period.
    pub tick_interval: Duration,
    /// Staleness policy applied each tick.
    pub policy: StalenessPolicy,
    /// Send a keep-alive each tick.
    pub keep_alive: bool,
}

impl Default for WatchdogConfig {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_secs(1),
            policy: StalenessPolicy::default(),
            keep_alive: true,
        }
    }
}

/// What one tick did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WatchdogReport {
    /// Resubscribes issued, with attempt number.
    pub resubscribed: Vec<(InstrumentKey, ChannelType, u32)>,
    /// Subscriptions that just became `NoData`.
    pub declared_no_data: Vec<(InstrumentKey, ChannelType)>,
    /// Keep-alive reached the outbound queue.
    pub keep_alive_sent: bool,
    /// Ageing ran (link open).
    pub evaluated: bool,
}

impl WatchdogReport {
    /// Any subscription state changed this tick.
    pub fn has_transitions(&self) -> bool {
        !self.resubscribed.is_empty() || !self.declared_no_data.is_empty()
    }
}

/// Fixed-tick staleness watchdog.
pub struct StalenessWatchdog<S: CommandSink> {
    config: WatchdogConfig,
    registry: Arc<SubscriptionRegistry>,
    sink: S,
}

impl<S: CommandSink> StalenessWatchdog<S> {
    pub fn new(config: WatchdogConfig, registry: Arc<SubscriptionRegistry>, sink: S) -> Self {
        Self {
            config,
            registry,
            sink,
        }
    }

    pub fn config(&self) -> &WatchdogConfig {
        &self.config
    }

    /// Run one tick at `now_ms`.
    pub fn tick(&self, now_ms: u64) -> WatchdogReport {
        let mut report = WatchdogReport::default();

        if self.config.keep_alive {
            report.keep_alive_sent = self.sink.send(&WsCommand::keep_alive()).is_sent();
        }

        if !self.sink.is_open() {
            debug!("Link not open, skipping staleness evaluation");
            return report;
        }
        report.evaluated = true;

        for (key, channel, verdict) in self.registry.evaluate_all(now_ms, &self.config.policy) {
            match verdict {
                StalenessVerdict::Resubscribe(attempt) => {
                    let outcome = self.sink.send(&WsCommand::subscribe(&key, channel));
                    debug!(instrument = %key, %channel, attempt, ?outcome, "Resubscribe sent");
                    report.resubscribed.push((key, channel, attempt));
                }
                StalenessVerdict::DeclareNoData => {
                    report.declared_no_data.push((key, channel));
                }
                StalenessVerdict::Fresh => {}
            }
        }

        report
    }
}
