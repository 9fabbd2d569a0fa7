//! Per-channel subscription state and the registry that owns it.
//!
//! A [`ChannelSubscription`] exists for every (instrument, channel) a consumer
//! is interested in. It is created on interest, destroyed on loss of interest
//! or instrument change, and aged by the staleness watchdog.
//!
//! Lifecycle:
//! `Connecting → Live ⇄ Stale → NoData`
//!
//! - any successful update moves to `Live` and resets the attempt counter
//! - age beyond the threshold with attempts left moves to `Stale` and
//!   resubscribes
//! - age beyond the threshold with no attempts left moves to `NoData`, which
//!   only a fresh update or an interest reset leaves

use crate::message::WsCommand;
use mdsync_core::{ChannelType, InstrumentKey};
use parking_lot::RwLock;
use std::collections::HashMap;
use tracing::{debug, info, warn};

/// Default staleness threshold.
pub const DEFAULT_STALENESS_THRESHOLD_MS: u64 = 6_000;

/// Default resubscribe budget per silence period.
pub const DEFAULT_MAX_RESUBSCRIBE_ATTEMPTS: u32 = 3;

/// Subscription lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SubscriptionState {
    /// Subscribe sent, no data yet (or transport reconnecting).
    Connecting,
    /// Data arriving within the staleness window.
    Live,
    /// Silent past the threshold; resubscribing.
    Stale,
    /// Resubscribe budget exhausted. Terminal until interest resets.
    NoData,
}

impl std::fmt::Display for SubscriptionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Connecting => write!(f, "CONNECTING"),
            Self::Live => write!(f, "LIVE"),
            Self::Stale => write!(f, "STALE"),
            Self::NoData => write!(f, "NO_DATA"),
        }
    }
}

/// Staleness thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StalenessPolicy {
    pub threshold_ms: u64,
    pub max_attempts: u32,
}

impl Default for StalenessPolicy {
    fn default() -> Self {
        Self {
            threshold_ms: DEFAULT_STALENESS_THRESHOLD_MS,
            max_attempts: DEFAULT_MAX_RESUBSCRIBE_ATTEMPTS,
        }
    }
}

/// Outcome of ageing one subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StalenessVerdict {
    /// Within the window, or not eligible for ageing.
    Fresh,
    /// Resubscribe now; carries the attempt number (1-based).
    Resubscribe(u32),
    /// Just transitioned to `NoData`.
    DeclareNoData,
}

/// State of one (instrument, channel) stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelSubscription {
    pub key: InstrumentKey,
    pub channel: ChannelType,
    /// Consumer still wants this stream.
    pub desired: bool,
    /// Last time data was applied.
    pub last_update_at_ms: Option<u64>,
    /// Last time a subscribe went out (initial, reconnect or resubscribe).
    pub last_attempt_at_ms: u64,
    /// Resubscribes issued since the last successful update.
    pub resubscribe_attempts: u32,
    pub state: SubscriptionState,
}

impl ChannelSubscription {
    pub fn new(key: InstrumentKey, channel: ChannelType, now_ms: u64) -> Self {
        Self {
            key,
            channel,
            desired: true,
            last_update_at_ms: None,
            last_attempt_at_ms: now_ms,
            resubscribe_attempts: 0,
            state: SubscriptionState::Connecting,
        }
    }

    /// Apply a successful update. Returns the previous state.
    pub fn record_update(&mut self, now_ms: u64) -> SubscriptionState {
        let prev = self.state;
        self.last_update_at_ms = Some(now_ms);
        self.resubscribe_attempts = 0;
        self.state = SubscriptionState::Live;
        prev
    }

    /// Time since the later of the last update and the last subscribe.
    pub fn age_ms(&self, now_ms: u64) -> u64 {
        let reference = self
            .last_update_at_ms
            .map_or(self.last_attempt_at_ms, |t| t.max(self.last_attempt_at_ms));
        now_ms.saturating_sub(reference)
    }

    /// Transport dropped; data will resume after the automatic re-issue.
    ///
    /// `NoData` survives reconnects so the retry budget is not refilled.
    pub fn mark_connecting(&mut self, now_ms: u64) {
        if self.state != SubscriptionState::NoData {
            self.state = SubscriptionState::Connecting;
        }
        self.last_attempt_at_ms = now_ms;
    }

    /// Age this subscription against `policy` and advance its state.
    pub fn evaluate(&mut self, now_ms: u64, policy: &StalenessPolicy) -> StalenessVerdict {
        if !self.desired || self.state == SubscriptionState::NoData {
            return StalenessVerdict::Fresh;
        }

        if self.age_ms(now_ms) <= policy.threshold_ms {
            return StalenessVerdict::Fresh;
        }

        if self.resubscribe_attempts < policy.max_attempts {
            self.resubscribe_attempts += 1;
            self.last_attempt_at_ms = now_ms;
            self.state = SubscriptionState::Stale;
            StalenessVerdict::Resubscribe(self.resubscribe_attempts)
        } else {
            self.state = SubscriptionState::NoData;
            StalenessVerdict::DeclareNoData
        }
    }

    pub fn is_live(&self) -> bool {
        self.state == SubscriptionState::Live
    }
}

type SubscriptionKey = (InstrumentKey, ChannelType);

/// Registry of interested subscriptions, keyed by instrument + channel.
///
/// Owned by the connection side; consumers express interest through it and
/// send the returned commands through the write handle.
#[derive(Debug, Default)]
pub struct SubscriptionRegistry {
    entries: RwLock<HashMap<SubscriptionKey, ChannelSubscription>>,
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register interest. Returns the subscribe command for a new entry.
    pub fn ensure(
        &self,
        key: &InstrumentKey,
        channel: ChannelType,
        now_ms: u64,
    ) -> Option<WsCommand> {
        let mut entries = self.entries.write();
        let slot = (key.clone(), channel);
        if let Some(existing) = entries.get_mut(&slot) {
            existing.desired = true;
            return None;
        }
        entries.insert(slot, ChannelSubscription::new(key.clone(), channel, now_ms));
        debug!(instrument = %key, %channel, "Subscription created");
        Some(WsCommand::subscribe(key, channel))
    }

    /// Drop interest. Returns the unsubscribe command if the entry existed.
    pub fn release(&self, key: &InstrumentKey, channel: ChannelType) -> Option<WsCommand> {
        let removed = self.entries.write().remove(&(key.clone(), channel));
        removed.map(|sub| {
            debug!(instrument = %key, %channel, state = %sub.state, "Subscription released");
            WsCommand::unsubscribe(key, channel)
        })
    }

    /// Replace all interest with `channels` on `key`.
    ///
    /// Entries for other instruments are destroyed (with unsubscribes) and the
    /// target's entries are recreated, which resets staleness counters even
    /// when re-selecting the same instrument.
    pub fn switch_instrument(
        &self,
        key: &InstrumentKey,
        channels: &[ChannelType],
        now_ms: u64,
    ) -> Vec<WsCommand> {
        let mut entries = self.entries.write();
        let mut commands = Vec::new();

        let stale: Vec<SubscriptionKey> = entries
            .keys()
            .filter(|(k, c)| k != key || !channels.contains(c))
            .cloned()
            .collect();
        for slot in stale {
            entries.remove(&slot);
            commands.push(WsCommand::unsubscribe(&slot.0, slot.1));
        }

        for &channel in channels {
            entries.insert(
                (key.clone(), channel),
                ChannelSubscription::new(key.clone(), channel, now_ms),
            );
            commands.push(WsCommand::subscribe(key, channel));
        }

        info!(instrument = %key, commands = commands.len(), "Switched instrument interest");
        commands
    }

    /// Route an inbound update to its subscription.
    ///
    /// Returns the matched key and the previous state, or `None` if nothing
    /// is subscribed for that venue/pair/channel.
    pub fn record_update(
        &self,
        venue: &str,
        pair: Option<&str>,
        channel: ChannelType,
        now_ms: u64,
    ) -> Option<(InstrumentKey, SubscriptionState)> {
        let mut entries = self.entries.write();
        let sub = entries
            .values_mut()
            .find(|s| s.desired && s.channel == channel && s.key.matches(venue, pair))?;
        let prev = sub.record_update(now_ms);
        if prev != SubscriptionState::Live {
            info!(instrument = %sub.key, %channel, from = %prev, "Subscription live");
        }
        Some((sub.key.clone(), prev))
    }

    /// Transport dropped: every subscription waits for the re-issue.
    pub fn mark_all_connecting(&self, now_ms: u64) {
        for sub in self.entries.write().values_mut() {
            sub.mark_connecting(now_ms);
        }
    }

    /// Subscribe commands for every desired subscription, restarting their
    /// staleness window. Used when the transport (re)opens.
    pub fn restore_commands(&self, now_ms: u64) -> Vec<WsCommand> {
        let mut entries = self.entries.write();
        let mut subs: Vec<&mut ChannelSubscription> =
            entries.values_mut().filter(|s| s.desired).collect();
        subs.sort_by(|a, b| (&a.key, a.channel).cmp(&(&b.key, b.channel)));
        subs.into_iter()
            .map(|sub| {
                sub.last_attempt_at_ms = now_ms;
                WsCommand::subscribe(&sub.key, sub.channel)
            })
            .collect()
    }

    /// Age every subscription. Returns non-fresh verdicts.
    pub fn evaluate_all(
        &self,
        now_ms: u64,
        policy: &StalenessPolicy,
    ) -> Vec<(InstrumentKey, ChannelType, StalenessVerdict)> {
        let mut entries = self.entries.write();
        let mut verdicts = Vec::new();
        for sub in entries.values_mut() {
            let verdict = sub.evaluate(now_ms, policy);
            match verdict {
                StalenessVerdict::Fresh => {}
                StalenessVerdict::Resubscribe(attempt) => {
                    warn!(
                        instrument = %sub.key,
                        channel = %sub.channel,
                        attempt,
                        "Channel silent, resubscribing"
                    );
                    verdicts.push((sub.key.clone(), sub.channel, verdict));
                }
                StalenessVerdict::DeclareNoData => {
                    warn!(
                        instrument = %sub.key,
                        channel = %sub.channel,
                        attempts = sub.resubscribe_attempts,
                        "Channel declared NoData"
                    );
                    verdicts.push((sub.key.clone(), sub.channel, verdict));
                }
            }
        }
        verdicts.sort_by(|a, b| (&a.0, a.1).cmp(&(&b.0, b.1)));
        verdicts
    }

    pub fn get(&self, key: &InstrumentKey, channel: ChannelType) -> Option<ChannelSubscription> {
        self.entries.read().get(&(key.clone(), channel)).cloned()
    }

    pub fn state(&self, key: &InstrumentKey, channel: ChannelType) -> Option<SubscriptionState> {
        self.entries
            .read()
            .get(&(key.clone(), channel))
            .map(|s| s.state)
    }

    pub fn all(&self) -> Vec<ChannelSubscription> {
        self.entries.read().values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}
