//! Write handle for sending commands over the shared connection.
//!
//! Commands are fire-and-forget and are never queued across a disconnect:
//! when the link is not open the command is dropped, and the connection
//! manager re-issues every desired subscription when the link comes back.

use crate::connection::ConnectionState;
use crate::message::WsCommand;
use parking_lot::RwLock;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Result of a send attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    /// Queued for the open link.
    Sent,
    /// Link not open or outbound buffer full; command discarded.
    Dropped,
    /// Connection manager is gone.
    ChannelClosed,
}

impl SendOutcome {
    pub fn is_sent(&self) -> bool {
        matches!(self, Self::Sent)
    }
}

/// Anything that can carry commands to the venue.
///
/// Implemented by [`WsWriteHandle`]; tests substitute a recorder.
pub trait CommandSink: Send + Sync {
    /// Send one command without waiting.
    fn send(&self, command: &WsCommand) -> SendOutcome;

    /// Whether the underlying link is open.
    fn is_open(&self) -> bool;
}

/// Cloneable handle onto the connection's outbound queue.
///
/// Consumers never touch the socket directly; this is the only write path.
#[derive(Clone)]
pub struct WsWriteHandle {
    tx: mpsc::Sender<String>,
    state: Arc<RwLock<ConnectionState>>,
}

impl WsWriteHandle {
    pub fn new(tx: mpsc::Sender<String>, state: Arc<RwLock<ConnectionState>>) -> Self {
        Self { tx, state }
    }

    /// Send several commands; returns how many were queued.
    pub fn send_all<'a>(&self, commands: impl IntoIterator<Item = &'a WsCommand>) -> usize {
        commands
            .into_iter()
            .filter(|cmd| self.send(cmd).is_sent())
            .count()
    }
}

impl CommandSink for WsWriteHandle {
    fn send(&self, command: &WsCommand) -> SendOutcome {
        if !self.is_open() {
            debug!(command = ?command.command, "Link not open, dropping command");
            return SendOutcome::Dropped;
        }

        let text = match command.to_json() {
            Ok(text) => text,
            Err(e) => {
                warn!(?e, "Failed to serialize command");
                return SendOutcome::Dropped;
            }
        };

        match self.tx.try_send(text) {
            Ok(()) => SendOutcome::Sent,
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!(command = ?command.command, "Outbound buffer full, dropping command");
                SendOutcome::Dropped
            }
            Err(mpsc::error::TrySendError::Closed(_)) => SendOutcome::ChannelClosed,
        }
    }

    fn is_open(&self) -> bool {
        *self.state.read() == ConnectionState::Connected
    }
}

impl std::fmt::Debug for WsWriteHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WsWriteHandle")
            .field("state", &*self.state.read())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mdsync_core::{ChannelType, InstrumentKey};

    fn handle(state: ConnectionState, capacity: usize) -> (WsWriteHandle, mpsc::Receiver<String>) {
        let (tx, rx) = mpsc::channel(capacity);
        (WsWriteHandle::new(tx, Arc::new(RwLock::new(state))), rx)
    }

    #[test]
    fn test_send_dropped_when_not_connected() {
        let (handle, mut rx) = handle(ConnectionState::Reconnecting, 4);
        assert!(!handle.is_open());
        assert_eq!(handle.send(&WsCommand::keep_alive()), SendOutcome::Dropped);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_send_when_connected() {
        let (handle, mut rx) = handle(ConnectionState::Connected, 4);
        let key = InstrumentKey::new("okx", "ETH-USDT");
        let cmd = WsCommand::subscribe(&key, ChannelType::OrderBook);
        assert_eq!(handle.send(&cmd), SendOutcome::Sent);
        let text = rx.try_recv().unwrap();
        assert!(text.contains("\"subscribe\""));
        assert!(text.contains("ETH-USDT"));
    }

    #[test]
    fn test_send_all_counts_and_full_buffer_drops() {
        let (handle, _rx) = handle(ConnectionState::Connected, 1);
        let cmds = [WsCommand::keep_alive(), WsCommand::keep_alive()];
        assert_eq!(handle.send_all(&cmds), 1);
    }

    #[test]
    fn test_send_closed_channel() {
        let (handle, rx) = handle(ConnectionState::Connected, 1);
        drop(rx);
        assert_eq!(
            handle.send(&WsCommand::keep_alive()),
            SendOutcome::ChannelClosed
        );
    }
}
