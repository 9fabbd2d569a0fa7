//! Mock WebSocket server for integration tests.
//!
//! Provides a simple WebSocket server that can:
//! - Accept connections and count them
//! - Record every text frame received
//! - Push frames to every connected client
//! - Drop every connection to force a reconnect

use futures_util::{SinkExt, StreamExt};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, mpsc, Mutex};
use tokio::time::timeout;
use tokio_tungstenite::{accept_async, tungstenite::Message};

#[derive(Debug, Clone)]
enum ServerAction {
    Push(String),
    Drop,
}

/// A mock WebSocket server for testing.
pub struct MockWsServer {
    addr: SocketAddr,
    shutdown_tx: mpsc::Sender<()>,
    actions: broadcast::Sender<ServerAction>,
    messages: Arc<Mutex<Vec<String>>>,
    connections: Arc<Mutex<u32>>,
}

impl MockWsServer {
    /// Start a new mock WebSocket server on an available port.
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let messages: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
        let connections: Arc<Mutex<u32>> = Arc::new(Mutex::new(0));
        let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);
        let (actions, _) = broadcast::channel::<ServerAction>(64);

        let messages_clone = messages.clone();
        let connections_clone = connections.clone();
        let actions_clone = actions.clone();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    Ok((stream, _)) = listener.accept() => {
                        tokio::spawn(handle_connection(
                            stream,
                            messages_clone.clone(),
                            connections_clone.clone(),
                            actions_clone.subscribe(),
                        ));
                    }
                    _ = shutdown_rx.recv() => {
                        break;
                    }
                }
            }
        });

        Self {
            addr,
            shutdown_tx,
            actions,
            messages,
            connections,
        }
    }

    /// Get the server's WebSocket URL.
    pub fn url(&self) -> String {
        format!("ws://{}", self.addr)
    }

    /// Get the number of connections received.
    pub async fn connection_count(&self) -> u32 {
        *self.connections.lock().await
    }

    /// Get all received messages.
    pub async fn received_messages(&self) -> Vec<String> {
        self.messages.lock().await.clone()
    }

    /// Received messages parsed as JSON.
    pub async fn received_json(&self) -> Vec<serde_json::Value> {
        self.received_messages()
            .await
            .iter()
            .filter_map(|m| serde_json::from_str(m).ok())
            .collect()
    }

    pub async fn clear_messages(&self) {
        self.messages.lock().await.clear();
    }

    /// Send a text frame to every connected client.
    pub fn push(&self, text: impl Into<String>) {
        let _ = self.actions.send(ServerAction::Push(text.into()));
    }

    /// Close every open connection.
    pub fn drop_connections(&self) {
        let _ = self.actions.send(ServerAction::Drop);
    }

    /// Wait until at least `count` connections were accepted.
    pub async fn wait_for_connections(&self, count: u32) -> bool {
        timeout(Duration::from_secs(5), async {
            while self.connection_count().await < count {
                tokio::time::sleep(Duration::from_millis(20)).await;
            }
        })
        .await
        .is_ok()
    }

    /// Wait until a received message satisfies `pred`.
    pub async fn wait_for_message(&self, pred: impl Fn(&serde_json::Value) -> bool) -> bool {
        timeout(Duration::from_secs(5), async {
            loop {
                if self.received_json().await.iter().any(&pred) {
                    return;
                }
                tokio::time::sleep(Duration::from_millis(20)).await;
            }
        })
        .await
        .is_ok()
    }

    /// Shutdown the server.
    pub async fn shutdown(self) {
        let _ = self.actions.send(ServerAction::Drop);
        let _ = self.shutdown_tx.send(()).await;
    }
}

async fn handle_connection(
    stream: TcpStream,
    messages: Arc<Mutex<Vec<String>>>,
    connections: Arc<Mutex<u32>>,
    mut actions: broadcast::Receiver<ServerAction>,
) {
    let ws_stream = match accept_async(stream).await {
        Ok(ws) => ws,
        Err(e) => {
            eprintln!("WebSocket handshake failed: {}", e);
            return;
        }
    };

    // Counted after the handshake so pushes reach this client.
    {
        let mut count = connections.lock().await;
        *count += 1;
    }

    let (mut write, mut read) = ws_stream.split();

    loop {
        tokio::select! {
            msg = read.next() => match msg {
                Some(Ok(Message::Text(text))) => {
                    messages.lock().await.push(text.to_string());
                }
                Some(Ok(Message::Ping(data))) => {
                    let _ = write.send(Message::Pong(data)).await;
                }
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                Some(Ok(_)) => {}
            },
            action = actions.recv() => match action {
                Ok(ServerAction::Push(text)) => {
                    if write.send(Message::Text(text)).await.is_err() {
                        break;
                    }
                }
                Ok(ServerAction::Drop) | Err(broadcast::error::RecvError::Closed) => {
                    let _ = write.send(Message::Close(None)).await;
                    break;
                }
                Err(broadcast::error::RecvError::Lagged(_)) => {}
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_server_starts() {
        let server = MockWsServer::start().await;
        assert!(server.url().starts_with("ws://127.0.0.1:"));
        server.shutdown().await;
    }
}
