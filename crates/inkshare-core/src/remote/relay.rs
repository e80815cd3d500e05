//! WebSocket client for the relay server.
//!
//! The socket lives on a background thread. Requests are queued through a
//! channel and snapshots are routed to the matching [`Subscription`].

use super::{Entries, RemoteStore, StoreError, StoreResult, Subscription};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::mpsc::{Receiver, Sender, TryRecvError, channel};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tungstenite::{Message, connect};
use url::Url;

/// Messages sent to the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    Subscribe { namespace: String },
    Unsubscribe { namespace: String },
    Write { namespace: String, key: String, value: serde_json::Value },
    Delete { namespace: String, key: String },
    DeleteAll { namespace: String },
    OnDisconnectDelete { namespace: String, key: String },
}

/// Messages received from the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Full content of a namespace.
    Snapshot { namespace: String, entries: Entries },
    /// Error message
    Error { message: String },
}

/// Connection state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Connected,
    Disconnected,
    Error,
}

/// Commands sent to the WebSocket thread.
enum WsCommand {
    Send(String),
    Close,
}

type Routes = Arc<Mutex<HashMap<String, Vec<(u64, Sender<Entries>)>>>>;

/// Latest known snapshot per namespace.
type Cache = Arc<Mutex<HashMap<String, Entries>>>;

/// Remote store backed by an `inkshare-server` relay.
pub struct RelayStore {
    cmd_tx: Sender<WsCommand>,
    state: Arc<Mutex<ConnectionState>>,
    routes: Routes,
    cache: Cache,
    next_sub: Mutex<u64>,
    _thread: Option<JoinHandle<()>>,
}

impl RelayStore {
    /// Connect to a relay at a `ws://` or `wss://` URL.
    pub fn connect(url: &str) -> StoreResult<Self> {
        let parsed = Url::parse(url).map_err(|e| StoreError::Other(format!("Invalid URL: {}", e)))?;
        if parsed.scheme() != "ws" && parsed.scheme() != "wss" {
            return Err(StoreError::Other(format!(
                "Invalid WebSocket URL scheme: {}",
                parsed.scheme()
            )));
        }

        let (cmd_tx, cmd_rx) = channel::<WsCommand>();
        let state = Arc::new(Mutex::new(ConnectionState::Connecting));
        let routes: Routes = Arc::default();
        let cache: Cache = Arc::default();

        let handle = {
            let url = url.to_string();
            let state = Arc::clone(&state);
            let routes = Arc::clone(&routes);
            let cache = Arc::clone(&cache);
            thread::spawn(move || run_socket(&url, cmd_rx, &state, &routes, &cache))
        };

        Ok(Self {
            cmd_tx,
            state,
            routes,
            cache,
            next_sub: Mutex::new(0),
            _thread: Some(handle),
        })
    }

    pub fn state(&self) -> ConnectionState {
        self.state
            .lock()
            .map(|s| *s)
            .unwrap_or(ConnectionState::Error)
    }

    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    /// Close the connection. The server applies disconnect hooks.
    pub fn disconnect(&self) {
        let _ = self.cmd_tx.send(WsCommand::Close);
    }

    fn send(&self, msg: &ClientMessage) -> StoreResult<()> {
        match self.state() {
            ConnectionState::Disconnected | ConnectionState::Error => {
                return Err(StoreError::NotConnected);
            }
            ConnectionState::Connecting | ConnectionState::Connected => {}
        }
        let text = serde_json::to_string(msg)?;
        self.cmd_tx
            .send(WsCommand::Send(text))
            .map_err(|_| StoreError::Closed)
    }
}

impl Drop for RelayStore {
    fn drop(&mut self) {
        self.disconnect();
    }
}

impl RemoteStore for RelayStore {
    fn write(&self, namespace: &str, key: &str, value: serde_json::Value) -> StoreResult<()> {
        self.send(&ClientMessage::Write {
            namespace: namespace.to_string(),
            key: key.to_string(),
            value,
        })
    }

    fn delete(&self, namespace: &str, key: &str) -> StoreResult<()> {
        self.send(&ClientMessage::Delete {
            namespace: namespace.to_string(),
            key: key.to_string(),
        })
    }

    fn delete_all(&self, namespace: &str) -> StoreResult<()> {
        self.send(&ClientMessage::DeleteAll {
            namespace: namespace.to_string(),
        })
    }

    /// Last snapshot received for a subscribed namespace.
    fn read(&self, namespace: &str) -> StoreResult<Entries> {
        let cache = self
            .cache
            .lock()
            .map_err(|e| StoreError::Other(format!("Lock error: {}", e)))?;
        cache
            .get(namespace)
            .cloned()
            .ok_or_else(|| StoreError::Other(format!("Not subscribed to {}", namespace)))
    }

    fn subscribe(&self, namespace: &str) -> StoreResult<Subscription> {
        let id = {
            let mut next = self
                .next_sub
                .lock()
                .map_err(|e| StoreError::Other(format!("Lock error: {}", e)))?;
            *next += 1;
            *next
        };
        let (tx, rx) = channel();
        let first = {
            let mut routes = self
                .routes
                .lock()
                .map_err(|e| StoreError::Other(format!("Lock error: {}", e)))?;
            let subs = routes.entry(namespace.to_string()).or_default();
            let first = subs.is_empty();
            subs.push((id, tx.clone()));
            first
        };
        if first {
            self.send(&ClientMessage::Subscribe {
                namespace: namespace.to_string(),
            })?;
        } else if let Some(entries) = self.cache.lock().ok().and_then(|c| c.get(namespace).cloned()) {
            // The server only snapshots on the first subscribe
            let _ = tx.send(entries);
        }

        let routes = Arc::clone(&self.routes);
        let cmd_tx = self.cmd_tx.clone();
        let ns = namespace.to_string();
        Ok(Subscription::new(namespace, rx, move || {
            let Ok(mut routes) = routes.lock() else {
                return;
            };
            let now_empty = routes.get_mut(&ns).is_some_and(|subs| {
                subs.retain(|(sub, _)| *sub != id);
                subs.is_empty()
            });
            if now_empty {
                routes.remove(&ns);
                let msg = ClientMessage::Unsubscribe { namespace: ns };
                if let Ok(text) = serde_json::to_string(&msg) {
                    let _ = cmd_tx.send(WsCommand::Send(text));
                }
            }
        }))
    }

    fn on_disconnect_delete(&self, namespace: &str, key: &str) -> StoreResult<()> {
        self.send(&ClientMessage::OnDisconnectDelete {
            namespace: namespace.to_string(),
            key: key.to_string(),
        })
    }
}

fn set_state(state: &Mutex<ConnectionState>, value: ConnectionState) {
    if let Ok(mut s) = state.lock() {
        *s = value;
    }
}

/// Cache first, so a read after a delivered snapshot never sees older data.
fn route(routes: &Routes, cache: &Cache, namespace: String, entries: Entries) {
    if let Ok(mut cache) = cache.lock() {
        cache.insert(namespace.clone(), entries.clone());
    }
    if let Ok(mut routes) = routes.lock() {
        if let Some(subs) = routes.get_mut(&namespace) {
            subs.retain(|(_, tx)| tx.send(entries.clone()).is_ok());
        }
    }
}

fn run_socket(
    url: &str,
    cmd_rx: Receiver<WsCommand>,
    state: &Mutex<ConnectionState>,
    routes: &Routes,
    cache: &Cache,
) {
    log::info!("Relay thread: connecting to {}", url);
    let (mut socket, response) = match connect(url) {
        Ok(ok) => ok,
        Err(e) => {
            log::error!("Relay connection failed: {}", e);
            set_state(state, ConnectionState::Error);
            return;
        }
    };
    log::info!("Relay connected, status: {}", response.status());
    set_state(state, ConnectionState::Connected);

    // Short read timeout so queued commands are not starved by a quiet socket
    if let tungstenite::stream::MaybeTlsStream::Plain(tcp) = socket.get_mut() {
        let _ = tcp.set_read_timeout(Some(Duration::from_millis(50)));
        let _ = tcp.set_write_timeout(Some(Duration::from_secs(5)));
    }

    loop {
        match cmd_rx.try_recv() {
            Ok(WsCommand::Send(msg)) => {
                log::debug!("Relay sending: {}", msg.chars().take(100).collect::<String>());
                if let Err(e) = socket.send(Message::Text(msg)) {
                    log::error!("Relay send error: {}", e);
                    break;
                }
            }
            Ok(WsCommand::Close) => {
                log::info!("Relay close requested");
                let _ = socket.close(None);
                break;
            }
            Err(TryRecvError::Disconnected) => break,
            Err(TryRecvError::Empty) => {}
        }

        match socket.read() {
            Ok(Message::Text(txt)) => match serde_json::from_str::<ServerMessage>(&txt) {
                Ok(ServerMessage::Snapshot { namespace, entries }) => {
                    route(routes, cache, namespace, entries);
                }
                Ok(ServerMessage::Error { message }) => {
                    log::warn!("Relay error: {}", message);
                }
                Err(e) => log::warn!("Failed to parse relay message: {}", e),
            },
            Ok(Message::Ping(data)) => {
                let _ = socket.send(Message::Pong(data));
            }
            Ok(Message::Close(_)) => {
                log::info!("Relay sent close frame");
                break;
            }
            Ok(_) => {}
            Err(tungstenite::Error::Io(ref e))
                if e.kind() == std::io::ErrorKind::WouldBlock
                    || e.kind() == std::io::ErrorKind::TimedOut => {}
            Err(e) => {
                log::error!("Relay read error: {}", e);
                break;
            }
        }
    }

    log::info!("Relay thread exiting");
    set_state(state, ConnectionState::Disconnected);
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_client_message_wire_format() {
        let msg = ClientMessage::Write {
            namespace: "drawings/s/paths".to_string(),
            key: "u_1_a".to_string(),
            value: json!({ "type": "line" }),
        };
        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(value["type"], "write");
        assert_eq!(value["key"], "u_1_a");

        let msg = ClientMessage::OnDisconnectDelete {
            namespace: "participants/s".to_string(),
            key: "u".to_string(),
        };
        assert_eq!(serde_json::to_value(&msg).unwrap()["type"], "on_disconnect_delete");
    }

    #[test]
    fn test_server_snapshot_deserialize() {
        let json = r#"{"type":"snapshot","namespace":"ns","entries":{"a":1}}"#;
        match serde_json::from_str::<ServerMessage>(json).unwrap() {
            ServerMessage::Snapshot { namespace, entries } => {
                assert_eq!(namespace, "ns");
                assert_eq!(entries.get("a"), Some(&json!(1)));
            }
            other => panic!("unexpected message {other:?}"),
        }
    }

    #[test]
    fn test_rejects_non_websocket_url() {
        assert!(RelayStore::connect("http://localhost:3030").is_err());
        assert!(RelayStore::connect("not a url").is_err());
    }
}
