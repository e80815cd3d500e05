//! InkShare WebSocket Relay Server
//!
//! Hosts the shared key-value store that whiteboard clients synchronize
//! through. The store is a set of namespaces, each a map of `key -> JSON`.
//! Subscribers receive the full content of a namespace whenever it changes.
//!
//! ## Protocol
//!
//! Messages are JSON with the following format:
//! ```json
//! { "type": "subscribe", "namespace": "drawings/abc/paths" }
//! { "type": "write", "namespace": "drawings/abc/paths", "key": "u_1_x", "value": { ... } }
//! { "type": "delete", "namespace": "drawings/abc/paths", "key": "u_1_x" }
//! { "type": "delete_all", "namespace": "drawings/abc/paths" }
//! { "type": "on_disconnect_delete", "namespace": "participants/abc", "key": "u" }
//! ```
//! The server answers with `snapshot` and `error` messages.

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
    routing::get,
    Router,
};
use dashmap::DashMap;
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use std::{
    collections::{BTreeMap, HashMap},
    net::SocketAddr,
    sync::Arc,
};
use tokio::sync::{broadcast, mpsc, oneshot};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Server configuration
const CHANNEL_CAPACITY: usize = 256;
const DEFAULT_ADDR: &str = "0.0.0.0:3030";

/// Full content of a namespace.
pub type Entries = BTreeMap<String, serde_json::Value>;

/// A message sent by a client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Start receiving snapshots of a namespace
    Subscribe { namespace: String },
    /// Stop receiving snapshots of a namespace
    Unsubscribe { namespace: String },
    Write {
        namespace: String,
        key: String,
        value: serde_json::Value,
    },
    Delete { namespace: String, key: String },
    /// Remove every entry of a namespace
    DeleteAll { namespace: String },
    /// Delete an entry when this connection closes
    OnDisconnectDelete { namespace: String, key: String },
}

/// A message sent to clients
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Current content of a namespace
    Snapshot { namespace: String, entries: Entries },
    /// Error message
    Error { message: String },
}

/// Namespace state
struct Namespace {
    entries: Entries,
    /// Broadcast channel for this namespace
    tx: broadcast::Sender<ServerMessage>,
}

impl Namespace {
    fn new() -> Self {
        let (tx, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self {
            entries: Entries::new(),
            tx,
        }
    }

    fn snapshot(&self, name: &str) -> ServerMessage {
        ServerMessage::Snapshot {
            namespace: name.to_string(),
            entries: self.entries.clone(),
        }
    }

    /// Send the current content to every subscriber
    fn publish(&self, name: &str) {
        // No receivers is fine
        let _ = self.tx.send(self.snapshot(name));
    }
}

/// Shared application state
struct AppState {
    namespaces: DashMap<String, Namespace>,
}

impl AppState {
    fn new() -> Self {
        Self {
            namespaces: DashMap::new(),
        }
    }

    /// Subscribe to a namespace. Returns the receiver and the current content.
    fn subscribe(&self, name: &str) -> (broadcast::Receiver<ServerMessage>, ServerMessage) {
        let ns = self
            .namespaces
            .entry(name.to_string())
            .or_insert_with(Namespace::new);
        (ns.tx.subscribe(), ns.snapshot(name))
    }

    fn snapshot(&self, name: &str) -> ServerMessage {
        match self.namespaces.get(name) {
            Some(ns) => ns.snapshot(name),
            None => ServerMessage::Snapshot {
                namespace: name.to_string(),
                entries: Entries::new(),
            },
        }
    }

    fn write(&self, name: &str, key: String, value: serde_json::Value) {
        let mut ns = self
            .namespaces
            .entry(name.to_string())
            .or_insert_with(Namespace::new);
        ns.entries.insert(key, value);
        ns.publish(name);
    }

    fn delete(&self, name: &str, key: &str) {
        if let Some(mut ns) = self.namespaces.get_mut(name) {
            if ns.entries.remove(key).is_some() {
                ns.publish(name);
            }
        }
    }

    fn delete_all(&self, name: &str) {
        if let Some(mut ns) = self.namespaces.get_mut(name) {
            if !ns.entries.is_empty() {
                ns.entries.clear();
                ns.publish(name);
            }
        }
    }

    /// Drop a namespace nobody uses any more
    fn prune(&self, name: &str) {
        self.namespaces
            .remove_if(name, |_, ns| ns.entries.is_empty() && ns.tx.receiver_count() == 0);
    }
}

/// Per-connection state
struct Connection {
    id: String,
    /// Stop signal of the forwarding task per subscribed namespace
    forwards: HashMap<String, oneshot::Sender<()>>,
    /// Entries to delete when the connection closes
    disconnect_hooks: Vec<(String, String)>,
    out_tx: mpsc::UnboundedSender<ServerMessage>,
}

impl Connection {
    fn handle(&mut self, state: &Arc<AppState>, msg: ClientMessage) {
        match msg {
            ClientMessage::Subscribe { namespace } => {
                if self.forwards.contains_key(&namespace) {
                    let _ = self.out_tx.send(state.snapshot(&namespace));
                    return;
                }
                let (rx, snapshot) = state.subscribe(&namespace);
                let _ = self.out_tx.send(snapshot);
                let (stop_tx, stop_rx) = oneshot::channel();
                tokio::spawn(forward(
                    Arc::clone(state),
                    namespace.clone(),
                    rx,
                    stop_rx,
                    self.out_tx.clone(),
                ));
                debug!("{} subscribed to {}", self.id, namespace);
                self.forwards.insert(namespace, stop_tx);
            }
            ClientMessage::Unsubscribe { namespace } => {
                if let Some(stop) = self.forwards.remove(&namespace) {
                    // The task may already be gone
                    let _ = stop.send(());
                    debug!("{} unsubscribed from {}", self.id, namespace);
                }
            }
            ClientMessage::Write {
                namespace,
                key,
                value,
            } => state.write(&namespace, key, value),
            ClientMessage::Delete { namespace, key } => state.delete(&namespace, &key),
            ClientMessage::DeleteAll { namespace } => {
                info!("{} cleared {}", self.id, namespace);
                state.delete_all(&namespace);
            }
            ClientMessage::OnDisconnectDelete { namespace, key } => {
                self.disconnect_hooks.push((namespace, key));
            }
        }
    }

    /// Stop forwarding and run the disconnect hooks
    fn close(self, state: &AppState) {
        // Dropping the stop senders ends every forwarding task
        drop(self.forwards);
        for (namespace, key) in self.disconnect_hooks {
            debug!("Disconnect hook for {}: {}/{}", self.id, namespace, key);
            state.delete(&namespace, &key);
            state.prune(&namespace);
        }
    }
}

/// Relay namespace snapshots to one connection until stopped, then drop
/// the namespace if this was its last user.
async fn forward(
    state: Arc<AppState>,
    namespace: String,
    mut rx: broadcast::Receiver<ServerMessage>,
    mut stop: oneshot::Receiver<()>,
    out_tx: mpsc::UnboundedSender<ServerMessage>,
) {
    loop {
        let received = tokio::select! {
            _ = &mut stop => break,
            received = rx.recv() => received,
        };
        let msg = match received {
            Ok(msg) => msg,
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                // Snapshots are full content, so the latest one is enough
                warn!("Subscriber of {} lagged by {}", namespace, skipped);
                state.snapshot(&namespace)
            }
            Err(broadcast::error::RecvError::Closed) => break,
        };
        if out_tx.send(msg).is_err() {
            break;
        }
    }
    drop(rx);
    state.prune(&namespace);
}

fn encode(msg: &ServerMessage) -> Option<Message> {
    match serde_json::to_string(msg) {
        Ok(json) => Some(Message::Text(json.into())),
        Err(e) => {
            warn!("Failed to encode message: {}", e);
            None
        }
    }
}

fn app(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/ws", get(ws_handler))
        .route("/health", get(health))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "inkshare_server=info,tower_http=info".into()),
        )
        .init();

    let addr: SocketAddr = std::env::var("INKSHARE_ADDR")
        .unwrap_or_else(|_| DEFAULT_ADDR.to_string())
        .parse()?;

    let state = Arc::new(AppState::new());

    info!("InkShare relay server listening on {}", addr);
    info!("WebSocket endpoint: ws://{}/ws", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app(state)).await?;
    Ok(())
}

/// Index page
async fn index() -> &'static str {
    "InkShare Relay Server - Connect via WebSocket at /ws"
}

/// Health check
async fn health() -> &'static str {
    "ok"
}

/// WebSocket upgrade handler
async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Handle a WebSocket connection
async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let (out_tx, mut out_rx) = mpsc::unbounded_channel();
    let mut conn = Connection {
        id: Uuid::new_v4().to_string(),
        forwards: HashMap::new(),
        disconnect_hooks: Vec::new(),
        out_tx,
    };
    info!("New connection: {}", conn.id);

    let (mut sender, mut receiver) = socket.split();

    loop {
        tokio::select! {
            // Handle incoming messages from client
            msg = receiver.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        match serde_json::from_str::<ClientMessage>(&text) {
                            Ok(client_msg) => conn.handle(&state, client_msg),
                            Err(e) => {
                                warn!("Invalid message from {}: {}", conn.id, e);
                                let err = ServerMessage::Error {
                                    message: format!("Invalid message: {}", e),
                                };
                                if let Some(msg) = encode(&err) {
                                    if sender.send(msg).await.is_err() {
                                        break;
                                    }
                                }
                            }
                        }
                    }
                    Some(Ok(Message::Binary(_))) => {
                        warn!("Ignoring binary message from {}", conn.id);
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        break;
                    }
                    Some(Ok(_)) => {} // Ignore ping/pong
                    Some(Err(e)) => {
                        warn!("WebSocket error for {}: {}", conn.id, e);
                        break;
                    }
                }
            }

            // Snapshots for this connection
            Some(server_msg) = out_rx.recv() => {
                if let Some(msg) = encode(&server_msg) {
                    if sender.send(msg).await.is_err() {
                        break;
                    }
                }
            }
        }
    }

    let id = conn.id.clone();
    conn.close(&state);
    info!("Connection closed: {}", id);
}
