//! Remote key-value pub/sub store.
//!
//! The store holds namespaces of `key -> JSON value` entries. Subscribers
//! receive the full content of a namespace every time any entry in it
//! changes, starting with the content at subscription time.

mod memory;
pub mod paths;
#[cfg(not(target_arch = "wasm32"))]
mod relay;

pub use memory::MemoryStore;
#[cfg(not(target_arch = "wasm32"))]
pub use relay::{ConnectionState, RelayStore};

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::mpsc::Receiver;
use thiserror::Error;

/// Full content of a namespace.
pub type Entries = BTreeMap<String, serde_json::Value>;

/// Remote store errors.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum StoreError {
    #[error("Not connected to the store")]
    NotConnected,
    #[error("Serialization error: {0}")]
    Serialization(String),
    #[error("I/O error: {0}")]
    Io(String),
    #[error("Connection closed")]
    Closed,
    #[error("{0}")]
    Other(String),
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        StoreError::Serialization(e.to_string())
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Client side of a shared key-value store.
///
/// Mutations are fire-and-forget: an `Ok` means the request was accepted,
/// not that other clients have observed it.
pub trait RemoteStore {
    fn write(&self, namespace: &str, key: &str, value: serde_json::Value) -> StoreResult<()>;

    fn delete(&self, namespace: &str, key: &str) -> StoreResult<()>;

    /// Remove every entry of a namespace in one operation.
    fn delete_all(&self, namespace: &str) -> StoreResult<()>;

    /// Current content of a namespace.
    fn read(&self, namespace: &str) -> StoreResult<Entries>;

    /// Watch a namespace. The current content is delivered immediately.
    fn subscribe(&self, namespace: &str) -> StoreResult<Subscription>;

    /// Delete `key` when this client disconnects.
    fn on_disconnect_delete(&self, namespace: &str, key: &str) -> StoreResult<()>;
}

/// A stream of namespace snapshots. Dropping it unsubscribes.
pub struct Subscription {
    namespace: String,
    rx: Receiver<Entries>,
    cancel: Option<Box<dyn FnOnce() + Send>>,
}

impl Subscription {
    pub fn new(
        namespace: impl Into<String>,
        rx: Receiver<Entries>,
        cancel: impl FnOnce() + Send + 'static,
    ) -> Self {
        Self {
            namespace: namespace.into(),
            rx,
            cancel: Some(Box::new(cancel)),
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Next snapshot, if one is waiting.
    pub fn try_next(&self) -> Option<Entries> {
        self.rx.try_recv().ok()
    }

    /// All waiting snapshots, oldest first.
    pub fn drain(&self) -> Vec<Entries> {
        self.rx.try_iter().collect()
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("namespace", &self.namespace)
            .finish_non_exhaustive()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

/// A pending mutation produced by a command.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum RemoteOp {
    Write {
        key: String,
        value: serde_json::Value,
    },
    Delete {
        key: String,
    },
    DeleteAll,
}

impl RemoteOp {
    /// Apply to `namespace`.
    pub fn apply<R: RemoteStore + ?Sized>(&self, store: &R, namespace: &str) -> StoreResult<()> {
        match self {
            RemoteOp::Write { key, value } => store.write(namespace, key, value.clone()),
            RemoteOp::Delete { key } => store.delete(namespace, key),
            RemoteOp::DeleteAll => store.delete_all(namespace),
        }
    }
}
