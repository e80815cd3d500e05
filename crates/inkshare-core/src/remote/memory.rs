//! In-process remote store.

use super::{Entries, RemoteStore, StoreError, StoreResult, Subscription};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{Sender, channel};
use std::sync::{Arc, Mutex, MutexGuard, Weak};

#[derive(Default)]
struct Shared {
    namespaces: HashMap<String, Entries>,
    subscribers: HashMap<String, Vec<(u64, Sender<Entries>)>>,
    /// Keys to delete when a client disconnects, by client.
    disconnect_hooks: HashMap<u64, Vec<(String, String)>>,
    next_id: u64,
}

impl Shared {
    fn next_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    fn content(&self, namespace: &str) -> Entries {
        self.namespaces.get(namespace).cloned().unwrap_or_default()
    }

    fn notify(&mut self, namespace: &str) {
        let content = self.content(namespace);
        if let Some(subs) = self.subscribers.get_mut(namespace) {
            subs.retain(|(_, tx)| tx.send(content.clone()).is_ok());
        }
    }

    fn remove_entry(&mut self, namespace: &str, key: &str) {
        let removed = self
            .namespaces
            .get_mut(namespace)
            .and_then(|entries| entries.remove(key))
            .is_some();
        if removed {
            self.notify(namespace);
        }
    }
}

/// A shared in-memory store.
///
/// Clones are the same client. [`MemoryStore::connect`] opens another client
/// on the same data, which is how tests simulate several participants.
#[derive(Clone)]
pub struct MemoryStore {
    shared: Arc<Mutex<Shared>>,
    client: u64,
    offline: Arc<AtomicBool>,
}

impl std::fmt::Debug for MemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryStore")
            .field("client", &self.client)
            .field("offline", &self.offline.load(Ordering::SeqCst))
            .finish_non_exhaustive()
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    /// Create an empty store and its first client.
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Mutex::new(Shared::default())),
            client: 0,
            offline: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Open another client on the same data.
    pub fn connect(&self) -> Self {
        let client = self.lock().map(|mut s| s.next_id()).unwrap_or_default();
        Self {
            shared: Arc::clone(&self.shared),
            client,
            offline: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Make every operation of this client fail with [`StoreError::Io`].
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Run this client's disconnect hooks.
    pub fn disconnect(&self) -> StoreResult<()> {
        let mut shared = self.lock()?;
        let hooks = shared.disconnect_hooks.remove(&self.client).unwrap_or_default();
        for (namespace, key) in hooks {
            shared.remove_entry(&namespace, &key);
        }
        Ok(())
    }

    fn lock(&self) -> StoreResult<MutexGuard<'_, Shared>> {
        self.shared
            .lock()
            .map_err(|e| StoreError::Other(format!("Lock error: {}", e)))
    }

    fn online(&self) -> StoreResult<MutexGuard<'_, Shared>> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(StoreError::Io("store unreachable".to_string()));
        }
        self.lock()
    }
}

impl RemoteStore for MemoryStore {
    fn write(&self, namespace: &str, key: &str, value: serde_json::Value) -> StoreResult<()> {
        let mut shared = self.online()?;
        shared
            .namespaces
            .entry(namespace.to_string())
            .or_default()
            .insert(key.to_string(), value);
        shared.notify(namespace);
        Ok(())
    }

    fn delete(&self, namespace: &str, key: &str) -> StoreResult<()> {
        self.online()?.remove_entry(namespace, key);
        Ok(())
    }

    fn delete_all(&self, namespace: &str) -> StoreResult<()> {
        let mut shared = self.online()?;
        if shared.namespaces.remove(namespace).is_some() {
            shared.notify(namespace);
        }
        Ok(())
    }

    fn read(&self, namespace: &str) -> StoreResult<Entries> {
        Ok(self.online()?.content(namespace))
    }

    fn subscribe(&self, namespace: &str) -> StoreResult<Subscription> {
        let mut shared = self.online()?;
        let id = shared.next_id();
        let (tx, rx) = channel();
        // Initial content; the receiver is still alive here.
        let _ = tx.send(shared.content(namespace));
        shared
            .subscribers
            .entry(namespace.to_string())
            .or_default()
            .push((id, tx));

        let weak: Weak<Mutex<Shared>> = Arc::downgrade(&self.shared);
        let ns = namespace.to_string();
        Ok(Subscription::new(namespace, rx, move || {
            if let Some(shared) = weak.upgrade() {
                if let Ok(mut shared) = shared.lock() {
                    if let Some(subs) = shared.subscribers.get_mut(&ns) {
                        subs.retain(|(sub, _)| *sub != id);
                    }
                }
            }
        }))
    }

    fn on_disconnect_delete(&self, namespace: &str, key: &str) -> StoreResult<()> {
        let mut shared = self.online()?;
        let client = self.client;
        shared
            .disconnect_hooks
            .entry(client)
            .or_default()
            .push((namespace.to_string(), key.to_string()));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_subscribe_delivers_current_content() {
        let store = MemoryStore::new();
        store.write("ns", "a", json!(1)).unwrap();
        let sub = store.subscribe("ns").unwrap();
        let first = sub.try_next().unwrap();
        assert_eq!(first.get("a"), Some(&json!(1)));
        assert!(sub.try_next().is_none());
    }

    #[test]
    fn test_every_change_delivers_full_content() {
        let store = MemoryStore::new();
        let sub = store.subscribe("ns").unwrap();
        store.write("ns", "a", json!(1)).unwrap();
        store.write("ns", "b", json!(2)).unwrap();
        store.delete("ns", "a").unwrap();
        let snapshots = sub.drain();
        assert_eq!(snapshots.len(), 4);
        assert_eq!(snapshots[2].len(), 2);
        assert_eq!(snapshots[3].keys().collect::<Vec<_>>(), vec!["b"]);
    }

    #[test]
    fn test_namespaces_are_isolated() {
        let store = MemoryStore::new();
        let sub = store.subscribe("one").unwrap();
        sub.drain();
        store.write("two", "x", json!(true)).unwrap();
        assert!(sub.try_next().is_none());
        assert!(store.read("one").unwrap().is_empty());
    }

    #[test]
    fn test_delete_all() {
        let store = MemoryStore::new();
        store.write("ns", "a", json!(1)).unwrap();
        store.write("ns", "b", json!(2)).unwrap();
        store.delete_all("ns").unwrap();
        assert!(store.read("ns").unwrap().is_empty());
    }

    #[test]
    fn test_dropping_subscription_unsubscribes() {
        let store = MemoryStore::new();
        let sub = store.subscribe("ns").unwrap();
        drop(sub);
        store.write("ns", "a", json!(1)).unwrap();
        let shared = store.shared.lock().unwrap();
        assert!(shared.subscribers.get("ns").is_none_or(|s| s.is_empty()));
    }

    #[test]
    fn test_offline_client_fails() {
        let store = MemoryStore::new();
        let other = store.connect();
        store.set_offline(true);
        assert!(matches!(store.write("ns", "a", json!(1)), Err(StoreError::Io(_))));
        other.write("ns", "b", json!(2)).unwrap();
        store.set_offline(false);
        assert_eq!(store.read("ns").unwrap().len(), 1);
    }

    #[test]
    fn test_disconnect_hooks_only_apply_to_their_client() {
        let store = MemoryStore::new();
        let alice = store.connect();
        let bob = store.connect();
        alice.write("presence", "alice", json!({})).unwrap();
        bob.write("presence", "bob", json!({})).unwrap();
        alice.on_disconnect_delete("presence", "alice").unwrap();
        bob.on_disconnect_delete("presence", "bob").unwrap();

        alice.disconnect().unwrap();
        let remaining = store.read("presence").unwrap();
        assert_eq!(remaining.keys().collect::<Vec<_>>(), vec!["bob"]);
    }
}
