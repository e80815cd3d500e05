//! Session metadata and participant presence.
//!
//! Password hashing and verification happen outside this crate; a session
//! record only says whether a hash is set.

use crate::record::unix_millis;
use crate::remote::{paths, Entries, RemoteStore, StoreError, StoreResult};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

/// Metadata stored under `sessions/{sessionId}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionRecord {
    pub password_hash: Option<String>,
    /// ISO-8601 creation time.
    pub created_at: String,
}

impl SessionRecord {
    /// A record created now.
    pub fn new(password_hash: Option<String>) -> Self {
        let now = OffsetDateTime::from_unix_timestamp_nanos(unix_millis() as i128 * 1_000_000)
            .unwrap_or(OffsetDateTime::UNIX_EPOCH);
        let created_at = now.format(&Rfc3339).unwrap_or_else(|e| {
            log::warn!("Failed to format session timestamp: {}", e);
            String::new()
        });
        Self {
            password_hash,
            created_at,
        }
    }

    pub fn requires_password(&self) -> bool {
        self.password_hash.as_deref().is_some_and(|h| !h.is_empty())
    }

    /// Parsed creation time, if it is valid RFC 3339.
    pub fn created(&self) -> Option<OffsetDateTime> {
        OffsetDateTime::parse(&self.created_at, &Rfc3339).ok()
    }

    /// Look up a session. `Ok(None)` means it does not exist.
    pub fn load<R: RemoteStore + ?Sized>(store: &R, session_id: &str) -> StoreResult<Option<Self>> {
        let sessions = store.read(paths::SESSIONS)?;
        sessions
            .get(session_id)
            .map(|value| serde_json::from_value(value.clone()).map_err(StoreError::from))
            .transpose()
    }

    /// Create and store a new session record.
    pub fn create<R: RemoteStore + ?Sized>(
        store: &R,
        session_id: &str,
        password_hash: Option<String>,
    ) -> StoreResult<Self> {
        let record = Self::new(password_hash);
        store.write(paths::SESSIONS, session_id, serde_json::to_value(&record)?)?;
        log::info!("Created session {}", session_id);
        Ok(record)
    }
}

/// Presence entry stored under `participants/{sessionId}/{uid}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParticipantRecord {
    pub uid: String,
    pub display_name: String,
    /// Milliseconds since the Unix epoch.
    pub last_seen: u64,
}

impl ParticipantRecord {
    /// A participant seen now. Without a display name, one is derived from the uid.
    pub fn new(uid: &str, display_name: Option<&str>) -> Self {
        let display_name = match display_name {
            Some(name) => name.to_string(),
            None => format!("User-{}", uid.chars().take(4).collect::<String>()),
        };
        Self {
            uid: uid.to_string(),
            display_name,
            last_seen: unix_millis(),
        }
    }
}

/// Decode the participants namespace, skipping malformed entries.
pub fn participants_from(entries: &Entries) -> Vec<ParticipantRecord> {
    entries
        .iter()
        .filter_map(|(uid, value)| match serde_json::from_value(value.clone()) {
            Ok(record) => Some(record),
            Err(e) => {
                log::warn!("Skipping participant {}: {}", uid, e);
                None
            }
        })
        .collect()
}

/// This client's presence in a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Presence {
    namespace: String,
    record: ParticipantRecord,
}

impl Presence {
    /// Announce `uid` in the session. The entry is removed by the store when
    /// this client disconnects.
    pub fn join<R: RemoteStore + ?Sized>(
        store: &R,
        session_id: &str,
        uid: &str,
        display_name: Option<&str>,
    ) -> StoreResult<Self> {
        let namespace = paths::participants(session_id);
        let record = ParticipantRecord::new(uid, display_name);
        store.write(&namespace, uid, serde_json::to_value(&record)?)?;
        store.on_disconnect_delete(&namespace, uid)?;
        log::debug!("{} joined {}", record.display_name, session_id);
        Ok(Self { namespace, record })
    }

    pub fn record(&self) -> &ParticipantRecord {
        &self.record
    }

    /// Remove this client's entry.
    pub fn leave<R: RemoteStore + ?Sized>(self, store: &R) -> StoreResult<()> {
        store.delete(&self.namespace, &self.record.uid)
    }

    /// Current participants of a session.
    pub fn list<R: RemoteStore + ?Sized>(store: &R, session_id: &str) -> StoreResult<Vec<ParticipantRecord>> {
        Ok(participants_from(&store.read(&paths::participants(session_id))?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::MemoryStore;
    use serde_json::json;

    #[test]
    fn test_session_create_and_load() {
        let store = MemoryStore::new();
        assert_eq!(SessionRecord::load(&store, "s1").unwrap(), None);

        let created = SessionRecord::create(&store, "s1", None).unwrap();
        let loaded = SessionRecord::load(&store, "s1").unwrap().unwrap();
        assert_eq!(created, loaded);
        assert!(!loaded.requires_password());
        assert!(loaded.created().is_some());

        let raw = store.read(paths::SESSIONS).unwrap();
        assert_eq!(raw["s1"]["passwordHash"], serde_json::Value::Null);
    }

    #[test]
    fn test_requires_password() {
        let mut record = SessionRecord::new(Some("abc123".into()));
        assert!(record.requires_password());
        record.password_hash = Some(String::new());
        assert!(!record.requires_password());
    }

    #[test]
    fn test_malformed_session_is_an_error() {
        let store = MemoryStore::new();
        store.write(paths::SESSIONS, "bad", json!({ "createdAt": 5 })).unwrap();
        assert!(matches!(
            SessionRecord::load(&store, "bad"),
            Err(StoreError::Serialization(_))
        ));
    }

    #[test]
    fn test_presence_join_and_disconnect() {
        let store = MemoryStore::new();
        let alice = store.connect();
        let presence = Presence::join(&alice, "s1", "abcdef", None).unwrap();
        assert_eq!(presence.record().display_name, "User-abcd");

        let bob = store.connect();
        Presence::join(&bob, "s1", "bob", Some("Bob")).unwrap();
        assert_eq!(Presence::list(&store, "s1").unwrap().len(), 2);

        alice.disconnect().unwrap();
        let remaining = Presence::list(&store, "s1").unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].display_name, "Bob");
    }

    #[test]
    fn test_presence_leave() {
        let store = MemoryStore::new();
        let presence = Presence::join(&store, "s1", "u1", Some("Ann")).unwrap();
        presence.leave(&store).unwrap();
        assert!(Presence::list(&store, "s1").unwrap().is_empty());
    }

    #[test]
    fn test_participants_skip_malformed() {
        let mut entries = Entries::new();
        entries.insert("x".into(), json!("garbage"));
        entries.insert(
            "u1".into(),
            json!({ "uid": "u1", "displayName": "Ann", "lastSeen": 1 }),
        );
        let parsed = participants_from(&entries);
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed[0].uid, "u1");
    }
}
