//! Session connection cache.
//!
//! A `session_id`-bearing request pins its ClickHouse connection (and any
//! server-side session state such as temporary tables) across requests. The
//! cache maps a [`SessionKey`] to one live connection with a TTL refreshed on
//! every access. Expired entries are swept opportunistically at the start of
//! any session-bearing request and drained at shutdown.
//!
//! Lock discipline: a std mutex guards the map and is never held across an
//! await; each entry's connection sits behind its own async mutex, so one
//! session's connection serves at most one call at a time.

use crate::client::{Connection, ConnectionError, ConnectionFactory, Credentials};
use crate::trace::TraceSink;
use log::debug;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Identity of a session: all four fields must match exactly for a
/// connection to be reused.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionKey {
    pub user: String,
    pub password: String,
    pub database: String,
    pub session_id: String,
}

impl SessionKey {
    pub fn new(credentials: &Credentials, session_id: &str) -> Self {
        Self {
            user: credentials.user.clone(),
            password: credentials.password.clone(),
            database: credentials.database.clone(),
            session_id: session_id.to_string(),
        }
    }
}

/// A cached connection. The async mutex serializes calls on the connection;
/// the cache keeps ownership until expiry or shutdown.
pub type SharedConnection = Arc<tokio::sync::Mutex<Box<dyn Connection>>>;

struct SessionEntry {
    connection: SharedConnection,
    last_used: Instant,
    expires_at: Instant,
}

/// Process-wide table of session connections.
#[derive(Default)]
pub struct SessionCache {
    entries: Mutex<HashMap<SessionKey, SessionEntry>>,
}

impl SessionCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up the connection for `key`, refreshing its TTL, or create one
    /// through `factory`. Runs an expiry sweep first.
    ///
    /// The returned connection remains owned by the cache; callers must not
    /// disconnect it.
    pub async fn get_or_create(
        &self,
        key: SessionKey,
        timeout_secs: u64,
        factory: &dyn ConnectionFactory,
        credentials: &Credentials,
        sink: Option<&TraceSink>,
    ) -> Result<SharedConnection, ConnectionError> {
        self.get_or_create_at(Instant::now(), key, timeout_secs, factory, credentials, sink)
            .await
    }

    async fn get_or_create_at(
        &self,
        now: Instant,
        key: SessionKey,
        timeout_secs: u64,
        factory: &dyn ConnectionFactory,
        credentials: &Credentials,
        sink: Option<&TraceSink>,
    ) -> Result<SharedConnection, ConnectionError> {
        let ttl = Duration::from_secs(timeout_secs);

        let expired = self.sweep_expired_at(now);
        release_all(expired).await;

        if let Some(connection) = self.refresh(&key, now, ttl) {
            debug!("Reusing session connection for session_id={}", key.session_id);
            return Ok(connection);
        }

        // Connect outside the map lock; re-check afterwards in case a
        // concurrent request created the entry for the same key first.
        let fresh = factory.connect(credentials, sink).await?;
        let fresh: SharedConnection = Arc::new(tokio::sync::Mutex::new(fresh));

        let race_loser = {
            let mut entries = self.entries.lock().expect("session cache poisoned");
            if let Some(entry) = entries.get_mut(&key) {
                entry.last_used = now;
                entry.expires_at = now + ttl;
                Some((entry.connection.clone(), fresh.clone()))
            } else {
                debug!(
                    "Created session connection for session_id={} (ttl={}s)",
                    key.session_id, timeout_secs
                );
                entries.insert(
                    key,
                    SessionEntry {
                        connection: fresh.clone(),
                        last_used: now,
                        expires_at: now + ttl,
                    },
                );
                None
            }
        };

        match race_loser {
            Some((existing, fresh)) => {
                release_all(vec![fresh]).await;
                Ok(existing)
            }
            None => Ok(fresh),
        }
    }

    /// Refresh an existing entry's TTL and return its connection.
    fn refresh(&self, key: &SessionKey, now: Instant, ttl: Duration) -> Option<SharedConnection> {
        let mut entries = self.entries.lock().expect("session cache poisoned");
        entries.get_mut(key).map(|entry| {
            entry.last_used = now;
            entry.expires_at = now + ttl;
            entry.connection.clone()
        })
    }

    /// Remove all entries whose TTL has elapsed and disconnect them.
    pub async fn sweep_expired(&self) {
        let expired = self.sweep_expired_at(Instant::now());
        release_all(expired).await;
    }

    fn sweep_expired_at(&self, now: Instant) -> Vec<SharedConnection> {
        let mut entries = self.entries.lock().expect("session cache poisoned");
        let expired_keys: Vec<SessionKey> = entries
            .iter()
            .filter(|(_, entry)| entry.expires_at <= now)
            .map(|(key, _)| key.clone())
            .collect();

        expired_keys
            .into_iter()
            .filter_map(|key| {
                debug!("Session expired: session_id={}", key.session_id);
                entries.remove(&key).map(|entry| entry.connection)
            })
            .collect()
    }

    /// Number of live entries (expired-but-unswept entries included).
    pub fn len(&self) -> usize {
        self.entries.lock().expect("session cache poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drain every entry and disconnect, for process shutdown.
    pub async fn shutdown(&self) {
        let drained: Vec<SharedConnection> = {
            let mut entries = self.entries.lock().expect("session cache poisoned");
            entries.drain().map(|(_, entry)| entry.connection).collect()
        };
        if !drained.is_empty() {
            debug!("Draining {} session connection(s)", drained.len());
        }
        release_all(drained).await;
    }
}

/// Disconnect connections, best effort. A connection still serving a call
/// holds its own lock; waiting here is fine because the entries are already
/// out of the map and invisible to new requests.
async fn release_all(connections: Vec<SharedConnection>) {
    for connection in connections {
        let mut conn = connection.lock().await;
        conn.disconnect().await;
    }
}

/// Disconnect a non-session connection after its single request, best effort.
pub async fn release_connection(mut connection: Box<dyn Connection>) {
    connection.disconnect().await;
}
