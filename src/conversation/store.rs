//! Session storage.

use super::state::UserSession;
use crate::error::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::Instant;

/// Keyed store of conversation sessions. Keys are sender phone digits.
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn get(&self, phone_number: &str) -> Result<Option<UserSession>>;

    /// Insert or replace the session under `session.phone_number`.
    async fn set(&self, session: UserSession) -> Result<()>;

    async fn delete(&self, phone_number: &str) -> Result<bool>;

    /// Drop sessions idle for longer than the store's TTL. Returns how many were removed.
    async fn purge_expired(&self) -> Result<usize>;
}

struct Entry {
    session: UserSession,
    touched: Instant,
}

/// Process-local store. Sessions expire `ttl` after their last write.
pub struct InMemorySessionStore {
    entries: RwLock<HashMap<String, Entry>>,
    ttl: Option<Duration>,
}

impl InMemorySessionStore {
    pub fn new(ttl: Option<Duration>) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            ttl,
        }
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    fn expired(&self, entry: &Entry, now: Instant) -> bool {
        self.ttl
            .is_some_and(|ttl| now.saturating_duration_since(entry.touched) >= ttl)
    }
}

impl Default for InMemorySessionStore {
    fn default() -> Self {
        Self::new(None)
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn get(&self, phone_number: &str) -> Result<Option<UserSession>> {
        let now = Instant::now();
        {
            let entries = self.entries.read().await;
            match entries.get(phone_number) {
                None => return Ok(None),
                Some(entry) if !self.expired(entry, now) => return Ok(Some(entry.session.clone())),
                Some(_) => {}
            }
        }

        let mut entries = self.entries.write().await;
        if entries
            .get(phone_number)
            .is_some_and(|entry| self.expired(entry, now))
        {
            entries.remove(phone_number);
            tracing::debug!("Session for {} expired", phone_number);
        }
        Ok(None)
    }

    async fn set(&self, session: UserSession) -> Result<()> {
        let key = session.phone_number.clone();
        self.entries.write().await.insert(
            key,
            Entry {
                session,
                touched: Instant::now(),
            },
        );
        Ok(())
    }

    async fn delete(&self, phone_number: &str) -> Result<bool> {
        Ok(self.entries.write().await.remove(phone_number).is_some())
    }

    async fn purge_expired(&self) -> Result<usize> {
        if self.ttl.is_none() {
            return Ok(0);
        }
        let now = Instant::now();
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|_, entry| !self.expired(entry, now));
        let removed = before - entries.len();
        if removed > 0 {
            tracing::debug!("Purged {} expired sessions", removed);
        }
        Ok(removed)
    }
}
