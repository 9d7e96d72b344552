//! Auto-expiring key/value storage
//!
//! Fast, TTL-bounded storage used for revoked access tokens and short-lived
//! verification codes. Entries disappear on their own once their TTL runs
//! out; readers never observe an expired entry even before it is purged.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::Instant;

use crate::error::Result;

/// TTL key/value storage interface
#[async_trait]
pub trait ExpiringStore: Send + Sync {
    /// Insert or overwrite a value that expires after `ttl`
    async fn set_with_ttl(&self, key: &str, value: String, ttl: Duration) -> Result<()>;

    /// Get a live value
    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Cheap existence check for a live key
    async fn contains(&self, key: &str) -> Result<bool>;

    /// Remaining lifetime of a live key
    async fn ttl(&self, key: &str) -> Result<Option<Duration>>;

    /// Delete a key, returning whether a live entry was removed
    async fn remove(&self, key: &str) -> Result<bool>;

    /// Number of live keys starting with `prefix`
    async fn count_prefix(&self, prefix: &str) -> Result<usize>;

    /// Drop every expired entry, returning how many were dropped
    async fn purge_expired(&self) -> Result<usize>;
}

struct ExpiringEntry {
    value: String,
    expires_at: Instant,
}

impl ExpiringEntry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at > now
    }
}

/// In-memory expiring store backed by the tokio clock
pub struct MemoryExpiringStore {
    entries: Arc<RwLock<HashMap<String, ExpiringEntry>>>,
}

impl MemoryExpiringStore {
    pub fn new() -> Self {
        Self {
            entries: Arc::new(RwLock::new(HashMap::new())),
        }
    }
}

impl Default for MemoryExpiringStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ExpiringStore for MemoryExpiringStore {
    async fn set_with_ttl(&self, key: &str, value: String, ttl: Duration) -> Result<()> {
        if ttl.is_zero() {
            return Ok(());
        }

        let entry = ExpiringEntry {
            value,
            expires_at: Instant::now() + ttl,
        };
        self.entries.write().await.insert(key.to_string(), entry);
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        let now = Instant::now();
        let entries = self.entries.read().await;
        Ok(entries
            .get(key)
            .filter(|entry| entry.is_live(now))
            .map(|entry| entry.value.clone()))
    }

    async fn contains(&self, key: &str) -> Result<bool> {
        let now = Instant::now();
        let entries = self.entries.read().await;
        Ok(entries.get(key).map_or(false, |entry| entry.is_live(now)))
    }

    async fn ttl(&self, key: &str) -> Result<Option<Duration>> {
        let now = Instant::now();
        let entries = self.entries.read().await;
        Ok(entries
            .get(key)
            .filter(|entry| entry.is_live(now))
            .map(|entry| entry.expires_at - now))
    }

    async fn remove(&self, key: &str) -> Result<bool> {
        let now = Instant::now();
        let mut entries = self.entries.write().await;
        Ok(entries.remove(key).map_or(false, |entry| entry.is_live(now)))
    }

    async fn count_prefix(&self, prefix: &str) -> Result<usize> {
        let now = Instant::now();
        let entries = self.entries.read().await;
        Ok(entries
            .iter()
            .filter(|(key, entry)| key.starts_with(prefix) && entry.is_live(now))
            .count())
    }

    async fn purge_expired(&self) -> Result<usize> {
        let now = Instant::now();
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|_, entry| entry.is_live(now));
        Ok(before - entries.len())
    }
}

/// Shared reference to an expiring store
pub type SharedExpiringStore = Arc<dyn ExpiringStore>;
