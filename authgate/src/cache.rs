//! In-process TTL key/value store.
//!
//! Backs the verification code vault and the federation pending records. Each
//! entry carries its own time-to-live; re-inserting a key replaces both the
//! value and the remaining lifetime.

use moka::{Expiry, future::Cache};
use std::time::{Duration, Instant};

#[derive(Debug, Clone)]
struct Entry {
    value: String,
    ttl: Duration,
}

struct PerEntryExpiry;

impl Expiry<String, Entry> for PerEntryExpiry {
    fn expire_after_create(&self, _key: &String, entry: &Entry, _created_at: Instant) -> Option<Duration> {
        Some(entry.ttl)
    }
}

/// String-keyed TTL store shared across the application.
#[derive(Clone)]
pub struct TtlStore {
    inner: Cache<String, Entry>,
}

impl Default for TtlStore {
    fn default() -> Self {
        Self::new()
    }
}

impl TtlStore {
    pub fn new() -> Self {
        Self {
            inner: Cache::builder().max_capacity(100_000).expire_after(PerEntryExpiry).build(),
        }
    }

    /// Insert a value, replacing any live entry and its remaining lifetime.
    pub async fn set(&self, key: impl Into<String>, value: impl Into<String>, ttl: Duration) {
        self.inner.insert(
            key.into(),
            Entry {
                value: value.into(),
                ttl,
            },
        )
        .await;
    }

    /// Fetch a value if present and unexpired.
    pub async fn get(&self, key: &str) -> Option<String> {
        self.inner.get(key).await.map(|e| e.value)
    }

    /// Whether a live entry exists for the key.
    pub async fn contains(&self, key: &str) -> bool {
        self.inner.contains_key(key)
    }

    /// Remove an entry, if present.
    pub async fn delete(&self, key: &str) {
        self.inner.invalidate(key).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_set_get_delete() {
        let store = TtlStore::new();

        store.set("k1", "v1", Duration::from_secs(60)).await;
        assert_eq!(store.get("k1").await.as_deref(), Some("v1"));
        assert!(store.contains("k1").await);

        store.delete("k1").await;
        assert_eq!(store.get("k1").await, None);
        assert!(!store.contains("k1").await);
    }

    #[tokio::test]
    async fn test_overwrite_replaces_value() {
        let store = TtlStore::new();

        store.set("k", "first", Duration::from_secs(60)).await;
        store.set("k", "second", Duration::from_secs(60)).await;
        assert_eq!(store.get("k").await.as_deref(), Some("second"));
    }

    #[tokio::test]
    async fn test_entries_expire() {
        let store = TtlStore::new();

        store.set("short", "v", Duration::from_millis(20)).await;
        store.set("long", "v", Duration::from_secs(60)).await;

        tokio::time::sleep(Duration::from_millis(60)).await;

        assert_eq!(store.get("short").await, None);
        assert_eq!(store.get("long").await.as_deref(), Some("v"));
    }
}
