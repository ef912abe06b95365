//! In-memory blob backend: useful for testing and single-process sessions.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

use sitementor_core::error::StoreError;
use sitementor_core::store::BlobStore;

struct Entry {
    value: String,
    expires_at: Instant,
}

/// A blob store that keeps entries in a HashMap with per-key expiry.
pub struct InMemoryBlobStore {
    entries: Arc<RwLock<HashMap<String, Entry>>>,
}

impl InMemoryBlobStore {
    pub fn new() -> Self {
        Self {
            entries: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Number of live (unexpired) keys.
    pub async fn len(&self) -> usize {
        let now = Instant::now();
        self.entries
            .read()
            .await
            .values()
            .filter(|e| e.expires_at > now)
            .count()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

impl Default for InMemoryBlobStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BlobStore for InMemoryBlobStore {
    fn name(&self) -> &str {
        "in_memory"
    }

    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let mut entries = self.entries.write().await;
        match entries.get(key) {
            Some(entry) if entry.expires_at > Instant::now() => Ok(Some(entry.value.clone())),
            Some(_) => {
                // Expired: drop lazily on read.
                entries.remove(key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn set_with_ttl(
        &self,
        key: &str,
        value: String,
        ttl: Duration,
    ) -> Result<(), StoreError> {
        // Value and expiry land under one write lock: the write and the
        // TTL refresh are indivisible to readers.
        self.entries.write().await.insert(
            key.to_string(),
            Entry {
                value,
                expires_at: Instant::now() + ttl,
            },
        );
        Ok(())
    }

    async fn ttl(&self, key: &str) -> Result<Option<Duration>, StoreError> {
        let entries = self.entries.read().await;
        Ok(entries.get(key).and_then(|e| {
            let now = Instant::now();
            (e.expires_at > now).then(|| e.expires_at - now)
        }))
    }

    async fn ping(&self) -> Result<bool, StoreError> {
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn set_and_get() {
        let store = InMemoryBlobStore::new();
        store
            .set_with_ttl("k1", "v1".into(), Duration::from_secs(60))
            .await
            .unwrap();
        assert_eq!(store.get("k1").await.unwrap().as_deref(), Some("v1"));
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn missing_key_is_none() {
        let store = InMemoryBlobStore::new();
        assert!(store.get("missing").await.unwrap().is_none());
        assert!(store.ttl("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn expired_entry_is_gone() {
        let store = InMemoryBlobStore::new();
        store
            .set_with_ttl("k1", "v1".into(), Duration::from_millis(10))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(store.get("k1").await.unwrap().is_none());
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn overwrite_resets_ttl() {
        let store = InMemoryBlobStore::new();
        store
            .set_with_ttl("k1", "v1".into(), Duration::from_secs(10))
            .await
            .unwrap();
        store
            .set_with_ttl("k1", "v2".into(), Duration::from_secs(100))
            .await
            .unwrap();
        let ttl = store.ttl("k1").await.unwrap().unwrap();
        assert!(ttl > Duration::from_secs(90));
        assert_eq!(store.get("k1").await.unwrap().as_deref(), Some("v2"));
    }
}
