//! In-process cache medium backed by a locked hash map.

use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use chrono::Utc;
use tally_core::CacheError;

use super::entry::CacheEntry;
use super::traits::{CacheBackend, CacheStats};

/// Process-local cache medium.
///
/// Expired entries are dropped lazily when a read finds them; entries that
/// are never read again stay until overwritten or deleted.
#[derive(Debug, Default)]
pub struct InMemoryCacheBackend {
    entries: RwLock<HashMap<String, CacheEntry>>,
}

impl InMemoryCacheBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, HashMap<String, CacheEntry>>, CacheError> {
        self.entries.read().map_err(|_| CacheError::Unavailable {
            reason: "in-memory cache lock poisoned".to_string(),
        })
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, HashMap<String, CacheEntry>>, CacheError> {
        self.entries.write().map_err(|_| CacheError::Unavailable {
            reason: "in-memory cache lock poisoned".to_string(),
        })
    }
}

#[async_trait]
impl CacheBackend for InMemoryCacheBackend {
    async fn get(&self, key: &str) -> Result<Option<CacheEntry>, CacheError> {
        let now = Utc::now();
        {
            let entries = self.read()?;
            match entries.get(key) {
                None => return Ok(None),
                Some(entry) if !entry.is_expired_at(now) => return Ok(Some(entry.clone())),
                Some(_) => {}
            }
        }

        // Re-check under the write lock; a concurrent put may have refreshed it.
        let mut entries = self.write()?;
        if entries.get(key).is_some_and(|e| e.is_expired_at(now)) {
            entries.remove(key);
        }
        Ok(None)
    }

    async fn put(&self, key: &str, entry: CacheEntry) -> Result<(), CacheError> {
        self.write()?.insert(key.to_string(), entry);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool, CacheError> {
        Ok(self.write()?.remove(key).is_some())
    }

    async fn stats(&self) -> Result<CacheStats, CacheError> {
        let entries = self.read()?;
        Ok(CacheStats {
            entry_count: entries.len() as u64,
            memory_bytes: entries
                .iter()
                .map(|(k, v)| (k.len() + v.value.len()) as u64)
                .sum(),
            ..Default::default()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_put_then_get() {
        let cache = InMemoryCacheBackend::new();
        cache
            .put("projects:a", CacheEntry::new("[1,2]", Duration::from_secs(60)))
            .await
            .unwrap();

        let entry = cache.get("projects:a").await.unwrap().unwrap();
        assert_eq!(entry.value, "[1,2]");
    }

    #[tokio::test]
    async fn test_get_missing_key() {
        let cache = InMemoryCacheBackend::new();
        assert!(cache.get("nope").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_expired_entry_is_not_returned_and_is_dropped() {
        let cache = InMemoryCacheBackend::new();
        let old = Utc::now() - chrono::Duration::seconds(120);
        cache
            .put("k", CacheEntry::inserted_at("x", old, Duration::from_secs(60)))
            .await
            .unwrap();
        assert_eq!(cache.stats().await.unwrap().entry_count, 1);

        assert!(cache.get("k").await.unwrap().is_none());
        assert_eq!(cache.stats().await.unwrap().entry_count, 0);
    }

    #[tokio::test]
    async fn test_ttl_elapses_in_real_time() {
        let cache = InMemoryCacheBackend::new();
        cache
            .put("k", CacheEntry::new("x", Duration::from_millis(50)))
            .await
            .unwrap();
        assert!(cache.get("k").await.unwrap().is_some());

        tokio::time::sleep(Duration::from_millis(80)).await;
        assert!(cache.get("k").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_put_overwrites() {
        let cache = InMemoryCacheBackend::new();
        cache.put("k", CacheEntry::new("one", Duration::from_secs(60))).await.unwrap();
        cache.put("k", CacheEntry::new("two", Duration::from_secs(60))).await.unwrap();

        assert_eq!(cache.get("k").await.unwrap().unwrap().value, "two");
        assert_eq!(cache.stats().await.unwrap().entry_count, 1);
    }

    #[tokio::test]
    async fn test_delete_is_idempotent() {
        let cache = InMemoryCacheBackend::new();
        cache.put("k", CacheEntry::new("x", Duration::from_secs(60))).await.unwrap();

        assert!(cache.delete("k").await.unwrap());
        assert!(!cache.delete("k").await.unwrap());
        assert!(cache.get("k").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_keys_are_exact_match() {
        let cache = InMemoryCacheBackend::new();
        cache.put("projects:1", CacheEntry::new("x", Duration::from_secs(60))).await.unwrap();

        assert!(cache.get("projects:10").await.unwrap().is_none());
        assert!(cache.get("projects:").await.unwrap().is_none());
    }
}
