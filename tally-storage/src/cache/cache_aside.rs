//! Cache-aside reads with graceful degradation.
//!
//! Reads consult the cache first and fall back to a caller-supplied loader on
//! miss, writing the loaded value back with a TTL. The cache is never the
//! source of truth:
//!
//! - a failing cache medium on read degrades to calling the loader directly
//! - a failing cache write after a successful load is logged and ignored
//! - loader errors propagate unchanged and nothing is cached
//!
//! Invalidation is explicit and best effort; its error is returned so the
//! caller can decide whether to surface it.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tally_core::CacheError;

use super::entry::{CacheEntry, CacheRead};
use super::traits::{CacheBackend, CacheStats};

/// Configuration for the cache-aside layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheConfig {
    /// When false every read goes straight to the loader.
    pub enabled: bool,
    /// TTL for a user's project list.
    pub project_list_ttl: Duration,
    /// TTL for a user's cross-project transaction list.
    pub user_transactions_ttl: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            project_list_ttl: Duration::from_secs(300),
            user_transactions_ttl: Duration::from_secs(60),
        }
    }
}

impl CacheConfig {
    /// Create a new cache config with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Enable or disable caching.
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Set the project list TTL.
    pub fn with_project_list_ttl(mut self, ttl: Duration) -> Self {
        self.project_list_ttl = ttl;
        self
    }

    /// Set the user transaction list TTL.
    pub fn with_user_transactions_ttl(mut self, ttl: Duration) -> Self {
        self.user_transactions_ttl = ttl;
        self
    }
}

#[derive(Debug, Default)]
struct Counters {
    hits: AtomicU64,
    misses: AtomicU64,
    fallbacks: AtomicU64,
    invalidations: AtomicU64,
}

/// Cache-aside wrapper around a cache medium.
///
/// Values are stored as JSON text so any medium that can hold a string can
/// back the layer.
pub struct CacheAside<C: CacheBackend + ?Sized> {
    backend: Arc<C>,
    config: CacheConfig,
    counters: Arc<Counters>,
}

impl<C: CacheBackend + ?Sized> Clone for CacheAside<C> {
    fn clone(&self) -> Self {
        Self {
            backend: Arc::clone(&self.backend),
            config: self.config.clone(),
            counters: Arc::clone(&self.counters),
        }
    }
}

impl<C: CacheBackend + ?Sized> CacheAside<C> {
    /// Create a new cache-aside layer.
    pub fn new(backend: Arc<C>, config: CacheConfig) -> Self {
        Self {
            backend,
            config,
            counters: Arc::new(Counters::default()),
        }
    }

    /// Get the cache configuration.
    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Get a reference to the cache medium.
    pub fn backend(&self) -> &C {
        &self.backend
    }

    /// Return the cached value for `key` if present and unexpired, otherwise
    /// run `loader`, cache its result for `ttl`, and return it.
    pub async fn get_or_load<T, E, F, Fut>(&self, key: &str, ttl: Duration, loader: F) -> Result<T, E>
    where
        T: Serialize + DeserializeOwned + Send,
        F: FnOnce() -> Fut + Send,
        Fut: Future<Output = Result<T, E>> + Send,
    {
        self.get_or_load_read(key, ttl, loader)
            .await
            .map(CacheRead::into_value)
    }

    /// Like [`get_or_load`](Self::get_or_load) but reports where the value
    /// came from.
    pub async fn get_or_load_read<T, E, F, Fut>(
        &self,
        key: &str,
        ttl: Duration,
        loader: F,
    ) -> Result<CacheRead<T>, E>
    where
        T: Serialize + DeserializeOwned + Send,
        F: FnOnce() -> Fut + Send,
        Fut: Future<Output = Result<T, E>> + Send,
    {
        if !self.config.enabled {
            return loader().await.map(CacheRead::from_loader);
        }

        match self.backend.get(key).await {
            Ok(Some(entry)) => match serde_json::from_str::<T>(&entry.value) {
                Ok(value) => {
                    self.counters.hits.fetch_add(1, Ordering::Relaxed);
                    let read = CacheRead::from_cache(value, entry.inserted_at);
                    tracing::debug!(key, age_ms = read.staleness().as_millis() as u64, "cache hit");
                    return Ok(read);
                }
                Err(e) => {
                    tracing::warn!(key, error = %e, "discarding undecodable cache entry");
                }
            },
            Ok(None) => {}
            Err(e) => {
                self.counters.fallbacks.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(key, error = %e, "cache read failed, loading from store");
                return loader().await.map(CacheRead::from_fallback);
            }
        }

        self.counters.misses.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(key, "cache miss");

        let value = loader().await?;
        match serde_json::to_string(&value) {
            Ok(blob) => self.write_back(key, blob, ttl).await,
            Err(e) => {
                let err = CacheError::Serialization {
                    key: key.to_string(),
                    reason: e.to_string(),
                };
                tracing::warn!(key, error = %err, "skipping cache write");
            }
        }
        Ok(CacheRead::from_loader(value))
    }

    async fn write_back(&self, key: &str, blob: String, ttl: Duration) {
        if let Err(e) = self.backend.put(key, CacheEntry::new(blob, ttl)).await {
            tracing::warn!(key, error = %e, "cache write failed, value served uncached");
        }
    }

    /// Remove the entry stored under `key`. Removing an absent key succeeds.
    pub async fn invalidate(&self, key: &str) -> Result<(), CacheError> {
        let removed = self.backend.delete(key).await?;
        self.counters.invalidations.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(key, removed, "cache invalidated");
        Ok(())
    }

    /// Layer counters merged with the medium's entry statistics.
    ///
    /// A medium that cannot report stats contributes zero entries.
    pub async fn stats(&self) -> CacheStats {
        let backend = match self.backend.stats().await {
            Ok(stats) => stats,
            Err(e) => {
                tracing::debug!(error = %e, "cache medium stats unavailable");
                CacheStats::default()
            }
        };

        CacheStats {
            hits: self.counters.hits.load(Ordering::Relaxed),
            misses: self.counters.misses.load(Ordering::Relaxed),
            fallbacks: self.counters.fallbacks.load(Ordering::Relaxed),
            invalidations: self.counters.invalidations.load(Ordering::Relaxed),
            entry_count: backend.entry_count,
            memory_bytes: backend.memory_bytes,
        }
    }
}
