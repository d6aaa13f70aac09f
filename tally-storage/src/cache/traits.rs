//! Cache backend trait and statistics.
//!
//! A backend is the cache *medium*: a string-keyed store of serialized blobs
//! with a per-entry TTL. It knows nothing about what the blobs contain.

use async_trait::async_trait;
use tally_core::CacheError;

use super::entry::CacheEntry;

/// Cache backend trait for pluggable cache media.
///
/// Implementations must be safe for concurrent use and must never return an
/// entry whose TTL has elapsed: expiry is checked against the stored
/// `(inserted_at, ttl)` on every `get`. There is no background sweeping.
///
/// The trait is object safe so the service can pick a medium at startup and
/// hold it as `Arc<dyn CacheBackend>`.
#[async_trait]
pub trait CacheBackend: Send + Sync {
    /// Get an unexpired entry, or `None` on miss or expiry.
    async fn get(&self, key: &str) -> Result<Option<CacheEntry>, CacheError>;

    /// Store an entry, replacing any previous value for the key.
    async fn put(&self, key: &str, entry: CacheEntry) -> Result<(), CacheError>;

    /// Remove an entry. Returns whether something was removed; removing an
    /// absent key is not an error.
    async fn delete(&self, key: &str) -> Result<bool, CacheError>;

    /// Backend-level statistics (entry count, size).
    async fn stats(&self) -> Result<CacheStats, CacheError>;
}

/// Statistics about cache usage.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Number of cache hits.
    pub hits: u64,
    /// Number of cache misses.
    pub misses: u64,
    /// Reads served straight from the store because the medium failed.
    pub fallbacks: u64,
    /// Number of successful invalidate calls.
    pub invalidations: u64,
    /// Number of entries currently held (expired but unread entries included).
    pub entry_count: u64,
    /// Approximate payload size in bytes.
    pub memory_bytes: u64,
}

impl CacheStats {
    /// Calculate the hit rate (0.0 to 1.0).
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}
