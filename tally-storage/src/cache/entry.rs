//! Cache entries with passive TTL expiry, and read results.

use chrono::{DateTime, Utc};
use std::time::Duration;

/// A serialized value stored under a cache key.
///
/// Expiry is computed at read time from `inserted_at + ttl`; nothing ever
/// sweeps entries in the background.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    /// Opaque serialized payload (JSON text).
    pub value: String,
    /// When the entry was written.
    pub inserted_at: DateTime<Utc>,
    /// How long the entry stays readable.
    pub ttl: Duration,
}

impl CacheEntry {
    /// Create an entry inserted now.
    pub fn new(value: impl Into<String>, ttl: Duration) -> Self {
        Self::inserted_at(value, Utc::now(), ttl)
    }

    /// Create an entry with an explicit insertion time.
    pub fn inserted_at(value: impl Into<String>, inserted_at: DateTime<Utc>, ttl: Duration) -> Self {
        Self {
            value: value.into(),
            inserted_at,
            ttl,
        }
    }

    /// Age of the entry at `now`. Clock skew into the past counts as zero.
    pub fn age_at(&self, now: DateTime<Utc>) -> Duration {
        now.signed_duration_since(self.inserted_at)
            .to_std()
            .unwrap_or(Duration::ZERO)
    }

    /// An entry is expired once its full TTL has elapsed. A zero TTL entry is
    /// expired immediately.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.age_at(now) >= self.ttl
    }

    /// Convenience for `is_expired_at(Utc::now())`.
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }
}

/// Where a value returned by the cache-aside layer came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadOrigin {
    /// Served from an unexpired cache entry.
    Cache,
    /// Cache miss; loaded from the store and written back.
    Loader,
    /// Cache medium failed; loaded from the store without caching.
    Fallback,
}

/// Result of a cache-aside read, carrying where the value came from.
#[derive(Debug, Clone)]
pub struct CacheRead<T> {
    value: T,
    cached_at: DateTime<Utc>,
    origin: ReadOrigin,
}

impl<T> CacheRead<T> {
    /// Create a read served from a cache hit.
    pub fn from_cache(value: T, cached_at: DateTime<Utc>) -> Self {
        Self {
            value,
            cached_at,
            origin: ReadOrigin::Cache,
        }
    }

    /// Create a read served by the loader after a miss.
    pub fn from_loader(value: T) -> Self {
        Self {
            value,
            cached_at: Utc::now(),
            origin: ReadOrigin::Loader,
        }
    }

    /// Create a read served by the loader because the cache failed.
    pub fn from_fallback(value: T) -> Self {
        Self {
            value,
            cached_at: Utc::now(),
            origin: ReadOrigin::Fallback,
        }
    }

    /// Consume the wrapper and return the underlying value.
    pub fn into_value(self) -> T {
        self.value
    }

    /// Where the value came from.
    pub fn origin(&self) -> ReadOrigin {
        self.origin
    }

    /// How stale the value is.
    pub fn staleness(&self) -> Duration {
        Utc::now()
            .signed_duration_since(self.cached_at)
            .to_std()
            .unwrap_or(Duration::ZERO)
    }
}
