//! LMDB-backed cache medium.
//!
//! Uses the heed crate to keep cached blobs in a memory-mapped file, so the
//! cache survives process restarts and can be shared by processes on the same
//! host. Values are stored as:
//!
//! ```text
//! [inserted_at millis: i64 LE][ttl millis: u64 LE][payload: UTF-8]
//! ```
//!
//! Reads use read transactions; `put` and `delete` use write transactions.
//! An expired or undecodable entry found by `get` is removed in a follow-up
//! write transaction and reported as a miss, so the next load overwrites it.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use heed::types::Bytes;
use heed::{Database, Env, EnvOpenOptions};
use tally_core::CacheError;

use super::entry::CacheEntry;
use super::traits::{CacheBackend, CacheStats};

const HEADER_LEN: usize = 16;
const BYTES_PER_MB: usize = 1024 * 1024;

/// Error type for LMDB cache operations.
#[derive(Debug, thiserror::Error)]
pub enum LmdbCacheError {
    /// Failed to open or create the LMDB environment.
    #[error("Failed to open LMDB environment: {0}")]
    EnvOpen(String),

    /// Failed to open the database within the environment.
    #[error("Failed to open database: {0}")]
    DbOpen(String),

    /// Requested map size does not fit in the address space.
    #[error("Map size of {0} MB is too large")]
    MapSizeTooLarge(usize),

    /// Transaction error.
    #[error("Transaction error: {0}")]
    Transaction(String),

    /// Stored bytes do not match the value layout.
    #[error("Corrupt cache value: {0}")]
    Corrupt(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<LmdbCacheError> for CacheError {
    fn from(e: LmdbCacheError) -> Self {
        CacheError::Unavailable {
            reason: e.to_string(),
        }
    }
}

fn txn_error(e: heed::Error) -> LmdbCacheError {
    LmdbCacheError::Transaction(e.to_string())
}

/// LMDB-backed cache medium.
pub struct LmdbCacheBackend {
    env: Env,
    db: Database<Bytes, Bytes>,
}

impl LmdbCacheBackend {
    /// Open (or create) an LMDB cache.
    ///
    /// # Arguments
    ///
    /// * `path` - Directory where LMDB files will be stored
    /// * `max_size_mb` - Maximum size of the memory map in megabytes
    pub fn new<P: AsRef<Path>>(path: P, max_size_mb: usize) -> Result<Self, LmdbCacheError> {
        let map_size = max_size_mb
            .checked_mul(BYTES_PER_MB)
            .ok_or(LmdbCacheError::MapSizeTooLarge(max_size_mb))?;
        std::fs::create_dir_all(&path)?;

        let env = unsafe {
            EnvOpenOptions::new()
                .map_size(map_size)
                .max_dbs(1)
                .open(path.as_ref())
        }
        .map_err(|e| LmdbCacheError::EnvOpen(e.to_string()))?;

        let mut wtxn = env.write_txn().map_err(txn_error)?;
        let db: Database<Bytes, Bytes> = env
            .create_database(&mut wtxn, None)
            .map_err(|e| LmdbCacheError::DbOpen(e.to_string()))?;
        wtxn.commit().map_err(txn_error)?;

        Ok(Self { env, db })
    }

    /// Largest map size, in megabytes, that `new` accepts.
    pub fn max_map_size_mb() -> usize {
        usize::MAX / BYTES_PER_MB
    }

    fn remove(&self, key: &str) -> Result<bool, LmdbCacheError> {
        let mut wtxn = self.env.write_txn().map_err(txn_error)?;
        let removed = self.db.delete(&mut wtxn, key.as_bytes()).map_err(txn_error)?;
        wtxn.commit().map_err(txn_error)?;
        Ok(removed)
    }
}

fn encode_entry(entry: &CacheEntry) -> Vec<u8> {
    let ttl_millis = u64::try_from(entry.ttl.as_millis()).unwrap_or(u64::MAX);
    let mut buf = Vec::with_capacity(HEADER_LEN + entry.value.len());
    buf.extend_from_slice(&entry.inserted_at.timestamp_millis().to_le_bytes());
    buf.extend_from_slice(&ttl_millis.to_le_bytes());
    buf.extend_from_slice(entry.value.as_bytes());
    buf
}

fn decode_entry(bytes: &[u8]) -> Result<CacheEntry, LmdbCacheError> {
    if bytes.len() < HEADER_LEN {
        return Err(LmdbCacheError::Corrupt(format!(
            "value is {} bytes, header needs {}",
            bytes.len(),
            HEADER_LEN
        )));
    }

    let mut millis = [0u8; 8];
    millis.copy_from_slice(&bytes[0..8]);
    let inserted_at = DateTime::<Utc>::from_timestamp_millis(i64::from_le_bytes(millis))
        .ok_or_else(|| LmdbCacheError::Corrupt("insertion time out of range".to_string()))?;

    let mut ttl = [0u8; 8];
    ttl.copy_from_slice(&bytes[8..16]);
    let ttl = Duration::from_millis(u64::from_le_bytes(ttl));

    let value = std::str::from_utf8(&bytes[HEADER_LEN..])
        .map_err(|e| LmdbCacheError::Corrupt(e.to_string()))?;

    Ok(CacheEntry::inserted_at(value, inserted_at, ttl))
}

#[async_trait]
impl CacheBackend for LmdbCacheBackend {
    async fn get(&self, key: &str) -> Result<Option<CacheEntry>, CacheError> {
        let decoded = {
            let rtxn = self.env.read_txn().map_err(txn_error)?;
            match self.db.get(&rtxn, key.as_bytes()).map_err(txn_error)? {
                Some(bytes) => decode_entry(bytes),
                None => return Ok(None),
            }
        };

        let state = match decoded {
            Ok(entry) if !entry.is_expired() => return Ok(Some(entry)),
            Ok(_) => "expired",
            Err(e) => {
                tracing::warn!(key, error = %e, "dropping corrupt LMDB cache entry");
                "corrupt"
            }
        };

        if let Err(e) = self.remove(key) {
            tracing::debug!(key, error = %e, state, "failed to drop LMDB cache entry");
        }
        Ok(None)
    }

    async fn put(&self, key: &str, entry: CacheEntry) -> Result<(), CacheError> {
        let bytes = encode_entry(&entry);
        let mut wtxn = self.env.write_txn().map_err(txn_error)?;
        self.db
            .put(&mut wtxn, key.as_bytes(), &bytes)
            .map_err(txn_error)?;
        wtxn.commit().map_err(txn_error)?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool, CacheError> {
        Ok(self.remove(key)?)
    }

    async fn stats(&self) -> Result<CacheStats, CacheError> {
        let rtxn = self.env.read_txn().map_err(txn_error)?;
        let entry_count = self.db.len(&rtxn).map_err(txn_error)?;
        Ok(CacheStats {
            entry_count,
            ..Default::default()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{CacheAside, CacheConfig, ReadOrigin};
    use tempfile::TempDir;

    fn create_test_backend() -> (LmdbCacheBackend, TempDir) {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let backend =
            LmdbCacheBackend::new(temp_dir.path(), 10).expect("Failed to create LMDB backend");
        (backend, temp_dir)
    }

    #[test]
    fn test_encode_decode_layout() {
        let inserted = DateTime::<Utc>::from_timestamp_millis(1_700_000_000_123).unwrap();
        let entry = CacheEntry::inserted_at("[{\"a\":1}]", inserted, Duration::from_secs(300));
        let bytes = encode_entry(&entry);

        assert_eq!(&bytes[0..8], &1_700_000_000_123i64.to_le_bytes());
        assert_eq!(&bytes[8..16], &300_000u64.to_le_bytes());
        assert_eq!(decode_entry(&bytes).unwrap(), entry);
    }

    #[test]
    fn test_decode_rejects_short_values() {
        assert!(matches!(decode_entry(&[1, 2, 3]), Err(LmdbCacheError::Corrupt(_))));
    }

    #[test]
    fn test_oversized_map_is_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let too_big = LmdbCacheBackend::max_map_size_mb() + 1;
        assert!(matches!(
            LmdbCacheBackend::new(temp_dir.path(), too_big),
            Err(LmdbCacheError::MapSizeTooLarge(mb)) if mb == too_big
        ));
    }

    fn write_raw(backend: &LmdbCacheBackend, key: &str, bytes: &[u8]) {
        let mut wtxn = backend.env.write_txn().unwrap();
        backend.db.put(&mut wtxn, key.as_bytes(), bytes).unwrap();
        wtxn.commit().unwrap();
    }

    #[tokio::test]
    async fn test_corrupt_entry_is_dropped_as_miss() {
        let (backend, _dir) = create_test_backend();
        write_raw(&backend, "short", &[1, 2, 3]);

        let mut bad_utf8 = encode_entry(&CacheEntry::new("", Duration::from_secs(60)));
        bad_utf8.extend_from_slice(&[0xff, 0xfe]);
        write_raw(&backend, "utf8", &bad_utf8);

        assert!(backend.get("short").await.unwrap().is_none());
        assert!(backend.get("utf8").await.unwrap().is_none());
        assert_eq!(backend.stats().await.unwrap().entry_count, 0);
    }

    #[tokio::test]
    async fn test_corrupt_entry_is_repopulated_by_next_load() {
        let (backend, _dir) = create_test_backend();
        write_raw(&backend, "projects:u1", b"garbage");
        let backend = std::sync::Arc::new(backend);
        let cache = CacheAside::new(std::sync::Arc::clone(&backend), CacheConfig::default());
        let ttl = Duration::from_secs(60);

        let first = cache
            .get_or_load_read("projects:u1", ttl, || async { Ok::<_, String>(vec![7u32]) })
            .await
            .unwrap();
        assert_eq!(first.origin(), ReadOrigin::Loader);

        let second = cache
            .get_or_load_read("projects:u1", ttl, || async { Ok::<_, String>(vec![8u32]) })
            .await
            .unwrap();
        assert_eq!(second.origin(), ReadOrigin::Cache);
        assert_eq!(second.into_value(), vec![7]);

        let stats = cache.stats().await;
        assert_eq!(stats.fallbacks, 0);
        assert_eq!(stats.hits, 1);
    }

    #[tokio::test]
    async fn test_put_and_get() {
        let (backend, _dir) = create_test_backend();
        backend
            .put("projects:u1", CacheEntry::new("[]", Duration::from_secs(60)))
            .await
            .unwrap();

        let entry = backend.get("projects:u1").await.unwrap().unwrap();
        assert_eq!(entry.value, "[]");
        assert_eq!(entry.ttl, Duration::from_secs(60));
    }

    #[tokio::test]
    async fn test_get_nonexistent() {
        let (backend, _dir) = create_test_backend();
        assert!(backend.get("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_expired_entry_is_dropped() {
        let (backend, _dir) = create_test_backend();
        let old = Utc::now() - chrono::Duration::minutes(10);
        backend
            .put("k", CacheEntry::inserted_at("x", old, Duration::from_secs(60)))
            .await
            .unwrap();

        assert!(backend.get("k").await.unwrap().is_none());
        assert_eq!(backend.stats().await.unwrap().entry_count, 0);
    }

    #[tokio::test]
    async fn test_delete() {
        let (backend, _dir) = create_test_backend();
        backend.put("k", CacheEntry::new("x", Duration::from_secs(60))).await.unwrap();

        assert!(backend.delete("k").await.unwrap());
        assert!(!backend.delete("k").await.unwrap());
        assert!(backend.get("k").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_stats_counts_entries() {
        let (backend, _dir) = create_test_backend();
        for i in 0..3 {
            backend
                .put(&format!("k{i}"), CacheEntry::new("x", Duration::from_secs(60)))
                .await
                .unwrap();
        }
        assert_eq!(backend.stats().await.unwrap().entry_count, 3);
    }
}
