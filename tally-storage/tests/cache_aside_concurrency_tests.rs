//! Concurrency Tests for the Cache-Aside Layer
//!
//! Readers and invalidating writers share one `CacheAside` across worker
//! threads. A load that raced an invalidation may write back an older
//! version; that entry lives at most one TTL. Once writers are quiet, an
//! invalidation must be followed by a fresh load.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tally_storage::{
    CacheAside, CacheBackend, CacheConfig, CacheKey, InMemoryCacheBackend, LmdbCacheBackend,
    ReadOrigin,
};
use tally_test_utils::{EntityIdType, UserId};
use tokio::task::JoinSet;

const TTL: Duration = Duration::from_secs(300);
const READERS: usize = 8;
const WRITERS: usize = 4;
const ROUNDS: usize = 50;

/// Simulated store: a version number bumped by every write.
#[derive(Default)]
struct VersionedSource {
    version: AtomicU64,
    loads: AtomicUsize,
}

impl VersionedSource {
    async fn load(&self) -> Result<u64, String> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        let version = self.version.load(Ordering::SeqCst);
        tokio::task::yield_now().await;
        Ok(version)
    }
}

async fn race_reads_and_invalidations<C>(cache: Arc<CacheAside<C>>)
where
    C: CacheBackend + ?Sized + 'static,
{
    let source = Arc::new(VersionedSource::default());
    let key: String = CacheKey::user_projects(UserId::now_v7()).into();
    let mut tasks = JoinSet::new();

    for _ in 0..READERS {
        let cache = Arc::clone(&cache);
        let source = Arc::clone(&source);
        let key = key.clone();
        tasks.spawn(async move {
            for _ in 0..ROUNDS {
                let value = cache
                    .get_or_load(&key, TTL, || source.load())
                    .await
                    .map_err(|e| format!("read failed: {e}"))?;
                let latest = source.version.load(Ordering::SeqCst);
                if value > latest {
                    return Err(format!("read version {value} ahead of store {latest}"));
                }
                tokio::task::yield_now().await;
            }
            Ok::<(), String>(())
        });
    }

    for _ in 0..WRITERS {
        let cache = Arc::clone(&cache);
        let source = Arc::clone(&source);
        let key = key.clone();
        tasks.spawn(async move {
            for _ in 0..ROUNDS {
                source.version.fetch_add(1, Ordering::SeqCst);
                cache
                    .invalidate(&key)
                    .await
                    .map_err(|e| format!("invalidate failed: {e}"))?;
                tokio::task::yield_now().await;
            }
            Ok::<(), String>(())
        });
    }

    while let Some(joined) = tasks.join_next().await {
        let outcome = joined.expect("task panicked");
        assert_eq!(outcome, Ok(()));
    }

    let expected = (WRITERS * ROUNDS) as u64;
    assert_eq!(source.version.load(Ordering::SeqCst), expected);

    // Quiet period: one more write, then the next read must see it.
    source.version.fetch_add(1, Ordering::SeqCst);
    cache.invalidate(&key).await.unwrap();
    let loads_before = source.loads.load(Ordering::SeqCst);

    let read = cache
        .get_or_load_read(&key, TTL, || source.load())
        .await
        .unwrap();
    assert_eq!(read.origin(), ReadOrigin::Loader);
    assert_eq!(read.into_value(), expected + 1);
    assert_eq!(source.loads.load(Ordering::SeqCst), loads_before + 1);

    let cached = cache
        .get_or_load_read(&key, TTL, || source.load())
        .await
        .unwrap();
    assert_eq!(cached.origin(), ReadOrigin::Cache);
    assert_eq!(cached.into_value(), expected + 1);

    let stats = cache.stats().await;
    assert_eq!(stats.fallbacks, 0);
    assert_eq!(stats.invalidations, expected + 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_reads_and_invalidations_in_memory() {
    let cache = Arc::new(CacheAside::new(
        Arc::new(InMemoryCacheBackend::new()),
        CacheConfig::default(),
    ));
    race_reads_and_invalidations(cache).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_reads_and_invalidations_lmdb() {
    let dir = tempfile::tempdir().unwrap();
    let backend = LmdbCacheBackend::new(dir.path(), 16).unwrap();
    let cache = Arc::new(CacheAside::new(Arc::new(backend), CacheConfig::default()));
    race_reads_and_invalidations(cache).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_readers_of_distinct_keys_stay_isolated() {
    let cache = Arc::new(CacheAside::new(
        Arc::new(InMemoryCacheBackend::new()),
        CacheConfig::default(),
    ));
    let mut tasks = JoinSet::new();

    for owner in 0..READERS as u64 {
        let cache = Arc::clone(&cache);
        tasks.spawn(async move {
            let key: String = CacheKey::user_transactions(UserId::now_v7()).into();
            for _ in 0..ROUNDS {
                let value = cache
                    .get_or_load(&key, TTL, || async move { Ok::<_, String>(owner) })
                    .await?;
                if value != owner {
                    return Err(format!("key of owner {owner} returned {value}"));
                }
            }
            Ok::<(), String>(())
        });
    }

    while let Some(joined) = tasks.join_next().await {
        assert_eq!(joined.expect("task panicked"), Ok(()));
    }

    let stats = cache.stats().await;
    assert_eq!(stats.misses, READERS as u64);
    assert_eq!(stats.hits, (READERS * (ROUNDS - 1)) as u64);
}
