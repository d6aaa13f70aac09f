//! Property-Based Tests for the Cache-Aside Layer
//!
//! **Property 1: Single load within TTL**
//! Reading a key twice inside its TTL without invalidation calls the loader
//! at most once and returns identical values.
//!
//! **Property 2: Invalidation forces a reload**
//! After `invalidate(key)` the next read calls the loader again and returns
//! its new value; other keys are untouched.
//!
//! **Property 3: Degradation is transparent**
//! With a medium that fails every call, every read returns exactly what the
//! loader produced.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use proptest::prelude::*;
use tally_storage::{CacheAside, CacheConfig, InMemoryCacheBackend};
use tally_test_utils::generators::{arb_cache_key, arb_payload};
use tally_test_utils::FailingCacheBackend;
use tokio::runtime::Runtime;

// ============================================================================
// TEST CONFIGURATION
// ============================================================================

const TTL: Duration = Duration::from_secs(300);

fn test_runtime() -> Result<Runtime, TestCaseError> {
    Runtime::new().map_err(|e| TestCaseError::fail(format!("Failed to create runtime: {}", e)))
}

// ============================================================================
// PROPERTY TESTS
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_second_read_within_ttl_skips_loader(
        reads in prop::collection::vec((arb_cache_key(), arb_payload()), 1..20),
    ) {
        let rt = test_runtime()?;
        rt.block_on(async {
            let cache = CacheAside::new(Arc::new(InMemoryCacheBackend::new()), CacheConfig::default());
            let calls = AtomicUsize::new(0);
            let mut first_seen: HashMap<String, Vec<i64>> = HashMap::new();

            for (key, payload) in &reads {
                let value: Vec<i64> = cache
                    .get_or_load(key, TTL, || async {
                        calls.fetch_add(1, Ordering::SeqCst);
                        Ok::<_, String>(payload.clone())
                    })
                    .await
                    .map_err(TestCaseError::fail)?;

                let expected = first_seen.entry(key.clone()).or_insert_with(|| payload.clone());
                prop_assert_eq!(&value, &*expected);
            }

            prop_assert_eq!(calls.load(Ordering::SeqCst), first_seen.len());
            Ok::<(), TestCaseError>(())
        })?;
    }

    #[test]
    fn prop_invalidate_forces_reload(
        key in arb_cache_key(),
        other in arb_cache_key(),
        before in arb_payload(),
        after in arb_payload(),
    ) {
        prop_assume!(key != other);
        let rt = test_runtime()?;
        rt.block_on(async {
            let cache = CacheAside::new(Arc::new(InMemoryCacheBackend::new()), CacheConfig::default());

            let load = |v: Vec<i64>| move || async move { Ok::<_, String>(v) };

            cache.get_or_load(&key, TTL, load(before.clone())).await.map_err(TestCaseError::fail)?;
            cache.get_or_load(&other, TTL, load(before.clone())).await.map_err(TestCaseError::fail)?;

            cache.invalidate(&key).await.map_err(|e| TestCaseError::fail(e.to_string()))?;

            let reloaded = cache.get_or_load(&key, TTL, load(after.clone())).await.map_err(TestCaseError::fail)?;
            prop_assert_eq!(reloaded, after.clone());

            let untouched = cache.get_or_load(&other, TTL, load(after.clone())).await.map_err(TestCaseError::fail)?;
            prop_assert_eq!(untouched, before.clone());
            Ok::<(), TestCaseError>(())
        })?;
    }

    #[test]
    fn prop_failing_medium_returns_loader_value(
        reads in prop::collection::vec((arb_cache_key(), arb_payload()), 1..10),
    ) {
        let rt = test_runtime()?;
        rt.block_on(async {
            let cache = CacheAside::new(Arc::new(FailingCacheBackend::always()), CacheConfig::default());
            for (key, payload) in &reads {
                let value = cache
                    .get_or_load(key, TTL, || async { Ok::<_, String>(payload.clone()) })
                    .await
                    .map_err(TestCaseError::fail)?;
                prop_assert_eq!(&value, payload);
            }
            prop_assert_eq!(cache.stats().await.fallbacks, reads.len() as u64);
            Ok::<(), TestCaseError>(())
        })?;
    }
}
