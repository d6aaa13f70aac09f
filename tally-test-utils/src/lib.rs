//! Tally Test Utilities
//!
//! Shared test infrastructure for the Tally workspace:
//! - Proptest generators for amounts, kinds, ledgers and budgets
//! - Fault-injecting doubles for the store and the cache medium
//! - Fixtures for a seeded user with a project
//! - Assertions over `TallyResult`

// Re-export mock storage from its source crate
pub use tally_storage::MockStorage;

// Re-export core types for convenience
pub use tally_core::{
    EntityIdType, EntityType, LedgerEntry, Project, ProjectId, StorageError, TallyError,
    TallyResult, Timestamp, Transaction, TransactionId, TransactionKind, User, UserId,
};

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tally_core::CacheError;
use tally_storage::{
    CacheBackend, CacheEntry, CacheStats, FinanceStore, InMemoryCacheBackend, TransactionUpdate,
};

// ============================================================================
// FAULT-INJECTING STORE
// ============================================================================

/// Store wrapper that counts list queries and can fail on demand.
///
/// Wraps a shared [`MockStorage`], so tests can seed data directly through
/// [`CountingStore::inner`] without bumping the counters.
#[derive(Debug, Clone, Default)]
pub struct CountingStore {
    inner: Arc<MockStorage>,
    project_lists: Arc<AtomicUsize>,
    user_transaction_lists: Arc<AtomicUsize>,
    project_transaction_lists: Arc<AtomicUsize>,
    fail_owner_lookups: Arc<AtomicBool>,
    fail_list_reads: Arc<AtomicBool>,
}

impl CountingStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// The wrapped store.
    pub fn inner(&self) -> &MockStorage {
        &self.inner
    }

    /// Number of `project_list_by_user` calls.
    pub fn project_list_calls(&self) -> usize {
        self.project_lists.load(Ordering::SeqCst)
    }

    /// Number of `transaction_list_by_user` calls.
    pub fn user_transaction_list_calls(&self) -> usize {
        self.user_transaction_lists.load(Ordering::SeqCst)
    }

    /// Number of `transaction_list_by_project` calls.
    pub fn project_transaction_list_calls(&self) -> usize {
        self.project_transaction_lists.load(Ordering::SeqCst)
    }

    /// Make `project_owner` and `transaction_owner` fail.
    pub fn fail_owner_lookups(&self, fail: bool) {
        self.fail_owner_lookups.store(fail, Ordering::SeqCst);
    }

    /// Make every list query fail.
    pub fn fail_list_reads(&self, fail: bool) {
        self.fail_list_reads.store(fail, Ordering::SeqCst);
    }

    fn injected(operation: &str) -> TallyError {
        TallyError::Storage(StorageError::Backend {
            reason: format!("injected failure in {operation}"),
        })
    }

    fn check_owner_lookup(&self) -> TallyResult<()> {
        if self.fail_owner_lookups.load(Ordering::SeqCst) {
            return Err(Self::injected("owner lookup"));
        }
        Ok(())
    }

    fn check_list_read(&self, counter: &AtomicUsize) -> TallyResult<()> {
        counter.fetch_add(1, Ordering::SeqCst);
        if self.fail_list_reads.load(Ordering::SeqCst) {
            return Err(Self::injected("list read"));
        }
        Ok(())
    }
}

#[async_trait]
impl FinanceStore for CountingStore {
    async fn user_insert(&self, user: &User) -> TallyResult<()> {
        self.inner.user_insert(user).await
    }

    async fn user_get_by_email(&self, email: &str) -> TallyResult<Option<User>> {
        self.inner.user_get_by_email(email).await
    }

    async fn project_insert(&self, project: &Project) -> TallyResult<()> {
        self.inner.project_insert(project).await
    }

    async fn project_get(&self, id: ProjectId) -> TallyResult<Option<Project>> {
        self.inner.project_get(id).await
    }

    async fn project_owner(&self, id: ProjectId) -> TallyResult<Option<UserId>> {
        self.check_owner_lookup()?;
        self.inner.project_owner(id).await
    }

    async fn project_list_by_user(&self, user_id: UserId) -> TallyResult<Vec<Project>> {
        self.check_list_read(&self.project_lists)?;
        self.inner.project_list_by_user(user_id).await
    }

    async fn transaction_insert(&self, t: &Transaction) -> TallyResult<()> {
        self.inner.transaction_insert(t).await
    }

    async fn transaction_get(&self, id: TransactionId) -> TallyResult<Option<Transaction>> {
        self.inner.transaction_get(id).await
    }

    async fn transaction_owner(&self, id: TransactionId) -> TallyResult<Option<UserId>> {
        self.check_owner_lookup()?;
        self.inner.transaction_owner(id).await
    }

    async fn transaction_update(
        &self,
        id: TransactionId,
        update: &TransactionUpdate,
    ) -> TallyResult<Option<Transaction>> {
        self.inner.transaction_update(id, update).await
    }

    async fn transaction_delete(&self, id: TransactionId) -> TallyResult<bool> {
        self.inner.transaction_delete(id).await
    }

    async fn transaction_list_by_project(
        &self,
        project_id: ProjectId,
    ) -> TallyResult<Vec<Transaction>> {
        self.check_list_read(&self.project_transaction_lists)?;
        self.inner.transaction_list_by_project(project_id).await
    }

    async fn transaction_list_by_user(&self, user_id: UserId) -> TallyResult<Vec<Transaction>> {
        self.check_list_read(&self.user_transaction_lists)?;
        self.inner.transaction_list_by_user(user_id).await
    }

    async fn ping(&self) -> TallyResult<()> {
        self.inner.ping().await
    }
}

// ============================================================================
// FAULT-INJECTING CACHE MEDIUM
// ============================================================================

/// In-memory cache medium whose operations can be switched to fail.
#[derive(Debug, Default)]
pub struct FailingCacheBackend {
    inner: InMemoryCacheBackend,
    fail_get: AtomicBool,
    fail_put: AtomicBool,
    fail_delete: AtomicBool,
}

impl FailingCacheBackend {
    /// A healthy medium; switch failures on later.
    pub fn new() -> Self {
        Self::default()
    }

    /// A medium where every operation fails.
    pub fn always() -> Self {
        let backend = Self::default();
        backend.set_fail_get(true);
        backend.set_fail_put(true);
        backend.set_fail_delete(true);
        backend
    }

    pub fn set_fail_get(&self, fail: bool) {
        self.fail_get.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_put(&self, fail: bool) {
        self.fail_put.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_delete(&self, fail: bool) {
        self.fail_delete.store(fail, Ordering::SeqCst);
    }

    fn check(flag: &AtomicBool, operation: &str) -> Result<(), CacheError> {
        if flag.load(Ordering::SeqCst) {
            return Err(CacheError::Unavailable {
                reason: format!("injected {operation} failure"),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl CacheBackend for FailingCacheBackend {
    async fn get(&self, key: &str) -> Result<Option<CacheEntry>, CacheError> {
        Self::check(&self.fail_get, "get")?;
        self.inner.get(key).await
    }

    async fn put(&self, key: &str, entry: CacheEntry) -> Result<(), CacheError> {
        Self::check(&self.fail_put, "put")?;
        self.inner.put(key, entry).await
    }

    async fn delete(&self, key: &str) -> Result<bool, CacheError> {
        Self::check(&self.fail_delete, "delete")?;
        self.inner.delete(key).await
    }

    async fn stats(&self) -> Result<CacheStats, CacheError> {
        self.inner.stats().await
    }
}

// ============================================================================
// PROPTEST GENERATORS
// ============================================================================

pub mod generators {
    //! Proptest strategies for Tally values.

    use super::*;
    use proptest::prelude::*;
    use tally_storage::CacheKey;
    use uuid::Uuid;

    /// Generate a random UUID.
    pub fn arb_uuid() -> impl Strategy<Value = Uuid> {
        any::<[u8; 16]>().prop_map(Uuid::from_bytes)
    }

    pub fn arb_user_id() -> impl Strategy<Value = UserId> {
        arb_uuid().prop_map(UserId::new)
    }

    /// Either owner-scoped cache key for a random user.
    pub fn arb_cache_key() -> impl Strategy<Value = String> {
        (arb_user_id(), any::<bool>()).prop_map(|(user_id, projects)| {
            if projects {
                CacheKey::user_projects(user_id).into()
            } else {
                CacheKey::user_transactions(user_id).into()
            }
        })
    }

    /// Opaque cached payloads.
    pub fn arb_payload() -> impl Strategy<Value = Vec<i64>> {
        prop::collection::vec(any::<i64>(), 0..16)
    }

    /// Non-negative amounts, including whole-cent values and zero.
    pub fn arb_amount() -> impl Strategy<Value = f64> {
        prop_oneof![
            Just(0.0),
            0.0f64..1_000.0,
            1_000.0f64..1_000_000.0,
            (0u32..10_000_000).prop_map(|cents| f64::from(cents) / 100.0),
        ]
    }

    /// Amounts the write boundary must reject.
    pub fn arb_invalid_amount() -> impl Strategy<Value = f64> {
        prop_oneof![
            -1_000_000.0f64..-0.001,
            Just(f64::NAN),
            Just(f64::INFINITY),
            Just(f64::NEG_INFINITY),
        ]
    }

    pub fn arb_kind() -> impl Strategy<Value = TransactionKind> {
        prop_oneof![Just(TransactionKind::Income), Just(TransactionKind::Expense)]
    }

    pub fn arb_ledger_entry() -> impl Strategy<Value = LedgerEntry> {
        (arb_amount(), arb_kind()).prop_map(|(amount, kind)| LedgerEntry { amount, kind })
    }

    pub fn arb_ledger() -> impl Strategy<Value = Vec<LedgerEntry>> {
        prop::collection::vec(arb_ledger_entry(), 0..40)
    }

    /// Budgets including the zero edge case.
    pub fn arb_budget() -> impl Strategy<Value = f64> {
        prop_oneof![Just(0.0), 0.01f64..10.0, 10.0f64..1_000_000.0]
    }
}

// ============================================================================
// TEST FIXTURES
// ============================================================================

pub mod fixtures {
    //! Ready-made entities and seeded stores.

    use super::*;
    use chrono::Utc;

    /// A user with a fixed placeholder digest.
    pub fn user(email: &str) -> User {
        User {
            user_id: UserId::now_v7(),
            email: email.to_string(),
            name: "Test User".to_string(),
            password_hash: "not-a-real-digest".to_string(),
            created_at: Utc::now(),
        }
    }

    pub fn project(user_id: UserId, budget: f64) -> Project {
        Project {
            project_id: ProjectId::now_v7(),
            user_id,
            name: "Test Project".to_string(),
            budget,
            created_at: Utc::now(),
        }
    }

    pub fn transaction(project_id: ProjectId, amount: f64, kind: TransactionKind) -> Transaction {
        Transaction {
            transaction_id: TransactionId::now_v7(),
            project_id,
            amount,
            kind,
            category: "general".to_string(),
            description: None,
            created_at: Utc::now(),
        }
    }

    /// Insert a user owning one project with the given budget.
    pub async fn seed_user_with_project(
        store: &dyn FinanceStore,
        budget: f64,
    ) -> TallyResult<(User, Project)> {
        let user = user(&format!("{}@example.com", UserId::now_v7()));
        store.user_insert(&user).await?;
        let project = project(user.user_id, budget);
        store.project_insert(&project).await?;
        Ok((user, project))
    }
}

// ============================================================================
// CUSTOM ASSERTIONS
// ============================================================================

pub mod assertions {
    //! Assertions over `TallyResult`.

    use super::*;

    /// Assert that a TallyResult is a NotFound storage error.
    #[track_caller]
    pub fn assert_not_found<T: std::fmt::Debug>(result: &TallyResult<T>, entity_type: EntityType) {
        match result {
            Err(TallyError::Storage(
                StorageError::NotFound { entity_type: et, .. }
                | StorageError::NotFoundBy { entity_type: et, .. },
            )) => {
                assert_eq!(*et, entity_type, "Wrong entity type in NotFound error");
            }
            other => panic!("Expected NotFound error for {:?}, got: {:?}", entity_type, other),
        }
    }

    /// Assert that a TallyResult is a Conflict storage error.
    #[track_caller]
    pub fn assert_conflict<T: std::fmt::Debug>(result: &TallyResult<T>) {
        match result {
            Err(TallyError::Storage(StorageError::Conflict { .. })) => {}
            other => panic!("Expected Conflict error, got: {:?}", other),
        }
    }

    /// Assert that a TallyResult is a Validation error.
    #[track_caller]
    pub fn assert_validation_error<T: std::fmt::Debug>(result: &TallyResult<T>) {
        match result {
            Err(TallyError::Validation(_)) => {}
            other => panic!("Expected Validation error, got: {:?}", other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_counting_store_counts_list_reads() {
        let store = CountingStore::new();
        let (user, project) = fixtures::seed_user_with_project(store.inner(), 100.0)
            .await
            .unwrap();

        store.project_list_by_user(user.user_id).await.unwrap();
        store.transaction_list_by_user(user.user_id).await.unwrap();
        store.transaction_list_by_project(project.project_id).await.unwrap();
        store.transaction_list_by_project(project.project_id).await.unwrap();

        assert_eq!(store.project_list_calls(), 1);
        assert_eq!(store.user_transaction_list_calls(), 1);
        assert_eq!(store.project_transaction_list_calls(), 2);
    }

    #[tokio::test]
    async fn test_counting_store_injects_owner_failures() {
        let store = CountingStore::new();
        let (_, project) = fixtures::seed_user_with_project(store.inner(), 100.0)
            .await
            .unwrap();

        store.fail_owner_lookups(true);
        assert!(store.project_owner(project.project_id).await.is_err());

        store.fail_owner_lookups(false);
        assert!(store.project_owner(project.project_id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_failing_backend_switches() {
        let backend = FailingCacheBackend::new();
        let entry = CacheEntry::new("1", std::time::Duration::from_secs(60));
        backend.put("k", entry).await.unwrap();

        backend.set_fail_get(true);
        assert!(backend.get("k").await.is_err());

        backend.set_fail_get(false);
        assert!(backend.get("k").await.unwrap().is_some());

        let always = FailingCacheBackend::always();
        assert!(always.delete("k").await.is_err());
    }
}
