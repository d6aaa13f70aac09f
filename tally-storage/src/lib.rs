//! Tally Storage - Store Trait, Mock Implementation and Cache Layer
//!
//! Defines the authoritative store abstraction and the cache-aside layer that
//! sits in front of it. The PostgreSQL implementation lives in tally-api.

pub mod cache;
pub mod store;

pub use cache::{
    CacheAside, CacheBackend, CacheConfig, CacheEntry, CacheKey, CacheRead, CacheStats,
    InMemoryCacheBackend, LmdbCacheBackend, LmdbCacheError, ReadOrigin,
};
pub use store::{FinanceStore, TransactionUpdate};

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tally_core::{
    EntityType, Project, ProjectId, StorageError, TallyError, TallyResult, Transaction,
    TransactionId, User, UserId,
};

// ============================================================================
// MOCK STORAGE
// ============================================================================

/// Row plus its insertion sequence, used to break created_at ties so list
/// order is stable.
#[derive(Debug, Clone)]
struct Row<T> {
    seq: u64,
    value: T,
}

/// In-memory store for tests and local runs.
///
/// Enforces the same foreign keys as the database schema: a project needs an
/// existing user and a transaction needs an existing project.
#[derive(Debug, Default)]
pub struct MockStorage {
    users: Arc<RwLock<HashMap<UserId, User>>>,
    projects: Arc<RwLock<HashMap<ProjectId, Row<Project>>>>,
    transactions: Arc<RwLock<HashMap<TransactionId, Row<Transaction>>>>,
    sequence: AtomicU64,
}

fn read<T>(lock: &RwLock<T>) -> TallyResult<RwLockReadGuard<'_, T>> {
    lock.read()
        .map_err(|_| TallyError::Storage(StorageError::LockPoisoned))
}

fn write<T>(lock: &RwLock<T>) -> TallyResult<RwLockWriteGuard<'_, T>> {
    lock.write()
        .map_err(|_| TallyError::Storage(StorageError::LockPoisoned))
}

/// Newest first; later inserts win ties.
fn newest_first<T: Clone>(mut rows: Vec<&Row<T>>, created_at: impl Fn(&T) -> tally_core::Timestamp) -> Vec<T> {
    rows.sort_by(|a, b| {
        created_at(&b.value)
            .cmp(&created_at(&a.value))
            .then(b.seq.cmp(&a.seq))
    });
    rows.into_iter().map(|r| r.value.clone()).collect()
}

impl MockStorage {
    /// Create a new mock storage.
    pub fn new() -> Self {
        Self::default()
    }

    fn next_seq(&self) -> u64 {
        self.sequence.fetch_add(1, Ordering::Relaxed)
    }

    /// Get count of stored users.
    pub fn user_count(&self) -> usize {
        self.users.read().map(|m| m.len()).unwrap_or(0)
    }

    /// Get count of stored projects.
    pub fn project_count(&self) -> usize {
        self.projects.read().map(|m| m.len()).unwrap_or(0)
    }

    /// Get count of stored transactions.
    pub fn transaction_count(&self) -> usize {
        self.transactions.read().map(|m| m.len()).unwrap_or(0)
    }

    fn owner_of_project(&self, id: ProjectId) -> TallyResult<Option<UserId>> {
        Ok(read(&self.projects)?.get(&id).map(|r| r.value.user_id))
    }
}

#[async_trait]
impl FinanceStore for MockStorage {
    // === User Operations ===

    async fn user_insert(&self, user: &User) -> TallyResult<()> {
        let mut users = write(&self.users)?;
        if users.contains_key(&user.user_id) {
            return Err(TallyError::Storage(StorageError::InsertFailed {
                entity_type: EntityType::User,
                reason: "already exists".to_string(),
            }));
        }
        if users.values().any(|u| u.email == user.email) {
            return Err(TallyError::Storage(StorageError::Conflict {
                entity_type: EntityType::User,
                reason: format!("email {} is already registered", user.email),
            }));
        }
        users.insert(user.user_id, user.clone());
        Ok(())
    }

    async fn user_get_by_email(&self, email: &str) -> TallyResult<Option<User>> {
        Ok(read(&self.users)?
            .values()
            .find(|u| u.email == email)
            .cloned())
    }

    // === Project Operations ===

    async fn project_insert(&self, project: &Project) -> TallyResult<()> {
        if !read(&self.users)?.contains_key(&project.user_id) {
            return Err(TallyError::not_found(EntityType::User, project.user_id));
        }

        let mut projects = write(&self.projects)?;
        if projects.contains_key(&project.project_id) {
            return Err(TallyError::Storage(StorageError::InsertFailed {
                entity_type: EntityType::Project,
                reason: "already exists".to_string(),
            }));
        }
        let seq = self.next_seq();
        projects.insert(
            project.project_id,
            Row {
                seq,
                value: project.clone(),
            },
        );
        Ok(())
    }

    async fn project_get(&self, id: ProjectId) -> TallyResult<Option<Project>> {
        Ok(read(&self.projects)?.get(&id).map(|r| r.value.clone()))
    }

    async fn project_owner(&self, id: ProjectId) -> TallyResult<Option<UserId>> {
        self.owner_of_project(id)
    }

    async fn project_list_by_user(&self, user_id: UserId) -> TallyResult<Vec<Project>> {
        let projects = read(&self.projects)?;
        let rows = projects
            .values()
            .filter(|r| r.value.user_id == user_id)
            .collect();
        Ok(newest_first(rows, |p: &Project| p.created_at))
    }

    // === Transaction Operations ===

    async fn transaction_insert(&self, t: &Transaction) -> TallyResult<()> {
        if !read(&self.projects)?.contains_key(&t.project_id) {
            return Err(TallyError::not_found(EntityType::Project, t.project_id));
        }

        let mut transactions = write(&self.transactions)?;
        if transactions.contains_key(&t.transaction_id) {
            return Err(TallyError::Storage(StorageError::InsertFailed {
                entity_type: EntityType::Transaction,
                reason: "already exists".to_string(),
            }));
        }
        let seq = self.next_seq();
        transactions.insert(
            t.transaction_id,
            Row {
                seq,
                value: t.clone(),
            },
        );
        Ok(())
    }

    async fn transaction_get(&self, id: TransactionId) -> TallyResult<Option<Transaction>> {
        Ok(read(&self.transactions)?.get(&id).map(|r| r.value.clone()))
    }

    async fn transaction_owner(&self, id: TransactionId) -> TallyResult<Option<UserId>> {
        let project_id = match read(&self.transactions)?.get(&id) {
            Some(row) => row.value.project_id,
            None => return Ok(None),
        };
        self.owner_of_project(project_id)
    }

    async fn transaction_update(
        &self,
        id: TransactionId,
        update: &TransactionUpdate,
    ) -> TallyResult<Option<Transaction>> {
        let mut transactions = write(&self.transactions)?;
        Ok(transactions.get_mut(&id).map(|row| {
            update.apply_to(&mut row.value);
            row.value.clone()
        }))
    }

    async fn transaction_delete(&self, id: TransactionId) -> TallyResult<bool> {
        Ok(write(&self.transactions)?.remove(&id).is_some())
    }

    async fn transaction_list_by_project(
        &self,
        project_id: ProjectId,
    ) -> TallyResult<Vec<Transaction>> {
        let transactions = read(&self.transactions)?;
        let rows = transactions
            .values()
            .filter(|r| r.value.project_id == project_id)
            .collect();
        Ok(newest_first(rows, |t: &Transaction| t.created_at))
    }

    async fn transaction_list_by_user(&self, user_id: UserId) -> TallyResult<Vec<Transaction>> {
        let owned: Vec<ProjectId> = read(&self.projects)?
            .values()
            .filter(|r| r.value.user_id == user_id)
            .map(|r| r.value.project_id)
            .collect();

        let transactions = read(&self.transactions)?;
        let rows = transactions
            .values()
            .filter(|r| owned.contains(&r.value.project_id))
            .collect();
        Ok(newest_first(rows, |t: &Transaction| t.created_at))
    }

    async fn ping(&self) -> TallyResult<()> {
        read(&self.users).map(|_| ())
    }
}
