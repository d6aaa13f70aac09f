//! Async store trait for the authoritative data.
//!
//! Every read and write in the service goes through `FinanceStore`; the cache
//! layer only ever sits in front of it. Implementations must be safe to share
//! across tasks.

use async_trait::async_trait;
use tally_core::{
    Project, ProjectId, TallyResult, Transaction, TransactionId, TransactionKind, User, UserId,
};

/// Partial update for a transaction.
///
/// `None` keeps the stored value (COALESCE semantics), so a description can
/// be changed but not cleared.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TransactionUpdate {
    /// New amount
    pub amount: Option<f64>,
    /// New category
    pub category: Option<String>,
    /// New description
    pub description: Option<String>,
    /// New kind
    pub kind: Option<TransactionKind>,
}

impl TransactionUpdate {
    /// True when no field would change.
    pub fn is_empty(&self) -> bool {
        self.amount.is_none()
            && self.category.is_none()
            && self.description.is_none()
            && self.kind.is_none()
    }

    /// Apply the update to a transaction in place.
    pub fn apply_to(&self, t: &mut Transaction) {
        if let Some(amount) = self.amount {
            t.amount = amount;
        }
        if let Some(category) = &self.category {
            t.category = category.clone();
        }
        if let Some(description) = &self.description {
            t.description = Some(description.clone());
        }
        if let Some(kind) = self.kind {
            t.kind = kind;
        }
    }
}

/// Authoritative store for users, projects and transactions.
#[async_trait]
pub trait FinanceStore: Send + Sync {
    // ========================================================================
    // USER OPERATIONS
    // ========================================================================

    /// Insert a user. A duplicate email is a `StorageError::Conflict`.
    async fn user_insert(&self, user: &User) -> TallyResult<()>;

    /// Look a user up by email.
    async fn user_get_by_email(&self, email: &str) -> TallyResult<Option<User>>;

    // ========================================================================
    // PROJECT OPERATIONS
    // ========================================================================

    /// Insert a project. The owning user must exist.
    async fn project_insert(&self, project: &Project) -> TallyResult<()>;

    /// Get a project by ID.
    async fn project_get(&self, id: ProjectId) -> TallyResult<Option<Project>>;

    /// Owning user of a project.
    async fn project_owner(&self, id: ProjectId) -> TallyResult<Option<UserId>>;

    /// All projects of a user, newest first.
    async fn project_list_by_user(&self, user_id: UserId) -> TallyResult<Vec<Project>>;

    // ========================================================================
    // TRANSACTION OPERATIONS
    // ========================================================================

    /// Insert a transaction. The owning project must exist.
    async fn transaction_insert(&self, t: &Transaction) -> TallyResult<()>;

    /// Get a transaction by ID.
    async fn transaction_get(&self, id: TransactionId) -> TallyResult<Option<Transaction>>;

    /// Owning user of a transaction, through its project.
    async fn transaction_owner(&self, id: TransactionId) -> TallyResult<Option<UserId>>;

    /// Apply a partial update. Returns the updated row, or `None` if the
    /// transaction does not exist.
    async fn transaction_update(
        &self,
        id: TransactionId,
        update: &TransactionUpdate,
    ) -> TallyResult<Option<Transaction>>;

    /// Delete a transaction. Returns whether a row was removed.
    async fn transaction_delete(&self, id: TransactionId) -> TallyResult<bool>;

    /// Transactions of one project, newest first.
    async fn transaction_list_by_project(
        &self,
        project_id: ProjectId,
    ) -> TallyResult<Vec<Transaction>>;

    /// Transactions across every project of a user, newest first.
    async fn transaction_list_by_user(&self, user_id: UserId) -> TallyResult<Vec<Transaction>>;

    // ========================================================================
    // HEALTH
    // ========================================================================

    /// Cheap liveness probe of the store.
    async fn ping(&self) -> TallyResult<()>;
}
