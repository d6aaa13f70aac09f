//! Cached Database Client
//!
//! `CachedDbClient` is the read/write coordinator every resolver goes
//! through. Owner-scoped list reads are served cache-aside; writes go to the
//! store and then invalidate exactly the keys they made stale:
//!
//! | operation            | cache key touched               |
//! |----------------------|---------------------------------|
//! | `my_projects`        | reads `projects:{user}`         |
//! | `user_transactions`  | reads `transactions:user:{user}`|
//! | `create_project`     | drops `projects:{user}`         |
//! | transaction writes   | drops `transactions:user:{owner}` |
//!
//! Per-project transaction lists and project stats always read the store.
//! Invalidation outcomes are explicit `Result`s settled by the configured
//! [`InvalidationPolicy`].

use std::sync::Arc;

use chrono::Utc;
use tally_core::{
    compute_stats, is_valid_magnitude, AuthError, EntityIdType, EntityType, InvalidationError,
    LedgerEntry, Project, ProjectId, ProjectStats, TallyError, TallyResult, Transaction,
    TransactionId, TransactionKind, User, UserId, ValidationError,
};
use tally_storage::{CacheAside, CacheBackend, CacheKey, CacheStats, FinanceStore, TransactionUpdate};

use crate::config::InvalidationPolicy;
use crate::password::{hash_password, verify_password, MIN_PASSWORD_LEN};

/// The cache layer as the API uses it: medium chosen at startup.
pub type ApiCache = CacheAside<dyn CacheBackend>;

/// Input for creating a transaction.
#[derive(Debug, Clone, PartialEq)]
pub struct NewTransaction {
    pub project_id: ProjectId,
    pub amount: f64,
    pub kind: TransactionKind,
    pub category: String,
    pub description: Option<String>,
}

// ============================================================================
// VALIDATION
// ============================================================================

fn required(field: &str, value: &str) -> TallyResult<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(TallyError::Validation(ValidationError::RequiredFieldMissing {
            field: field.to_string(),
        }));
    }
    Ok(trimmed.to_string())
}

fn magnitude(field: &str, value: f64) -> TallyResult<f64> {
    if !is_valid_magnitude(value) {
        return Err(TallyError::invalid_value(
            field,
            format!("{} is not a finite, non-negative number", value),
        ));
    }
    Ok(value)
}

fn normalize_email(email: &str) -> TallyResult<String> {
    let email = required("email", email)?.to_lowercase();
    if !email.contains('@') {
        return Err(TallyError::invalid_value("email", "must contain '@'"));
    }
    Ok(email)
}

// ============================================================================
// CACHED DATABASE CLIENT
// ============================================================================

/// Read/write coordinator over a [`FinanceStore`] and an [`ApiCache`].
#[derive(Clone)]
pub struct CachedDbClient {
    store: Arc<dyn FinanceStore>,
    cache: Arc<ApiCache>,
    policy: InvalidationPolicy,
}

impl CachedDbClient {
    pub fn new(store: Arc<dyn FinanceStore>, cache: Arc<ApiCache>, policy: InvalidationPolicy) -> Self {
        Self {
            store,
            cache,
            policy,
        }
    }

    /// Get the underlying store.
    pub fn store(&self) -> &dyn FinanceStore {
        self.store.as_ref()
    }

    /// Get the cache layer.
    pub fn cache(&self) -> &ApiCache {
        &self.cache
    }

    pub fn policy(&self) -> InvalidationPolicy {
        self.policy
    }

    // ========================================================================
    // READS
    // ========================================================================

    /// Projects owned by `user_id`, newest first. Cached under `projects:{user}`.
    pub async fn my_projects(&self, user_id: UserId) -> TallyResult<Vec<Project>> {
        let key = CacheKey::user_projects(user_id);
        let ttl = self.cache.config().project_list_ttl;
        self.cache
            .get_or_load(key.as_str(), ttl, || self.store.project_list_by_user(user_id))
            .await
    }

    /// Transactions across all of a user's projects, newest first. Cached
    /// under `transactions:user:{user}`.
    pub async fn user_transactions(&self, user_id: UserId) -> TallyResult<Vec<Transaction>> {
        let key = CacheKey::user_transactions(user_id);
        let ttl = self.cache.config().user_transactions_ttl;
        self.cache
            .get_or_load(key.as_str(), ttl, || self.store.transaction_list_by_user(user_id))
            .await
    }

    /// Transactions of one project, newest first. Never cached.
    pub async fn project_transactions(&self, project_id: ProjectId) -> TallyResult<Vec<Transaction>> {
        self.store.transaction_list_by_project(project_id).await
    }

    /// Balance and budget progress of a project, from the uncached
    /// per-project transaction list.
    pub async fn project_stats(&self, project_id: ProjectId) -> TallyResult<ProjectStats> {
        let project = self
            .store
            .project_get(project_id)
            .await?
            .ok_or_else(|| TallyError::not_found(EntityType::Project, project_id))?;
        let transactions = self.store.transaction_list_by_project(project_id).await?;
        Ok(compute_stats(
            project.budget,
            transactions.iter().map(LedgerEntry::from),
        )?)
    }

    // ========================================================================
    // WRITES
    // ========================================================================

    pub async fn create_project(&self, user_id: UserId, name: &str, budget: f64) -> TallyResult<Project> {
        let project = Project {
            project_id: ProjectId::now_v7(),
            user_id,
            name: required("name", name)?,
            budget: magnitude("budget", budget)?,
            created_at: Utc::now(),
        };
        self.store.project_insert(&project).await?;
        tracing::debug!(project_id = %project.project_id, user_id = %user_id, "project created");

        let outcome = self.invalidate(CacheKey::user_projects(user_id)).await;
        self.settle(outcome)?;
        Ok(project)
    }

    pub async fn create_transaction(&self, input: NewTransaction) -> TallyResult<Transaction> {
        let transaction = Transaction {
            transaction_id: TransactionId::now_v7(),
            project_id: input.project_id,
            amount: magnitude("amount", input.amount)?,
            kind: input.kind,
            category: required("category", &input.category)?,
            description: input.description,
            created_at: Utc::now(),
        };
        self.store.transaction_insert(&transaction).await?;
        tracing::debug!(
            transaction_id = %transaction.transaction_id,
            project_id = %transaction.project_id,
            "transaction created"
        );

        let outcome = self.invalidate_project_owner(transaction.project_id).await;
        self.settle(outcome)?;
        Ok(transaction)
    }

    /// Partial update; fields left `None` keep their stored value.
    pub async fn update_transaction(
        &self,
        id: TransactionId,
        mut update: TransactionUpdate,
    ) -> TallyResult<Transaction> {
        if let Some(amount) = update.amount {
            update.amount = Some(magnitude("amount", amount)?);
        }
        if let Some(category) = update.category.take() {
            update.category = Some(required("category", &category)?);
        }

        let updated = self
            .store
            .transaction_update(id, &update)
            .await?
            .ok_or_else(|| TallyError::not_found(EntityType::Transaction, id))?;

        let outcome = self.invalidate_project_owner(updated.project_id).await;
        self.settle(outcome)?;
        Ok(updated)
    }

    /// Delete a transaction. The owner is resolved first because the row
    /// that links it to a user is gone afterwards.
    pub async fn delete_transaction(&self, id: TransactionId) -> TallyResult<bool> {
        let owner = match self.store.transaction_owner(id).await {
            Ok(Some(user_id)) => Ok(user_id),
            Ok(None) => Err(InvalidationError::OwnerResolution {
                entity_type: EntityType::Transaction,
                id: id.as_uuid(),
                source: Box::new(TallyError::not_found(EntityType::Transaction, id)),
            }),
            Err(e) => {
                tracing::warn!(transaction_id = %id, error = %e, "owner lookup failed, deleting without invalidation");
                Err(InvalidationError::OwnerResolution {
                    entity_type: EntityType::Transaction,
                    id: id.as_uuid(),
                    source: Box::new(e),
                })
            }
        };

        if !self.store.transaction_delete(id).await? {
            return Err(TallyError::not_found(EntityType::Transaction, id));
        }
        tracing::debug!(transaction_id = %id, "transaction deleted");

        let outcome = match owner {
            Ok(user_id) => self.invalidate(CacheKey::user_transactions(user_id)).await,
            Err(e) => Err(e),
        };
        self.settle(outcome)?;
        Ok(true)
    }

    // ========================================================================
    // USERS
    // ========================================================================

    pub async fn register(&self, name: &str, email: &str, password: &str) -> TallyResult<User> {
        let name = required("name", name)?;
        if password.chars().count() < MIN_PASSWORD_LEN {
            return Err(TallyError::invalid_value(
                "password",
                format!("must be at least {} characters", MIN_PASSWORD_LEN),
            ));
        }
        let user = User {
            user_id: UserId::now_v7(),
            email: normalize_email(email)?,
            name,
            password_hash: hash_password(password),
            created_at: Utc::now(),
        };
        self.store.user_insert(&user).await?;
        tracing::info!(user_id = %user.user_id, "user registered");
        Ok(user)
    }

    pub async fn login(&self, email: &str, password: &str) -> TallyResult<User> {
        let email = normalize_email(email)?;
        let user = self
            .store
            .user_get_by_email(&email)
            .await?
            .ok_or_else(|| TallyError::not_found_by(EntityType::User, "email", email.clone()))?;

        if !verify_password(password, &user.password_hash) {
            return Err(TallyError::Auth(AuthError::InvalidCredentials { email }));
        }
        Ok(user)
    }

    // ========================================================================
    // HEALTH
    // ========================================================================

    pub async fn cache_stats(&self) -> CacheStats {
        self.cache.stats().await
    }

    pub async fn ping(&self) -> TallyResult<()> {
        self.store.ping().await
    }

    // ========================================================================
    // INVALIDATION
    // ========================================================================

    async fn invalidate(&self, key: CacheKey) -> Result<(), InvalidationError> {
        self.cache
            .invalidate(key.as_str())
            .await
            .map_err(|source| InvalidationError::Delete {
                key: key.to_string(),
                source,
            })
    }

    /// Drop the owner's transaction list for a project's transactions.
    async fn invalidate_project_owner(&self, project_id: ProjectId) -> Result<(), InvalidationError> {
        let resolution_error = |source: TallyError| InvalidationError::OwnerResolution {
            entity_type: EntityType::Project,
            id: project_id.as_uuid(),
            source: Box::new(source),
        };

        let owner = self
            .store
            .project_owner(project_id)
            .await
            .map_err(resolution_error)?
            .ok_or_else(|| resolution_error(TallyError::not_found(EntityType::Project, project_id)))?;

        self.invalidate(CacheKey::user_transactions(owner)).await
    }

    /// Apply the invalidation policy. The write has already committed.
    fn settle(&self, outcome: Result<(), InvalidationError>) -> TallyResult<()> {
        match (outcome, self.policy) {
            (Ok(()), _) => Ok(()),
            (Err(e), InvalidationPolicy::Lenient) => {
                tracing::warn!(error = %e, "cache invalidation failed, stale entries expire by TTL");
                Ok(())
            }
            (Err(e), InvalidationPolicy::Strict) => {
                tracing::warn!(error = %e, "cache invalidation failed after commit");
                Err(e.into())
            }
        }
    }
}
