//! Error types for Tally operations

use crate::{EntityType, TransactionKind};
use thiserror::Error;
use uuid::Uuid;

/// Storage layer errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StorageError {
    #[error("Entity not found: {entity_type:?} with id {id}")]
    NotFound { entity_type: EntityType, id: Uuid },

    #[error("Entity not found: {entity_type:?} with {field} {value}")]
    NotFoundBy {
        entity_type: EntityType,
        field: String,
        value: String,
    },

    #[error("Conflict on {entity_type:?}: {reason}")]
    Conflict { entity_type: EntityType, reason: String },

    #[error("Insert failed for {entity_type:?}: {reason}")]
    InsertFailed { entity_type: EntityType, reason: String },

    #[error("Storage backend failure: {reason}")]
    Backend { reason: String },

    /// The store cannot hand out a connection right now (pool exhausted or
    /// closed). Transient; callers may retry later.
    #[error("Storage unavailable: {reason}")]
    Unavailable { reason: String },

    #[error("Storage lock poisoned")]
    LockPoisoned,
}

/// Cache medium errors.
///
/// These never reach a caller of the cache-aside layer; they are recovered by
/// falling back to the authoritative store.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CacheError {
    #[error("Cache unavailable: {reason}")]
    Unavailable { reason: String },

    #[error("Cache serialization failed for {key}: {reason}")]
    Serialization { key: String, reason: String },
}

/// Metrics engine input errors.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum MetricsError {
    #[error("Invalid amount {amount}: must be a finite, non-negative number")]
    InvalidAmount { amount: f64 },

    #[error("Invalid budget {budget}: must be a finite, non-negative number")]
    InvalidBudget { budget: f64 },

    /// Individually valid amounts whose sum is no longer a finite number.
    #[error("{kind} total overflows after adding {amount}")]
    TotalOverflow { kind: TransactionKind, amount: f64 },
}

/// Validation errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Required field missing: {field}")]
    RequiredFieldMissing { field: String },

    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },
}

/// Configuration errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid value for {field}: {value} - {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },
}

/// Authentication errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AuthError {
    #[error("Invalid credentials for {email}")]
    InvalidCredentials { email: String },
}

/// Failure to invalidate the cache entries a write made stale.
///
/// Writes never fail because of this under the default policy; the outcome is
/// returned explicitly so the caller decides whether to log or surface it.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum InvalidationError {
    #[error("Could not resolve owner of {entity_type:?} {id}: {source}")]
    OwnerResolution {
        entity_type: EntityType,
        id: Uuid,
        source: Box<TallyError>,
    },

    #[error("Could not invalidate cache key {key}: {source}")]
    Delete { key: String, source: CacheError },
}

/// Master error type for all Tally errors.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum TallyError {
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),

    #[error("Metrics error: {0}")]
    Metrics(#[from] MetricsError),

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    #[error("Auth error: {0}")]
    Auth(#[from] AuthError),

    #[error("Invalidation error: {0}")]
    Invalidation(#[from] InvalidationError),
}

/// Result type alias for Tally operations.
pub type TallyResult<T> = Result<T, TallyError>;

impl TallyError {
    /// Shorthand for a missing row.
    pub fn not_found(entity_type: EntityType, id: impl Into<Uuid>) -> Self {
        TallyError::Storage(StorageError::NotFound {
            entity_type,
            id: id.into(),
        })
    }

    /// Shorthand for an invalid field value.
    pub fn invalid_value(field: &str, reason: impl Into<String>) -> Self {
        TallyError::Validation(ValidationError::InvalidValue {
            field: field.to_string(),
            reason: reason.into(),
        })
    }

    /// Shorthand for a missing row looked up by a non-key field.
    pub fn not_found_by(entity_type: EntityType, field: &str, value: impl Into<String>) -> Self {
        TallyError::Storage(StorageError::NotFoundBy {
            entity_type,
            field: field.to_string(),
            value: value.into(),
        })
    }

    /// Returns true if this error denotes a missing row.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            TallyError::Storage(StorageError::NotFound { .. } | StorageError::NotFoundBy { .. })
        )
    }
}

// =============================================================================
// TESTS
// =============================================================================
