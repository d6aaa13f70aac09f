//! Error Types for the Tally API
//!
//! `ApiError` is the single error shape at the request boundary. Domain
//! errors from tally-core are mapped here; database and pool details are
//! logged and replaced with a generic message before reaching a client.

use async_graphql::ErrorExtensions;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::fmt;
use tally_core::{
    AuthError, ConfigError, InvalidationError, MetricsError, StorageError, TallyError,
    ValidationError,
};

// ============================================================================
// ERROR CODE ENUM
// ============================================================================

/// Error codes for API responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // ========================================================================
    // Authentication Errors (401)
    // ========================================================================
    /// Credentials did not match
    Unauthorized,

    // ========================================================================
    // Validation Errors (400)
    // ========================================================================
    /// Request validation failed
    ValidationFailed,

    /// Request contains invalid input data
    InvalidInput,

    /// Field format is incorrect
    InvalidFormat,

    // ========================================================================
    // Not Found Errors (404)
    // ========================================================================
    /// Requested entity does not exist
    EntityNotFound,

    // ========================================================================
    // Conflict Errors (409)
    // ========================================================================
    /// Entity with the same unique key already exists
    EntityAlreadyExists,

    // ========================================================================
    // Server Errors (500, 503)
    // ========================================================================
    /// Internal server error
    InternalError,

    /// Database operation failed
    DatabaseError,

    /// Store temporarily cannot serve requests
    ServiceUnavailable,
}

impl ErrorCode {
    /// Get the HTTP status code for this error code.
    pub fn status_code(&self) -> StatusCode {
        match self {
            ErrorCode::Unauthorized => StatusCode::UNAUTHORIZED,

            ErrorCode::ValidationFailed | ErrorCode::InvalidInput | ErrorCode::InvalidFormat => {
                StatusCode::BAD_REQUEST
            }

            ErrorCode::EntityNotFound => StatusCode::NOT_FOUND,

            ErrorCode::EntityAlreadyExists => StatusCode::CONFLICT,

            ErrorCode::ServiceUnavailable => StatusCode::SERVICE_UNAVAILABLE,

            ErrorCode::InternalError | ErrorCode::DatabaseError => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Get a default message for this error code.
    pub fn default_message(&self) -> &'static str {
        match self {
            ErrorCode::Unauthorized => "Invalid credentials",
            ErrorCode::ValidationFailed => "Request validation failed",
            ErrorCode::InvalidInput => "Invalid input data",
            ErrorCode::InvalidFormat => "Invalid format",
            ErrorCode::EntityNotFound => "Entity not found",
            ErrorCode::EntityAlreadyExists => "Entity already exists",
            ErrorCode::InternalError => "Internal server error",
            ErrorCode::DatabaseError => "Database operation failed",
            ErrorCode::ServiceUnavailable => "Service temporarily unavailable",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

// ============================================================================
// API ERROR STRUCT
// ============================================================================

/// Structured error response for API operations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiError {
    /// Error code categorizing the error
    pub code: ErrorCode,

    /// Human-readable error message
    pub message: String,

    /// Optional additional details
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ApiError {
    /// Create a new API error with the given code and message.
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: None,
        }
    }

    /// Create a new API error with the given code, using the default message.
    pub fn from_code(code: ErrorCode) -> Self {
        Self::new(code, code.default_message())
    }

    /// Add additional details to the error.
    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    /// Get the HTTP status code for this error.
    pub fn status_code(&self) -> StatusCode {
        self.code.status_code()
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Unauthorized, message)
    }

    pub fn validation_failed(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::ValidationFailed, message)
    }

    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidInput, message)
    }

    /// Create an InvalidFormat error.
    pub fn invalid_format(field: &str, expected: &str) -> Self {
        Self::new(
            ErrorCode::InvalidFormat,
            format!("Field '{}' has invalid format, expected {}", field, expected),
        )
    }

    /// Create an EntityNotFound error.
    pub fn entity_not_found(entity_type: &str, id: impl fmt::Display) -> Self {
        Self::new(
            ErrorCode::EntityNotFound,
            format!("{} with id {} not found", entity_type, id),
        )
    }

    pub fn already_exists(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::EntityAlreadyExists, message)
    }

    pub fn internal_error(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InternalError, message)
    }

    pub fn service_unavailable(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::ServiceUnavailable, message)
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for ApiError {}

// ============================================================================
// AXUM INTEGRATION
// ============================================================================

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        (status, Json(self)).into_response()
    }
}

// ============================================================================
// GRAPHQL INTEGRATION
// ============================================================================

/// Resolver errors carry the code as an extension so clients can branch on it.
impl ErrorExtensions for ApiError {
    fn extend(&self) -> async_graphql::Error {
        let code = self.code.to_string();
        async_graphql::Error::new(self.message.clone()).extend_with(|_, ext| ext.set("code", code))
    }
}

// ============================================================================
// CONVERSIONS FROM DOMAIN ERRORS
// ============================================================================

impl From<TallyError> for ApiError {
    fn from(err: TallyError) -> Self {
        match err {
            TallyError::Storage(e) => e.into(),
            TallyError::Cache(e) => {
                // Cache failures are recovered below this layer; reaching here is a bug.
                tracing::error!(error = %e, "Cache error reached the request boundary");
                ApiError::internal_error("Cache failure")
            }
            TallyError::Metrics(e) => e.into(),
            TallyError::Validation(e) => e.into(),
            TallyError::Config(e) => e.into(),
            TallyError::Auth(e) => e.into(),
            TallyError::Invalidation(e) => e.into(),
        }
    }
}

impl From<StorageError> for ApiError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::NotFound { entity_type, id } => {
                ApiError::entity_not_found(&entity_type.to_string(), id)
            }
            StorageError::NotFoundBy {
                entity_type,
                field,
                value,
            } => ApiError::new(
                ErrorCode::EntityNotFound,
                format!("{} with {} {} not found", entity_type, field, value),
            ),
            StorageError::Conflict { reason, .. } => ApiError::already_exists(reason),
            StorageError::InsertFailed { entity_type, reason } => {
                ApiError::invalid_input(format!("{} could not be created: {}", entity_type, reason))
            }
            StorageError::Backend { reason } => {
                tracing::error!(reason = %reason, "Database error");
                ApiError::from_code(ErrorCode::DatabaseError)
            }
            StorageError::Unavailable { reason } => {
                tracing::warn!(reason = %reason, "Store unavailable");
                ApiError::service_unavailable("Database temporarily unavailable, retry later")
            }
            StorageError::LockPoisoned => {
                tracing::error!("Storage lock poisoned");
                ApiError::from_code(ErrorCode::InternalError)
            }
        }
    }
}

impl From<MetricsError> for ApiError {
    fn from(err: MetricsError) -> Self {
        ApiError::invalid_input(err.to_string())
    }
}

impl From<ValidationError> for ApiError {
    fn from(err: ValidationError) -> Self {
        let field = match &err {
            ValidationError::RequiredFieldMissing { field } => field.clone(),
            ValidationError::InvalidValue { field, .. } => field.clone(),
        };
        ApiError::validation_failed(err.to_string())
            .with_details(serde_json::json!({ "field": field }))
    }
}

impl From<ConfigError> for ApiError {
    fn from(err: ConfigError) -> Self {
        ApiError::internal_error(err.to_string())
    }
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::InvalidCredentials { .. } => ApiError::from_code(ErrorCode::Unauthorized),
        }
    }
}

impl From<InvalidationError> for ApiError {
    fn from(err: InvalidationError) -> Self {
        ApiError::internal_error(format!("Write committed but cache invalidation failed: {}", err))
    }
}

/// Result type alias for API operations.
pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;
    use tally_core::{CacheError, EntityType};
    use uuid::Uuid;

    #[test]
    fn test_error_code_status_mapping() {
        assert_eq!(ErrorCode::Unauthorized.status_code(), StatusCode::UNAUTHORIZED);
        assert_eq!(ErrorCode::ValidationFailed.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(ErrorCode::EntityNotFound.status_code(), StatusCode::NOT_FOUND);
        assert_eq!(ErrorCode::EntityAlreadyExists.status_code(), StatusCode::CONFLICT);
        assert_eq!(ErrorCode::DatabaseError.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            ErrorCode::ServiceUnavailable.status_code(),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }

    #[test]
    fn test_not_found_maps_to_404() {
        let id = Uuid::now_v7();
        let err: ApiError = TallyError::not_found(EntityType::Transaction, id).into();
        assert_eq!(err.code, ErrorCode::EntityNotFound);
        assert!(err.message.contains("Transaction"));
        assert!(err.message.contains(&id.to_string()));
    }

    #[test]
    fn test_conflict_maps_to_409() {
        let err: ApiError = TallyError::Storage(StorageError::Conflict {
            entity_type: EntityType::User,
            reason: "email already registered".into(),
        })
        .into();
        assert_eq!(err.status_code(), StatusCode::CONFLICT);
        assert_eq!(err.message, "email already registered");
    }

    #[test]
    fn test_backend_error_does_not_leak_reason() {
        let err: ApiError = TallyError::Storage(StorageError::Backend {
            reason: "relation \"transactions\" does not exist".into(),
        })
        .into();
        assert_eq!(err.code, ErrorCode::DatabaseError);
        assert!(!err.message.contains("relation"));
    }

    #[test]
    fn test_store_unavailable_maps_to_503() {
        let err: ApiError = TallyError::Storage(StorageError::Unavailable {
            reason: "timed out waiting for a database connection".into(),
        })
        .into();
        assert_eq!(err.code, ErrorCode::ServiceUnavailable);
        assert_eq!(err.status_code(), StatusCode::SERVICE_UNAVAILABLE);
        assert!(!err.message.contains("timed out"));
    }

    #[test]
    fn test_validation_carries_field_detail() {
        let err: ApiError = TallyError::invalid_value("budget", "must be non-negative").into();
        assert_eq!(err.code, ErrorCode::ValidationFailed);
        assert_eq!(err.details, Some(serde_json::json!({ "field": "budget" })));
    }

    #[test]
    fn test_auth_and_metrics_mapping() {
        let err: ApiError = TallyError::Auth(AuthError::InvalidCredentials {
            email: "a@b.c".into(),
        })
        .into();
        assert_eq!(err.status_code(), StatusCode::UNAUTHORIZED);
        assert!(!err.message.contains("a@b.c"));

        let err: ApiError = TallyError::Metrics(MetricsError::InvalidAmount { amount: -1.0 }).into();
        assert_eq!(err.code, ErrorCode::InvalidInput);
    }

    #[test]
    fn test_invalidation_maps_to_internal() {
        let err: ApiError = TallyError::Invalidation(InvalidationError::Delete {
            key: "projects:x".into(),
            source: CacheError::Unavailable { reason: "down".into() },
        })
        .into();
        assert_eq!(err.code, ErrorCode::InternalError);
        assert!(err.message.contains("committed"));
    }

    #[test]
    fn test_error_serialization() -> Result<(), serde_json::Error> {
        let err = ApiError::unauthorized("Invalid credentials");
        let json = serde_json::to_string(&err)?;

        assert!(json.contains("UNAUTHORIZED"));
        assert!(!json.contains("details"));

        let deserialized: ApiError = serde_json::from_str(&json)?;
        assert_eq!(deserialized, err);
        Ok(())
    }

    #[test]
    fn test_graphql_error_has_code_extension() {
        let gql = ApiError::entity_not_found("Project", "p1").extend();
        assert!(gql.message.contains("Project"));
        let ext = gql.extensions.expect("extensions set");
        assert_eq!(
            ext.get("code"),
            Some(&async_graphql::Value::from("EntityNotFound"))
        );
    }
}
