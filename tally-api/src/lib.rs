//! Tally API - GraphQL Service, PostgreSQL Store and Cache Coordination
//!
//! Wires the cache-aside layer from tally-storage in front of a PostgreSQL
//! [`FinanceStore`](tally_storage::FinanceStore) and exposes the result over
//! GraphQL on axum. All reads and writes go through [`CachedDbClient`],
//! which owns the cache-key invalidation rules.

pub mod cached_db;
pub mod config;
pub mod db;
pub mod error;
pub mod macros;
pub mod password;
pub mod routes;
pub mod state;
pub mod telemetry;

// Re-export commonly used types
pub use cached_db::{ApiCache, CachedDbClient, NewTransaction};
pub use config::{cache_config_from, ApiConfig, CacheBackendKind, EnvSource, InvalidationPolicy, ProcessEnv};
pub use db::{DbClient, DbConfig};
pub use error::{ApiError, ApiResult, ErrorCode};
pub use routes::create_api_router;
pub use routes::graphql::{create_schema, TallySchema};
pub use state::AppState;
pub use telemetry::{init_tracing, LogFormat, TelemetryConfig};
