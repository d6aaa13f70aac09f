//! Shared application state for Axum routers.

use std::time::Instant;

use crate::cached_db::CachedDbClient;
use crate::routes::graphql::{create_schema, TallySchema};

pub use crate::cached_db::ApiCache;

/// Application-wide state shared across all routes.
#[derive(Clone)]
pub struct AppState {
    /// Read/write coordinator. Every data access goes through it.
    pub cached_db: CachedDbClient,
    pub graphql_schema: TallySchema,
    pub start_time: Instant,
}

impl AppState {
    /// Build the state and the GraphQL schema around one coordinator.
    pub fn new(cached_db: CachedDbClient) -> Self {
        Self {
            graphql_schema: create_schema(cached_db.clone()),
            cached_db,
            start_time: Instant::now(),
        }
    }
}

crate::impl_from_ref!(CachedDbClient, cached_db);
crate::impl_from_ref!(TallySchema, graphql_schema);
crate::impl_from_ref!(Instant, start_time);
