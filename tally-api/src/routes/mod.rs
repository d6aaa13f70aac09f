//! HTTP routing.
//!
//! - `/graphql` - GraphQL endpoint and playground
//! - `/health` - liveness and readiness probes

pub mod graphql;
pub mod health;

use std::time::Duration;

use axum::http::{header, HeaderValue, Method};
use axum::Router;
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::cached_db::CachedDbClient;
use crate::config::ApiConfig;
use crate::state::AppState;

fn build_cors_layer(config: &ApiConfig) -> CorsLayer {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::ACCEPT, header::AUTHORIZATION])
        .max_age(Duration::from_secs(config.cors_max_age_secs));

    if config.cors_origins.is_empty() {
        tracing::info!("CORS: Development mode - allowing all origins");
        cors.allow_origin(Any)
    } else {
        tracing::info!("CORS: allowing origins: {:?}", config.cors_origins);
        let origins: Vec<HeaderValue> = config
            .cors_origins
            .iter()
            .filter_map(|o| match o.parse() {
                Ok(value) => Some(value),
                Err(_) => {
                    tracing::warn!(origin = %o, "ignoring unparseable CORS origin");
                    None
                }
            })
            .collect();
        cors.allow_origin(origins)
    }
}

/// Build the full application router around one coordinator.
pub fn create_api_router(cached_db: CachedDbClient, config: &ApiConfig) -> Router {
    let state = AppState::new(cached_db);

    Router::new()
        .nest("/graphql", graphql::create_router())
        .nest("/health", health::create_router())
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(build_cors_layer(config)),
        )
        .with_state(state)
}
