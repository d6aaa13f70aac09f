//! Tally API Server Entry Point
//!
//! Bootstraps telemetry and configuration, prepares the database schema,
//! builds the cache medium and starts the Axum HTTP server.

use std::net::SocketAddr;
use std::sync::Arc;

use tally_api::{
    create_api_router, init_tracing, ApiCache, ApiConfig, ApiError, ApiResult, CacheBackendKind,
    CachedDbClient, DbClient, DbConfig, TelemetryConfig,
};
use tally_storage::{CacheAside, CacheBackend, InMemoryCacheBackend, LmdbCacheBackend};

#[tokio::main]
async fn main() -> ApiResult<()> {
    let telemetry_config = TelemetryConfig::from_env()?;
    init_tracing(&telemetry_config)?;

    let api_config = ApiConfig::from_env()?;
    let db_config = DbConfig::from_env()?;

    let db = DbClient::from_config(&db_config)?;
    db.ensure_schema().await?;

    let backend = build_cache_backend(&api_config)?;
    let cache: Arc<ApiCache> = Arc::new(CacheAside::new(backend, api_config.cache.clone()));
    tracing::info!(
        backend = ?api_config.cache_backend,
        enabled = api_config.cache.enabled,
        policy = ?api_config.invalidation_policy,
        "Cache ready"
    );

    let cached_db = CachedDbClient::new(Arc::new(db), cache, api_config.invalidation_policy);
    let app = create_api_router(cached_db, &api_config);

    let addr: SocketAddr = api_config.bind_addr().parse().map_err(|e| {
        ApiError::invalid_input(format!("Invalid bind address {}: {}", api_config.bind_addr(), e))
    })?;
    tracing::info!(%addr, "Starting Tally API server");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| ApiError::internal_error(format!("Failed to bind {}: {}", addr, e)))?;

    let server = axum::serve(listener, app);
    tokio::select! {
        result = server => {
            result.map_err(|e| ApiError::internal_error(format!("Server error: {}", e)))?;
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Shutdown signal received");
        }
    }

    Ok(())
}

fn build_cache_backend(config: &ApiConfig) -> ApiResult<Arc<dyn CacheBackend>> {
    match config.cache_backend {
        CacheBackendKind::Memory => Ok(Arc::new(InMemoryCacheBackend::new())),
        CacheBackendKind::Lmdb => {
            let backend = LmdbCacheBackend::new(&config.lmdb_path, config.lmdb_size_mb)
                .map_err(|e| ApiError::internal_error(format!("Failed to open LMDB cache: {}", e)))?;
            Ok(Arc::new(backend))
        }
    }
}
