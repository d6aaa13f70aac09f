//! API Configuration Module
//!
//! Bind address, CORS, cache medium and invalidation policy. Everything is
//! read from environment variables with development-friendly defaults; an
//! explicitly set value that cannot be parsed is a `ConfigError`, never a
//! silent fallback.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use tally_core::ConfigError;
use tally_storage::{CacheConfig, LmdbCacheBackend};

// ============================================================================
// ENV LOOKUP
// ============================================================================

/// Source of configuration values. `std::env::var` in production, a map in
/// tests.
pub trait EnvSource {
    fn var(&self, key: &str) -> Option<String>;
}

/// Reads the process environment.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessEnv;

impl EnvSource for ProcessEnv {
    fn var(&self, key: &str) -> Option<String> {
        std::env::var(key).ok()
    }
}

impl EnvSource for std::collections::HashMap<String, String> {
    fn var(&self, key: &str) -> Option<String> {
        self.get(key).cloned()
    }
}

/// Parse `key` if set and non-blank, otherwise return `default`.
pub(crate) fn parse_var<T>(env: &impl EnvSource, key: &str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match env.var(key) {
        Some(raw) if !raw.trim().is_empty() => {
            raw.trim().parse().map_err(|e: T::Err| ConfigError::InvalidValue {
                field: key.to_string(),
                value: raw.clone(),
                reason: e.to_string(),
            })
        }
        _ => Ok(default),
    }
}

pub(crate) fn parse_bool(env: &impl EnvSource, key: &str, default: bool) -> Result<bool, ConfigError> {
    match env.var(key) {
        Some(raw) if !raw.trim().is_empty() => match raw.trim().to_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            _ => Err(ConfigError::InvalidValue {
                field: key.to_string(),
                value: raw,
                reason: "expected true or false".to_string(),
            }),
        },
        _ => Ok(default),
    }
}

// ============================================================================
// INVALIDATION POLICY
// ============================================================================

/// What a write does when invalidating the cache entries it made stale fails.
///
/// The write itself is always committed first; the policy only decides
/// whether the caller sees the invalidation failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InvalidationPolicy {
    /// Log and discard the failure; readers may see stale data until TTL.
    #[default]
    Lenient,
    /// Return the failure to the caller after the write has committed.
    Strict,
}

impl FromStr for InvalidationPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "lenient" => Ok(InvalidationPolicy::Lenient),
            "strict" => Ok(InvalidationPolicy::Strict),
            other => Err(format!("unknown policy '{other}' (expected lenient or strict)")),
        }
    }
}

// ============================================================================
// CACHE MEDIUM
// ============================================================================

/// Which cache medium to build at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CacheBackendKind {
    /// Process-local map.
    #[default]
    Memory,
    /// Memory-mapped LMDB file.
    Lmdb,
}

impl FromStr for CacheBackendKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "memory" => Ok(CacheBackendKind::Memory),
            "lmdb" => Ok(CacheBackendKind::Lmdb),
            other => Err(format!("unknown cache backend '{other}' (expected memory or lmdb)")),
        }
    }
}

/// Cache-aside configuration from the environment.
///
/// - `TALLY_CACHE_ENABLED` (default: true)
/// - `TALLY_CACHE_PROJECTS_TTL_SECS` (default: 300)
/// - `TALLY_CACHE_USER_TRANSACTIONS_TTL_SECS` (default: 60)
pub fn cache_config_from(env: &impl EnvSource) -> Result<CacheConfig, ConfigError> {
    let defaults = CacheConfig::default();
    Ok(CacheConfig::new()
        .with_enabled(parse_bool(env, "TALLY_CACHE_ENABLED", defaults.enabled)?)
        .with_project_list_ttl(Duration::from_secs(parse_var(
            env,
            "TALLY_CACHE_PROJECTS_TTL_SECS",
            defaults.project_list_ttl.as_secs(),
        )?))
        .with_user_transactions_ttl(Duration::from_secs(parse_var(
            env,
            "TALLY_CACHE_USER_TRANSACTIONS_TTL_SECS",
            defaults.user_transactions_ttl.as_secs(),
        )?)))
}

// ============================================================================
// API CONFIGURATION
// ============================================================================

/// API configuration for the HTTP listener, CORS and the cache layer.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiConfig {
    /// Host to bind.
    pub bind_host: String,
    /// Port to bind.
    pub port: u16,
    /// Allowed CORS origins (comma-separated in env var).
    /// Empty means allow all origins (dev mode).
    pub cors_origins: Vec<String>,
    /// Max age for CORS preflight cache in seconds.
    pub cors_max_age_secs: u64,
    /// What writes do when cache invalidation fails.
    pub invalidation_policy: InvalidationPolicy,
    /// Cache medium.
    pub cache_backend: CacheBackendKind,
    /// Directory for the LMDB cache medium.
    pub lmdb_path: PathBuf,
    /// Map size for the LMDB cache medium.
    pub lmdb_size_mb: usize,
    /// Cache-aside TTLs and switch.
    pub cache: CacheConfig,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            bind_host: "0.0.0.0".to_string(),
            port: 4000,
            cors_origins: Vec::new(),
            cors_max_age_secs: 86400,
            invalidation_policy: InvalidationPolicy::default(),
            cache_backend: CacheBackendKind::default(),
            lmdb_path: PathBuf::from("./data/cache"),
            lmdb_size_mb: 64,
            cache: CacheConfig::default(),
        }
    }
}

impl ApiConfig {
    /// Load from the process environment.
    ///
    /// # Environment Variables
    ///
    /// - `TALLY_API_BIND`: Host to bind (default: 0.0.0.0)
    /// - `PORT` / `TALLY_API_PORT`: Port to bind (default: 4000)
    /// - `TALLY_CORS_ORIGINS`: Comma-separated allowed origins (default: all)
    /// - `TALLY_INVALIDATION_POLICY`: `lenient` or `strict` (default: lenient)
    /// - `TALLY_CACHE_BACKEND`: `memory` or `lmdb` (default: memory)
    /// - `TALLY_CACHE_LMDB_PATH`: LMDB directory (default: ./data/cache)
    /// - `TALLY_CACHE_LMDB_SIZE_MB`: LMDB map size (default: 64)
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_source(&ProcessEnv)
    }

    /// Load from an arbitrary source.
    pub fn from_source(env: &impl EnvSource) -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let bind_host = env
            .var("TALLY_API_BIND")
            .filter(|s| !s.trim().is_empty())
            .unwrap_or(defaults.bind_host);

        let port_key = if env.var("PORT").is_some() {
            "PORT"
        } else {
            "TALLY_API_PORT"
        };
        let port = parse_var(env, port_key, defaults.port)?;

        let cors_origins = env
            .var("TALLY_CORS_ORIGINS")
            .map(|s| {
                s.split(',')
                    .map(|o| o.trim().to_string())
                    .filter(|o| !o.is_empty())
                    .collect()
            })
            .unwrap_or_default();

        let lmdb_size_mb = parse_var(env, "TALLY_CACHE_LMDB_SIZE_MB", defaults.lmdb_size_mb)?;
        if lmdb_size_mb == 0 || lmdb_size_mb > LmdbCacheBackend::max_map_size_mb() {
            return Err(ConfigError::InvalidValue {
                field: "TALLY_CACHE_LMDB_SIZE_MB".to_string(),
                value: lmdb_size_mb.to_string(),
                reason: format!("must be between 1 and {}", LmdbCacheBackend::max_map_size_mb()),
            });
        }

        Ok(Self {
            bind_host,
            port,
            cors_origins,
            cors_max_age_secs: parse_var(env, "TALLY_CORS_MAX_AGE_SECS", defaults.cors_max_age_secs)?,
            invalidation_policy: parse_var(env, "TALLY_INVALIDATION_POLICY", defaults.invalidation_policy)?,
            cache_backend: parse_var(env, "TALLY_CACHE_BACKEND", defaults.cache_backend)?,
            lmdb_path: env
                .var("TALLY_CACHE_LMDB_PATH")
                .filter(|s| !s.trim().is_empty())
                .map(PathBuf::from)
                .unwrap_or(defaults.lmdb_path),
            lmdb_size_mb,
            cache: cache_config_from(env)?,
        })
    }

    /// `host:port` for the listener.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.bind_host, self.port)
    }
}
