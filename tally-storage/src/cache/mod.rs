//! Cache-aside layer for owner-scoped list reads.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                         CacheAside                          │
//! │  get_or_load(key, ttl, loader) -> T                         │
//! │  invalidate(key)                                            │
//! └─────────────────────────────────────────────────────────────┘
//!                │                              │
//!                ▼                              ▼
//! ┌──────────────────────────┐    ┌──────────────────────────┐
//! │      CacheBackend        │    │   loader (FinanceStore)  │
//! │  InMemory / LMDB         │    │   authoritative data     │
//! └──────────────────────────┘    └──────────────────────────┘
//! ```
//!
//! Entries expire passively: each stores `(inserted_at, ttl)` and is checked
//! on read. A failing medium never fails a read; the loader is used instead.

mod cache_aside;
mod entry;
mod keys;
mod lmdb_backend;
mod memory;
mod traits;

pub use cache_aside::{CacheAside, CacheConfig};
pub use entry::{CacheEntry, CacheRead, ReadOrigin};
pub use keys::{CacheKey, USER_PROJECTS_PREFIX, USER_TRANSACTIONS_PREFIX};
pub use lmdb_backend::{LmdbCacheBackend, LmdbCacheError};
pub use memory::InMemoryCacheBackend;
pub use traits::{CacheBackend, CacheStats};
