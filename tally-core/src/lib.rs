//! Tally Core - Entity Types and Project Metrics
//!
//! Pure data structures, the error taxonomy, and the metrics engine.
//! All other crates depend on this. No I/O lives here.

pub mod entities;
pub mod enums;
pub mod error;
pub mod identity;
pub mod metrics;

pub use entities::{LedgerEntry, Project, ProjectStats, Transaction, User};
pub use enums::{EntityType, TransactionKind, TransactionKindParseError};
pub use error::{
    AuthError, CacheError, ConfigError, InvalidationError, MetricsError, StorageError,
    TallyError, TallyResult, ValidationError,
};
pub use identity::{
    new_entity_id, EntityId, EntityIdType, ProjectId, Timestamp, TransactionId, UserId,
};
pub use metrics::{compute_stats, is_valid_magnitude, progress_percent};
