//! Cache key construction for owner-scoped list reads.
//!
//! The cache itself compares keys by exact string equality and never parses
//! them. These constructors are the single place the key formats are spelled
//! out, so reads and invalidations cannot drift apart.

use std::fmt;

use tally_core::UserId;

/// Prefix for a user's project list.
pub const USER_PROJECTS_PREFIX: &str = "projects:";

/// Prefix for a user's cross-project transaction list.
pub const USER_TRANSACTIONS_PREFIX: &str = "transactions:user:";

/// A cache key derived from the entity whose writes make it stale.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    /// `projects:{user_id}`
    pub fn user_projects(user_id: UserId) -> Self {
        Self(format!("{}{}", USER_PROJECTS_PREFIX, user_id))
    }

    /// `transactions:user:{user_id}`
    pub fn user_transactions(user_id: UserId) -> Self {
        Self(format!("{}{}", USER_TRANSACTIONS_PREFIX, user_id))
    }

    /// Borrow the key as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for CacheKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl From<CacheKey> for String {
    fn from(key: CacheKey) -> Self {
        key.0
    }
}
