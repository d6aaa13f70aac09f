//! Enum types for Tally entities

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Entity type discriminator used in error reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntityType {
    User,
    Project,
    Transaction,
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let value = match self {
            EntityType::User => "User",
            EntityType::Project => "Project",
            EntityType::Transaction => "Transaction",
        };
        write!(f, "{}", value)
    }
}

/// Direction of money movement for a transaction.
///
/// Amounts are always stored as positive magnitudes; the kind decides the sign
/// when the balance is computed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionKind {
    Income,
    Expense,
}

impl TransactionKind {
    /// Convert to database string representation.
    pub fn as_db_str(&self) -> &'static str {
        match self {
            TransactionKind::Income => "income",
            TransactionKind::Expense => "expense",
        }
    }

    /// Parse from database string representation.
    pub fn from_db_str(s: &str) -> Result<Self, TransactionKindParseError> {
        match s.trim().to_lowercase().as_str() {
            "income" => Ok(TransactionKind::Income),
            "expense" => Ok(TransactionKind::Expense),
            _ => Err(TransactionKindParseError(s.to_string())),
        }
    }
}

impl fmt::Display for TransactionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_db_str())
    }
}

impl FromStr for TransactionKind {
    type Err = TransactionKindParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_db_str(s)
    }
}

/// Error when parsing an invalid transaction kind string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionKindParseError(pub String);

impl fmt::Display for TransactionKindParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Invalid transaction kind: {} (expected income or expense)",
            self.0
        )
    }
}

impl std::error::Error for TransactionKindParseError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_parse_is_case_insensitive() {
        assert_eq!("income".parse::<TransactionKind>(), Ok(TransactionKind::Income));
        assert_eq!("EXPENSE".parse::<TransactionKind>(), Ok(TransactionKind::Expense));
        assert_eq!(" Income ".parse::<TransactionKind>(), Ok(TransactionKind::Income));
    }

    #[test]
    fn test_kind_parse_rejects_unknown() {
        let err = "refund".parse::<TransactionKind>().unwrap_err();
        assert!(err.to_string().contains("refund"));
    }

    #[test]
    fn test_kind_serde_uses_lowercase() {
        let json = serde_json::to_string(&TransactionKind::Expense).unwrap();
        assert_eq!(json, "\"expense\"");
    }
}
