//! Core entity structures

use crate::{ProjectId, Timestamp, TransactionId, TransactionKind, UserId};
use serde::{Deserialize, Serialize};

/// A registered user.
///
/// The password is never held in clear text; `password_hash` is a salted
/// digest produced at the request boundary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub user_id: UserId,
    pub email: String,
    pub name: String,
    pub password_hash: String,
    pub created_at: Timestamp,
}

/// Project - a budgeted container of transactions owned by one user.
///
/// The budget is fixed at creation; there is no update path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Project {
    pub project_id: ProjectId,
    pub user_id: UserId,
    pub name: String,
    pub budget: f64,
    pub created_at: Timestamp,
}

/// Transaction - a single income or expense record under a project.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub transaction_id: TransactionId,
    pub project_id: ProjectId,
    /// Always a positive magnitude; the sign comes from `kind`.
    pub amount: f64,
    pub kind: TransactionKind,
    pub category: String,
    pub description: Option<String>,
    pub created_at: Timestamp,
}

/// Derived, non-persisted project statistics.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ProjectStats {
    /// income_total - expense_total, never clamped.
    pub current_balance: f64,
    /// Balance as a share of the budget, always within [0, 100].
    pub progress_percent: f64,
    pub income_total: f64,
    pub expense_total: f64,
}

/// Minimal `{amount, kind}` view consumed by the metrics engine.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub amount: f64,
    pub kind: TransactionKind,
}

impl LedgerEntry {
    pub fn income(amount: f64) -> Self {
        Self {
            amount,
            kind: TransactionKind::Income,
        }
    }

    pub fn expense(amount: f64) -> Self {
        Self {
            amount,
            kind: TransactionKind::Expense,
        }
    }
}

impl From<&Transaction> for LedgerEntry {
    fn from(t: &Transaction) -> Self {
        Self {
            amount: t.amount,
            kind: t.kind,
        }
    }
}
