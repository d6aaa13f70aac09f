//! Project metrics: balance and bounded budget progress.
//!
//! Pure functions over a ledger. Nothing here is cached; the numbers are
//! recomputed from whatever transaction set the caller fetched, so they always
//! agree with the data being displayed next to them.

use crate::{LedgerEntry, MetricsError, ProjectStats, TransactionKind};

/// Compute balance and progress for a budget and a set of ledger entries.
///
/// Fails fast with [`MetricsError::InvalidAmount`] on any amount that is not a
/// finite non-negative number, and with [`MetricsError::InvalidBudget`] on a
/// budget that is not. Totals that would leave the finite range fail with
/// [`MetricsError::TotalOverflow`], so the balance is always a real number.
/// A zero budget always yields zero progress.
pub fn compute_stats<I>(budget: f64, entries: I) -> Result<ProjectStats, MetricsError>
where
    I: IntoIterator<Item = LedgerEntry>,
{
    if !is_valid_magnitude(budget) {
        return Err(MetricsError::InvalidBudget { budget });
    }

    let mut income_total = 0.0;
    let mut expense_total = 0.0;
    for entry in entries {
        if !is_valid_magnitude(entry.amount) {
            return Err(MetricsError::InvalidAmount {
                amount: entry.amount,
            });
        }
        let total = match entry.kind {
            TransactionKind::Income => &mut income_total,
            TransactionKind::Expense => &mut expense_total,
        };
        let next = *total + entry.amount;
        if !next.is_finite() {
            return Err(MetricsError::TotalOverflow {
                kind: entry.kind,
                amount: entry.amount,
            });
        }
        *total = next;
    }

    let current_balance = income_total - expense_total;

    Ok(ProjectStats {
        current_balance,
        progress_percent: progress_percent(current_balance, budget),
        income_total,
        expense_total,
    })
}

/// Balance as a percentage of budget, clamped to [0, 100].
pub fn progress_percent(balance: f64, budget: f64) -> f64 {
    if budget <= 0.0 {
        return 0.0;
    }
    let raw = balance / budget * 100.0;
    // NaN only arises from a non-finite balance; treat it as no progress.
    if raw.is_nan() {
        return 0.0;
    }
    raw.clamp(0.0, 100.0)
}

/// True for finite numbers >= 0. Negative zero counts as zero.
pub fn is_valid_magnitude(value: f64) -> bool {
    value.is_finite() && value >= 0.0
}
