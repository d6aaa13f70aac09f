//! Property-Based Tests for the Metrics Engine
//!
//! **Property 1: Bounded progress**
//! For any non-negative budget and any ledger, progress_percent is in [0, 100].
//!
//! **Property 2: Zero budget**
//! A zero budget always yields zero progress, whatever the balance.
//!
//! **Property 3: Exact balance**
//! current_balance equals income_total - expense_total with no clamping.
//!
//! **Property 4: Finite balance**
//! Huge amounts either produce finite totals or fail with TotalOverflow;
//! the balance is never NaN or infinite.

use proptest::prelude::*;
use tally_core::{compute_stats, LedgerEntry, MetricsError, TransactionKind};
use tally_test_utils::generators::{arb_budget, arb_invalid_amount, arb_kind, arb_ledger};

// ============================================================================
// PROPERTY TESTS
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(256))]

    #[test]
    fn prop_progress_is_bounded(budget in arb_budget(), ledger in arb_ledger()) {
        let stats = compute_stats(budget, ledger)
            .map_err(|e| TestCaseError::fail(e.to_string()))?;
        prop_assert!(stats.progress_percent >= 0.0);
        prop_assert!(stats.progress_percent <= 100.0);
    }

    #[test]
    fn prop_zero_budget_means_zero_progress(ledger in arb_ledger()) {
        let stats = compute_stats(0.0, ledger)
            .map_err(|e| TestCaseError::fail(e.to_string()))?;
        prop_assert_eq!(stats.progress_percent, 0.0);
    }

    #[test]
    fn prop_balance_is_income_minus_expense(budget in arb_budget(), ledger in arb_ledger()) {
        let stats = compute_stats(budget, ledger.clone())
            .map_err(|e| TestCaseError::fail(e.to_string()))?;
        prop_assert_eq!(stats.current_balance, stats.income_total - stats.expense_total);

        let income: f64 = ledger
            .iter()
            .filter(|e| e.kind == TransactionKind::Income)
            .map(|e| e.amount)
            .sum();
        let expense: f64 = ledger
            .iter()
            .filter(|e| e.kind == TransactionKind::Expense)
            .map(|e| e.amount)
            .sum();
        prop_assert!((stats.income_total - income).abs() < 1e-6);
        prop_assert!((stats.expense_total - expense).abs() < 1e-6);
    }

    #[test]
    fn prop_totals_are_non_negative(budget in arb_budget(), ledger in arb_ledger()) {
        let stats = compute_stats(budget, ledger)
            .map_err(|e| TestCaseError::fail(e.to_string()))?;
        prop_assert!(stats.income_total >= 0.0);
        prop_assert!(stats.expense_total >= 0.0);
    }

    #[test]
    fn prop_invalid_amount_anywhere_is_rejected(
        mut ledger in arb_ledger(),
        bad in arb_invalid_amount(),
        kind in arb_kind(),
        position in any::<prop::sample::Index>(),
    ) {
        let at = position.index(ledger.len() + 1);
        ledger.insert(at, LedgerEntry { amount: bad, kind });
        let result = compute_stats(100.0, ledger);
        prop_assert!(matches!(result, Err(MetricsError::InvalidAmount { .. })), "expected InvalidAmount error");
    }

    #[test]
    fn prop_huge_amounts_never_yield_non_finite_balance(
        entries in prop::collection::vec((f64::MAX / 4.0..=f64::MAX, arb_kind()), 1..8),
    ) {
        let ledger = entries
            .into_iter()
            .map(|(amount, kind)| LedgerEntry { amount, kind });
        match compute_stats(100.0, ledger) {
            Ok(stats) => {
                prop_assert!(stats.current_balance.is_finite());
                prop_assert!(stats.income_total.is_finite());
                prop_assert!(stats.expense_total.is_finite());
            }
            Err(e) => prop_assert!(matches!(e, MetricsError::TotalOverflow { .. }), "expected TotalOverflow error"),
        }
    }
}
