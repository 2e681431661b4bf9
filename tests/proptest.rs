// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2025 Daniel Negri
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Property-based tests for the reversal engine.
//!
//! These tests verify invariants that should hold for any transaction and
//! any sequence of reversal requests against it.

mod common;

use common::{engine, keyed_request, request, status_of, store_with};
use proptest::prelude::*;
use reversal_engine_rs::response::{self, DetailMode};
use reversal_engine_rs::{
    AuditStatus, ReversalError, TransactionId, TransactionStatus, ValidationKind,
};
use rust_decimal::Decimal;

// =============================================================================
// Arbitrary Strategies
// =============================================================================

/// Generate a positive amount (0.01 to 100000.00).
fn arb_amount() -> impl Strategy<Value = Decimal> {
    (1i64..=10_000_000i64).prop_map(|cents| Decimal::new(cents, 2))
}

/// Generate a status outside the default eligible set, excluding REFUNDED,
/// which reports a conflict instead.
fn arb_ineligible_status() -> impl Strategy<Value = String> {
    prop_oneof![
        Just("PENDING".to_string()),
        Just("FAILED".to_string()),
        Just("SUCCESS".to_string()),
        Just(" pending ".to_string()),
        "[A-Z]{3,12}".prop_filter("eligible or refunded", |s| {
            s != "COMPLETED" && s != "REFUNDED"
        }),
    ]
}

// =============================================================================
// Workflow Invariant Tests
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(256))]

    /// Reversing more than the original amount is always rejected and never
    /// touches the transaction.
    #[test]
    fn amount_bound(original in arb_amount(), excess in arb_amount()) {
        let store = store_with(&[("T1", "COMPLETED", original)]);

        let result = engine(&store).process(&request("T1", original + excess));

        prop_assert_eq!(
            result.unwrap_err(),
            ReversalError::Validation(ValidationKind::AmountExceeded)
        );
        prop_assert_eq!(status_of(&store, "T1"), TransactionStatus::Completed);
    }

    /// The bound holds for amounts arriving on the wire, however small the
    /// excess and whether the amount is a JSON number or string.
    #[test]
    fn amount_bound_through_payload(
        original in arb_amount(),
        excess in 1i64..1_000,
        scale in 3u32..=20,
        quoted in any::<bool>(),
    ) {
        let store = store_with(&[("T1", "COMPLETED", original)]);
        let amount = original + Decimal::new(excess, scale);
        let amount = if quoted { format!("\"{amount}\"") } else { amount.to_string() };
        let body = format!(r#"{{"TransactionID":"T1","ReversalAmount":{amount}}}"#);

        let response = response::handle(&engine(&store), &body, DetailMode::Production);

        prop_assert_eq!(response.status, 400);
        prop_assert_eq!(
            response.body["error"].as_str(),
            Some("Reversal amount exceeds original transaction amount")
        );
        prop_assert_eq!(status_of(&store, "T1"), TransactionStatus::Completed);
    }

    /// Any amount up to the original is accepted.
    #[test]
    fn amount_within_bound_succeeds(original in arb_amount(), pct in 1u32..=100) {
        let amount = (original * Decimal::from(pct) / Decimal::from(100)).round_dp(2);
        prop_assume!(amount > Decimal::ZERO);
        let store = store_with(&[("T1", "COMPLETED", original)]);

        let reversal = engine(&store).process(&request("T1", amount)).unwrap();

        prop_assert_eq!(reversal.reversal_amount, amount);
        prop_assert_eq!(status_of(&store, "T1"), TransactionStatus::Refunded);
    }

    /// Transactions outside the eligible set are rejected and no audit entry
    /// reaches SUCCESS.
    #[test]
    fn status_gate(status in arb_ineligible_status(), amount in arb_amount()) {
        let store = store_with(&[("T1", status.as_str(), amount)]);

        let result = engine(&store).process(&request("T1", amount));

        prop_assert_eq!(
            result.unwrap_err(),
            ReversalError::Validation(ValidationKind::IneligibleStatus)
        );
        prop_assert!(store
            .audit_entries()
            .iter()
            .all(|e| e.status != AuditStatus::Success));
    }

    /// Submitting the same key any number of times yields one audit ID and
    /// one mutation.
    #[test]
    fn idempotent_resubmission(amount in arb_amount(), repeats in 2usize..6) {
        let store = store_with(&[("T1", "COMPLETED", amount)]);
        let engine = engine(&store);
        let req = keyed_request("T1", amount, "retry-key");

        let ids: Vec<_> = (0..repeats)
            .map(|_| engine.process(&req).unwrap().audit_id)
            .collect();

        prop_assert!(ids.windows(2).all(|w| w[0] == w[1]));
        prop_assert_eq!(store.audit_entries().len(), 1);
        prop_assert_eq!(status_of(&store, "T1"), TransactionStatus::Refunded);
    }

    /// Audit entries never move from SUCCESS or FAILED back to PENDING,
    /// whatever requests follow.
    #[test]
    fn audit_monotonicity(
        amounts in prop::collection::vec(arb_amount(), 1..8),
        keys in prop::collection::vec(0u8..3, 1..8),
    ) {
        let store = store_with(&[("T1", "COMPLETED", Decimal::new(5_000_000, 2))]);
        let engine = engine(&store);
        let mut terminal = std::collections::HashMap::new();

        for (amount, key) in amounts.iter().zip(keys.iter().cycle()) {
            let _ = engine.process(&keyed_request("T1", *amount, &format!("k{key}")));
            for entry in store.audit_entries_for(&TransactionId::from("T1")) {
                if let Some(previous) = terminal.get(&entry.audit_id) {
                    prop_assert_eq!(entry.status, *previous);
                }
                if entry.status.is_terminal() {
                    terminal.insert(entry.audit_id.clone(), entry.status);
                }
            }
        }

        let successes = store
            .audit_entries()
            .iter()
            .filter(|e| e.status == AuditStatus::Success)
            .count();
        prop_assert!(successes <= 1);
    }
}
