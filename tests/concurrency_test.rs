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

//! Concurrency tests for racing reversal attempts.
//!
//! Attempts are released together from a barrier so they interleave inside
//! the workflow. The only coordination is the store's conditional writes.

mod common;

use common::{keyed_request, store_with};
use reversal_engine_rs::{
    AuditStatus, ConflictKind, EngineConfig, ReversalEngine, ReversalError, TransactionId,
    TransactionStatus,
};
use rust_decimal_macros::dec;
use std::sync::{Arc, Barrier};
use std::thread;

const THREADS: usize = 16;

#[test]
fn distinct_attempts_on_same_transaction_have_one_winner() {
    for _ in 0..50 {
        let store = store_with(&[("T1", "COMPLETED", dec!(100.00))]);
        let engine = Arc::new(ReversalEngine::new(store.clone(), EngineConfig::default()));
        let barrier = Arc::new(Barrier::new(THREADS));

        let handles: Vec<_> = (0..THREADS)
            .map(|i| {
                let engine = Arc::clone(&engine);
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    barrier.wait();
                    engine.process(&keyed_request("T1", dec!(40.00), &format!("client-{i}")))
                })
            })
            .collect();
        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

        let winners: Vec<_> = results.iter().filter_map(|r| r.as_ref().ok()).collect();
        assert_eq!(winners.len(), 1);
        for err in results.iter().filter_map(|r| r.as_ref().err()) {
            assert_eq!(
                *err,
                ReversalError::Conflict(ConflictKind::ConcurrentModification)
            );
        }

        let tx = store.transaction(&TransactionId::from("T1")).unwrap();
        assert_eq!(tx.status, TransactionStatus::Refunded);
        assert_eq!(tx.amount, dec!(100.00));
        assert!(tx.refunded_by(&winners[0].audit_id));

        let entries = store.audit_entries_for(&TransactionId::from("T1"));
        assert_eq!(
            entries
                .iter()
                .filter(|e| e.status == AuditStatus::Success)
                .count(),
            1
        );
        assert!(entries.iter().all(|e| e.status != AuditStatus::Pending));
    }
}

#[test]
fn duplicate_submissions_never_mutate_twice() {
    for _ in 0..50 {
        let store = store_with(&[("T1", "COMPLETED", dec!(100.00))]);
        let engine = Arc::new(ReversalEngine::new(store.clone(), EngineConfig::default()));
        let barrier = Arc::new(Barrier::new(THREADS));

        let handles: Vec<_> = (0..THREADS)
            .map(|_| {
                let engine = Arc::clone(&engine);
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    barrier.wait();
                    engine.process(&keyed_request("T1", dec!(40.00), "same-key"))
                })
            })
            .collect();
        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

        let fresh = results
            .iter()
            .filter(|r| matches!(r, Ok(reversal) if !reversal.replayed))
            .count();
        assert_eq!(fresh, 1);
        for err in results.iter().filter_map(|r| r.as_ref().err()) {
            assert_eq!(*err, ReversalError::Conflict(ConflictKind::ConcurrentAttempt));
        }

        let entries = store.audit_entries();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].status, AuditStatus::Success);
    }
}

#[test]
fn attempts_on_different_transactions_do_not_interfere() {
    let ids: Vec<String> = (0..THREADS).map(|i| format!("T{i}")).collect();
    let seed: Vec<_> = ids
        .iter()
        .map(|id| (id.as_str(), "COMPLETED", dec!(10)))
        .collect();
    let store = store_with(&seed);
    let engine = Arc::new(ReversalEngine::new(store.clone(), EngineConfig::default()));
    let barrier = Arc::new(Barrier::new(THREADS));

    let handles: Vec<_> = ids
        .iter()
        .cloned()
        .map(|id| {
            let engine = Arc::clone(&engine);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                engine.process(&keyed_request(&id, dec!(10), "k"))
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap().unwrap();
    }
    assert_eq!(store.audit_entries().len(), THREADS);
    assert!(
        ids.iter()
            .all(|id| store.transaction(&TransactionId::from(id.as_str())).unwrap().status
                == TransactionStatus::Refunded)
    );
}
