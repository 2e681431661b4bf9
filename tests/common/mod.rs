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

//! Shared fixtures for integration tests.

#![allow(dead_code)]

use parking_lot::Mutex;
use reversal_engine_rs::{
    AuditEntry, AuditId, AuditStatus, AuditUpdate, EngineConfig, MemoryStore, ReversalEngine,
    ReversalRequest, Store, StoreError, Transaction, TransactionId, TransactionStatus,
    TransactionUpdate,
};
use rust_decimal::Decimal;
use std::sync::Arc;

// === Fault injection ===

/// Store operation a fault can be attached to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    GetTransaction,
    UpdateTransaction,
    GetAuditEntry,
    PutAuditEntry,
    UpdateAuditEntry,
}

/// How an injected fault behaves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    /// Fail without touching the store.
    Before,
    /// Apply the write, then report failure (lost acknowledgement).
    After,
}

/// [`MemoryStore`] wrapper that fails selected operations on demand.
pub struct FaultyStore {
    inner: Arc<MemoryStore>,
    plan: Mutex<Vec<(Op, Fault)>>,
}

impl FaultyStore {
    pub fn new(inner: Arc<MemoryStore>) -> Self {
        Self {
            inner,
            plan: Mutex::new(Vec::new()),
        }
    }

    /// Makes the next call of `op` fail.
    pub fn fail_next(&self, op: Op, fault: Fault) {
        self.plan.lock().push((op, fault));
    }

    pub fn pending_faults(&self) -> usize {
        self.plan.lock().len()
    }

    fn take(&self, op: Op) -> Option<Fault> {
        let mut plan = self.plan.lock();
        let idx = plan.iter().position(|(o, _)| *o == op)?;
        Some(plan.remove(idx).1)
    }

    fn unavailable(op: Op) -> StoreError {
        StoreError::Unavailable(format!("injected fault on {op:?}"))
    }
}

impl Store for FaultyStore {
    fn get_transaction(&self, id: &TransactionId) -> Result<Option<Transaction>, StoreError> {
        match self.take(Op::GetTransaction) {
            Some(_) => Err(Self::unavailable(Op::GetTransaction)),
            None => self.inner.get_transaction(id),
        }
    }

    fn update_transaction_if(
        &self,
        id: &TransactionId,
        expected: &TransactionStatus,
        update: TransactionUpdate,
    ) -> Result<Transaction, StoreError> {
        match self.take(Op::UpdateTransaction) {
            Some(Fault::Before) => Err(Self::unavailable(Op::UpdateTransaction)),
            Some(Fault::After) => {
                let _ = self.inner.update_transaction_if(id, expected, update);
                Err(Self::unavailable(Op::UpdateTransaction))
            }
            None => self.inner.update_transaction_if(id, expected, update),
        }
    }

    fn get_audit_entry(&self, id: &AuditId) -> Result<Option<AuditEntry>, StoreError> {
        match self.take(Op::GetAuditEntry) {
            Some(_) => Err(Self::unavailable(Op::GetAuditEntry)),
            None => self.inner.get_audit_entry(id),
        }
    }

    fn put_audit_entry_if_absent(&self, entry: AuditEntry) -> Result<(), StoreError> {
        match self.take(Op::PutAuditEntry) {
            Some(Fault::Before) => Err(Self::unavailable(Op::PutAuditEntry)),
            Some(Fault::After) => {
                let _ = self.inner.put_audit_entry_if_absent(entry);
                Err(Self::unavailable(Op::PutAuditEntry))
            }
            None => self.inner.put_audit_entry_if_absent(entry),
        }
    }

    fn update_audit_entry_if(
        &self,
        id: &AuditId,
        expected: AuditStatus,
        update: AuditUpdate,
    ) -> Result<AuditEntry, StoreError> {
        match self.take(Op::UpdateAuditEntry) {
            Some(Fault::Before) => Err(Self::unavailable(Op::UpdateAuditEntry)),
            Some(Fault::After) => {
                let _ = self.inner.update_audit_entry_if(id, expected, update);
                Err(Self::unavailable(Op::UpdateAuditEntry))
            }
            None => self.inner.update_audit_entry_if(id, expected, update),
        }
    }
}

// === Builders ===

pub fn store_with(transactions: &[(&str, &str, Decimal)]) -> Arc<MemoryStore> {
    let store = Arc::new(MemoryStore::new());
    for (id, status, amount) in transactions {
        store.insert_transaction(Transaction::new(*id, status.parse().unwrap(), *amount));
    }
    store
}

pub fn engine(store: &Arc<MemoryStore>) -> ReversalEngine {
    ReversalEngine::new(store.clone(), EngineConfig::default())
}

/// Engine that treats every PENDING entry as abandoned.
pub fn recovering_engine(store: Arc<dyn Store>) -> ReversalEngine {
    ReversalEngine::new(
        store,
        EngineConfig::default().with_recovery_threshold(chrono::Duration::zero()),
    )
}

pub fn faulty(store: &Arc<MemoryStore>) -> (Arc<FaultyStore>, ReversalEngine) {
    let faulty = Arc::new(FaultyStore::new(store.clone()));
    let engine = ReversalEngine::new(faulty.clone(), EngineConfig::default());
    (faulty, engine)
}

pub fn request(id: &str, amount: Decimal) -> ReversalRequest {
    ReversalRequest::new(id, amount, None, None).unwrap()
}

pub fn keyed_request(id: &str, amount: Decimal, key: &str) -> ReversalRequest {
    request(id, amount).with_idempotency_key(key)
}

pub fn status_of(store: &MemoryStore, id: &str) -> TransactionStatus {
    store.transaction(&TransactionId::from(id)).unwrap().status
}
