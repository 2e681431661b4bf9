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

//! In-memory store adapter.
//!
//! Provides both tables on top of [`DashMap`], whose per-shard locking makes
//! each conditional write atomic for its key. Audit entries carry an insertion
//! sequence number so the trail can be read back in append order.

use crate::audit::{AuditEntry, AuditStatus, AuditUpdate};
use crate::base::{AuditId, TransactionId};
use crate::error::StoreError;
use crate::store::{Store, Table};
use crate::transaction::{Transaction, TransactionStatus, TransactionUpdate};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use std::sync::atomic::{AtomicU64, Ordering};

/// A thread-safe in-memory implementation of [`Store`].
///
/// Conditional writes hold the shard lock of their key for the whole
/// check-and-write, so two racing updates of the same key can never both
/// observe the old value.
#[derive(Debug, Default)]
pub struct MemoryStore {
    transactions: DashMap<TransactionId, Transaction>,

    /// Entries keyed by ID, tagged with their append sequence number.
    audit_entries: DashMap<AuditId, (u64, AuditEntry)>,

    next_sequence: AtomicU64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or replaces a transaction, as the upstream payment system would.
    pub fn insert_transaction(&self, transaction: Transaction) {
        self.transactions
            .insert(transaction.transaction_id.clone(), transaction);
    }

    pub fn transaction(&self, id: &TransactionId) -> Option<Transaction> {
        self.transactions.get(id).map(|t| t.value().clone())
    }

    pub fn transaction_count(&self) -> usize {
        self.transactions.len()
    }

    pub fn audit_entry(&self, id: &AuditId) -> Option<AuditEntry> {
        self.audit_entries.get(id).map(|e| e.value().1.clone())
    }

    /// Snapshot of the audit trail in append order.
    pub fn audit_entries(&self) -> Vec<AuditEntry> {
        let mut entries: Vec<(u64, AuditEntry)> = self
            .audit_entries
            .iter()
            .map(|e| e.value().clone())
            .collect();
        entries.sort_by_key(|(sequence, _)| *sequence);
        entries.into_iter().map(|(_, entry)| entry).collect()
    }

    pub fn audit_entries_for(&self, transaction_id: &TransactionId) -> Vec<AuditEntry> {
        self.audit_entries()
            .into_iter()
            .filter(|entry| entry.transaction_id == *transaction_id)
            .collect()
    }
}

impl Store for MemoryStore {
    fn get_transaction(&self, id: &TransactionId) -> Result<Option<Transaction>, StoreError> {
        Ok(self.transaction(id))
    }

    fn update_transaction_if(
        &self,
        id: &TransactionId,
        expected: &TransactionStatus,
        update: TransactionUpdate,
    ) -> Result<Transaction, StoreError> {
        let mut stored = self.transactions.get_mut(id).ok_or_else(|| StoreError::NotFound {
            table: Table::Transactions,
            key: id.to_string(),
        })?;
        if stored.status != *expected {
            return Err(StoreError::ConditionFailed {
                table: Table::Transactions,
                key: id.to_string(),
            });
        }
        update.apply_to(&mut *stored);
        Ok(stored.clone())
    }

    fn get_audit_entry(&self, id: &AuditId) -> Result<Option<AuditEntry>, StoreError> {
        Ok(self.audit_entry(id))
    }

    fn put_audit_entry_if_absent(&self, entry: AuditEntry) -> Result<(), StoreError> {
        // Entry API gives an atomic check-and-insert on the key's shard.
        match self.audit_entries.entry(entry.audit_id.clone()) {
            Entry::Occupied(occupied) => Err(StoreError::ConditionFailed {
                table: Table::AuditEntries,
                key: occupied.key().to_string(),
            }),
            Entry::Vacant(vacant) => {
                let sequence = self.next_sequence.fetch_add(1, Ordering::Relaxed);
                vacant.insert((sequence, entry));
                Ok(())
            }
        }
    }

    fn update_audit_entry_if(
        &self,
        id: &AuditId,
        expected: AuditStatus,
        update: AuditUpdate,
    ) -> Result<AuditEntry, StoreError> {
        let mut stored = self.audit_entries.get_mut(id).ok_or_else(|| StoreError::NotFound {
            table: Table::AuditEntries,
            key: id.to_string(),
        })?;
        let (_, entry) = &mut *stored;
        if entry.status != expected {
            return Err(StoreError::ConditionFailed {
                table: Table::AuditEntries,
                key: id.to_string(),
            });
        }
        update.apply_to(entry);
        Ok(entry.clone())
    }
}
