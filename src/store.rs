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

//! Store adapter boundary.
//!
//! The workflow only relies on single-item atomicity: a get, a put guarded by
//! "key absent", and an update guarded by "field equals the value read
//! earlier". There is no multi-item transaction across the two tables.

use crate::audit::{AuditEntry, AuditStatus, AuditUpdate};
use crate::base::{AuditId, TransactionId};
use crate::error::StoreError;
use crate::transaction::{Transaction, TransactionStatus, TransactionUpdate};
use std::fmt;

/// Logical tables behind the adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Table {
    Transactions,
    AuditEntries,
}

impl Table {
    pub fn as_str(&self) -> &'static str {
        match self {
            Table::Transactions => "transactions",
            Table::AuditEntries => "audit_entries",
        }
    }
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Key-value store adapter used by the reversal workflow.
///
/// Implementations report every failure and never retry internally. A
/// precondition mismatch must surface as [`StoreError::ConditionFailed`] and
/// must leave the stored item untouched.
pub trait Store: Send + Sync {
    fn get_transaction(&self, id: &TransactionId) -> Result<Option<Transaction>, StoreError>;

    /// Applies `update` only if the stored status still equals `expected`.
    ///
    /// Returns the transaction as written.
    fn update_transaction_if(
        &self,
        id: &TransactionId,
        expected: &TransactionStatus,
        update: TransactionUpdate,
    ) -> Result<Transaction, StoreError>;

    fn get_audit_entry(&self, id: &AuditId) -> Result<Option<AuditEntry>, StoreError>;

    /// Inserts `entry` only if no entry with the same ID exists.
    fn put_audit_entry_if_absent(&self, entry: AuditEntry) -> Result<(), StoreError>;

    /// Applies `update` only if the stored status still equals `expected`.
    ///
    /// Returns the entry as written.
    fn update_audit_entry_if(
        &self,
        id: &AuditId,
        expected: AuditStatus,
        update: AuditUpdate,
    ) -> Result<AuditEntry, StoreError>;
}
