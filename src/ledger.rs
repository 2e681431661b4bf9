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

//! Audit ledger.
//!
//! The only component allowed to write audit entries. Entries are created
//! PENDING with a put-if-absent and finalized with an update guarded by
//! `Status == PENDING`, so a finalized entry can never be rewritten.

use crate::audit::{AuditEntry, AuditStatus, AuditUpdate, FailureRecord};
use crate::base::{AuditId, IdempotencyKey};
use crate::error::StoreError;
use crate::request::ReversalRequest;
use crate::store::Store;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::debug;

pub struct AuditLedger {
    store: Arc<dyn Store>,
}

impl AuditLedger {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    pub fn get(&self, id: &AuditId) -> Result<Option<AuditEntry>, StoreError> {
        self.store.get_audit_entry(id)
    }

    /// Records the intent to reverse as a new PENDING entry.
    ///
    /// # Errors
    ///
    /// [`StoreError::ConditionFailed`] if an entry with this ID already exists,
    /// i.e. a duplicate of the same attempt got there first.
    pub fn record_intent(
        &self,
        audit_id: AuditId,
        request: &ReversalRequest,
        idempotency_key: IdempotencyKey,
        now: DateTime<Utc>,
    ) -> Result<AuditEntry, StoreError> {
        let entry = AuditEntry::pending(audit_id, request, idempotency_key, now);
        self.store.put_audit_entry_if_absent(entry.clone())?;
        debug!(audit_id = %entry.audit_id, "audit entry recorded as PENDING");
        Ok(entry)
    }

    pub fn mark_success(&self, id: &AuditId, now: DateTime<Utc>) -> Result<AuditEntry, StoreError> {
        self.finalize(id, AuditUpdate::success(now))
    }

    pub fn mark_failed(
        &self,
        id: &AuditId,
        failure: FailureRecord,
        now: DateTime<Utc>,
    ) -> Result<AuditEntry, StoreError> {
        self.finalize(id, AuditUpdate::failed(failure, now))
    }

    fn finalize(&self, id: &AuditId, update: AuditUpdate) -> Result<AuditEntry, StoreError> {
        debug_assert!(
            AuditStatus::Pending.can_transition_to(update.status),
            "Invariant violated: audit entry finalized to {}",
            update.status
        );
        let status = update.status;
        let entry = self
            .store
            .update_audit_entry_if(id, AuditStatus::Pending, update)?;
        debug!(audit_id = %id, status = %status, "audit entry finalized");
        Ok(entry)
    }
}
