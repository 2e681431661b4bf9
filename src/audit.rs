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

//! Audit entries.
//!
//! Every reversal attempt that gets past validation leaves exactly one entry,
//! keyed by its deterministic [`AuditId`]. The entry status is monotonic:
//!
//! ```text
//!  PENDING ──► SUCCESS
//!     │
//!     └──────► FAILED
//! ```

use crate::base::{AuditId, IdempotencyKey, TransactionId};
use crate::error::{ConflictKind, ReversalError, ValidationKind};
use crate::request::ReversalRequest;
use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Reason stored in the audit metadata when the request carried none.
pub const DEFAULT_REASON: &str = "No reason provided";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditStatus {
    Pending,
    Success,
    Failed,
}

impl AuditStatus {
    #[inline]
    pub fn is_terminal(&self) -> bool {
        matches!(self, AuditStatus::Success | AuditStatus::Failed)
    }

    /// PENDING may move to SUCCESS or FAILED; nothing else moves.
    #[inline]
    pub fn can_transition_to(&self, next: AuditStatus) -> bool {
        matches!(
            (self, next),
            (AuditStatus::Pending, AuditStatus::Success | AuditStatus::Failed)
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AuditStatus::Pending => "PENDING",
            AuditStatus::Success => "SUCCESS",
            AuditStatus::Failed => "FAILED",
        }
    }
}

impl fmt::Display for AuditStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditAction {
    Reversal,
}

/// Why an attempt ended FAILED.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FailureKind {
    IneligibleStatus,
    AmountExceeded,
    ConcurrentModification,
    TransactionNotFound,
}

impl FailureKind {
    /// Classifies a workflow error that terminates an attempt with an entry.
    ///
    /// Store failures and in-flight conflicts return `None`: they leave the
    /// entry PENDING so a resubmission can resume it.
    pub fn from_error(error: &ReversalError) -> Option<Self> {
        match error {
            ReversalError::NotFound(_) => Some(FailureKind::TransactionNotFound),
            ReversalError::Validation(ValidationKind::IneligibleStatus) => {
                Some(FailureKind::IneligibleStatus)
            }
            ReversalError::Validation(ValidationKind::AmountExceeded) => {
                Some(FailureKind::AmountExceeded)
            }
            ReversalError::Conflict(ConflictKind::ConcurrentModification) => {
                Some(FailureKind::ConcurrentModification)
            }
            _ => None,
        }
    }

    /// Rebuilds the error an attempt originally failed with.
    pub fn to_error(self, transaction_id: &TransactionId) -> ReversalError {
        match self {
            FailureKind::IneligibleStatus => ValidationKind::IneligibleStatus.into(),
            FailureKind::AmountExceeded => ValidationKind::AmountExceeded.into(),
            FailureKind::ConcurrentModification => ConflictKind::ConcurrentModification.into(),
            FailureKind::TransactionNotFound => ReversalError::NotFound(transaction_id.clone()),
        }
    }

    pub fn message(self) -> &'static str {
        match self {
            FailureKind::IneligibleStatus => "ineligible status",
            FailureKind::AmountExceeded => "amount exceeded",
            FailureKind::ConcurrentModification => "concurrent modification",
            FailureKind::TransactionNotFound => "transaction not found",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureRecord {
    #[serde(rename = "Kind")]
    pub kind: FailureKind,
    #[serde(rename = "Message")]
    pub message: String,
}

impl From<FailureKind> for FailureRecord {
    fn from(kind: FailureKind) -> Self {
        Self {
            kind,
            message: kind.message().to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditMetadata {
    #[serde(rename = "ReversalAmount")]
    pub reversal_amount: Decimal,
    #[serde(rename = "Reason")]
    pub reason: String,
    #[serde(rename = "IdempotencyKey")]
    pub idempotency_key: IdempotencyKey,
}

/// One reversal attempt in the audit ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEntry {
    #[serde(rename = "AuditID")]
    pub audit_id: AuditId,
    #[serde(rename = "TransactionID")]
    pub transaction_id: TransactionId,
    #[serde(rename = "Action")]
    pub action: AuditAction,
    #[serde(rename = "Status")]
    pub status: AuditStatus,
    #[serde(rename = "Initiator")]
    pub initiator: String,
    #[serde(rename = "Timestamp")]
    pub timestamp: DateTime<Utc>,
    #[serde(rename = "UpdatedAt")]
    pub updated_at: DateTime<Utc>,
    #[serde(rename = "Metadata")]
    pub metadata: AuditMetadata,
    #[serde(rename = "Failure", default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<FailureRecord>,
}

impl AuditEntry {
    /// Builds the PENDING entry recorded before the transaction is touched.
    pub fn pending(
        audit_id: AuditId,
        request: &ReversalRequest,
        idempotency_key: IdempotencyKey,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            audit_id,
            transaction_id: request.transaction_id().clone(),
            action: AuditAction::Reversal,
            status: AuditStatus::Pending,
            initiator: request.initiator().to_string(),
            timestamp: now,
            updated_at: now,
            metadata: AuditMetadata {
                reversal_amount: request.reversal_amount(),
                reason: request.reason().unwrap_or(DEFAULT_REASON).to_string(),
                idempotency_key,
            },
            failure: None,
        }
    }

    /// Time elapsed since the entry was created.
    pub fn age(&self, now: DateTime<Utc>) -> Duration {
        now - self.timestamp
    }

    /// Whether a resubmitted request describes the same reversal as this entry.
    ///
    /// Amounts compare by value, so `40` matches a recorded `40.00`.
    pub fn matches(&self, request: &ReversalRequest) -> bool {
        self.transaction_id == *request.transaction_id()
            && self.metadata.reversal_amount == request.reversal_amount()
            && self.metadata.reason == request.reason().unwrap_or(DEFAULT_REASON)
            && self.initiator == request.initiator()
    }

    /// The error a FAILED entry terminated with.
    pub fn failure_error(&self) -> Option<ReversalError> {
        self.failure
            .as_ref()
            .map(|failure| failure.kind.to_error(&self.transaction_id))
    }
}

/// Field changes applied to an entry by a conditional update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditUpdate {
    pub status: AuditStatus,
    pub failure: Option<FailureRecord>,
    pub updated_at: DateTime<Utc>,
}

impl AuditUpdate {
    pub fn success(now: DateTime<Utc>) -> Self {
        Self {
            status: AuditStatus::Success,
            failure: None,
            updated_at: now,
        }
    }

    pub fn failed(failure: FailureRecord, now: DateTime<Utc>) -> Self {
        Self {
            status: AuditStatus::Failed,
            failure: Some(failure),
            updated_at: now,
        }
    }

    pub(crate) fn apply_to(&self, entry: &mut AuditEntry) {
        entry.status = self.status;
        entry.updated_at = self.updated_at;
        if self.failure.is_some() {
            entry.failure = self.failure.clone();
        }
    }
}
