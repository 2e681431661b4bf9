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

//! Error types for the reversal workflow and its store adapter.
//!
//! [`ReversalError`] is the only error a caller of the engine ever sees. Raw
//! adapter failures are wrapped in [`ReversalError::Store`] together with the
//! workflow state in which they happened.

use crate::base::TransactionId;
use crate::state::AttemptState;
use crate::store::Table;
use thiserror::Error;

/// Failures reported by a [`Store`](crate::Store) adapter.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// A conditional write found a different value than the precondition expected
    #[error("precondition failed on {table} key {key}")]
    ConditionFailed { table: Table, key: String },

    /// A conditional update targeted a key that does not exist
    #[error("{table} key {key} not found")]
    NotFound { table: Table, key: String },

    /// The backend could not be reached or rejected the call
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

impl StoreError {
    pub fn is_condition_failed(&self) -> bool {
        matches!(self, StoreError::ConditionFailed { .. })
    }
}

/// Business-rule violations. Never retried; the caller must fix the input.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationKind {
    #[error("Transaction ID is required")]
    MissingTransactionId,

    #[error("Reversal amount must be positive")]
    InvalidAmount,

    #[error("Transaction is not eligible for reversal")]
    IneligibleStatus,

    #[error("Reversal amount exceeds original transaction amount")]
    AmountExceeded,

    #[error("Idempotency key reused with different parameters")]
    IdempotencyMismatch,
}

/// Outcomes of losing a race. Safe to retry with backoff and the same key.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictKind {
    /// Another attempt with the same idempotency key is still in flight
    #[error("Conflicting reversal in progress")]
    ConcurrentAttempt,

    /// The transaction changed between read and conditional update
    #[error("Transaction modified concurrently")]
    ConcurrentModification,
}

/// Reversal workflow errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ReversalError {
    #[error("Transaction not found: {0}")]
    NotFound(TransactionId),

    #[error("{0}")]
    Validation(ValidationKind),

    #[error("{0}")]
    Conflict(ConflictKind),

    #[error("store failure while {state}: {source}")]
    Store {
        state: AttemptState,
        #[source]
        source: StoreError,
    },
}

impl ReversalError {
    pub(crate) fn store(state: AttemptState, source: StoreError) -> Self {
        ReversalError::Store { state, source }
    }

    /// Stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            ReversalError::NotFound(_) => "TRANSACTION_NOT_FOUND",
            ReversalError::Validation(kind) => match kind {
                ValidationKind::MissingTransactionId => "MISSING_TRANSACTION_ID",
                ValidationKind::InvalidAmount => "INVALID_AMOUNT",
                ValidationKind::IneligibleStatus => "INELIGIBLE_STATUS",
                ValidationKind::AmountExceeded => "AMOUNT_EXCEEDED",
                ValidationKind::IdempotencyMismatch => "IDEMPOTENCY_MISMATCH",
            },
            ReversalError::Conflict(kind) => match kind {
                ConflictKind::ConcurrentAttempt => "CONCURRENT_ATTEMPT",
                ConflictKind::ConcurrentModification => "CONCURRENT_MODIFICATION",
            },
            ReversalError::Store { .. } => "STORE_ERROR",
        }
    }

    pub fn http_status(&self) -> u16 {
        match self {
            ReversalError::NotFound(_) => 404,
            ReversalError::Validation(_) => 400,
            ReversalError::Conflict(_) => 409,
            ReversalError::Store { .. } => 500,
        }
    }

    /// Whether resubmitting with the same idempotency key can change the outcome.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ReversalError::Conflict(_) | ReversalError::Store { .. }
        )
    }
}

impl From<ValidationKind> for ReversalError {
    fn from(kind: ValidationKind) -> Self {
        ReversalError::Validation(kind)
    }
}

impl From<ConflictKind> for ReversalError {
    fn from(kind: ConflictKind) -> Self {
        ReversalError::Conflict(kind)
    }
}
