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

//! Reversal workflow engine.
//!
//! The [`ReversalEngine`] turns a [`ReversalRequest`] into at most one
//! `COMPLETED → REFUNDED` transition of the referenced transaction, recording
//! the attempt in the audit ledger first.
//!
//! # Workflow
//!
//! 1. **Idempotency**: the audit ID is derived from the transaction ID and the
//!    idempotency key. An existing SUCCESS entry is replayed, a FAILED entry
//!    reports its original error, a fresh PENDING entry is a conflicting
//!    in-flight attempt, and a stale PENDING entry is resumed.
//! 2. **Fetch** the transaction.
//! 3. **Validate** status and amount.
//! 4. **Record intent**: put the PENDING entry if absent.
//! 5. **Mutate**: set `REFUNDED` conditioned on the status read in step 2.
//! 6. **Finalize**: mark the entry SUCCESS.
//!
//! # Consistency
//!
//! The engine holds no shared mutable state. Exclusivity between attempts on
//! the same transaction comes only from the conditional update in step 5, and
//! crash recovery only from resubmitting with the same idempotency key. The
//! refund writes the audit ID onto the transaction in the same conditional
//! update, which is how a resumed attempt recognizes its own earlier write.

use crate::audit::{AuditEntry, AuditStatus, FailureKind};
use crate::base::{AuditId, TransactionId};
use crate::error::{ConflictKind, ReversalError, StoreError, ValidationKind};
use crate::ledger::AuditLedger;
use crate::request::ReversalRequest;
use crate::state::AttemptState;
use crate::store::{Store, Table};
use crate::transaction::{Transaction, TransactionStatus, TransactionUpdate};
use chrono::{Duration, Utc};
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::{debug, error, info, info_span, warn};

/// Engine tunables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Statuses from which a transaction may be reversed, compared after
    /// normalization.
    pub eligible_statuses: Vec<TransactionStatus>,

    /// Age after which a PENDING audit entry is presumed abandoned by a
    /// crashed attempt and may be resumed.
    pub recovery_threshold: Duration,
}

impl EngineConfig {
    pub const DEFAULT_RECOVERY_THRESHOLD_SECS: i64 = 30;

    pub fn with_recovery_threshold(mut self, threshold: Duration) -> Self {
        self.recovery_threshold = threshold;
        self
    }

    pub fn with_eligible_statuses(mut self, statuses: Vec<TransactionStatus>) -> Self {
        self.eligible_statuses = statuses;
        self
    }

    pub fn is_eligible(&self, status: &TransactionStatus) -> bool {
        *status != TransactionStatus::Refunded && self.eligible_statuses.contains(status)
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            eligible_statuses: vec![TransactionStatus::Completed],
            recovery_threshold: Duration::seconds(Self::DEFAULT_RECOVERY_THRESHOLD_SECS),
        }
    }
}

/// A completed reversal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reversal {
    pub audit_id: AuditId,
    pub transaction_id: TransactionId,
    pub reversal_amount: Decimal,
    /// `true` when an earlier submission with the same key did the work.
    pub replayed: bool,
}

impl Reversal {
    fn from_entry(entry: &AuditEntry, replayed: bool) -> Self {
        Self {
            audit_id: entry.audit_id.clone(),
            transaction_id: entry.transaction_id.clone(),
            reversal_amount: entry.metadata.reversal_amount,
            replayed,
        }
    }
}

/// Tracks where a single call is in the workflow.
struct Attempt {
    state: AttemptState,
}

impl Attempt {
    fn new() -> Self {
        Self {
            state: AttemptState::Initiated,
        }
    }

    fn advance(&mut self, next: AttemptState) {
        debug_assert!(
            self.state.can_transition_to(next),
            "Invariant violated: attempt moved {} -> {}",
            self.state,
            next
        );
        debug!(from = %self.state, to = %next, "attempt state");
        self.state = next;
    }

    /// Moves to the terminal state matching `err` and hands it back.
    fn fail(&mut self, err: ReversalError) -> ReversalError {
        let next = match &err {
            ReversalError::NotFound(_) | ReversalError::Validation(_) => AttemptState::Rejected,
            ReversalError::Conflict(_) => AttemptState::Conflict,
            ReversalError::Store { .. } => AttemptState::StoreError,
        };
        self.advance(next);
        err
    }

    /// Wraps an adapter failure with the state it interrupted.
    fn store_error(&mut self, source: StoreError) -> ReversalError {
        let err = ReversalError::store(self.state, source);
        self.advance(AttemptState::StoreError);
        err
    }
}

/// Reversal workflow engine.
///
/// Cheap to share: all coordination goes through the [`Store`], so any number
/// of engines, threads or processes may run against the same store.
pub struct ReversalEngine {
    store: Arc<dyn Store>,
    ledger: AuditLedger,
    config: EngineConfig,
}

impl ReversalEngine {
    pub fn new(store: Arc<dyn Store>, config: EngineConfig) -> Self {
        Self {
            ledger: AuditLedger::new(Arc::clone(&store)),
            store,
            config,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Processes a reversal request.
    ///
    /// # Errors
    ///
    /// - [`ReversalError::NotFound`] - the transaction does not exist.
    /// - [`ReversalError::Validation`] - ineligible status, amount above the
    ///   original, or an idempotency key reused for a different amount.
    /// - [`ReversalError::Conflict`] - another attempt is in flight or won the
    ///   race for this transaction.
    /// - [`ReversalError::Store`] - the adapter failed. Resubmit with the same
    ///   idempotency key to resume.
    pub fn process(&self, request: &ReversalRequest) -> Result<Reversal, ReversalError> {
        let key = request.idempotency_key();
        let audit_id = AuditId::derive(request.transaction_id(), &key);
        let span = info_span!(
            "reversal",
            transaction_id = %request.transaction_id(),
            audit_id = %audit_id
        );
        let _enter = span.enter();

        let mut attempt = Attempt::new();
        let result = self.run(request, &audit_id, &mut attempt);

        match &result {
            Ok(reversal) => info!(
                amount = %reversal.reversal_amount,
                replayed = reversal.replayed,
                "transaction reversed"
            ),
            Err(err) if err.is_retryable() => warn!(
                error = %err,
                code = err.code(),
                state = %attempt.state,
                "reversal not completed"
            ),
            Err(err) => info!(error = %err, code = err.code(), "reversal rejected"),
        }
        result
    }

    fn run(
        &self,
        request: &ReversalRequest,
        audit_id: &AuditId,
        attempt: &mut Attempt,
    ) -> Result<Reversal, ReversalError> {
        // Step 1: idempotency
        let existing = self
            .ledger
            .get(audit_id)
            .map_err(|e| attempt.store_error(e))?;
        if let Some(entry) = existing {
            return self.resolve_existing(request, entry, attempt);
        }

        // Steps 2-3: fetch and validate
        attempt.advance(AttemptState::Validating);
        let transaction = self.fetch(request.transaction_id(), attempt)?;
        if transaction.refunded_by(audit_id) {
            // A duplicate submission recorded and applied this very attempt.
            attempt.advance(AttemptState::RecordingIntent);
            return self.rejoin(request, audit_id, attempt);
        }
        if let Err(err) = self.validate(&transaction, request.reversal_amount()) {
            return Err(attempt.fail(err));
        }

        // Step 4: record intent
        attempt.advance(AttemptState::RecordingIntent);
        let entry = match self.ledger.record_intent(
            audit_id.clone(),
            request,
            request.idempotency_key(),
            Utc::now(),
        ) {
            Ok(entry) => entry,
            Err(e) if e.is_condition_failed() => {
                debug!("audit entry already recorded by a duplicate submission");
                return self.rejoin(request, audit_id, attempt);
            }
            Err(e) => return Err(attempt.store_error(e)),
        };

        // Steps 5-7
        attempt.advance(AttemptState::Mutating);
        self.mutate(&entry, &transaction, attempt)
    }

    /// Re-reads the entry a duplicate submission created and resolves against it.
    fn rejoin(
        &self,
        request: &ReversalRequest,
        audit_id: &AuditId,
        attempt: &mut Attempt,
    ) -> Result<Reversal, ReversalError> {
        let entry = self
            .ledger
            .get(audit_id)
            .map_err(|e| attempt.store_error(e))?
            .ok_or_else(|| {
                attempt.store_error(StoreError::NotFound {
                    table: Table::AuditEntries,
                    key: audit_id.to_string(),
                })
            })?;
        self.resolve_existing(request, entry, attempt)
    }

    /// Decides what an existing entry for this audit ID means for the caller.
    fn resolve_existing(
        &self,
        request: &ReversalRequest,
        entry: AuditEntry,
        attempt: &mut Attempt,
    ) -> Result<Reversal, ReversalError> {
        if !entry.matches(request) {
            warn!(
                recorded_amount = %entry.metadata.reversal_amount,
                requested_amount = %request.reversal_amount(),
                "idempotency key reused with different parameters"
            );
            return Err(attempt.fail(ValidationKind::IdempotencyMismatch.into()));
        }

        match entry.status {
            AuditStatus::Success => {
                debug!("replaying completed reversal");
                attempt.advance(AttemptState::Completed);
                Ok(Reversal::from_entry(&entry, true))
            }
            AuditStatus::Failed => {
                let err = entry
                    .failure_error()
                    .unwrap_or_else(|| ConflictKind::ConcurrentModification.into());
                Err(attempt.fail(err))
            }
            AuditStatus::Pending => {
                let age = entry.age(Utc::now());
                if age < self.config.recovery_threshold {
                    return Err(attempt.fail(ConflictKind::ConcurrentAttempt.into()));
                }
                warn!(
                    age_ms = age.num_milliseconds(),
                    "resuming stale PENDING audit entry"
                );
                self.resume(entry, attempt)
            }
        }
    }

    /// Continues an attempt whose earlier run stopped after recording intent.
    fn resume(&self, entry: AuditEntry, attempt: &mut Attempt) -> Result<Reversal, ReversalError> {
        attempt.advance(AttemptState::Validating);
        let transaction = match self.fetch(&entry.transaction_id, attempt) {
            Ok(transaction) => transaction,
            Err(err) => return Err(self.abandon(&entry, err)),
        };

        if transaction.refunded_by(&entry.audit_id) {
            debug!("refund of this attempt already landed, finalizing audit entry");
            attempt.advance(AttemptState::Finalizing);
            return self.finalize(&entry, attempt);
        }

        if let Err(err) = self.validate(&transaction, entry.metadata.reversal_amount) {
            let err = attempt.fail(err);
            return Err(self.abandon(&entry, err));
        }

        attempt.advance(AttemptState::Mutating);
        self.mutate(&entry, &transaction, attempt)
    }

    fn fetch(&self, id: &TransactionId, attempt: &mut Attempt) -> Result<Transaction, ReversalError> {
        match self.store.get_transaction(id) {
            Ok(Some(transaction)) => Ok(transaction),
            Ok(None) => Err(attempt.fail(ReversalError::NotFound(id.clone()))),
            Err(e) => Err(attempt.store_error(e)),
        }
    }

    fn validate(&self, transaction: &Transaction, amount: Decimal) -> Result<(), ReversalError> {
        // Already reversed by some other attempt.
        if transaction.status == TransactionStatus::Refunded {
            return Err(ConflictKind::ConcurrentModification.into());
        }
        if !self.config.is_eligible(&transaction.status) {
            return Err(ValidationKind::IneligibleStatus.into());
        }
        if amount > transaction.amount {
            return Err(ValidationKind::AmountExceeded.into());
        }
        Ok(())
    }

    /// Step 5: conditional status update, then step 6.
    fn mutate(
        &self,
        entry: &AuditEntry,
        transaction: &Transaction,
        attempt: &mut Attempt,
    ) -> Result<Reversal, ReversalError> {
        let update = TransactionUpdate::refund(entry.audit_id.clone());
        match self.store.update_transaction_if(
            &transaction.transaction_id,
            &transaction.status,
            update,
        ) {
            Ok(_) => {}
            Err(StoreError::ConditionFailed { .. }) => {
                // The winner may be a concurrent resume of this very attempt.
                let current = self
                    .store
                    .get_transaction(&transaction.transaction_id)
                    .map_err(|e| attempt.store_error(e))?;
                if !current.is_some_and(|t| t.refunded_by(&entry.audit_id)) {
                    let err = attempt.fail(ConflictKind::ConcurrentModification.into());
                    return Err(self.abandon(entry, err));
                }
                debug!("refund already written by a concurrent resume of this attempt");
            }
            Err(StoreError::NotFound { .. }) => {
                let err = attempt.fail(ReversalError::NotFound(transaction.transaction_id.clone()));
                return Err(self.abandon(entry, err));
            }
            Err(e) => {
                // The write may or may not have landed; only a retry can tell.
                warn!(error = %e, "transaction update outcome unknown, audit entry left PENDING");
                return Err(attempt.store_error(e));
            }
        }

        attempt.advance(AttemptState::Finalizing);
        self.finalize(entry, attempt)
    }

    /// Step 6: mark the entry SUCCESS.
    fn finalize(&self, entry: &AuditEntry, attempt: &mut Attempt) -> Result<Reversal, ReversalError> {
        match self.ledger.mark_success(&entry.audit_id, Utc::now()) {
            Ok(done) => {
                attempt.advance(AttemptState::Completed);
                Ok(Reversal::from_entry(&done, false))
            }
            Err(e) if e.is_condition_failed() => {
                let current = self
                    .ledger
                    .get(&entry.audit_id)
                    .map_err(|e| attempt.store_error(e))?;
                match current {
                    Some(done) if done.status == AuditStatus::Success => {
                        debug!("audit entry finalized by a concurrent resume");
                        attempt.advance(AttemptState::Completed);
                        Ok(Reversal::from_entry(&done, true))
                    }
                    _ => Err(attempt.fail(ConflictKind::ConcurrentModification.into())),
                }
            }
            Err(e) => {
                error!(
                    error = %e,
                    "transaction refunded but audit entry left PENDING, resubmit with the same key to finalize"
                );
                Err(attempt.store_error(e))
            }
        }
    }

    /// Marks the entry FAILED when `err` is a definitive outcome and returns `err`.
    ///
    /// If the ledger write fails the entry stays PENDING and a later resume
    /// reaches the same verdict, so the error is only logged.
    fn abandon(&self, entry: &AuditEntry, err: ReversalError) -> ReversalError {
        if let Some(kind) = FailureKind::from_error(&err)
            && let Err(e) = self
                .ledger
                .mark_failed(&entry.audit_id, kind.into(), Utc::now())
        {
            warn!(error = %e, failure = kind.message(), "could not mark audit entry FAILED");
        }
        err
    }
}
