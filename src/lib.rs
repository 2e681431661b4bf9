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

//! # Reversal Engine
//!
//! This library processes reversal (refund) requests against completed
//! financial transactions. Every attempt is recorded in an append-only audit
//! ledger before the transaction record is touched, and the whole workflow is
//! idempotent and resumable on top of a store that only offers single-item
//! conditional writes.
//!
//! ## Core Components
//!
//! - [`ReversalEngine`]: Orchestrates validation, the audit entry lifecycle and
//!   the transaction status transition
//! - [`Store`]: Key-value adapter boundary (get, put-if-absent, update-if)
//! - [`MemoryStore`]: In-memory adapter backed by `DashMap`
//! - [`AuditLedger`]: PENDING → SUCCESS/FAILED audit entries
//! - [`ReversalError`]: Not found / validation / conflict / store taxonomy
//! - [`response`]: Maps results onto HTTP-style status codes and bodies
//!
//! ## Example
//!
//! ```
//! use reversal_engine_rs::{
//!     EngineConfig, MemoryStore, ReversalEngine, ReversalRequest, Transaction,
//!     TransactionId, TransactionStatus,
//! };
//! use rust_decimal_macros::dec;
//! use std::sync::Arc;
//!
//! let store = Arc::new(MemoryStore::new());
//! store.insert_transaction(Transaction::new("T1", TransactionStatus::Completed, dec!(100.00)));
//!
//! let engine = ReversalEngine::new(store.clone(), EngineConfig::default());
//! let request = ReversalRequest::new("T1", dec!(40.00), None, None).unwrap();
//! let reversal = engine.process(&request).unwrap();
//!
//! let tx = store.transaction(&TransactionId::from("T1")).unwrap();
//! assert_eq!(tx.status, TransactionStatus::Refunded);
//!
//! // Resubmitting the same request replays the first outcome.
//! let again = engine.process(&request).unwrap();
//! assert_eq!(again.audit_id, reversal.audit_id);
//! assert!(again.replayed);
//! ```
//!
//! ## Concurrency
//!
//! The engine keeps no shared mutable state of its own. Two attempts racing on
//! the same transaction are serialized by the store's conditional update:
//! exactly one refunds it, the other gets a conflict.

pub mod audit;
mod base;
mod engine;
pub mod error;
mod ledger;
mod memory;
mod request;
pub mod response;
mod state;
mod store;
mod transaction;

pub use audit::{AuditEntry, AuditStatus, AuditUpdate, FailureKind};
pub use base::{AuditId, IdempotencyKey, TransactionId};
pub use engine::{EngineConfig, Reversal, ReversalEngine};
pub use error::{ConflictKind, ReversalError, StoreError, ValidationKind};
pub use ledger::AuditLedger;
pub use memory::MemoryStore;
pub use request::{ReversalPayload, ReversalRequest};
pub use state::AttemptState;
pub use store::{Store, Table};
pub use transaction::{Transaction, TransactionStatus, TransactionUpdate};
