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

//! Per-attempt workflow states.
//!
//! ```text
//!  INITIATED ──► VALIDATING ──► RECORDING_INTENT ──► MUTATING ──► FINALIZING ──► COMPLETED
//!      │              │                 │                │             │
//!      │              ├──► REJECTED     ├──► CONFLICT    ├──► CONFLICT └──► STORE_ERROR
//!      │              ├──► CONFLICT     └──► STORE_ERROR └──► STORE_ERROR
//!      │              └──► STORE_ERROR
//!      └──► COMPLETED | CONFLICT | REJECTED | VALIDATING (idempotent replay / resume)
//! ```
//!
//! A racing duplicate detected while recording intent is resolved like a
//! replay, so RECORDING_INTENT may also fall back to VALIDATING (resume) or end
//! in COMPLETED / REJECTED.
//!
//! The state is not persisted on its own: a resubmitted attempt rebuilds its
//! position from the audit entry and the transaction record.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AttemptState {
    Initiated,
    Validating,
    RecordingIntent,
    Mutating,
    Finalizing,
    /// Terminal: the transaction is refunded and the audit entry is SUCCESS
    Completed,
    /// Terminal: not found or failed validation
    Rejected,
    /// Terminal: lost a race against another attempt
    Conflict,
    /// Terminal for this call only. Resubmitting with the same key resumes.
    StoreError,
}

impl AttemptState {
    #[inline]
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            AttemptState::Completed
                | AttemptState::Rejected
                | AttemptState::Conflict
                | AttemptState::StoreError
        )
    }

    /// Terminal states from which a resubmission can still make progress.
    #[inline]
    pub fn is_resumable(&self) -> bool {
        matches!(self, AttemptState::StoreError)
    }

    pub fn can_transition_to(&self, next: AttemptState) -> bool {
        use AttemptState::*;
        matches!(
            (self, next),
            (Initiated, Validating | Completed | Conflict | Rejected | StoreError)
                | (Validating, RecordingIntent | Mutating | Finalizing)
                | (Validating, Rejected | Conflict | StoreError)
                | (RecordingIntent, Validating | Mutating | Completed | Conflict | Rejected | StoreError)
                | (Mutating, Finalizing | Conflict | Rejected | StoreError)
                | (Finalizing, Completed | Conflict | StoreError)
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AttemptState::Initiated => "INITIATED",
            AttemptState::Validating => "VALIDATING",
            AttemptState::RecordingIntent => "RECORDING_INTENT",
            AttemptState::Mutating => "MUTATING",
            AttemptState::Finalizing => "FINALIZING",
            AttemptState::Completed => "COMPLETED",
            AttemptState::Rejected => "REJECTED",
            AttemptState::Conflict => "CONFLICT",
            AttemptState::StoreError => "STORE_ERROR",
        }
    }
}

impl fmt::Display for AttemptState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
