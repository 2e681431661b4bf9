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

//! Transaction records.
//!
//! The upstream payment system owns the lifecycle of a transaction; this crate
//! only ever performs one transition on it:
//! - [`Completed`] → [`Refunded`] (via a successful reversal)
//!
//! [`Completed`]: TransactionStatus::Completed
//! [`Refunded`]: TransactionStatus::Refunded

use crate::base::{AuditId, TransactionId};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::fmt;
use std::str::FromStr;

/// Status of a transaction as stored by the upstream system.
///
/// Parsing is case- and whitespace-insensitive: `" completed "` reads as
/// [`TransactionStatus::Completed`]. Unknown values are preserved as
/// [`TransactionStatus::Other`] in their normalized form.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum TransactionStatus {
    Pending,
    Completed,
    Success,
    Refunded,
    Failed,
    Other(String),
}

impl TransactionStatus {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Pending => "PENDING",
            Self::Completed => "COMPLETED",
            Self::Success => "SUCCESS",
            Self::Refunded => "REFUNDED",
            Self::Failed => "FAILED",
            Self::Other(raw) => raw,
        }
    }
}

impl FromStr for TransactionStatus {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_uppercase();
        Ok(match normalized.as_str() {
            "PENDING" => Self::Pending,
            "COMPLETED" => Self::Completed,
            "SUCCESS" => Self::Success,
            "REFUNDED" => Self::Refunded,
            "FAILED" => Self::Failed,
            _ => Self::Other(normalized),
        })
    }
}

impl From<String> for TransactionStatus {
    fn from(value: String) -> Self {
        match value.parse() {
            Ok(status) => status,
            Err(never) => match never {},
        }
    }
}

impl From<TransactionStatus> for String {
    fn from(status: TransactionStatus) -> Self {
        status.as_str().to_string()
    }
}

impl fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A financial transaction as held in the transactions table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    #[serde(rename = "TransactionID")]
    pub transaction_id: TransactionId,
    #[serde(rename = "Status")]
    pub status: TransactionStatus,
    #[serde(rename = "Amount")]
    pub amount: Decimal,
    /// Audit entry of the reversal that refunded this transaction, if any.
    #[serde(rename = "ReversalAuditID", default, skip_serializing_if = "Option::is_none")]
    pub reversal_audit_id: Option<AuditId>,
}

impl Transaction {
    pub fn new(
        transaction_id: impl Into<TransactionId>,
        status: TransactionStatus,
        amount: Decimal,
    ) -> Self {
        Self {
            transaction_id: transaction_id.into(),
            status,
            amount,
            reversal_audit_id: None,
        }
    }

    /// Returns `true` if this transaction was refunded by the given audit entry.
    pub fn refunded_by(&self, audit_id: &AuditId) -> bool {
        self.status == TransactionStatus::Refunded
            && self.reversal_audit_id.as_ref() == Some(audit_id)
    }
}

/// Field changes applied to a transaction by a conditional update.
///
/// `Amount` is deliberately absent: it is immutable once the transaction
/// completed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionUpdate {
    pub status: TransactionStatus,
    pub reversal_audit_id: Option<AuditId>,
}

impl TransactionUpdate {
    /// Marks the transaction refunded and links it to the refunding audit entry.
    pub fn refund(audit_id: AuditId) -> Self {
        Self {
            status: TransactionStatus::Refunded,
            reversal_audit_id: Some(audit_id),
        }
    }

    pub(crate) fn apply_to(&self, transaction: &mut Transaction) {
        transaction.status = self.status.clone();
        if let Some(audit_id) = &self.reversal_audit_id {
            transaction.reversal_audit_id = Some(audit_id.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn status_parsing_is_normalized() {
        assert_eq!(" completed ".parse::<TransactionStatus>().unwrap(), TransactionStatus::Completed);
        assert_eq!("Refunded".parse::<TransactionStatus>().unwrap(), TransactionStatus::Refunded);
        assert_eq!("\tsuccess\n".parse::<TransactionStatus>().unwrap(), TransactionStatus::Success);
    }

    #[test]
    fn unknown_status_is_kept_normalized() {
        let status: TransactionStatus = " chargeback ".parse().unwrap();
        assert_eq!(status, TransactionStatus::Other("CHARGEBACK".to_string()));
        assert_eq!(status.to_string(), "CHARGEBACK");
    }

    #[test]
    fn transaction_uses_wire_field_names() {
        let json = r#"{"TransactionID":"T1","Status":" completed","Amount":"100.00"}"#;
        let tx: Transaction = serde_json::from_str(json).unwrap();
        assert_eq!(tx.transaction_id, TransactionId::from("T1"));
        assert_eq!(tx.status, TransactionStatus::Completed);
        assert_eq!(tx.amount, dec!(100.00));
        assert_eq!(tx.reversal_audit_id, None);

        let out = serde_json::to_value(&tx).unwrap();
        assert_eq!(out["Status"], "COMPLETED");
        assert!(out.get("ReversalAuditID").is_none());
    }

    #[test]
    fn refund_update_keeps_amount() {
        let mut tx = Transaction::new("T1", TransactionStatus::Completed, dec!(20.00));
        let audit_id = AuditId("audit-1".to_string());
        TransactionUpdate::refund(audit_id.clone()).apply_to(&mut tx);

        assert_eq!(tx.status, TransactionStatus::Refunded);
        assert_eq!(tx.amount, dec!(20.00));
        assert!(tx.refunded_by(&audit_id));
        assert!(!tx.refunded_by(&AuditId("audit-2".to_string())));
    }
}
