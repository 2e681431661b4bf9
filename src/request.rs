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

//! Reversal requests.
//!
//! [`ReversalPayload`] is the wire shape accepted at the boundary;
//! [`ReversalRequest`] is the validated value the engine works with.

use crate::base::{IdempotencyKey, TransactionId};
use crate::error::ValidationKind;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize, Serializer};
use serde_json::Value;

/// Initiator recorded when the request names none.
pub const DEFAULT_INITIATOR: &str = "System";

/// A validated reversal request. Not persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReversalRequest {
    transaction_id: TransactionId,
    reversal_amount: Decimal,
    reason: Option<String>,
    initiator: String,
    idempotency_key: Option<IdempotencyKey>,
}

impl ReversalRequest {
    /// Validates and builds a request.
    ///
    /// # Errors
    ///
    /// - [`ValidationKind::MissingTransactionId`] - blank transaction ID.
    /// - [`ValidationKind::InvalidAmount`] - amount is zero or negative.
    pub fn new(
        transaction_id: impl Into<TransactionId>,
        reversal_amount: Decimal,
        reason: Option<String>,
        initiator: Option<String>,
    ) -> Result<Self, ValidationKind> {
        let transaction_id: TransactionId = transaction_id.into();
        let transaction_id = TransactionId(transaction_id.0.trim().to_string());
        if transaction_id.as_str().is_empty() {
            return Err(ValidationKind::MissingTransactionId);
        }
        if reversal_amount <= Decimal::ZERO {
            return Err(ValidationKind::InvalidAmount);
        }

        Ok(Self {
            transaction_id,
            reversal_amount,
            reason: non_blank(reason),
            initiator: non_blank(initiator).unwrap_or_else(|| DEFAULT_INITIATOR.to_string()),
            idempotency_key: None,
        })
    }

    /// Attaches a caller-supplied idempotency token. Blank tokens are ignored.
    pub fn with_idempotency_key(mut self, key: impl Into<String>) -> Self {
        self.idempotency_key = non_blank(Some(key.into())).map(IdempotencyKey);
        self
    }

    pub fn transaction_id(&self) -> &TransactionId {
        &self.transaction_id
    }

    pub fn reversal_amount(&self) -> Decimal {
        self.reversal_amount
    }

    pub fn reason(&self) -> Option<&str> {
        self.reason.as_deref()
    }

    pub fn initiator(&self) -> &str {
        &self.initiator
    }

    /// The caller's token, or a digest of the request fields when none was given.
    ///
    /// The amount is normalized first so `40`, `40.0` and `40.00` describe the
    /// same reversal.
    pub fn idempotency_key(&self) -> IdempotencyKey {
        if let Some(key) = &self.idempotency_key {
            return key.clone();
        }
        let amount = self.reversal_amount.normalize().to_string();
        IdempotencyKey::derive([
            self.transaction_id.as_str(),
            amount.as_str(),
            self.reason.as_deref().unwrap_or(""),
            self.initiator.as_str(),
        ])
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// `ReversalAmount` as it arrives on the wire: a JSON string or a JSON number.
///
/// Numbers keep their source text (`serde_json` is built with
/// `arbitrary_precision`), so neither form ever passes through `f64`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(try_from = "Value")]
pub enum AmountField {
    Text(String),
    Number(serde_json::Number),
}

impl TryFrom<Value> for AmountField {
    type Error = &'static str;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        match value {
            Value::String(text) => Ok(AmountField::Text(text)),
            Value::Number(number) => Ok(AmountField::Number(number)),
            _ => Err("ReversalAmount must be a string or a number"),
        }
    }
}

impl Serialize for AmountField {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            AmountField::Text(text) => serializer.serialize_str(text),
            AmountField::Number(number) => number.serialize(serializer),
        }
    }
}

impl AmountField {
    /// Parses the textual form into a [`Decimal`] without rounding.
    ///
    /// # Errors
    ///
    /// [`ValidationKind::InvalidAmount`] if the text is not a decimal number
    /// or carries more precision than a [`Decimal`] holds.
    pub fn to_decimal(&self) -> Result<Decimal, ValidationKind> {
        let raw = match self {
            AmountField::Text(text) => text.trim().to_string(),
            AmountField::Number(number) => number.to_string(),
        };
        parse_exact(&raw).ok_or(ValidationKind::InvalidAmount)
    }
}

/// Plain or scientific decimal notation, rejecting anything that would round.
fn parse_exact(raw: &str) -> Option<Decimal> {
    let Some((mantissa, exponent)) = raw.split_once(['e', 'E']) else {
        return Decimal::from_str_exact(raw).ok();
    };
    let mantissa = Decimal::from_str_exact(mantissa).ok()?;
    let exponent: i64 = exponent.parse().ok()?;
    let scale = i64::from(mantissa.scale()) - exponent;
    if scale >= 0 {
        let scale = u32::try_from(scale).ok()?;
        return Decimal::try_from_i128_with_scale(mantissa.mantissa(), scale).ok();
    }
    let shift = u32::try_from(-scale).ok()?;
    let unscaled = mantissa.mantissa().checked_mul(10i128.checked_pow(shift)?)?;
    Decimal::try_from_i128_with_scale(unscaled, 0).ok()
}

/// Inbound JSON payload.
///
/// ```json
/// {"TransactionID": "T1", "ReversalAmount": "40.00", "Reason": "duplicate", "Initiator": "ops"}
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReversalPayload {
    /// Missing IDs are reported as a validation error rather than a parse error.
    #[serde(rename = "TransactionID", default)]
    pub transaction_id: String,
    #[serde(rename = "ReversalAmount")]
    pub reversal_amount: AmountField,
    #[serde(rename = "Reason", default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(rename = "Initiator", default, skip_serializing_if = "Option::is_none")]
    pub initiator: Option<String>,
    #[serde(rename = "IdempotencyKey", default, skip_serializing_if = "Option::is_none")]
    pub idempotency_key: Option<String>,
}

impl ReversalPayload {
    pub fn from_json(body: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(body)
    }

    pub fn into_request(self) -> Result<ReversalRequest, ValidationKind> {
        let amount = self.reversal_amount.to_decimal()?;
        let request = ReversalRequest::new(self.transaction_id, amount, self.reason, self.initiator)?;
        Ok(match self.idempotency_key {
            Some(key) => request.with_idempotency_key(key),
            None => request,
        })
    }
}
