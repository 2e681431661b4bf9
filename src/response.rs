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

//! Request/response boundary.
//!
//! Maps workflow outcomes onto transport-level responses. Status codes and
//! messages are fixed; internal store errors are only exposed in
//! [`DetailMode::Development`].

use crate::engine::{Reversal, ReversalEngine};
use crate::error::ReversalError;
use crate::request::ReversalPayload;
use serde::Serialize;
use serde_json::{Value, json};
use tracing::debug;

pub const SUCCESS_MESSAGE: &str = "Transaction reversed successfully";
pub const NOT_FOUND_MESSAGE: &str = "Transaction not found";
pub const INTERNAL_ERROR_MESSAGE: &str = "An internal server error occurred";
pub const INVALID_PAYLOAD_MESSAGE: &str = "Invalid request payload";

/// Whether 500 responses may carry the underlying error text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DetailMode {
    #[default]
    Production,
    Development,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Response {
    pub status: u16,
    pub body: Value,
}

impl Response {
    fn error(status: u16, message: &str) -> Self {
        Self {
            status,
            body: json!({ "error": message }),
        }
    }
}

/// Converts an engine result into a response.
pub fn respond(result: &Result<Reversal, ReversalError>, mode: DetailMode) -> Response {
    match result {
        Ok(reversal) => Response {
            status: 200,
            body: json!({
                "message": SUCCESS_MESSAGE,
                "AuditID": reversal.audit_id,
            }),
        },
        Err(err @ ReversalError::NotFound(_)) => Response::error(err.http_status(), NOT_FOUND_MESSAGE),
        Err(err @ (ReversalError::Validation(_) | ReversalError::Conflict(_))) => {
            Response::error(err.http_status(), &err.to_string())
        }
        Err(err @ ReversalError::Store { .. }) => {
            let mut response = Response::error(err.http_status(), INTERNAL_ERROR_MESSAGE);
            if mode == DetailMode::Development {
                response.body["detail"] = Value::String(err.to_string());
            }
            response
        }
    }
}

/// Parses an inbound JSON payload, runs it through the engine and builds the
/// response.
pub fn handle(engine: &ReversalEngine, body: &str, mode: DetailMode) -> Response {
    let payload = match ReversalPayload::from_json(body) {
        Ok(payload) => payload,
        Err(e) => {
            debug!(error = %e, "rejecting malformed reversal payload");
            return Response::error(400, INVALID_PAYLOAD_MESSAGE);
        }
    };
    let request = match payload.into_request() {
        Ok(request) => request,
        Err(kind) => return respond(&Err(ReversalError::Validation(kind)), mode),
    };
    respond(&engine.process(&request), mode)
}
