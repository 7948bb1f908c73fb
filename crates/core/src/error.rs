// SPDX-License-Identifier: MIT

//! Errors raised while parsing or writing on-disk envelopes.

use thiserror::Error;

/// Errors from reading/validating a task, result, trigger, heartbeat, or
/// DLQ envelope.
#[derive(Debug, Error)]
pub enum EnvelopeError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed json: {0}")]
    Json(#[from] serde_json::Error),

    #[error("missing required field: {0}")]
    MissingField(&'static str),
}
