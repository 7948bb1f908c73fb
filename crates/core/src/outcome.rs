// SPDX-License-Identifier: MIT

//! The tagged-variant result of one task execution attempt.
//!
//! Every outcome the executor can produce — success, non-zero exit, a
//! malformed task, or an unexpected pipeline exception — is a value the
//! caller matches on explicitly, rather than a mix of return codes and
//! exceptions raised at different points in the call stack.

use std::time::Duration;

#[derive(Debug, Clone)]
pub enum ExecutionOutcome {
    Success {
        exit_code: i32,
        stdout: String,
        stderr: String,
        duration: Duration,
    },
    Failure {
        exit_code: i32,
        stdout: String,
        stderr: String,
        duration: Duration,
    },
    Malformed {
        reason: String,
    },
    PipelineException {
        message: String,
    },
}

impl ExecutionOutcome {
    /// Whether this outcome should count as a successful task completion.
    pub fn is_success(&self) -> bool {
        matches!(self, ExecutionOutcome::Success { .. })
    }

    /// Whether this outcome is eligible for a retry attempt, as opposed to
    /// an immediate dead-letter (malformed tasks never become valid by
    /// retrying).
    pub fn is_retryable(&self) -> bool {
        !matches!(self, ExecutionOutcome::Malformed { .. })
    }
}
