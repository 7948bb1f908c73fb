// SPDX-License-Identifier: MIT

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! taskrelay-core: shared on-disk protocol types for the task runtime.
//!
//! This crate defines the wire schema (task/result/trigger/heartbeat/DLQ
//! envelopes), the worker/task id newtypes, the directory-layout
//! conventions, and the error types shared by every other crate in the
//! workspace. It performs no I/O.

pub mod dlq;
pub mod envelope;
pub mod error;
pub mod heartbeat;
pub mod id;
pub mod layout;
pub mod outcome;
pub mod time_fmt;
pub mod trigger;

pub use dlq::DlqEnvelope;
pub use envelope::{ResultEnvelope, TaskEnvelope, TaskStatus};
pub use error::EnvelopeError;
pub use heartbeat::{CircuitState, HeartbeatEnvelope, HeartbeatStats};
pub use id::TaskId;
pub use layout::SharedLayout;
pub use outcome::ExecutionOutcome;
pub use trigger::{OrchestratorEvent, TriggerEnvelope};
