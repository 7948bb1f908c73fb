// SPDX-License-Identifier: MIT

#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! taskrelay-storage: atomic on-disk persistence for the listener's
//! authoritative task/worker state.

pub mod atomic;
pub mod listener_state;

pub use atomic::{read_json, write_json_atomic, AtomicWriteError};
pub use listener_state::{ListenerState, TaskLifecycle, TaskState, WorkerState};
