// SPDX-License-Identifier: MIT

#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! taskrelay-adapters: the I/O-touching capability implementations —
//! advisory file locking, external command execution, file-event intake,
//! the circuit breaker, and metrics collection.

pub mod circuit_breaker;
pub mod error;
pub mod executor;
pub mod file_lock;
pub mod metrics;
pub mod watch;

pub use circuit_breaker::CircuitBreaker;
pub use error::{LockError, WatchError};
pub use executor::Executor;
pub use file_lock::TaskLock;
pub use metrics::{MetricsSink, NoopMetrics, PrometheusMetrics};
pub use watch::{FileEvent, FileEventSource, NotifyFileEventSource, PollingFileEventSource};
