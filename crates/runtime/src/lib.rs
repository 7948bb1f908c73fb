// SPDX-License-Identifier: MIT

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! taskrelay-runtime: the worker watcher and orchestrator listener event
//! loops, plus the configuration, logging, retry, and shutdown machinery
//! they share.

pub mod config;
pub mod listener;
pub mod logging;
pub mod retry;
pub mod shutdown;
pub mod watcher;

pub use config::{ConfigError, ListenerConfig, LogFormat, WatcherConfig};
pub use listener::Listener;
pub use logging::LoggingError;
pub use shutdown::Shutdown;
pub use watcher::WorkerWatcher;
