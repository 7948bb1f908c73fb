// SPDX-License-Identifier: MIT

//! Adapter-level error types.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LockError {
    #[error("io error locking {path}: {source}")]
    Io { path: PathBuf, source: std::io::Error },

    #[error("timed out after {timeout_secs}s acquiring lock on {path}")]
    Timeout { path: PathBuf, timeout_secs: u64 },
}

#[derive(Debug, Error)]
pub enum WatchError {
    #[error("notify backend error: {0}")]
    Notify(#[from] notify::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
