// SPDX-License-Identifier: MIT

//! Advisory file locking for at-most-once task execution across
//! cooperating watcher instances (§4.7, S6).

use crate::error::LockError;
use fs2::FileExt;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::debug;

/// How often to retry a contended lock before the timeout elapses.
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// An exclusive advisory lock held on `<task_file>.lock`.
///
/// Dropping the guard releases the OS-level lock and removes the lock
/// file. Unlinking on drop is best-effort: a concurrent watcher that is
/// mid-poll on the same path will simply recreate the file and proceed.
pub struct TaskLock {
    file: File,
    lock_path: PathBuf,
}

impl TaskLock {
    /// Poll for an exclusive lock on `task_path`'s sibling `.lock` file
    /// every [`POLL_INTERVAL`] until it is acquired or `timeout` elapses.
    pub async fn acquire(task_path: &Path, timeout: Duration) -> Result<Self, LockError> {
        let lock_path = lock_path_for(task_path);
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .open(&lock_path)
            .map_err(|source| LockError::Io { path: lock_path.clone(), source })?;

        let start = Instant::now();
        loop {
            match file.try_lock_exclusive() {
                Ok(()) => return Ok(Self { file, lock_path }),
                Err(_) => {
                    if start.elapsed() >= timeout {
                        return Err(LockError::Timeout {
                            path: lock_path,
                            timeout_secs: timeout.as_secs(),
                        });
                    }
                    tokio::time::sleep(POLL_INTERVAL).await;
                }
            }
        }
    }
}

impl Drop for TaskLock {
    fn drop(&mut self) {
        if let Err(err) = FileExt::unlock(&self.file) {
            debug!(path = %self.lock_path.display(), %err, "failed to unlock task lock");
        }
        if let Err(err) = std::fs::remove_file(&self.lock_path) {
            if err.kind() != std::io::ErrorKind::NotFound {
                debug!(path = %self.lock_path.display(), %err, "failed to remove task lock file");
            }
        }
    }
}

fn lock_path_for(task_path: &Path) -> PathBuf {
    let mut name = task_path.as_os_str().to_owned();
    name.push(".lock");
    PathBuf::from(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tempfile::tempdir;

    #[tokio::test]
    async fn acquire_then_drop_removes_lock_file() {
        let dir = tempdir().unwrap();
        let task_path = dir.path().join("t1.json");
        std::fs::write(&task_path, "{}").unwrap();

        let lock = TaskLock::acquire(&task_path, Duration::from_secs(1)).await.unwrap();
        assert!(lock_path_for(&task_path).exists());
        drop(lock);
        assert!(!lock_path_for(&task_path).exists());
    }

    #[tokio::test]
    async fn second_acquire_times_out_while_first_holds() {
        let dir = tempdir().unwrap();
        let task_path = Arc::new(dir.path().join("t1.json"));
        std::fs::write(task_path.as_path(), "{}").unwrap();

        let _held = TaskLock::acquire(&task_path, Duration::from_secs(1)).await.unwrap();
        let err = TaskLock::acquire(&task_path, Duration::from_millis(250)).await.unwrap_err();
        assert!(matches!(err, LockError::Timeout { .. }));
    }

    #[tokio::test]
    async fn second_acquire_succeeds_after_first_drops() {
        let dir = tempdir().unwrap();
        let task_path = dir.path().join("t1.json");
        std::fs::write(&task_path, "{}").unwrap();

        let held = TaskLock::acquire(&task_path, Duration::from_secs(1)).await.unwrap();
        drop(held);
        TaskLock::acquire(&task_path, Duration::from_secs(1)).await.unwrap();
    }
}
