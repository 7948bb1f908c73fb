// SPDX-License-Identifier: MIT

//! Polling fallback file event source, used when the platform lacks (or
//! the operator disables) change notifications (§4.8/§4.9).

use super::{is_candidate_envelope, FileEvent, FileEventSource};
use async_trait::async_trait;
use std::collections::HashSet;
use std::path::PathBuf;
use std::time::Duration;

pub struct PollingFileEventSource {
    dir: PathBuf,
    interval: Duration,
    seen: HashSet<PathBuf>,
}

impl PollingFileEventSource {
    pub fn new(dir: PathBuf, interval: Duration) -> Self {
        Self { dir, interval, seen: HashSet::new() }
    }

    fn scan(&mut self) -> Vec<FileEvent> {
        let mut fresh = Vec::new();
        let Ok(entries) = std::fs::read_dir(&self.dir) else {
            return fresh;
        };
        let mut current = HashSet::new();
        for entry in entries.flatten() {
            let path = entry.path();
            if !is_candidate_envelope(&path) {
                continue;
            }
            current.insert(path.clone());
            if !self.seen.contains(&path) {
                fresh.push(FileEvent { path });
            }
        }
        self.seen = current;
        fresh
    }
}

#[async_trait]
impl FileEventSource for PollingFileEventSource {
    async fn next_event(&mut self) -> Option<FileEvent> {
        loop {
            let fresh = self.scan();
            if let Some(event) = fresh.into_iter().next() {
                return Some(event);
            }
            tokio::time::sleep(self.interval).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn reports_only_new_files_once() {
        let dir = tempdir().unwrap();
        let mut source = PollingFileEventSource::new(dir.path().to_path_buf(), Duration::from_millis(10));

        std::fs::write(dir.path().join("t1.json"), "{}").unwrap();
        let event = source.next_event().await.unwrap();
        assert_eq!(event.path, dir.path().join("t1.json"));

        // Second scan sees no new files until another is written.
        let dir_path = dir.path().to_path_buf();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(30)).await;
            std::fs::write(dir_path.join("t2.json"), "{}").unwrap();
        });
        let event = source.next_event().await.unwrap();
        assert_eq!(event.path, dir.path().join("t2.json"));
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn ignores_lock_and_tmp_sidecars() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("t1.json.lock"), "").unwrap();
        std::fs::write(dir.path().join("t1.json.tmp"), "").unwrap();
        std::fs::write(dir.path().join("t1.json"), "{}").unwrap();

        let mut source = PollingFileEventSource::new(dir.path().to_path_buf(), Duration::from_millis(10));
        let event = source.next_event().await.unwrap();
        assert_eq!(event.path, dir.path().join("t1.json"));
    }
}
