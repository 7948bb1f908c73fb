// SPDX-License-Identifier: MIT

//! `notify`-backed (inotify/FSEvents/etc.) file event source — the primary
//! wake mechanism per §4.8.

use super::{is_candidate_envelope, FileEvent, FileEventSource};
use crate::error::WatchError;
use async_trait::async_trait;
use notify::{EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::Path;
use tokio::sync::mpsc;

pub struct NotifyFileEventSource {
    _watcher: RecommendedWatcher,
    rx: mpsc::Receiver<FileEvent>,
}

impl NotifyFileEventSource {
    /// Watch `dir` (non-recursively) for create/write-close events on
    /// candidate envelope files, forwarding each through an internal
    /// channel bridged from the `notify` callback thread.
    pub fn watch(dir: &Path) -> Result<Self, WatchError> {
        let (tx, rx) = mpsc::channel(256);
        let mut watcher = notify::recommended_watcher(move |res: notify::Result<notify::Event>| {
            let Ok(event) = res else { return };
            if !matches!(event.kind, EventKind::Create(_) | EventKind::Modify(_)) {
                return;
            }
            for path in event.paths {
                if is_candidate_envelope(&path) {
                    let _ = tx.blocking_send(FileEvent { path });
                }
            }
        })?;
        watcher.watch(dir, RecursiveMode::NonRecursive)?;
        Ok(Self { _watcher: watcher, rx })
    }
}

#[async_trait]
impl FileEventSource for NotifyFileEventSource {
    async fn next_event(&mut self) -> Option<FileEvent> {
        self.rx.recv().await
    }
}
