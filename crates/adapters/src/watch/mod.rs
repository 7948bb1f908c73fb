// SPDX-License-Identifier: MIT

//! File-event intake (§4.8/§4.9's primary wake source): a capability
//! interface over either a real `notify`-backed watcher or a polling
//! fallback, so callers never branch on which backend is active.

mod notify_source;
mod polling;

pub use notify_source::NotifyFileEventSource;
pub use polling::PollingFileEventSource;

use async_trait::async_trait;
use std::path::PathBuf;

/// A path observed to have appeared (created, or closed after a write) in
/// a watched directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEvent {
    pub path: PathBuf,
}

/// Source of file-creation events for one or more watched directories.
#[async_trait]
pub trait FileEventSource: Send {
    /// Block until the next qualifying event, or `None` if the source has
    /// been shut down and will produce no further events.
    async fn next_event(&mut self) -> Option<FileEvent>;
}

/// True if `path` is a candidate envelope file: a `.json` file that is not
/// a dotfile and not a `.tmp`/`.lock` sidecar left behind by an
/// in-progress atomic write or lock acquisition.
pub fn is_candidate_envelope(path: &std::path::Path) -> bool {
    let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
        return false;
    };
    if name.starts_with('.') {
        return false;
    }
    name.ends_with(".json") && !name.ends_with(".tmp") && !name.ends_with(".lock")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    #[test]
    fn accepts_plain_json_file() {
        assert!(is_candidate_envelope(Path::new("/tasks/marie/t1.json")));
    }

    #[test]
    fn rejects_tmp_sidecar() {
        assert!(!is_candidate_envelope(Path::new("/tasks/marie/t1.json.tmp")));
    }

    #[test]
    fn rejects_lock_sidecar() {
        assert!(!is_candidate_envelope(Path::new("/tasks/marie/t1.json.lock")));
    }

    #[test]
    fn rejects_dotfile() {
        assert!(!is_candidate_envelope(Path::new("/tasks/marie/.t1.json")));
    }

    #[test]
    fn rejects_non_json_extension() {
        assert!(!is_candidate_envelope(Path::new("/tasks/marie/t1.txt")));
    }
}
