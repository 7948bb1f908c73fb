// SPDX-License-Identifier: MIT

//! Directory-layout conventions for the shared on-disk protocol tree (§1).
//!
//! Pure path arithmetic — no I/O, no directory creation. Callers in
//! `taskrelay-storage`/`taskrelay-runtime` are responsible for creating
//! these directories and performing the actual reads/writes.

use std::path::{Path, PathBuf};

/// ```text
/// <base>/
///   tasks/<worker>/          task envelopes awaiting pickup
///   triggers/<worker>/       worker-bound triggers (producer -> worker)
///   triggers/orchestrator/   listener -> orchestrator events
///   results/<worker>/        finished result envelopes
///   heartbeats/              one file per worker (and per listener)
///   dlq/<worker>/            quarantined tasks
/// ```
#[derive(Debug, Clone)]
pub struct SharedLayout {
    base: PathBuf,
}

impl SharedLayout {
    pub fn new(base: impl Into<PathBuf>) -> Self {
        Self { base: base.into() }
    }

    pub fn base(&self) -> &Path {
        &self.base
    }

    pub fn tasks_dir(&self, worker: &str) -> PathBuf {
        self.base.join("tasks").join(worker)
    }

    pub fn task_file(&self, worker: &str, task_id: &str) -> PathBuf {
        self.tasks_dir(worker).join(format!("{task_id}.json"))
    }

    /// Advisory lock file path for a task, held for the duration of one
    /// execution attempt to guarantee at-most-once processing across
    /// cooperating watcher instances. Suffix mirrors the task file's own
    /// name (`<task_id>.json.lock`) rather than replacing it, so the lock
    /// and its task are trivially correlated by prefix.
    pub fn task_lock_file(&self, worker: &str, task_id: &str) -> PathBuf {
        self.tasks_dir(worker).join(format!("{task_id}.json.lock"))
    }

    pub fn worker_triggers_dir(&self, worker: &str) -> PathBuf {
        self.base.join("triggers").join(worker)
    }

    pub fn worker_trigger_file(&self, worker: &str, task_id: &str) -> PathBuf {
        self.worker_triggers_dir(worker).join(format!("{task_id}.trigger"))
    }

    pub fn orchestrator_triggers_dir(&self) -> PathBuf {
        self.base.join("triggers").join("orchestrator")
    }

    pub fn orchestrator_trigger_file(&self, file_stem: &str) -> PathBuf {
        self.orchestrator_triggers_dir().join(format!("{file_stem}.json"))
    }

    pub fn results_dir(&self, worker: &str) -> PathBuf {
        self.base.join("results").join(worker)
    }

    pub fn result_file(&self, worker: &str, task_id: &str) -> PathBuf {
        self.results_dir(worker).join(format!("{task_id}.json"))
    }

    pub fn heartbeats_dir(&self) -> PathBuf {
        self.base.join("heartbeats")
    }

    pub fn heartbeat_file(&self, identity: &str) -> PathBuf {
        self.heartbeats_dir().join(format!("{identity}.json"))
    }

    pub fn dlq_dir(&self, worker: &str) -> PathBuf {
        self.base.join("dlq").join(worker)
    }

    pub fn dlq_file(&self, worker: &str, file_stem: &str) -> PathBuf {
        self.dlq_dir(worker).join(format!("{file_stem}.json"))
    }

    /// All directories a worker's watcher needs to exist before it can run.
    pub fn worker_dirs(&self, worker: &str) -> Vec<PathBuf> {
        vec![
            self.tasks_dir(worker),
            self.worker_triggers_dir(worker),
            self.results_dir(worker),
            self.heartbeats_dir(),
            self.dlq_dir(worker),
        ]
    }

    /// All directories the listener needs to exist before it can run,
    /// across every worker it observes.
    pub fn listener_dirs<'a>(&self, workers: impl IntoIterator<Item = &'a str>) -> Vec<PathBuf> {
        let mut dirs = vec![self.orchestrator_triggers_dir(), self.heartbeats_dir()];
        for worker in workers {
            dirs.push(self.results_dir(worker));
        }
        dirs
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn task_file_nests_under_worker() {
        let layout = SharedLayout::new("/shared");
        assert_eq!(layout.task_file("marie", "t1"), Path::new("/shared/tasks/marie/t1.json"));
    }

    #[test]
    fn orchestrator_triggers_have_no_worker_segment() {
        let layout = SharedLayout::new("/shared");
        assert_eq!(
            layout.orchestrator_trigger_file("task_completed_1700000000000"),
            Path::new("/shared/triggers/orchestrator/task_completed_1700000000000.json")
        );
    }

    #[test]
    fn heartbeat_file_is_shared_not_per_worker_dir() {
        let layout = SharedLayout::new("/shared");
        assert_eq!(layout.heartbeat_file("marie"), Path::new("/shared/heartbeats/marie.json"));
        assert_eq!(layout.heartbeat_file("listener"), Path::new("/shared/heartbeats/listener.json"));
    }

    #[test]
    fn worker_dirs_covers_every_worker_scoped_subtree() {
        let layout = SharedLayout::new("/shared");
        let dirs = layout.worker_dirs("marie");
        assert!(dirs.contains(&PathBuf::from("/shared/tasks/marie")));
        assert!(dirs.contains(&PathBuf::from("/shared/dlq/marie")));
        assert!(dirs.contains(&PathBuf::from("/shared/heartbeats")));
    }
}
