// SPDX-License-Identifier: MIT

//! Listener-owned state: per-task and per-worker tracking tables,
//! persisted atomically after every mutating event (§3, §4.9).

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// Lifecycle status of a task as tracked by the listener. Distinct from
/// [`taskrelay_core::TaskStatus`], which only covers a result envelope's
/// two terminal outcomes — the listener additionally tracks tasks that
/// have not yet completed or that timed out before completing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskLifecycle {
    Pending,
    Processing,
    Completed,
    Failed,
    Timeout,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskState {
    pub task_id: String,
    pub worker: String,
    pub created_at: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<String>,
    pub status: TaskLifecycle,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result_file: Option<String>,
    pub attempts: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct WorkerState {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_heartbeat: Option<String>,
    #[serde(default)]
    pub active_tasks: HashSet<String>,
    #[serde(default)]
    pub completed_tasks: u64,
    #[serde(default)]
    pub failed_tasks: u64,
    #[serde(default)]
    pub is_healthy: bool,
}

impl WorkerState {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), ..Default::default() }
    }
}

/// Full authoritative listener state, persisted to a single state file.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ListenerState {
    pub tasks: HashMap<String, TaskState>,
    pub workers: HashMap<String, WorkerState>,
    #[serde(default)]
    pub total_tasks: u64,
    #[serde(default)]
    pub timeout_tasks: u64,
}

impl ListenerState {
    /// Drop entries for workers not in `known_workers`, per the startup
    /// rule that unknown-worker entries are discarded rather than carried
    /// forward indefinitely.
    pub fn retain_known_workers(&mut self, known_workers: &HashSet<String>) {
        self.workers.retain(|name, _| known_workers.contains(name));
        self.tasks.retain(|_, task| known_workers.contains(&task.worker));
    }

    pub fn worker_mut(&mut self, name: &str) -> &mut WorkerState {
        self.workers.entry(name.to_string()).or_insert_with(|| WorkerState::new(name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retain_known_workers_drops_unknown_entries() {
        let mut state = ListenerState::default();
        state.worker_mut("marie");
        state.worker_mut("ghost");
        state.tasks.insert(
            "t1".to_string(),
            TaskState {
                task_id: "t1".to_string(),
                worker: "ghost".to_string(),
                created_at: "now".to_string(),
                completed_at: None,
                status: TaskLifecycle::Pending,
                result_file: None,
                attempts: 0,
            },
        );

        let known: HashSet<String> = ["marie".to_string()].into_iter().collect();
        state.retain_known_workers(&known);

        assert!(state.workers.contains_key("marie"));
        assert!(!state.workers.contains_key("ghost"));
        assert!(!state.tasks.contains_key("t1"));
    }

    #[test]
    fn worker_mut_creates_on_first_access() {
        let mut state = ListenerState::default();
        state.worker_mut("marie").completed_tasks += 1;
        assert_eq!(state.workers["marie"].completed_tasks, 1);
    }

    #[test]
    fn serializes_lifecycle_as_lowercase() {
        let json = serde_json::to_string(&TaskLifecycle::Timeout).unwrap();
        assert_eq!(json, "\"timeout\"");
    }
}
