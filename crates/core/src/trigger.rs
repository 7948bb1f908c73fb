// SPDX-License-Identifier: MIT

//! Trigger envelope schema — the listener's fan-out notification to the
//! orchestrator (§3, §6).

use serde::{Deserialize, Serialize};

/// Event kinds the listener emits under `triggers/orchestrator/`.
///
/// Serializes to the lowercase-with-underscores form used in the trigger
/// filename (`<event_type>_<epoch_ms>.json`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrchestratorEvent {
    TaskCompleted,
    TaskTimeout,
    WorkerUnhealthy,
}

impl OrchestratorEvent {
    /// The filename-stem form, e.g. `task_completed`.
    pub fn as_str(&self) -> &'static str {
        match self {
            OrchestratorEvent::TaskCompleted => "task_completed",
            OrchestratorEvent::TaskTimeout => "task_timeout",
            OrchestratorEvent::WorkerUnhealthy => "worker_unhealthy",
        }
    }
}

impl std::fmt::Display for OrchestratorEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A trigger envelope, written atomically to
/// `triggers/orchestrator/<event_type>_<epoch_ms>.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TriggerEnvelope {
    pub event_type: OrchestratorEvent,
    pub timestamp: String,
    pub data: serde_json::Map<String, serde_json::Value>,
}

impl TriggerEnvelope {
    /// Filename stem for this trigger, excluding the `.json` extension:
    /// `<event_type>_<epoch_ms>`.
    pub fn file_stem(&self, epoch_ms: u64) -> String {
        format!("{}_{}", self.event_type.as_str(), epoch_ms)
    }
}
