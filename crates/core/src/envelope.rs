// SPDX-License-Identifier: MIT

//! Task and result envelope schemas (§3, §6).

use crate::error::EnvelopeError;
use crate::id::TaskId;
use serde::{Deserialize, Serialize};

/// A task envelope as written by an external producer under
/// `tasks/<worker>/<task_id>.json`.
///
/// Producer-supplied fields beyond `task_id`/`description`/`timeout` are
/// opaque to the runtime and preserved verbatim in `extra` so a downstream
/// consumer of the DLQ or result envelope can recover them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskEnvelope {
    pub task_id: TaskId,
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<u64>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl TaskEnvelope {
    /// Parse raw bytes read from a task file.
    ///
    /// Distinguishes "not JSON at all" from "valid JSON missing a required
    /// field" only to give better log context — both are §7 `validation`
    /// errors and both route the caller to the same DLQ `invalid_format`
    /// reason.
    pub fn parse(bytes: &[u8]) -> Result<Self, EnvelopeError> {
        let value: serde_json::Value = serde_json::from_slice(bytes)?;
        let obj = value.as_object().ok_or(EnvelopeError::MissingField("task_id"))?;
        if !obj.get("task_id").is_some_and(|v| v.is_string()) {
            return Err(EnvelopeError::MissingField("task_id"));
        }
        if !obj.get("description").is_some_and(|v| v.is_string()) {
            return Err(EnvelopeError::MissingField("description"));
        }
        Ok(serde_json::from_value(value)?)
    }
}

/// Terminal execution status recorded in a result envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Completed,
    Failed,
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskStatus::Completed => write!(f, "completed"),
            TaskStatus::Failed => write!(f, "failed"),
        }
    }
}

/// A result envelope as published atomically under
/// `results/<worker>/<task_id>.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResultEnvelope {
    pub task_id: TaskId,
    pub worker: String,
    pub status: TaskStatus,
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
    pub duration_seconds: f64,
    pub timestamp: String,
    pub retry_count: u32,
}
