// SPDX-License-Identifier: MIT

//! Dead-letter envelope schema (§3, §6, §7).

use crate::envelope::TaskEnvelope;
use serde::{Deserialize, Serialize};

/// A dead-lettered task, written to
/// `dlq/<worker>/<task_id>_<epoch_secs>.json`.
///
/// Carries the original task envelope verbatim plus the reason it was
/// dead-lettered, so an operator can replay it by hand after fixing the
/// underlying cause.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DlqEnvelope {
    #[serde(flatten)]
    pub task: TaskEnvelope,
    pub dlq_reason: String,
    pub dlq_timestamp: String,
    pub retry_count: u32,
}

impl DlqEnvelope {
    pub fn new(task: TaskEnvelope, reason: impl Into<String>, retry_count: u32) -> Self {
        Self {
            task,
            dlq_reason: reason.into(),
            dlq_timestamp: crate::time_fmt::now_iso8601(),
            retry_count,
        }
    }

    /// Filename stem for this entry, excluding the `.json` extension:
    /// `<task_id>_<epoch_secs>`, matching the at-least-second granularity
    /// needed to avoid clobbering repeated dead-letters of the same task.
    pub fn file_stem(&self, epoch_secs: u64) -> String {
        format!("{}_{}", self.task.task_id, epoch_secs)
    }
}
