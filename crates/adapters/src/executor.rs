// SPDX-License-Identifier: MIT

//! External CLI invocation for task execution (§4.6).

use std::path::Path;
use std::process::Stdio;
use std::time::{Duration, Instant};
use taskrelay_core::ExecutionOutcome;
use tokio::process::Command;
use tracing::{info, warn};

/// Builds and runs the external command for one task attempt, wrapping
/// `Command::output()` with a timeout and translating the process result
/// (or timeout, or spawn failure) into an [`ExecutionOutcome`].
///
/// Never returns `Err`: every failure mode the external command can
/// produce is represented as a variant of the outcome so the caller has
/// a single place to decide retry/DLQ routing.
pub struct Executor {
    pub command: String,
    pub system_prompt_file: Option<std::path::PathBuf>,
}

impl Executor {
    pub fn new(command: impl Into<String>) -> Self {
        Self { command: command.into(), system_prompt_file: None }
    }

    pub fn with_system_prompt_file(mut self, path: Option<std::path::PathBuf>) -> Self {
        self.system_prompt_file = path;
        self
    }

    /// Run the command for `description`, with `cwd` as the working
    /// directory (the task directory's parent, per the original tool's
    /// invocation convention) and `timeout` bounding total execution time.
    pub async fn execute(
        &self,
        task_id: &str,
        description: &str,
        cwd: &Path,
        timeout: Duration,
    ) -> ExecutionOutcome {
        let mut cmd = Command::new(&self.command);
        if let Some(system_prompt) = &self.system_prompt_file {
            cmd.arg("--system-prompt-file").arg(system_prompt);
        }
        cmd.arg("-p").arg(description);
        cmd.current_dir(cwd);
        run_with_timeout(cmd, task_id, timeout).await
    }
}

/// Spawn `cmd`, apply `timeout`, and translate the result into an
/// [`ExecutionOutcome`]. Factored out of [`Executor::execute`] so tests can
/// drive the timeout/spawn-failure paths with an arbitrary command instead
/// of one that must tolerate a trailing `-p <description>`.
async fn run_with_timeout(mut cmd: Command, task_id: &str, timeout: Duration) -> ExecutionOutcome {
    cmd.stdout(Stdio::piped()).stderr(Stdio::piped());

    info!(task_id, timeout_secs = timeout.as_secs(), "executing external command");
    let start = Instant::now();

    let child = match cmd.spawn() {
        Ok(child) => child,
        Err(err) => {
            return ExecutionOutcome::PipelineException { message: err.to_string() };
        }
    };

    match tokio::time::timeout(timeout, child.wait_with_output()).await {
        Ok(Ok(output)) => {
            let duration = start.elapsed();
            let exit_code = output.status.code().unwrap_or(-1);
            let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
            let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
            if exit_code == 0 {
                ExecutionOutcome::Success { exit_code, stdout, stderr, duration }
            } else {
                ExecutionOutcome::Failure { exit_code, stdout, stderr, duration }
            }
        }
        Ok(Err(err)) => ExecutionOutcome::PipelineException { message: err.to_string() },
        Err(_elapsed) => {
            warn!(task_id, timeout_secs = timeout.as_secs(), "task timed out");
            ExecutionOutcome::Failure {
                exit_code: 124,
                stdout: String::new(),
                stderr: format!("Task timed out after {}s", timeout.as_secs()),
                duration: start.elapsed(),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn success_exit_zero_is_success_outcome() {
        let executor = Executor::new("true");
        let outcome =
            executor.execute("t1", "irrelevant", Path::new("."), Duration::from_secs(5)).await;
        assert!(outcome.is_success());
    }

    #[tokio::test]
    async fn nonzero_exit_is_failure_outcome() {
        let executor = Executor::new("false");
        let outcome =
            executor.execute("t1", "irrelevant", Path::new("."), Duration::from_secs(5)).await;
        assert!(!outcome.is_success());
        assert!(matches!(outcome, ExecutionOutcome::Failure { exit_code: 1, .. }));
    }

    #[tokio::test]
    async fn missing_binary_is_pipeline_exception() {
        let executor = Executor::new("definitely-not-a-real-binary-xyz");
        let outcome =
            executor.execute("t1", "irrelevant", Path::new("."), Duration::from_secs(5)).await;
        assert!(matches!(outcome, ExecutionOutcome::PipelineException { .. }));
    }

    #[tokio::test]
    async fn timeout_produces_124_exit_code() {
        let mut cmd = Command::new("sleep");
        cmd.arg("5");
        let outcome = run_with_timeout(cmd, "t1", Duration::from_millis(50)).await;
        match outcome {
            ExecutionOutcome::Failure { exit_code, stderr, .. } => {
                assert_eq!(exit_code, 124);
                assert!(stderr.contains("timed out"));
            }
            other => panic!("expected timeout failure, got {other:?}"),
        }
    }
}
