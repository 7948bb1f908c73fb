// SPDX-License-Identifier: MIT

//! The worker watcher (C8): the core executor loop (§4.8).

use crate::config::WatcherConfig;
use crate::retry::backoff_delay;
use crate::shutdown::Shutdown;
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicI64, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use taskrelay_adapters::{CircuitBreaker, Executor, FileEventSource, MetricsSink, TaskLock};
use taskrelay_core::{
    DlqEnvelope, ExecutionOutcome, HeartbeatEnvelope, HeartbeatStats, ResultEnvelope, TaskEnvelope,
    TaskId, TaskStatus,
};
use tokio::sync::{mpsc, Semaphore};
use tracing::{error, info, warn};

/// Maximum time `run` waits for in-flight executions to finish once
/// shutdown is requested, per §5's "30-60s" grace-period guidance.
const SHUTDOWN_GRACE_PERIOD: Duration = Duration::from_secs(30);

/// Time deferred while the circuit breaker is open before the watcher
/// re-checks it, matching the original tool's fixed defer sleep.
const CIRCUIT_OPEN_DEFER: Duration = Duration::from_secs(5);

#[derive(Serialize)]
struct ReceivedTrigger<'a> {
    event_type: &'static str,
    task_id: &'a str,
    timestamp: String,
}

pub struct WorkerWatcher {
    config: WatcherConfig,
    executor: Executor,
    circuit_breaker: Arc<CircuitBreaker>,
    metrics: Arc<dyn MetricsSink>,
    retry_counts: Mutex<HashMap<String, u32>>,
    stats: Mutex<HeartbeatStats>,
    queue_size: AtomicI64,
    active_tasks: AtomicU32,
    started_at: Instant,
    requeue_tx: mpsc::UnboundedSender<PathBuf>,
}

impl WorkerWatcher {
    pub fn new(
        config: WatcherConfig,
        metrics: Arc<dyn MetricsSink>,
        requeue_tx: mpsc::UnboundedSender<PathBuf>,
    ) -> Arc<Self> {
        let circuit_breaker = Arc::new(CircuitBreaker::new(
            config.circuit_breaker_threshold,
            config.circuit_breaker_timeout,
        ));
        let executor = Executor::new(config.claude_command.clone())
            .with_system_prompt_file(config.system_prompt_file.clone());

        Arc::new(Self {
            config,
            executor,
            circuit_breaker,
            metrics,
            retry_counts: Mutex::new(HashMap::new()),
            stats: Mutex::new(HeartbeatStats::default()),
            queue_size: AtomicI64::new(0),
            active_tasks: AtomicU32::new(0),
            started_at: Instant::now(),
            requeue_tx,
        })
    }

    /// Run until `shutdown` is triggered, consuming events from `events`
    /// and internal retry requeues from `requeue_rx`.
    pub async fn run(
        self: &Arc<Self>,
        mut events: Box<dyn FileEventSource>,
        mut requeue_rx: mpsc::UnboundedReceiver<PathBuf>,
        shutdown: Shutdown,
    ) {
        for dir in [
            self.config.worker_task_dir(),
            self.config.worker_trigger_dir(),
            self.config.worker_result_dir(),
            self.config.heartbeat_dir.clone(),
            self.config.worker_dlq_dir(),
        ] {
            if let Err(err) = std::fs::create_dir_all(&dir) {
                error!(path = %dir.display(), %err, "failed to create required directory");
            }
        }

        let max_concurrent = self.config.max_concurrent_tasks;
        let semaphore = Arc::new(Semaphore::new(max_concurrent as usize));

        let heartbeat_handle = {
            let watcher = Arc::clone(self);
            let shutdown = shutdown.clone();
            tokio::spawn(async move { watcher.heartbeat_loop(shutdown).await })
        };

        loop {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                maybe_path = requeue_rx.recv() => {
                    match maybe_path {
                        Some(path) => self.dispatch(&semaphore, path).await,
                        None => break,
                    }
                }
                maybe_event = events.next_event() => {
                    if let Some(event) = maybe_event {
                        self.dispatch(&semaphore, event.path).await;
                    }
                }
            }
        }

        // Let in-flight executions finish within the grace period; a
        // semaphore fully drained back to `max_concurrent` permits means
        // nothing is still running.
        let _ = tokio::time::timeout(SHUTDOWN_GRACE_PERIOD, async {
            let _ = semaphore.acquire_many(max_concurrent).await;
        })
        .await;

        heartbeat_handle.abort();
    }

    async fn dispatch(self: &Arc<Self>, semaphore: &Arc<Semaphore>, path: PathBuf) {
        self.queue_size.fetch_add(1, Ordering::SeqCst);
        let permit = match Arc::clone(semaphore).acquire_owned().await {
            Ok(permit) => permit,
            Err(_) => return,
        };
        self.queue_size.fetch_sub(1, Ordering::SeqCst);
        let watcher = Arc::clone(self);
        tokio::spawn(async move {
            watcher.active_tasks.fetch_add(1, Ordering::SeqCst);
            watcher.process_task(path).await;
            watcher.active_tasks.fetch_sub(1, Ordering::SeqCst);
            drop(permit);
        });
    }

    /// Steps 1-12 of the execution pipeline for one observed task path.
    async fn process_task(self: &Arc<Self>, path: PathBuf) {
        // Step 1: lock.
        let lock = match TaskLock::acquire(&path, self.config.lock_timeout).await {
            Ok(lock) => lock,
            Err(err) => {
                warn!(path = %path.display(), %err, "lock acquisition failed, leaving task on disk");
                return;
            }
        };

        // Step 2: existence recheck.
        let bytes = match std::fs::read(&path) {
            Ok(bytes) => bytes,
            Err(_) => {
                drop(lock);
                return;
            }
        };

        // Step 3: parse.
        let task = match TaskEnvelope::parse(&bytes) {
            Ok(task) => task,
            Err(err) => {
                warn!(path = %path.display(), %err, "malformed task, moving to DLQ");
                self.dlq_malformed(&path, &bytes);
                drop(lock);
                return;
            }
        };

        // Step 4: circuit breaker gate.
        if self.circuit_breaker.is_open() {
            self.metrics.set_circuit_breaker_state(self.circuit_breaker.state());
            info!(task_id = %task.task_id, "circuit breaker open, deferring task");
            tokio::time::sleep(CIRCUIT_OPEN_DEFER).await;
            drop(lock);
            return;
        }

        // Step 5: trigger emission.
        self.emit_received_trigger(&task.task_id);

        // Step 6/7: execute and classify.
        let timeout = task.timeout.map(Duration::from_secs).unwrap_or(self.config.task_timeout);
        let cwd = self
            .config
            .worker_task_dir()
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| self.config.worker_task_dir());
        let outcome =
            self.executor.execute(task.task_id.as_str(), &task.description, &cwd, timeout).await;

        let retry_count = self.retry_count_for(task.task_id.as_str());

        match outcome {
            ExecutionOutcome::Success { exit_code, stdout, stderr, duration } => {
                self.publish_result(
                    &task,
                    TaskStatus::Completed,
                    exit_code,
                    stdout,
                    stderr,
                    duration,
                    retry_count,
                );
                self.clear_retry(task.task_id.as_str());
                let _ = std::fs::remove_file(&path);
                self.metrics.record_task_processed("completed");
                self.metrics.observe_task_duration(duration.as_secs_f64());
                self.circuit_breaker.record_success();
                self.stats.lock().tasks_processed += 1;
            }
            ExecutionOutcome::Failure { exit_code, stdout, stderr, duration } => {
                self.publish_result(
                    &task,
                    TaskStatus::Failed,
                    exit_code,
                    stdout,
                    stderr,
                    duration,
                    retry_count,
                );
                self.circuit_breaker.record_failure();
                self.handle_failure(&task, &path, retry_count).await;
            }
            ExecutionOutcome::Malformed { reason } => {
                self.dlq_task(&task, &reason, retry_count);
                let _ = std::fs::remove_file(&path);
            }
            ExecutionOutcome::PipelineException { message } => {
                warn!(task_id = %task.task_id, %message, "unexpected pipeline exception");
                self.dlq_task(&task, &format!("exception: {message}"), retry_count);
                let _ = std::fs::remove_file(&path);
                self.metrics.record_task_failed("exception");
                self.stats.lock().tasks_failed += 1;
            }
        }

        self.metrics.set_circuit_breaker_state(self.circuit_breaker.state());
        drop(lock);
    }

    async fn handle_failure(self: &Arc<Self>, task: &TaskEnvelope, path: &Path, retry_count: u32) {
        let attempts = retry_count + 1;
        self.bump_retry(task.task_id.as_str(), attempts);

        if retry_count < self.config.max_retries {
            self.stats.lock().tasks_retried += 1;
            let delay = backoff_delay(
                self.config.initial_retry_delay,
                self.config.retry_backoff,
                retry_count,
            );
            let requeue_tx = self.requeue_tx.clone();
            let path = path.to_path_buf();
            tokio::spawn(async move {
                tokio::time::sleep(delay).await;
                let _ = requeue_tx.send(path);
            });
        } else {
            self.dlq_task(task, "max_retries_exceeded", attempts);
            let _ = std::fs::remove_file(path);
            self.metrics.record_task_failed("max_retries");
            self.clear_retry(task.task_id.as_str());
            self.stats.lock().tasks_dlq += 1;
        }
    }

    fn retry_count_for(&self, task_id: &str) -> u32 {
        *self.retry_counts.lock().get(task_id).unwrap_or(&0)
    }

    fn bump_retry(&self, task_id: &str, attempts: u32) {
        self.retry_counts.lock().insert(task_id.to_string(), attempts);
    }

    fn clear_retry(&self, task_id: &str) {
        self.retry_counts.lock().remove(task_id);
    }

    #[allow(clippy::too_many_arguments)]
    fn publish_result(
        &self,
        task: &TaskEnvelope,
        status: TaskStatus,
        exit_code: i32,
        stdout: String,
        stderr: String,
        duration: Duration,
        retry_count: u32,
    ) {
        let result = ResultEnvelope {
            task_id: task.task_id.clone(),
            worker: self.config.worker_name.clone(),
            status,
            exit_code,
            stdout,
            stderr,
            duration_seconds: duration.as_secs_f64(),
            timestamp: taskrelay_core::time_fmt::now_iso8601(),
            retry_count,
        };
        let path = self.config.worker_result_dir().join(format!("{}.json", task.task_id));
        if let Err(err) = taskrelay_storage::write_json_atomic(&path, &result) {
            error!(task_id = %task.task_id, %err, "failed to publish result envelope");
        }
    }

    fn dlq_task(&self, task: &TaskEnvelope, reason: &str, retry_count: u32) {
        let entry = DlqEnvelope::new(task.clone(), reason, retry_count);
        let stem = entry.file_stem(taskrelay_core::time_fmt::epoch_secs());
        let path = self.config.worker_dlq_dir().join(format!("{stem}.json"));
        if let Err(err) = taskrelay_storage::write_json_atomic(&path, &entry) {
            error!(task_id = %task.task_id, %err, "failed to write DLQ entry");
        }
    }

    /// A task file that failed `TaskEnvelope::parse` cannot be wrapped in
    /// a typed [`DlqEnvelope`] (it lacks the fields that type requires), so
    /// this writes a best-effort raw JSON record instead.
    fn dlq_malformed(&self, path: &Path, bytes: &[u8]) {
        let task_id = path.file_stem().and_then(|s| s.to_str()).unwrap_or("unknown");
        let original = serde_json::from_slice::<serde_json::Value>(bytes)
            .unwrap_or_else(|_| serde_json::json!({ "raw": String::from_utf8_lossy(bytes) }));
        let entry = serde_json::json!({
            "task_id": task_id,
            "original": original,
            "dlq_reason": "invalid_format",
            "dlq_timestamp": taskrelay_core::time_fmt::now_iso8601(),
            "retry_count": 0,
        });
        let stem = format!("{task_id}_{}", taskrelay_core::time_fmt::epoch_secs());
        let dlq_path = self.config.worker_dlq_dir().join(format!("{stem}.json"));
        if let Err(err) = taskrelay_storage::write_json_atomic(&dlq_path, &entry) {
            error!(%task_id, %err, "failed to write DLQ entry for malformed task");
        }
        let _ = std::fs::remove_file(path);
        self.metrics.record_task_failed("invalid_format");
    }

    fn emit_received_trigger(&self, task_id: &TaskId) {
        let trigger = ReceivedTrigger {
            event_type: "received",
            task_id: task_id.as_str(),
            timestamp: taskrelay_core::time_fmt::now_iso8601(),
        };
        let path = self.config.worker_trigger_dir().join(format!("{task_id}.trigger"));
        if let Err(err) = taskrelay_storage::write_json_atomic(&path, &trigger) {
            warn!(%task_id, %err, "failed to write received trigger");
        }
    }

    async fn heartbeat_loop(self: Arc<Self>, shutdown: Shutdown) {
        loop {
            self.write_heartbeat();
            tokio::select! {
                _ = tokio::time::sleep(self.config.heartbeat_interval) => {}
                _ = shutdown.cancelled() => break,
            }
        }
    }

    fn write_heartbeat(&self) {
        let envelope = HeartbeatEnvelope {
            worker: self.config.worker_name.clone(),
            timestamp: taskrelay_core::time_fmt::now_iso8601(),
            uptime_seconds: self.started_at.elapsed().as_secs_f64(),
            queue_size: self.queue_size.load(Ordering::SeqCst).max(0) as u32,
            pid: std::process::id(),
            active_tasks: self.active_tasks.load(Ordering::SeqCst),
            circuit_breaker_state: self.circuit_breaker.state(),
            stats: *self.stats.lock(),
            status: HeartbeatEnvelope::STATUS_HEALTHY.to_string(),
        };
        let path = self.config.heartbeat_dir.join(format!("{}.json", self.config.worker_name));
        if let Err(err) = taskrelay_storage::write_json_atomic(&path, &envelope) {
            error!(worker = %self.config.worker_name, %err, "failed to write heartbeat");
        }
        self.metrics.set_queue_size(self.queue_size.load(Ordering::SeqCst));
        self.metrics.set_active_tasks(self.active_tasks.load(Ordering::SeqCst) as i64);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use taskrelay_adapters::NoopMetrics;
    use taskrelay_adapters::PollingFileEventSource;
    use tempfile::tempdir;

    fn test_config(dir: &std::path::Path, worker: &str) -> WatcherConfig {
        WatcherConfig {
            worker_name: worker.to_string(),
            task_dir: dir.join("tasks"),
            trigger_dir: dir.join("triggers"),
            result_dir: dir.join("results"),
            heartbeat_dir: dir.join("heartbeats"),
            dlq_dir: dir.join("dlq"),
            max_concurrent_tasks: 2,
            task_timeout: Duration::from_secs(5),
            heartbeat_interval: Duration::from_millis(50),
            max_retries: 3,
            retry_backoff: 2.0,
            initial_retry_delay: Duration::from_millis(10),
            circuit_breaker_threshold: 5,
            circuit_breaker_timeout: Duration::from_secs(60),
            log_level: "INFO".to_string(),
            log_format: crate::config::LogFormat::Json,
            enable_metrics: false,
            metrics_port: 9090,
            claude_command: "true".to_string(),
            system_prompt_file: None,
            lock_timeout: Duration::from_secs(1),
        }
    }

    #[tokio::test]
    async fn happy_path_produces_result_and_removes_task() {
        let dir = tempdir().unwrap();
        let config = test_config(dir.path(), "marie");
        std::fs::create_dir_all(config.worker_task_dir()).unwrap();

        let task_path = config.worker_task_dir().join("t1.json");
        std::fs::write(&task_path, br#"{"task_id":"t1","description":"hello"}"#).unwrap();

        let (requeue_tx, requeue_rx) = mpsc::unbounded_channel();
        let watcher = WorkerWatcher::new(config.clone(), Arc::new(NoopMetrics), requeue_tx);
        let events: Box<dyn FileEventSource> =
            Box::new(PollingFileEventSource::new(config.worker_task_dir(), Duration::from_millis(10)));
        let shutdown = Shutdown::new();

        let run_shutdown = shutdown.clone();
        let run_watcher = Arc::clone(&watcher);
        let handle = tokio::spawn(async move { run_watcher.run(events, requeue_rx, run_shutdown).await });

        tokio::time::sleep(Duration::from_millis(200)).await;
        shutdown.trigger();
        tokio::time::timeout(Duration::from_secs(5), handle).await.unwrap().unwrap();

        assert!(!task_path.exists());
        let result_path = config.worker_result_dir().join("t1.json");
        assert!(result_path.exists());
        let result: ResultEnvelope =
            serde_json::from_slice(&std::fs::read(result_path).unwrap()).unwrap();
        assert_eq!(result.status, TaskStatus::Completed);
        assert_eq!(result.exit_code, 0);
    }

    #[tokio::test]
    async fn malformed_task_goes_straight_to_dlq() {
        let dir = tempdir().unwrap();
        let config = test_config(dir.path(), "marie");
        std::fs::create_dir_all(config.worker_task_dir()).unwrap();
        std::fs::create_dir_all(config.worker_dlq_dir()).unwrap();

        let task_path = config.worker_task_dir().join("bad.json");
        std::fs::write(&task_path, b"not-json").unwrap();

        let (requeue_tx, _requeue_rx) = mpsc::unbounded_channel();
        let watcher = WorkerWatcher::new(config.clone(), Arc::new(NoopMetrics), requeue_tx);
        watcher.process_task(task_path.clone()).await;

        assert!(!task_path.exists());
        let dlq_entries: Vec<_> = std::fs::read_dir(config.worker_dlq_dir()).unwrap().collect();
        assert_eq!(dlq_entries.len(), 1);
    }

    #[tokio::test]
    async fn failing_command_exhausts_retries_into_dlq() {
        let dir = tempdir().unwrap();
        let mut config = test_config(dir.path(), "marie");
        config.claude_command = "false".to_string();
        config.max_retries = 1;
        config.initial_retry_delay = Duration::from_millis(5);
        std::fs::create_dir_all(config.worker_task_dir()).unwrap();
        std::fs::create_dir_all(config.worker_dlq_dir()).unwrap();
        std::fs::create_dir_all(config.worker_trigger_dir()).unwrap();
        std::fs::create_dir_all(config.worker_result_dir()).unwrap();

        let task_path = config.worker_task_dir().join("t1.json");
        std::fs::write(&task_path, br#"{"task_id":"t1","description":"hi"}"#).unwrap();

        let (requeue_tx, mut requeue_rx) = mpsc::unbounded_channel();
        let watcher = WorkerWatcher::new(config.clone(), Arc::new(NoopMetrics), requeue_tx);

        // First failure: retry_count=0 < max_retries=1, so this attempt is
        // scheduled for a backoff retry rather than DLQ'd immediately.
        watcher.process_task(task_path.clone()).await;
        assert!(std::fs::read_dir(config.worker_dlq_dir()).unwrap().next().is_none());
        let requeued_path = requeue_rx.recv().await.unwrap();

        // Second failure: retry_count=1 == max_retries=1, so retries are
        // exhausted and the task moves to DLQ.
        watcher.process_task(requeued_path).await;
        let dlq_entries: Vec<_> = std::fs::read_dir(config.worker_dlq_dir()).unwrap().collect();
        assert_eq!(dlq_entries.len(), 1);
        assert!(requeue_rx.try_recv().is_err());
    }
}
