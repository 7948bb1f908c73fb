// SPDX-License-Identifier: MIT

//! The orchestrator listener (C9): aggregates results, monitors worker
//! health, and sweeps for timed-out tasks (§4.9).

use crate::config::ListenerConfig;
use crate::shutdown::Shutdown;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::{Duration, Instant};
use taskrelay_adapters::FileEventSource;
use taskrelay_core::{CircuitState, HeartbeatEnvelope, HeartbeatStats, OrchestratorEvent, ResultEnvelope, TriggerEnvelope};
use taskrelay_storage::{ListenerState, TaskLifecycle, TaskState};
use tracing::{error, info, warn};

/// Identity this process reports in its own heartbeat file, distinct from
/// any worker name (§4.7: "owned by each watcher and the listener").
const LISTENER_IDENTITY: &str = "listener";

/// A worker is healthy iff its heartbeat file's timestamp age is below
/// this threshold (§4.9 "Worker-health monitor").
const HEALTH_THRESHOLD: Duration = Duration::from_secs(30);
const HEALTH_CHECK_INTERVAL: Duration = Duration::from_secs(10);
const TIMEOUT_SWEEP_INTERVAL: Duration = Duration::from_secs(30);

pub struct Listener {
    config: ListenerConfig,
    state: Mutex<ListenerState>,
    started_at: Instant,
}

impl Listener {
    pub fn new(config: ListenerConfig) -> Arc<Self> {
        let state = taskrelay_storage::read_json(&config.state_file).ok().flatten().unwrap_or_default();
        Arc::new(Self { config, state: Mutex::new(state), started_at: Instant::now() })
    }

    /// Run every background activity (per-worker result watchers,
    /// health monitor, timeout sweeper) until `shutdown` is triggered.
    pub async fn run(
        self: &Arc<Self>,
        result_sources: Vec<(String, Box<dyn FileEventSource>)>,
        shutdown: Shutdown,
    ) {
        {
            let known: std::collections::HashSet<String> = self.config.workers.iter().cloned().collect();
            self.state.lock().retain_known_workers(&known);
        }
        if let Err(err) = std::fs::create_dir_all(&self.config.trigger_dir.join("orchestrator")) {
            error!(%err, "failed to create orchestrator trigger directory");
        }

        let mut handles = Vec::new();

        for (worker, source) in result_sources {
            let listener = Arc::clone(self);
            let shutdown = shutdown.clone();
            handles.push(tokio::spawn(async move {
                listener.watch_results(worker, source, shutdown).await
            }));
        }

        {
            let listener = Arc::clone(self);
            let shutdown = shutdown.clone();
            handles.push(tokio::spawn(async move { listener.health_monitor_loop(shutdown).await }));
        }

        {
            let listener = Arc::clone(self);
            let shutdown = shutdown.clone();
            handles.push(tokio::spawn(async move { listener.timeout_sweeper_loop(shutdown).await }));
        }

        {
            let listener = Arc::clone(self);
            let shutdown = shutdown.clone();
            handles.push(tokio::spawn(async move { listener.heartbeat_loop(shutdown).await }));
        }

        shutdown.cancelled().await;
        self.persist_state();
        for handle in handles {
            handle.abort();
        }
    }

    async fn watch_results(
        self: Arc<Self>,
        worker: String,
        mut source: Box<dyn FileEventSource>,
        shutdown: Shutdown,
    ) {
        loop {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                maybe_event = source.next_event() => {
                    match maybe_event {
                        Some(event) => self.handle_result_file(&worker, &event.path),
                        None => break,
                    }
                }
            }
        }
    }

    fn handle_result_file(&self, worker: &str, path: &std::path::Path) {
        let bytes = match std::fs::read(path) {
            Ok(bytes) => bytes,
            Err(err) => {
                warn!(path = %path.display(), %err, "failed to read result file");
                return;
            }
        };
        let result: ResultEnvelope = match serde_json::from_slice(&bytes) {
            Ok(result) => result,
            Err(err) => {
                warn!(path = %path.display(), %err, "failed to parse result file");
                return;
            }
        };

        let now = taskrelay_core::time_fmt::now_iso8601();
        let (duration_seconds, status) = {
            let mut state = self.state.lock();
            let is_new = !state.tasks.contains_key(result.task_id.as_str());
            if is_new {
                state.total_tasks += 1;
            }
            let task_id = result.task_id.as_str().to_string();
            let lifecycle = match result.status {
                taskrelay_core::TaskStatus::Completed => TaskLifecycle::Completed,
                taskrelay_core::TaskStatus::Failed => TaskLifecycle::Failed,
            };
            let entry = state.tasks.entry(task_id.clone()).or_insert_with(|| TaskState {
                task_id: task_id.clone(),
                worker: worker.to_string(),
                created_at: now.clone(),
                completed_at: None,
                status: TaskLifecycle::Pending,
                result_file: None,
                attempts: 0,
            });
            entry.completed_at = Some(now.clone());
            entry.status = lifecycle;
            entry.result_file = Some(path.display().to_string());
            entry.attempts += 1;

            let worker_state = state.worker_mut(worker);
            worker_state.active_tasks.remove(result.task_id.as_str());
            match result.status {
                taskrelay_core::TaskStatus::Completed => worker_state.completed_tasks += 1,
                taskrelay_core::TaskStatus::Failed => worker_state.failed_tasks += 1,
            }

            (result.duration_seconds, result.status)
        };
        self.persist_state();

        let mut data = serde_json::Map::new();
        data.insert("task_id".to_string(), serde_json::json!(result.task_id.as_str()));
        data.insert("worker".to_string(), serde_json::json!(worker));
        data.insert("status".to_string(), serde_json::json!(status.to_string()));
        data.insert("result_file".to_string(), serde_json::json!(path.display().to_string()));
        data.insert("duration_seconds".to_string(), serde_json::json!(duration_seconds));
        self.emit_trigger(OrchestratorEvent::TaskCompleted, data);
    }

    async fn health_monitor_loop(self: Arc<Self>, shutdown: Shutdown) {
        loop {
            tokio::select! {
                _ = tokio::time::sleep(HEALTH_CHECK_INTERVAL) => self.check_worker_health(),
                _ = shutdown.cancelled() => break,
            }
        }
    }

    fn check_worker_health(&self) {
        let mut newly_unhealthy = Vec::new();
        for worker in self.config.workers.clone() {
            let heartbeat_path = self.config.heartbeat_dir.join(format!("{worker}.json"));
            let healthy = read_heartbeat_age(&heartbeat_path)
                .map(|age| age < HEALTH_THRESHOLD)
                .unwrap_or(false);

            let was_healthy = {
                let mut state = self.state.lock();
                let worker_state = state.worker_mut(&worker);
                let was_healthy = worker_state.is_healthy;
                worker_state.is_healthy = healthy;
                if healthy {
                    worker_state.last_heartbeat = Some(taskrelay_core::time_fmt::now_iso8601());
                }
                was_healthy
            };
            if was_healthy != healthy {
                info!(worker, healthy, "worker health transition");
                if !healthy {
                    newly_unhealthy.push(worker);
                }
            }
        }
        if !newly_unhealthy.is_empty() {
            self.persist_state();
        }
        for worker in newly_unhealthy {
            let mut data = serde_json::Map::new();
            data.insert("worker".to_string(), serde_json::json!(worker));
            self.emit_trigger(OrchestratorEvent::WorkerUnhealthy, data);
        }
    }

    async fn timeout_sweeper_loop(self: Arc<Self>, shutdown: Shutdown) {
        loop {
            tokio::select! {
                _ = tokio::time::sleep(TIMEOUT_SWEEP_INTERVAL) => self.sweep_timeouts(),
                _ = shutdown.cancelled() => break,
            }
        }
    }

    fn sweep_timeouts(&self) {
        let now = Utc::now();
        let mut timed_out = Vec::new();
        {
            let mut state = self.state.lock();
            for task in state.tasks.values_mut() {
                if task.status != TaskLifecycle::Pending {
                    continue;
                }
                let age = parse_age(&task.created_at, now);
                if age >= self.config.completion_timeout {
                    task.status = TaskLifecycle::Timeout;
                    timed_out.push((task.task_id.clone(), task.worker.clone(), age.as_secs_f64()));
                }
            }
            state.timeout_tasks += timed_out.len() as u64;
        }
        if !timed_out.is_empty() {
            self.persist_state();
        }
        for (task_id, worker, age_seconds) in timed_out {
            let mut data = serde_json::Map::new();
            data.insert("task_id".to_string(), serde_json::json!(task_id));
            data.insert("worker".to_string(), serde_json::json!(worker));
            data.insert("age_seconds".to_string(), serde_json::json!(age_seconds));
            self.emit_trigger(OrchestratorEvent::TaskTimeout, data);
        }
    }

    fn emit_trigger(&self, event_type: OrchestratorEvent, data: serde_json::Map<String, serde_json::Value>) {
        let trigger = TriggerEnvelope {
            event_type,
            timestamp: taskrelay_core::time_fmt::now_iso8601(),
            data,
        };
        let stem = trigger.file_stem(taskrelay_core::time_fmt::epoch_ms());
        let path = self.config.trigger_dir.join("orchestrator").join(format!("{stem}.json"));
        if let Err(err) = taskrelay_storage::write_json_atomic(&path, &trigger) {
            error!(%err, "failed to write orchestrator trigger");
        }
    }

    fn persist_state(&self) {
        let state = self.state.lock();
        if let Err(err) = taskrelay_storage::write_json_atomic(&self.config.state_file, &*state) {
            error!(%err, "failed to persist listener state");
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
        let (queue_size, stats) = {
            let state = self.state.lock();
            let active: u32 = state.workers.values().map(|w| w.active_tasks.len() as u32).sum();
            let failed: u64 = state.workers.values().map(|w| w.failed_tasks).sum();
            let completed: u64 = state.workers.values().map(|w| w.completed_tasks).sum();
            (active, HeartbeatStats {
                tasks_processed: completed,
                tasks_failed: failed,
                tasks_retried: 0,
                tasks_dlq: 0,
            })
        };
        let envelope = HeartbeatEnvelope {
            worker: LISTENER_IDENTITY.to_string(),
            timestamp: taskrelay_core::time_fmt::now_iso8601(),
            uptime_seconds: self.started_at.elapsed().as_secs_f64(),
            queue_size,
            pid: std::process::id(),
            active_tasks: queue_size,
            circuit_breaker_state: CircuitState::Closed,
            stats,
            status: HeartbeatEnvelope::STATUS_HEALTHY.to_string(),
        };
        let path = self.config.heartbeat_dir.join(format!("{LISTENER_IDENTITY}.json"));
        if let Err(err) = taskrelay_storage::write_json_atomic(&path, &envelope) {
            error!(%err, "failed to write listener heartbeat");
        }
    }
}

fn read_heartbeat_age(path: &std::path::Path) -> Option<Duration> {
    let bytes = std::fs::read(path).ok()?;
    let heartbeat: taskrelay_core::HeartbeatEnvelope = serde_json::from_slice(&bytes).ok()?;
    let timestamp = DateTime::parse_from_rfc3339(&heartbeat.timestamp).ok()?.with_timezone(&Utc);
    let age = Utc::now().signed_duration_since(timestamp);
    age.to_std().ok()
}

fn parse_age(created_at: &str, now: DateTime<Utc>) -> Duration {
    let Ok(created) = DateTime::parse_from_rfc3339(created_at) else {
        return Duration::ZERO;
    };
    now.signed_duration_since(created.with_timezone(&Utc)).to_std().unwrap_or(Duration::ZERO)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn test_config(dir: &std::path::Path) -> ListenerConfig {
        ListenerConfig {
            workers: vec!["marie".to_string()],
            result_dir: dir.join("results"),
            trigger_dir: dir.join("triggers"),
            heartbeat_dir: dir.join("heartbeats"),
            poll_interval: Duration::from_millis(50),
            completion_timeout: Duration::from_millis(100),
            heartbeat_interval: Duration::from_millis(50),
            log_level: "INFO".to_string(),
            log_format: crate::config::LogFormat::Json,
            state_file: dir.join("state.json"),
        }
    }

    #[test]
    fn handle_result_file_updates_state_and_persists() {
        let dir = tempdir().unwrap();
        let config = test_config(dir.path());
        std::fs::create_dir_all(config.result_dir.join("marie")).unwrap();
        let listener = Listener::new(config.clone());

        let result = ResultEnvelope {
            task_id: taskrelay_core::TaskId::new("t1"),
            worker: "marie".to_string(),
            status: taskrelay_core::TaskStatus::Completed,
            exit_code: 0,
            stdout: "hi".to_string(),
            stderr: String::new(),
            duration_seconds: 0.5,
            timestamp: taskrelay_core::time_fmt::now_iso8601(),
            retry_count: 0,
        };
        let result_path = config.result_dir.join("marie").join("t1.json");
        taskrelay_storage::write_json_atomic(&result_path, &result).unwrap();

        listener.handle_result_file("marie", &result_path);

        let state = listener.state.lock();
        assert_eq!(state.total_tasks, 1);
        assert_eq!(state.tasks["t1"].status, TaskLifecycle::Completed);
        assert!(config.state_file.exists());
        drop(state);

        listener.write_heartbeat();
        let heartbeat_path = config.heartbeat_dir.join("listener.json");
        let heartbeat: HeartbeatEnvelope =
            taskrelay_storage::read_json(&heartbeat_path).unwrap().unwrap();
        assert_eq!(heartbeat.status, HeartbeatEnvelope::STATUS_HEALTHY);
    }

    #[test]
    fn sweep_timeouts_marks_stale_pending_tasks() {
        let dir = tempdir().unwrap();
        let config = test_config(dir.path());
        std::fs::create_dir_all(config.trigger_dir.join("orchestrator")).unwrap();
        let listener = Listener::new(config.clone());

        {
            let mut state = listener.state.lock();
            state.tasks.insert(
                "t1".to_string(),
                TaskState {
                    task_id: "t1".to_string(),
                    worker: "marie".to_string(),
                    created_at: (Utc::now() - chrono::Duration::seconds(5)).to_rfc3339(),
                    completed_at: None,
                    status: TaskLifecycle::Pending,
                    result_file: None,
                    attempts: 0,
                },
            );
        }

        listener.sweep_timeouts();

        let state = listener.state.lock();
        assert_eq!(state.tasks["t1"].status, TaskLifecycle::Timeout);
        assert_eq!(state.timeout_tasks, 1);
    }
}
