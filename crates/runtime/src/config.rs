// SPDX-License-Identifier: MIT

//! Environment-sourced configuration for the worker watcher and the
//! orchestrator listener (§4.2), with the same defaults and bounds as the
//! tool this runtime replaces.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{field}: {message}")]
    Invalid { field: &'static str, message: String },
}

fn env_string(var: &str, default: &str) -> String {
    std::env::var(var).unwrap_or_else(|_| default.to_string())
}

fn env_path(var: &str, default: &str) -> PathBuf {
    PathBuf::from(env_string(var, default))
}

fn env_parse<T: std::str::FromStr>(var: &'static str, default: T) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    match std::env::var(var) {
        Ok(raw) => raw.parse::<T>().map_err(|err| ConfigError::Invalid {
            field: var,
            message: format!("{raw:?} is not valid: {err}"),
        }),
        Err(_) => Ok(default),
    }
}

fn bounded<T: PartialOrd + std::fmt::Display + Copy>(
    field: &'static str,
    value: T,
    min: T,
    max: T,
) -> Result<T, ConfigError> {
    if value < min || value > max {
        return Err(ConfigError::Invalid {
            field,
            message: format!("{value} is outside allowed range [{min}, {max}]"),
        });
    }
    Ok(value)
}

fn env_bool(var: &str, default: bool) -> bool {
    std::env::var(var).map(|v| v.eq_ignore_ascii_case("true")).unwrap_or(default)
}

/// Text or JSON structured log output (§4.3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Json,
    Text,
}

impl std::str::FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(LogFormat::Json),
            "text" => Ok(LogFormat::Text),
            other => Err(ConfigError::Invalid {
                field: "log_format",
                message: format!("{other:?} must be 'json' or 'text'"),
            }),
        }
    }
}

#[derive(Debug, Clone)]
pub struct WatcherConfig {
    pub worker_name: String,

    pub task_dir: PathBuf,
    pub trigger_dir: PathBuf,
    pub result_dir: PathBuf,
    pub heartbeat_dir: PathBuf,
    pub dlq_dir: PathBuf,

    pub max_concurrent_tasks: u32,
    pub task_timeout: Duration,
    pub heartbeat_interval: Duration,

    pub max_retries: u32,
    pub retry_backoff: f64,
    pub initial_retry_delay: Duration,

    pub circuit_breaker_threshold: u32,
    pub circuit_breaker_timeout: Duration,

    pub log_level: String,
    pub log_format: LogFormat,

    pub enable_metrics: bool,
    pub metrics_port: u16,

    pub claude_command: String,
    pub system_prompt_file: Option<PathBuf>,

    pub lock_timeout: Duration,
}

impl WatcherConfig {
    pub fn from_env(worker_name: impl Into<String>) -> Result<Self, ConfigError> {
        let max_concurrent_tasks =
            bounded("max_concurrent_tasks", env_parse("MAX_CONCURRENT_TASKS", 3u32)?, 1, 10)?;
        let task_timeout_secs =
            bounded("task_timeout", env_parse("TASK_TIMEOUT", 600u64)?, 10, 3600)?;
        let heartbeat_interval_secs =
            bounded("heartbeat_interval", env_parse("HEARTBEAT_INTERVAL", 10u64)?, 1, 60)?;
        let max_retries = bounded("max_retries", env_parse("MAX_RETRIES", 3u32)?, 0, 10)?;
        let retry_backoff =
            bounded("retry_backoff", env_parse("RETRY_BACKOFF", 2.0f64)?, 1.0, 10.0)?;
        let initial_retry_delay_secs = bounded(
            "initial_retry_delay",
            env_parse("INITIAL_RETRY_DELAY", 1.0f64)?,
            0.1,
            60.0,
        )?;
        let circuit_breaker_threshold = bounded(
            "circuit_breaker_threshold",
            env_parse("CIRCUIT_BREAKER_THRESHOLD", 5u32)?,
            1,
            20,
        )?;
        let circuit_breaker_timeout_secs = bounded(
            "circuit_breaker_timeout",
            env_parse("CIRCUIT_BREAKER_TIMEOUT", 60u64)?,
            10,
            600,
        )?;
        let metrics_port = bounded("metrics_port", env_parse("METRICS_PORT", 9090u16)?, 1024, 65535)?;
        let lock_timeout_secs = bounded("lock_timeout", env_parse("LOCK_TIMEOUT", 30u64)?, 1, 300)?;
        let log_format: LogFormat = env_string("LOG_FORMAT", "json").parse()?;

        Ok(Self {
            worker_name: worker_name.into(),
            task_dir: env_path("TASK_DIR", "/shared/tasks"),
            trigger_dir: env_path("TRIGGER_DIR", "/shared/triggers"),
            result_dir: env_path("RESULT_DIR", "/shared/results"),
            heartbeat_dir: env_path("HEARTBEAT_DIR", "/shared/heartbeats"),
            dlq_dir: env_path("DLQ_DIR", "/shared/dlq"),
            max_concurrent_tasks,
            task_timeout: Duration::from_secs(task_timeout_secs),
            heartbeat_interval: Duration::from_secs(heartbeat_interval_secs),
            max_retries,
            retry_backoff,
            initial_retry_delay: Duration::from_secs_f64(initial_retry_delay_secs),
            circuit_breaker_threshold,
            circuit_breaker_timeout: Duration::from_secs(circuit_breaker_timeout_secs),
            log_level: env_string("LOG_LEVEL", "INFO").to_ascii_uppercase(),
            log_format,
            enable_metrics: env_bool("ENABLE_METRICS", true),
            metrics_port,
            claude_command: env_string("CLAUDE_COMMAND", "claude"),
            system_prompt_file: std::env::var("SYSTEM_PROMPT_FILE").ok().map(PathBuf::from),
            lock_timeout: Duration::from_secs(lock_timeout_secs),
        })
    }

    pub fn worker_task_dir(&self) -> PathBuf {
        self.task_dir.join(&self.worker_name)
    }

    pub fn worker_trigger_dir(&self) -> PathBuf {
        self.trigger_dir.join(&self.worker_name)
    }

    pub fn worker_result_dir(&self) -> PathBuf {
        self.result_dir.join(&self.worker_name)
    }

    pub fn worker_dlq_dir(&self) -> PathBuf {
        self.dlq_dir.join(&self.worker_name)
    }
}

#[derive(Debug, Clone)]
pub struct ListenerConfig {
    pub workers: Vec<String>,

    pub result_dir: PathBuf,
    pub trigger_dir: PathBuf,
    pub heartbeat_dir: PathBuf,

    pub poll_interval: Duration,
    pub completion_timeout: Duration,
    pub heartbeat_interval: Duration,

    pub log_level: String,
    pub log_format: LogFormat,

    pub state_file: PathBuf,
}

impl ListenerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let poll_interval_secs =
            bounded("poll_interval", env_parse("POLL_INTERVAL", 0.5f64)?, 0.1, 5.0)?;
        let completion_timeout_secs = bounded(
            "completion_timeout",
            env_parse("COMPLETION_TIMEOUT", 600u64)?,
            10,
            3600,
        )?;
        let heartbeat_interval_secs =
            bounded("heartbeat_interval", env_parse("HEARTBEAT_INTERVAL", 10u64)?, 1, 60)?;
        let log_format: LogFormat = env_string("LOG_FORMAT", "json").parse()?;
        let workers = env_string("WORKERS", "marie,anga,fabien")
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        Ok(Self {
            workers,
            result_dir: env_path("RESULT_DIR", "/shared/results"),
            trigger_dir: env_path("TRIGGER_DIR", "/shared/triggers"),
            heartbeat_dir: env_path("HEARTBEAT_DIR", "/shared/heartbeats"),
            poll_interval: Duration::from_secs_f64(poll_interval_secs),
            completion_timeout: Duration::from_secs(completion_timeout_secs),
            heartbeat_interval: Duration::from_secs(heartbeat_interval_secs),
            log_level: env_string("LOG_LEVEL", "INFO").to_ascii_uppercase(),
            log_format,
            state_file: env_path("STATE_FILE", "/shared/orchestrator_state.json"),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    fn clear_watcher_env() {
        for var in [
            "MAX_CONCURRENT_TASKS",
            "TASK_TIMEOUT",
            "HEARTBEAT_INTERVAL",
            "MAX_RETRIES",
            "RETRY_BACKOFF",
            "INITIAL_RETRY_DELAY",
            "CIRCUIT_BREAKER_THRESHOLD",
            "CIRCUIT_BREAKER_TIMEOUT",
            "METRICS_PORT",
            "LOCK_TIMEOUT",
            "LOG_FORMAT",
        ] {
            std::env::remove_var(var);
        }
    }

    #[test]
    #[serial]
    fn defaults_match_the_original_tool() {
        clear_watcher_env();
        let config = WatcherConfig::from_env("marie").unwrap();
        assert_eq!(config.max_concurrent_tasks, 3);
        assert_eq!(config.task_timeout, Duration::from_secs(600));
        assert_eq!(config.max_retries, 3);
        assert_eq!(config.circuit_breaker_threshold, 5);
        assert_eq!(config.metrics_port, 9090);
        assert_eq!(config.lock_timeout, Duration::from_secs(30));
    }

    #[test]
    #[serial]
    fn out_of_range_value_is_rejected() {
        clear_watcher_env();
        std::env::set_var("MAX_CONCURRENT_TASKS", "99");
        let err = WatcherConfig::from_env("marie").unwrap_err();
        std::env::remove_var("MAX_CONCURRENT_TASKS");
        assert!(matches!(err, ConfigError::Invalid { field: "MAX_CONCURRENT_TASKS", .. }));
    }

    #[test]
    #[serial]
    fn worker_task_dir_nests_under_worker_name() {
        clear_watcher_env();
        let config = WatcherConfig::from_env("marie").unwrap();
        assert_eq!(config.worker_task_dir(), PathBuf::from("/shared/tasks/marie"));
    }

    #[test]
    #[serial]
    fn listener_defaults_split_worker_list() {
        std::env::remove_var("WORKERS");
        let config = ListenerConfig::from_env().unwrap();
        assert_eq!(config.workers, vec!["marie", "anga", "fabien"]);
    }
}
