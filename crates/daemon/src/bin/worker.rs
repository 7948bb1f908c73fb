// SPDX-License-Identifier: MIT

//! taskrelay-worker: watches a worker's task directory and executes tasks
//! through the configured command, publishing results/heartbeats/DLQ
//! entries to the shared filesystem layout.

use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use taskrelay_adapters::{NoopMetrics, NotifyFileEventSource, PollingFileEventSource, PrometheusMetrics};
use taskrelay_runtime::{Shutdown, WatcherConfig, WorkerWatcher};
use tokio::sync::mpsc;

#[derive(Parser)]
#[command(name = "taskrelay-worker", version, about = "Runs a task-execution watcher for one worker")]
struct Args {
    /// Worker name; selects `tasks/<name>`, `results/<name>`, etc.
    worker_name: String,

    /// Override MAX_CONCURRENT_TASKS.
    #[arg(long)]
    max_concurrent: Option<u32>,

    /// Override LOG_LEVEL.
    #[arg(long)]
    log_level: Option<String>,

    /// Override METRICS_PORT.
    #[arg(long)]
    metrics_port: Option<u16>,

    /// Fall back to directory polling instead of inotify-based watching.
    #[arg(long)]
    poll: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let mut config = WatcherConfig::from_env(args.worker_name.clone())?;
    if let Some(max_concurrent) = args.max_concurrent {
        config.max_concurrent_tasks = max_concurrent;
    }
    if let Some(log_level) = args.log_level {
        config.log_level = log_level.to_ascii_uppercase();
    }
    if let Some(metrics_port) = args.metrics_port {
        config.metrics_port = metrics_port;
    }

    let _log_guard = taskrelay_runtime::logging::init(&config.log_level, config.log_format)?;
    tracing::info!(worker = %config.worker_name, "starting worker watcher");

    let metrics: Arc<dyn taskrelay_adapters::MetricsSink> = if config.enable_metrics {
        let prometheus = Arc::new(PrometheusMetrics::new()?);
        let addr = std::net::SocketAddr::from(([0, 0, 0, 0], config.metrics_port));
        prometheus.serve(addr)?;
        prometheus
    } else {
        Arc::new(NoopMetrics)
    };

    let task_dir = config.worker_task_dir();
    std::fs::create_dir_all(&task_dir)?;

    let events: Box<dyn taskrelay_adapters::FileEventSource> = if args.poll {
        Box::new(PollingFileEventSource::new(task_dir, std::time::Duration::from_millis(500)))
    } else {
        match NotifyFileEventSource::watch(&task_dir) {
            Ok(source) => Box::new(source),
            Err(err) => {
                tracing::warn!(%err, "inotify watch failed, falling back to polling");
                Box::new(PollingFileEventSource::new(task_dir, std::time::Duration::from_millis(500)))
            }
        }
    };

    let (requeue_tx, requeue_rx) = mpsc::unbounded_channel::<PathBuf>();
    let watcher = WorkerWatcher::new(config, metrics, requeue_tx);
    let shutdown = Shutdown::new();

    spawn_signal_handlers(shutdown.clone());

    watcher.run(events, requeue_rx, shutdown).await;
    tracing::info!("worker watcher stopped");
    Ok(())
}

/// Wires SIGTERM/SIGINT (and Ctrl+C on any platform) to `shutdown`.
fn spawn_signal_handlers(shutdown: Shutdown) {
    tokio::spawn(async move {
        #[cfg(unix)]
        {
            use tokio::signal::unix::{signal, SignalKind};
            let mut sigterm = match signal(SignalKind::terminate()) {
                Ok(sigterm) => sigterm,
                Err(err) => {
                    tracing::error!(%err, "failed to install SIGTERM handler");
                    return;
                }
            };
            tokio::select! {
                _ = sigterm.recv() => tracing::info!("received SIGTERM, shutting down"),
                _ = tokio::signal::ctrl_c() => tracing::info!("received SIGINT, shutting down"),
            }
        }
        #[cfg(not(unix))]
        {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("received ctrl-c, shutting down");
            }
        }
        shutdown.trigger();
    });
}
