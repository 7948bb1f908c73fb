// SPDX-License-Identifier: MIT

//! taskrelay-listener: aggregates per-worker results, monitors worker
//! health, and sweeps timed-out tasks, fanning out orchestrator triggers.

use clap::Parser;
use taskrelay_adapters::{FileEventSource, NotifyFileEventSource, PollingFileEventSource};
use taskrelay_runtime::{ListenerConfig, Listener, Shutdown};

#[derive(Parser)]
#[command(name = "taskrelay-listener", version, about = "Aggregates worker results for the orchestrator")]
struct Args {
    /// Override WORKERS (comma-separated).
    #[arg(long, value_delimiter = ',')]
    workers: Option<Vec<String>>,

    /// Override POLL_INTERVAL (seconds), also used as the polling-fallback interval.
    #[arg(long)]
    poll_interval: Option<f64>,

    /// Override LOG_LEVEL.
    #[arg(long)]
    log_level: Option<String>,

    /// Fall back to directory polling instead of inotify-based watching.
    #[arg(long)]
    poll: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let mut config = ListenerConfig::from_env()?;
    if let Some(workers) = args.workers {
        config.workers = workers;
    }
    if let Some(poll_interval) = args.poll_interval {
        config.poll_interval = std::time::Duration::from_secs_f64(poll_interval);
    }
    if let Some(log_level) = args.log_level {
        config.log_level = log_level.to_ascii_uppercase();
    }

    let _log_guard = taskrelay_runtime::logging::init(&config.log_level, config.log_format)?;
    tracing::info!(workers = ?config.workers, "starting orchestrator listener");

    let mut result_sources: Vec<(String, Box<dyn FileEventSource>)> = Vec::new();
    for worker in &config.workers {
        let dir = config.result_dir.join(worker);
        std::fs::create_dir_all(&dir)?;
        let source: Box<dyn FileEventSource> = if args.poll {
            Box::new(PollingFileEventSource::new(dir, config.poll_interval))
        } else {
            match NotifyFileEventSource::watch(&dir) {
                Ok(source) => Box::new(source),
                Err(err) => {
                    tracing::warn!(worker, %err, "inotify watch failed, falling back to polling");
                    Box::new(PollingFileEventSource::new(dir, config.poll_interval))
                }
            }
        };
        result_sources.push((worker.clone(), source));
    }

    let listener = Listener::new(config);
    let shutdown = Shutdown::new();
    spawn_signal_handlers(shutdown.clone());

    listener.run(result_sources, shutdown).await;
    tracing::info!("orchestrator listener stopped");
    Ok(())
}

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
