// SPDX-License-Identifier: MIT

//! Prometheus-backed metrics collector with an optional scrape endpoint.

use super::{circuit_state_code, MetricsSink, DURATION_BUCKETS};
use prometheus::{
    CounterVec, Encoder, Gauge, Histogram, HistogramOpts, Opts, Registry, TextEncoder,
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::thread;
use taskrelay_core::CircuitState;
use tracing::{error, info};

pub struct PrometheusMetrics {
    registry: Registry,
    tasks_processed_total: CounterVec,
    tasks_failed_total: CounterVec,
    task_duration_seconds: Histogram,
    task_queue_size: Gauge,
    active_tasks: Gauge,
    circuit_breaker_state: Gauge,
}

impl PrometheusMetrics {
    pub fn new() -> prometheus::Result<Self> {
        let registry = Registry::new();

        let tasks_processed_total = CounterVec::new(
            Opts::new("tasks_processed_total", "Tasks processed, by terminal status"),
            &["status"],
        )?;
        let tasks_failed_total = CounterVec::new(
            Opts::new("tasks_failed_total", "Tasks failed, by reason"),
            &["reason"],
        )?;
        let task_duration_seconds = Histogram::with_opts(
            HistogramOpts::new("task_duration_seconds", "External command duration")
                .buckets(DURATION_BUCKETS.to_vec()),
        )?;
        let task_queue_size =
            Gauge::with_opts(Opts::new("task_queue_size", "Tasks pending in the intake FIFO"))?;
        let active_tasks =
            Gauge::with_opts(Opts::new("active_tasks", "Tasks currently executing"))?;
        let circuit_breaker_state = Gauge::with_opts(Opts::new(
            "circuit_breaker_state",
            "0 closed, 1 open, 2 half-open",
        ))?;

        registry.register(Box::new(tasks_processed_total.clone()))?;
        registry.register(Box::new(tasks_failed_total.clone()))?;
        registry.register(Box::new(task_duration_seconds.clone()))?;
        registry.register(Box::new(task_queue_size.clone()))?;
        registry.register(Box::new(active_tasks.clone()))?;
        registry.register(Box::new(circuit_breaker_state.clone()))?;

        Ok(Self {
            registry,
            tasks_processed_total,
            tasks_failed_total,
            task_duration_seconds,
            task_queue_size,
            active_tasks,
            circuit_breaker_state,
        })
    }

    pub fn gather_text(&self) -> Vec<u8> {
        let metric_families = self.registry.gather();
        let mut buf = Vec::new();
        if let Err(err) = TextEncoder::new().encode(&metric_families, &mut buf) {
            error!(%err, "failed to encode metrics");
        }
        buf
    }

    /// Spawn a blocking `tiny_http` server on a background thread serving
    /// `GET /metrics` in the Prometheus text exposition format. No
    /// authentication; bind to loopback unless a scrape target outside the
    /// host genuinely needs access.
    pub fn serve(self: &Arc<Self>, addr: SocketAddr) -> std::io::Result<()> {
        let server = tiny_http::Server::http(addr)
            .map_err(|err| std::io::Error::other(err.to_string()))?;
        let metrics = Arc::clone(self);
        thread::Builder::new()
            .name("metrics-http".to_string())
            .spawn(move || {
                info!(%addr, "metrics endpoint listening");
                for request in server.incoming_requests() {
                    let body = metrics.gather_text();
                    let response = tiny_http::Response::from_data(body).with_header(
                        tiny_http::Header::from_bytes(
                            &b"Content-Type"[..],
                            &b"text/plain; version=0.0.4"[..],
                        )
                        .expect("static header is valid ASCII"),
                    );
                    if let Err(err) = request.respond(response) {
                        error!(%err, "failed to respond to metrics scrape");
                    }
                }
            })?;
        Ok(())
    }
}

impl MetricsSink for PrometheusMetrics {
    fn record_task_processed(&self, status: &str) {
        self.tasks_processed_total.with_label_values(&[status]).inc();
    }

    fn record_task_failed(&self, reason: &str) {
        self.tasks_failed_total.with_label_values(&[reason]).inc();
    }

    fn observe_task_duration(&self, seconds: f64) {
        self.task_duration_seconds.observe(seconds);
    }

    fn set_queue_size(&self, size: i64) {
        self.task_queue_size.set(size as f64);
    }

    fn set_active_tasks(&self, count: i64) {
        self.active_tasks.set(count as f64);
    }

    fn set_circuit_breaker_state(&self, state: CircuitState) {
        self.circuit_breaker_state.set(circuit_state_code(state));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gathered_text_contains_registered_metric_names() {
        let metrics = PrometheusMetrics::new().unwrap();
        metrics.record_task_processed("completed");
        metrics.record_task_failed("timeout");
        metrics.observe_task_duration(2.0);
        metrics.set_queue_size(4);
        metrics.set_active_tasks(2);
        metrics.set_circuit_breaker_state(CircuitState::HalfOpen);

        let text = String::from_utf8(metrics.gather_text()).unwrap();
        assert!(text.contains("tasks_processed_total"));
        assert!(text.contains("tasks_failed_total"));
        assert!(text.contains("task_duration_seconds"));
        assert!(text.contains("task_queue_size 4"));
        assert!(text.contains("circuit_breaker_state 2"));
    }
}
