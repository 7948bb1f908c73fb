// SPDX-License-Identifier: MIT

//! Metrics collection (§4.4): counters, gauges, and a duration histogram,
//! with a real Prometheus-backed implementation and a no-op fallback
//! selected by `enable_metrics`.

mod noop;
mod prometheus_sink;

pub use noop::NoopMetrics;
pub use prometheus_sink::PrometheusMetrics;

use taskrelay_core::CircuitState;

/// Capability interface for emitting runtime metrics. Implementations must
/// accept every update as a fire-and-forget call — a disabled collector is
/// just a `NoopMetrics` and never errors.
pub trait MetricsSink: Send + Sync {
    fn record_task_processed(&self, status: &str);
    fn record_task_failed(&self, reason: &str);
    fn observe_task_duration(&self, seconds: f64);
    fn set_queue_size(&self, size: i64);
    fn set_active_tasks(&self, count: i64);
    fn set_circuit_breaker_state(&self, state: CircuitState);
}

/// Bucket boundaries for `task_duration_seconds`, matching the spread of
/// expected external-command durations from sub-second echoes to
/// multi-minute agent runs.
pub const DURATION_BUCKETS: &[f64] = &[1.0, 5.0, 10.0, 30.0, 60.0, 120.0, 300.0, 600.0];

pub(crate) fn circuit_state_code(state: CircuitState) -> f64 {
    match state {
        CircuitState::Closed => 0.0,
        CircuitState::Open => 1.0,
        CircuitState::HalfOpen => 2.0,
    }
}
