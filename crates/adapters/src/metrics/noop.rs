// SPDX-License-Identifier: MIT

use super::MetricsSink;
use taskrelay_core::CircuitState;

/// A collector selected when `enable_metrics` is false. Accepts every
/// update as a no-op so callers never need to branch on whether metrics
/// are enabled.
#[derive(Debug, Default)]
pub struct NoopMetrics;

impl MetricsSink for NoopMetrics {
    fn record_task_processed(&self, _status: &str) {}
    fn record_task_failed(&self, _reason: &str) {}
    fn observe_task_duration(&self, _seconds: f64) {}
    fn set_queue_size(&self, _size: i64) {}
    fn set_active_tasks(&self, _count: i64) {}
    fn set_circuit_breaker_state(&self, _state: CircuitState) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_call_is_a_harmless_no_op() {
        let metrics = NoopMetrics;
        metrics.record_task_processed("completed");
        metrics.record_task_failed("timeout");
        metrics.observe_task_duration(1.5);
        metrics.set_queue_size(3);
        metrics.set_active_tasks(1);
        metrics.set_circuit_breaker_state(CircuitState::Open);
    }
}
