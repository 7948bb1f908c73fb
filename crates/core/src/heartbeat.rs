// SPDX-License-Identifier: MIT

//! Heartbeat envelope schema — a worker's liveness/health report, written
//! periodically to `heartbeats/<worker>.json` (§3, §6).

use serde::{Deserialize, Serialize};

/// Circuit breaker state as observed by the worker at heartbeat time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl std::fmt::Display for CircuitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CircuitState::Closed => write!(f, "closed"),
            CircuitState::Open => write!(f, "open"),
            CircuitState::HalfOpen => write!(f, "half_open"),
        }
    }
}

/// Running counters a worker carries forward across its process lifetime
/// and reports with every heartbeat.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct HeartbeatStats {
    pub tasks_processed: u64,
    pub tasks_failed: u64,
    pub tasks_retried: u64,
    pub tasks_dlq: u64,
}

/// A heartbeat envelope, written atomically to `heartbeats/<worker>.json`
/// on every tick. The orchestrator-listener treats a worker as unhealthy
/// once `now - timestamp` exceeds its health threshold.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeartbeatEnvelope {
    pub worker: String,
    pub timestamp: String,
    pub uptime_seconds: f64,
    pub queue_size: u32,
    pub pid: u32,
    pub active_tasks: u32,
    pub circuit_breaker_state: CircuitState,
    pub stats: HeartbeatStats,
    pub status: String,
}

impl HeartbeatEnvelope {
    /// The literal status this runtime always reports — a worker that can
    /// still write its own heartbeat is, by definition, alive enough to
    /// call itself healthy. Staleness, not this field, is what a reader
    /// uses to detect an actually-unhealthy worker.
    pub const STATUS_HEALTHY: &'static str = "healthy";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn circuit_state_serializes_half_open() {
        let json = serde_json::to_string(&CircuitState::HalfOpen).unwrap();
        assert_eq!(json, "\"half_open\"");
    }

    #[test]
    fn stats_default_to_zero() {
        let stats = HeartbeatStats::default();
        assert_eq!(stats.tasks_processed, 0);
        assert_eq!(stats.tasks_dlq, 0);
    }
}
