// SPDX-License-Identifier: MIT

//! Circuit breaker guarding the external CLI invocation against cascading
//! failures (§4.5).

use parking_lot::Mutex;
use std::time::{Duration, Instant};
use taskrelay_core::CircuitState;

struct Inner {
    failures: u32,
    state: CircuitState,
    last_failure: Option<Instant>,
}

/// Opens after `threshold` consecutive failures, blocking new attempts for
/// `timeout`. A query made after the timeout elapses transitions the
/// breaker to half-open and lets the caller retry — the breaker itself
/// does not re-close; that happens on the caller's next `record_success`.
pub struct CircuitBreaker {
    threshold: u32,
    timeout: Duration,
    inner: Mutex<Inner>,
}

impl CircuitBreaker {
    pub fn new(threshold: u32, timeout: Duration) -> Self {
        Self {
            threshold,
            timeout,
            inner: Mutex::new(Inner { failures: 0, state: CircuitState::Closed, last_failure: None }),
        }
    }

    pub fn record_success(&self) {
        let mut inner = self.inner.lock();
        inner.failures = 0;
        inner.state = CircuitState::Closed;
    }

    pub fn record_failure(&self) {
        let mut inner = self.inner.lock();
        inner.failures += 1;
        inner.last_failure = Some(Instant::now());
        if inner.failures >= self.threshold {
            inner.state = CircuitState::Open;
        }
    }

    /// True if the breaker is currently blocking attempts. Has the side
    /// effect of moving `Open` to `HalfOpen` once the timeout has elapsed,
    /// mirroring the original's lazy-transition-on-query behavior.
    pub fn is_open(&self) -> bool {
        let mut inner = self.inner.lock();
        if inner.state != CircuitState::Open {
            return false;
        }
        if let Some(last_failure) = inner.last_failure {
            if last_failure.elapsed() > self.timeout {
                inner.state = CircuitState::HalfOpen;
                return false;
            }
        }
        true
    }

    pub fn state(&self) -> CircuitState {
        self.inner.lock().state
    }
}
