// SPDX-License-Identifier: MIT

//! Exponential backoff calculation for transient task failures (§4.8 step
//! 10: `initial_retry_delay * retry_backoff^attempts`).

use std::time::Duration;

pub fn backoff_delay(initial_retry_delay: Duration, retry_backoff: f64, attempts: u32) -> Duration {
    let secs = initial_retry_delay.as_secs_f64() * retry_backoff.powi(attempts as i32);
    Duration::from_secs_f64(secs)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_attempts_is_the_initial_delay() {
        let delay = backoff_delay(Duration::from_secs(1), 2.0, 0);
        assert_eq!(delay, Duration::from_secs(1));
    }

    #[test]
    fn grows_exponentially_with_attempts() {
        let delay = backoff_delay(Duration::from_secs(1), 2.0, 3);
        assert_eq!(delay, Duration::from_secs(8));
    }

    #[test]
    fn respects_fractional_initial_delay() {
        let delay = backoff_delay(Duration::from_millis(500), 2.0, 1);
        assert_eq!(delay, Duration::from_secs(1));
    }
}
