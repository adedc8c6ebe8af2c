//! Bounded retry with exponential backoff.
//!
//! Used around every generation request. Attempts run strictly one after
//! another on the calling thread; the delay between them doubles (by
//! default) from `initial_backoff_ms` up to `max_backoff_ms`.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Retry behavior for a fallible remote call
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Total attempts, including the first (at least 1)
    pub max_attempts: u32,
    /// Delay before the second attempt
    pub initial_backoff_ms: u64,
    /// Upper bound on any single delay
    pub max_backoff_ms: u64,
    /// Growth factor between delays
    pub multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff_ms: 2_000,
            max_backoff_ms: 10_000,
            multiplier: 2.0,
        }
    }
}

/// Final result of a retried call and how many attempts it took
#[derive(Debug)]
pub struct Attempted<T, E> {
    pub result: Result<T, E>,
    pub attempts: u32,
}

impl RetryPolicy {
    /// Policy with the given attempt budget and default delays
    #[must_use]
    pub const fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            initial_backoff_ms: 2_000,
            max_backoff_ms: 10_000,
            multiplier: 2.0,
        }
    }

    /// Single attempt, no retries
    #[must_use]
    pub const fn none() -> Self {
        Self::new(1)
    }

    /// Set both delay bounds
    #[must_use]
    pub const fn with_backoff(mut self, initial: Duration, max: Duration) -> Self {
        self.initial_backoff_ms = initial.as_millis() as u64;
        self.max_backoff_ms = max.as_millis() as u64;
        self
    }

    /// Set the growth factor
    #[must_use]
    pub const fn with_multiplier(mut self, multiplier: f64) -> Self {
        self.multiplier = multiplier;
        self
    }

    /// Delay after failed attempt number `attempt` (1-based)
    #[must_use]
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(32) as i32;
        let millis = self.initial_backoff_ms as f64 * self.multiplier.max(1.0).powi(exponent);
        let capped = millis.min(self.max_backoff_ms as f64).max(0.0);
        Duration::from_millis(capped as u64)
    }

    /// Runs `op` until it succeeds, fails with a non-retryable error, or the
    /// attempt budget is spent. `op` receives the 1-based attempt number.
    pub fn run<T, E, F, R>(&self, mut op: F, is_retryable: R) -> Attempted<T, E>
    where
        F: FnMut(u32) -> Result<T, E>,
        R: Fn(&E) -> bool,
        E: std::fmt::Display,
    {
        let budget = self.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            match op(attempt) {
                Ok(value) => {
                    return Attempted {
                        result: Ok(value),
                        attempts: attempt,
                    }
                }
                Err(err) if attempt < budget && is_retryable(&err) => {
                    let delay = self.backoff(attempt);
                    tracing::warn!(
                        attempt,
                        budget,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "attempt failed; retrying"
                    );
                    if !delay.is_zero() {
                        std::thread::sleep(delay);
                    }
                    attempt += 1;
                }
                Err(err) => {
                    return Attempted {
                        result: Err(err),
                        attempts: attempt,
                    }
                }
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::error::GenerationError;

    fn instant(attempts: u32) -> RetryPolicy {
        RetryPolicy::new(attempts).with_backoff(Duration::ZERO, Duration::ZERO)
    }

    #[test]
    fn test_defaults() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_attempts, 3);
        assert_eq!(policy.backoff(1), Duration::from_secs(2));
        assert_eq!(policy.backoff(2), Duration::from_secs(4));
        assert_eq!(policy.backoff(3), Duration::from_secs(8));
        assert_eq!(policy.backoff(4), Duration::from_secs(10));
        assert_eq!(policy.backoff(40), Duration::from_secs(10));
    }

    #[test]
    fn test_succeeds_after_transient_failures() {
        let outcome = instant(3).run(
            |attempt| {
                if attempt < 3 {
                    Err(GenerationError::transport("reset"))
                } else {
                    Ok(attempt)
                }
            },
            GenerationError::is_retryable,
        );
        assert_eq!(outcome.result.unwrap(), 3);
        assert_eq!(outcome.attempts, 3);
    }

    #[test]
    fn test_exhausts_budget() {
        let mut calls = 0;
        let outcome: Attempted<(), _> = instant(4).run(
            |_| {
                calls += 1;
                Err(GenerationError::EmptyOutput)
            },
            GenerationError::is_retryable,
        );
        assert!(outcome.result.is_err());
        assert_eq!(outcome.attempts, 4);
        assert_eq!(calls, 4);
    }

    #[test]
    fn test_non_retryable_stops_immediately() {
        let outcome: Attempted<(), _> = instant(5).run(
            |_| {
                Err(GenerationError::Rejected {
                    status: 401,
                    body: String::new(),
                })
            },
            GenerationError::is_retryable,
        );
        assert_eq!(outcome.attempts, 1);
    }

    #[test]
    fn test_zero_attempts_still_tries_once() {
        let outcome = instant(0).run(|_| Ok::<_, GenerationError>(1), GenerationError::is_retryable);
        assert_eq!(outcome.attempts, 1);
    }

    #[test]
    fn test_deserialize_partial() {
        let policy: RetryPolicy = serde_json::from_str(r#"{"max_attempts": 5}"#).unwrap();
        assert_eq!(policy.max_attempts, 5);
        assert_eq!(policy.initial_backoff_ms, 2_000);
    }
}
