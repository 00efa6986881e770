//! Bounded retry with exponential backoff.
//!
//! Used for strategy runs, table writes and remote calls in place of
//! operator-driven "press a key to retry" loops.

use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use tracing::warn;

/// Retry settings shared by the driver, the metrics store and result tables.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Total attempts including the first one. Zero is treated as one.
    pub max_attempts: u32,
    /// Delay before the second attempt.
    pub initial_backoff_ms: u64,
    /// Growth factor applied to the delay after each failure.
    pub multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff_ms: 500,
            multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    /// A policy that never retries.
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            ..Default::default()
        }
    }

    /// A policy with `max_attempts` and no delay (useful for testing).
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            initial_backoff_ms: 0,
            multiplier: 1.0,
        }
    }

    /// Attempts actually made, at least one.
    pub fn attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }

    /// Delay after the given failed attempt (1-based).
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = self.multiplier.max(1.0).powi(attempt.saturating_sub(1) as i32);
        Duration::from_millis((self.initial_backoff_ms as f64 * factor) as u64)
    }

    /// Run an async operation until it succeeds or attempts run out.
    ///
    /// The closure receives the 1-based attempt number.
    pub async fn run<T, E, F, Fut>(&self, label: &str, mut op: F) -> Result<T, E>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: std::fmt::Display,
    {
        let attempts = self.attempts();
        let mut attempt = 1;
        loop {
            match op(attempt).await {
                Ok(value) => return Ok(value),
                Err(e) if attempt < attempts => {
                    let delay = self.backoff(attempt);
                    warn!(%label, attempt, attempts, error = %e, "attempt failed, retrying in {:?}", delay);
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Blocking counterpart of [`RetryPolicy::run`] for synchronous file writes.
    pub fn run_blocking<T, E, F>(&self, label: &str, mut op: F) -> Result<T, E>
    where
        F: FnMut(u32) -> Result<T, E>,
        E: std::fmt::Display,
    {
        let attempts = self.attempts();
        let mut attempt = 1;
        loop {
            match op(attempt) {
                Ok(value) => return Ok(value),
                Err(e) if attempt < attempts => {
                    let delay = self.backoff(attempt);
                    warn!(%label, attempt, attempts, error = %e, "attempt failed, retrying in {:?}", delay);
                    std::thread::sleep(delay);
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn test_backoff_grows() {
        let policy = RetryPolicy {
            max_attempts: 4,
            initial_backoff_ms: 100,
            multiplier: 2.0,
        };
        assert_eq!(policy.backoff(1), Duration::from_millis(100));
        assert_eq!(policy.backoff(2), Duration::from_millis(200));
        assert_eq!(policy.backoff(3), Duration::from_millis(400));
    }

    #[test]
    fn test_blocking_succeeds_after_failures() {
        let calls = Cell::new(0);
        let result: Result<u32, String> = RetryPolicy::immediate(3).run_blocking("op", |attempt| {
            calls.set(calls.get() + 1);
            if attempt < 3 {
                Err("locked".to_string())
            } else {
                Ok(attempt)
            }
        });
        assert_eq!(result, Ok(3));
        assert_eq!(calls.get(), 3);
    }

    #[test]
    fn test_blocking_gives_up() {
        let calls = Cell::new(0);
        let result: Result<(), String> = RetryPolicy::immediate(2).run_blocking("op", |_| {
            calls.set(calls.get() + 1);
            Err("still locked".to_string())
        });
        assert_eq!(result, Err("still locked".to_string()));
        assert_eq!(calls.get(), 2);
    }

    #[test]
    fn test_zero_attempts_runs_once() {
        let calls = Cell::new(0);
        let _: Result<(), String> = RetryPolicy::immediate(0).run_blocking("op", |_| {
            calls.set(calls.get() + 1);
            Err("fail".to_string())
        });
        assert_eq!(calls.get(), 1);
    }

    #[tokio::test]
    async fn test_async_retry() {
        let calls = Cell::new(0);
        let result: Result<&str, String> = RetryPolicy::immediate(3)
            .run("remote", |attempt| {
                calls.set(calls.get() + 1);
                async move {
                    if attempt == 1 {
                        Err("timeout".to_string())
                    } else {
                        Ok("done")
                    }
                }
            })
            .await;
        assert_eq!(result, Ok("done"));
        assert_eq!(calls.get(), 2);
    }
}
