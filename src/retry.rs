// Copyright (c) 2025 - Cowboy AI, Inc.
//! Bounded Retry with Exponential Backoff
//!
//! Used for transport-level delivery only: dispatching an event to a driver
//! and delivering a response to a callback address. Business actions are
//! never retried.
//!
//! `delay(n) = min(initial_delay * multiplier^(n-1), max_delay)` where `n` is
//! the attempt that just failed.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;
use tracing::warn;

/// Retry budget for one delivery
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Maximum number of attempts, including the first (at least one is made)
    pub max_attempts: u32,
    /// Delay after the first failed attempt
    pub initial_delay: Duration,
    /// Upper bound for any single delay
    pub max_delay: Duration,
    /// Growth factor per attempt
    pub multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_delay: Duration::from_millis(200),
            max_delay: Duration::from_secs(5),
            multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    /// Single attempt, no retry
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Delay to wait after attempt `attempt` (1-indexed) failed
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
        let scaled = self.initial_delay.as_secs_f64() * self.multiplier.powi(exponent);
        let max = self.max_delay.as_secs_f64();

        if scaled.is_nan() || scaled < 0.0 {
            Duration::ZERO
        } else if scaled > max {
            self.max_delay
        } else {
            Duration::from_secs_f64(scaled)
        }
    }

    fn attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }
}

/// All attempts failed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryExhausted<E> {
    pub attempts: u32,
    pub last_error: E,
}

/// Run `op` until it succeeds or the policy's budget is spent
///
/// `op` receives the 1-indexed attempt number.
pub async fn retry_with_backoff<T, E, F, Fut>(
    policy: &RetryPolicy,
    operation: &str,
    op: F,
) -> Result<(T, u32), RetryExhausted<E>>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Display,
{
    retry_with_backoff_while(policy, operation, op, |_| true).await
}

/// [`retry_with_backoff`] that stops early on errors `retryable` rejects
pub async fn retry_with_backoff_while<T, E, F, Fut, R>(
    policy: &RetryPolicy,
    operation: &str,
    mut op: F,
    retryable: R,
) -> Result<(T, u32), RetryExhausted<E>>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Display,
    R: Fn(&E) -> bool,
{
    let max_attempts = policy.attempts();
    let mut attempt = 1;

    loop {
        match op(attempt).await {
            Ok(value) => return Ok((value, attempt)),
            Err(error) if attempt >= max_attempts || !retryable(&error) => {
                return Err(RetryExhausted {
                    attempts: attempt,
                    last_error: error,
                });
            }
            Err(error) => {
                let delay = policy.delay_for(attempt);
                warn!(
                    "{} failed (attempt {}/{}): {}; retrying in {:?}",
                    operation, attempt, max_attempts, error, delay
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    }
}
