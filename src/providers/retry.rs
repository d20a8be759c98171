//! Retry executor - re-runs a fallible async operation with jittered
//! exponential backoff.
//!
//! The decision to retry is a membership test of [`AiError::kind`] against a
//! caller-supplied set of [`ErrorKind`]s. Messages are never inspected.
//!
//! # Example
//!
//! ```rust,ignore
//! use dst_ai_gateway::error::ErrorKind;
//! use dst_ai_gateway::providers::retry::{run_with_retry, RetryPolicy};
//!
//! let policy = RetryPolicy::from_secs(3, 0.5, 4.0);
//! let text = run_with_retry(|| provider.chat(&messages, "", &options), &policy, ErrorKind::RETRYABLE).await?;
//! ```

use std::future::Future;
use std::time::Duration;
use tracing::warn;

use crate::error::{AiError, ErrorKind, Result};

/// Lower bound of the jitter multiplier.
const JITTER_MIN: f64 = 0.8;
/// Width of the jitter range, giving factors in `[0.8, 1.2)`.
const JITTER_SPAN: f64 = 0.4;

/// Immutable retry configuration owned by the gateway.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts, always at least 1.
    pub retries: u32,
    /// Delay before the second attempt; doubles for every later attempt.
    pub backoff: Duration,
    /// Upper bound for the un-jittered delay.
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_millis(500), Duration::from_secs(4))
    }
}

impl RetryPolicy {
    /// Create a policy. `retries` below 1 is raised to 1.
    ///
    /// # Arguments
    /// * `retries` - Total attempts, including the first
    /// * `backoff` - Base delay
    /// * `max_backoff` - Delay cap
    pub fn new(retries: u32, backoff: Duration, max_backoff: Duration) -> Self {
        Self {
            retries: retries.max(1),
            backoff,
            max_backoff,
        }
    }

    /// Create a policy from fractional seconds. Negative or non-finite values
    /// become zero.
    pub fn from_secs(retries: u32, backoff_secs: f64, max_backoff_secs: f64) -> Self {
        let secs = |v: f64| Duration::try_from_secs_f64(v.max(0.0)).unwrap_or(Duration::ZERO);
        Self::new(retries, secs(backoff_secs), secs(max_backoff_secs))
    }

    /// Set the total number of attempts.
    pub fn with_retries(mut self, retries: u32) -> Self {
        self.retries = retries.max(1);
        self
    }

    /// Set the base delay.
    pub fn with_backoff(mut self, backoff: Duration) -> Self {
        self.backoff = backoff;
        self
    }

    /// Set the delay cap.
    pub fn with_max_backoff(mut self, max_backoff: Duration) -> Self {
        self.max_backoff = max_backoff;
        self
    }
}

/// Compute the delay after a failed attempt (without sleeping).
///
/// Delay formula: `min(max_backoff, backoff * 2^(attempt-1)) * jitter`
///
/// # Arguments
/// * `attempt` - The attempt that just failed (1-indexed)
/// * `policy` - Backoff settings
/// * `jitter` - Multiplier, normally from [`jitter_factor`]
pub fn compute_delay(attempt: u32, policy: &RetryPolicy, jitter: f64) -> Duration {
    let exponent = attempt.saturating_sub(1).min(30) as i32;
    let exponential = policy.backoff.as_secs_f64() * 2f64.powi(exponent);
    let capped = exponential.min(policy.max_backoff.as_secs_f64());
    Duration::try_from_secs_f64((capped * jitter).max(0.0)).unwrap_or(policy.max_backoff)
}

/// Uniform random multiplier in `[0.8, 1.2)`.
pub fn jitter_factor() -> f64 {
    JITTER_MIN + fastrand::f64() * JITTER_SPAN
}

/// Run `operation` up to `policy.retries` times.
///
/// An error whose kind is in `retryable` is retried after a jittered backoff,
/// unless it came from the last attempt, in which case it is returned as is.
/// Any other error is returned immediately after a single attempt.
pub async fn run_with_retry<T, F, Fut>(
    mut operation: F,
    policy: &RetryPolicy,
    retryable: &[ErrorKind],
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let retries = policy.retries.max(1);
    let mut attempt = 1;
    loop {
        let err: AiError = match operation().await {
            Ok(value) => return Ok(value),
            Err(err) => err,
        };

        if !retryable.contains(&err.kind()) || attempt >= retries {
            return Err(err);
        }

        let delay = compute_delay(attempt, policy, jitter_factor());
        warn!(
            component = "retry",
            attempt = attempt,
            retries = retries,
            delay_ms = delay.as_millis() as u64,
            error = %err,
            "Retrying request after transient error"
        );
        tokio::time::sleep(delay).await;
        attempt += 1;
    }
}
