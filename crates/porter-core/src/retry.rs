// Retry policy
//
// Every remote call in this crate funnels through one of two wrappers:
// `call_with_retry` (attempt budget, exponential backoff) for one-shot
// operations, and `call_until_deadline` (fixed delay, overall deadline)
// for calls that must land before a command deadline. Classification
// lives on `porter_api::ErrorKind`, so the logic here stays pure.

use std::future::Future;
use std::time::{Duration, Instant};

use thiserror::Error;
use tracing::{debug, warn};

use porter_api::Error as ApiError;

/// Exponential backoff configuration for transient transport failures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts before giving up, first try included. Default: 3.
    pub max_attempts: u32,
    /// Delay before the second attempt. Default: 1s.
    pub base_delay: Duration,
    /// Upper bound on any single backoff delay. Default: 10s.
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(10),
        }
    }
}

impl RetryPolicy {
    /// Backoff delay after failed attempt `attempt` (1-based):
    /// `base_delay * 2^(attempt - 1)`, capped at `max_delay`.
    ///
    /// No jitter: delays stay deterministic so operators can predict
    /// worst-case command latency from the configuration alone.
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let exponent = i32::try_from(attempt.saturating_sub(1)).unwrap_or(i32::MAX);
        let delay = self.base_delay.as_secs_f64() * 2.0_f64.powi(exponent);
        Duration::from_secs_f64(delay.min(self.max_delay.as_secs_f64()))
    }
}

/// Terminal failure from [`call_with_retry`].
///
/// `retryable` reports *why* the call gave up: `true` means the attempt
/// budget ran out on a transient error, `false` means the first error
/// was permanent and retrying would not have helped.
#[derive(Debug, Error)]
#[error("{source}")]
pub struct RetryError {
    pub source: ApiError,
    /// Attempts actually made.
    pub attempts: u32,
    pub retryable: bool,
}

/// Run `op` under `policy`, sleeping between transient failures.
///
/// Permanent errors return after exactly one attempt.
pub async fn call_with_retry<T, F, Fut>(policy: &RetryPolicy, mut op: F) -> Result<T, RetryError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ApiError>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 1_u32;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) if !err.is_transient() => {
                debug!(error = %err, "remote call failed (permanent)");
                return Err(RetryError {
                    source: err,
                    attempts: attempt,
                    retryable: false,
                });
            }
            Err(err) if attempt >= max_attempts => {
                warn!(error = %err, attempts = attempt, "retry budget exhausted");
                return Err(RetryError {
                    source: err,
                    attempts: attempt,
                    retryable: true,
                });
            }
            Err(err) => {
                let delay = policy.backoff_delay(attempt);
                debug!(
                    error = %err,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    "remote call failed, backing off"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    }
}

/// Terminal failure from [`call_until_deadline`].
#[derive(Debug, Error)]
pub enum DeadlineError {
    /// A permanent error: retrying would not help, so the deadline
    /// budget was left unspent.
    #[error("{source}")]
    Permanent { source: ApiError, attempts: u32 },

    /// The deadline passed while retrying transient failures.
    #[error("deadline exceeded after {attempts} attempts: {last}")]
    Expired { last: ApiError, attempts: u32 },
}

/// Retry `op` on a fixed `retry_delay` cadence until it succeeds, fails
/// permanently, or `deadline` passes.
///
/// The sleep before each retry is clipped to the remaining budget, so
/// the call never overshoots the deadline by more than one in-flight
/// request.
pub async fn call_until_deadline<T, F, Fut>(
    mut op: F,
    deadline: Instant,
    retry_delay: Duration,
) -> Result<T, DeadlineError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ApiError>>,
{
    let mut attempts = 0_u32;
    loop {
        attempts += 1;
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) if !err.is_transient() => {
                debug!(error = %err, "remote call failed (permanent)");
                return Err(DeadlineError::Permanent {
                    source: err,
                    attempts,
                });
            }
            Err(err) => {
                let now = Instant::now();
                if now >= deadline {
                    return Err(DeadlineError::Expired {
                        last: err,
                        attempts,
                    });
                }
                debug!(error = %err, attempts, "remote call failed, retrying until deadline");
                tokio::time::sleep(retry_delay.min(deadline - now)).await;
                if Instant::now() >= deadline {
                    return Err(DeadlineError::Expired {
                        last: err,
                        attempts,
                    });
                }
            }
        }
    }
}
