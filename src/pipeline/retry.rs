//! Bounded retry with pluggable backoff.
//!
//! All three embedding strategies retry through this one loop so attempt
//! counting and delay behavior stay uniform: an explicit counter, a
//! configurable ceiling, and a [`Backoff`] policy instead of ad-hoc
//! recursive self-retry per call site.

use std::future::Future;
use std::time::Duration;

use tracing::warn;

use crate::types::PipelineError;

/// Delay schedule applied between failed attempts.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Backoff {
    /// Retry immediately.
    None,
    /// Same delay before every retry.
    Fixed(Duration),
    /// `attempt × base`: strictly increasing, used by the local path.
    Linear(Duration),
    /// `base × 2^(attempt-1)`, capped at 2^5.
    Exponential(Duration),
}

impl Backoff {
    /// Delay before retry number `attempt` (1-based).
    pub fn delay(&self, attempt: u32) -> Duration {
        match self {
            Backoff::None => Duration::ZERO,
            Backoff::Fixed(base) => *base,
            Backoff::Linear(base) => *base * attempt,
            Backoff::Exponential(base) => *base * 2u32.pow(attempt.saturating_sub(1).min(5)),
        }
    }
}

/// Attempt ceiling plus backoff schedule.
#[derive(Clone, Copy, Debug)]
pub struct RetryPolicy {
    /// Retries allowed after the first attempt; `max_retries = 3` permits
    /// four attempts in total.
    pub max_retries: u32,
    pub backoff: Backoff,
}

impl RetryPolicy {
    pub fn new(max_retries: u32, backoff: Backoff) -> Self {
        Self {
            max_retries,
            backoff,
        }
    }
}

/// Runs `op` until it succeeds or the policy's ceiling is exhausted.
///
/// `scope` names the unit being retried (a batch, a fragment) and is
/// carried into the terminal [`PipelineError::RetryExhausted`].
pub async fn with_retry<T, F, Fut>(
    policy: &RetryPolicy,
    scope: &str,
    mut op: F,
) -> Result<T, PipelineError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, PipelineError>>,
{
    let mut attempt = 0u32;
    loop {
        attempt += 1;
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) if attempt <= policy.max_retries => {
                let delay = policy.backoff.delay(attempt);
                warn!(scope, attempt, ?delay, error = %err, "attempt failed, retrying");
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
            }
            Err(err) => {
                return Err(PipelineError::RetryExhausted {
                    scope: scope.to_string(),
                    attempts: attempt,
                    source: Box::new(err),
                });
            }
        }
    }
}
