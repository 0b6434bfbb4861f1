//! Explicit retry policies, owned by the orchestrator

use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Backoff {
    None,
    Fixed(Duration),
    /// Doubles after every failed attempt, capped at `max`
    Exponential { initial: Duration, max: Duration },
}

impl Backoff {
    /// Delay to wait after the given failed attempt (1-based).
    pub fn delay(&self, attempt: u32) -> Duration {
        match *self {
            Backoff::None => Duration::ZERO,
            Backoff::Fixed(delay) => delay,
            Backoff::Exponential { initial, max } => {
                let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
                initial.saturating_mul(factor).min(max)
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts including the first one
    pub max_attempts: u32,
    pub backoff: Backoff,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, backoff: Backoff) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            backoff,
        }
    }

    pub fn once() -> Self {
        Self::new(1, Backoff::None)
    }

    pub fn exponential(max_attempts: u32, initial: Duration, max: Duration) -> Self {
        Self::new(max_attempts, Backoff::Exponential { initial, max })
    }
}

/// Last error once a policy gave up
#[derive(Debug, Clone, PartialEq)]
pub struct RetryExhausted<E> {
    pub error: E,
    pub attempts: u32,
}

/// Retry an async operation under `policy` while `should_retry` approves the error.
pub async fn retry_async<F, Fut, T, E, R>(
    policy: &RetryPolicy,
    mut op: F,
    should_retry: R,
) -> Result<T, RetryExhausted<E>>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    R: Fn(&E) -> bool,
{
    let mut attempt = 1;
    loop {
        match op(attempt).await {
            Ok(v) => return Ok(v),
            Err(e) if attempt < policy.max_attempts && should_retry(&e) => {
                sleep(policy.backoff.delay(attempt)).await;
                attempt += 1;
            }
            Err(error) => {
                return Err(RetryExhausted {
                    error,
                    attempts: attempt,
                })
            }
        }
    }
}
