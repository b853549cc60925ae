//! Bounded retry with a fixed backoff schedule
//!
//! The policy itself is pure data; the waiting is behind the `Sleeper`
//! trait so tests can run the schedule without real delays.

use async_trait::async_trait;
use std::future::Future;
use std::time::Duration;
use tracing::warn;

/// A bounded retry schedule
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Maximum number of attempts, including the first
    pub max_attempts: usize,
    /// Delay before each re-attempt; the last entry repeats
    pub backoff: Vec<Duration>,
}

impl RetryPolicy {
    /// Schedule used for webhook delivery: 3 attempts, 1s/2s/4s backoff
    pub fn webhook_default() -> Self {
        Self {
            max_attempts: 3,
            backoff: vec![
                Duration::from_secs(1),
                Duration::from_secs(2),
                Duration::from_secs(4),
            ],
        }
    }

    /// Delay to wait after the given zero-based failed attempt
    pub fn delay(&self, attempt: usize) -> Duration {
        self.backoff
            .get(attempt)
            .or(self.backoff.last())
            .copied()
            .unwrap_or_default()
    }
}

/// Abstraction over waiting, injectable for tests
#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

/// Production sleeper backed by the tokio timer
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Run `operation` under the policy, retrying failures `retryable` accepts
///
/// The operation receives the zero-based attempt number. The last error is
/// returned when attempts are exhausted; non-retryable errors return
/// immediately.
pub async fn run_with_retry<T, E, Op, Fut>(
    policy: &RetryPolicy,
    sleeper: &dyn Sleeper,
    retryable: impl Fn(&E) -> bool,
    mut operation: Op,
) -> Result<T, E>
where
    E: std::fmt::Display,
    Op: FnMut(usize) -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let mut attempt = 0;
    loop {
        match operation(attempt).await {
            Ok(value) => return Ok(value),
            Err(e) => {
                attempt += 1;
                if attempt >= policy.max_attempts || !retryable(&e) {
                    return Err(e);
                }
                warn!(attempt, "Attempt failed, retrying: {}", e);
                sleeper.sleep(policy.delay(attempt - 1)).await;
            }
        }
    }
}
