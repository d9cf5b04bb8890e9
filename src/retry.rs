//! Bounded retry with a fixed delay between attempts.

use std::future::Future;
use std::time::Duration;
use tracing::debug;

/// Outcome of a single attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum Attempt<T> {
    /// Final answer, stop retrying.
    Done(T),
    /// Transient miss. Retried until the budget runs out.
    Retry(String),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    /// Slept before every attempt after the first.
    pub delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            delay,
        }
    }

    pub fn delay_before(&self, attempt: u32) -> Option<Duration> {
        (attempt > 1).then_some(self.delay)
    }
}

/// Every attempt asked for a retry.
#[derive(Debug, Clone, PartialEq)]
pub struct Exhausted {
    pub attempts: u32,
    pub last_reason: String,
}

/// Run `op` (given the 1-based attempt number) until it returns
/// [`Attempt::Done`] or `policy.max_attempts` attempts have been made.
pub async fn retry<T, F, Fut>(policy: RetryPolicy, mut op: F) -> Result<T, Exhausted>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Attempt<T>>,
{
    let mut last_reason = String::new();

    for attempt in 1..=policy.max_attempts {
        if let Some(delay) = policy.delay_before(attempt) {
            debug!(attempt, delay_ms = delay.as_millis() as u64, "waiting before retry");
            tokio::time::sleep(delay).await;
        }

        match op(attempt).await {
            Attempt::Done(value) => return Ok(value),
            Attempt::Retry(reason) => {
                debug!(attempt, max = policy.max_attempts, reason = %reason, "attempt needs retry");
                last_reason = reason;
            }
        }
    }

    Err(Exhausted {
        attempts: policy.max_attempts,
        last_reason,
    })
}
