//! Bounded retry-with-delay polling

use std::time::Duration;

use thiserror::Error;

/// Attempt budget for polling a resource that resolves asynchronously
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub delay: Duration,
}

impl RetryPolicy {
    pub fn new(attempts: u32, delay: Duration) -> Self {
        Self {
            attempts: attempts.max(1),
            delay,
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(50, Duration::from_millis(150))
    }
}

/// Outcome of a single probe
#[derive(Debug)]
pub enum Probe<T> {
    Ready(T),
    Pending,
    Failed(String),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RetryError {
    #[error("Gave up after {attempts} attempts")]
    Exhausted { attempts: u32 },
    #[error("{0}")]
    Failed(String),
}

/// Probe until ready, failed, or out of attempts.
///
/// The probe runs immediately, then once per `delay` until the budget is
/// spent. A `Failed` probe ends polling at once.
pub async fn poll_with_retry<T, F>(policy: RetryPolicy, mut probe: F) -> Result<T, RetryError>
where
    F: FnMut() -> Probe<T>,
{
    for attempt in 1..=policy.attempts {
        match probe() {
            Probe::Ready(value) => return Ok(value),
            Probe::Failed(reason) => return Err(RetryError::Failed(reason)),
            Probe::Pending if attempt < policy.attempts => tokio::time::sleep(policy.delay).await,
            Probe::Pending => {}
        }
    }
    Err(RetryError::Exhausted {
        attempts: policy.attempts,
    })
}
