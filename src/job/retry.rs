use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use super::error::{Stage, StageError};
use crate::config::JobConfig;

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl RetryPolicy {
    pub fn from_config(config: &JobConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            base_delay: Duration::from_millis(config.retry_base_delay_ms),
            max_delay: Duration::from_millis(config.retry_max_delay_ms),
        }
    }

    /// Exponential backoff: base * 2^attempt, capped.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let base = self.base_delay.as_millis() as u64;
        let cap = self.max_delay.as_millis() as u64;
        let delay = base.saturating_mul(1u64.checked_shl(attempt).unwrap_or(u64::MAX));
        Duration::from_millis(delay.min(cap))
    }
}

/// Run one external stage under a per-attempt timeout, retrying transient
/// failures. `on_retry` sees the upcoming attempt number, the error and the
/// delay before it. A raised `cancel` flag stops the loop before any further
/// attempt.
pub async fn run_stage<T, F, Fut, R>(
    policy: &RetryPolicy,
    stage: Stage,
    timeout: Duration,
    cancel: &AtomicBool,
    mut attempt_fn: F,
    mut on_retry: R,
) -> Result<T, StageError>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, StageError>>,
    R: FnMut(u32, &StageError, Duration),
{
    let cancelled = || cancel.load(Ordering::SeqCst);
    let mut attempt = 0;
    loop {
        if cancelled() {
            return Err(StageError::Cancelled);
        }
        let result = match tokio::time::timeout(timeout, attempt_fn(attempt)).await {
            Ok(result) => result,
            Err(_) => Err(StageError::TimedOut {
                stage,
                after: timeout,
            }),
        };

        match result {
            Ok(value) => return Ok(value),
            Err(err) if err.is_transient() && attempt < policy.max_retries => {
                if cancelled() {
                    return Err(StageError::Cancelled);
                }
                let delay = policy.backoff(attempt);
                attempt += 1;
                on_retry(attempt, &err, delay);
                tokio::time::sleep(delay).await;
            }
            Err(err) => return Err(err),
        }
    }
}
