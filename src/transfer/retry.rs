use std::{future::Future, time::Duration};

use crate::{foundation::config::DEFAULT_MAX_RETRIES, transfer::remote::RemoteError};

#[derive(Clone, Debug, PartialEq)]
/// Exponential backoff with jitter and a hard attempt ceiling.
///
/// `delay(n) = min(base^n * unit + jitter, max_delay)` with `jitter` uniform in `[0, max_jitter)`.
/// Failures `1..=max_retries` are retried after `delay(n)`; failure `max_retries + 1` is returned
/// to the caller.
pub struct RetryPolicy {
    /// Retries allowed after the first failure.
    pub max_retries: u32,
    /// Growth factor per attempt.
    pub base: f64,
    /// Delay unit multiplied by `base^n`.
    pub unit: Duration,
    /// Upper bound (exclusive) of the random jitter.
    pub max_jitter: Duration,
    /// Ceiling applied after jitter.
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            base: 2.0,
            unit: Duration::from_secs(1),
            max_jitter: Duration::from_secs(1),
            max_delay: Duration::from_secs(64),
        }
    }
}

impl RetryPolicy {
    /// Default curve with a custom attempt ceiling.
    pub fn with_max_retries(max_retries: u32) -> Self {
        Self {
            max_retries,
            ..Self::default()
        }
    }

    /// Delay for failure `attempt` without jitter.
    pub fn base_delay(&self, attempt: u32) -> Duration {
        let exp = self.base.powi(attempt.min(i32::MAX as u32) as i32);
        let secs = self.unit.as_secs_f64() * exp;
        if !secs.is_finite() || secs >= self.max_delay.as_secs_f64() {
            return self.max_delay;
        }
        Duration::from_secs_f64(secs)
    }

    /// Delay for failure `attempt`, jittered and capped.
    pub fn delay(&self, attempt: u32) -> Duration {
        let jitter = if self.max_jitter.is_zero() {
            Duration::ZERO
        } else {
            self.max_jitter.mul_f64(fastrand::f64())
        };
        (self.base_delay(attempt) + jitter).min(self.max_delay)
    }

    /// Delay before retrying after the `failures`-th consecutive failure, or `None` once the
    /// ceiling is exceeded.
    pub fn next_delay(&self, failures: u32) -> Option<Duration> {
        (failures <= self.max_retries).then(|| self.delay(failures.max(1)))
    }

    /// Run `op` until it succeeds, fails terminally, or exhausts the retry budget.
    pub async fn run<T, F, Fut>(&self, what: &str, mut op: F) -> Result<T, RemoteError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, RemoteError>>,
    {
        let mut failures = 0u32;
        loop {
            match op().await {
                Ok(v) => return Ok(v),
                Err(e) if !e.is_retryable() => return Err(e),
                Err(e) => {
                    failures += 1;
                    let Some(wait) = self.next_delay(failures) else {
                        tracing::warn!(what, failures, error = %e, "giving up");
                        return Err(e);
                    };
                    tracing::debug!(what, failures, wait_ms = wait.as_millis() as u64, error = %e, "retrying");
                    tokio::time::sleep(wait).await;
                }
            }
        }
    }
}

#[cfg(test)]
#[path = "../../tests/unit/transfer/retry.rs"]
mod tests;
