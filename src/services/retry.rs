use std::future::Future;
use std::time::Duration;

use crate::config::AppConfig;
use crate::error::TranslateError;

/// What to do after a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    GiveUp,
    RetryAfter(Duration),
}

/// Linear backoff: retry `n` (0-based) waits `(n + 1) × backoff_unit`, no jitter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_retries: u32,
    backoff_unit: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(2, Duration::from_secs(2))
    }
}

impl RetryPolicy {
    pub fn new(max_retries: u32, backoff_unit: Duration) -> Self {
        Self {
            max_retries,
            backoff_unit,
        }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(config.max_retries, config.backoff_unit())
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Decide after attempt `attempt` (0-based) failed with `error`.
    ///
    /// Client rejections, invalid payloads, malformed responses and a closed
    /// liveness gate are final; everything else is retried while attempts remain.
    pub fn decide(&self, error: &TranslateError, attempt: u32) -> RetryDecision {
        if !error.is_transient() || attempt >= self.max_retries {
            return RetryDecision::GiveUp;
        }
        RetryDecision::RetryAfter(self.backoff_unit * (attempt + 1))
    }

    /// Drive `op` until it succeeds or the policy gives up.
    ///
    /// `op` receives the 0-based attempt index. `on_retry` is called with the
    /// failed attempt, the delay about to be slept and the error, before sleeping.
    /// Returns the final outcome and the number of calls made; on failure the
    /// last error is returned unchanged.
    pub async fn run<T, F, Fut, R>(&self, mut op: F, mut on_retry: R) -> (Result<T, TranslateError>, u32)
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, TranslateError>>,
        R: FnMut(u32, Duration, &TranslateError),
    {
        let mut attempt = 0;
        loop {
            let err = match op(attempt).await {
                Ok(value) => return (Ok(value), attempt + 1),
                Err(err) => err,
            };

            match self.decide(&err, attempt) {
                RetryDecision::GiveUp => {
                    tracing::debug!(attempt, kind = %err.kind(), "Giving up");
                    return (Err(err), attempt + 1);
                }
                RetryDecision::RetryAfter(delay) => {
                    tracing::warn!(
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "Attempt failed, retrying"
                    );
                    on_retry(attempt, delay, &err);
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}
