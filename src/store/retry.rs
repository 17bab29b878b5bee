//! Retry policy for document store operations.
//!
//! Retries are opt-in: the default policy makes a single attempt, so a failed
//! insert surfaces as a 500 immediately. With `max_retries > 0`, failures of
//! the store class (connection, driver, timeout) are retried with exponential
//! backoff and ±20% jitter, capped at `max_delay`. Other errors are returned
//! unchanged.
//!
//! Writes are narrower. An insert that timed out or failed on the server may
//! still have been committed, so re-sending it could store the product twice.
//! The gateway retries inserts only with [`RetryPolicy::run_if`] and
//! [`AppError::is_retryable_write`], which accepts connection failures alone.

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tokio::time::sleep;
use tracing::warn;

use crate::config::Config;
use crate::error::{AppError, AppResult};
use crate::metrics;

/// Jitter percentage for exponential backoff (±20%).
const BACKOFF_JITTER_PERCENT: f64 = 0.2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Attempts after the first one (0 = fail fast)
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_retries: u32, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_retries,
            base_delay,
            max_delay,
        }
    }

    /// Single attempt, no backoff.
    pub fn none() -> Self {
        Self::new(0, Duration::ZERO, Duration::ZERO)
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            config.store_max_retries,
            config.store_retry_base_delay,
            config.store_retry_max_delay,
        )
    }

    /// Backoff before retry number `retry` (1-based).
    pub fn delay_for(&self, retry: u32) -> Duration {
        let base_ms = self.base_delay.as_millis() as u64;
        let max_ms = self.max_delay.as_millis() as u64;
        let delay_ms = base_ms
            .saturating_mul(2u64.saturating_pow(retry.saturating_sub(1)))
            .min(max_ms);

        let jitter = (delay_ms as f64 * BACKOFF_JITTER_PERCENT * (rand_jitter() * 2.0 - 1.0)) as i64;
        let final_ms = (delay_ms as i64).saturating_add(jitter).max(0) as u64;

        Duration::from_millis(final_ms.min(max_ms))
    }

    /// Run `operation`, retrying store failures according to the policy.
    ///
    /// Each call to `operation` must produce a fresh future carrying its own
    /// timeout; the policy never bounds the total elapsed time.
    pub async fn run<F, Fut, T>(&self, name: &'static str, operation: F) -> AppResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = AppResult<T>>,
    {
        self.run_if(name, AppError::is_store_error, operation).await
    }

    /// Run `operation`, retrying only the failures `retryable` accepts.
    pub async fn run_if<F, Fut, T>(
        &self,
        name: &'static str,
        retryable: fn(&AppError) -> bool,
        mut operation: F,
    ) -> AppResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = AppResult<T>>,
    {
        let mut retry = 0;

        loop {
            match operation().await {
                Ok(value) => return Ok(value),
                Err(e) if retryable(&e) && retry < self.max_retries => {
                    retry += 1;
                    let delay = self.delay_for(retry);
                    warn!(
                        operation = name,
                        retry,
                        max_retries = self.max_retries,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Store operation failed, retrying"
                    );
                    metrics::record_store_retry(name);
                    sleep(delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::none()
    }
}

/// Random value in `[0.0, 1.0)` from the thread-local RNG.
fn rand_jitter() -> f64 {
    rand::rng().random::<f64>()
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;

    fn policy(max_retries: u32) -> RetryPolicy {
        RetryPolicy::new(max_retries, Duration::from_millis(100), Duration::from_millis(1000))
    }

    #[test]
    fn test_delay_grows_and_is_capped() {
        let policy = policy(10);

        for _ in 0..50 {
            let first = policy.delay_for(1);
            assert!(first >= Duration::from_millis(80) && first <= Duration::from_millis(120));

            let third = policy.delay_for(3);
            assert!(third >= Duration::from_millis(320) && third <= Duration::from_millis(480));

            assert!(policy.delay_for(10) <= Duration::from_millis(1000));
            assert!(policy.delay_for(40) <= Duration::from_millis(1000));
        }
    }

    #[test]
    fn test_default_is_fail_fast() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_retries, 0);
        assert_eq!(policy.delay_for(1), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_then_succeeds() {
        let attempts = Arc::new(AtomicU32::new(0));
        let counter = attempts.clone();

        let result = policy(3)
            .run("insert", || {
                let counter = counter.clone();
                async move {
                    if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                        Err(AppError::StoreError("transient".to_string()))
                    } else {
                        Ok("id")
                    }
                }
            })
            .await;

        assert_eq!(result.unwrap(), "id");
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_gives_up_after_max_retries() {
        let attempts = Arc::new(AtomicU32::new(0));
        let counter = attempts.clone();

        let result: AppResult<()> = policy(2)
            .run("find_all", || {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Err(AppError::OperationTimeout("find_all".to_string()))
                }
            })
            .await;

        assert!(matches!(result, Err(AppError::OperationTimeout(_))));
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_backoff_waits_between_attempts() {
        let start = tokio::time::Instant::now();

        let _: AppResult<()> = RetryPolicy::new(
            2,
            Duration::from_millis(1000),
            Duration::from_millis(10_000),
        )
        .run("insert", || async {
            Err(AppError::ConnectionFailed("down".to_string()))
        })
        .await;

        // 1000ms ±20% then 2000ms ±20%
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_millis(2400), "elapsed {elapsed:?}");
        assert!(elapsed <= Duration::from_millis(3600), "elapsed {elapsed:?}");
    }

    #[tokio::test(start_paused = true)]
    async fn test_non_store_errors_are_not_retried() {
        let attempts = Arc::new(AtomicU32::new(0));
        let counter = attempts.clone();

        let result: AppResult<()> = policy(5)
            .run("insert", || {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Err(AppError::Internal("bug".to_string()))
                }
            })
            .await;

        assert!(result.is_err());
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_if_limits_retries_to_accepted_errors() {
        let attempts = Arc::new(AtomicU32::new(0));
        let counter = attempts.clone();

        let result: AppResult<()> = policy(3)
            .run_if("insert", AppError::is_retryable_write, || {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Err(AppError::OperationTimeout("insert".to_string()))
                }
            })
            .await;

        assert!(matches!(result, Err(AppError::OperationTimeout(_))));
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }
}
