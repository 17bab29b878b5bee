//! Per-client sliding-window rate limiter.
//!
//! # Algorithm
//!
//! Each key maps to the arrival instants of its requests inside the trailing
//! window. On every check:
//!
//! 1. `window_start = now - window`
//! 2. instants older than `window_start` are dropped
//! 3. if `max_requests` instants remain, the request is rejected and nothing
//!    is recorded
//! 4. otherwise `now` is appended and the request is allowed
//!
//! The map is a `DashMap`, so the purge-check-record sequence for a key runs
//! under that key's shard lock and concurrent requests sharing a key are
//! serialized.
//!
//! # Memory
//!
//! Keys that stop sending traffic keep an empty entry until [`sweep`] evicts
//! them. The application state runs a periodic sweep task.
//!
//! Time comes from `tokio::time::Instant`, so tests can drive the window with
//! a paused clock.
//!
//! [`sweep`]: SlidingWindowLimiter::sweep

use std::collections::VecDeque;
use std::time::Duration;

use dashmap::DashMap;
use tokio::time::Instant;
use tracing::debug;

/// Default window length (15 minutes).
pub const DEFAULT_WINDOW: Duration = Duration::from_secs(15 * 60);

/// Default number of requests allowed per key inside the window.
pub const DEFAULT_MAX_REQUESTS: usize = 100;

/// Rejection returned by [`SlidingWindowLimiter::check`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryAfter(pub Duration);

impl RetryAfter {
    /// Whole seconds until a slot frees up, never less than 1.
    pub fn as_secs(&self) -> u64 {
        let secs = self.0.as_secs();
        let secs = if self.0.subsec_nanos() > 0 { secs + 1 } else { secs };
        secs.max(1)
    }
}

/// Sliding-window limiter keyed by client identifier.
///
/// Constructed explicitly and shared behind an `Arc`; there is no global
/// instance.
#[derive(Debug)]
pub struct SlidingWindowLimiter {
    windows: DashMap<String, VecDeque<Instant>>,
    window: Duration,
    max_requests: usize,
}

impl SlidingWindowLimiter {
    /// Create a limiter allowing `max_requests` per `window` for each key.
    pub fn new(window: Duration, max_requests: usize) -> Self {
        Self {
            windows: DashMap::new(),
            window,
            max_requests,
        }
    }

    /// Record a request for `key` if it fits in the window.
    ///
    /// Returns `false` when the key is at capacity.
    pub fn allow(&self, key: &str) -> bool {
        self.check(key).is_ok()
    }

    /// Like [`allow`](Self::allow), but reports how long the caller should
    /// wait when rejected.
    pub fn check(&self, key: &str) -> Result<(), RetryAfter> {
        let mut entry = self.windows.entry(key.to_owned()).or_default();
        let timestamps = entry.value_mut();
        let now = Instant::now();

        self.purge(timestamps, now);

        if timestamps.len() >= self.max_requests {
            let oldest = timestamps.front().copied().unwrap_or(now);
            let retry_after = (oldest + self.window).saturating_duration_since(now);
            return Err(RetryAfter(retry_after));
        }

        timestamps.push_back(now);
        Ok(())
    }

    /// Evict keys with no requests left inside the window.
    ///
    /// Returns the number of evicted keys.
    pub fn sweep(&self) -> usize {
        let now = Instant::now();
        let before = self.windows.len();

        self.windows.retain(|_, timestamps| {
            self.purge(timestamps, now);
            !timestamps.is_empty()
        });

        let evicted = before.saturating_sub(self.windows.len());
        if evicted > 0 {
            debug!(evicted, remaining = self.windows.len(), "Swept idle rate limit keys");
        }
        evicted
    }

    /// Number of keys currently tracked.
    pub fn tracked_keys(&self) -> usize {
        self.windows.len()
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    pub fn max_requests(&self) -> usize {
        self.max_requests
    }

    fn purge(&self, timestamps: &mut VecDeque<Instant>, now: Instant) {
        // Nothing can be older than the window before the clock has run that long
        let Some(window_start) = now.checked_sub(self.window) else {
            return;
        };

        while timestamps.front().is_some_and(|t| *t < window_start) {
            timestamps.pop_front();
        }
    }
}

impl Default for SlidingWindowLimiter {
    fn default() -> Self {
        Self::new(DEFAULT_WINDOW, DEFAULT_MAX_REQUESTS)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use std::sync::Arc;

    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_allows_up_to_max_requests() {
        let limiter = SlidingWindowLimiter::new(Duration::from_secs(60), 3);

        assert!(limiter.allow("client"));
        assert!(limiter.allow("client"));
        assert!(limiter.allow("client"));
        assert!(!limiter.allow("client"));
        assert!(!limiter.allow("client"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_default_limits() {
        let limiter = SlidingWindowLimiter::default();
        assert_eq!(limiter.window(), Duration::from_secs(900));
        assert_eq!(limiter.max_requests(), 100);

        for _ in 0..100 {
            assert!(limiter.allow("10.0.0.1"));
        }
        assert!(!limiter.allow("10.0.0.1"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_keys_are_independent() {
        let limiter = SlidingWindowLimiter::new(Duration::from_secs(60), 1);

        assert!(limiter.allow("a"));
        assert!(!limiter.allow("a"));
        assert!(limiter.allow("b"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_rejected_requests_are_not_recorded() {
        let limiter = SlidingWindowLimiter::new(Duration::from_secs(10), 2);

        assert!(limiter.allow("k"));
        tokio::time::advance(Duration::from_secs(5)).await;
        assert!(limiter.allow("k"));

        // Rejections at t=6..9 must not extend the window
        for _ in 0..4 {
            tokio::time::advance(Duration::from_secs(1)).await;
            assert!(!limiter.allow("k"));
        }

        // t=11: the first request (t=0) has expired, one slot is free again
        tokio::time::advance(Duration::from_secs(2)).await;
        assert!(limiter.allow("k"));
        assert!(!limiter.allow("k"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_key_recovers_after_window() {
        let limiter = SlidingWindowLimiter::new(Duration::from_secs(900), 100);
        for _ in 0..100 {
            assert!(limiter.allow("k"));
        }
        assert!(!limiter.allow("k"));

        tokio::time::advance(Duration::from_secs(901)).await;
        assert!(limiter.allow("k"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_after_points_at_oldest_request() {
        let limiter = SlidingWindowLimiter::new(Duration::from_secs(60), 1);
        assert!(limiter.check("k").is_ok());

        tokio::time::advance(Duration::from_secs(20)).await;
        let retry = limiter.check("k").unwrap_err();
        assert_eq!(retry.0, Duration::from_secs(40));
        assert_eq!(retry.as_secs(), 40);
    }

    #[test]
    fn test_retry_after_rounds_up_and_floors_at_one() {
        assert_eq!(RetryAfter(Duration::from_millis(1500)).as_secs(), 2);
        assert_eq!(RetryAfter(Duration::ZERO).as_secs(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweep_evicts_idle_keys() {
        let limiter = SlidingWindowLimiter::new(Duration::from_secs(30), 5);
        limiter.allow("idle");
        tokio::time::advance(Duration::from_secs(20)).await;
        limiter.allow("active");
        assert_eq!(limiter.tracked_keys(), 2);

        tokio::time::advance(Duration::from_secs(15)).await;
        assert_eq!(limiter.sweep(), 1);
        assert_eq!(limiter.tracked_keys(), 1);

        tokio::time::advance(Duration::from_secs(30)).await;
        assert_eq!(limiter.sweep(), 1);
        assert_eq!(limiter.tracked_keys(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweep_keeps_budget_of_active_keys() {
        let limiter = SlidingWindowLimiter::new(Duration::from_secs(30), 1);
        assert!(limiter.allow("k"));
        assert_eq!(limiter.sweep(), 0);
        assert!(!limiter.allow("k"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_callers_never_exceed_capacity() {
        let limiter = Arc::new(SlidingWindowLimiter::new(Duration::from_secs(3600), 50));
        let mut handles = Vec::new();

        for _ in 0..8 {
            let limiter = limiter.clone();
            handles.push(tokio::spawn(async move {
                (0..25).filter(|_| limiter.allow("shared")).count()
            }));
        }

        let mut allowed = 0;
        for handle in handles {
            allowed += handle.await.unwrap();
        }
        assert_eq!(allowed, 50);
    }
}
