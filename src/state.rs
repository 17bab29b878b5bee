//! Shared application state for Axum handlers.
//!
//! # Structured Concurrency
//!
//! Background tasks (product display loop, limiter sweep) are managed using
//! `tokio_util::task::TaskTracker` and `CancellationToken`. Call `shutdown()`
//! to stop them before application exit.

use std::sync::Arc;

use tokio::time::interval;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info};

use crate::config::Config;
use crate::limiter::SlidingWindowLimiter;
use crate::metrics;
use crate::services;
use crate::store::{DocumentStore, ProductGateway};

/// Shared application state for Axum handlers.
///
/// Cloned for each request; all internal data is behind `Arc`.
///
/// # Lifecycle
///
/// ```rust,ignore
/// let state = AppState::new(store, config);
/// state.start_background_tasks();
/// // ... serve ...
/// state.shutdown().await;
/// ```
#[derive(Clone)]
pub struct AppState {
    /// Application configuration
    pub config: Arc<Config>,
    /// Timeout-bounded access to the document store
    pub gateway: ProductGateway,
    /// Per-client request limiter shared with the rate limit layer
    pub limiter: Arc<SlidingWindowLimiter>,
    task_tracker: TaskTracker,
    cancellation_token: CancellationToken,
}

impl AppState {
    /// Create application state from a connected store and configuration.
    ///
    /// No tasks are started; see [`start_background_tasks`](Self::start_background_tasks).
    pub fn new(store: Arc<dyn DocumentStore>, config: Config) -> Self {
        let limiter = Arc::new(SlidingWindowLimiter::new(
            config.rate_limit_window,
            config.rate_limit_max_requests,
        ));
        Self::with_limiter(store, config, limiter)
    }

    /// Create application state around an existing limiter.
    pub fn with_limiter(
        store: Arc<dyn DocumentStore>,
        config: Config,
        limiter: Arc<SlidingWindowLimiter>,
    ) -> Self {
        let gateway = ProductGateway::from_config(store, &config);

        Self {
            config: Arc::new(config),
            gateway,
            limiter,
            task_tracker: TaskTracker::new(),
            cancellation_token: CancellationToken::new(),
        }
    }

    /// Spawn the display loop and the limiter sweep, unless disabled.
    pub fn start_background_tasks(&self) {
        if self.config.display_interval.is_zero() {
            info!("Product display loop disabled (DISPLAY_INTERVAL_SECS=0)");
        } else {
            self.task_tracker.spawn(services::run_display_loop(
                self.gateway.clone(),
                self.config.display_interval,
                self.cancellation_token.clone(),
            ));
        }

        if !self.config.rate_limiting_enabled() || self.config.rate_limit_sweep_interval.is_zero() {
            info!("Rate limiter sweep disabled");
        } else {
            self.spawn_sweep_task();
        }
    }

    /// Spawn the periodic eviction of idle limiter keys.
    ///
    /// Only the limiter is moved into the task, not the whole state.
    fn spawn_sweep_task(&self) {
        let limiter = self.limiter.clone();
        let period = self.config.rate_limit_sweep_interval;
        let cancel = self.cancellation_token.clone();

        self.task_tracker.spawn(async move {
            let mut ticker = interval(period);
            ticker.tick().await; // Skip first immediate tick

            loop {
                tokio::select! {
                    biased;

                    _ = cancel.cancelled() => {
                        debug!("Limiter sweep task received cancellation signal");
                        break;
                    }
                    _ = ticker.tick() => {
                        limiter.sweep();
                        metrics::set_tracked_keys(limiter.tracked_keys());
                    }
                }
            }

            debug!("Limiter sweep task shutting down");
        });
    }

    /// Gracefully shutdown all background tasks.
    ///
    /// Signals cancellation, closes the tracker, and waits for every task.
    pub async fn shutdown(&self) {
        info!("Initiating graceful shutdown of background tasks");

        self.cancellation_token.cancel();
        self.task_tracker.close();
        self.task_tracker.wait().await;

        info!("All background tasks have completed");
    }

    /// Number of background tasks still running.
    pub fn running_tasks(&self) -> usize {
        self.task_tracker.len()
    }
}
