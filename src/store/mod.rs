//! Document store gateway.
//!
//! # Architecture
//!
//! ```text
//! Handlers / display loop
//!          │
//!   ProductGateway      per-call timeout, retry policy, metrics
//!          │
//!   dyn DocumentStore
//!      ├── MongoStore   replica set behind a load balancer
//!      └── MemoryStore  process-local, tests and local runs
//! ```
//!
//! The gateway addresses a single endpoint and is unaware of which replica
//! set member served a call. Every operation is bounded by its own timeout;
//! an expired timeout fails only that call.

mod memory;
mod mongo;
mod retry;

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;
use tracing::{debug, error, info, instrument};

pub use memory::MemoryStore;
pub use mongo::MongoStore;
pub use retry::RetryPolicy;

use crate::config::{Config, StoreBackend};
use crate::error::{AppError, AppResult};
use crate::metrics;
use crate::models::{NewProduct, ProductId, StoredProduct};

/// Persistence port for product documents.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Persist one product and return its store-assigned identifier.
    async fn insert(&self, product: &NewProduct) -> AppResult<ProductId>;

    /// Return every product in the collection.
    ///
    /// Records that cannot be decoded are skipped by the implementation.
    async fn find_all(&self) -> AppResult<Vec<StoredProduct>>;

    /// Short backend name for logs.
    fn backend(&self) -> &'static str;
}

/// Connect the configured backend.
///
/// For MongoDB this establishes the connection and pings the deployment under
/// the connect timeout. Failure here is fatal to startup.
#[instrument(skip(config), fields(backend = %config.store_backend))]
pub async fn connect(config: &Config) -> AppResult<Arc<dyn DocumentStore>> {
    match config.store_backend {
        StoreBackend::Mongo => Ok(Arc::new(MongoStore::connect(config).await?)),
        StoreBackend::Memory => {
            info!("Using in-memory document store");
            Ok(Arc::new(MemoryStore::new()))
        }
    }
}

/// Timeout- and retry-aware access to a [`DocumentStore`].
///
/// Cheap to clone; clones share the underlying store.
#[derive(Clone)]
pub struct ProductGateway {
    store: Arc<dyn DocumentStore>,
    insert_timeout: Duration,
    find_timeout: Duration,
    retry: RetryPolicy,
}

impl ProductGateway {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        insert_timeout: Duration,
        find_timeout: Duration,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            store,
            insert_timeout,
            find_timeout,
            retry,
        }
    }

    pub fn from_config(store: Arc<dyn DocumentStore>, config: &Config) -> Self {
        Self::new(
            store,
            config.insert_timeout,
            config.find_timeout,
            RetryPolicy::from_config(config),
        )
    }

    /// Insert a product under the insert timeout.
    ///
    /// Only connection failures are retried; a timed-out insert may have been
    /// committed and is returned as is.
    ///
    /// # Errors
    ///
    /// - `AppError::OperationTimeout` if an attempt exceeds the insert timeout
    /// - `AppError::StoreError` / `AppError::ConnectionFailed` from the backend
    #[instrument(skip(self, product), fields(backend = self.store.backend(), name = %product.name))]
    pub async fn insert(&self, product: &NewProduct) -> AppResult<ProductId> {
        let store = &self.store;
        let limit = self.insert_timeout;
        let id = self
            .retry
            .run_if("insert", AppError::is_retryable_write, move || {
                bounded("insert", limit, store.insert(product))
            })
            .await?;

        debug!(product_id = %id, "Product inserted");
        Ok(id)
    }

    /// Read all products under the find timeout.
    #[instrument(skip(self), fields(backend = self.store.backend()))]
    pub async fn find_all(&self) -> AppResult<Vec<StoredProduct>> {
        let store = &self.store;
        let limit = self.find_timeout;
        self.retry
            .run("find_all", move || bounded("find_all", limit, store.find_all()))
            .await
    }

    pub fn backend(&self) -> &'static str {
        self.store.backend()
    }
}

/// Run one store call under `limit`, recording duration and failure metrics.
async fn bounded<T, Fut>(operation: &'static str, limit: Duration, call: Fut) -> AppResult<T>
where
    Fut: Future<Output = AppResult<T>>,
{
    let start = Instant::now();

    let result = match tokio::time::timeout(limit, call).await {
        Ok(result) => result,
        Err(_) => Err(AppError::OperationTimeout(format!(
            "{operation} timed out after {limit:?}"
        ))),
    };

    let elapsed = start.elapsed().as_secs_f64();
    match &result {
        Ok(_) => metrics::record_store_duration(operation, "success", elapsed),
        Err(e) => {
            let kind = match e {
                AppError::ConnectionFailed(_) => "connection",
                AppError::OperationTimeout(_) => "timeout",
                _ => "store",
            };
            error!(operation, kind, error = %e, "Store operation failed");
            metrics::record_store_duration(operation, "error", elapsed);
            metrics::record_store_failure(operation, kind);
        }
    }

    result
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use chrono::Utc;

    use super::*;

    fn product(name: &str) -> NewProduct {
        NewProduct {
            name: name.to_string(),
            price: Some(1.0),
            description: None,
            created_at: Utc::now(),
        }
    }

    fn gateway(store: Arc<MemoryStore>, retry: RetryPolicy) -> ProductGateway {
        ProductGateway::new(
            store,
            Duration::from_secs(5),
            Duration::from_secs(5),
            retry,
        )
    }

    #[tokio::test]
    async fn test_insert_then_find_all() {
        let store = Arc::new(MemoryStore::new());
        let gateway = gateway(store.clone(), RetryPolicy::none());

        let id = gateway.insert(&product("Widget")).await.unwrap();
        let all = gateway.find_all().await.unwrap();

        assert_eq!(all.len(), 1);
        assert_eq!(all[0].id, id);
        assert_eq!(all[0].name, "Widget");
        assert_eq!(gateway.backend(), "memory");
    }

    #[tokio::test(start_paused = true)]
    async fn test_insert_times_out() {
        let store = Arc::new(MemoryStore::new());
        store.set_latency(Duration::from_secs(6));
        let gateway = gateway(store.clone(), RetryPolicy::none());

        let result = gateway.insert(&product("Slow")).await;

        assert!(matches!(result, Err(AppError::OperationTimeout(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_find_within_timeout_succeeds() {
        let store = Arc::new(MemoryStore::new());
        store.set_latency(Duration::from_secs(4));
        let gateway = gateway(store, RetryPolicy::none());

        assert!(gateway.find_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_failure_does_not_poison_gateway() {
        let store = Arc::new(MemoryStore::new());
        store.fail_next(1);
        let gateway = gateway(store.clone(), RetryPolicy::none());

        assert!(gateway.insert(&product("First")).await.is_err());
        assert!(gateway.insert(&product("Second")).await.is_ok());
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_policy_recovers_transient_read_failure() {
        let store = Arc::new(MemoryStore::new());
        store.fail_next(2);
        let gateway = gateway(
            store.clone(),
            RetryPolicy::new(2, Duration::from_millis(100), Duration::from_secs(1)),
        );

        assert!(gateway.find_all().await.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_timed_out_insert_is_not_resent() {
        let store = Arc::new(MemoryStore::new());
        store.set_latency(Duration::from_secs(6));
        let gateway = gateway(
            store.clone(),
            RetryPolicy::new(3, Duration::from_millis(100), Duration::from_secs(1)),
        );

        let start = Instant::now();
        let result = gateway.insert(&product("Slow")).await;

        assert!(matches!(result, Err(AppError::OperationTimeout(_))));
        // One 5s attempt, no backoff or second attempt
        assert!(start.elapsed() < Duration::from_secs(6));
    }

    #[tokio::test(start_paused = true)]
    async fn test_rejected_insert_is_not_resent() {
        let store = Arc::new(MemoryStore::new());
        store.fail_next(1);
        let gateway = gateway(
            store.clone(),
            RetryPolicy::new(3, Duration::from_millis(100), Duration::from_secs(1)),
        );

        assert!(matches!(
            gateway.insert(&product("Once")).await,
            Err(AppError::StoreError(_))
        ));
        assert!(store.is_empty().await);
    }

    /// Refuses the first `refusals` calls as unreachable, then delegates.
    struct FlakyConnection {
        inner: MemoryStore,
        refusals: AtomicU32,
    }

    #[async_trait]
    impl DocumentStore for FlakyConnection {
        async fn insert(&self, product: &NewProduct) -> AppResult<ProductId> {
            if self
                .refusals
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
            {
                return Err(AppError::ConnectionFailed("connection refused".to_string()));
            }
            self.inner.insert(product).await
        }

        async fn find_all(&self) -> AppResult<Vec<StoredProduct>> {
            self.inner.find_all().await
        }

        fn backend(&self) -> &'static str {
            "flaky"
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_insert_retries_connection_failures() {
        let store = Arc::new(FlakyConnection {
            inner: MemoryStore::new(),
            refusals: AtomicU32::new(2),
        });
        let gateway = ProductGateway::new(
            store.clone(),
            Duration::from_secs(5),
            Duration::from_secs(5),
            RetryPolicy::new(2, Duration::from_millis(100), Duration::from_secs(1)),
        );

        assert!(gateway.insert(&product("Retried")).await.is_ok());
        assert_eq!(store.inner.len().await, 1);
    }
}
