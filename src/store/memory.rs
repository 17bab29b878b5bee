//! Process-local document store.
//!
//! Backs `STORE_BACKEND=memory` and the test suites. Supports failure
//! injection so outage and timeout paths can be exercised without a database.

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use mongodb::bson::oid::ObjectId;
use tokio::sync::RwLock;

use super::DocumentStore;
use crate::error::{AppError, AppResult};
use crate::models::{NewProduct, ProductId, StoredProduct};

#[derive(Debug, Default)]
pub struct MemoryStore {
    products: RwLock<Vec<StoredProduct>>,
    unavailable: AtomicBool,
    failures_remaining: AtomicU32,
    latency_ms: AtomicU64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every operation fail with a connection error until cleared.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Fail the next `count` operations with a store error.
    pub fn fail_next(&self, count: u32) {
        self.failures_remaining.store(count, Ordering::SeqCst);
    }

    /// Delay every operation by `latency`.
    pub fn set_latency(&self, latency: Duration) {
        self.latency_ms
            .store(latency.as_millis() as u64, Ordering::SeqCst);
    }

    pub async fn len(&self) -> usize {
        self.products.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.products.read().await.is_empty()
    }

    async fn before_operation(&self) -> AppResult<()> {
        let latency = self.latency_ms.load(Ordering::SeqCst);
        if latency > 0 {
            tokio::time::sleep(Duration::from_millis(latency)).await;
        }

        if self.unavailable.load(Ordering::SeqCst) {
            return Err(AppError::ConnectionFailed(
                "memory store marked unavailable".to_string(),
            ));
        }

        let injected = self
            .failures_remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if injected {
            return Err(AppError::StoreError("injected failure".to_string()));
        }

        Ok(())
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn insert(&self, product: &NewProduct) -> AppResult<ProductId> {
        self.before_operation().await?;

        let id = ProductId::new(ObjectId::new().to_hex());
        self.products
            .write()
            .await
            .push(StoredProduct::from_new(id.clone(), product.clone()));

        Ok(id)
    }

    async fn find_all(&self) -> AppResult<Vec<StoredProduct>> {
        self.before_operation().await?;
        Ok(self.products.read().await.clone())
    }

    fn backend(&self) -> &'static str {
        "memory"
    }
}
