//! # Product Ingest
//!
//! HTTP ingestion service in front of a MongoDB replica set reached through a
//! load balancer, featuring:
//!
//! - **Rate Limiting**: Per-client sliding window with idle-key sweeping
//! - **Input Hygiene**: Denylist sanitization and field validation
//! - **Resilience**: Per-operation store timeouts, optional retry with backoff
//! - **Observability**: Request IDs, structured logging, Prometheus metrics
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      Axum HTTP Server                       │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Middleware (Request ID → Trace → CORS → Rate Limit)        │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Handlers (health, products)   Display loop, limiter sweep  │
//! ├─────────────────────────────────────────────────────────────┤
//! │  ProductGateway (timeouts, retry, metrics)                  │
//! ├─────────────────────────────────────────────────────────────┤
//! │  DocumentStore: MongoStore | MemoryStore                    │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use product_ingest::{AppState, Config, build_router, store};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::from_env()?;
//!     let store = store::connect(&config).await?;
//!
//!     let state = AppState::new(store, config);
//!     state.start_background_tasks();
//!     let app = build_router(state.clone());
//!
//!     // Start the server...
//!     state.shutdown().await;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod handlers;
pub mod limiter;
pub mod metrics;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;
pub mod state;
pub mod store;
pub mod utils;
pub mod validation;

// Re-exports for convenience
pub use config::Config;
pub use error::{AppError, AppResult};
pub use limiter::SlidingWindowLimiter;
pub use routes::build_router;
pub use state::AppState;
pub use store::{DocumentStore, MemoryStore, MongoStore, ProductGateway};
