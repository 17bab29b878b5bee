//! Prometheus metrics for application observability.
//!
//! Metrics are exposed via a dedicated HTTP listener (default: `0.0.0.0:9090`).
//! Recording functions are safe to call before or without initialization;
//! the `metrics` facade drops samples when no recorder is installed.
//!
//! # Available Metrics
//!
//! ## Counters
//! - `ingest_products_created_total` - Products persisted successfully
//! - `ingest_validation_failures_total` - Requests rejected by validation (label: field)
//! - `ingest_rate_limit_rejections_total` - Requests rejected with 429
//! - `ingest_store_failures_total` - Failed store operations (labels: operation, kind)
//! - `ingest_store_retries_total` - Store operation retries (label: operation)
//! - `ingest_display_cycles_total` - Completed display loop iterations
//!
//! ## Histograms
//! - `ingest_store_operation_duration_seconds` - Store call latency (labels: operation, status)
//!
//! ## Gauges
//! - `ingest_rate_limit_tracked_keys` - Keys held by the rate limiter after a sweep
//! - `ingest_store_documents` - Documents returned by the last display cycle

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use tracing::{error, info};

/// Metric names as constants for consistency.
pub mod names {
    pub const PRODUCTS_CREATED_TOTAL: &str = "ingest_products_created_total";
    pub const VALIDATION_FAILURES_TOTAL: &str = "ingest_validation_failures_total";
    pub const RATE_LIMIT_REJECTIONS_TOTAL: &str = "ingest_rate_limit_rejections_total";
    pub const STORE_FAILURES_TOTAL: &str = "ingest_store_failures_total";
    pub const STORE_RETRIES_TOTAL: &str = "ingest_store_retries_total";
    pub const DISPLAY_CYCLES_TOTAL: &str = "ingest_display_cycles_total";
    pub const STORE_OPERATION_DURATION_SECONDS: &str = "ingest_store_operation_duration_seconds";
    pub const RATE_LIMIT_TRACKED_KEYS: &str = "ingest_rate_limit_tracked_keys";
    pub const STORE_DOCUMENTS: &str = "ingest_store_documents";
}

/// Initialize the Prometheus metrics exporter.
///
/// Installs the global recorder, starts the HTTP listener on `metrics_addr`,
/// and registers metric descriptions.
pub fn init_metrics(metrics_addr: SocketAddr) -> Result<(), String> {
    PrometheusBuilder::new()
        .with_http_listener(metrics_addr)
        .install()
        .map_err(|e| format!("Failed to install Prometheus exporter: {e}"))?;

    describe_counter!(
        names::PRODUCTS_CREATED_TOTAL,
        "Total number of products persisted"
    );
    describe_counter!(
        names::VALIDATION_FAILURES_TOTAL,
        "Total number of field violations returned to clients"
    );
    describe_counter!(
        names::RATE_LIMIT_REJECTIONS_TOTAL,
        "Total number of requests rejected by the rate limiter"
    );
    describe_counter!(
        names::STORE_FAILURES_TOTAL,
        "Total number of failed document store operations"
    );
    describe_counter!(
        names::STORE_RETRIES_TOTAL,
        "Total number of document store operation retries"
    );
    describe_counter!(
        names::DISPLAY_CYCLES_TOTAL,
        "Total number of completed product display cycles"
    );

    describe_histogram!(
        names::STORE_OPERATION_DURATION_SECONDS,
        "Document store operation duration in seconds"
    );

    describe_gauge!(
        names::RATE_LIMIT_TRACKED_KEYS,
        "Number of client keys tracked by the rate limiter"
    );
    describe_gauge!(
        names::STORE_DOCUMENTS,
        "Number of documents seen by the last display cycle"
    );

    info!(addr = %metrics_addr, "Prometheus metrics endpoint started");
    Ok(())
}

/// Try to initialize metrics, logging any errors but not failing.
pub fn try_init_metrics(metrics_addr: SocketAddr) {
    if let Err(e) = init_metrics(metrics_addr) {
        error!(error = %e, "Failed to initialize metrics, continuing without metrics");
    }
}

// =============================================================================
// Counter Recording Functions
// =============================================================================

pub fn record_product_created() {
    counter!(names::PRODUCTS_CREATED_TOTAL).increment(1);
}

/// Record one failure per violated field.
pub fn record_validation_failure(field: &str) {
    counter!(names::VALIDATION_FAILURES_TOTAL, "field" => field.to_string()).increment(1);
}

pub fn record_rate_limited() {
    counter!(names::RATE_LIMIT_REJECTIONS_TOTAL).increment(1);
}

/// Record a failed store operation.
///
/// `kind` is one of `connection`, `store`, or `timeout`.
pub fn record_store_failure(operation: &'static str, kind: &'static str) {
    counter!(names::STORE_FAILURES_TOTAL, "operation" => operation, "kind" => kind).increment(1);
}

pub fn record_store_retry(operation: &'static str) {
    counter!(names::STORE_RETRIES_TOTAL, "operation" => operation).increment(1);
}

/// Record a finished display cycle and the number of documents it listed.
pub fn record_display_cycle(documents: usize) {
    counter!(names::DISPLAY_CYCLES_TOTAL).increment(1);
    gauge!(names::STORE_DOCUMENTS).set(documents as f64);
}

// =============================================================================
// Histogram Recording Functions
// =============================================================================

/// Record store operation duration.
pub fn record_store_duration(operation: &'static str, status: &'static str, duration_secs: f64) {
    histogram!(names::STORE_OPERATION_DURATION_SECONDS, "operation" => operation, "status" => status)
        .record(duration_secs);
}

// =============================================================================
// Gauge Recording Functions
// =============================================================================

pub fn set_tracked_keys(keys: usize) {
    gauge!(names::RATE_LIMIT_TRACKED_KEYS).set(keys as f64);
}
