//! Liveness endpoint.
//!
//! `GET /health` reports that the process is up. It never touches the
//! document store, so a store outage does not fail the probe.

use axum::Json;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::http::header::USER_AGENT;
use chrono::{SecondsFormat, Utc};
use tracing::{info, instrument};

use crate::middleware::ClientAddr;
use crate::models::HealthResponse;
use crate::state::AppState;

/// Health check endpoint.
///
/// # Response Body
///
/// ```json
/// {
///   "status": "healthy",
///   "service": "product-ingest",
///   "timestamp": "2024-01-15T10:30:00Z"
/// }
/// ```
#[instrument(skip_all)]
pub async fn health_check(
    State(state): State<AppState>,
    remote_addr: ClientAddr,
    headers: HeaderMap,
) -> Json<HealthResponse> {
    let user_agent = headers
        .get(USER_AGENT)
        .and_then(|value| value.to_str().ok())
        .unwrap_or("-");

    info!(remote_addr = %remote_addr, user_agent, "Health check");

    Json(HealthResponse {
        status: "healthy".to_string(),
        service: state.config.service_name.clone(),
        timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
    })
}
