use axum::http::StatusCode;
use axum::http::header::RETRY_AFTER;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use thiserror::Error;

use crate::validation::ValidationError;

/// Message returned to clients that exceed their request budget.
pub const RATE_LIMIT_MESSAGE: &str = "Rate limit exceeded. Please try again later.";

/// Application-wide error types with appropriate HTTP status codes.
///
/// # Taxonomy
///
/// - **Client errors** (400): `InvalidJson`, `Validation`
/// - **Unknown route** (404): `NotFound`
/// - **Rate limiting** (429): `RateLimited`
/// - **Store errors** (500): `ConnectionFailed`, `StoreError`, `OperationTimeout`
/// - **Startup errors**: `ConnectionFailed` and `ConfigError` raised before the
///   server is listening abort the process instead of producing a response
///
/// Store failures are per-request: they are logged with context and turned
/// into a generic 500 without exposing driver messages to the client.
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Invalid JSON: {0}")]
    InvalidJson(String),

    #[error("Validation failed with {} error(s)", .0.len())]
    Validation(Vec<ValidationError>),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Rate limit exceeded for client '{key}'")]
    RateLimited { key: String, retry_after_secs: u64 },

    #[error("Failed to connect to document store: {0}")]
    ConnectionFailed(String),

    #[error("Document store operation failed: {0}")]
    StoreError(String),

    #[error("Operation timed out: {0}")]
    OperationTimeout(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Internal server error: {0}")]
    Internal(String),
}

impl AppError {
    /// HTTP status code this error maps to.
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::InvalidJson(_) | AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            AppError::ConnectionFailed(_)
            | AppError::StoreError(_)
            | AppError::OperationTimeout(_)
            | AppError::ConfigError(_)
            | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Whether this error belongs to the store failure class.
    ///
    /// The retry policy only re-attempts operations that failed this way.
    pub fn is_store_error(&self) -> bool {
        matches!(
            self,
            AppError::ConnectionFailed(_) | AppError::StoreError(_) | AppError::OperationTimeout(_)
        )
    }

    /// Whether a failed write can be re-sent without risking a duplicate.
    ///
    /// Only a failure to reach the deployment qualifies. A timed-out or
    /// rejected write may already be committed.
    pub fn is_retryable_write(&self) -> bool {
        matches!(self, AppError::ConnectionFailed(_))
    }
}

/// Error response body for API endpoints.
#[derive(Serialize)]
struct ErrorResponse<'a> {
    error: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    errors: Option<&'a [ValidationError]>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        // Client-side failures are logged where they are detected; only server
        // failures are logged here, with the full error kept server-side.
        if status.is_server_error() {
            tracing::error!(error = %self, "Request failed");
        }

        match &self {
            AppError::InvalidJson(_) => (
                status,
                axum::Json(ErrorResponse {
                    error: "Invalid JSON",
                    errors: None,
                }),
            )
                .into_response(),
            AppError::Validation(errors) => (
                status,
                axum::Json(ErrorResponse {
                    error: "Validation failed",
                    errors: Some(errors),
                }),
            )
                .into_response(),
            AppError::NotFound(_) => (
                status,
                axum::Json(ErrorResponse {
                    error: "Not found",
                    errors: None,
                }),
            )
                .into_response(),
            AppError::RateLimited {
                retry_after_secs, ..
            } => (
                status,
                [(RETRY_AFTER, retry_after_secs.to_string())],
                axum::Json(ErrorResponse {
                    error: RATE_LIMIT_MESSAGE,
                    errors: None,
                }),
            )
                .into_response(),
            // Never expose store or configuration details to clients
            _ => (
                status,
                axum::Json(ErrorResponse {
                    error: "Internal server error",
                    errors: None,
                }),
            )
                .into_response(),
        }
    }
}

/// Convenience type alias for Results with AppError.
pub type AppResult<T> = Result<T, AppError>;
