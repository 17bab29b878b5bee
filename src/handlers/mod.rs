mod health;
mod products;

use axum::http::Uri;
use tracing::debug;

use crate::error::AppError;

pub use health::health_check;
pub use products::{CREATED_MESSAGE, create_product};

/// Fallback for unmatched routes.
pub async fn not_found(uri: Uri) -> AppError {
    debug!(path = %uri.path(), "No route matched");
    AppError::NotFound(uri.path().to_string())
}
