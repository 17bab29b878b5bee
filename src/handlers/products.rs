//! Product ingestion endpoint.
//!
//! `POST /products` runs parse → sanitize → validate → insert. Each stage
//! short-circuits with its own error class:
//!
//! | Stage    | Failure            | Status |
//! |----------|--------------------|--------|
//! | parse    | malformed JSON     | 400    |
//! | validate | field violations   | 400    |
//! | insert   | store error/timeout| 500    |

use axum::Json;
use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use chrono::Utc;
use tracing::{info, instrument, warn};

use crate::error::{AppError, AppResult};
use crate::metrics;
use crate::middleware::ClientAddr;
use crate::models::{CreateProductResponse, NewProduct, ProductRequest};
use crate::state::AppState;
use crate::validation::{sanitize_product, validate_product};

/// Message returned with every successful creation.
pub const CREATED_MESSAGE: &str = "Product created successfully";

/// Create a product.
///
/// # Request Body
///
/// ```json
/// {"name": "Widget", "price": 9.99, "description": "Optional"}
/// ```
///
/// # Response Body (201)
///
/// ```json
/// {
///   "message": "Product created successfully",
///   "productId": "65a4f0c2e13b5a0012345678",
///   "product": {"name": "Widget", "price": 9.99, "createdAt": "..."}
/// }
/// ```
#[instrument(skip_all, fields(remote_addr = %remote_addr))]
pub async fn create_product(
    State(state): State<AppState>,
    remote_addr: ClientAddr,
    payload: Result<Json<ProductRequest>, JsonRejection>,
) -> AppResult<(StatusCode, Json<CreateProductResponse>)> {
    let Json(mut request) = payload.map_err(|rejection| {
        let detail = rejection.body_text();
        warn!(error = %detail, "Rejected malformed product body");
        AppError::InvalidJson(detail)
    })?;

    sanitize_product(&mut request);

    let errors = validate_product(&request);
    if !errors.is_empty() {
        for error in &errors {
            metrics::record_validation_failure(&error.field);
        }
        warn!(violations = errors.len(), "Product validation failed");
        return Err(AppError::Validation(errors));
    }

    let product = NewProduct::from_request(request, Utc::now());
    let product_id = state.gateway.insert(&product).await?;

    metrics::record_product_created();
    info!(product_id = %product_id, name = %product.name, "Product created");

    Ok((
        StatusCode::CREATED,
        Json(CreateProductResponse {
            message: CREATED_MESSAGE.to_string(),
            product_id,
            product,
        }),
    ))
}
