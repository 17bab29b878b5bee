use serde::Serialize;

use super::{NewProduct, ProductId};

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// Always "healthy" once the server is listening
    pub status: String,
    /// Configured service name
    pub service: String,
    /// Current time, RFC 3339
    pub timestamp: String,
}

/// Response after successfully creating a product.
#[derive(Debug, Serialize)]
pub struct CreateProductResponse {
    pub message: String,
    #[serde(rename = "productId")]
    pub product_id: ProductId,
    pub product: NewProduct,
}
