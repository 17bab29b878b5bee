use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Request body for `POST /products`.
///
/// A missing `name` deserializes to an empty string so that it is reported
/// as a validation error rather than a malformed body.
#[derive(Debug, Clone, Deserialize)]
pub struct ProductRequest {
    /// Product name (required, 1-100 characters after trimming)
    #[serde(default)]
    pub name: String,
    /// Optional non-negative price
    #[serde(default)]
    pub price: Option<f64>,
    /// Optional description (at most 500 characters after trimming)
    #[serde(default)]
    pub description: Option<String>,
}

/// Insert payload handed to the document store.
///
/// Also echoed back to the client in the creation response.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewProduct {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub price: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Server-assigned creation timestamp
    #[serde(rename = "createdAt")]
    pub created_at: DateTime<Utc>,
}

impl NewProduct {
    /// Build an insert payload from an already sanitized and validated request.
    pub fn from_request(req: ProductRequest, created_at: DateTime<Utc>) -> Self {
        Self {
            name: req.name,
            price: req.price,
            description: req.description,
            created_at,
        }
    }
}

/// Store-assigned product identifier (hex-encoded ObjectId).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct ProductId(String);

impl ProductId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ProductId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A product record as read back from the store for display.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StoredProduct {
    pub id: ProductId,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub price: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(rename = "createdAt")]
    pub created_at: DateTime<Utc>,
}

impl StoredProduct {
    /// Attach a store-assigned identifier to an insert payload.
    pub fn from_new(id: ProductId, product: NewProduct) -> Self {
        Self {
            id,
            name: product.name,
            price: product.price,
            description: product.description,
            created_at: product.created_at,
        }
    }
}
