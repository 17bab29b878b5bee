mod api;
mod product;

pub use api::{CreateProductResponse, HealthResponse};
pub use product::{NewProduct, ProductId, ProductRequest, StoredProduct};
