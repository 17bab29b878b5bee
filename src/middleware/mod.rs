//! HTTP middleware for cross-origin access, rate limiting, and client
//! identification.
//!
//! # Architecture
//!
//! ```text
//! Request → Trace/Request ID → CORS → Rate Limiter → Handler → Response
//!                               ↓          ↓
//!                        200 on OPTIONS   429 Too Many Requests
//! ```
//!
//! CORS sits outside the rate limiter, so preflights are answered without
//! consuming budget and 429 responses still carry CORS headers.

pub mod cors;
pub mod ip;
pub mod rate_limit;

pub use cors::CorsLayer;
pub use ip::{ClientAddr, UNKNOWN_CLIENT, client_key};
pub use rate_limit::RateLimitLayer;
