//! Per-client rate limiting middleware.
//!
//! Wraps a shared [`SlidingWindowLimiter`]. The limiter is constructed by the
//! caller and injected, so tests can build isolated instances with their own
//! window and capacity.
//!
//! # Response on Rejection (429)
//!
//! ```text
//! Retry-After: <seconds until the oldest request leaves the window>
//!
//! {"error": "Rate limit exceeded. Please try again later."}
//! ```

use std::sync::Arc;
use std::task::{Context, Poll};

use axum::body::Body;
use axum::http::{Request, Response};
use axum::response::IntoResponse;
use tower::{Layer, Service};
use tracing::warn;

use super::ip::client_key;
use crate::error::AppError;
use crate::limiter::SlidingWindowLimiter;
use crate::metrics;

/// Rate limiting layer for the Tower middleware stack.
///
/// # Example
///
/// ```rust,ignore
/// let limiter = Arc::new(SlidingWindowLimiter::new(Duration::from_secs(900), 100));
/// let app = Router::new()
///     .route("/products", post(handler))
///     .layer(RateLimitLayer::new(limiter));
/// ```
#[derive(Clone)]
pub struct RateLimitLayer {
    limiter: Arc<SlidingWindowLimiter>,
}

impl RateLimitLayer {
    pub fn new(limiter: Arc<SlidingWindowLimiter>) -> Self {
        Self { limiter }
    }
}

impl<S> Layer<S> for RateLimitLayer {
    type Service = RateLimitService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        RateLimitService {
            inner,
            limiter: self.limiter.clone(),
        }
    }
}

/// Rate limiting service wrapper.
#[derive(Clone)]
pub struct RateLimitService<S> {
    inner: S,
    limiter: Arc<SlidingWindowLimiter>,
}

impl<S> Service<Request<Body>> for RateLimitService<S>
where
    S: Service<Request<Body>, Response = Response<Body>> + Clone + Send + 'static,
    S::Future: Send,
{
    type Response = Response<Body>;
    type Error = S::Error;
    type Future = std::pin::Pin<
        Box<dyn std::future::Future<Output = Result<Self::Response, Self::Error>> + Send>,
    >;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request<Body>) -> Self::Future {
        let key = client_key(&req);

        match self.limiter.check(&key) {
            Ok(()) => {
                let mut inner = self.inner.clone();
                Box::pin(async move { inner.call(req).await })
            }
            Err(retry_after) => {
                let retry_after_secs = retry_after.as_secs();
                warn!(
                    ip = %key,
                    path = %req.uri().path(),
                    retry_after_secs,
                    "Rate limit exceeded"
                );
                metrics::record_rate_limited();

                let response = AppError::RateLimited {
                    key: key.into_owned(),
                    retry_after_secs,
                }
                .into_response();

                Box::pin(async move { Ok(response) })
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use std::convert::Infallible;
    use std::time::Duration;

    use axum::http::StatusCode;
    use axum::http::header::RETRY_AFTER;
    use tower::{ServiceExt, service_fn};

    use super::*;

    fn ok_service()
    -> impl Service<Request<Body>, Response = Response<Body>, Error = Infallible, Future: Send>
    + Clone
    + Send
    + 'static {
        service_fn(|_req: Request<Body>| async {
            Ok::<_, Infallible>(Response::new(Body::from("ok")))
        })
    }

    fn request_from(ip: &str) -> Request<Body> {
        Request::builder()
            .uri("/products")
            .header("x-forwarded-for", ip)
            .body(Body::empty())
            .unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn test_rejects_after_capacity() {
        let limiter = Arc::new(SlidingWindowLimiter::new(Duration::from_secs(60), 2));
        let service = RateLimitLayer::new(limiter).layer(ok_service());

        for _ in 0..2 {
            let response = service.clone().oneshot(request_from("1.2.3.4")).await.unwrap();
            assert_eq!(response.status(), StatusCode::OK);
        }

        let response = service.clone().oneshot(request_from("1.2.3.4")).await.unwrap();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers()[RETRY_AFTER], "60");

        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["error"], "Rate limit exceeded. Please try again later.");
    }

    #[tokio::test(start_paused = true)]
    async fn test_budget_is_per_client() {
        let limiter = Arc::new(SlidingWindowLimiter::new(Duration::from_secs(60), 1));
        let service = RateLimitLayer::new(limiter.clone()).layer(ok_service());

        let first = service.clone().oneshot(request_from("1.1.1.1")).await.unwrap();
        let other = service.clone().oneshot(request_from("2.2.2.2")).await.unwrap();
        let again = service.clone().oneshot(request_from("1.1.1.1")).await.unwrap();

        assert_eq!(first.status(), StatusCode::OK);
        assert_eq!(other.status(), StatusCode::OK);
        assert_eq!(again.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(limiter.tracked_keys(), 2);
    }
}
