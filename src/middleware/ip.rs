//! Client identification for rate limiting and request logging.
//!
//! # Key Derivation
//!
//! 1. First comma-separated value of `X-Forwarded-For`, trimmed
//! 2. Peer IP of the TCP connection (`ConnectInfo<SocketAddr>`)
//! 3. [`UNKNOWN_CLIENT`]
//!
//! # Security Warning: IP Spoofing Risk
//!
//! `X-Forwarded-For` is client-controlled unless the load balancer in front of
//! this service overwrites it. Deploy behind a proxy that sets the header and
//! block direct access, otherwise clients can rotate spoofed values to bypass
//! the per-client budget.
//!
//! The peer address is keyed by IP only. Keying on `ip:port` would give every
//! new connection a fresh budget.

use std::borrow::Cow;
use std::convert::Infallible;
use std::net::SocketAddr;

use axum::extract::{ConnectInfo, FromRequestParts};
use axum::http::request::Parts;
use axum::http::{Extensions, HeaderMap, Request};

/// Fallback key when neither a forwarded header nor a peer address exists.
///
/// All such requests share one budget.
pub const UNKNOWN_CLIENT: &str = "unknown";

/// Header set by the load balancer with the originating client address.
pub const FORWARDED_FOR_HEADER: &str = "x-forwarded-for";

#[inline]
fn forwarded_for(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(FORWARDED_FOR_HEADER)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .map(str::trim)
        .filter(|ip| !ip.is_empty())
}

#[inline]
fn peer_addr(extensions: &Extensions) -> Option<SocketAddr> {
    extensions
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr)
}

/// Derive the rate limiting key for a request.
///
/// Returns `Cow::Borrowed` only for the [`UNKNOWN_CLIENT`] fallback.
pub fn client_key<B>(req: &Request<B>) -> Cow<'static, str> {
    if let Some(ip) = forwarded_for(req.headers()) {
        return Cow::Owned(ip.to_string());
    }

    match peer_addr(req.extensions()) {
        Some(addr) => Cow::Owned(addr.ip().to_string()),
        None => Cow::Borrowed(UNKNOWN_CLIENT),
    }
}

/// Remote address of the connection, for logging.
///
/// Extraction never fails; requests served without connect info (tests,
/// in-process callers) report [`UNKNOWN_CLIENT`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientAddr(pub String);

impl<S> FromRequestParts<S> for ClientAddr
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let addr = peer_addr(&parts.extensions)
            .map(|addr| addr.to_string())
            .unwrap_or_else(|| UNKNOWN_CLIENT.to_string());
        Ok(Self(addr))
    }
}

impl std::fmt::Display for ClientAddr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use axum::body::Body;

    fn with_peer(builder: axum::http::request::Builder, addr: &str) -> Request<Body> {
        let mut req = builder.body(Body::empty()).unwrap();
        req.extensions_mut()
            .insert(ConnectInfo(addr.parse::<SocketAddr>().unwrap()));
        req
    }

    #[test]
    fn test_key_from_xff_first_value() {
        let req = Request::builder()
            .header("x-forwarded-for", "192.168.1.1, 10.0.0.1")
            .body(Body::empty())
            .unwrap();

        assert_eq!(client_key(&req), "192.168.1.1");
    }

    #[test]
    fn test_key_from_xff_trims_whitespace() {
        let req = Request::builder()
            .header("x-forwarded-for", "  203.0.113.50  , 10.0.0.1")
            .body(Body::empty())
            .unwrap();

        assert_eq!(client_key(&req), "203.0.113.50");
    }

    #[test]
    fn test_empty_xff_falls_back_to_peer() {
        let req = with_peer(
            Request::builder().header("x-forwarded-for", " "),
            "172.17.0.5:51234",
        );

        assert_eq!(client_key(&req), "172.17.0.5");
    }

    #[test]
    fn test_xff_takes_priority_over_peer() {
        let req = with_peer(
            Request::builder().header("x-forwarded-for", "10.0.0.1"),
            "172.17.0.5:51234",
        );

        assert_eq!(client_key(&req), "10.0.0.1");
    }

    #[test]
    fn test_key_from_peer_ignores_port() {
        let first = with_peer(Request::builder(), "172.17.0.5:51234");
        let second = with_peer(Request::builder(), "172.17.0.5:51299");

        assert_eq!(client_key(&first), "172.17.0.5");
        assert_eq!(client_key(&first), client_key(&second));
    }

    #[test]
    fn test_key_from_ipv6_peer() {
        let req = with_peer(Request::builder(), "[::1]:8080");
        assert_eq!(client_key(&req), "::1");
    }

    #[test]
    fn test_unknown_key_is_borrowed() {
        let req = Request::builder().body(Body::empty()).unwrap();

        let key = client_key(&req);
        assert_eq!(key, UNKNOWN_CLIENT);
        assert!(matches!(key, Cow::Borrowed(_)));
    }

    #[tokio::test]
    async fn test_client_addr_extractor() {
        let req = with_peer(Request::builder(), "10.1.2.3:4567");
        let (mut parts, _) = req.into_parts();

        let ClientAddr(addr) = ClientAddr::from_request_parts(&mut parts, &())
            .await
            .unwrap();
        assert_eq!(addr, "10.1.2.3:4567");
    }

    #[tokio::test]
    async fn test_client_addr_extractor_without_connect_info() {
        let (mut parts, _) = Request::builder()
            .body(Body::empty())
            .unwrap()
            .into_parts();

        let addr = ClientAddr::from_request_parts(&mut parts, &())
            .await
            .unwrap();
        assert_eq!(addr.0, UNKNOWN_CLIENT);
    }
}
