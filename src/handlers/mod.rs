//! HTTP request handlers (route handlers).
//!
//! Each handler is an async function that:
//! 1. Receives HTTP request data (JSON body, URL params, caller identity)
//! 2. Delegates to a service
//! 3. Returns HTTP response (JSON, status code)

/// Admin endpoints: order status, payment reconciliation, refund review
pub mod admin;
/// Health check endpoint
pub mod health;
/// Customer order endpoints
pub mod orders;
/// Customer payment and refund request endpoints
pub mod payments;
/// Gateway callback endpoints
pub mod webhooks;

use axum::extract::{ConnectInfo, FromRequestParts};
use axum::http::request::Parts;
use std::convert::Infallible;
use std::net::SocketAddr;

/// Caller IP address, as gateways require it on payment requests.
///
/// Taken from the first `X-Forwarded-For` entry, then `X-Real-IP`, then the
/// socket peer address.
#[derive(Debug, Clone)]
pub struct ClientIp(pub String);

impl<S: Send + Sync> FromRequestParts<S> for ClientIp {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let header = |name: &str| {
            parts
                .headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.split(',').next())
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let ip = header("x-forwarded-for")
            .or_else(|| header("x-real-ip"))
            .or_else(|| {
                parts
                    .extensions
                    .get::<ConnectInfo<SocketAddr>>()
                    .map(|ConnectInfo(addr)| addr.ip().to_string())
            })
            .unwrap_or_else(|| "127.0.0.1".to_string());

        Ok(ClientIp(ip))
    }
}
