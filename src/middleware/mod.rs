//! HTTP middleware components.
//!
//! Middleware run before route handlers. Here they:
//! - Authenticate requests by bearer token
//! - Restrict admin routes to the admin role

/// Token authentication and admin guard
pub mod auth;
