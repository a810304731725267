//! Data models representing database entities.
//!
//! This module contains the data structures that map to database tables,
//! plus the request and response bodies of the HTTP API.

/// API token authentication model
pub mod auth;
/// Catalog data read through the provider ports: books, carts, addresses
pub mod catalog;
pub mod inventory;
/// Money arithmetic and order amount calculation
pub mod money;
pub mod order;
pub mod payment;
pub mod promotion;
pub mod refund;
