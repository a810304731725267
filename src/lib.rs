//! Transactional core of an online bookstore.
//!
//! Checkout turns a cart into an order and reserves stock at one warehouse.
//! Orders move through a versioned state machine. Payments go out through
//! pluggable gateways and come back as signed, idempotently processed
//! webhooks. Refunds are requested by customers and approved by admins.
//!
//! # Architecture
//!
//! - **Web Framework**: Axum (async HTTP server)
//! - **Database**: PostgreSQL with sqlx (async queries)
//! - **Authentication**: bearer tokens stored as SHA-256 hashes
//! - **Background work**: in-process tokio job queue behind the `JobDispatcher` port

pub mod config;
pub mod db;
pub mod error;
pub mod gateways;
pub mod handlers;
pub mod jobs;
pub mod middleware;
pub mod models;
pub mod repositories;
pub mod routes;
pub mod services;
pub mod state;
