//! Liveness check: database round trip plus the payment gateways this node serves.

use axum::{Json, extract::State};
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::{error::AppError, state::AppState};

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub database: &'static str,
    pub gateways: Vec<&'static str>,
    pub timestamp: DateTime<Utc>,
}

/// `GET /health`
///
/// ```json
/// {
///   "status": "healthy",
///   "version": "0.1.0",
///   "database": "connected",
///   "gateways": ["cod", "bank_transfer", "vnpay"],
///   "timestamp": "2025-03-01T08:00:00Z"
/// }
/// ```
///
/// An unreachable database surfaces as the usual 500 error body.
pub async fn health_check(State(state): State<AppState>) -> Result<Json<HealthResponse>, AppError> {
    sqlx::query("SELECT 1").execute(&state.pool).await?;

    let gateways = state
        .payments
        .gateways()
        .kinds()
        .into_iter()
        .map(|g| g.as_str())
        .collect();

    Ok(Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
        database: "connected",
        gateways,
        timestamp: Utc::now(),
    }))
}
