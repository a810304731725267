//! Gateway callback endpoints.
//!
//! Providers call these without authentication; the signature inside the
//! payload is the only trust anchor. VNPay sends its IPN as a GET with the
//! parameters in the query string; the others POST a body.

use axum::{
    Json,
    body::Bytes,
    extract::{Path, RawQuery, State},
    http::HeaderMap,
};
use serde_json::{Map, Value};

use crate::error::AppError;
use crate::models::payment::Gateway;
use crate::state::AppState;

const SKIPPED_HEADERS: [&str; 2] = ["authorization", "cookie"];

/// `POST /webhooks/{gateway}`
///
/// Responds 200 with the provider's acknowledgement body, also for
/// callbacks that were already processed. Invalid signatures get 400.
pub async fn receive(
    State(state): State<AppState>,
    Path(gateway): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<Value>, AppError> {
    let gateway: Gateway = gateway.parse()?;
    let ack = state
        .payments
        .process_webhook(gateway, headers_to_json(&headers), &body)
        .await?;
    Ok(Json(ack))
}

/// `GET /webhooks/{gateway}`: the raw query string is the payload.
pub async fn receive_query(
    State(state): State<AppState>,
    Path(gateway): Path<String>,
    headers: HeaderMap,
    RawQuery(query): RawQuery,
) -> Result<Json<Value>, AppError> {
    let gateway: Gateway = gateway.parse()?;
    let query = query.unwrap_or_default();
    let ack = state
        .payments
        .process_webhook(gateway, headers_to_json(&headers), query.as_bytes())
        .await?;
    Ok(Json(ack))
}

/// Headers worth keeping in the webhook log.
pub fn headers_to_json(headers: &HeaderMap) -> Value {
    let map: Map<String, Value> = headers
        .iter()
        .filter(|(name, _)| !SKIPPED_HEADERS.contains(&name.as_str()))
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|v| (name.as_str().to_string(), Value::String(v.to_string())))
        })
        .collect();
    Value::Object(map)
}
