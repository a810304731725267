//! Payment gateway port and its adapters.
//!
//! Each provider implements [`PaymentGateway`]. Provider rules such as
//! minor-unit scaling, parameter ordering and signature formats stay inside the
//! adapter; services only see [`WebhookNotification`] and [`RefundOutcome`].

pub mod cod;
pub mod mock;
pub mod momo;
pub mod signing;
pub mod vnpay;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use crate::config::Config;
use crate::error::AppError;
use crate::models::payment::{Gateway, WebhookNotification};

/// Everything an adapter needs to build a hosted payment page URL.
#[derive(Debug, Clone)]
pub struct PaymentUrlRequest<'a> {
    pub transaction_ref: &'a str,
    pub amount: Decimal,
    pub order_info: &'a str,
    /// Overrides the configured return URL when set.
    pub return_url: Option<&'a str>,
    pub client_ip: &'a str,
}

/// A full refund of a captured payment.
#[derive(Debug, Clone)]
pub struct RefundCommand<'a> {
    /// Reference of the original payment (the payment attempt id).
    pub transaction_ref: &'a str,
    /// Our `RF...` reference for this refund.
    pub refund_ref: &'a str,
    pub original_txn_id: &'a str,
    pub original_date: DateTime<Utc>,
    pub original_amount: Decimal,
    pub refund_amount: Decimal,
    pub reason: &'a str,
    pub requested_by: &'a str,
}

/// What the provider answered to a refund request.
#[derive(Debug, Clone)]
pub struct RefundOutcome {
    pub refund_id: String,
    pub code: String,
    pub message: String,
    pub success: bool,
    pub raw: serde_json::Value,
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    fn kind(&self) -> Gateway;

    /// Build the URL the customer is redirected to.
    async fn create_payment_url(&self, request: &PaymentUrlRequest<'_>) -> Result<String, AppError>;

    /// Check the provider signature on a raw callback body.
    fn verify_signature(&self, body: &[u8]) -> bool;

    /// Decode a callback whose signature has already been verified.
    fn decode_webhook(&self, body: &[u8]) -> Result<WebhookNotification, AppError>;

    async fn initiate_refund(&self, command: &RefundCommand<'_>) -> Result<RefundOutcome, AppError>;

    /// Translate a provider result code into an internal error code.
    fn map_error_code(&self, code: &str) -> &'static str;

    /// Body returned to the provider once a callback is accepted.
    fn acknowledgement(&self) -> serde_json::Value {
        serde_json::json!({ "status": "ok" })
    }
}

/// Adapters by gateway kind.
#[derive(Clone, Default)]
pub struct GatewayRegistry {
    gateways: HashMap<Gateway, Arc<dyn PaymentGateway>>,
}

impl GatewayRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// COD is always available; VNPay and Momo only when configured.
    pub fn from_config(config: &Config) -> Result<Self, AppError> {
        let client = http_client(Duration::from_secs(config.gateway_timeout_secs))?;
        let mut registry = Self::new().register(Arc::new(cod::CodGateway));

        if let Some(vnpay) = &config.vnpay {
            registry = registry.register(Arc::new(vnpay::VnpayGateway::new(
                vnpay.clone(),
                client.clone(),
            )));
        }
        if let Some(momo) = &config.momo {
            registry = registry.register(Arc::new(momo::MomoGateway::new(momo.clone(), client)));
        }

        Ok(registry)
    }

    pub fn register(mut self, gateway: Arc<dyn PaymentGateway>) -> Self {
        self.gateways.insert(gateway.kind(), gateway);
        self
    }

    pub fn get(&self, gateway: Gateway) -> Result<Arc<dyn PaymentGateway>, AppError> {
        self.gateways
            .get(&gateway)
            .cloned()
            .ok_or_else(|| AppError::InvalidGateway(format!("{gateway} is not configured")))
    }

    pub fn kinds(&self) -> Vec<Gateway> {
        self.gateways.keys().copied().collect()
    }
}

/// HTTP client shared by adapters, with the per-request gateway timeout.
pub fn http_client(timeout: Duration) -> Result<reqwest::Client, AppError> {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| AppError::Internal(format!("HTTP client error: {e}")))
}

/// Map a transport failure to the gateway error kinds.
pub(crate) fn transport_error(gateway: Gateway, e: reqwest::Error) -> AppError {
    if e.is_timeout() {
        tracing::warn!(%gateway, error = %e, "Gateway request timed out");
        AppError::GatewayTimeout
    } else {
        tracing::warn!(%gateway, error = %e, "Gateway request failed");
        AppError::GatewayUnavailable(format!("{gateway} request failed"))
    }
}

/// POST a JSON body and decode the JSON answer.
pub(crate) async fn post_json(
    client: &reqwest::Client,
    gateway: Gateway,
    url: &str,
    body: &serde_json::Value,
) -> Result<serde_json::Value, AppError> {
    let response = client
        .post(url)
        .json(body)
        .send()
        .await
        .map_err(|e| transport_error(gateway, e))?;

    let status = response.status();
    if !status.is_success() {
        tracing::warn!(%gateway, status = status.as_u16(), "Gateway returned an error status");
        return Err(AppError::GatewayUnavailable(format!(
            "{gateway} returned HTTP {}",
            status.as_u16()
        )));
    }

    response
        .json::<serde_json::Value>()
        .await
        .map_err(|e| transport_error(gateway, e))
}

/// Convert an amount to a whole number of minor units (`scale` = 100 for cents).
pub(crate) fn to_minor_units(amount: Decimal, scale: i64) -> Result<i64, AppError> {
    use rust_decimal::RoundingStrategy;
    use rust_decimal::prelude::ToPrimitive;

    (amount * Decimal::from(scale))
        .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
        .to_i64()
        .ok_or_else(|| AppError::InvalidRequest("amount out of range".into()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn registry_rejects_unconfigured_gateway() {
        let registry = GatewayRegistry::new().register(Arc::new(cod::CodGateway));
        assert!(registry.get(Gateway::Cod).is_ok());
        let err = registry.get(Gateway::Vnpay).err().unwrap();
        assert_eq!(err.code(), "invalid_gateway");
    }

    #[test]
    fn minor_units_round_half_away() {
        assert_eq!(to_minor_units(dec!(230), 100).unwrap(), 23000);
        assert_eq!(to_minor_units(dec!(12.345), 100).unwrap(), 1235);
        assert_eq!(to_minor_units(dec!(230), 1).unwrap(), 230);
    }
}
