//! Deterministic in-process gateway for tests and local development.
//!
//! Callbacks are JSON signed with HMAC-SHA256 over
//! `event|transaction_ref|gateway_transaction_id|result_code|amount`.
//! Refund requests are recorded, and failures can be switched on.

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use super::signing::{hmac_sha256_hex, verify_sha256_hex};
use super::{PaymentGateway, PaymentUrlRequest, RefundCommand, RefundOutcome};
use crate::error::AppError;
use crate::models::payment::{Gateway, WebhookEvent, WebhookNotification};

pub const MOCK_SUCCESS_CODE: &str = "00";

#[derive(Debug, Serialize, Deserialize)]
struct MockCallback {
    event: WebhookEvent,
    transaction_ref: String,
    gateway_transaction_id: String,
    result_code: String,
    amount: String,
    signature: String,
}

impl MockCallback {
    fn signature_data(&self) -> String {
        format!(
            "{}|{}|{}|{}|{}",
            self.event.as_str(),
            self.transaction_ref,
            self.gateway_transaction_id,
            self.result_code,
            self.amount
        )
    }
}

pub struct MockGateway {
    secret: String,
    unavailable: AtomicBool,
    failing_refunds: AtomicBool,
    refunds: Mutex<Vec<String>>,
}

impl MockGateway {
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
            unavailable: AtomicBool::new(false),
            failing_refunds: AtomicBool::new(false),
            refunds: Mutex::new(Vec::new()),
        }
    }

    /// Make `create_payment_url` and `initiate_refund` fail with `GatewayUnavailable`.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Make refunds come back declined.
    pub fn set_failing_refunds(&self, failing: bool) {
        self.failing_refunds.store(failing, Ordering::SeqCst);
    }

    /// Refund references received so far.
    pub fn refunds(&self) -> Vec<String> {
        self.refunds.lock().map(|r| r.clone()).unwrap_or_default()
    }

    /// Build a signed callback body.
    pub fn sign_webhook(
        &self,
        event: WebhookEvent,
        transaction_ref: &str,
        gateway_transaction_id: &str,
        result_code: &str,
        amount: Decimal,
    ) -> Result<Vec<u8>, AppError> {
        let mut callback = MockCallback {
            event,
            transaction_ref: transaction_ref.to_string(),
            gateway_transaction_id: gateway_transaction_id.to_string(),
            result_code: result_code.to_string(),
            amount: amount.to_string(),
            signature: String::new(),
        };
        callback.signature = hmac_sha256_hex(&self.secret, &callback.signature_data())?;

        serde_json::to_vec(&callback).map_err(|e| AppError::Internal(e.to_string()))
    }

    fn ensure_available(&self) -> Result<(), AppError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(AppError::GatewayUnavailable("mock gateway is down".into()));
        }
        Ok(())
    }
}

fn parse(body: &[u8]) -> Result<MockCallback, AppError> {
    serde_json::from_slice(body)
        .map_err(|e| AppError::InvalidRequest(format!("Malformed mock callback: {e}")))
}

#[async_trait]
impl PaymentGateway for MockGateway {
    fn kind(&self) -> Gateway {
        Gateway::Mock
    }

    async fn create_payment_url(&self, request: &PaymentUrlRequest<'_>) -> Result<String, AppError> {
        self.ensure_available()?;
        Ok(format!(
            "https://mock-gateway.test/pay?ref={}&amount={}",
            request.transaction_ref, request.amount
        ))
    }

    fn verify_signature(&self, body: &[u8]) -> bool {
        match parse(body) {
            Ok(callback) => {
                verify_sha256_hex(&self.secret, &callback.signature_data(), &callback.signature)
            }
            Err(_) => false,
        }
    }

    fn decode_webhook(&self, body: &[u8]) -> Result<WebhookNotification, AppError> {
        let callback = parse(body)?;
        let amount = callback
            .amount
            .parse::<Decimal>()
            .map_err(|e| AppError::InvalidRequest(format!("Invalid amount: {e}")))?;
        let raw = serde_json::to_value(&callback).map_err(|e| AppError::Internal(e.to_string()))?;

        Ok(WebhookNotification {
            gateway: Gateway::Mock,
            event: callback.event,
            success: callback.result_code == MOCK_SUCCESS_CODE,
            transaction_ref: callback.transaction_ref,
            gateway_transaction_id: callback.gateway_transaction_id,
            result_code: callback.result_code,
            message: None,
            amount: Some(amount),
            signature: Some(callback.signature),
            raw,
        })
    }

    async fn initiate_refund(&self, command: &RefundCommand<'_>) -> Result<RefundOutcome, AppError> {
        self.ensure_available()?;
        if let Ok(mut refunds) = self.refunds.lock() {
            refunds.push(command.refund_ref.to_string());
        }

        if self.failing_refunds.load(Ordering::SeqCst) {
            return Ok(RefundOutcome {
                refund_id: String::new(),
                code: "99".into(),
                message: "Refund declined".into(),
                success: false,
                raw: serde_json::json!({ "result_code": "99" }),
            });
        }

        let refund_id = format!("MOCK-{}", command.refund_ref);
        Ok(RefundOutcome {
            raw: serde_json::json!({ "result_code": "00", "refund_id": refund_id }),
            refund_id,
            code: MOCK_SUCCESS_CODE.into(),
            message: "Refund accepted".into(),
            success: true,
        })
    }

    fn map_error_code(&self, code: &str) -> &'static str {
        match code {
            "24" => "USER_CANCELLED",
            "51" => "INSUFFICIENT_FUNDS",
            _ => "UNKNOWN_ERROR",
        }
    }
}
