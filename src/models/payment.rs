//! Payment attempt and webhook log models.
//!
//! This module defines:
//! - `PaymentTransaction`: one attempt to pay an order through a gateway
//! - `WebhookLog`: every callback received from a gateway, valid or not
//! - `WebhookNotification`: a gateway callback decoded into gateway-neutral fields
//! - Request and response bodies for the payment endpoints

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AppError;
use crate::models::order::PaymentMethod;

/// Payment provider an attempt goes through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "text", rename_all = "snake_case")]
pub enum Gateway {
    Cod,
    Vnpay,
    Momo,
    BankTransfer,
    Mock,
}

impl Gateway {
    pub fn as_str(&self) -> &'static str {
        match self {
            Gateway::Cod => "cod",
            Gateway::Vnpay => "vnpay",
            Gateway::Momo => "momo",
            Gateway::BankTransfer => "bank_transfer",
            Gateway::Mock => "mock",
        }
    }

    /// Gateways that send the customer to a hosted payment page.
    pub fn is_redirect(&self) -> bool {
        matches!(self, Gateway::Vnpay | Gateway::Momo | Gateway::Mock)
    }

    /// Whether an order placed with `method` may be paid through this gateway.
    pub fn accepts(&self, method: PaymentMethod) -> bool {
        match self {
            Gateway::Cod => method == PaymentMethod::Cod,
            Gateway::Vnpay => method == PaymentMethod::Vnpay,
            Gateway::Momo => method == PaymentMethod::Momo,
            Gateway::BankTransfer => method == PaymentMethod::BankTransfer,
            Gateway::Mock => method != PaymentMethod::Cod,
        }
    }
}

impl std::fmt::Display for Gateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Gateway {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "cod" => Ok(Gateway::Cod),
            "vnpay" => Ok(Gateway::Vnpay),
            "momo" => Ok(Gateway::Momo),
            "bank_transfer" => Ok(Gateway::BankTransfer),
            "mock" => Ok(Gateway::Mock),
            other => Err(AppError::InvalidGateway(other.to_string())),
        }
    }
}

/// Lifecycle of a payment attempt.
///
/// `pending -> processing -> success | failed | cancelled`, and
/// `success -> refunded` once the full amount is returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "text", rename_all = "snake_case")]
pub enum PaymentStatus {
    Pending,
    Processing,
    Success,
    Failed,
    Refunded,
    Cancelled,
}

impl PaymentStatus {
    pub fn is_open(&self) -> bool {
        matches!(self, PaymentStatus::Pending | PaymentStatus::Processing)
    }
}

/// Represents a payment attempt from the database.
///
/// # Database Table
///
/// Maps to `payment_transactions`. The row id doubles as the transaction
/// reference sent to the gateway. At most one row per order is `success`
/// (partial unique index) and `refunded_amount <= amount`.
#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct PaymentTransaction {
    pub id: Uuid,
    pub order_id: Uuid,
    pub gateway: Gateway,
    pub amount: Decimal,
    pub currency: String,
    pub status: PaymentStatus,
    pub gateway_transaction_id: Option<String>,
    pub error_code: Option<String>,
    pub error_message: Option<String>,
    #[serde(skip)]
    pub gateway_response: Option<serde_json::Value>,
    #[serde(skip)]
    pub payment_details: Option<serde_json::Value>,
    #[serde(skip)]
    pub gateway_signature: Option<String>,
    pub retry_count: i32,
    pub refunded_amount: Decimal,
    pub requires_review: bool,
    pub initiated_at: DateTime<Utc>,
    pub processing_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub failed_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl PaymentTransaction {
    /// The reference presented to the gateway.
    pub fn transaction_ref(&self) -> String {
        self.id.simple().to_string()
    }

    pub fn is_fully_refunded(&self) -> bool {
        self.refunded_amount >= self.amount
    }
}

/// Parses a gateway transaction reference back into a payment id.
pub fn parse_transaction_ref(reference: &str) -> Option<Uuid> {
    Uuid::parse_str(reference).ok()
}

/// What a webhook is about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WebhookEvent {
    Payment,
    Refund,
}

impl WebhookEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            WebhookEvent::Payment => "payment",
            WebhookEvent::Refund => "refund",
        }
    }
}

/// Gateway-neutral view of a decoded webhook body.
#[derive(Debug, Clone)]
pub struct WebhookNotification {
    pub gateway: Gateway,
    pub event: WebhookEvent,
    /// Our reference: payment id for payments, refund ref for refunds.
    pub transaction_ref: String,
    /// The provider's own transaction id.
    pub gateway_transaction_id: String,
    /// Provider result code, verbatim.
    pub result_code: String,
    pub success: bool,
    pub message: Option<String>,
    pub amount: Option<Decimal>,
    pub signature: Option<String>,
    /// Full decoded body for storage; never read by business logic.
    pub raw: serde_json::Value,
}

impl WebhookNotification {
    /// Key for webhook deduplication, stored on the log row.
    ///
    /// Providers send a placeholder transaction id (empty, or `"0"` at VNPay
    /// and Momo) on failed or cancelled payments, shared by every attempt. Such
    /// callbacks are keyed by our own reference instead.
    pub fn idempotency_key(&self) -> String {
        let provider_id = self.gateway_transaction_id.trim();
        if provider_id.is_empty() || provider_id == "0" {
            format!("{}:{}", self.transaction_ref, self.result_code)
        } else {
            provider_id.to_string()
        }
    }
}

/// One received webhook.
///
/// # Database Table
///
/// Maps to `payment_webhook_logs`. Rows are never deleted. The partial
/// unique index on `(gateway, event, gateway_transaction_id) WHERE processed`
/// makes a second successful processing of the same callback impossible.
#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct WebhookLog {
    pub id: Uuid,
    pub gateway: String,
    pub event: String,
    pub payment_id: Option<Uuid>,
    pub order_id: Option<Uuid>,
    pub gateway_transaction_id: Option<String>,
    pub request_headers: Option<serde_json::Value>,
    pub request_body: String,
    pub signature: Option<String>,
    pub is_valid: Option<bool>,
    pub processed: bool,
    pub is_duplicate: bool,
    pub processing_error: Option<String>,
    pub retry_count: i32,
    pub received_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
}

/// Request to start paying an order.
///
/// # JSON Example
///
/// ```json
/// {
///   "order_id": "550e8400-e29b-41d4-a716-446655440000",
///   "gateway": "vnpay"
/// }
/// ```
#[derive(Debug, Deserialize)]
pub struct CreatePaymentRequest {
    pub order_id: Uuid,
    pub gateway: Gateway,
}

/// Response after a payment attempt has been created.
#[derive(Debug, Serialize)]
pub struct CreatePaymentResponse {
    pub payment_transaction_id: Uuid,
    pub amount: Decimal,
    pub currency: String,
    pub status: PaymentStatus,
    pub expires_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Public view of a payment attempt, used for polling.
#[derive(Debug, Serialize)]
pub struct PaymentResponse {
    pub id: Uuid,
    pub order_id: Uuid,
    pub gateway: Gateway,
    pub amount: Decimal,
    pub currency: String,
    pub status: PaymentStatus,
    pub gateway_transaction_id: Option<String>,
    pub error_code: Option<String>,
    pub error_message: Option<String>,
    pub refunded_amount: Decimal,
    pub initiated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl From<PaymentTransaction> for PaymentResponse {
    fn from(payment: PaymentTransaction) -> Self {
        Self {
            id: payment.id,
            order_id: payment.order_id,
            gateway: payment.gateway,
            amount: payment.amount,
            currency: payment.currency,
            status: payment.status,
            gateway_transaction_id: payment.gateway_transaction_id,
            error_code: payment.error_code,
            error_message: payment.error_message,
            refunded_amount: payment.refunded_amount,
            initiated_at: payment.initiated_at,
            completed_at: payment.completed_at,
        }
    }
}

/// Outcome an admin may force on a payment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReconcileStatus {
    Success,
    Failed,
}

/// Admin request to settle a payment by hand.
#[derive(Debug, Deserialize)]
pub struct ReconcileRequest {
    pub status: ReconcileStatus,
    pub gateway_transaction_id: Option<String>,
    pub notes: Option<String>,
}

/// Filters for the admin payment list.
#[derive(Debug, Deserialize)]
pub struct ListPaymentsQuery {
    #[serde(default = "default_page")]
    pub page: i64,
    #[serde(default = "default_limit")]
    pub limit: i64,
    pub status: Option<PaymentStatus>,
    pub gateway: Option<Gateway>,
}

fn default_page() -> i64 {
    1
}

fn default_limit() -> i64 {
    20
}

impl ListPaymentsQuery {
    pub fn validate(&self) -> Result<(), AppError> {
        if self.page < 1 || !(1..=100).contains(&self.limit) {
            return Err(AppError::InvalidRequest(
                "page must be >= 1 and limit between 1 and 100".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transaction_ref_round_trips_to_payment_id() {
        let id = Uuid::new_v4();
        let reference = id.simple().to_string();
        assert_eq!(reference.len(), 32);
        assert_eq!(parse_transaction_ref(&reference), Some(id));
    }

    #[test]
    fn gateway_must_match_order_method() {
        assert!(Gateway::Vnpay.accepts(PaymentMethod::Vnpay));
        assert!(!Gateway::Vnpay.accepts(PaymentMethod::Momo));
        assert!(Gateway::Cod.accepts(PaymentMethod::Cod));
        assert!(!Gateway::Mock.accepts(PaymentMethod::Cod));
    }

    fn notification(reference: &str, provider_id: &str, code: &str) -> WebhookNotification {
        WebhookNotification {
            gateway: Gateway::Vnpay,
            event: WebhookEvent::Payment,
            transaction_ref: reference.into(),
            gateway_transaction_id: provider_id.into(),
            result_code: code.into(),
            success: code == "00",
            message: None,
            amount: None,
            signature: None,
            raw: serde_json::Value::Null,
        }
    }

    #[test]
    fn provider_id_keys_real_transactions() {
        assert_eq!(notification("ref-1", "14226112", "00").idempotency_key(), "14226112");
    }

    #[test]
    fn placeholder_provider_ids_fall_back_to_our_reference() {
        let first = notification("ref-1", "0", "24").idempotency_key();
        let second = notification("ref-2", "0", "24").idempotency_key();
        assert_eq!(first, "ref-1:24");
        assert_ne!(first, second);
        assert_eq!(notification("ref-3", "", "99").idempotency_key(), "ref-3:99");
    }

    #[test]
    fn unknown_gateway_is_rejected() {
        let err = "paypal".parse::<Gateway>().unwrap_err();
        assert_eq!(err.code(), "invalid_gateway");
    }
}
