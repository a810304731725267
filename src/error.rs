//! Error types and HTTP error response handling.
//!
//! This module defines all application errors and how they are converted
//! into HTTP responses with appropriate status codes and JSON bodies.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use uuid::Uuid;

/// Application-wide error type.
///
/// Every variant carries a stable machine-readable code (see [`AppError::code`])
/// and maps to one HTTP status (see [`AppError::status`]).
///
/// # Error Categories
///
/// - **Validation** (400/422): malformed input, unknown gateway, bad status value
/// - **Auth** (401/403): missing token, acting on someone else's resource
/// - **Not found** (404): order, payment or refund does not exist
/// - **Conflict** (409): stale version, duplicate payment/refund/webhook
/// - **Business** (422): stock, promotion, cancellation and refund rules
/// - **External** (400/502/504): payment gateway failures and bad signatures
/// - **Internal** (500): database and everything unclassified
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// Database operation failed (e.g., connection error, query error).
    ///
    /// This wraps any sqlx::Error using the `#[from]` attribute, which
    /// automatically implements `From<sqlx::Error> for AppError`.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Request body or parameters are invalid.
    ///
    /// The String contains details about what was invalid.
    #[error("Invalid request")]
    InvalidRequest(String),

    #[error("Unsupported payment gateway: {0}")]
    InvalidGateway(String),

    #[error("Invalid status: {0}")]
    InvalidStatus(String),

    /// Bearer token is missing, unknown or revoked.
    #[error("Authentication required")]
    Unauthorized,

    /// The caller is authenticated but does not own the resource,
    /// or lacks the admin role for an admin route.
    #[error("You do not have access to this resource")]
    NotOwner,

    #[error("Order not found")]
    OrderNotFound,

    #[error("Payment not found")]
    PaymentNotFound,

    #[error("Refund request not found")]
    RefundNotFound,

    /// Optimistic version check failed: somebody else changed the order first.
    #[error("Order was modified concurrently, reload and retry")]
    VersionMismatch,

    #[error("Order has already been paid")]
    OrderAlreadyPaid,

    #[error("An open refund request already exists for this payment")]
    RefundAlreadyExists,

    #[error("Webhook has already been processed")]
    WebhookAlreadyProcessed,

    #[error("Order cannot be cancelled: {0}")]
    OrderCannotCancel(String),

    /// Not enough stock for a book at the chosen warehouse.
    #[error("Insufficient stock for book {book_id}")]
    InsufficientStock { book_id: Uuid },

    #[error("Cart is empty")]
    CartEmpty,

    #[error("Invalid status transition from {from} to {to}")]
    InvalidTransition { from: String, to: String },

    #[error("Promotion code is not valid")]
    PromoInvalid,

    #[error("Promotion is not active")]
    PromoInactive,

    #[error("Promotion has expired or has not started yet")]
    PromoExpired,

    #[error("Promotion usage limit reached")]
    PromoUsageLimitReached,

    #[error("Order subtotal is below the promotion minimum of {min}")]
    PromoMinAmount { min: rust_decimal::Decimal },

    #[error("Maximum number of payment attempts reached")]
    RetryLimitExceeded,

    #[error("Order is not awaiting payment")]
    OrderNotPending,

    #[error("Refund not allowed: {0}")]
    RefundNotAllowed(String),

    #[error("Payment has not succeeded")]
    PaymentNotSuccessful,

    #[error("Order is not in a refundable state")]
    OrderCannotRefund,

    #[error("Refund window has expired")]
    RefundWindowExpired,

    #[error("Cash on delivery payments cannot be refunded")]
    CodNoRefund,

    #[error("Payment gateway unavailable: {0}")]
    GatewayUnavailable(String),

    #[error("Payment gateway timed out")]
    GatewayTimeout,

    #[error("Invalid webhook signature")]
    InvalidSignature,

    /// Anything else. The message is logged, never returned to clients.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Stable error code exposed to clients and written to webhook logs.
    pub fn code(&self) -> &'static str {
        match self {
            AppError::Database(_) | AppError::Internal(_) => "internal_error",
            AppError::InvalidRequest(_) => "invalid_request",
            AppError::InvalidGateway(_) => "invalid_gateway",
            AppError::InvalidStatus(_) => "invalid_status",
            AppError::Unauthorized => "unauthorized",
            AppError::NotOwner => "not_owner",
            AppError::OrderNotFound => "order_not_found",
            AppError::PaymentNotFound => "payment_not_found",
            AppError::RefundNotFound => "refund_not_found",
            AppError::VersionMismatch => "version_mismatch",
            AppError::OrderAlreadyPaid => "order_already_paid",
            AppError::RefundAlreadyExists => "refund_already_exists",
            AppError::WebhookAlreadyProcessed => "webhook_already_processed",
            AppError::OrderCannotCancel(_) => "order_cannot_cancel",
            AppError::InsufficientStock { .. } => "insufficient_stock",
            AppError::CartEmpty => "cart_empty",
            AppError::InvalidTransition { .. } => "invalid_transition",
            AppError::PromoInvalid => "promo_invalid",
            AppError::PromoInactive => "promo_inactive",
            AppError::PromoExpired => "promo_expired",
            AppError::PromoUsageLimitReached => "promo_usage_limit",
            AppError::PromoMinAmount { .. } => "promo_min_amount",
            AppError::RetryLimitExceeded => "retry_limit_exceeded",
            AppError::OrderNotPending => "order_not_pending",
            AppError::RefundNotAllowed(_) => "refund_not_allowed",
            AppError::PaymentNotSuccessful => "payment_not_successful",
            AppError::OrderCannotRefund => "order_cannot_refund",
            AppError::RefundWindowExpired => "refund_window_expired",
            AppError::CodNoRefund => "cod_no_refund",
            AppError::GatewayUnavailable(_) => "gateway_unavailable",
            AppError::GatewayTimeout => "gateway_timeout",
            AppError::InvalidSignature => "invalid_signature",
        }
    }

    /// HTTP status for this error.
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::InvalidRequest(_)
            | AppError::InvalidGateway(_)
            | AppError::InvalidStatus(_)
            | AppError::InvalidSignature => StatusCode::BAD_REQUEST,

            AppError::Unauthorized => StatusCode::UNAUTHORIZED,
            AppError::NotOwner => StatusCode::FORBIDDEN,

            AppError::OrderNotFound | AppError::PaymentNotFound | AppError::RefundNotFound => {
                StatusCode::NOT_FOUND
            }

            AppError::VersionMismatch
            | AppError::OrderAlreadyPaid
            | AppError::RefundAlreadyExists
            | AppError::WebhookAlreadyProcessed => StatusCode::CONFLICT,

            AppError::OrderCannotCancel(_)
            | AppError::InsufficientStock { .. }
            | AppError::CartEmpty
            | AppError::InvalidTransition { .. }
            | AppError::PromoInvalid
            | AppError::PromoInactive
            | AppError::PromoExpired
            | AppError::PromoUsageLimitReached
            | AppError::PromoMinAmount { .. }
            | AppError::RetryLimitExceeded
            | AppError::OrderNotPending
            | AppError::RefundNotAllowed(_)
            | AppError::PaymentNotSuccessful
            | AppError::OrderCannotRefund
            | AppError::RefundWindowExpired
            | AppError::CodNoRefund => StatusCode::UNPROCESSABLE_ENTITY,

            AppError::GatewayUnavailable(_) => StatusCode::BAD_GATEWAY,
            AppError::GatewayTimeout => StatusCode::GATEWAY_TIMEOUT,

            AppError::Database(_) | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Client-facing message. Internal causes are replaced by a generic text.
    fn public_message(&self) -> String {
        match self {
            AppError::Database(_) | AppError::Internal(_) => {
                "An internal error occurred".to_string()
            }
            AppError::InvalidRequest(msg) => msg.clone(),
            other => other.to_string(),
        }
    }
}

/// Convert AppError into an HTTP response.
///
/// # Response Format
///
/// All errors return JSON in this format:
/// ```json
/// {
///   "error": {
///     "code": "error_type",
///     "message": "Human-readable error message"
///   }
/// }
/// ```
impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();

        if status.is_server_error() {
            tracing::error!(code = self.code(), error = %self, "Request failed");
        }

        let body = Json(json!({
            "error": {
                "code": self.code(),
                "message": self.public_message()
            }
        }));

        (status, body).into_response()
    }
}

/// Returns true when a database error is a unique-constraint violation.
///
/// Used where a partial unique index is the serialization point
/// (one successful payment per order, one processed webhook per triple).
pub fn is_unique_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => db_err.is_unique_violation(),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conflict_errors_map_to_409() {
        assert_eq!(AppError::VersionMismatch.status(), StatusCode::CONFLICT);
        assert_eq!(AppError::OrderAlreadyPaid.status(), StatusCode::CONFLICT);
        assert_eq!(AppError::RefundAlreadyExists.status(), StatusCode::CONFLICT);
    }

    #[test]
    fn business_rule_errors_map_to_422() {
        let stock = AppError::InsufficientStock {
            book_id: Uuid::nil(),
        };
        assert_eq!(stock.status(), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(stock.code(), "insufficient_stock");
        assert_eq!(
            AppError::RefundWindowExpired.status(),
            StatusCode::UNPROCESSABLE_ENTITY
        );
    }

    #[test]
    fn gateway_errors_map_to_5xx() {
        assert_eq!(
            AppError::GatewayUnavailable("down".into()).status(),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(AppError::GatewayTimeout.status(), StatusCode::GATEWAY_TIMEOUT);
    }

    #[test]
    fn invalid_signature_is_bad_request() {
        assert_eq!(AppError::InvalidSignature.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn internal_details_are_hidden() {
        let err = AppError::Internal("connection string leaked".into());
        assert_eq!(err.public_message(), "An internal error occurred");
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
