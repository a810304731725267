//! Refund request model and the refund eligibility policy.

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AppError;
use crate::models::order::{Order, OrderStatus};
use crate::models::payment::{Gateway, PaymentStatus, PaymentTransaction};

/// Lifecycle of a refund request.
///
/// `pending -> approved -> processing -> completed | failed`, or
/// `pending -> rejected`. Terminal: rejected, completed, failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "text", rename_all = "snake_case")]
pub enum RefundStatus {
    Pending,
    Approved,
    Rejected,
    Processing,
    Completed,
    Failed,
}

impl RefundStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RefundStatus::Rejected | RefundStatus::Completed | RefundStatus::Failed
        )
    }
}

/// Represents a refund request from the database.
///
/// # Database Table
///
/// Maps to `refund_requests`. Only full-amount refunds exist, and a partial
/// unique index allows one `pending|approved|processing` request per payment.
#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct RefundRequest {
    pub id: Uuid,
    pub payment_id: Uuid,
    pub order_id: Uuid,
    pub requested_by: Uuid,
    pub transaction_ref: String,
    pub amount: Decimal,
    pub reason: String,
    pub proof_images: serde_json::Value,
    pub status: RefundStatus,
    pub admin_note: Option<String>,
    pub approved_by: Option<Uuid>,
    pub approved_at: Option<DateTime<Utc>>,
    pub rejected_by: Option<Uuid>,
    pub rejected_at: Option<DateTime<Utc>>,
    pub rejection_reason: Option<String>,
    pub gateway_refund_id: Option<String>,
    #[serde(skip)]
    pub gateway_response: Option<serde_json::Value>,
    pub error_message: Option<String>,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Customer request body for `POST /payments/{id}/refund`.
#[derive(Debug, Deserialize)]
pub struct CreateRefundRequest {
    pub reason: String,
    #[serde(default)]
    pub proof_images: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct ApproveRefundRequest {
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RejectRefundRequest {
    pub reason: String,
}

/// Reference for a refund sent to the gateway: `RF` + `YYYYMMDDHHMMSS`.
pub fn refund_transaction_ref(now: DateTime<Utc>) -> String {
    format!("RF{}", now.format("%Y%m%d%H%M%S"))
}

/// Decides whether a customer may request a refund for `payment`.
///
/// The payment must have gone through a real gateway, succeeded and not be
/// refunded yet. The order must be cancelled, returned or delivered; a
/// delivered order is only refundable within `window_days` of delivery.
pub fn check_refund_eligibility(
    order: &Order,
    payment: &PaymentTransaction,
    now: DateTime<Utc>,
    window_days: i64,
) -> Result<(), AppError> {
    if payment.gateway == Gateway::Cod {
        return Err(AppError::CodNoRefund);
    }
    if payment.status != PaymentStatus::Success {
        return Err(AppError::PaymentNotSuccessful);
    }
    if payment.is_fully_refunded() {
        return Err(AppError::RefundNotAllowed(
            "payment is already fully refunded".into(),
        ));
    }

    match order.status {
        OrderStatus::Cancelled | OrderStatus::Returned => Ok(()),
        OrderStatus::Delivered => {
            let delivered_at = order.delivered_at.unwrap_or(order.updated_at);
            if now > delivered_at + Duration::days(window_days) {
                Err(AppError::RefundWindowExpired)
            } else {
                Ok(())
            }
        }
        _ => Err(AppError::OrderCannotRefund),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::order::{OrderPaymentStatus, PaymentMethod};
    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    fn delivered_order(delivered_at: DateTime<Utc>) -> Order {
        Order {
            id: Uuid::new_v4(),
            order_number: "ORD-20250301-001".into(),
            user_id: Uuid::new_v4(),
            address_id: Uuid::new_v4(),
            promotion_id: None,
            warehouse_id: Some(Uuid::new_v4()),
            currency: "VND".into(),
            subtotal: dec!(200),
            shipping_fee: dec!(15),
            cod_fee: Decimal::ZERO,
            discount_amount: Decimal::ZERO,
            tax_amount: Decimal::ZERO,
            total_amount: dec!(215),
            payment_method: PaymentMethod::Vnpay,
            payment_status: OrderPaymentStatus::Paid,
            status: OrderStatus::Delivered,
            tracking_number: Some("TRK1".into()),
            estimated_delivery_at: None,
            delivered_at: Some(delivered_at),
            paid_at: Some(delivered_at - Duration::days(3)),
            customer_note: None,
            admin_note: None,
            cancellation_reason: None,
            cancelled_at: None,
            version: 6,
            created_at: delivered_at - Duration::days(3),
            updated_at: delivered_at,
        }
    }

    fn successful_payment(order: &Order) -> PaymentTransaction {
        PaymentTransaction {
            id: Uuid::new_v4(),
            order_id: order.id,
            gateway: Gateway::Vnpay,
            amount: order.total_amount,
            currency: "VND".into(),
            status: PaymentStatus::Success,
            gateway_transaction_id: Some("14123456".into()),
            error_code: None,
            error_message: None,
            gateway_response: None,
            payment_details: None,
            gateway_signature: None,
            retry_count: 0,
            refunded_amount: Decimal::ZERO,
            requires_review: false,
            initiated_at: order.created_at,
            processing_at: None,
            completed_at: order.paid_at,
            failed_at: None,
            updated_at: order.created_at,
        }
    }

    #[test]
    fn refund_accepted_inside_window() {
        let delivered_at = Utc.with_ymd_and_hms(2025, 3, 1, 10, 0, 0).unwrap();
        let order = delivered_order(delivered_at);
        let payment = successful_payment(&order);
        let now = delivered_at + Duration::days(6);
        assert!(check_refund_eligibility(&order, &payment, now, 7).is_ok());
    }

    #[test]
    fn refund_rejected_after_window() {
        let delivered_at = Utc.with_ymd_and_hms(2025, 3, 1, 10, 0, 0).unwrap();
        let order = delivered_order(delivered_at);
        let payment = successful_payment(&order);
        let now = delivered_at + Duration::days(8);
        assert!(matches!(
            check_refund_eligibility(&order, &payment, now, 7),
            Err(AppError::RefundWindowExpired)
        ));
    }

    #[test]
    fn cod_is_never_refundable() {
        let order = delivered_order(Utc::now());
        let mut payment = successful_payment(&order);
        payment.gateway = Gateway::Cod;
        assert!(matches!(
            check_refund_eligibility(&order, &payment, Utc::now(), 7),
            Err(AppError::CodNoRefund)
        ));
    }

    #[test]
    fn shipping_order_cannot_be_refunded() {
        let mut order = delivered_order(Utc::now());
        order.status = OrderStatus::Shipping;
        let payment = successful_payment(&order);
        assert!(matches!(
            check_refund_eligibility(&order, &payment, Utc::now(), 7),
            Err(AppError::OrderCannotRefund)
        ));
    }

    #[test]
    fn failed_payment_cannot_be_refunded() {
        let order = delivered_order(Utc::now());
        let mut payment = successful_payment(&order);
        payment.status = PaymentStatus::Failed;
        assert!(matches!(
            check_refund_eligibility(&order, &payment, Utc::now(), 7),
            Err(AppError::PaymentNotSuccessful)
        ));
    }

    #[test]
    fn refund_ref_format() {
        let now = Utc.with_ymd_and_hms(2025, 3, 9, 14, 5, 7).unwrap();
        assert_eq!(refund_transaction_ref(now), "RF20250309140507");
    }
}
