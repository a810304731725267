//! Order data models, the order status graph and API request/response types.
//!
//! This module defines:
//! - `Order`, `OrderItem`, `OrderStatusHistory`: database entities
//! - `OrderStatus`, `PaymentMethod`, `OrderPaymentStatus`: text-backed enums
//! - Request and response bodies for the order endpoints

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AppError;

/// Fulfilment status of an order.
///
/// ```text
/// pending    -> confirmed | cancelled
/// confirmed  -> processing | cancelled
/// processing -> shipping | cancelled
/// shipping   -> delivered | returned
/// delivered  -> returned
/// ```
/// `cancelled` and `returned` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "text", rename_all = "snake_case")]
pub enum OrderStatus {
    Pending,
    Confirmed,
    Processing,
    Shipping,
    Delivered,
    Cancelled,
    Returned,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Confirmed => "confirmed",
            OrderStatus::Processing => "processing",
            OrderStatus::Shipping => "shipping",
            OrderStatus::Delivered => "delivered",
            OrderStatus::Cancelled => "cancelled",
            OrderStatus::Returned => "returned",
        }
    }

    pub fn all() -> [OrderStatus; 7] {
        [
            OrderStatus::Pending,
            OrderStatus::Confirmed,
            OrderStatus::Processing,
            OrderStatus::Shipping,
            OrderStatus::Delivered,
            OrderStatus::Cancelled,
            OrderStatus::Returned,
        ]
    }

    /// Whether the admin transition graph has an edge `self -> next`.
    pub fn can_transition_to(&self, next: OrderStatus) -> bool {
        use OrderStatus::*;
        matches!(
            (self, next),
            (Pending, Confirmed)
                | (Pending, Cancelled)
                | (Confirmed, Processing)
                | (Confirmed, Cancelled)
                | (Processing, Shipping)
                | (Processing, Cancelled)
                | (Shipping, Delivered)
                | (Shipping, Returned)
                | (Delivered, Returned)
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderStatus::Cancelled | OrderStatus::Returned)
    }

    /// Statuses a customer may cancel from.
    pub fn is_user_cancellable(&self) -> bool {
        matches!(self, OrderStatus::Pending | OrderStatus::Confirmed)
    }

    /// Validates an admin transition, returning `InvalidTransition` when the edge is missing.
    pub fn ensure_transition(&self, next: OrderStatus) -> Result<(), AppError> {
        if self.can_transition_to(next) {
            Ok(())
        } else {
            Err(AppError::InvalidTransition {
                from: self.as_str().to_string(),
                to: next.as_str().to_string(),
            })
        }
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for OrderStatus {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        OrderStatus::all()
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| AppError::InvalidStatus(s.to_string()))
    }
}

/// How the customer pays for an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "text", rename_all = "snake_case")]
pub enum PaymentMethod {
    Cod,
    Vnpay,
    Momo,
    BankTransfer,
}

impl PaymentMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMethod::Cod => "cod",
            PaymentMethod::Vnpay => "vnpay",
            PaymentMethod::Momo => "momo",
            PaymentMethod::BankTransfer => "bank_transfer",
        }
    }

    pub fn is_cod(&self) -> bool {
        matches!(self, PaymentMethod::Cod)
    }

    /// COD orders start confirmed; everything else waits for payment.
    pub fn initial_status(&self) -> OrderStatus {
        if self.is_cod() {
            OrderStatus::Confirmed
        } else {
            OrderStatus::Pending
        }
    }
}

/// Payment state as seen from the order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "text", rename_all = "snake_case")]
pub enum OrderPaymentStatus {
    Pending,
    Paid,
    Failed,
    Refunded,
}

/// Represents an order record from the database.
///
/// # Database Table
///
/// Maps to the `orders` table. Amount columns are `NUMERIC(14,2)` and
/// `total_amount = max(0, subtotal - discount + shipping + cod_fee + tax)`.
/// `version` increases by one on every successful mutation.
#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct Order {
    pub id: Uuid,
    pub order_number: String,
    pub user_id: Uuid,
    pub address_id: Uuid,
    pub promotion_id: Option<Uuid>,
    pub warehouse_id: Option<Uuid>,
    pub currency: String,
    pub subtotal: Decimal,
    pub shipping_fee: Decimal,
    pub cod_fee: Decimal,
    pub discount_amount: Decimal,
    pub tax_amount: Decimal,
    pub total_amount: Decimal,
    pub payment_method: PaymentMethod,
    pub payment_status: OrderPaymentStatus,
    pub status: OrderStatus,
    pub tracking_number: Option<String>,
    pub estimated_delivery_at: Option<DateTime<Utc>>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub paid_at: Option<DateTime<Utc>>,
    pub customer_note: Option<String>,
    pub admin_note: Option<String>,
    pub cancellation_reason: Option<String>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub version: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Line item with a snapshot of the book taken at checkout.
#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct OrderItem {
    pub id: Uuid,
    pub order_id: Uuid,
    pub book_id: Uuid,
    pub book_title: String,
    pub book_slug: String,
    pub book_cover_url: Option<String>,
    pub author_name: Option<String>,
    pub price: Decimal,
    pub quantity: i32,
    pub subtotal: Decimal,
    pub created_at: DateTime<Utc>,
}

/// Append-only record of a status change. `changed_by = None` means the system.
#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct OrderStatusHistory {
    pub id: Uuid,
    pub order_id: Uuid,
    pub from_status: Option<OrderStatus>,
    pub to_status: OrderStatus,
    pub changed_by: Option<Uuid>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Values for a new order row. The order number is assigned on insert.
#[derive(Debug, Clone)]
pub struct NewOrder {
    pub user_id: Uuid,
    pub address_id: Uuid,
    pub promotion_id: Option<Uuid>,
    pub warehouse_id: Uuid,
    pub currency: String,
    pub amounts: crate::models::money::OrderAmounts,
    pub payment_method: PaymentMethod,
    pub status: OrderStatus,
    pub customer_note: Option<String>,
}

/// Values for a new order item.
#[derive(Debug, Clone)]
pub struct NewOrderItem {
    pub book_id: Uuid,
    pub book_title: String,
    pub book_slug: String,
    pub book_cover_url: Option<String>,
    pub author_name: Option<String>,
    pub price: Decimal,
    pub quantity: i32,
}

impl NewOrderItem {
    pub fn subtotal(&self) -> Decimal {
        self.price * Decimal::from(self.quantity)
    }
}

/// Optional fields written together with an admin status change.
#[derive(Debug, Clone, Default)]
pub struct StatusUpdateFields {
    pub tracking_number: Option<String>,
    pub admin_note: Option<String>,
    pub delivered_at: Option<DateTime<Utc>>,
}

/// Request to create an order from the caller's cart.
///
/// # JSON Example
///
/// ```json
/// {
///   "address_id": "550e8400-e29b-41d4-a716-446655440000",
///   "payment_method": "vnpay",
///   "promo_code": "WELCOME10",
///   "customer_note": "Leave at the front desk"
/// }
/// ```
#[derive(Debug, Deserialize)]
pub struct CreateOrderRequest {
    pub address_id: Option<Uuid>,
    pub payment_method: PaymentMethod,
    pub promo_code: Option<String>,
    pub customer_note: Option<String>,
}

/// Response returned after checkout.
#[derive(Debug, Serialize)]
pub struct CreateOrderResponse {
    pub order_id: Uuid,
    pub order_number: String,
    pub total: Decimal,
    pub status: OrderStatus,
}

#[derive(Debug, Deserialize)]
pub struct CancelOrderRequest {
    pub cancellation_reason: String,
    pub version: i32,
}

#[derive(Debug, Deserialize)]
pub struct ReorderRequest {
    pub order_id: Uuid,
    pub address_id: Option<Uuid>,
}

/// Admin request to move an order along the status graph.
#[derive(Debug, Deserialize)]
pub struct UpdateOrderStatusRequest {
    pub status: OrderStatus,
    pub version: i32,
    pub tracking_number: Option<String>,
    pub admin_note: Option<String>,
}

/// Query string for paginated order lists.
#[derive(Debug, Deserialize)]
pub struct ListOrdersQuery {
    #[serde(default = "default_page")]
    pub page: i64,
    #[serde(default = "default_limit")]
    pub limit: i64,
    pub status: Option<OrderStatus>,
}

fn default_page() -> i64 {
    1
}

fn default_limit() -> i64 {
    20
}

impl ListOrdersQuery {
    /// Rejects page < 1 and limits outside 1..=100.
    pub fn validate(&self) -> Result<(), AppError> {
        if self.page < 1 {
            return Err(AppError::InvalidRequest("page must be at least 1".into()));
        }
        if !(1..=100).contains(&self.limit) {
            return Err(AppError::InvalidRequest(
                "limit must be between 1 and 100".into(),
            ));
        }
        Ok(())
    }

    pub fn offset(&self) -> i64 {
        (self.page - 1) * self.limit
    }
}

/// One row of an order list.
#[derive(Debug, Serialize)]
pub struct OrderSummary {
    pub id: Uuid,
    pub order_number: String,
    pub status: OrderStatus,
    pub payment_method: PaymentMethod,
    pub payment_status: OrderPaymentStatus,
    pub total_amount: Decimal,
    pub item_count: i64,
    pub version: i32,
    pub created_at: DateTime<Utc>,
}

impl OrderSummary {
    pub fn from_order(order: Order, item_count: i64) -> Self {
        Self {
            id: order.id,
            order_number: order.order_number,
            status: order.status,
            payment_method: order.payment_method,
            payment_status: order.payment_status,
            total_amount: order.total_amount,
            item_count,
            version: order.version,
            created_at: order.created_at,
        }
    }
}

/// Full order with items and status history.
#[derive(Debug, Serialize)]
pub struct OrderDetail {
    #[serde(flatten)]
    pub order: Order,
    pub items: Vec<OrderItem>,
    pub history: Vec<OrderStatusHistory>,
}

/// Paginated list envelope.
#[derive(Debug, Serialize)]
pub struct Page<T> {
    pub data: Vec<T>,
    pub page: i64,
    pub limit: i64,
    pub total: i64,
}
