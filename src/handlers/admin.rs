//! Admin HTTP handlers. Every route here sits behind the admin guard.
//!
//! - GET   /admin/orders                    - List all orders
//! - GET   /admin/orders/{id}               - Order detail
//! - PATCH /admin/orders/{id}/status        - Move an order through its lifecycle
//! - GET   /admin/payments                  - List payment attempts
//! - GET   /admin/payments/{id}             - Payment attempt with error details
//! - PATCH /admin/payments/{id}/reconcile   - Settle a payment by hand
//! - GET   /admin/refunds/pending           - Refund review queue
//! - GET   /admin/refunds/{id}              - Refund request
//! - POST  /admin/refunds/{id}/approve      - Approve and send to the gateway
//! - POST  /admin/refunds/{id}/reject       - Reject

use axum::{
    Extension, Json,
    extract::{Path, Query, State},
};
use serde::Deserialize;
use uuid::Uuid;

use crate::error::AppError;
use crate::middleware::auth::AuthContext;
use crate::models::order::{
    ListOrdersQuery, Order, OrderDetail, OrderSummary, Page, UpdateOrderStatusRequest,
};
use crate::models::payment::{
    ListPaymentsQuery, PaymentResponse, PaymentTransaction, ReconcileRequest,
};
use crate::models::refund::{ApproveRefundRequest, RefundRequest, RejectRefundRequest};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct PageQuery {
    #[serde(default = "default_page")]
    pub page: i64,
    #[serde(default = "default_limit")]
    pub limit: i64,
}

fn default_page() -> i64 {
    1
}

fn default_limit() -> i64 {
    20
}

pub async fn list_orders(
    State(state): State<AppState>,
    Query(query): Query<ListOrdersQuery>,
) -> Result<Json<Page<OrderSummary>>, AppError> {
    Ok(Json(state.orders.admin_list_orders(query).await?))
}

pub async fn get_order(
    State(state): State<AppState>,
    Path(order_id): Path<Uuid>,
) -> Result<Json<OrderDetail>, AppError> {
    Ok(Json(state.orders.admin_get_order(order_id).await?))
}

/// Move an order to a new status.
///
/// # Request Body
///
/// ```json
/// {
///   "status": "shipping",
///   "version": 3,
///   "tracking_number": "VN123456789",
///   "admin_note": "Handed to courier"
/// }
/// ```
///
/// # Response
///
/// - **200 OK**: the updated order
/// - **409**: stale `version`
/// - **422**: transition not allowed from the current status
pub async fn update_order_status(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(order_id): Path<Uuid>,
    Json(request): Json<UpdateOrderStatusRequest>,
) -> Result<Json<Order>, AppError> {
    Ok(Json(
        state
            .orders
            .update_order_status(auth.user_id, order_id, request)
            .await?,
    ))
}

pub async fn list_payments(
    State(state): State<AppState>,
    Query(query): Query<ListPaymentsQuery>,
) -> Result<Json<Page<PaymentResponse>>, AppError> {
    Ok(Json(state.payments.admin_list_payments(query).await?))
}

pub async fn get_payment(
    State(state): State<AppState>,
    Path(payment_id): Path<Uuid>,
) -> Result<Json<PaymentTransaction>, AppError> {
    Ok(Json(state.payments.admin_get_payment(payment_id).await?))
}

/// Force a payment to `success` or `failed`.
///
/// ```json
/// { "status": "success", "gateway_transaction_id": "14123456", "notes": "Bank statement 03/01" }
/// ```
pub async fn reconcile_payment(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(payment_id): Path<Uuid>,
    Json(request): Json<ReconcileRequest>,
) -> Result<Json<PaymentResponse>, AppError> {
    Ok(Json(
        state
            .payments
            .admin_reconcile(auth.user_id, payment_id, request)
            .await?,
    ))
}

pub async fn list_pending_refunds(
    State(state): State<AppState>,
    Query(query): Query<PageQuery>,
) -> Result<Json<Vec<RefundRequest>>, AppError> {
    Ok(Json(
        state.refunds.list_pending(query.page, query.limit).await?,
    ))
}

pub async fn get_refund(
    State(state): State<AppState>,
    Path(refund_id): Path<Uuid>,
) -> Result<Json<RefundRequest>, AppError> {
    Ok(Json(state.refunds.get_refund(refund_id).await?))
}

pub async fn approve_refund(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(refund_id): Path<Uuid>,
    Json(request): Json<ApproveRefundRequest>,
) -> Result<Json<RefundRequest>, AppError> {
    Ok(Json(
        state
            .refunds
            .approve(auth.user_id, refund_id, request)
            .await?,
    ))
}

pub async fn reject_refund(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(refund_id): Path<Uuid>,
    Json(request): Json<RejectRefundRequest>,
) -> Result<Json<RefundRequest>, AppError> {
    Ok(Json(
        state
            .refunds
            .reject(auth.user_id, refund_id, request)
            .await?,
    ))
}
