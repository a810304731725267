//! Customer order HTTP handlers.
//!
//! - POST  /orders                  - Create an order from the cart
//! - POST  /orders/reorder          - Create an order from a past order's items
//! - GET   /orders                  - List the caller's orders
//! - GET   /orders/{id}             - Order detail
//! - GET   /orders/number/{number}  - Order detail by order number
//! - PATCH /orders/{id}/cancel      - Cancel a pending or confirmed order

use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use uuid::Uuid;

use crate::error::AppError;
use crate::middleware::auth::AuthContext;
use crate::models::order::{
    CancelOrderRequest, CreateOrderRequest, ListOrdersQuery, Order, OrderDetail, OrderSummary,
    Page, ReorderRequest,
};
use crate::state::AppState;

/// Create an order from the caller's cart.
///
/// # Request Body
///
/// ```json
/// {
///   "address_id": "550e8400-e29b-41d4-a716-446655440000",
///   "payment_method": "vnpay",
///   "promo_code": "SPRING10",
///   "customer_note": "Leave at the door"
/// }
/// ```
///
/// # Response
///
/// - **201 Created**: `{order_id, order_number, total, status}`
/// - **422**: empty cart, insufficient stock, promotion rejected
pub async fn create_order(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Json(request): Json<CreateOrderRequest>,
) -> Result<impl IntoResponse, AppError> {
    let created = state.orders.create_order(auth.user_id, request).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

/// Re-buy the items of one of the caller's past orders.
pub async fn reorder(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Json(request): Json<ReorderRequest>,
) -> Result<impl IntoResponse, AppError> {
    let created = state.orders.reorder(auth.user_id, request).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

pub async fn list_orders(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Query(query): Query<ListOrdersQuery>,
) -> Result<Json<Page<OrderSummary>>, AppError> {
    Ok(Json(state.orders.list_orders(auth.user_id, query).await?))
}

pub async fn get_order(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(order_id): Path<Uuid>,
) -> Result<Json<OrderDetail>, AppError> {
    Ok(Json(state.orders.get_order(auth.user_id, order_id).await?))
}

pub async fn get_order_by_number(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(order_number): Path<String>,
) -> Result<Json<OrderDetail>, AppError> {
    Ok(Json(
        state
            .orders
            .get_order_by_number(auth.user_id, &order_number)
            .await?,
    ))
}

/// Cancel an order.
///
/// # Request Body
///
/// ```json
/// { "cancellation_reason": "Ordered twice", "version": 1 }
/// ```
///
/// `version` must be the version the client last read; a stale version
/// returns 409 and the client should reload.
pub async fn cancel_order(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(order_id): Path<Uuid>,
    Json(request): Json<CancelOrderRequest>,
) -> Result<Json<Order>, AppError> {
    Ok(Json(
        state
            .orders
            .cancel_order(auth.user_id, order_id, request)
            .await?,
    ))
}
