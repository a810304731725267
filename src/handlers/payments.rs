//! Customer payment HTTP handlers.
//!
//! - POST /payments              - Start a payment attempt
//! - GET  /payments/{id}         - Poll a payment attempt
//! - POST /payments/{id}/refund  - Request a refund

use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use uuid::Uuid;

use super::ClientIp;
use crate::error::AppError;
use crate::middleware::auth::AuthContext;
use crate::models::payment::{CreatePaymentRequest, CreatePaymentResponse, PaymentResponse};
use crate::models::refund::CreateRefundRequest;
use crate::state::AppState;

/// Start paying an order.
///
/// # Request Body
///
/// ```json
/// { "order_id": "550e8400-e29b-41d4-a716-446655440000", "gateway": "vnpay" }
/// ```
///
/// # Response
///
/// ```json
/// {
///   "payment_transaction_id": "7c9e6679-7425-40de-944b-e07fc1f90ae7",
///   "amount": "230.00",
///   "currency": "VND",
///   "status": "processing",
///   "expires_at": "2025-03-01T10:15:00Z",
///   "payment_url": "https://sandbox.vnpayment.vn/paymentv2/vpcpay.html?..."
/// }
/// ```
///
/// COD and bank transfer attempts have no `payment_url` and carry a `message`.
pub async fn create_payment(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    ClientIp(client_ip): ClientIp,
    Json(request): Json<CreatePaymentRequest>,
) -> Result<Json<CreatePaymentResponse>, AppError> {
    Ok(Json(
        state
            .payments
            .create_payment(auth.user_id, request, &client_ip)
            .await?,
    ))
}

pub async fn get_payment(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(payment_id): Path<Uuid>,
) -> Result<Json<PaymentResponse>, AppError> {
    Ok(Json(state.payments.get_payment(auth.user_id, payment_id).await?))
}

/// Ask for the full amount of a successful payment back. Returns 201 with
/// the pending refund request.
pub async fn request_refund(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(payment_id): Path<Uuid>,
    Json(request): Json<CreateRefundRequest>,
) -> Result<impl IntoResponse, AppError> {
    let refund = state
        .refunds
        .request_refund(auth.user_id, payment_id, request)
        .await?;
    Ok((StatusCode::CREATED, Json(refund)))
}
