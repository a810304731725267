//! Refund service - customer refund requests and admin review.
//!
//! A refund is always for the full payment amount. Approval is committed
//! before the refund goes to the gateway; completion arrives later through
//! the webhook pipeline in [`crate::services::payment_service`].

use chrono::Utc;
use serde_json::json;
use std::sync::Arc;
use uuid::Uuid;

use crate::config::Config;
use crate::db::DbPool;
use crate::error::AppError;
use crate::gateways::{GatewayRegistry, RefundCommand};
use crate::models::refund::{
    ApproveRefundRequest, CreateRefundRequest, RefundRequest, RejectRefundRequest,
    check_refund_eligibility, refund_transaction_ref,
};
use crate::repositories::refunds::NewRefund;
use crate::repositories::{audit, orders, payments, refunds};

const MAX_REASON_LENGTH: usize = 1000;
const MAX_PROOF_IMAGES: usize = 10;

#[derive(Clone)]
pub struct RefundService {
    pool: DbPool,
    config: Arc<Config>,
    gateways: GatewayRegistry,
}

impl RefundService {
    pub fn new(pool: DbPool, config: Arc<Config>, gateways: GatewayRegistry) -> Self {
        Self {
            pool,
            config,
            gateways,
        }
    }

    /// Open a refund request for a payment the caller made.
    ///
    /// # Errors
    ///
    /// - `PaymentNotFound`, `OrderNotFound`, `NotOwner`
    /// - `CodNoRefund`, `PaymentNotSuccessful`, `RefundNotAllowed`
    /// - `OrderCannotRefund`, `RefundWindowExpired`
    /// - `RefundAlreadyExists`: another request is still open
    #[tracing::instrument(skip(self, request))]
    pub async fn request_refund(
        &self,
        user_id: Uuid,
        payment_id: Uuid,
        request: CreateRefundRequest,
    ) -> Result<RefundRequest, AppError> {
        let reason = request.reason.trim();
        if reason.is_empty() || reason.chars().count() > MAX_REASON_LENGTH {
            return Err(AppError::InvalidRequest(format!(
                "reason must be between 1 and {MAX_REASON_LENGTH} characters"
            )));
        }
        if request.proof_images.len() > MAX_PROOF_IMAGES {
            return Err(AppError::InvalidRequest(format!(
                "at most {MAX_PROOF_IMAGES} proof images are allowed"
            )));
        }

        let payment = payments::find_by_id(&self.pool, payment_id)
            .await?
            .ok_or(AppError::PaymentNotFound)?;
        let order = orders::find_by_id(&self.pool, payment.order_id)
            .await?
            .ok_or(AppError::OrderNotFound)?;
        if order.user_id != user_id {
            return Err(AppError::NotOwner);
        }

        let now = Utc::now();
        check_refund_eligibility(&order, &payment, now, self.config.refund_window_days)?;
        if refunds::has_open(&self.pool, payment.id).await? {
            return Err(AppError::RefundAlreadyExists);
        }

        let transaction_ref = refund_transaction_ref(now);
        let refund = refunds::insert(
            &self.pool,
            &NewRefund {
                payment_id: payment.id,
                order_id: order.id,
                requested_by: user_id,
                transaction_ref: &transaction_ref,
                amount: payment.amount,
                reason,
                proof_images: json!(request.proof_images),
            },
        )
        .await?;

        tracing::info!(refund_id = %refund.id, amount = %refund.amount, "Refund requested");
        Ok(refund)
    }

    /// Approve a pending request and send it to the gateway.
    ///
    /// # Process
    ///
    /// 1. Lock the request, mark it `approved`, write the audit entry, commit
    /// 2. Call the gateway's refund endpoint
    /// 3. Accepted: store the gateway refund id and move to `processing`;
    ///    declined or unreachable: move to `failed` with the gateway error
    ///
    /// Steps 2 and 3 run in a detached task, so a dropped request (client gone,
    /// request timeout) still records the gateway's answer. A request left in
    /// `approved` can never be approved a second time.
    #[tracing::instrument(skip(self, request))]
    pub async fn approve(
        &self,
        admin_id: Uuid,
        refund_id: Uuid,
        request: ApproveRefundRequest,
    ) -> Result<RefundRequest, AppError> {
        let mut tx = self.pool.begin().await?;

        refunds::lock(&mut tx, refund_id)
            .await?
            .ok_or(AppError::RefundNotFound)?;
        let refund = refunds::approve(&mut *tx, refund_id, admin_id, request.notes.as_deref()).await?;

        audit::record(
            &mut *tx,
            admin_id,
            "refund.approve",
            "refund_request",
            refund.id,
            json!({
                "payment_id": refund.payment_id,
                "amount": refund.amount,
                "notes": request.notes,
            }),
        )
        .await?;

        tx.commit().await?;
        tracing::info!(refund_id = %refund.id, "Refund approved");

        let service = self.clone();
        tokio::spawn(async move { service.send_to_gateway(refund, admin_id).await })
            .await
            .map_err(|e| AppError::Internal(format!("refund task failed: {e}")))?
    }

    /// Second half of [`approve`](Self::approve): the gateway call and its outcome.
    async fn send_to_gateway(
        &self,
        refund: RefundRequest,
        admin_id: Uuid,
    ) -> Result<RefundRequest, AppError> {
        let payment = payments::find_by_id(&self.pool, refund.payment_id)
            .await?
            .ok_or(AppError::PaymentNotFound)?;
        let gateway = self.gateways.get(payment.gateway)?;

        let transaction_ref = payment.transaction_ref();
        let admin = admin_id.to_string();
        let command = RefundCommand {
            transaction_ref: &transaction_ref,
            refund_ref: &refund.transaction_ref,
            original_txn_id: payment.gateway_transaction_id.as_deref().unwrap_or_default(),
            original_date: payment.completed_at.unwrap_or(payment.initiated_at),
            original_amount: payment.amount,
            refund_amount: refund.amount,
            reason: &refund.reason,
            requested_by: &admin,
        };

        let refund = match gateway.initiate_refund(&command).await {
            Ok(outcome) if outcome.success => {
                let gateway_refund_id = if outcome.refund_id.is_empty() {
                    refund.transaction_ref.clone()
                } else {
                    outcome.refund_id
                };
                refunds::mark_processing(&self.pool, refund.id, &gateway_refund_id, &outcome.raw)
                    .await?
            }
            Ok(outcome) => {
                let code = gateway.map_error_code(&outcome.code);
                tracing::warn!(refund_id = %refund.id, code, "Gateway declined refund");
                refunds::mark_failed(
                    &self.pool,
                    refund.id,
                    &format!("{code}: {}", outcome.message),
                    Some(&outcome.raw),
                )
                .await?
            }
            Err(e) => {
                tracing::warn!(refund_id = %refund.id, error = %e, "Refund request to gateway failed");
                refunds::mark_failed(&self.pool, refund.id, &e.to_string(), None).await?
            }
        };

        tracing::info!(refund_id = %refund.id, status = ?refund.status, "Refund sent to gateway");
        Ok(refund)
    }

    /// Reject a pending request.
    #[tracing::instrument(skip(self, request))]
    pub async fn reject(
        &self,
        admin_id: Uuid,
        refund_id: Uuid,
        request: RejectRefundRequest,
    ) -> Result<RefundRequest, AppError> {
        let reason = request.reason.trim();
        if reason.is_empty() {
            return Err(AppError::InvalidRequest("rejection reason is required".into()));
        }

        let mut tx = self.pool.begin().await?;

        refunds::lock(&mut tx, refund_id)
            .await?
            .ok_or(AppError::RefundNotFound)?;
        let refund = refunds::reject(&mut *tx, refund_id, admin_id, reason).await?;

        audit::record(
            &mut *tx,
            admin_id,
            "refund.reject",
            "refund_request",
            refund.id,
            json!({ "payment_id": refund.payment_id, "reason": reason }),
        )
        .await?;

        tx.commit().await?;

        tracing::info!(refund_id = %refund.id, "Refund rejected");
        Ok(refund)
    }

    pub async fn get_refund(&self, refund_id: Uuid) -> Result<RefundRequest, AppError> {
        refunds::find_by_id(&self.pool, refund_id)
            .await?
            .ok_or(AppError::RefundNotFound)
    }

    /// Pending requests, oldest first.
    pub async fn list_pending(&self, page: i64, limit: i64) -> Result<Vec<RefundRequest>, AppError> {
        if page < 1 || !(1..=100).contains(&limit) {
            return Err(AppError::InvalidRequest(
                "page must be >= 1 and limit between 1 and 100".into(),
            ));
        }
        refunds::list_pending(&self.pool, limit, (page - 1) * limit).await
    }
}
