//! Payment service - payment attempts, gateway callbacks and the expiry sweep.
//!
//! # Webhook pipeline
//!
//! Every callback is logged first, then verified, decoded and applied in one
//! transaction that also marks the log processed. The order row is locked
//! before any payment row changes, which serializes callbacks, admin
//! reconciliation and cancellation for the same order. A second callback
//! with the same (gateway, event, gateway transaction id) is recorded as a
//! duplicate and acknowledged without effect.

use chrono::Utc;
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;
use uuid::Uuid;

use crate::config::Config;
use crate::db::DbPool;
use crate::error::AppError;
use crate::gateways::{GatewayRegistry, PaymentGateway, PaymentUrlRequest};
use crate::models::order::{OrderPaymentStatus, OrderStatus, Page};
use crate::models::payment::{
    CreatePaymentRequest, CreatePaymentResponse, Gateway, ListPaymentsQuery, PaymentResponse,
    PaymentStatus, PaymentTransaction, ReconcileRequest, ReconcileStatus, WebhookEvent,
    WebhookNotification, parse_transaction_ref,
};
use crate::repositories::payments::NewPayment;
use crate::repositories::{audit, orders, payments, refunds, webhook_logs};
use crate::services::order_service::OrderService;

/// Outcome of one expiry sweep.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ExpirySweepReport {
    pub scanned: usize,
    pub payments_cancelled: usize,
    pub orders_cancelled: usize,
    pub failures: usize,
}

/// Outcome of one webhook retry pass.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct WebhookRetryReport {
    pub retried: usize,
    pub succeeded: usize,
    pub failed: usize,
}

#[derive(Clone)]
pub struct PaymentService {
    pool: DbPool,
    config: Arc<Config>,
    gateways: GatewayRegistry,
    orders: OrderService,
}

impl PaymentService {
    pub fn new(
        pool: DbPool,
        config: Arc<Config>,
        gateways: GatewayRegistry,
        orders: OrderService,
    ) -> Self {
        Self {
            pool,
            config,
            gateways,
            orders,
        }
    }

    pub fn gateways(&self) -> &GatewayRegistry {
        &self.gateways
    }

    /// Start a payment attempt for an order.
    ///
    /// # Process
    ///
    /// 1. Lock the order, check ownership, status, previous success and retry limit
    /// 2. Cancel older open attempts and insert a new `pending` attempt
    /// 3. Redirect gateways: build the payment URL outside the transaction,
    ///    then move the attempt to `processing`
    /// 4. COD and bank transfer: leave the attempt `pending` with instructions
    ///
    /// If the URL was issued but the attempt cannot be moved to `processing`,
    /// the attempt is marked `failed` and the error returned, so no attempt is
    /// left `processing` without a URL the customer knows about.
    ///
    /// # Errors
    ///
    /// - `OrderNotFound`, `NotOwner`
    /// - `InvalidGateway`: gateway does not match the order's payment method or is not configured
    /// - `OrderNotPending`, `OrderAlreadyPaid`, `RetryLimitExceeded`
    /// - `GatewayUnavailable`, `GatewayTimeout`
    #[tracing::instrument(skip(self, request, client_ip), fields(order_id = %request.order_id, gateway = %request.gateway))]
    pub async fn create_payment(
        &self,
        user_id: Uuid,
        request: CreatePaymentRequest,
        client_ip: &str,
    ) -> Result<CreatePaymentResponse, AppError> {
        let gateway = request.gateway;
        let adapter = if gateway.is_redirect() {
            Some(self.gateways.get(gateway)?)
        } else {
            None
        };

        let mut tx = self.pool.begin().await?;

        let order = orders::lock(&mut tx, request.order_id)
            .await?
            .ok_or(AppError::OrderNotFound)?;
        if order.user_id != user_id {
            return Err(AppError::NotOwner);
        }
        if !gateway.accepts(order.payment_method) {
            return Err(AppError::InvalidGateway(format!(
                "order was placed with {}",
                order.payment_method.as_str()
            )));
        }

        // COD orders start confirmed, so offline gateways also accept that status
        let payable = match gateway {
            Gateway::Cod | Gateway::BankTransfer => {
                matches!(order.status, OrderStatus::Pending | OrderStatus::Confirmed)
            }
            _ => order.status == OrderStatus::Pending,
        };
        if !payable {
            return Err(AppError::OrderNotPending);
        }
        if order.payment_status == OrderPaymentStatus::Paid
            || payments::has_successful(&mut *tx, order.id).await?
        {
            return Err(AppError::OrderAlreadyPaid);
        }

        let (can_retry, attempts) =
            payments::check_retry_limit(&mut *tx, order.id, self.config.max_payment_retries).await?;
        if !can_retry {
            return Err(AppError::RetryLimitExceeded);
        }

        payments::cancel_open_for_order(&mut *tx, order.id, "Superseded by a new payment attempt")
            .await?;
        let payment = payments::insert(
            &mut *tx,
            &NewPayment {
                order_id: order.id,
                gateway,
                amount: order.total_amount,
                currency: order.currency.clone(),
                retry_count: i32::try_from(attempts).unwrap_or(i32::MAX),
            },
        )
        .await?;

        tx.commit().await?;

        let expires_at =
            payments::expires_at(payment.initiated_at, self.config.payment_timeout_minutes);

        let Some(adapter) = adapter else {
            let message = match gateway {
                Gateway::BankTransfer => format!(
                    "Transfer {} {} with reference {}",
                    payment.amount,
                    payment.currency,
                    payment.transaction_ref()
                ),
                _ => "Pay the courier in cash on delivery".to_string(),
            };
            tracing::info!(payment_id = %payment.id, "Offline payment attempt created");
            return Ok(CreatePaymentResponse {
                payment_transaction_id: payment.id,
                amount: payment.amount,
                currency: payment.currency,
                status: payment.status,
                expires_at,
                payment_url: None,
                message: Some(message),
            });
        };

        let order_info = format!("Payment for order {}", order.order_number);
        let transaction_ref = payment.transaction_ref();
        let url = match adapter
            .create_payment_url(&PaymentUrlRequest {
                transaction_ref: &transaction_ref,
                amount: payment.amount,
                order_info: &order_info,
                return_url: None,
                client_ip,
            })
            .await
        {
            Ok(url) => url,
            Err(e) => {
                payments::mark_failed(
                    &self.pool,
                    payment.id,
                    &e.code().to_ascii_uppercase(),
                    &e.to_string(),
                    None,
                )
                .await?;
                return Err(e);
            }
        };

        let details = json!({ "payment_url": url, "client_ip": client_ip });
        let payment = match payments::mark_processing(&self.pool, payment.id, &details).await {
            Ok(payment) => payment,
            Err(e) => {
                tracing::error!(payment_id = %payment.id, error = %e, "Could not mark payment processing");
                payments::mark_failed(
                    &self.pool,
                    payment.id,
                    "STATUS_UPDATE_FAILED",
                    "Payment URL issued but status update failed",
                    None,
                )
                .await?;
                return Err(e);
            }
        };

        tracing::info!(payment_id = %payment.id, attempt = attempts + 1, "Payment URL issued");

        Ok(CreatePaymentResponse {
            payment_transaction_id: payment.id,
            amount: payment.amount,
            currency: payment.currency,
            status: payment.status,
            expires_at,
            payment_url: Some(url),
            message: None,
        })
    }

    /// Handle a raw gateway callback and return the body to acknowledge it with.
    ///
    /// # Errors
    ///
    /// - `InvalidSignature`: the log row is kept with `is_valid = false`
    /// - anything raised while applying: the log keeps the error for retry
    #[tracing::instrument(skip(self, headers, body), fields(body_len = body.len()))]
    pub async fn process_webhook(
        &self,
        gateway: Gateway,
        headers: serde_json::Value,
        body: &[u8],
    ) -> Result<serde_json::Value, AppError> {
        let adapter = self.gateways.get(gateway)?;

        let log =
            webhook_logs::insert(&self.pool, gateway, &headers, &String::from_utf8_lossy(body))
                .await?;

        if !adapter.verify_signature(body) {
            webhook_logs::set_validity(&self.pool, log.id, false, None).await?;
            tracing::warn!(log_id = %log.id, "Webhook signature verification failed");
            return Err(AppError::InvalidSignature);
        }

        let notification = match adapter.decode_webhook(body) {
            Ok(n) => n,
            Err(e) => {
                webhook_logs::mark_processing_error(&self.pool, log.id, &e.to_string()).await?;
                return Err(e);
            }
        };
        webhook_logs::set_validity(&self.pool, log.id, true, notification.signature.as_deref())
            .await?;

        self.process_logged(adapter.as_ref(), log.id, &notification).await
    }

    /// Apply a decoded callback that already has a log row.
    async fn process_logged(
        &self,
        adapter: &dyn PaymentGateway,
        log_id: Uuid,
        notification: &WebhookNotification,
    ) -> Result<serde_json::Value, AppError> {
        match self.apply_notification(adapter, log_id, notification).await {
            Ok(()) => Ok(adapter.acknowledgement()),
            Err(AppError::WebhookAlreadyProcessed) => {
                webhook_logs::mark_duplicate(&self.pool, log_id).await?;
                tracing::info!(
                    %log_id,
                    idempotency_key = %notification.idempotency_key(),
                    "Duplicate webhook acknowledged"
                );
                Ok(adapter.acknowledgement())
            }
            Err(e) => {
                webhook_logs::mark_processing_error(&self.pool, log_id, &e.to_string()).await?;
                tracing::warn!(%log_id, error = %e, "Webhook processing failed");
                Err(e)
            }
        }
    }

    async fn apply_notification(
        &self,
        adapter: &dyn PaymentGateway,
        log_id: Uuid,
        notification: &WebhookNotification,
    ) -> Result<(), AppError> {
        if notification.transaction_ref.is_empty() {
            return Err(AppError::InvalidRequest(
                "callback has no transaction reference".into(),
            ));
        }
        if webhook_logs::check_idempotent(
            &self.pool,
            notification.gateway,
            notification.event,
            &notification.idempotency_key(),
        )
        .await?
        {
            return Err(AppError::WebhookAlreadyProcessed);
        }

        match notification.event {
            WebhookEvent::Payment => self.apply_payment(adapter, log_id, notification).await,
            WebhookEvent::Refund => self.apply_refund(adapter, log_id, notification).await,
        }
    }

    async fn apply_payment(
        &self,
        adapter: &dyn PaymentGateway,
        log_id: Uuid,
        n: &WebhookNotification,
    ) -> Result<(), AppError> {
        let payment_id = parse_transaction_ref(&n.transaction_ref).ok_or(AppError::PaymentNotFound)?;

        let mut tx = self.pool.begin().await?;

        let payment = payments::find_by_id(&mut *tx, payment_id)
            .await?
            .ok_or(AppError::PaymentNotFound)?;
        if payment.gateway != n.gateway {
            return Err(AppError::InvalidGateway(format!(
                "payment belongs to {}",
                payment.gateway
            )));
        }
        webhook_logs::attach(
            &mut *tx,
            log_id,
            n.event,
            &n.idempotency_key(),
            Some(payment.id),
            Some(payment.order_id),
        )
        .await?;

        // Order first, then payment: same lock order as cancellation
        let order = orders::lock(&mut tx, payment.order_id)
            .await?
            .ok_or(AppError::OrderNotFound)?;
        let payment = payments::lock(&mut tx, payment_id)
            .await?
            .ok_or(AppError::PaymentNotFound)?;

        if let Some(amount) = n.amount {
            if amount != payment.amount {
                tracing::error!(
                    payment_id = %payment.id,
                    expected = %payment.amount,
                    received = %amount,
                    "Webhook amount does not match payment"
                );
                return Err(AppError::InvalidRequest("amount mismatch".into()));
            }
        }

        if n.success {
            self.record_capture(&mut tx, &payment, &order, n).await?;
        } else {
            let code = adapter.map_error_code(&n.result_code);
            let message = n
                .message
                .clone()
                .unwrap_or_else(|| format!("Gateway result code {}", n.result_code));
            match payments::mark_failed(&mut *tx, payment.id, code, &message, Some(&n.raw)).await? {
                Some(_) => {
                    if order.payment_status == OrderPaymentStatus::Pending {
                        orders::set_payment_status(&mut *tx, order.id, OrderPaymentStatus::Failed)
                            .await?;
                    }
                    tracing::info!(payment_id = %payment.id, code, "Payment failed");
                }
                None => {
                    tracing::info!(payment_id = %payment.id, status = ?payment.status, "Failure callback for settled payment ignored");
                }
            }
        }

        webhook_logs::mark_processed(&mut *tx, log_id).await?;
        tx.commit().await?;
        Ok(())
    }

    /// Record a confirmed capture and reconcile the order.
    async fn record_capture(
        &self,
        tx: &mut sqlx::PgConnection,
        payment: &PaymentTransaction,
        order: &crate::models::order::Order,
        n: &WebhookNotification,
    ) -> Result<(), AppError> {
        if payment.status == PaymentStatus::Success {
            tracing::info!(payment_id = %payment.id, "Payment already successful");
            return Ok(());
        }

        if let Some(other) = payments::successful_for_order(&mut *tx, order.id).await? {
            tracing::error!(
                order_id = %order.id,
                payment_id = %payment.id,
                captured_payment_id = %other.id,
                "Second capture for an already paid order, flagged for review"
            );
            payments::flag_for_review(&mut *tx, payment.id).await?;
            return Ok(());
        }

        payments::mark_success(
            tx,
            payment.id,
            &n.gateway_transaction_id,
            &n.raw,
            n.signature.as_deref(),
        )
        .await?;

        if order.status == OrderStatus::Cancelled {
            tracing::error!(
                order_id = %order.id,
                payment_id = %payment.id,
                "CRITICAL: payment captured for a cancelled order, flagged for reconciliation"
            );
            payments::flag_for_review(&mut *tx, payment.id).await?;
            orders::set_payment_status(&mut *tx, order.id, OrderPaymentStatus::Paid).await?;
            return Ok(());
        }

        orders::mark_paid(tx, order.id, Utc::now()).await?;
        if order.status == OrderStatus::Pending {
            orders::insert_history(
                &mut *tx,
                order.id,
                Some(OrderStatus::Pending),
                OrderStatus::Confirmed,
                None,
                Some(&format!("Payment received via {}", payment.gateway)),
            )
            .await?;
        }

        tracing::info!(order_id = %order.id, payment_id = %payment.id, "Payment captured");
        Ok(())
    }

    async fn apply_refund(
        &self,
        adapter: &dyn PaymentGateway,
        log_id: Uuid,
        n: &WebhookNotification,
    ) -> Result<(), AppError> {
        let mut tx = self.pool.begin().await?;

        let refund = match refunds::lock_processing_by_reference(&mut tx, &n.transaction_ref).await? {
            Some(refund) => refund,
            None => refunds::lock_processing_by_reference(&mut tx, &n.gateway_transaction_id)
                .await?
                .ok_or(AppError::RefundNotFound)?,
        };
        webhook_logs::attach(
            &mut *tx,
            log_id,
            n.event,
            &n.idempotency_key(),
            Some(refund.payment_id),
            Some(refund.order_id),
        )
        .await?;

        if n.success {
            refunds::mark_completed(&mut *tx, refund.id, &n.raw).await?;
            payments::apply_refund(&mut *tx, refund.payment_id, refund.amount).await?;
            orders::set_payment_status(&mut *tx, refund.order_id, OrderPaymentStatus::Refunded)
                .await?;
            tracing::info!(refund_id = %refund.id, amount = %refund.amount, "Refund completed");
        } else {
            let code = adapter.map_error_code(&n.result_code);
            let message = format!(
                "{code}: {}",
                n.message.as_deref().unwrap_or("refund failed at gateway")
            );
            refunds::mark_failed(&mut *tx, refund.id, &message, Some(&n.raw)).await?;
            tracing::warn!(refund_id = %refund.id, code, "Refund failed at gateway");
        }

        webhook_logs::mark_processed(&mut *tx, log_id).await?;
        tx.commit().await?;
        Ok(())
    }

    /// Cancel attempts past the payment window and the orders they held.
    ///
    /// Per-row failures are logged and counted; the sweep carries on. A second
    /// run over the same rows finds nothing to do.
    #[tracing::instrument(skip(self))]
    pub async fn cancel_expired(&self, batch: i64) -> Result<ExpirySweepReport, AppError> {
        let timeout = self.config.payment_timeout_minutes;
        let expired = payments::get_expired(&self.pool, timeout, batch).await?;
        let reason = format!("Payment timeout after {timeout} minutes");

        let mut report = ExpirySweepReport {
            scanned: expired.len(),
            ..Default::default()
        };

        for payment in expired {
            match payments::mark_cancelled(&self.pool, payment.id, &reason).await {
                Ok(true) => report.payments_cancelled += 1,
                Ok(false) => continue,
                Err(e) => {
                    tracing::warn!(payment_id = %payment.id, error = %e, "Could not cancel expired payment");
                    report.failures += 1;
                    continue;
                }
            }

            match self
                .orders
                .cancel_by_system(payment.order_id, &reason, "payment_timeout")
                .await
            {
                Ok(true) => report.orders_cancelled += 1,
                Ok(false) => {}
                Err(e) => {
                    tracing::warn!(order_id = %payment.order_id, error = %e, "Could not cancel order of expired payment");
                    report.failures += 1;
                }
            }
        }

        if report.scanned > 0 {
            tracing::info!(?report, "Expired payments swept");
        }
        Ok(report)
    }

    /// Re-run logged callbacks whose processing failed.
    #[tracing::instrument(skip(self))]
    pub async fn retry_failed_webhooks(&self, batch: i64) -> Result<WebhookRetryReport, AppError> {
        let logs = webhook_logs::get_failed(&self.pool, batch).await?;
        let mut report = WebhookRetryReport::default();

        for log in logs {
            report.retried += 1;
            webhook_logs::record_retry(&self.pool, log.id).await?;

            let adapter = match log
                .gateway
                .parse::<Gateway>()
                .and_then(|g| self.gateways.get(g))
            {
                Ok(adapter) => adapter,
                Err(e) => {
                    tracing::warn!(log_id = %log.id, error = %e, "No adapter for logged webhook");
                    report.failed += 1;
                    continue;
                }
            };

            let outcome = match adapter.decode_webhook(log.request_body.as_bytes()) {
                Ok(notification) => {
                    self.process_logged(adapter.as_ref(), log.id, &notification)
                        .await
                }
                Err(e) => {
                    webhook_logs::mark_processing_error(&self.pool, log.id, &e.to_string()).await?;
                    Err(e)
                }
            };

            match outcome {
                Ok(_) => report.succeeded += 1,
                Err(_) => report.failed += 1,
            }
        }

        if report.retried > 0 {
            tracing::info!(?report, "Failed webhooks retried");
        }
        Ok(report)
    }

    /// Settle a payment by hand (admin). Writes an audit entry.
    #[tracing::instrument(skip(self, request), fields(status = ?request.status))]
    pub async fn admin_reconcile(
        &self,
        admin_id: Uuid,
        payment_id: Uuid,
        request: ReconcileRequest,
    ) -> Result<PaymentResponse, AppError> {
        let mut tx = self.pool.begin().await?;

        let payment = payments::find_by_id(&mut *tx, payment_id)
            .await?
            .ok_or(AppError::PaymentNotFound)?;
        let order = orders::lock(&mut tx, payment.order_id)
            .await?
            .ok_or(AppError::OrderNotFound)?;
        let payment = payments::lock(&mut tx, payment_id)
            .await?
            .ok_or(AppError::PaymentNotFound)?;
        let previous_status = payment.status;

        let updated = match request.status {
            ReconcileStatus::Success => {
                if payment.status == PaymentStatus::Success {
                    return Err(AppError::InvalidStatus("payment is already successful".into()));
                }
                if payments::successful_for_order(&mut *tx, order.id).await?.is_some() {
                    return Err(AppError::OrderAlreadyPaid);
                }

                let gateway_transaction_id = request
                    .gateway_transaction_id
                    .clone()
                    .or_else(|| payment.gateway_transaction_id.clone())
                    .unwrap_or_else(|| format!("MANUAL-{}", payment.transaction_ref()));
                let details = json!({
                    "manual_reconciliation": true,
                    "admin_id": admin_id,
                    "notes": request.notes,
                });
                let updated = payments::mark_success(
                    &mut tx,
                    payment.id,
                    &gateway_transaction_id,
                    &details,
                    None,
                )
                .await?;

                if order.status == OrderStatus::Cancelled {
                    tracing::error!(order_id = %order.id, "Payment reconciled for a cancelled order");
                    payments::flag_for_review(&mut *tx, payment.id).await?;
                    orders::set_payment_status(&mut *tx, order.id, OrderPaymentStatus::Paid)
                        .await?;
                } else {
                    orders::mark_paid(&mut tx, order.id, Utc::now()).await?;
                    if order.status == OrderStatus::Pending {
                        orders::insert_history(
                            &mut *tx,
                            order.id,
                            Some(OrderStatus::Pending),
                            OrderStatus::Confirmed,
                            Some(admin_id),
                            Some("Payment reconciled by admin"),
                        )
                        .await?;
                    }
                }
                updated
            }
            ReconcileStatus::Failed => {
                let updated = payments::reconcile_failed(&mut *tx, payment.id, request.notes.as_deref())
                    .await?
                    .ok_or_else(|| {
                        AppError::InvalidStatus(format!(
                            "a {previous_status:?} payment cannot be marked failed"
                        ))
                    })?;
                if order.payment_status == OrderPaymentStatus::Pending {
                    orders::set_payment_status(&mut *tx, order.id, OrderPaymentStatus::Failed)
                        .await?;
                }
                updated
            }
        };

        audit::record(
            &mut *tx,
            admin_id,
            "payment.reconcile",
            "payment",
            payment.id,
            json!({
                "previous_status": previous_status,
                "status": updated.status,
                "gateway_transaction_id": request.gateway_transaction_id,
                "notes": request.notes,
            }),
        )
        .await?;

        tx.commit().await?;

        tracing::info!(%payment_id, from = ?previous_status, to = ?updated.status, "Payment reconciled");
        Ok(updated.into())
    }

    /// A payment attempt, for its order's owner.
    pub async fn get_payment(
        &self,
        user_id: Uuid,
        payment_id: Uuid,
    ) -> Result<PaymentResponse, AppError> {
        let payment = payments::find_by_id(&self.pool, payment_id)
            .await?
            .ok_or(AppError::PaymentNotFound)?;
        let order = orders::find_by_id(&self.pool, payment.order_id)
            .await?
            .ok_or(AppError::OrderNotFound)?;
        if order.user_id != user_id {
            return Err(AppError::NotOwner);
        }
        Ok(payment.into())
    }

    pub async fn admin_get_payment(&self, payment_id: Uuid) -> Result<PaymentTransaction, AppError> {
        payments::find_by_id(&self.pool, payment_id)
            .await?
            .ok_or(AppError::PaymentNotFound)
    }

    pub async fn admin_list_payments(
        &self,
        query: ListPaymentsQuery,
    ) -> Result<Page<PaymentResponse>, AppError> {
        query.validate()?;
        let mut conn = self.pool.acquire().await?;
        let (rows, total) = payments::list(
            &mut conn,
            query.status,
            query.gateway,
            query.limit,
            (query.page - 1) * query.limit,
        )
        .await?;

        Ok(Page {
            data: rows.into_iter().map(PaymentResponse::from).collect(),
            page: query.page,
            limit: query.limit,
            total,
        })
    }
}
