//! Payment attempt repository.
//!
//! Status moves are written as conditional updates on the current status so
//! that a late webhook or a concurrent sweep cannot walk an attempt backwards.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{PgConnection, PgExecutor};
use uuid::Uuid;

use crate::error::{AppError, is_unique_violation};
use crate::models::payment::{Gateway, PaymentStatus, PaymentTransaction};

/// Fields for a new attempt. Status always starts at `pending`.
#[derive(Debug, Clone)]
pub struct NewPayment {
    pub order_id: Uuid,
    pub gateway: Gateway,
    pub amount: Decimal,
    pub currency: String,
    pub retry_count: i32,
}

pub async fn insert<'e>(
    executor: impl PgExecutor<'e>,
    payment: &NewPayment,
) -> Result<PaymentTransaction, AppError> {
    let row = sqlx::query_as::<_, PaymentTransaction>(
        r#"
        INSERT INTO payment_transactions (order_id, gateway, amount, currency, retry_count)
        VALUES ($1, $2, $3, $4, $5)
        RETURNING *
        "#,
    )
    .bind(payment.order_id)
    .bind(payment.gateway)
    .bind(payment.amount)
    .bind(&payment.currency)
    .bind(payment.retry_count)
    .fetch_one(executor)
    .await?;

    Ok(row)
}

pub async fn find_by_id<'e>(
    executor: impl PgExecutor<'e>,
    payment_id: Uuid,
) -> Result<Option<PaymentTransaction>, AppError> {
    let payment =
        sqlx::query_as::<_, PaymentTransaction>("SELECT * FROM payment_transactions WHERE id = $1")
            .bind(payment_id)
            .fetch_optional(executor)
            .await?;

    Ok(payment)
}

pub async fn lock(
    conn: &mut PgConnection,
    payment_id: Uuid,
) -> Result<Option<PaymentTransaction>, AppError> {
    let payment = sqlx::query_as::<_, PaymentTransaction>(
        "SELECT * FROM payment_transactions WHERE id = $1 FOR UPDATE",
    )
    .bind(payment_id)
    .fetch_optional(&mut *conn)
    .await?;

    Ok(payment)
}

/// Move a pending attempt to `processing` once the payment URL exists.
///
/// Returns `InvalidStatus` if the attempt is no longer pending.
pub async fn mark_processing<'e>(
    executor: impl PgExecutor<'e>,
    payment_id: Uuid,
    payment_details: &serde_json::Value,
) -> Result<PaymentTransaction, AppError> {
    let row = sqlx::query_as::<_, PaymentTransaction>(
        r#"
        UPDATE payment_transactions
        SET status = 'processing',
            payment_details = $2,
            processing_at = NOW(),
            updated_at = NOW()
        WHERE id = $1 AND status = 'pending'
        RETURNING *
        "#,
    )
    .bind(payment_id)
    .bind(payment_details)
    .fetch_optional(executor)
    .await?
    .ok_or_else(|| AppError::InvalidStatus("payment is no longer pending".into()))?;

    Ok(row)
}

/// Record a confirmed capture.
///
/// A `failed` or `cancelled` attempt may still succeed: the gateway is the
/// source of truth and a late confirmation must not be lost. Another success
/// for the same order trips the partial unique index and becomes
/// `OrderAlreadyPaid`.
pub async fn mark_success(
    conn: &mut PgConnection,
    payment_id: Uuid,
    gateway_transaction_id: &str,
    gateway_response: &serde_json::Value,
    signature: Option<&str>,
) -> Result<PaymentTransaction, AppError> {
    let result = sqlx::query_as::<_, PaymentTransaction>(
        r#"
        UPDATE payment_transactions
        SET status = 'success',
            gateway_transaction_id = $2,
            gateway_response = $3,
            gateway_signature = $4,
            error_code = NULL,
            error_message = NULL,
            completed_at = NOW(),
            updated_at = NOW()
        WHERE id = $1 AND status IN ('pending', 'processing', 'failed', 'cancelled')
        RETURNING *
        "#,
    )
    .bind(payment_id)
    .bind(gateway_transaction_id)
    .bind(gateway_response)
    .bind(signature)
    .fetch_optional(&mut *conn)
    .await;

    match result {
        Ok(Some(row)) => Ok(row),
        Ok(None) => Err(AppError::InvalidStatus(
            "payment cannot be marked successful".into(),
        )),
        Err(e) if is_unique_violation(&e) => Err(AppError::OrderAlreadyPaid),
        Err(e) => Err(e.into()),
    }
}

/// Record a failure. Only open attempts move; returns `None` otherwise.
pub async fn mark_failed<'e>(
    executor: impl PgExecutor<'e>,
    payment_id: Uuid,
    error_code: &str,
    error_message: &str,
    gateway_response: Option<&serde_json::Value>,
) -> Result<Option<PaymentTransaction>, AppError> {
    let row = sqlx::query_as::<_, PaymentTransaction>(
        r#"
        UPDATE payment_transactions
        SET status = 'failed',
            error_code = $2,
            error_message = $3,
            gateway_response = COALESCE($4, gateway_response),
            failed_at = NOW(),
            updated_at = NOW()
        WHERE id = $1 AND status IN ('pending', 'processing')
        RETURNING *
        "#,
    )
    .bind(payment_id)
    .bind(error_code)
    .bind(error_message)
    .bind(gateway_response)
    .fetch_optional(executor)
    .await?;

    Ok(row)
}

/// Cancel an open attempt. Returns whether it moved.
pub async fn mark_cancelled<'e>(
    executor: impl PgExecutor<'e>,
    payment_id: Uuid,
    reason: &str,
) -> Result<bool, AppError> {
    let updated = sqlx::query(
        r#"
        UPDATE payment_transactions
        SET status = 'cancelled',
            error_message = $2,
            updated_at = NOW()
        WHERE id = $1 AND status IN ('pending', 'processing')
        "#,
    )
    .bind(payment_id)
    .bind(reason)
    .execute(executor)
    .await?
    .rows_affected();

    Ok(updated > 0)
}

/// Cancel every open attempt of an order. Returns how many moved.
pub async fn cancel_open_for_order<'e>(
    executor: impl PgExecutor<'e>,
    order_id: Uuid,
    reason: &str,
) -> Result<u64, AppError> {
    let updated = sqlx::query(
        r#"
        UPDATE payment_transactions
        SET status = 'cancelled',
            error_message = $2,
            updated_at = NOW()
        WHERE order_id = $1 AND status IN ('pending', 'processing')
        "#,
    )
    .bind(order_id)
    .bind(reason)
    .execute(executor)
    .await?
    .rows_affected();

    Ok(updated)
}

/// Admin-forced failure, allowed from any non-success state.
pub async fn reconcile_failed<'e>(
    executor: impl PgExecutor<'e>,
    payment_id: Uuid,
    notes: Option<&str>,
) -> Result<Option<PaymentTransaction>, AppError> {
    let row = sqlx::query_as::<_, PaymentTransaction>(
        r#"
        UPDATE payment_transactions
        SET status = 'failed',
            error_code = 'MANUAL_RECONCILE',
            error_message = COALESCE($2, 'Marked failed by admin'),
            failed_at = NOW(),
            updated_at = NOW()
        WHERE id = $1 AND status IN ('pending', 'processing', 'failed', 'cancelled')
        RETURNING *
        "#,
    )
    .bind(payment_id)
    .bind(notes)
    .fetch_optional(executor)
    .await?;

    Ok(row)
}

/// Flag an attempt whose money arrived for an order that can no longer use it.
pub async fn flag_for_review<'e>(
    executor: impl PgExecutor<'e>,
    payment_id: Uuid,
) -> Result<(), AppError> {
    sqlx::query(
        "UPDATE payment_transactions SET requires_review = TRUE, updated_at = NOW() WHERE id = $1",
    )
    .bind(payment_id)
    .execute(executor)
    .await?;

    Ok(())
}

pub async fn has_successful<'e>(
    executor: impl PgExecutor<'e>,
    order_id: Uuid,
) -> Result<bool, AppError> {
    let exists: bool = sqlx::query_scalar(
        "SELECT EXISTS(SELECT 1 FROM payment_transactions WHERE order_id = $1 AND status = 'success')",
    )
    .bind(order_id)
    .fetch_one(executor)
    .await?;

    Ok(exists)
}

pub async fn successful_for_order<'e>(
    executor: impl PgExecutor<'e>,
    order_id: Uuid,
) -> Result<Option<PaymentTransaction>, AppError> {
    let payment = sqlx::query_as::<_, PaymentTransaction>(
        "SELECT * FROM payment_transactions WHERE order_id = $1 AND status = 'success'",
    )
    .bind(order_id)
    .fetch_optional(executor)
    .await?;

    Ok(payment)
}

/// Whether another attempt may be made, and how many were made so far.
pub async fn check_retry_limit<'e>(
    executor: impl PgExecutor<'e>,
    order_id: Uuid,
    max_retries: i32,
) -> Result<(bool, i64), AppError> {
    let attempts: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM payment_transactions WHERE order_id = $1")
            .bind(order_id)
            .fetch_one(executor)
            .await?;

    Ok((attempts < i64::from(max_retries), attempts))
}

/// Open attempts initiated before the timeout, oldest first.
///
/// Offline methods (COD, bank transfer) settle outside the payment window
/// and are never swept.
pub async fn get_expired<'e>(
    executor: impl PgExecutor<'e>,
    timeout_minutes: i64,
    limit: i64,
) -> Result<Vec<PaymentTransaction>, AppError> {
    let rows = sqlx::query_as::<_, PaymentTransaction>(
        r#"
        SELECT * FROM payment_transactions
        WHERE status IN ('pending', 'processing')
          AND gateway NOT IN ('cod', 'bank_transfer')
          AND initiated_at < NOW() - make_interval(mins => $1::INT)
        ORDER BY initiated_at
        LIMIT $2
        "#,
    )
    .bind(timeout_minutes)
    .bind(limit)
    .fetch_all(executor)
    .await?;

    Ok(rows)
}

/// Add a completed refund; the attempt becomes `refunded` once fully returned.
pub async fn apply_refund<'e>(
    executor: impl PgExecutor<'e>,
    payment_id: Uuid,
    amount: Decimal,
) -> Result<PaymentTransaction, AppError> {
    let row = sqlx::query_as::<_, PaymentTransaction>(
        r#"
        UPDATE payment_transactions
        SET refunded_amount = LEAST(amount, refunded_amount + $2),
            status = CASE WHEN refunded_amount + $2 >= amount THEN 'refunded' ELSE status END,
            updated_at = NOW()
        WHERE id = $1
        RETURNING *
        "#,
    )
    .bind(payment_id)
    .bind(amount)
    .fetch_optional(executor)
    .await?
    .ok_or(AppError::PaymentNotFound)?;

    Ok(row)
}

/// Attempts of one order, newest first.
pub async fn list_for_order<'e>(
    executor: impl PgExecutor<'e>,
    order_id: Uuid,
) -> Result<Vec<PaymentTransaction>, AppError> {
    let rows = sqlx::query_as::<_, PaymentTransaction>(
        "SELECT * FROM payment_transactions WHERE order_id = $1 ORDER BY initiated_at DESC",
    )
    .bind(order_id)
    .fetch_all(executor)
    .await?;

    Ok(rows)
}

/// Admin list with optional status and gateway filters.
pub async fn list(
    conn: &mut PgConnection,
    status: Option<PaymentStatus>,
    gateway: Option<Gateway>,
    limit: i64,
    offset: i64,
) -> Result<(Vec<PaymentTransaction>, i64), AppError> {
    let rows = sqlx::query_as::<_, PaymentTransaction>(
        r#"
        SELECT * FROM payment_transactions
        WHERE ($1::TEXT IS NULL OR status = $1)
          AND ($2::TEXT IS NULL OR gateway = $2)
        ORDER BY initiated_at DESC, id DESC
        LIMIT $3 OFFSET $4
        "#,
    )
    .bind(status)
    .bind(gateway)
    .bind(limit)
    .bind(offset)
    .fetch_all(&mut *conn)
    .await?;

    let total: i64 = sqlx::query_scalar(
        r#"
        SELECT COUNT(*) FROM payment_transactions
        WHERE ($1::TEXT IS NULL OR status = $1)
          AND ($2::TEXT IS NULL OR gateway = $2)
        "#,
    )
    .bind(status)
    .bind(gateway)
    .fetch_one(&mut *conn)
    .await?;

    Ok((rows, total))
}

/// When the open window of an attempt closes.
pub fn expires_at(initiated_at: DateTime<Utc>, timeout_minutes: i64) -> DateTime<Utc> {
    initiated_at + chrono::Duration::minutes(timeout_minutes)
}
