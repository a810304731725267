//! Webhook log repository.
//!
//! Every callback is logged before anything else happens to it. The partial
//! unique index over processed rows is the last line of idempotency: a second
//! `mark_processed` for the same (gateway, event, gateway transaction id)
//! fails even when two deliveries race past the `check_idempotent` read.

use sqlx::PgExecutor;
use uuid::Uuid;

use crate::error::{AppError, is_unique_violation};
use crate::models::payment::{Gateway, WebhookEvent, WebhookLog};

/// Failed logs are retried at most this many times.
pub const MAX_WEBHOOK_RETRIES: i32 = 5;

pub async fn insert<'e>(
    executor: impl PgExecutor<'e>,
    gateway: Gateway,
    headers: &serde_json::Value,
    body: &str,
) -> Result<WebhookLog, AppError> {
    let log = sqlx::query_as::<_, WebhookLog>(
        r#"
        INSERT INTO payment_webhook_logs (gateway, event, request_headers, request_body)
        VALUES ($1, 'unknown', $2, $3)
        RETURNING *
        "#,
    )
    .bind(gateway.as_str())
    .bind(headers)
    .bind(body)
    .fetch_one(executor)
    .await?;

    Ok(log)
}

pub async fn find_by_id<'e>(
    executor: impl PgExecutor<'e>,
    log_id: Uuid,
) -> Result<Option<WebhookLog>, AppError> {
    let log = sqlx::query_as::<_, WebhookLog>("SELECT * FROM payment_webhook_logs WHERE id = $1")
        .bind(log_id)
        .fetch_optional(executor)
        .await?;

    Ok(log)
}

/// Record the signature verdict.
pub async fn set_validity<'e>(
    executor: impl PgExecutor<'e>,
    log_id: Uuid,
    is_valid: bool,
    signature: Option<&str>,
) -> Result<(), AppError> {
    sqlx::query(
        r#"
        UPDATE payment_webhook_logs
        SET is_valid = $2,
            signature = $3,
            processing_error = CASE WHEN $2 THEN processing_error ELSE 'invalid signature' END
        WHERE id = $1
        "#,
    )
    .bind(log_id)
    .bind(is_valid)
    .bind(signature)
    .execute(executor)
    .await?;

    Ok(())
}

/// Fill in what the decoded body told us.
pub async fn attach<'e>(
    executor: impl PgExecutor<'e>,
    log_id: Uuid,
    event: WebhookEvent,
    gateway_transaction_id: &str,
    payment_id: Option<Uuid>,
    order_id: Option<Uuid>,
) -> Result<(), AppError> {
    sqlx::query(
        r#"
        UPDATE payment_webhook_logs
        SET event = $2,
            gateway_transaction_id = $3,
            payment_id = COALESCE($4, payment_id),
            order_id = COALESCE($5, order_id)
        WHERE id = $1
        "#,
    )
    .bind(log_id)
    .bind(event.as_str())
    .bind(gateway_transaction_id)
    .bind(payment_id)
    .bind(order_id)
    .execute(executor)
    .await?;

    Ok(())
}

/// Whether this callback was already processed successfully.
pub async fn check_idempotent<'e>(
    executor: impl PgExecutor<'e>,
    gateway: Gateway,
    event: WebhookEvent,
    gateway_transaction_id: &str,
) -> Result<bool, AppError> {
    let processed: bool = sqlx::query_scalar(
        r#"
        SELECT EXISTS(
            SELECT 1 FROM payment_webhook_logs
            WHERE gateway = $1 AND event = $2 AND gateway_transaction_id = $3 AND processed
        )
        "#,
    )
    .bind(gateway.as_str())
    .bind(event.as_str())
    .bind(gateway_transaction_id)
    .fetch_one(executor)
    .await?;

    Ok(processed)
}

/// Mark a log processed.
///
/// Returns `WebhookAlreadyProcessed` when another log with the same triple
/// got there first.
pub async fn mark_processed<'e>(
    executor: impl PgExecutor<'e>,
    log_id: Uuid,
) -> Result<(), AppError> {
    let result = sqlx::query(
        r#"
        UPDATE payment_webhook_logs
        SET processed = TRUE,
            processing_error = NULL,
            processed_at = NOW()
        WHERE id = $1
        "#,
    )
    .bind(log_id)
    .execute(executor)
    .await;

    match result {
        Ok(_) => Ok(()),
        Err(e) if is_unique_violation(&e) => Err(AppError::WebhookAlreadyProcessed),
        Err(e) => Err(e.into()),
    }
}

/// Close out a log for a callback that had already been handled.
pub async fn mark_duplicate<'e>(
    executor: impl PgExecutor<'e>,
    log_id: Uuid,
) -> Result<(), AppError> {
    sqlx::query(
        r#"
        UPDATE payment_webhook_logs
        SET is_duplicate = TRUE,
            processing_error = NULL,
            processed_at = NOW()
        WHERE id = $1
        "#,
    )
    .bind(log_id)
    .execute(executor)
    .await?;

    Ok(())
}

pub async fn mark_processing_error<'e>(
    executor: impl PgExecutor<'e>,
    log_id: Uuid,
    error: &str,
) -> Result<(), AppError> {
    sqlx::query("UPDATE payment_webhook_logs SET processing_error = $2 WHERE id = $1")
        .bind(log_id)
        .bind(error)
        .execute(executor)
        .await?;

    Ok(())
}

/// Valid logs whose processing failed and that still have retries left.
pub async fn get_failed<'e>(
    executor: impl PgExecutor<'e>,
    limit: i64,
) -> Result<Vec<WebhookLog>, AppError> {
    let logs = sqlx::query_as::<_, WebhookLog>(
        r#"
        SELECT * FROM payment_webhook_logs
        WHERE is_valid
          AND NOT processed
          AND NOT is_duplicate
          AND processing_error IS NOT NULL
          AND retry_count < $1
        ORDER BY received_at
        LIMIT $2
        "#,
    )
    .bind(MAX_WEBHOOK_RETRIES)
    .bind(limit)
    .fetch_all(executor)
    .await?;

    Ok(logs)
}

pub async fn record_retry<'e>(executor: impl PgExecutor<'e>, log_id: Uuid) -> Result<(), AppError> {
    sqlx::query("UPDATE payment_webhook_logs SET retry_count = retry_count + 1 WHERE id = $1")
        .bind(log_id)
        .execute(executor)
        .await?;

    Ok(())
}
