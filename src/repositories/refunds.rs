//! Refund request repository.

use sqlx::{PgConnection, PgExecutor};
use uuid::Uuid;

use crate::error::{AppError, is_unique_violation};
use crate::models::refund::RefundRequest;

/// Fields for a new refund request.
#[derive(Debug, Clone)]
pub struct NewRefund<'a> {
    pub payment_id: Uuid,
    pub order_id: Uuid,
    pub requested_by: Uuid,
    pub transaction_ref: &'a str,
    pub amount: rust_decimal::Decimal,
    pub reason: &'a str,
    pub proof_images: serde_json::Value,
}

/// Insert a pending request.
///
/// A second open request for the same payment trips the partial unique
/// index and becomes `RefundAlreadyExists`.
pub async fn insert<'e>(
    executor: impl PgExecutor<'e>,
    refund: &NewRefund<'_>,
) -> Result<RefundRequest, AppError> {
    let result = sqlx::query_as::<_, RefundRequest>(
        r#"
        INSERT INTO refund_requests (
            payment_id, order_id, requested_by, transaction_ref, amount, reason, proof_images
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        RETURNING *
        "#,
    )
    .bind(refund.payment_id)
    .bind(refund.order_id)
    .bind(refund.requested_by)
    .bind(refund.transaction_ref)
    .bind(refund.amount)
    .bind(refund.reason)
    .bind(&refund.proof_images)
    .fetch_one(executor)
    .await;

    match result {
        Ok(row) => Ok(row),
        Err(e) if is_unique_violation(&e) => Err(AppError::RefundAlreadyExists),
        Err(e) => Err(e.into()),
    }
}

pub async fn find_by_id<'e>(
    executor: impl PgExecutor<'e>,
    refund_id: Uuid,
) -> Result<Option<RefundRequest>, AppError> {
    let refund = sqlx::query_as::<_, RefundRequest>("SELECT * FROM refund_requests WHERE id = $1")
        .bind(refund_id)
        .fetch_optional(executor)
        .await?;

    Ok(refund)
}

pub async fn lock(
    conn: &mut PgConnection,
    refund_id: Uuid,
) -> Result<Option<RefundRequest>, AppError> {
    let refund =
        sqlx::query_as::<_, RefundRequest>("SELECT * FROM refund_requests WHERE id = $1 FOR UPDATE")
            .bind(refund_id)
            .fetch_optional(&mut *conn)
            .await?;

    Ok(refund)
}

/// Whether the payment has a `pending`, `approved` or `processing` request.
pub async fn has_open<'e>(executor: impl PgExecutor<'e>, payment_id: Uuid) -> Result<bool, AppError> {
    let exists: bool = sqlx::query_scalar(
        r#"
        SELECT EXISTS(
            SELECT 1 FROM refund_requests
            WHERE payment_id = $1 AND status IN ('pending', 'approved', 'processing')
        )
        "#,
    )
    .bind(payment_id)
    .fetch_one(executor)
    .await?;

    Ok(exists)
}

pub async fn approve<'e>(
    executor: impl PgExecutor<'e>,
    refund_id: Uuid,
    admin_id: Uuid,
    notes: Option<&str>,
) -> Result<RefundRequest, AppError> {
    let row = sqlx::query_as::<_, RefundRequest>(
        r#"
        UPDATE refund_requests
        SET status = 'approved',
            approved_by = $2,
            approved_at = NOW(),
            admin_note = COALESCE($3, admin_note),
            updated_at = NOW()
        WHERE id = $1 AND status = 'pending'
        RETURNING *
        "#,
    )
    .bind(refund_id)
    .bind(admin_id)
    .bind(notes)
    .fetch_optional(executor)
    .await?
    .ok_or_else(|| AppError::InvalidStatus("refund is not pending".into()))?;

    Ok(row)
}

pub async fn reject<'e>(
    executor: impl PgExecutor<'e>,
    refund_id: Uuid,
    admin_id: Uuid,
    reason: &str,
) -> Result<RefundRequest, AppError> {
    let row = sqlx::query_as::<_, RefundRequest>(
        r#"
        UPDATE refund_requests
        SET status = 'rejected',
            rejected_by = $2,
            rejected_at = NOW(),
            rejection_reason = $3,
            updated_at = NOW()
        WHERE id = $1 AND status = 'pending'
        RETURNING *
        "#,
    )
    .bind(refund_id)
    .bind(admin_id)
    .bind(reason)
    .fetch_optional(executor)
    .await?
    .ok_or_else(|| AppError::InvalidStatus("refund is not pending".into()))?;

    Ok(row)
}

/// The gateway accepted the refund; completion arrives later by webhook.
pub async fn mark_processing<'e>(
    executor: impl PgExecutor<'e>,
    refund_id: Uuid,
    gateway_refund_id: &str,
    gateway_response: &serde_json::Value,
) -> Result<RefundRequest, AppError> {
    let row = sqlx::query_as::<_, RefundRequest>(
        r#"
        UPDATE refund_requests
        SET status = 'processing',
            gateway_refund_id = $2,
            gateway_response = $3,
            updated_at = NOW()
        WHERE id = $1 AND status = 'approved'
        RETURNING *
        "#,
    )
    .bind(refund_id)
    .bind(gateway_refund_id)
    .bind(gateway_response)
    .fetch_optional(executor)
    .await?
    .ok_or_else(|| AppError::InvalidStatus("refund is not approved".into()))?;

    Ok(row)
}

pub async fn mark_failed<'e>(
    executor: impl PgExecutor<'e>,
    refund_id: Uuid,
    error_message: &str,
    gateway_response: Option<&serde_json::Value>,
) -> Result<RefundRequest, AppError> {
    let row = sqlx::query_as::<_, RefundRequest>(
        r#"
        UPDATE refund_requests
        SET status = 'failed',
            error_message = $2,
            gateway_response = COALESCE($3, gateway_response),
            updated_at = NOW()
        WHERE id = $1 AND status IN ('approved', 'processing')
        RETURNING *
        "#,
    )
    .bind(refund_id)
    .bind(error_message)
    .bind(gateway_response)
    .fetch_optional(executor)
    .await?
    .ok_or_else(|| AppError::InvalidStatus("refund is not in flight".into()))?;

    Ok(row)
}

pub async fn mark_completed<'e>(
    executor: impl PgExecutor<'e>,
    refund_id: Uuid,
    gateway_response: &serde_json::Value,
) -> Result<RefundRequest, AppError> {
    let row = sqlx::query_as::<_, RefundRequest>(
        r#"
        UPDATE refund_requests
        SET status = 'completed',
            gateway_response = $2,
            completed_at = NOW(),
            updated_at = NOW()
        WHERE id = $1 AND status = 'processing'
        RETURNING *
        "#,
    )
    .bind(refund_id)
    .bind(gateway_response)
    .fetch_optional(executor)
    .await?
    .ok_or_else(|| AppError::InvalidStatus("refund is not processing".into()))?;

    Ok(row)
}

/// The in-flight refund a gateway callback refers to, locked.
///
/// Gateways echo either their own refund id or our `RF...` reference.
pub async fn lock_processing_by_reference(
    conn: &mut PgConnection,
    reference: &str,
) -> Result<Option<RefundRequest>, AppError> {
    let refund = sqlx::query_as::<_, RefundRequest>(
        r#"
        SELECT * FROM refund_requests
        WHERE status = 'processing'
          AND (gateway_refund_id = $1 OR transaction_ref = $1)
        ORDER BY created_at
        LIMIT 1
        FOR UPDATE
        "#,
    )
    .bind(reference)
    .fetch_optional(&mut *conn)
    .await?;

    Ok(refund)
}

/// Pending requests, oldest first, for the admin queue.
pub async fn list_pending<'e>(
    executor: impl PgExecutor<'e>,
    limit: i64,
    offset: i64,
) -> Result<Vec<RefundRequest>, AppError> {
    let rows = sqlx::query_as::<_, RefundRequest>(
        r#"
        SELECT * FROM refund_requests
        WHERE status = 'pending'
        ORDER BY created_at
        LIMIT $1 OFFSET $2
        "#,
    )
    .bind(limit)
    .bind(offset)
    .fetch_all(executor)
    .await?;

    Ok(rows)
}
