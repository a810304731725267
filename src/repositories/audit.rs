//! Append-only record of admin actions.

use sqlx::PgExecutor;
use uuid::Uuid;

use crate::error::AppError;

pub async fn record<'e>(
    executor: impl PgExecutor<'e>,
    admin_id: Uuid,
    action: &str,
    entity_type: &str,
    entity_id: Uuid,
    details: serde_json::Value,
) -> Result<(), AppError> {
    sqlx::query(
        r#"
        INSERT INTO admin_audit_logs (admin_id, action, entity_type, entity_id, details)
        VALUES ($1, $2, $3, $4, $5)
        "#,
    )
    .bind(admin_id)
    .bind(action)
    .bind(entity_type)
    .bind(entity_id)
    .bind(details)
    .execute(executor)
    .await?;

    Ok(())
}
