//! Read-only warehouse lookups used by the warehouse selector.

use sqlx::PgExecutor;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::inventory::{StockedWarehouse, Warehouse};

/// Active warehouses holding at least `qty` available units of `book_id`.
pub async fn stocking<'e>(
    executor: impl PgExecutor<'e>,
    book_id: Uuid,
    qty: i32,
) -> Result<Vec<StockedWarehouse>, AppError> {
    let rows = sqlx::query_as::<_, StockedWarehouse>(
        r#"
        SELECT w.id, w.latitude, w.longitude, i.available_quantity
        FROM warehouses w
        JOIN inventory_rows i ON i.warehouse_id = w.id
        WHERE w.is_active
          AND i.book_id = $1
          AND i.available_quantity >= $2
        ORDER BY w.id
        "#,
    )
    .bind(book_id)
    .bind(qty)
    .fetch_all(executor)
    .await?;

    Ok(rows)
}

/// Default warehouse for a province, if one is marked.
pub async fn default_for_province<'e>(
    executor: impl PgExecutor<'e>,
    province_code: &str,
) -> Result<Option<Warehouse>, AppError> {
    let warehouse = sqlx::query_as::<_, Warehouse>(
        r#"
        SELECT id, code, name, province_code, latitude, longitude, is_default
        FROM warehouses
        WHERE is_active AND province_code = $1
        ORDER BY is_default DESC, code
        LIMIT 1
        "#,
    )
    .bind(province_code)
    .fetch_optional(executor)
    .await?;

    Ok(warehouse)
}

pub async fn find_by_code<'e>(
    executor: impl PgExecutor<'e>,
    code: &str,
) -> Result<Option<Warehouse>, AppError> {
    let warehouse = sqlx::query_as::<_, Warehouse>(
        "SELECT id, code, name, province_code, latitude, longitude, is_default FROM warehouses WHERE code = $1 AND is_active",
    )
    .bind(code)
    .fetch_optional(executor)
    .await?;

    Ok(warehouse)
}
