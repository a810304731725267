//! Inventory reservation store.
//!
//! Every mutating function runs on a caller-supplied connection, normally the
//! enclosing order transaction, so stock state commits or rolls back together
//! with the order that caused it.
//!
//! # Concurrency
//!
//! `reserve` is a single conditional `UPDATE`. Postgres takes the row lock and
//! re-evaluates `available_quantity >= qty` after any concurrent writer
//! commits, so two reservations of the same (warehouse, book) serialize and
//! the loser fails cleanly when stock runs out.

use sqlx::{PgConnection, PgExecutor};
use uuid::Uuid;

use crate::error::AppError;
use crate::models::inventory::{InventoryRow, release_quantity};

/// Move `qty` units from available to reserved.
///
/// # Errors
///
/// - `InsufficientStock`: no row, or fewer than `qty` units available
/// - `InvalidRequest`: `qty` is not positive
pub async fn reserve(
    conn: &mut PgConnection,
    warehouse_id: Uuid,
    book_id: Uuid,
    qty: i32,
    actor: Option<Uuid>,
) -> Result<(), AppError> {
    if qty <= 0 {
        return Err(AppError::InvalidRequest(
            "Quantity must be positive".to_string(),
        ));
    }

    let updated = sqlx::query(
        r#"
        UPDATE inventory_rows
        SET available_quantity = available_quantity - $3,
            reserved_quantity = reserved_quantity + $3,
            last_updated_by = $4,
            last_reason = 'reserve',
            updated_at = NOW()
        WHERE warehouse_id = $1
          AND book_id = $2
          AND available_quantity >= $3
        "#,
    )
    .bind(warehouse_id)
    .bind(book_id)
    .bind(qty)
    .bind(actor)
    .execute(&mut *conn)
    .await?
    .rows_affected();

    if updated == 0 {
        return Err(AppError::InsufficientStock { book_id });
    }

    Ok(())
}

/// Move up to `qty` units from reserved back to available.
///
/// Releasing more than is reserved is clamped to the reserved amount and
/// logged; a missing row is logged and ignored. Never fails on stock figures,
/// only on database errors.
pub async fn release(
    conn: &mut PgConnection,
    warehouse_id: Uuid,
    book_id: Uuid,
    qty: i32,
    actor: Option<Uuid>,
) -> Result<(), AppError> {
    if qty <= 0 {
        return Ok(());
    }

    // Lock the row so the clamp is computed on the value we update
    let reserved: Option<i32> = sqlx::query_scalar(
        "SELECT reserved_quantity FROM inventory_rows WHERE warehouse_id = $1 AND book_id = $2 FOR UPDATE",
    )
    .bind(warehouse_id)
    .bind(book_id)
    .fetch_optional(&mut *conn)
    .await?;

    let Some(reserved) = reserved else {
        tracing::warn!(%warehouse_id, %book_id, qty, "Release for missing inventory row ignored");
        return Ok(());
    };

    let effective = release_quantity(qty, reserved);
    if effective < qty {
        tracing::warn!(
            %warehouse_id,
            %book_id,
            requested = qty,
            reserved,
            "Release exceeds reserved quantity, clamping"
        );
    }
    if effective == 0 {
        return Ok(());
    }

    sqlx::query(
        r#"
        UPDATE inventory_rows
        SET available_quantity = available_quantity + $3,
            reserved_quantity = reserved_quantity - $3,
            last_updated_by = $4,
            last_reason = 'release',
            updated_at = NOW()
        WHERE warehouse_id = $1 AND book_id = $2
        "#,
    )
    .bind(warehouse_id)
    .bind(book_id)
    .bind(effective)
    .bind(actor)
    .execute(&mut *conn)
    .await?;

    Ok(())
}

/// Remove reserved units that have physically left the warehouse.
///
/// Called when an order ships. Clamped like [`release`].
pub async fn consume(
    conn: &mut PgConnection,
    warehouse_id: Uuid,
    book_id: Uuid,
    qty: i32,
    actor: Option<Uuid>,
) -> Result<(), AppError> {
    let updated = sqlx::query(
        r#"
        UPDATE inventory_rows
        SET reserved_quantity = reserved_quantity - LEAST(reserved_quantity, $3),
            last_updated_by = $4,
            last_reason = 'shipped',
            updated_at = NOW()
        WHERE warehouse_id = $1 AND book_id = $2
        "#,
    )
    .bind(warehouse_id)
    .bind(book_id)
    .bind(qty)
    .bind(actor)
    .execute(&mut *conn)
    .await?
    .rows_affected();

    if updated == 0 {
        tracing::warn!(%warehouse_id, %book_id, qty, "Consume for missing inventory row ignored");
    }

    Ok(())
}

/// Units available for new reservations, zero when the row does not exist.
pub async fn available<'e>(
    executor: impl PgExecutor<'e>,
    warehouse_id: Uuid,
    book_id: Uuid,
) -> Result<i32, AppError> {
    let available: Option<i32> = sqlx::query_scalar(
        "SELECT available_quantity FROM inventory_rows WHERE warehouse_id = $1 AND book_id = $2",
    )
    .bind(warehouse_id)
    .bind(book_id)
    .fetch_optional(executor)
    .await?;

    Ok(available.unwrap_or(0))
}

/// Whether `qty` units could be reserved right now (no lock taken).
pub async fn check<'e>(
    executor: impl PgExecutor<'e>,
    warehouse_id: Uuid,
    book_id: Uuid,
    qty: i32,
) -> Result<bool, AppError> {
    Ok(available(executor, warehouse_id, book_id).await? >= qty)
}

pub async fn find_row<'e>(
    executor: impl PgExecutor<'e>,
    warehouse_id: Uuid,
    book_id: Uuid,
) -> Result<Option<InventoryRow>, AppError> {
    let row = sqlx::query_as::<_, InventoryRow>(
        "SELECT * FROM inventory_rows WHERE warehouse_id = $1 AND book_id = $2",
    )
    .bind(warehouse_id)
    .bind(book_id)
    .fetch_optional(executor)
    .await?;

    Ok(row)
}

/// Available units per book in one warehouse, for the given books.
pub async fn available_for_books<'e>(
    executor: impl PgExecutor<'e>,
    warehouse_id: Uuid,
    book_ids: &[Uuid],
) -> Result<Vec<(Uuid, i32)>, AppError> {
    let rows = sqlx::query_as::<_, (Uuid, i32)>(
        "SELECT book_id, available_quantity FROM inventory_rows WHERE warehouse_id = $1 AND book_id = ANY($2)",
    )
    .bind(warehouse_id)
    .bind(book_ids)
    .fetch_all(executor)
    .await?;

    Ok(rows)
}

/// Recompute the catalog's stock figure for a book from all warehouses.
///
/// Idempotent: running it twice yields the same value.
pub async fn resync_book_stock<'e>(
    executor: impl PgExecutor<'e>,
    book_id: Uuid,
) -> Result<Option<i32>, AppError> {
    let stock: Option<i32> = sqlx::query_scalar(
        r#"
        UPDATE books
        SET stock_quantity = COALESCE(
                (SELECT SUM(available_quantity)::INTEGER FROM inventory_rows WHERE book_id = $1),
                0
            ),
            updated_at = NOW()
        WHERE id = $1
        RETURNING stock_quantity
        "#,
    )
    .bind(book_id)
    .fetch_optional(executor)
    .await?;

    Ok(stock)
}
