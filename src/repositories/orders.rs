//! Order repository: orders, items, status history and order numbers.
//!
//! Every status change goes through a single `UPDATE ... WHERE id = $1 AND
//! version = $2` statement. Zero affected rows means the caller's view is
//! stale (`VersionMismatch`) or the order is gone (`OrderNotFound`).

use chrono::{DateTime, NaiveDate, Utc};
use sqlx::{PgConnection, PgExecutor};
use std::collections::HashMap;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::order::{
    NewOrder, NewOrderItem, Order, OrderItem, OrderPaymentStatus, OrderStatus,
    OrderStatusHistory, StatusUpdateFields,
};

/// Format an order number: `ORD-YYYYMMDD-NNN`.
///
/// The sequence is zero-padded to three digits and simply grows wider past 999.
pub fn format_order_number(day: NaiveDate, sequence: i32) -> String {
    format!("ORD-{}-{:03}", day.format("%Y%m%d"), sequence)
}

/// Take the next order number for `day`.
///
/// The upsert locks the day's counter row until the surrounding transaction
/// ends, so concurrent checkouts receive distinct, increasing numbers.
pub async fn next_order_number(
    conn: &mut PgConnection,
    day: NaiveDate,
) -> Result<String, AppError> {
    let sequence: i32 = sqlx::query_scalar(
        r#"
        INSERT INTO order_number_sequences (day, last_value)
        VALUES ($1, 1)
        ON CONFLICT (day) DO UPDATE SET last_value = order_number_sequences.last_value + 1
        RETURNING last_value
        "#,
    )
    .bind(day)
    .fetch_one(&mut *conn)
    .await?;

    Ok(format_order_number(day, sequence))
}

/// Insert an order, assigning its order number.
pub async fn insert(conn: &mut PgConnection, order: &NewOrder) -> Result<Order, AppError> {
    let order_number = next_order_number(conn, Utc::now().date_naive()).await?;

    let inserted = sqlx::query_as::<_, Order>(
        r#"
        INSERT INTO orders (
            order_number,
            user_id,
            address_id,
            promotion_id,
            warehouse_id,
            currency,
            subtotal,
            shipping_fee,
            cod_fee,
            discount_amount,
            tax_amount,
            total_amount,
            payment_method,
            payment_status,
            status,
            customer_note
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, 'pending', $14, $15)
        RETURNING *
        "#,
    )
    .bind(&order_number)
    .bind(order.user_id)
    .bind(order.address_id)
    .bind(order.promotion_id)
    .bind(order.warehouse_id)
    .bind(&order.currency)
    .bind(order.amounts.subtotal)
    .bind(order.amounts.shipping_fee)
    .bind(order.amounts.cod_fee)
    .bind(order.amounts.discount)
    .bind(order.amounts.tax)
    .bind(order.amounts.total)
    .bind(order.payment_method)
    .bind(order.status)
    .bind(&order.customer_note)
    .fetch_one(&mut *conn)
    .await?;

    Ok(inserted)
}

pub async fn insert_items(
    conn: &mut PgConnection,
    order_id: Uuid,
    items: &[NewOrderItem],
) -> Result<Vec<OrderItem>, AppError> {
    let mut inserted = Vec::with_capacity(items.len());

    for item in items {
        let row = sqlx::query_as::<_, OrderItem>(
            r#"
            INSERT INTO order_items (
                order_id, book_id, book_title, book_slug, book_cover_url,
                author_name, price, quantity, subtotal
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING *
            "#,
        )
        .bind(order_id)
        .bind(item.book_id)
        .bind(&item.book_title)
        .bind(&item.book_slug)
        .bind(&item.book_cover_url)
        .bind(&item.author_name)
        .bind(item.price)
        .bind(item.quantity)
        .bind(item.subtotal())
        .fetch_one(&mut *conn)
        .await?;

        inserted.push(row);
    }

    Ok(inserted)
}

/// Append a status history row. `changed_by = None` records a system change.
pub async fn insert_history<'e>(
    executor: impl PgExecutor<'e>,
    order_id: Uuid,
    from_status: Option<OrderStatus>,
    to_status: OrderStatus,
    changed_by: Option<Uuid>,
    notes: Option<&str>,
) -> Result<(), AppError> {
    sqlx::query(
        r#"
        INSERT INTO order_status_history (order_id, from_status, to_status, changed_by, notes)
        VALUES ($1, $2, $3, $4, $5)
        "#,
    )
    .bind(order_id)
    .bind(from_status)
    .bind(to_status)
    .bind(changed_by)
    .bind(notes)
    .execute(executor)
    .await?;

    Ok(())
}

pub async fn find_by_id<'e>(
    executor: impl PgExecutor<'e>,
    order_id: Uuid,
) -> Result<Option<Order>, AppError> {
    let order = sqlx::query_as::<_, Order>("SELECT * FROM orders WHERE id = $1")
        .bind(order_id)
        .fetch_optional(executor)
        .await?;

    Ok(order)
}

pub async fn find_by_number<'e>(
    executor: impl PgExecutor<'e>,
    order_number: &str,
) -> Result<Option<Order>, AppError> {
    let order = sqlx::query_as::<_, Order>("SELECT * FROM orders WHERE order_number = $1")
        .bind(order_number)
        .fetch_optional(executor)
        .await?;

    Ok(order)
}

/// Load an order and hold its row lock until the transaction ends.
pub async fn lock(conn: &mut PgConnection, order_id: Uuid) -> Result<Option<Order>, AppError> {
    let order = sqlx::query_as::<_, Order>("SELECT * FROM orders WHERE id = $1 FOR UPDATE")
        .bind(order_id)
        .fetch_optional(&mut *conn)
        .await?;

    Ok(order)
}

/// Tell a stale version apart from a missing row after a guarded update missed.
async fn missed_update(conn: &mut PgConnection, order_id: Uuid) -> AppError {
    match sqlx::query_scalar::<_, bool>("SELECT EXISTS(SELECT 1 FROM orders WHERE id = $1)")
        .bind(order_id)
        .fetch_one(&mut *conn)
        .await
    {
        Ok(true) => AppError::VersionMismatch,
        Ok(false) => AppError::OrderNotFound,
        Err(e) => AppError::Database(e),
    }
}

/// Change status with an optimistic version check.
///
/// Optional fields are written in the same statement; `None` leaves the
/// column unchanged.
pub async fn update_status(
    conn: &mut PgConnection,
    order_id: Uuid,
    new_status: OrderStatus,
    expected_version: i32,
    fields: &StatusUpdateFields,
) -> Result<Order, AppError> {
    let updated = sqlx::query_as::<_, Order>(
        r#"
        UPDATE orders
        SET status = $2,
            tracking_number = COALESCE($4, tracking_number),
            admin_note = COALESCE($5, admin_note),
            delivered_at = COALESCE($6, delivered_at),
            version = version + 1,
            updated_at = NOW()
        WHERE id = $1 AND version = $3
        RETURNING *
        "#,
    )
    .bind(order_id)
    .bind(new_status)
    .bind(expected_version)
    .bind(&fields.tracking_number)
    .bind(&fields.admin_note)
    .bind(fields.delivered_at)
    .fetch_optional(&mut *conn)
    .await?;

    match updated {
        Some(order) => Ok(order),
        None => Err(missed_update(conn, order_id).await),
    }
}

/// Cancel with an optimistic version check.
pub async fn cancel(
    conn: &mut PgConnection,
    order_id: Uuid,
    reason: &str,
    expected_version: i32,
) -> Result<Order, AppError> {
    let updated = sqlx::query_as::<_, Order>(
        r#"
        UPDATE orders
        SET status = 'cancelled',
            cancellation_reason = $2,
            cancelled_at = NOW(),
            version = version + 1,
            updated_at = NOW()
        WHERE id = $1 AND version = $3
        RETURNING *
        "#,
    )
    .bind(order_id)
    .bind(reason)
    .bind(expected_version)
    .fetch_optional(&mut *conn)
    .await?;

    match updated {
        Some(order) => Ok(order),
        None => Err(missed_update(conn, order_id).await),
    }
}

/// Cancel without a version check. The caller must hold the row lock.
pub async fn cancel_unchecked(
    conn: &mut PgConnection,
    order_id: Uuid,
    reason: &str,
) -> Result<Order, AppError> {
    let order = sqlx::query_as::<_, Order>(
        r#"
        UPDATE orders
        SET status = 'cancelled',
            cancellation_reason = $2,
            cancelled_at = NOW(),
            version = version + 1,
            updated_at = NOW()
        WHERE id = $1
        RETURNING *
        "#,
    )
    .bind(order_id)
    .bind(reason)
    .fetch_optional(&mut *conn)
    .await?
    .ok_or(AppError::OrderNotFound)?;

    Ok(order)
}

/// Record a captured payment on the order.
///
/// A pending order advances to confirmed; any other status is left alone.
pub async fn mark_paid(
    conn: &mut PgConnection,
    order_id: Uuid,
    paid_at: DateTime<Utc>,
) -> Result<Order, AppError> {
    let order = sqlx::query_as::<_, Order>(
        r#"
        UPDATE orders
        SET payment_status = 'paid',
            paid_at = $2,
            status = CASE WHEN status = 'pending' THEN 'confirmed' ELSE status END,
            version = version + 1,
            updated_at = NOW()
        WHERE id = $1
        RETURNING *
        "#,
    )
    .bind(order_id)
    .bind(paid_at)
    .fetch_optional(&mut *conn)
    .await?
    .ok_or(AppError::OrderNotFound)?;

    Ok(order)
}

pub async fn set_payment_status<'e>(
    executor: impl PgExecutor<'e>,
    order_id: Uuid,
    payment_status: OrderPaymentStatus,
) -> Result<(), AppError> {
    sqlx::query(
        r#"
        UPDATE orders
        SET payment_status = $2,
            version = version + 1,
            updated_at = NOW()
        WHERE id = $1
        "#,
    )
    .bind(order_id)
    .bind(payment_status)
    .execute(executor)
    .await?;

    Ok(())
}

pub async fn items<'e>(
    executor: impl PgExecutor<'e>,
    order_id: Uuid,
) -> Result<Vec<OrderItem>, AppError> {
    let items = sqlx::query_as::<_, OrderItem>(
        "SELECT * FROM order_items WHERE order_id = $1 ORDER BY created_at, id",
    )
    .bind(order_id)
    .fetch_all(executor)
    .await?;

    Ok(items)
}

pub async fn history<'e>(
    executor: impl PgExecutor<'e>,
    order_id: Uuid,
) -> Result<Vec<OrderStatusHistory>, AppError> {
    let history = sqlx::query_as::<_, OrderStatusHistory>(
        "SELECT * FROM order_status_history WHERE order_id = $1 ORDER BY created_at, id",
    )
    .bind(order_id)
    .fetch_all(executor)
    .await?;

    Ok(history)
}

/// A user's orders, newest first, plus the total matching count.
pub async fn list_by_user(
    conn: &mut PgConnection,
    user_id: Uuid,
    status: Option<OrderStatus>,
    limit: i64,
    offset: i64,
) -> Result<(Vec<Order>, i64), AppError> {
    let rows = sqlx::query_as::<_, Order>(
        r#"
        SELECT * FROM orders
        WHERE user_id = $1 AND ($2::TEXT IS NULL OR status = $2)
        ORDER BY created_at DESC, id DESC
        LIMIT $3 OFFSET $4
        "#,
    )
    .bind(user_id)
    .bind(status)
    .bind(limit)
    .bind(offset)
    .fetch_all(&mut *conn)
    .await?;

    let total: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM orders WHERE user_id = $1 AND ($2::TEXT IS NULL OR status = $2)",
    )
    .bind(user_id)
    .bind(status)
    .fetch_one(&mut *conn)
    .await?;

    Ok((rows, total))
}

/// All orders, newest first, for the admin list.
pub async fn list_all(
    conn: &mut PgConnection,
    status: Option<OrderStatus>,
    limit: i64,
    offset: i64,
) -> Result<(Vec<Order>, i64), AppError> {
    let rows = sqlx::query_as::<_, Order>(
        r#"
        SELECT * FROM orders
        WHERE ($1::TEXT IS NULL OR status = $1)
        ORDER BY created_at DESC, id DESC
        LIMIT $2 OFFSET $3
        "#,
    )
    .bind(status)
    .bind(limit)
    .bind(offset)
    .fetch_all(&mut *conn)
    .await?;

    let total: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM orders WHERE ($1::TEXT IS NULL OR status = $1)")
            .bind(status)
            .fetch_one(&mut *conn)
            .await?;

    Ok((rows, total))
}

/// Number of units per order for a page of orders, in one query.
pub async fn count_items_by_orders<'e>(
    executor: impl PgExecutor<'e>,
    order_ids: &[Uuid],
) -> Result<HashMap<Uuid, i64>, AppError> {
    if order_ids.is_empty() {
        return Ok(HashMap::new());
    }

    let rows = sqlx::query_as::<_, (Uuid, i64)>(
        r#"
        SELECT order_id, COALESCE(SUM(quantity), 0)::BIGINT
        FROM order_items
        WHERE order_id = ANY($1)
        GROUP BY order_id
        "#,
    )
    .bind(order_ids)
    .fetch_all(executor)
    .await?;

    Ok(rows.into_iter().collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn order_number_is_date_scoped_and_padded() {
        let day = NaiveDate::from_ymd_opt(2025, 3, 9).unwrap();
        assert_eq!(format_order_number(day, 7), "ORD-20250309-007");
        assert_eq!(format_order_number(day, 1234), "ORD-20250309-1234");
    }
}
