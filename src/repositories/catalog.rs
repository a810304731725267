//! Read ports onto provider-owned tables: carts, addresses, books, promotions.
//!
//! Only two writes happen here, both inside the order transaction: clearing
//! the cart and counting a promotion use.

use rust_decimal::Decimal;
use sqlx::{PgConnection, PgExecutor};
use uuid::Uuid;

use crate::error::AppError;
use crate::models::catalog::{Address, BookSnapshot, Cart, CartLine};
use crate::models::promotion::Promotion;

pub async fn find_cart<'e>(
    executor: impl PgExecutor<'e>,
    user_id: Uuid,
) -> Result<Option<Cart>, AppError> {
    let cart = sqlx::query_as::<_, Cart>(
        "SELECT id, user_id, promotion_code FROM carts WHERE user_id = $1",
    )
    .bind(user_id)
    .fetch_optional(executor)
    .await?;

    Ok(cart)
}

/// Cart rows in the order they were added.
pub async fn cart_lines<'e>(
    executor: impl PgExecutor<'e>,
    cart_id: Uuid,
) -> Result<Vec<CartLine>, AppError> {
    let lines = sqlx::query_as::<_, CartLine>(
        "SELECT book_id, quantity FROM cart_items WHERE cart_id = $1 ORDER BY added_at, book_id",
    )
    .bind(cart_id)
    .fetch_all(executor)
    .await?;

    Ok(lines)
}

/// Empty the cart and detach its promotion.
pub async fn clear_cart(conn: &mut PgConnection, cart_id: Uuid) -> Result<(), AppError> {
    sqlx::query("DELETE FROM cart_items WHERE cart_id = $1")
        .bind(cart_id)
        .execute(&mut *conn)
        .await?;

    sqlx::query("UPDATE carts SET promotion_code = NULL, updated_at = NOW() WHERE id = $1")
        .bind(cart_id)
        .execute(&mut *conn)
        .await?;

    Ok(())
}

pub async fn find_address<'e>(
    executor: impl PgExecutor<'e>,
    address_id: Uuid,
) -> Result<Option<Address>, AppError> {
    let address = sqlx::query_as::<_, Address>(
        r#"
        SELECT id, user_id, recipient_name, phone, street, ward, district, province,
               province_code, latitude, longitude, is_default
        FROM addresses
        WHERE id = $1
        "#,
    )
    .bind(address_id)
    .fetch_optional(executor)
    .await?;

    Ok(address)
}

pub async fn default_address<'e>(
    executor: impl PgExecutor<'e>,
    user_id: Uuid,
) -> Result<Option<Address>, AppError> {
    let address = sqlx::query_as::<_, Address>(
        r#"
        SELECT id, user_id, recipient_name, phone, street, ward, district, province,
               province_code, latitude, longitude, is_default
        FROM addresses
        WHERE user_id = $1 AND is_default
        "#,
    )
    .bind(user_id)
    .fetch_optional(executor)
    .await?;

    Ok(address)
}

/// Current title, price, cover and author for each requested book.
pub async fn book_snapshots<'e>(
    executor: impl PgExecutor<'e>,
    book_ids: &[Uuid],
) -> Result<Vec<BookSnapshot>, AppError> {
    let books = sqlx::query_as::<_, BookSnapshot>(
        "SELECT id, title, slug, cover_url, author_name, price, is_active FROM books WHERE id = ANY($1)",
    )
    .bind(book_ids)
    .fetch_all(executor)
    .await?;

    Ok(books)
}

pub async fn find_promotion_by_code<'e>(
    executor: impl PgExecutor<'e>,
    code: &str,
) -> Result<Option<Promotion>, AppError> {
    let promotion = sqlx::query_as::<_, Promotion>("SELECT * FROM promotions WHERE code = $1")
        .bind(code)
        .fetch_optional(executor)
        .await?;

    Ok(promotion)
}

/// Count one use of a promotion and record which order used it.
///
/// The guarded increment is the serialization point for usage caps: when two
/// checkouts race for the last use, the second one fails here.
pub async fn record_promotion_usage(
    conn: &mut PgConnection,
    promotion_id: Uuid,
    user_id: Uuid,
    order_id: Uuid,
    discount: Decimal,
) -> Result<(), AppError> {
    let updated = sqlx::query(
        r#"
        UPDATE promotions
        SET current_uses = current_uses + 1
        WHERE id = $1 AND (max_uses IS NULL OR current_uses < max_uses)
        "#,
    )
    .bind(promotion_id)
    .execute(&mut *conn)
    .await?
    .rows_affected();

    if updated == 0 {
        return Err(AppError::PromoUsageLimitReached);
    }

    sqlx::query(
        r#"
        INSERT INTO promotion_usages (promotion_id, user_id, order_id, discount_amount)
        VALUES ($1, $2, $3, $4)
        "#,
    )
    .bind(promotion_id)
    .bind(user_id)
    .bind(order_id)
    .bind(discount)
    .execute(&mut *conn)
    .await?;

    Ok(())
}
