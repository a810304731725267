//! Read models for provider-owned tables (users' carts, addresses, books).
//!
//! The checkout core reads these through `repositories::catalog`; it never
//! writes them except for clearing a cart inside the order transaction.

use rust_decimal::Decimal;
use serde::Serialize;
use uuid::Uuid;

/// A shopping cart and the promotion code the cart service attached to it.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Cart {
    pub id: Uuid,
    pub user_id: Uuid,
    pub promotion_code: Option<String>,
}

/// One cart row: which book and how many.
#[derive(Debug, Clone, Copy, PartialEq, Eq, sqlx::FromRow)]
pub struct CartLine {
    pub book_id: Uuid,
    pub quantity: i32,
}

/// Shipping address. Coordinates are optional; without them the default
/// warehouse is used.
#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct Address {
    pub id: Uuid,
    pub user_id: Uuid,
    pub recipient_name: String,
    pub phone: String,
    pub street: String,
    pub ward: Option<String>,
    pub district: Option<String>,
    pub province: String,
    pub province_code: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub is_default: bool,
}

impl Address {
    pub fn coordinates(&self) -> Option<(f64, f64)> {
        match (self.latitude, self.longitude) {
            (Some(lat), Some(lon)) => Some((lat, lon)),
            _ => None,
        }
    }
}

/// Authoritative book data copied onto order items at checkout.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct BookSnapshot {
    pub id: Uuid,
    pub title: String,
    pub slug: String,
    pub cover_url: Option<String>,
    pub author_name: Option<String>,
    pub price: Decimal,
    pub is_active: bool,
}
