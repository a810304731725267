//! Promotion rules: activation window, usage caps, minimum basket and discount.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::money::round_persisted;

/// A promotion row as stored by the catalog service.
///
/// `promo_type` is free text: `percentage` and `fixed` are understood,
/// anything else yields a zero discount.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Promotion {
    pub id: Uuid,
    pub code: String,
    pub promo_type: String,
    pub discount_value: Decimal,
    pub max_discount: Option<Decimal>,
    pub min_order_amount: Decimal,
    pub max_uses: Option<i32>,
    pub current_uses: i32,
    pub starts_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub is_active: bool,
}

impl Promotion {
    /// Checks the promotion against an order subtotal and returns the discount.
    ///
    /// Checks run in a fixed order so each failure maps to one error kind:
    /// inactive, outside its window, exhausted, basket too small.
    pub fn evaluate(&self, subtotal: Decimal, now: DateTime<Utc>) -> Result<Decimal, AppError> {
        if !self.is_active {
            return Err(AppError::PromoInactive);
        }
        if now < self.starts_at || now > self.expires_at {
            return Err(AppError::PromoExpired);
        }
        if let Some(max_uses) = self.max_uses {
            if self.current_uses >= max_uses {
                return Err(AppError::PromoUsageLimitReached);
            }
        }
        if subtotal < self.min_order_amount {
            return Err(AppError::PromoMinAmount {
                min: self.min_order_amount,
            });
        }
        Ok(compute_discount(self, subtotal))
    }
}

/// Discount for a subtotal.
///
/// - `percentage`: `subtotal * value / 100`, capped by `max_discount` when set
/// - `fixed`: the flat value
/// - anything else: zero
///
/// The result never exceeds the subtotal.
pub fn compute_discount(promotion: &Promotion, subtotal: Decimal) -> Decimal {
    let discount = match promotion.promo_type.as_str() {
        "percentage" => {
            let raw = subtotal * promotion.discount_value / Decimal::ONE_HUNDRED;
            match promotion.max_discount {
                Some(cap) => raw.min(cap),
                None => raw,
            }
        }
        "fixed" => promotion.discount_value,
        other => {
            tracing::warn!(promo_type = other, code = %promotion.code, "Unknown promotion type");
            Decimal::ZERO
        }
    };
    round_persisted(discount.max(Decimal::ZERO).min(subtotal))
}
