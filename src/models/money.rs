//! Fixed-point monetary arithmetic and order amount computation.
//!
//! Amounts are `rust_decimal::Decimal`, never floats. Persisted totals are
//! rounded half-away-from-zero to two fractional digits; display values use
//! banker's rounding.

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

use crate::config::Config;
use crate::error::AppError;

/// An amount in a specific currency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Money {
    pub amount: Decimal,
    pub currency: Currency,
}

/// Supported ISO 4217 currencies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Currency {
    Vnd,
    Usd,
}

impl Currency {
    pub fn as_str(&self) -> &'static str {
        match self {
            Currency::Vnd => "VND",
            Currency::Usd => "USD",
        }
    }

    pub fn parse(code: &str) -> Result<Self, AppError> {
        match code.to_ascii_uppercase().as_str() {
            "VND" => Ok(Currency::Vnd),
            "USD" => Ok(Currency::Usd),
            other => Err(AppError::InvalidRequest(format!(
                "Unsupported currency: {}",
                other
            ))),
        }
    }
}

impl Money {
    pub fn new(amount: Decimal, currency: Currency) -> Self {
        Self { amount, currency }
    }

    pub fn zero(currency: Currency) -> Self {
        Self::new(Decimal::ZERO, currency)
    }

    pub fn add(&self, other: &Money) -> Result<Money, AppError> {
        self.same_currency(other)?;
        Ok(Money::new(self.amount + other.amount, self.currency))
    }

    pub fn sub(&self, other: &Money) -> Result<Money, AppError> {
        self.same_currency(other)?;
        Ok(Money::new(self.amount - other.amount, self.currency))
    }

    pub fn multiply(&self, quantity: i32) -> Money {
        Money::new(self.amount * Decimal::from(quantity), self.currency)
    }

    /// Clamps negative values to zero.
    pub fn floor_zero(&self) -> Money {
        Money::new(self.amount.max(Decimal::ZERO), self.currency)
    }

    /// Rounded for storage: two digits, half away from zero.
    pub fn persisted(&self) -> Money {
        Money::new(round_persisted(self.amount), self.currency)
    }

    /// Rounded for display: two digits, banker's rounding.
    pub fn display(&self) -> Money {
        Money::new(round_display(self.amount), self.currency)
    }

    fn same_currency(&self, other: &Money) -> Result<(), AppError> {
        if self.currency != other.currency {
            return Err(AppError::Internal(format!(
                "currency mismatch: {} vs {}",
                self.currency.as_str(),
                other.currency.as_str()
            )));
        }
        Ok(())
    }
}

impl std::fmt::Display for Money {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", round_display(self.amount), self.currency.as_str())
    }
}

pub fn round_persisted(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

pub fn round_display(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(2, RoundingStrategy::MidpointNearestEven)
}

/// Pricing constants injected from configuration.
#[derive(Debug, Clone, Copy)]
pub struct FeeSchedule {
    pub shipping_fee: Decimal,
    pub cod_fee: Decimal,
    pub tax_rate: Decimal,
}

impl From<&Config> for FeeSchedule {
    fn from(config: &Config) -> Self {
        Self {
            shipping_fee: config.shipping_fee,
            cod_fee: config.cod_fee,
            tax_rate: config.tax_rate,
        }
    }
}

/// Every monetary figure persisted on an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct OrderAmounts {
    pub subtotal: Decimal,
    pub discount: Decimal,
    pub shipping_fee: Decimal,
    pub cod_fee: Decimal,
    pub tax: Decimal,
    pub total: Decimal,
}

/// Computes shipping, COD fee, tax and total for an order.
///
/// `total = max(0, subtotal - discount + shipping + cod_fee + tax)`.
/// Tax applies to the discounted subtotal and is zero unless configured.
pub fn compute_amounts(
    subtotal: Decimal,
    discount: Decimal,
    is_cod: bool,
    fees: &FeeSchedule,
) -> OrderAmounts {
    let subtotal = round_persisted(subtotal);
    let discount = round_persisted(discount.max(Decimal::ZERO));
    let shipping_fee = round_persisted(fees.shipping_fee);
    let cod_fee = if is_cod {
        round_persisted(fees.cod_fee)
    } else {
        Decimal::ZERO
    };
    let taxable = (subtotal - discount).max(Decimal::ZERO);
    let tax = round_persisted(taxable * fees.tax_rate);
    let total = (subtotal - discount + shipping_fee + cod_fee + tax).max(Decimal::ZERO);

    OrderAmounts {
        subtotal,
        discount,
        shipping_fee,
        cod_fee,
        tax,
        total: round_persisted(total),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn fees() -> FeeSchedule {
        FeeSchedule {
            shipping_fee: dec!(15),
            cod_fee: dec!(15),
            tax_rate: Decimal::ZERO,
        }
    }

    #[test]
    fn cod_order_pays_both_fees() {
        let amounts = compute_amounts(dec!(200), Decimal::ZERO, true, &fees());
        assert_eq!(amounts.shipping_fee, dec!(15));
        assert_eq!(amounts.cod_fee, dec!(15));
        assert_eq!(amounts.total, dec!(230));
    }

    #[test]
    fn prepaid_order_has_no_cod_fee() {
        let amounts = compute_amounts(dec!(200), Decimal::ZERO, false, &fees());
        assert_eq!(amounts.cod_fee, Decimal::ZERO);
        assert_eq!(amounts.total, dec!(215));
    }

    #[test]
    fn total_is_floored_at_zero() {
        let amounts = compute_amounts(dec!(10), dec!(100), false, &fees());
        assert_eq!(amounts.total, Decimal::ZERO);
    }

    #[test]
    fn tax_applies_to_discounted_subtotal() {
        let schedule = FeeSchedule {
            tax_rate: dec!(0.1),
            ..fees()
        };
        let amounts = compute_amounts(dec!(200), dec!(50), false, &schedule);
        assert_eq!(amounts.tax, dec!(15));
        assert_eq!(amounts.total, dec!(180));
    }

    #[test]
    fn persisted_rounding_is_half_away_from_zero() {
        assert_eq!(round_persisted(dec!(2.345)), dec!(2.35));
        assert_eq!(round_persisted(dec!(2.335)), dec!(2.34));
    }

    #[test]
    fn display_rounding_is_bankers() {
        assert_eq!(round_display(dec!(2.345)), dec!(2.34));
        assert_eq!(round_display(dec!(2.355)), dec!(2.36));
    }

    #[test]
    fn mixing_currencies_fails() {
        let vnd = Money::new(dec!(10), Currency::Vnd);
        let usd = Money::new(dec!(10), Currency::Usd);
        assert!(vnd.add(&usd).is_err());
        assert_eq!(vnd.multiply(3).amount, dec!(30));
    }
}
