//! Warehouse and per-warehouse stock models.

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

/// Stock of one book in one warehouse.
///
/// # Invariants
///
/// `available_quantity >= 0` and `reserved_quantity >= 0`, enforced by CHECK
/// constraints. A reservation moves units from available to reserved.
#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct InventoryRow {
    pub warehouse_id: Uuid,
    pub book_id: Uuid,
    pub available_quantity: i32,
    pub reserved_quantity: i32,
    pub last_updated_by: Option<Uuid>,
    pub last_reason: Option<String>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct Warehouse {
    pub id: Uuid,
    pub code: String,
    pub name: String,
    pub province_code: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub is_default: bool,
}

/// A warehouse holding enough stock of some book, with its coordinates.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct StockedWarehouse {
    pub id: Uuid,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub available_quantity: i32,
}

/// Units a release of `requested` actually moves back, given what is reserved.
///
/// Over-release is clamped, never an error: duplicate cancellations and
/// admin corrections must not fail on stock figures.
pub fn release_quantity(requested: i32, reserved: i32) -> i32 {
    requested.min(reserved).max(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn release_is_clamped_to_reserved() {
        assert_eq!(release_quantity(3, 5), 3);
        assert_eq!(release_quantity(8, 5), 5);
        assert_eq!(release_quantity(2, 0), 0);
        assert_eq!(release_quantity(-1, 4), 0);
    }
}
