//! Picks the single warehouse that fulfils an order.
//!
//! With coordinates: the nearest active warehouse stocking the first item,
//! ties broken by warehouse id. Without: the province default, then the
//! configured default warehouse. Either way the chosen warehouse must cover
//! every item; orders are never split. Read-only, takes no locks.

use std::collections::HashMap;
use uuid::Uuid;

use crate::db::DbPool;
use crate::error::AppError;
use crate::models::catalog::{Address, CartLine};
use crate::models::inventory::StockedWarehouse;
use crate::repositories::{inventory, warehouses};

const EARTH_RADIUS_KM: f64 = 6371.0;

#[derive(Clone)]
pub struct WarehouseSelector {
    pool: DbPool,
    default_code: String,
}

impl WarehouseSelector {
    pub fn new(pool: DbPool, default_code: impl Into<String>) -> Self {
        Self {
            pool,
            default_code: default_code.into(),
        }
    }

    #[tracing::instrument(skip(self, address, items), fields(address_id = %address.id))]
    pub async fn select(&self, address: &Address, items: &[CartLine]) -> Result<Uuid, AppError> {
        let Some(first) = items.first() else {
            return Err(AppError::CartEmpty);
        };

        let warehouse_id = match address.coordinates() {
            Some((lat, lon)) => {
                let candidates = warehouses::stocking(&self.pool, first.book_id, first.quantity).await?;
                nearest(&candidates, lat, lon).ok_or(AppError::InsufficientStock {
                    book_id: first.book_id,
                })?
            }
            None => self.default_warehouse(address).await?,
        };

        let book_ids: Vec<Uuid> = items.iter().map(|line| line.book_id).collect();
        let stock: HashMap<Uuid, i32> =
            inventory::available_for_books(&self.pool, warehouse_id, &book_ids)
                .await?
                .into_iter()
                .collect();
        covers_all(&stock, items)?;

        tracing::debug!(%warehouse_id, "Warehouse selected");
        Ok(warehouse_id)
    }

    async fn default_warehouse(&self, address: &Address) -> Result<Uuid, AppError> {
        if let Some(code) = address.province_code.as_deref() {
            if let Some(warehouse) = warehouses::default_for_province(&self.pool, code).await? {
                return Ok(warehouse.id);
            }
        }

        warehouses::find_by_code(&self.pool, &self.default_code)
            .await?
            .map(|w| w.id)
            .ok_or_else(|| {
                AppError::Internal(format!("default warehouse {} not found", self.default_code))
            })
    }
}

/// Great-circle distance in kilometres.
pub fn haversine_km(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let d_lat = (lat2 - lat1).to_radians();
    let d_lon = (lon2 - lon1).to_radians();
    let a = (d_lat / 2.0).sin().powi(2)
        + lat1.to_radians().cos() * lat2.to_radians().cos() * (d_lon / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_KM * a.sqrt().asin()
}

/// Closest candidate; equal distances go to the lower id. Candidates without
/// coordinates sort last.
pub fn nearest(candidates: &[StockedWarehouse], lat: f64, lon: f64) -> Option<Uuid> {
    candidates
        .iter()
        .map(|w| {
            let distance = match (w.latitude, w.longitude) {
                (Some(wlat), Some(wlon)) => haversine_km(lat, lon, wlat, wlon),
                _ => f64::INFINITY,
            };
            (distance, w.id)
        })
        .min_by(|a, b| a.0.total_cmp(&b.0).then_with(|| a.1.cmp(&b.1)))
        .map(|(_, id)| id)
}

/// Fails with the first book the stock map cannot cover.
pub fn covers_all(stock: &HashMap<Uuid, i32>, items: &[CartLine]) -> Result<(), AppError> {
    for line in items {
        if stock.get(&line.book_id).copied().unwrap_or(0) < line.quantity {
            return Err(AppError::InsufficientStock {
                book_id: line.book_id,
            });
        }
    }
    Ok(())
}
