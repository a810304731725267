//! Shared application state handed to every handler.

use axum::extract::FromRef;
use std::sync::Arc;

use crate::config::Config;
use crate::db::DbPool;
use crate::services::order_service::OrderService;
use crate::services::payment_service::PaymentService;
use crate::services::refund_service::RefundService;

#[derive(Clone)]
pub struct AppState {
    pub pool: DbPool,
    pub config: Arc<Config>,
    pub orders: OrderService,
    pub payments: PaymentService,
    pub refunds: RefundService,
}

impl FromRef<AppState> for DbPool {
    fn from_ref(state: &AppState) -> Self {
        state.pool.clone()
    }
}
