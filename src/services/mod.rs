//! Business logic services.
//!
//! Services contain core business logic separated from HTTP handlers.
//! They own transactions, validation and the ordering of side effects.

pub mod order_service;
pub mod payment_service;
pub mod refund_service;
pub mod warehouse_selector;
