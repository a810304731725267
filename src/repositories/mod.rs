//! SQL access, one module per table group.
//!
//! Functions that run a single statement accept any `PgExecutor` (pool or
//! transaction). Functions that run several take `&mut PgConnection` and must
//! be called inside a transaction.

pub mod audit;
pub mod catalog;
pub mod inventory;
pub mod orders;
pub mod payments;
pub mod refunds;
pub mod warehouses;
pub mod webhook_logs;
