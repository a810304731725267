//! Job handlers. Every handler is safe to run more than once.

use crate::config::Config;
use crate::db::DbPool;
use crate::error::AppError;
use crate::repositories::inventory;
use crate::services::order_service::OrderService;
use crate::services::payment_service::PaymentService;

use super::Job;

pub struct JobRunner {
    pool: DbPool,
    orders: OrderService,
    payments: PaymentService,
    expire_batch: i64,
    webhook_batch: i64,
}

impl JobRunner {
    pub fn new(
        pool: DbPool,
        orders: OrderService,
        payments: PaymentService,
        config: &Config,
    ) -> Self {
        Self {
            pool,
            orders,
            payments,
            expire_batch: config.expire_sweep_batch,
            webhook_batch: config.webhook_retry_batch,
        }
    }

    #[tracing::instrument(skip(self, job), fields(job = job.name()))]
    pub async fn run(&self, job: &Job) -> Result<(), AppError> {
        match job {
            Job::AutoReleaseReservation { order_id } => {
                self.orders.release_unpaid(*order_id).await?;
            }
            Job::StockResync { book_id, source } => {
                match inventory::resync_book_stock(&self.pool, *book_id).await? {
                    Some(stock) => {
                        tracing::debug!(%book_id, stock, source = source.as_str(), "Book stock resynced")
                    }
                    None => tracing::warn!(%book_id, "Stock resync for unknown book"),
                }
            }
            Job::CancelExpiredPayments => {
                self.payments.cancel_expired(self.expire_batch).await?;
            }
            Job::RetryFailedWebhooks => {
                self.payments.retry_failed_webhooks(self.webhook_batch).await?;
            }
        }
        Ok(())
    }
}
