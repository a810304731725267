//! Background work: the job dispatch port and its in-process implementation.
//!
//! Services never run background work directly; they describe it as a [`Job`]
//! and hand it to a [`JobDispatcher`]. Delivery is at-least-once, so every job
//! handler in [`runner`] is idempotent.

pub mod memory;
pub mod queue;
pub mod runner;
pub mod scheduler;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use uuid::Uuid;

/// Why a book's stock figure needs recomputing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StockSource {
    Sale,
    OrderCancelled,
    Fulfilment,
}

impl StockSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            StockSource::Sale => "SALE",
            StockSource::OrderCancelled => "ORDER_CANCELLED",
            StockSource::Fulfilment => "FULFILMENT",
        }
    }
}

/// A unit of background work.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Job {
    /// Cancel an order that is still unpaid once its reservation window ends.
    AutoReleaseReservation { order_id: Uuid },
    /// Recompute the catalog stock figure for one book.
    StockResync { book_id: Uuid, source: StockSource },
    /// Sweep payment attempts past their deadline.
    CancelExpiredPayments,
    /// Re-run webhooks whose processing failed.
    RetryFailedWebhooks,
}

impl Job {
    pub fn name(&self) -> &'static str {
        match self {
            Job::AutoReleaseReservation { .. } => "auto_release_reservation",
            Job::StockResync { .. } => "stock_resync",
            Job::CancelExpiredPayments => "cancel_expired_payments",
            Job::RetryFailedWebhooks => "retry_failed_webhooks",
        }
    }
}

/// Scheduling options for one enqueue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EnqueueOptions {
    pub delay: Option<Duration>,
    pub max_retry: u32,
    pub queue: &'static str,
}

impl EnqueueOptions {
    pub fn immediate() -> Self {
        Self {
            delay: None,
            max_retry: 3,
            queue: "default",
        }
    }

    pub fn delayed(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            max_retry: 3,
            queue: "critical",
        }
    }

    pub fn periodic() -> Self {
        Self {
            delay: None,
            max_retry: 0,
            queue: "low",
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum JobError {
    #[error("Job queue is closed")]
    QueueClosed,
}

/// Port through which services hand off background work.
#[async_trait]
pub trait JobDispatcher: Send + Sync {
    async fn enqueue(&self, job: Job, options: EnqueueOptions) -> Result<(), JobError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stock_source_labels() {
        assert_eq!(StockSource::Sale.as_str(), "SALE");
        assert_eq!(StockSource::OrderCancelled.as_str(), "ORDER_CANCELLED");
    }

    #[test]
    fn jobs_serialize_with_type_tag() {
        let job = Job::StockResync {
            book_id: Uuid::nil(),
            source: StockSource::OrderCancelled,
        };
        let json = serde_json::to_value(&job).unwrap();
        assert_eq!(json["type"], "stock_resync");
        assert_eq!(json["source"], "ORDER_CANCELLED");
    }

    #[test]
    fn auto_release_goes_to_critical_queue() {
        let options = EnqueueOptions::delayed(Duration::from_secs(900));
        assert_eq!(options.queue, "critical");
        assert_eq!(options.max_retry, 3);
        assert_eq!(options.delay, Some(Duration::from_secs(900)));
    }
}
