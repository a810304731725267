//! In-process job queue on a tokio channel.
//!
//! Delayed jobs sleep in their own task before entering the channel. A job
//! that fails is re-sent with exponential backoff until its `max_retry` is
//! spent. Jobs do not survive a restart; the periodic sweeps pick up
//! anything a lost auto-release would have done.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::runner::JobRunner;
use super::{EnqueueOptions, Job, JobDispatcher, JobError};

const MAX_BACKOFF_SECS: u64 = 300;

#[derive(Debug)]
struct Envelope {
    job: Job,
    options: EnqueueOptions,
    attempt: u32,
}

/// Sending half, handed to services as their [`JobDispatcher`].
#[derive(Clone)]
pub struct TokioJobQueue {
    sender: mpsc::Sender<Envelope>,
}

/// Receiving half; [`JobReceiver::spawn`] starts the worker.
///
/// Retries go back through a weak sender, so the channel closes once every
/// [`TokioJobQueue`] handle is dropped.
pub struct JobReceiver {
    receiver: mpsc::Receiver<Envelope>,
    retries: mpsc::WeakSender<Envelope>,
}

impl TokioJobQueue {
    pub fn new(capacity: usize) -> (Self, JobReceiver) {
        let (sender, receiver) = mpsc::channel(capacity);
        let retries = sender.downgrade();
        (Self { sender }, JobReceiver { receiver, retries })
    }
}

#[async_trait]
impl JobDispatcher for TokioJobQueue {
    async fn enqueue(&self, job: Job, options: EnqueueOptions) -> Result<(), JobError> {
        if self.sender.is_closed() {
            return Err(JobError::QueueClosed);
        }

        let envelope = Envelope {
            job,
            options,
            attempt: 0,
        };

        match options.delay {
            Some(delay) => {
                send_later(self.sender.clone(), envelope, delay);
                Ok(())
            }
            None => self
                .sender
                .send(envelope)
                .await
                .map_err(|_| JobError::QueueClosed),
        }
    }
}

fn send_later(sender: mpsc::Sender<Envelope>, envelope: Envelope, delay: Duration) {
    tokio::spawn(async move {
        tokio::time::sleep(delay).await;
        let job = envelope.job.name();
        if sender.send(envelope).await.is_err() {
            tracing::warn!(job, "Job queue closed before delayed job was due");
        }
    });
}

impl JobReceiver {
    /// Run jobs until every sender is gone. Each job runs in its own task.
    pub fn spawn(self, runner: Arc<JobRunner>) -> JoinHandle<()> {
        let JobReceiver {
            mut receiver,
            retries,
        } = self;

        tokio::spawn(async move {
            while let Some(envelope) = receiver.recv().await {
                let runner = runner.clone();
                let retries = retries.clone();
                tokio::spawn(async move {
                    run_one(&runner, retries, envelope).await;
                });
            }
            tracing::info!("Job worker stopped");
        })
    }
}

async fn run_one(runner: &JobRunner, retries: mpsc::WeakSender<Envelope>, envelope: Envelope) {
    let job = envelope.job.name();
    let queue = envelope.options.queue;

    match runner.run(&envelope.job).await {
        Ok(()) => tracing::debug!(job, queue, attempt = envelope.attempt, "Job completed"),
        Err(e) if envelope.attempt < envelope.options.max_retry => {
            let Some(sender) = retries.upgrade() else {
                tracing::warn!(job, queue, error = %e, "Job failed after queue shutdown, not retried");
                return;
            };
            let delay = retry_delay(envelope.attempt);
            tracing::warn!(
                job,
                queue,
                attempt = envelope.attempt,
                retry_in_ms = delay.as_millis() as u64,
                error = %e,
                "Job failed, retrying"
            );
            send_later(
                sender,
                Envelope {
                    attempt: envelope.attempt + 1,
                    ..envelope
                },
                delay,
            );
        }
        Err(e) => {
            tracing::error!(job = ?envelope.job, queue, error = %e, "Job failed, giving up");
        }
    }
}

/// Base backoff before retry number `attempt + 1`: 2, 4, 8... seconds, capped.
pub fn backoff_base(attempt: u32) -> Duration {
    let secs = 2u64.saturating_pow(attempt.saturating_add(1));
    Duration::from_secs(secs.min(MAX_BACKOFF_SECS))
}

fn retry_delay(attempt: u32) -> Duration {
    backoff_base(attempt) + Duration::from_millis(rand::random_range(0..1000))
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn backoff_doubles_and_caps() {
        assert_eq!(backoff_base(0), Duration::from_secs(2));
        assert_eq!(backoff_base(1), Duration::from_secs(4));
        assert_eq!(backoff_base(2), Duration::from_secs(8));
        assert_eq!(backoff_base(40), Duration::from_secs(MAX_BACKOFF_SECS));
    }

    #[test]
    fn jitter_stays_under_a_second() {
        for attempt in 0..3 {
            let delay = retry_delay(attempt);
            assert!(delay >= backoff_base(attempt));
            assert!(delay < backoff_base(attempt) + Duration::from_secs(1));
        }
    }

    #[tokio::test]
    async fn immediate_jobs_arrive_in_order() {
        let (queue, mut rx) = TokioJobQueue::new(8);
        let a = Job::AutoReleaseReservation {
            order_id: Uuid::from_u128(1),
        };
        queue
            .enqueue(a.clone(), EnqueueOptions::immediate())
            .await
            .unwrap();
        queue
            .enqueue(Job::CancelExpiredPayments, EnqueueOptions::periodic())
            .await
            .unwrap();

        assert_eq!(rx.receiver.recv().await.unwrap().job, a);
        assert_eq!(
            rx.receiver.recv().await.unwrap().job,
            Job::CancelExpiredPayments
        );
    }

    #[tokio::test(start_paused = true)]
    async fn delayed_job_waits_for_its_delay() {
        let (queue, mut rx) = TokioJobQueue::new(8);
        queue
            .enqueue(
                Job::RetryFailedWebhooks,
                EnqueueOptions::delayed(Duration::from_secs(900)),
            )
            .await
            .unwrap();

        tokio::time::advance(Duration::from_secs(899)).await;
        assert!(rx.receiver.try_recv().is_err());

        let envelope = rx.receiver.recv().await.unwrap();
        assert_eq!(envelope.job, Job::RetryFailedWebhooks);
        assert_eq!(envelope.options.queue, "critical");
    }

    #[tokio::test]
    async fn channel_closes_when_last_queue_handle_is_dropped() {
        let (queue, mut rx) = TokioJobQueue::new(8);
        let second = queue.clone();
        queue
            .enqueue(Job::CancelExpiredPayments, EnqueueOptions::periodic())
            .await
            .unwrap();
        drop(queue);
        drop(second);

        assert_eq!(rx.receiver.recv().await.unwrap().job, Job::CancelExpiredPayments);
        assert!(rx.receiver.recv().await.is_none());
        assert!(rx.retries.upgrade().is_none());
    }
}
