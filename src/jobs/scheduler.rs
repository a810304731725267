//! Periodic enqueues for the sweeps.

use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::config::Config;

use super::{EnqueueOptions, Job, JobDispatcher};

/// Enqueue `job` every `every`, starting one period from now.
pub fn spawn_periodic(
    dispatcher: Arc<dyn JobDispatcher>,
    job: Job,
    every: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        interval.tick().await;

        loop {
            interval.tick().await;
            if let Err(e) = dispatcher.enqueue(job.clone(), EnqueueOptions::periodic()).await {
                tracing::warn!(job = job.name(), error = %e, "Periodic job not enqueued, scheduler stopping");
                break;
            }
        }
    })
}

/// Start the expiry sweep and the webhook retry pass.
pub fn start(config: &Config, dispatcher: Arc<dyn JobDispatcher>) -> Vec<JoinHandle<()>> {
    tracing::info!(
        expire_every_secs = config.expire_sweep_interval_secs,
        webhook_retry_every_secs = config.webhook_retry_interval_secs,
        "Starting job scheduler"
    );

    vec![
        spawn_periodic(
            dispatcher.clone(),
            Job::CancelExpiredPayments,
            Duration::from_secs(config.expire_sweep_interval_secs),
        ),
        spawn_periodic(
            dispatcher,
            Job::RetryFailedWebhooks,
            Duration::from_secs(config.webhook_retry_interval_secs),
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jobs::memory::RecordingDispatcher;

    #[tokio::test(start_paused = true)]
    async fn enqueues_once_per_period() {
        let recorder = Arc::new(RecordingDispatcher::new());
        let handle = spawn_periodic(
            recorder.clone(),
            Job::CancelExpiredPayments,
            Duration::from_secs(60),
        );

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert!(recorder.recorded().is_empty());

        tokio::time::sleep(Duration::from_secs(100)).await;
        let jobs: Vec<Job> = recorder.recorded().into_iter().map(|(job, _)| job).collect();
        assert_eq!(jobs, vec![Job::CancelExpiredPayments, Job::CancelExpiredPayments]);

        handle.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn stops_when_queue_is_closed() {
        let recorder = Arc::new(RecordingDispatcher::new());
        recorder.close();
        let handle = spawn_periodic(recorder, Job::RetryFailedWebhooks, Duration::from_secs(5));

        tokio::time::sleep(Duration::from_secs(11)).await;
        assert!(handle.is_finished());
    }
}
