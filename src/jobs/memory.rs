//! A dispatcher that records jobs instead of running them.
//!
//! Used by tests to assert what a service scheduled and when.

use async_trait::async_trait;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use super::{EnqueueOptions, Job, JobDispatcher, JobError};

#[derive(Default)]
pub struct RecordingDispatcher {
    jobs: Mutex<Vec<(Job, EnqueueOptions)>>,
    closed: AtomicBool,
}

impl RecordingDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every later enqueue fail with `QueueClosed`.
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    pub fn recorded(&self) -> Vec<(Job, EnqueueOptions)> {
        self.jobs.lock().map(|jobs| jobs.clone()).unwrap_or_default()
    }

    /// Drain and return everything recorded so far.
    pub fn take(&self) -> Vec<(Job, EnqueueOptions)> {
        self.jobs
            .lock()
            .map(|mut jobs| std::mem::take(&mut *jobs))
            .unwrap_or_default()
    }
}

#[async_trait]
impl JobDispatcher for RecordingDispatcher {
    async fn enqueue(&self, job: Job, options: EnqueueOptions) -> Result<(), JobError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(JobError::QueueClosed);
        }
        if let Ok(mut jobs) = self.jobs.lock() {
            jobs.push((job, options));
        }
        Ok(())
    }
}
