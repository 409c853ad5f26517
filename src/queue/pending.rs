//! The shared pending-work buffer.

use std::collections::VecDeque;

use parking_lot::Mutex;
use tokio::sync::Semaphore;

use crate::model::Job;

/// FIFO buffer of jobs with a suspending pop.
///
/// One mutex guards the sequence for both append and removal. The semaphore
/// holds one permit per buffered job, so a worker that finds the queue empty
/// sleeps until a push instead of spinning. Permits never outnumber jobs:
/// `push` appends before adding a permit and `pop` takes a permit before
/// removing, so a popper holding a permit always finds a job.
#[derive(Debug)]
pub struct PendingQueue {
    jobs: Mutex<VecDeque<Job>>,
    available: Semaphore,
}

impl Default for PendingQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl PendingQueue {
    pub fn new() -> Self {
        Self {
            jobs: Mutex::new(VecDeque::new()),
            available: Semaphore::new(0),
        }
    }

    /// Append a job at the tail. Never blocks.
    pub fn push(&self, job: Job) {
        self.jobs.lock().push_back(job);
        self.available.add_permits(1);
    }

    /// Remove the head job, waiting while the queue is empty.
    ///
    /// Cancel safe: dropping the future before it completes claims nothing.
    pub async fn pop(&self) -> Option<Job> {
        let permit = self.available.acquire().await.ok()?;
        permit.forget();
        self.jobs.lock().pop_front()
    }

    /// Remove the head job if one is buffered.
    pub fn try_pop(&self) -> Option<Job> {
        let permit = self.available.try_acquire().ok()?;
        permit.forget();
        self.jobs.lock().pop_front()
    }

    pub fn len(&self) -> usize {
        self.jobs.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.lock().is_empty()
    }
}
