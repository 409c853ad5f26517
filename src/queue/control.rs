//! Job queue lifecycle: enqueue, start the worker pool, stop it.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use opentelemetry::KeyValue;
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, info, info_span, warn};

use crate::allocator::{AllocationMode, Allocator, ExcursionStore};
use crate::error::{Error, Result};
use crate::model::Job;
use crate::telemetry::metrics;

use super::pending::PendingQueue;
use super::worker::Worker;

/// How often [`JobQueue::wait_idle`] re-checks the counters.
const IDLE_POLL: Duration = Duration::from_millis(10);

/// Configuration for the worker pool.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    pub allocation: AllocationMode,
    /// How long `stop` waits for workers to exit before returning.
    pub grace_period: Duration,
    /// Shortest simulated foraging time.
    pub min_work: Duration,
    /// Longest simulated foraging time (inclusive).
    pub max_work: Duration,
    /// Upper bound (inclusive) for the random stick count.
    pub max_sticks: i64,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            allocation: AllocationMode::default(),
            grace_period: Duration::from_millis(100),
            min_work: Duration::from_millis(5),
            max_work: Duration::from_millis(104),
            max_sticks: 9,
        }
    }
}

/// Pool lifecycle. `Idle → Running → Stopped`, each step taken once.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    Idle,
    Running,
    Stopped,
}

impl std::fmt::Display for Lifecycle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Lifecycle::Idle => "idle",
            Lifecycle::Running => "running",
            Lifecycle::Stopped => "stopped",
        };
        write!(f, "{s}")
    }
}

/// Aggregate counters shared with the workers.
#[derive(Debug, Default)]
pub(crate) struct Counters {
    pub(crate) enqueued: AtomicU64,
    pub(crate) claimed: AtomicU64,
    pub(crate) recorded: AtomicU64,
    pub(crate) failed: AtomicU64,
}

/// Snapshot of queue activity since construction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueStats {
    pub enqueued: u64,
    pub claimed: u64,
    pub recorded: u64,
    pub failed: u64,
}

impl QueueStats {
    /// Jobs whose excursion was either recorded or lost.
    pub fn finished(&self) -> u64 {
        self.recorded + self.failed
    }
}

/// Pending jobs plus the pool of workers draining them.
pub struct JobQueue<S> {
    pending: Arc<PendingQueue>,
    allocator: Allocator<S>,
    config: PoolConfig,
    shutdown: CancellationToken,
    lifecycle: Mutex<Lifecycle>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    counters: Arc<Counters>,
}

impl<S: ExcursionStore> JobQueue<S> {
    pub fn new(store: Arc<S>, config: PoolConfig) -> Self {
        Self {
            pending: Arc::new(PendingQueue::new()),
            allocator: Allocator::new(store, config.allocation),
            config,
            shutdown: CancellationToken::new(),
            lifecycle: Mutex::new(Lifecycle::Idle),
            workers: Mutex::new(Vec::new()),
            counters: Arc::new(Counters::default()),
        }
    }

    /// Append a job to the pending queue. Safe from any thread, at any time.
    pub fn enqueue(&self, job: Job) {
        debug!(job_id = job.id, "job enqueued");
        self.counters.enqueued.fetch_add(1, Ordering::SeqCst);
        self.pending.push(job);
        metrics::jobs_enqueued().add(1, &[]);
    }

    /// Spawn `workers` worker tasks on the current tokio runtime.
    ///
    /// Returns immediately. Fails with [`Error::InvalidTransition`] unless the
    /// pool is idle, or with [`Error::Config`] for zero workers; either way no
    /// workers are launched. Each worker runs under a `worker` span nested in
    /// the caller's current span.
    pub fn start(&self, workers: usize) -> Result<()> {
        let mut lifecycle = self.lifecycle.lock();
        if *lifecycle != Lifecycle::Idle {
            return Err(Error::InvalidTransition {
                from: *lifecycle,
                to: Lifecycle::Running,
            });
        }
        if workers == 0 {
            return Err(Error::Config("worker pool needs at least one worker".to_string()));
        }

        let mut handles = self.workers.lock();
        for id in 0..workers {
            let worker = Worker {
                id,
                pending: Arc::clone(&self.pending),
                allocator: self.allocator.clone(),
                config: self.config.clone(),
                shutdown: self.shutdown.clone(),
                counters: Arc::clone(&self.counters),
            };
            let span = info_span!("worker", worker = id);
            handles.push(tokio::spawn(worker.run().instrument(span)));
        }
        *lifecycle = Lifecycle::Running;

        info!(
            workers,
            allocation = %self.allocator.mode(),
            "worker pool started"
        );
        Ok(())
    }

    /// Signal every worker to stop, then wait up to the grace period.
    ///
    /// Returns early once all workers have exited. Jobs still pending stay
    /// in the queue; a job already claimed finishes on its own. A second
    /// call is a no-op.
    pub async fn stop(&self) {
        let handles = {
            let mut lifecycle = self.lifecycle.lock();
            if *lifecycle == Lifecycle::Stopped {
                return;
            }
            *lifecycle = Lifecycle::Stopped;
            self.shutdown.cancel();
            std::mem::take(&mut *self.workers.lock())
        };

        // Handles dropped on timeout detach their tasks rather than abort them.
        let joined = tokio::time::timeout(self.config.grace_period, async {
            for handle in handles {
                if let Err(e) = handle.await {
                    warn!("worker task failed: {e}");
                }
            }
        })
        .await;

        if joined.is_err() {
            warn!(
                grace_ms = self.config.grace_period.as_millis() as u64,
                "grace period elapsed with workers still busy"
            );
        }
        info!(pending = self.pending.len(), "worker pool stopped");
    }

    /// Wait until every enqueued job has been recorded or lost.
    ///
    /// Only meaningful while the pool is running; callers bound it with a
    /// timeout.
    pub async fn wait_idle(&self) {
        loop {
            let stats = self.stats();
            if stats.finished() >= stats.enqueued {
                return;
            }
            tokio::time::sleep(IDLE_POLL).await;
        }
    }

    /// Number of jobs waiting to be claimed.
    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    pub fn state(&self) -> Lifecycle {
        *self.lifecycle.lock()
    }

    pub fn stats(&self) -> QueueStats {
        QueueStats {
            enqueued: self.counters.enqueued.load(Ordering::SeqCst),
            claimed: self.counters.claimed.load(Ordering::SeqCst),
            recorded: self.counters.recorded.load(Ordering::SeqCst),
            failed: self.counters.failed.load(Ordering::SeqCst),
        }
    }

    pub fn store(&self) -> &Arc<S> {
        self.allocator.store()
    }
}

impl<S> Drop for JobQueue<S> {
    fn drop(&mut self) {
        // Workers blocked on an empty queue would otherwise wait forever.
        self.shutdown.cancel();
    }
}

/// Record the outcome label for one excursion attempt.
pub(crate) fn record_outcome(mode: AllocationMode, result: &'static str) {
    metrics::excursions_recorded().add(
        1,
        &[
            KeyValue::new("result", result),
            KeyValue::new("mode", mode.to_string()),
        ],
    );
}
