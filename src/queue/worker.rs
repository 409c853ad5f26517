//! Worker loop: claim one job, forage, record the excursion, repeat.

use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::{Duration, Instant};

use opentelemetry::KeyValue;
use rand::Rng;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, info, warn};

use crate::allocator::{Allocator, ExcursionStore};
use crate::model::Job;
use crate::telemetry::job::{record_excursion, record_state_transition, start_job_span};
use crate::telemetry::metrics;

use super::control::{Counters, PoolConfig, record_outcome};
use super::pending::PendingQueue;

pub(crate) struct Worker<S> {
    pub(crate) id: usize,
    pub(crate) pending: Arc<PendingQueue>,
    pub(crate) allocator: Allocator<S>,
    pub(crate) config: PoolConfig,
    pub(crate) shutdown: CancellationToken,
    pub(crate) counters: Arc<Counters>,
}

impl<S: ExcursionStore> Worker<S> {
    /// Run until the shutdown token is cancelled.
    ///
    /// The token is checked before every claim, and an idle worker waiting on
    /// the queue wakes for it too. A job claimed before cancellation is
    /// carried through to its insert.
    pub(crate) async fn run(self) {
        debug!(worker = self.id, "worker started");

        loop {
            if self.shutdown.is_cancelled() {
                break;
            }

            let job = tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => break,
                job = self.pending.pop() => job,
            };

            if let Some(job) = job {
                self.execute(job).await;
            }
        }

        info!(worker = self.id, "worker exiting");
    }

    async fn execute(&self, job: Job) {
        self.counters.claimed.fetch_add(1, Ordering::SeqCst);
        metrics::jobs_claimed().add(1, &[KeyValue::new("worker", self.id as i64)]);

        let span = start_job_span(self.id, job.id);

        async {
            record_state_transition(&span, "queued", "claimed");
            info!(payload = %job.payload, "processing job");

            let started = Instant::now();
            tokio::time::sleep(self.work_duration()).await;
            metrics::work_duration_ms().record(started.elapsed().as_secs_f64() * 1000.0, &[]);

            let sticks = self.sticks_collected();
            match self.allocator.record(sticks).await {
                Ok(id) => {
                    self.counters.recorded.fetch_add(1, Ordering::SeqCst);
                    record_outcome(self.allocator.mode(), "ok");
                    record_excursion(&span, &id.to_string(), sticks);
                }
                Err(e) => {
                    self.counters.failed.fetch_add(1, Ordering::SeqCst);
                    record_outcome(self.allocator.mode(), e.kind());
                    warn!(error = %e, "excursion not recorded, job result lost");
                }
            }
        }
        .instrument(span.clone())
        .await
    }

    fn work_duration(&self) -> Duration {
        let min = self.config.min_work.as_millis() as u64;
        let max = (self.config.max_work.as_millis() as u64).max(min);
        Duration::from_millis(rand::rng().random_range(min..=max))
    }

    fn sticks_collected(&self) -> i64 {
        rand::rng().random_range(0..=self.config.max_sticks.max(0))
    }
}
