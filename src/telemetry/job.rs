//! Job execution span helpers.
//!
//! Every claimed job runs inside one span so the worker, the caller's job id
//! and the persisted excursion id land on the same trace.

use tracing::Span;

/// Start a span for one job on one worker.
///
/// `excursion.id` is declared empty and filled in by [`record_excursion`].
pub fn start_job_span(worker: usize, job_id: i64) -> Span {
    tracing::info_span!(
        "job.execute",
        "worker.id" = worker,
        "job.id" = job_id,
        "excursion.id" = tracing::field::Empty,
    )
}

/// Attach the persisted excursion id to the span and emit an event.
pub fn record_excursion(span: &Span, excursion_id: &str, sticks_collected: i64) {
    span.record("excursion.id", excursion_id);
    span.in_scope(|| {
        tracing::info!(
            excursion_id,
            sticks_collected,
            "excursion recorded"
        );
    });
}

/// Record a job state transition on the span.
pub fn record_state_transition(span: &Span, from: &str, to: &str) {
    span.in_scope(|| {
        tracing::debug!(from = from, to = to, "state_transition");
    });
}
