//! Metric instrument factories for beaver-rs.
//!
//! Uses the OTel Meter API with the globally-registered `MeterProvider`.
//! All instruments are created lazily from the `"beaver-rs"` meter.

use opentelemetry::metrics::{Counter, Histogram, Meter};

/// Returns the shared meter for beaver-rs instruments.
fn meter() -> Meter {
    opentelemetry::global::meter("beaver-rs")
}

/// Counter: jobs appended to the pending queue.
pub fn jobs_enqueued() -> Counter<u64> {
    meter()
        .u64_counter("beaver.jobs.enqueued")
        .with_description("Number of jobs enqueued")
        .build()
}

/// Counter: jobs claimed by a worker.
/// Labels: `worker`.
pub fn jobs_claimed() -> Counter<u64> {
    meter()
        .u64_counter("beaver.jobs.claimed")
        .with_description("Number of jobs claimed by workers")
        .build()
}

/// Counter: excursion recording attempts.
/// Labels: `result` ("ok" | "read_error" | "insert_error" | "duplicate" | "allocate_error"),
/// `mode` ("atomic" | "racy").
pub fn excursions_recorded() -> Counter<u64> {
    meter()
        .u64_counter("beaver.excursions.recorded")
        .with_description("Number of excursion recording attempts")
        .build()
}

/// Counter: store round trips.
/// Labels: `operation`.
pub fn store_operations() -> Counter<u64> {
    meter()
        .u64_counter("beaver.store.operations")
        .with_description("Number of excursion store operations")
        .build()
}

/// Histogram: simulated work duration in milliseconds.
pub fn work_duration_ms() -> Histogram<f64> {
    meter()
        .f64_histogram("beaver.work.duration_ms")
        .with_description("Simulated work duration in milliseconds")
        .with_unit("ms")
        .build()
}
