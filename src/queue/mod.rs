//! In-process job queue and worker pool.
//!
//! Callers enqueue jobs, start a fixed number of workers, and stop them with
//! a one-shot broadcast signal. Each worker claims one job at a time, forages
//! for a random while, then records an excursion through the allocator.

pub mod control;
pub mod pending;
pub(crate) mod worker;

pub use control::{JobQueue, Lifecycle, PoolConfig, QueueStats};
pub use pending::PendingQueue;
