//! Core data model.
//!
//! A job is one trip out of the lodge. When a worker finishes a job it
//! records an excursion: an identifier plus the number of sticks collected.

pub mod excursion;

use serde::{Deserialize, Serialize};

pub use excursion::{Excursion, ExcursionId};

// ---------------------------------------------------------------------------
// Job
// ---------------------------------------------------------------------------

/// A unit of pending work.
///
/// `id` is supplied by the caller and only used to correlate log lines; it is
/// never the persisted excursion identifier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Job {
    pub id: i64,
    /// Opaque description of the work. The queue doesn't interpret it.
    pub payload: String,
}

impl Job {
    pub fn new(id: i64, payload: impl Into<String>) -> Self {
        Self {
            id,
            payload: payload.into(),
        }
    }
}

impl std::fmt::Display for Job {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "job {} ({})", self.id, self.payload)
    }
}
