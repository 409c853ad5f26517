//! Excursion identifier allocation.
//!
//! The next identifier is the leading integer of the current maximum plus
//! one. Two modes exist:
//!
//! - [`AllocationMode::Racy`] reads the maximum and inserts in two
//!   independent round trips. Concurrent workers can read the same maximum
//!   and compute the same identifier; the second insert then fails with a
//!   duplicate-key error and that job's result is lost. Kept for reproducing
//!   the hazard.
//! - [`AllocationMode::Atomic`] asks the store to read, increment and insert
//!   as one serialized unit. No two records share an identifier.

use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use thiserror::Error;

use crate::error::{Error, Result};
use crate::model::{Excursion, ExcursionId};

/// The persistence operations allocation needs from a store.
pub trait ExcursionStore: Send + Sync + 'static {
    /// Highest stored identifier, or `"0"` when nothing is stored.
    fn max_excursion_id(&self) -> impl Future<Output = Result<String>> + Send;

    /// Insert one record. Fails with [`Error::DuplicateExcursion`] if the id exists.
    fn insert_excursion(&self, excursion: &Excursion) -> impl Future<Output = Result<()>> + Send;

    /// Read the maximum, derive the next top-level id and insert, with no
    /// other allocation interleaving.
    fn insert_next_excursion(
        &self,
        sticks_collected: i64,
    ) -> impl Future<Output = Result<ExcursionId>> + Send;
}

/// How identifiers are allocated under concurrent workers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AllocationMode {
    /// Serialized read-increment-insert.
    #[default]
    Atomic,
    /// Unisolated read then insert.
    Racy,
}

impl std::fmt::Display for AllocationMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            AllocationMode::Atomic => "atomic",
            AllocationMode::Racy => "racy",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for AllocationMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "atomic" => Ok(AllocationMode::Atomic),
            "racy" => Ok(AllocationMode::Racy),
            other => Err(Error::Config(format!(
                "unknown allocation mode {other:?} (expected atomic or racy)"
            ))),
        }
    }
}

/// Derive the identifier that follows the stored maximum.
pub fn next_id(max: &str) -> Result<ExcursionId> {
    let base = ExcursionId::leading_base(max)?;
    ExcursionId::top_level(base).next_top_level()
}

/// Why recording an excursion failed. Every variant is terminal for the job
/// and harmless for the worker.
#[derive(Debug, Error)]
pub enum RecordError {
    #[error("failed to read max excursion id: {0}")]
    Read(#[source] Error),

    #[error("failed to record excursion {id}: {source}")]
    Insert {
        id: ExcursionId,
        #[source]
        source: Error,
    },

    #[error("failed to allocate and record excursion: {0}")]
    Allocate(#[source] Error),
}

impl RecordError {
    /// Metric label for this failure.
    pub fn kind(&self) -> &'static str {
        match self {
            RecordError::Read(_) => "read_error",
            RecordError::Insert {
                source: Error::DuplicateExcursion(_),
                ..
            }
            | RecordError::Allocate(Error::DuplicateExcursion(_)) => "duplicate",
            RecordError::Insert { .. } => "insert_error",
            RecordError::Allocate(_) => "allocate_error",
        }
    }
}

/// Allocates identifiers and writes excursions through a shared store.
pub struct Allocator<S> {
    store: Arc<S>,
    mode: AllocationMode,
}

impl<S> Clone for Allocator<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            mode: self.mode,
        }
    }
}

impl<S: ExcursionStore> Allocator<S> {
    pub fn new(store: Arc<S>, mode: AllocationMode) -> Self {
        Self { store, mode }
    }

    pub fn mode(&self) -> AllocationMode {
        self.mode
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Allocate the next identifier and persist one excursion under it.
    pub async fn record(&self, sticks_collected: i64) -> std::result::Result<ExcursionId, RecordError> {
        match self.mode {
            AllocationMode::Atomic => self
                .store
                .insert_next_excursion(sticks_collected)
                .await
                .map_err(RecordError::Allocate),
            AllocationMode::Racy => {
                let max = self
                    .store
                    .max_excursion_id()
                    .await
                    .map_err(RecordError::Read)?;
                let id = next_id(&max).map_err(RecordError::Read)?;

                // Another worker may insert this same id between the read
                // above and the insert below.
                let excursion = Excursion {
                    id: id.clone(),
                    sticks_collected,
                };
                match self.store.insert_excursion(&excursion).await {
                    Ok(()) => Ok(id),
                    Err(source) => Err(RecordError::Insert { id, source }),
                }
            }
        }
    }
}
