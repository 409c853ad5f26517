//! In-memory excursion store.
//!
//! Same contract as the Postgres gateway: unique identifiers, numeric
//! maximum, `"0"` when empty. Used by tests and by `beaver run --memory`.
//! Read latency and read failures can be injected to exercise the
//! allocation race and the worker's failure paths.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use tokio::sync::Mutex;

use crate::allocator::{ExcursionStore, next_id};
use crate::error::{Error, Result};
use crate::model::{Excursion, ExcursionId};

/// Excursions kept in an ordered map keyed by identifier.
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: Mutex<BTreeMap<ExcursionId, i64>>,
    read_latency: Option<Duration>,
    failing_reads: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay every maximum-id read by `latency` after the snapshot is taken.
    pub fn with_read_latency(mut self, latency: Duration) -> Self {
        self.read_latency = Some(latency);
        self
    }

    /// Make the next `n` maximum-id reads fail.
    pub fn fail_next_reads(&self, n: usize) {
        self.failing_reads.store(n, Ordering::SeqCst);
    }

    /// All records in identifier order.
    pub async fn list(&self) -> Vec<Excursion> {
        self.records
            .lock()
            .await
            .iter()
            .map(|(id, sticks)| Excursion {
                id: id.clone(),
                sticks_collected: *sticks,
            })
            .collect()
    }

    pub async fn len(&self) -> usize {
        self.records.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.lock().await.is_empty()
    }

    fn take_read_failure(&self) -> Result<()> {
        let failed = self
            .failing_reads
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failed {
            Err(Error::Other("injected read failure".to_string()))
        } else {
            Ok(())
        }
    }

    async fn simulate_latency(&self) {
        if let Some(latency) = self.read_latency {
            tokio::time::sleep(latency).await;
        }
    }
}

fn max_of(records: &BTreeMap<ExcursionId, i64>) -> String {
    records
        .keys()
        .next_back()
        .map(ToString::to_string)
        .unwrap_or_else(|| "0".to_string())
}

fn validate_sticks(sticks_collected: i64) -> Result<()> {
    if sticks_collected < 0 {
        return Err(Error::Other(format!(
            "sticks_collected must be non-negative, got {sticks_collected}"
        )));
    }
    Ok(())
}

impl ExcursionStore for MemoryStore {
    async fn max_excursion_id(&self) -> Result<String> {
        self.take_read_failure()?;
        let max = max_of(&*self.records.lock().await);
        self.simulate_latency().await;
        Ok(max)
    }

    async fn insert_excursion(&self, excursion: &Excursion) -> Result<()> {
        validate_sticks(excursion.sticks_collected)?;
        let mut records = self.records.lock().await;
        if records.contains_key(&excursion.id) {
            return Err(Error::DuplicateExcursion(excursion.id.to_string()));
        }
        records.insert(excursion.id.clone(), excursion.sticks_collected);
        Ok(())
    }

    async fn insert_next_excursion(&self, sticks_collected: i64) -> Result<ExcursionId> {
        validate_sticks(sticks_collected)?;
        // The lock spans read and insert, so allocations serialize.
        let mut records = self.records.lock().await;
        self.take_read_failure()?;
        let id = next_id(&max_of(&records))?;
        self.simulate_latency().await;
        records.insert(id.clone(), sticks_collected);
        Ok(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn excursion(id: &str, sticks: i64) -> Excursion {
        Excursion {
            id: id.parse().unwrap(),
            sticks_collected: sticks,
        }
    }

    #[tokio::test]
    async fn empty_store_reports_zero() {
        let store = MemoryStore::new();
        assert_eq!(store.max_excursion_id().await.unwrap(), "0");
    }

    #[tokio::test]
    async fn max_is_numeric_not_lexicographic() {
        let store = MemoryStore::new();
        store.insert_excursion(&excursion("9", 1)).await.unwrap();
        store.insert_excursion(&excursion("10", 1)).await.unwrap();
        store.insert_excursion(&excursion("10.1", 1)).await.unwrap();
        assert_eq!(store.max_excursion_id().await.unwrap(), "10.1");
    }

    #[tokio::test]
    async fn duplicate_insert_is_rejected() {
        let store = MemoryStore::new();
        store.insert_excursion(&excursion("1", 3)).await.unwrap();
        let err = store.insert_excursion(&excursion("1", 4)).await.unwrap_err();
        assert!(matches!(err, Error::DuplicateExcursion(ref id) if id == "1"));
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn injected_read_failures_are_consumed() {
        let store = MemoryStore::new();
        store.fail_next_reads(1);
        assert!(store.max_excursion_id().await.is_err());
        assert!(store.max_excursion_id().await.is_ok());
    }

    #[tokio::test]
    async fn insert_next_skips_past_continuations() {
        let store = MemoryStore::new();
        store.insert_excursion(&excursion("12", 10)).await.unwrap();
        store.insert_excursion(&excursion("12.1", 18)).await.unwrap();
        let id = store.insert_next_excursion(3).await.unwrap();
        assert_eq!(id.to_string(), "13");
    }
}
