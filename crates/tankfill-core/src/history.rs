//! Reading history storage seam.
//!
//! [`HistoryStore`] is an append-only, timestamp-ordered log of readings
//! plus a synchronous "latest reading" slot. The SQLite implementation
//! lives in `tankfill-store`; [`MemoryHistory`] is the in-memory
//! equivalent with identical query semantics, used in tests and whenever
//! the persistent store is unavailable.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;

use tankfill_types::Reading;

use crate::error::Result;

/// Default number of readings returned by [`HistoryStore::recent`].
pub const DEFAULT_RECENT_LIMIT: usize = 50;

/// Append-only ordered storage of readings.
#[async_trait]
pub trait HistoryStore: Send + Sync {
    /// Append a reading to the log.
    async fn append(&self, reading: Reading) -> Result<()>;

    /// The newest `limit` readings, newest first.
    async fn recent(&self, limit: usize) -> Result<Vec<Reading>>;

    /// Readings with `start_ts <= timestamp <= end_ts`, oldest first.
    async fn range(&self, start_ts: i64, end_ts_inclusive: i64) -> Result<Vec<Reading>>;

    /// Overwrite the last-known-value slot.
    fn save_latest(&self, reading: &Reading) -> Result<()>;

    /// Read the last-known-value slot.
    fn load_latest(&self) -> Result<Option<Reading>>;
}

/// Shared history handle.
pub type SharedHistory = Arc<dyn HistoryStore>;

/// Persist a reading without waiting for the write.
///
/// The append runs on its own task; a failure is logged and otherwise
/// ignored. Must be called from within a tokio runtime.
pub fn append_detached(history: &SharedHistory, reading: Reading) {
    let history = Arc::clone(history);
    tokio::spawn(async move {
        if let Err(e) = history.append(reading).await {
            tracing::warn!("Failed to persist reading at {}: {}", reading.timestamp, e);
        }
    });
}

/// In-memory [`HistoryStore`].
///
/// Readings are kept sorted by timestamp. With a capacity, the oldest
/// readings are evicted once it is exceeded.
#[derive(Debug, Default)]
pub struct MemoryHistory {
    readings: Mutex<VecDeque<Reading>>,
    latest: Mutex<Option<Reading>>,
    capacity: Option<usize>,
}

impl MemoryHistory {
    /// Create an unbounded store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store holding at most `capacity` readings.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity: Some(capacity),
            ..Self::default()
        }
    }

    /// Number of stored readings.
    pub fn len(&self) -> usize {
        lock(&self.readings).len()
    }

    /// Whether the log is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copy of every stored reading, oldest first.
    pub fn snapshot(&self) -> Vec<Reading> {
        lock(&self.readings).iter().copied().collect()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[async_trait]
impl HistoryStore for MemoryHistory {
    async fn append(&self, reading: Reading) -> Result<()> {
        let mut readings = lock(&self.readings);
        // Equal timestamps keep insertion order.
        let at = readings.partition_point(|r| r.timestamp <= reading.timestamp);
        readings.insert(at, reading);
        if let Some(capacity) = self.capacity {
            while readings.len() > capacity {
                readings.pop_front();
            }
        }
        Ok(())
    }

    async fn recent(&self, limit: usize) -> Result<Vec<Reading>> {
        let readings = lock(&self.readings);
        Ok(readings.iter().rev().take(limit).copied().collect())
    }

    async fn range(&self, start_ts: i64, end_ts_inclusive: i64) -> Result<Vec<Reading>> {
        let readings = lock(&self.readings);
        Ok(readings
            .iter()
            .filter(|r| r.timestamp >= start_ts && r.timestamp <= end_ts_inclusive)
            .copied()
            .collect())
    }

    fn save_latest(&self, reading: &Reading) -> Result<()> {
        *lock(&self.latest) = Some(*reading);
        Ok(())
    }

    fn load_latest(&self) -> Result<Option<Reading>> {
        Ok(*lock(&self.latest))
    }
}
