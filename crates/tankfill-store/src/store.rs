//! Main store implementation.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use rusqlite::{Connection, OptionalExtension, Row, params};
use serde::Serialize;
use time::format_description::well_known::Rfc3339;
use tracing::{debug, info};

use tankfill_core::HistoryStore;
use tankfill_types::Reading;

use crate::error::{Error, Result};
use crate::schema;

/// SQLite-backed reading history.
///
/// Implements [`HistoryStore`], so a session or synthetic source can
/// persist into it directly.
pub struct Store {
    conn: Mutex<Connection>,
    path: Option<PathBuf>,
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store").field("path", &self.path).finish()
    }
}

/// Summary of the stored history.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct HistoryStats {
    /// Number of stored readings.
    pub count: u64,
    /// Timestamp of the oldest reading.
    pub oldest_ts: Option<i64>,
    /// Timestamp of the newest reading.
    pub newest_ts: Option<i64>,
    /// Lowest fill percentage.
    pub min_percent: Option<f64>,
    /// Highest fill percentage.
    pub max_percent: Option<f64>,
    /// Mean fill percentage.
    pub avg_percent: Option<f64>,
}

#[derive(Serialize)]
struct CsvRow {
    timestamp: i64,
    time: String,
    distance_mm: f64,
    percent: f64,
}

impl Store {
    /// Open or create a database at the given path.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
            && !parent.is_dir()
        {
            std::fs::create_dir_all(parent).map_err(|e| Error::CreateDirectory {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }

        info!("Opening database at {}", path.display());
        let conn = Connection::open(path)?;
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;",
        )?;
        schema::initialize(&conn)?;

        Ok(Self {
            conn: Mutex::new(conn),
            path: Some(path.to_path_buf()),
        })
    }

    /// Open the default database location.
    pub fn open_default() -> Result<Self> {
        Self::open(crate::default_db_path())
    }

    /// Open an in-memory database (for testing).
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        schema::initialize(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
            path: None,
        })
    }

    /// Database file path, `None` when in memory.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

// Reading operations
impl Store {
    /// Insert a reading. Returns its row id.
    pub fn insert(&self, reading: &Reading) -> Result<i64> {
        let conn = self.conn();
        conn.execute(
            "INSERT INTO readings (ts, distance_mm, percent) VALUES (?1, ?2, ?3)",
            params![reading.timestamp, reading.distance_mm, reading.percent],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// The `limit` newest readings, newest first.
    pub fn recent_readings(&self, limit: usize) -> Result<Vec<Reading>> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT ts, distance_mm, percent FROM readings
             ORDER BY ts DESC, id DESC LIMIT ?",
        )?;
        let readings = stmt
            .query_map([limit], reading_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(readings)
    }

    /// Readings with `start_ts <= ts <= end_ts`, oldest first.
    pub fn readings_between(&self, start_ts: i64, end_ts: i64) -> Result<Vec<Reading>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT ts, distance_mm, percent FROM readings
             WHERE ts >= ?1 AND ts <= ?2
             ORDER BY ts ASC, id ASC",
        )?;
        let readings = stmt
            .query_map([start_ts, end_ts], reading_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        debug!(
            "Loaded {} readings between {} and {}",
            readings.len(),
            start_ts,
            end_ts
        );
        Ok(readings)
    }

    /// Number of stored readings.
    pub fn count(&self) -> Result<u64> {
        let count: i64 = self
            .conn()
            .query_row("SELECT COUNT(*) FROM readings", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    /// Delete readings older than `ts`. Returns how many were removed.
    pub fn prune_before(&self, ts: i64) -> Result<usize> {
        let removed = self
            .conn()
            .execute("DELETE FROM readings WHERE ts < ?", [ts])?;
        if removed > 0 {
            info!("Pruned {} readings older than {}", removed, ts);
        }
        Ok(removed)
    }

    /// Summary statistics over all readings.
    pub fn stats(&self) -> Result<HistoryStats> {
        let stats = self.conn().query_row(
            "SELECT COUNT(*), MIN(ts), MAX(ts), MIN(percent), MAX(percent), AVG(percent)
             FROM readings",
            [],
            |row| {
                Ok(HistoryStats {
                    count: row.get::<_, i64>(0)? as u64,
                    oldest_ts: row.get(1)?,
                    newest_ts: row.get(2)?,
                    min_percent: row.get(3)?,
                    max_percent: row.get(4)?,
                    avg_percent: row.get(5)?,
                })
            },
        )?;
        Ok(stats)
    }

    /// Write every reading, oldest first, as CSV. Returns the row count.
    ///
    /// Columns: `timestamp` (ms), `time` (RFC 3339), `distance_mm`, `percent`.
    pub fn export_csv<W: Write>(&self, writer: W) -> Result<usize> {
        let readings = self.readings_between(i64::MIN, i64::MAX)?;
        let mut csv = csv::Writer::from_writer(writer);
        for reading in &readings {
            let time = reading
                .captured_at()
                .and_then(|t| t.format(&Rfc3339).ok())
                .unwrap_or_default();
            csv.serialize(CsvRow {
                timestamp: reading.timestamp,
                time,
                distance_mm: reading.distance_mm,
                percent: reading.percent,
            })?;
        }
        csv.flush()?;
        Ok(readings.len())
    }
}

// Last-known-value slot
impl Store {
    /// Replace the last-known reading.
    pub fn set_latest(&self, reading: &Reading) -> Result<()> {
        self.conn().execute(
            "INSERT INTO latest (id, ts, distance_mm, percent) VALUES (1, ?1, ?2, ?3)
             ON CONFLICT(id) DO UPDATE SET
                ts = excluded.ts,
                distance_mm = excluded.distance_mm,
                percent = excluded.percent",
            params![reading.timestamp, reading.distance_mm, reading.percent],
        )?;
        Ok(())
    }

    /// The last-known reading, if one was saved.
    pub fn latest(&self) -> Result<Option<Reading>> {
        let reading = self
            .conn()
            .query_row(
                "SELECT ts, distance_mm, percent FROM latest WHERE id = 1",
                [],
                reading_from_row,
            )
            .optional()?;
        Ok(reading)
    }
}

#[async_trait]
impl HistoryStore for Store {
    async fn append(&self, reading: Reading) -> tankfill_core::Result<()> {
        self.insert(&reading)?;
        Ok(())
    }

    async fn recent(&self, limit: usize) -> tankfill_core::Result<Vec<Reading>> {
        Ok(self.recent_readings(limit)?)
    }

    async fn range(
        &self,
        start_ts: i64,
        end_ts_inclusive: i64,
    ) -> tankfill_core::Result<Vec<Reading>> {
        Ok(self.readings_between(start_ts, end_ts_inclusive)?)
    }

    fn save_latest(&self, reading: &Reading) -> tankfill_core::Result<()> {
        Ok(self.set_latest(reading)?)
    }

    fn load_latest(&self) -> tankfill_core::Result<Option<Reading>> {
        Ok(self.latest()?)
    }
}

fn reading_from_row(row: &Row<'_>) -> rusqlite::Result<Reading> {
    Ok(Reading::new(row.get(0)?, row.get(1)?, row.get(2)?))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn r(ts: i64, percent: f64) -> Reading {
        Reading::new(ts, 1000.0 - percent * 9.0, percent)
    }

    #[test]
    fn test_open_in_memory() {
        let store = Store::open_in_memory().unwrap();
        assert_eq!(store.count().unwrap(), 0);
        assert!(store.path().is_none());
        assert!(store.latest().unwrap().is_none());
    }

    #[test]
    fn test_recent_is_newest_first() {
        let store = Store::open_in_memory().unwrap();
        for ts in [3, 1, 2, 5, 4] {
            store.insert(&r(ts, 10.0)).unwrap();
        }
        let ts: Vec<i64> = store
            .recent_readings(3)
            .unwrap()
            .iter()
            .map(|r| r.timestamp)
            .collect();
        assert_eq!(ts, vec![5, 4, 3]);
    }

    #[test]
    fn test_range_is_inclusive_and_ascending() {
        let store = Store::open_in_memory().unwrap();
        for ts in [10, 40, 20, 30, 50] {
            store.insert(&r(ts, 10.0)).unwrap();
        }
        let ts: Vec<i64> = store
            .readings_between(20, 40)
            .unwrap()
            .iter()
            .map(|r| r.timestamp)
            .collect();
        assert_eq!(ts, vec![20, 30, 40]);
        assert!(store.readings_between(41, 49).unwrap().is_empty());
    }

    #[test]
    fn test_equal_timestamps_keep_insertion_order() {
        let store = Store::open_in_memory().unwrap();
        store.insert(&r(7, 1.0)).unwrap();
        store.insert(&r(7, 2.0)).unwrap();
        let range = store.readings_between(0, 10).unwrap();
        assert_eq!(range[0].percent, 1.0);
        assert_eq!(range[1].percent, 2.0);
        let recent = store.recent_readings(2).unwrap();
        assert_eq!(recent[0].percent, 2.0);
    }

    #[test]
    fn test_values_round_trip_exactly() {
        let store = Store::open_in_memory().unwrap();
        let reading = Reading::new(1_700_000_000_123, 433.3, 62.966_666_666_666_67);
        store.insert(&reading).unwrap();
        assert_eq!(store.recent_readings(1).unwrap(), vec![reading]);
    }

    #[test]
    fn test_latest_slot_is_replaced() {
        let store = Store::open_in_memory().unwrap();
        store.set_latest(&r(1, 10.0)).unwrap();
        store.set_latest(&r(2, 20.0)).unwrap();
        assert_eq!(store.latest().unwrap(), Some(r(2, 20.0)));
        // The slot is independent of the history table.
        assert_eq!(store.count().unwrap(), 0);
    }

    #[test]
    fn test_prune_before() {
        let store = Store::open_in_memory().unwrap();
        for ts in 1..=10 {
            store.insert(&r(ts, 10.0)).unwrap();
        }
        assert_eq!(store.prune_before(6).unwrap(), 5);
        assert_eq!(store.count().unwrap(), 5);
        assert_eq!(store.prune_before(6).unwrap(), 0);
    }

    #[test]
    fn test_stats() {
        let store = Store::open_in_memory().unwrap();
        let empty = store.stats().unwrap();
        assert_eq!(empty.count, 0);
        assert_eq!(empty.oldest_ts, None);
        assert_eq!(empty.avg_percent, None);

        store.insert(&r(100, 20.0)).unwrap();
        store.insert(&r(300, 60.0)).unwrap();
        let stats = store.stats().unwrap();
        assert_eq!(stats.count, 2);
        assert_eq!(stats.oldest_ts, Some(100));
        assert_eq!(stats.newest_ts, Some(300));
        assert_eq!(stats.min_percent, Some(20.0));
        assert_eq!(stats.max_percent, Some(60.0));
        assert_eq!(stats.avg_percent, Some(40.0));
    }

    #[test]
    fn test_export_csv() {
        let store = Store::open_in_memory().unwrap();
        store.insert(&Reading::new(1_000, 550.0, 50.0)).unwrap();
        store.insert(&Reading::new(0, 1000.0, 0.0)).unwrap();

        let mut out = Vec::new();
        assert_eq!(store.export_csv(&mut out).unwrap(), 2);
        let text = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "timestamp,time,distance_mm,percent");
        assert_eq!(lines[1], "0,1970-01-01T00:00:00Z,1000.0,0.0");
        assert_eq!(lines[2], "1000,1970-01-01T00:00:01Z,550.0,50.0");
    }

    #[tokio::test]
    async fn test_history_store_trait() {
        let store = Store::open_in_memory().unwrap();
        let history: &dyn HistoryStore = &store;
        history.append(r(1, 10.0)).await.unwrap();
        history.append(r(2, 20.0)).await.unwrap();
        history.save_latest(&r(2, 20.0)).unwrap();

        assert_eq!(history.recent(1).await.unwrap(), vec![r(2, 20.0)]);
        assert_eq!(history.range(1, 2).await.unwrap().len(), 2);
        assert_eq!(history.load_latest().unwrap(), Some(r(2, 20.0)));
    }
}
