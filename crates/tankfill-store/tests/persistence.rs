//! On-disk behaviour of the SQLite history.

use std::fs;

use tankfill_core::{HistoryStore, ManualClock, SeedOptions, TankGeometry, seed_history};
use tankfill_store::{Store, open_history};
use tankfill_types::Reading;
use tempfile::TempDir;

#[test]
fn test_readings_survive_reopen() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("nested").join("history.db");

    {
        let store = Store::open(&path).unwrap();
        store.insert(&Reading::new(1_000, 550.0, 50.0)).unwrap();
        store.set_latest(&Reading::new(1_000, 550.0, 50.0)).unwrap();
        assert_eq!(store.path(), Some(path.as_path()));
    }

    let store = Store::open(&path).unwrap();
    assert_eq!(store.count().unwrap(), 1);
    assert_eq!(
        store.latest().unwrap(),
        Some(Reading::new(1_000, 550.0, 50.0))
    );
}

#[tokio::test]
async fn test_open_history_uses_sqlite() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("history.db");

    let history = open_history(&path);
    history.append(Reading::new(5, 100.0, 100.0)).await.unwrap();
    drop(history);

    let store = Store::open(&path).unwrap();
    assert_eq!(store.count().unwrap(), 1);
}

#[tokio::test]
async fn test_open_history_falls_back_to_memory() {
    let dir = TempDir::new().unwrap();
    let blocker = dir.path().join("not-a-directory");
    fs::write(&blocker, b"occupied").unwrap();
    let path = blocker.join("history.db");

    assert!(Store::open(&path).is_err());

    let history = open_history(&path);
    history.append(Reading::new(2, 200.0, 80.0)).await.unwrap();
    history.append(Reading::new(1, 300.0, 70.0)).await.unwrap();
    history.save_latest(&Reading::new(2, 200.0, 80.0)).unwrap();

    let recent = history.recent(10).await.unwrap();
    assert_eq!(recent[0].timestamp, 2);
    assert_eq!(history.range(0, 2).await.unwrap()[0].timestamp, 1);
    assert_eq!(history.load_latest().unwrap().map(|r| r.timestamp), Some(2));
}

#[tokio::test]
async fn test_seed_into_sqlite() {
    let store = Store::open_in_memory().unwrap();
    let clock = ManualClock::new(1_700_000_000_000);
    let written = seed_history(
        &store,
        &TankGeometry::default(),
        &clock,
        SeedOptions::default(),
    )
    .await
    .unwrap();
    assert_eq!(written, 72);

    let stats = store.stats().unwrap();
    assert_eq!(stats.count, 72);
    assert_eq!(stats.newest_ts, Some(1_700_000_000_000 - 300_000));
    assert!(stats.min_percent.unwrap() >= 0.0);
    assert!(stats.max_percent.unwrap() <= 100.0);
    assert!(store.latest().unwrap().is_none());
}
