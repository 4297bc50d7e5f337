//! Synthetic source and history seeding, end to end with a memory store.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::time::sleep;

use tankfill_core::{
    HistoryStore, ManualClock, MemoryHistory, Reading, ReadingBus, SeedOptions, SyntheticOptions,
    SyntheticSource, TankGeometry, TokioClock, listener, seed_history,
};

fn source(history: Arc<MemoryHistory>) -> SyntheticSource {
    SyntheticSource::new(
        TankGeometry::default(),
        Duration::from_millis(200),
        history,
        Arc::new(TokioClock::starting_at(1_700_000_000_000)),
    )
    .unwrap()
}

#[tokio::test(start_paused = true)]
async fn test_ticks_stay_within_geometry() {
    let history = Arc::new(MemoryHistory::new());
    let source = source(history.clone());
    let seen = Arc::new(Mutex::new(Vec::<Reading>::new()));
    let sink = Arc::clone(&seen);

    assert!(source.start(
        listener(move |r| sink.lock().unwrap().push(*r)),
        SyntheticOptions {
            interval: Duration::from_secs(1),
        },
    ));

    // Nothing before the first interval elapses.
    sleep(Duration::from_millis(500)).await;
    assert!(seen.lock().unwrap().is_empty());

    sleep(Duration::from_millis(10_000)).await;
    let readings = seen.lock().unwrap().clone();
    assert_eq!(readings.len(), 10);
    assert_eq!(source.ticks(), 10);

    let geometry = TankGeometry::default();
    for reading in &readings {
        assert!(geometry.contains(reading.distance_mm));
        assert!((0.0..=100.0).contains(&reading.percent));
    }
    for pair in readings.windows(2) {
        assert_eq!(pair[1].timestamp - pair[0].timestamp, 1_000);
    }

    assert!(source.stop());
    assert_eq!(history.load_latest().unwrap(), readings.last().copied());
    assert_eq!(history.len(), 10);
}

#[tokio::test(start_paused = true)]
async fn test_stop_twice_ends_ticks() {
    let history = Arc::new(MemoryHistory::new());
    let source = source(history);
    let bus = ReadingBus::new();
    let count = Arc::new(Mutex::new(0usize));
    let sink = Arc::clone(&count);
    let counter = listener(move |_| *sink.lock().unwrap() += 1);
    bus.subscribe(&counter);

    let publish = bus.clone();
    source.start(
        listener(move |r| {
            publish.publish(r);
        }),
        SyntheticOptions::default(),
    );
    sleep(Duration::from_millis(3_500)).await;
    assert_eq!(*count.lock().unwrap(), 3);

    assert!(source.stop());
    assert!(!source.stop());
    assert!(!source.is_running());

    sleep(Duration::from_secs(10)).await;
    assert_eq!(*count.lock().unwrap(), 3);
    assert_eq!(source.ticks(), 3);
}

#[tokio::test(start_paused = true)]
async fn test_start_while_running_is_rejected() {
    let source = source(Arc::new(MemoryHistory::new()));
    assert!(source.start(listener(|_| {}), SyntheticOptions::default()));
    assert!(!source.start(listener(|_| {}), SyntheticOptions::default()));
    source.stop();
}

#[tokio::test(start_paused = true)]
async fn test_restart_after_stop() {
    let source = source(Arc::new(MemoryHistory::new()));
    source.start(listener(|_| {}), SyntheticOptions::default());
    sleep(Duration::from_millis(1_500)).await;
    source.stop();
    assert_eq!(source.ticks(), 1);

    assert!(source.start(listener(|_| {}), SyntheticOptions::default()));
    sleep(Duration::from_millis(2_500)).await;
    assert_eq!(source.ticks(), 3);
    source.stop();
}

#[tokio::test]
async fn test_seed_then_query() {
    let history = MemoryHistory::new();
    let clock = ManualClock::new(1_700_000_000_000);
    let written = seed_history(
        &history,
        &TankGeometry::default(),
        &clock,
        SeedOptions {
            hours: 2.0,
            samples_per_hour: 6,
        },
    )
    .await
    .unwrap();
    assert_eq!(written, 12);

    let recent = history.recent(3).await.unwrap();
    assert_eq!(recent.len(), 3);
    assert!(recent[0].timestamp > recent[1].timestamp);
    assert_eq!(recent[0].timestamp, 1_700_000_000_000 - 600_000);

    let all = history
        .range(0, 1_700_000_000_000)
        .await
        .unwrap();
    assert_eq!(all.len(), 12);
    assert!(history.load_latest().unwrap().is_none());
}
