//! Session lifecycle tests driven by the mock device.
//!
//! All tests run on a paused tokio clock, so poll intervals and debounce
//! windows elapse instantly and deterministically.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::sleep;

use tankfill_core::{
    ConnectionFailureReason, DisconnectReason, Error, EventReceiver, HistoryStore, Listener,
    MemoryHistory, MockConnector, MockLink, PlatformCapabilities, Reading, ReadingBus, Result,
    SensorSession, SessionConfig, SessionEvent, SessionState, TankGeometry, TokioClock, Transport,
    listener,
};

const SERVICE: &str = "0000181a-0000-1000-8000-00805f9b34fb";
const CHARACTERISTIC: &str = "0x2A6F";

/// 550 mm, little-endian.
const HALF_FULL: [u8; 2] = [0x26, 0x02];

struct Harness {
    session: SensorSession,
    connector: Arc<MockConnector>,
    history: Arc<MemoryHistory>,
    readings: Arc<Mutex<Vec<Reading>>>,
    events: EventReceiver,
    _listener: Listener,
}

impl Harness {
    fn link(&self) -> &Arc<MockLink> {
        self.connector.link()
    }

    fn readings(&self) -> Vec<Reading> {
        self.readings.lock().unwrap().clone()
    }

    fn drain_events(&mut self) -> Vec<SessionEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.events.try_recv() {
            events.push(event);
        }
        events
    }
}

fn valid_config() -> SessionConfig {
    SessionConfig::default().gatt(SERVICE, CHARACTERISTIC)
}

fn harness_with(
    config: SessionConfig,
    connector: MockConnector,
    capabilities: PlatformCapabilities,
) -> Harness {
    let connector = Arc::new(connector);
    let history = Arc::new(MemoryHistory::new());
    let bus = ReadingBus::new();
    let readings = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&readings);
    let l = listener(move |r| sink.lock().unwrap().push(*r));
    bus.subscribe(&l);

    let session = SensorSession::new(
        config,
        connector.clone(),
        Arc::new(capabilities),
        history.clone(),
        bus,
        Arc::new(TokioClock::starting_at(1_700_000_000_000)),
    );
    let events = session.subscribe_events();
    Harness {
        session,
        connector,
        history,
        readings,
        events,
        _listener: l,
    }
}

fn harness(config: SessionConfig, link: MockLink) -> Harness {
    harness_with(
        config,
        MockConnector::new(Arc::new(link)),
        PlatformCapabilities::supported(),
    )
}

fn notify_link() -> MockLink {
    MockLink::builder().name("ShellyBLU Test").notify(true).build()
}

fn poll_link(value: &[u8]) -> MockLink {
    MockLink::builder()
        .name("ShellyBLU Test")
        .read(true)
        .read_value(value)
        .build()
}

/// Let spawned tasks run.
async fn settle() {
    sleep(Duration::from_millis(1)).await;
}

#[tokio::test(start_paused = true)]
async fn test_placeholder_ids_connect_without_data() {
    let mut h = harness(SessionConfig::default(), notify_link());

    h.session.connect_default().await.unwrap();
    assert_eq!(h.session.state(), SessionState::Active(None));
    assert!(h.session.state().is_degraded());
    assert_eq!(h.session.device_name().as_deref(), Some("ShellyBLU Test"));

    assert_eq!(h.link().push_notification(&HALF_FULL), 0);
    sleep(Duration::from_secs(5)).await;
    assert!(h.readings().is_empty());
    assert_eq!(h.link().subscribe_count(), 0);
    assert_eq!(h.link().read_count(), 0);

    let events = h.drain_events();
    assert!(
        events
            .iter()
            .any(|e| matches!(e, SessionEvent::ConfigWarning { .. }))
    );
    assert!(
        events
            .iter()
            .any(|e| matches!(e, SessionEvent::Connected { .. }))
    );
}

#[tokio::test(start_paused = true)]
async fn test_placeholder_ids_do_not_request_service() {
    let h = harness(SessionConfig::default(), notify_link());
    h.session.connect_default().await.unwrap();
    let filter = h.connector.last_filter().unwrap();
    assert_eq!(filter.name_prefix.as_deref(), Some("ShellyBLU"));
    assert!(filter.optional_services.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_notify_transport_emits_reading() {
    let h = harness(valid_config(), notify_link());

    h.session.connect_default().await.unwrap();
    assert_eq!(h.session.state(), SessionState::Active(Some(Transport::Notify)));
    assert_eq!(h.link().subscribe_count(), 1);

    assert_eq!(h.link().push_notification(&HALF_FULL), 1);
    settle().await;

    let readings = h.readings();
    assert_eq!(readings.len(), 1);
    assert_eq!(readings[0].distance_mm, 550.0);
    assert_eq!(readings[0].percent, 50.0);
    assert_eq!(h.history.load_latest().unwrap(), Some(readings[0]));
    assert_eq!(h.history.snapshot(), readings);
}

#[tokio::test(start_paused = true)]
async fn test_indicate_selects_notify() {
    let link = MockLink::builder().indicate(true).read(true).build();
    let h = harness(valid_config(), link);
    h.session.connect_default().await.unwrap();
    assert_eq!(h.session.state().transport(), Some(Transport::Notify));
}

#[tokio::test(start_paused = true)]
async fn test_notifications_are_throttled() {
    let h = harness(valid_config().debounce_ms(200), notify_link());
    h.session.connect_default().await.unwrap();

    for _ in 0..3 {
        h.link().push_notification(&HALF_FULL);
    }
    settle().await;
    assert_eq!(h.readings().len(), 1);

    sleep(Duration::from_millis(100)).await;
    h.link().push_notification(&HALF_FULL);
    settle().await;
    assert_eq!(h.readings().len(), 1);

    sleep(Duration::from_millis(100)).await;
    h.link().push_notification(&HALF_FULL);
    settle().await;
    assert_eq!(h.readings().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_readings_keep_acceptance_order() {
    let h = harness(valid_config().debounce_ms(0), notify_link());
    h.session.connect_default().await.unwrap();

    for mm in [100u16, 200, 300, 400] {
        h.link().push_notification(&mm.to_le_bytes());
    }
    settle().await;

    let distances: Vec<f64> = h.readings().iter().map(|r| r.distance_mm).collect();
    assert_eq!(distances, vec![100.0, 200.0, 300.0, 400.0]);
}

#[tokio::test(start_paused = true)]
async fn test_undecodable_notification_is_dropped() {
    let h = harness(valid_config(), notify_link());
    h.session.connect_default().await.unwrap();

    h.link().push_notification(&[0x01]);
    h.link().push_notification(&[]);
    settle().await;
    assert!(h.readings().is_empty());
    assert_eq!(h.history.load_latest().unwrap(), None);

    h.link().push_notification(&HALF_FULL);
    settle().await;
    assert_eq!(h.readings().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_poll_transport() {
    // 900 mm
    let h = harness(valid_config(), poll_link(&[0x84, 0x03]));

    h.session.connect_default().await.unwrap();
    assert_eq!(
        h.session.state(),
        SessionState::Active(Some(Transport::Poll {
            interval: Duration::from_millis(1000)
        }))
    );

    // First poll is immediate.
    settle().await;
    assert_eq!(h.link().read_count(), 1);
    assert_eq!(h.readings().len(), 1);
    assert!((h.readings()[0].percent - 100.0 / 9.0).abs() < 1e-9);

    sleep(Duration::from_millis(1_050)).await;
    assert_eq!(h.link().read_count(), 2);
    assert_eq!(h.readings().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_poll_interval_follows_debounce() {
    let h = harness(valid_config().debounce_ms(2_500), poll_link(&HALF_FULL));
    h.session.connect_default().await.unwrap();
    assert_eq!(
        h.session.state().transport(),
        Some(Transport::Poll {
            interval: Duration::from_millis(2_500)
        })
    );

    settle().await;
    sleep(Duration::from_millis(2_000)).await;
    assert_eq!(h.link().read_count(), 1);
    sleep(Duration::from_millis(600)).await;
    assert_eq!(h.link().read_count(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_poll_read_failure_keeps_polling() {
    let h = harness(valid_config(), poll_link(&HALF_FULL));
    h.link().set_fail_reads(true);
    h.session.connect_default().await.unwrap();
    settle().await;
    assert!(h.readings().is_empty());

    h.link().set_fail_reads(false);
    sleep(Duration::from_millis(1_050)).await;
    assert_eq!(h.readings().len(), 1);
    assert!(h.session.state().is_active());
}

#[tokio::test(start_paused = true)]
async fn test_poll_result_after_disconnect_is_discarded() {
    let h = harness(valid_config(), poll_link(&HALF_FULL));
    h.link().set_read_latency(Duration::from_millis(500));

    h.session.connect_default().await.unwrap();
    settle().await;
    assert_eq!(h.link().read_count(), 1);

    h.session.disconnect().await.unwrap();
    sleep(Duration::from_secs(3)).await;

    assert!(h.readings().is_empty());
    assert_eq!(h.link().read_count(), 1);
    assert_eq!(h.history.load_latest().unwrap(), None);
}

#[tokio::test(start_paused = true)]
async fn test_disconnect_is_idempotent() {
    let mut h = harness(valid_config(), notify_link());

    // Safe before anything was acquired.
    h.session.disconnect().await.unwrap();
    assert_eq!(h.session.state(), SessionState::Idle);

    h.session.connect_default().await.unwrap();
    h.session.disconnect().await.unwrap();
    assert_eq!(h.session.state(), SessionState::Disconnected);
    assert_eq!(h.link().unsubscribe_count(), 1);
    assert_eq!(h.link().disconnect_count(), 1);
    assert!(h.session.device_name().is_none());

    h.session.disconnect().await.unwrap();
    assert_eq!(h.link().unsubscribe_count(), 1);
    assert_eq!(h.link().disconnect_count(), 1);

    assert_eq!(h.link().push_notification(&HALF_FULL), 0);
    settle().await;
    assert!(h.readings().is_empty());

    let disconnects = h
        .drain_events()
        .into_iter()
        .filter(|e| matches!(e, SessionEvent::Disconnected { .. }))
        .count();
    assert_eq!(disconnects, 1);
}

#[tokio::test(start_paused = true)]
async fn test_link_loss_runs_teardown() {
    let mut h = harness(valid_config(), notify_link());
    h.session.connect_default().await.unwrap();

    h.link().drop_link();
    settle().await;

    assert_eq!(h.session.state(), SessionState::Disconnected);
    assert_eq!(h.link().disconnect_count(), 1);
    let events = h.drain_events();
    assert!(events.iter().any(|e| matches!(
        e,
        SessionEvent::Disconnected {
            reason: DisconnectReason::LinkLost,
            ..
        }
    )));

    // The operator's later disconnect finds nothing to do.
    h.session.disconnect().await.unwrap();
    assert_eq!(h.link().disconnect_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_reconnect_after_disconnect() {
    let mut h = harness(valid_config(), notify_link());
    h.session.connect_default().await.unwrap();
    h.session.disconnect().await.unwrap();
    h.drain_events();

    h.session.connect_default().await.unwrap();
    assert_eq!(h.session.state(), SessionState::Active(Some(Transport::Notify)));
    assert_eq!(h.connector.request_count(), 2);

    let states: Vec<SessionState> = h
        .drain_events()
        .into_iter()
        .filter_map(|e| match e {
            SessionEvent::StateChanged { state } => Some(state),
            _ => None,
        })
        .collect();
    assert_eq!(
        states,
        vec![
            SessionState::Idle,
            SessionState::Connecting,
            SessionState::Active(Some(Transport::Notify)),
        ]
    );

    h.link().push_notification(&HALF_FULL);
    settle().await;
    assert_eq!(h.readings().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_connect_while_active_is_noop() {
    let h = harness(valid_config(), notify_link());
    h.session.connect_default().await.unwrap();
    h.session.connect_default().await.unwrap();
    assert_eq!(h.connector.request_count(), 1);
    assert_eq!(h.link().subscribe_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_user_cancelled_returns_to_idle() {
    let h = harness_with(
        valid_config(),
        MockConnector::cancelled(),
        PlatformCapabilities::supported(),
    );
    let err = h.session.connect_default().await.unwrap_err();
    assert!(matches!(err, Error::UserCancelled));
    assert_eq!(h.session.state(), SessionState::Idle);
}

#[tokio::test(start_paused = true)]
async fn test_unsupported_platform_fails_fast() {
    let h = harness_with(
        valid_config(),
        MockConnector::new(Arc::new(notify_link())),
        PlatformCapabilities::unsupported(),
    );
    let err = h.session.connect_default().await.unwrap_err();
    assert!(matches!(err, Error::UnsupportedPlatform(_)));
    assert_eq!(h.connector.request_count(), 0);
    assert_eq!(h.session.state(), SessionState::Idle);
}

#[tokio::test(start_paused = true)]
async fn test_ios_safari_is_unsupported() {
    let h = harness_with(
        valid_config(),
        MockConnector::new(Arc::new(notify_link())),
        PlatformCapabilities {
            bluetooth: true,
            ios_safari: true,
        },
    );
    let err = h.session.connect_default().await.unwrap_err();
    assert!(matches!(err, Error::UnsupportedPlatform(_)));
    assert_eq!(h.connector.request_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_invalid_geometry_fails_before_radio() {
    let config = valid_config().geometry(TankGeometry::new(1000.0, 100.0));
    let h = harness(config, notify_link());
    let err = h.session.connect_default().await.unwrap_err();
    assert!(matches!(err, Error::InvalidGeometry(_)));
    assert_eq!(h.connector.request_count(), 0);
    assert_eq!(h.session.state(), SessionState::Idle);
}

#[tokio::test(start_paused = true)]
async fn test_gatt_failure_returns_to_idle() {
    let link = MockLink::builder()
        .notify(true)
        .fail_find(ConnectionFailureReason::CharacteristicNotFound(
            CHARACTERISTIC.into(),
        ))
        .build();
    let h = harness(valid_config(), link);

    let err = h.session.connect_default().await.unwrap_err();
    assert!(err.is_connection_error());
    assert_eq!(h.session.state(), SessionState::Idle);
    assert_eq!(h.link().disconnect_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_no_matching_device() {
    let h = harness_with(
        valid_config(),
        MockConnector::failing(ConnectionFailureReason::NoMatchingDevice),
        PlatformCapabilities::supported(),
    );
    let err = h.session.connect_default().await.unwrap_err();
    assert!(err.is_connection_error());
    assert_eq!(h.session.state(), SessionState::Idle);
}

#[tokio::test(start_paused = true)]
async fn test_disconnect_while_connecting() {
    let h = harness_with(
        valid_config(),
        MockConnector::new(Arc::new(notify_link())).with_latency(Duration::from_secs(5)),
        PlatformCapabilities::supported(),
    );

    let (result, _) = tokio::join!(h.session.connect_default(), async {
        sleep(Duration::from_millis(100)).await;
        assert_eq!(h.session.state(), SessionState::Connecting);
        h.session.disconnect().await
    });

    assert!(matches!(result, Err(Error::UserCancelled)));
    assert_eq!(h.session.state(), SessionState::Disconnected);
    assert!(h.readings().is_empty());
}

fn slow_harness() -> Harness {
    harness_with(
        valid_config(),
        MockConnector::new(Arc::new(notify_link())).with_latency(Duration::from_secs(5)),
        PlatformCapabilities::supported(),
    )
}

#[tokio::test(start_paused = true)]
async fn test_abandoned_connect_returns_to_idle() {
    let h = slow_harness();

    let timed_out =
        tokio::time::timeout(Duration::from_millis(100), h.session.connect_default()).await;
    assert!(timed_out.is_err());
    assert_eq!(h.session.state(), SessionState::Idle);

    h.session.disconnect().await.unwrap();
    h.session.connect_default().await.unwrap();
    assert_eq!(h.connector.request_count(), 2);
    assert_eq!(h.session.state(), SessionState::Active(Some(Transport::Notify)));
}

#[tokio::test(start_paused = true)]
async fn test_disconnect_settles_pending_connect_at_once() {
    let h = slow_harness();

    let connect = h.session.connect_default();
    tokio::pin!(connect);
    assert!(
        tokio::time::timeout(Duration::from_millis(100), &mut connect)
            .await
            .is_err()
    );
    assert_eq!(h.session.state(), SessionState::Connecting);

    h.session.disconnect().await.unwrap();
    assert_eq!(h.session.state(), SessionState::Disconnected);

    assert!(matches!(connect.await, Err(Error::UserCancelled)));
    assert_eq!(h.session.state(), SessionState::Disconnected);

    h.session.connect_default().await.unwrap();
    assert_eq!(h.connector.request_count(), 2);
    assert_eq!(h.session.state(), SessionState::Active(Some(Transport::Notify)));
}

#[tokio::test(start_paused = true)]
async fn test_panicking_listener_does_not_stop_delivery() {
    let h = harness(valid_config(), notify_link());
    let bad = listener(|_| panic!("listener failure"));
    h.session.bus().subscribe(&bad);

    h.session.connect_default().await.unwrap();
    h.link().push_notification(&HALF_FULL);
    settle().await;

    assert_eq!(h.readings().len(), 1);
    assert!(h.session.state().is_active());
}

/// History whose writes always fail.
struct BrokenHistory;

#[async_trait]
impl HistoryStore for BrokenHistory {
    async fn append(&self, _reading: Reading) -> Result<()> {
        Err(Error::storage(std::io::Error::other("disk full")))
    }

    async fn recent(&self, _limit: usize) -> Result<Vec<Reading>> {
        Ok(Vec::new())
    }

    async fn range(&self, _start_ts: i64, _end_ts_inclusive: i64) -> Result<Vec<Reading>> {
        Ok(Vec::new())
    }

    fn save_latest(&self, _reading: &Reading) -> Result<()> {
        Err(Error::storage(std::io::Error::other("quota exceeded")))
    }

    fn load_latest(&self) -> Result<Option<Reading>> {
        Ok(None)
    }
}

#[tokio::test(start_paused = true)]
async fn test_storage_failure_does_not_block_emission() {
    let bus = ReadingBus::new();
    let seen = Arc::new(Mutex::new(0usize));
    let sink = Arc::clone(&seen);
    let l = listener(move |_| *sink.lock().unwrap() += 1);
    bus.subscribe(&l);

    let connector = Arc::new(MockConnector::new(Arc::new(notify_link())));
    let session = SensorSession::new(
        valid_config(),
        connector.clone(),
        Arc::new(PlatformCapabilities::supported()),
        Arc::new(BrokenHistory),
        bus,
        Arc::new(TokioClock::new()),
    );

    session.connect_default().await.unwrap();
    connector.link().push_notification(&HALF_FULL);
    settle().await;
    assert_eq!(*seen.lock().unwrap(), 1);
    assert!(session.state().is_active());
}
