//! Sensor connection lifecycle.
//!
//! A [`SensorSession`] moves through
//! `Idle -> Connecting -> Active -> Disconnected -> Idle`. On connect it
//! picks a data transport once:
//!
//! - [`Transport::Notify`] when the characteristic can notify or indicate
//! - [`Transport::Poll`] otherwise, reading every
//!   [`SessionConfig::poll_interval`] with an immediate first read
//! - none at all when the GATT identifiers are unset; the session is then
//!   active but silent and emits [`SessionEvent::ConfigWarning`]
//!
//! Operator disconnects and link loss run the same teardown, which is safe
//! to call any number of times from any state.
//!
//! The session is not `Clone`. An application owns one and therefore never
//! has two transports producing readings at once.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use futures::StreamExt;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use tankfill_types::{SessionState, Transport};

use crate::bus::ReadingBus;
use crate::clock::SharedClock;
use crate::config::SessionConfig;
use crate::error::{Error, Result};
use crate::events::{DisconnectReason, EventDispatcher, EventReceiver, SessionEvent};
use crate::history::SharedHistory;
use crate::pipeline::Pipeline;
use crate::platform::CapabilityOracle;
use crate::traits::{CharacteristicId, Connector, DeviceFilter, PayloadStream, SensorLink};

type SharedPipeline = Arc<Mutex<Pipeline>>;

/// One sensor connection and its data transport.
pub struct SensorSession {
    config: SessionConfig,
    connector: Arc<dyn Connector>,
    capabilities: Arc<dyn CapabilityOracle>,
    history: SharedHistory,
    bus: ReadingBus,
    clock: SharedClock,
    shared: Arc<Shared>,
}

impl std::fmt::Debug for SensorSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SensorSession")
            .field("state", &self.state())
            .field("device", &self.device_name())
            .finish_non_exhaustive()
    }
}

/// State reachable from background tasks.
struct Shared {
    inner: Mutex<Inner>,
    events: EventDispatcher,
}

#[derive(Default)]
struct Inner {
    state: SessionState,
    active: Option<ActiveConnection>,
    /// Cancels an in-flight connect.
    pending: Option<CancellationToken>,
    /// Bumped by every connect attempt.
    attempt: u64,
    generation: u64,
}

struct ActiveConnection {
    link: Arc<dyn SensorLink>,
    characteristic: Option<CharacteristicId>,
    transport: Option<Transport>,
    cancel: CancellationToken,
    device: Option<String>,
    generation: u64,
}

/// How the data characteristic will be read, decided before going active.
enum Plan {
    Silent,
    Notify(CharacteristicId, PayloadStream),
    Poll(CharacteristicId, Duration),
}

impl SensorSession {
    /// Create an idle session.
    pub fn new(
        config: SessionConfig,
        connector: Arc<dyn Connector>,
        capabilities: Arc<dyn CapabilityOracle>,
        history: SharedHistory,
        bus: ReadingBus,
        clock: SharedClock,
    ) -> Self {
        Self {
            config,
            connector,
            capabilities,
            history,
            bus,
            clock,
            shared: Arc::new(Shared {
                inner: Mutex::new(Inner::default()),
                events: EventDispatcher::default(),
            }),
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> SessionState {
        self.shared.lock().state
    }

    /// Name of the connected device, if any.
    pub fn device_name(&self) -> Option<String> {
        self.shared
            .lock()
            .active
            .as_ref()
            .and_then(|a| a.device.clone())
    }

    /// The session configuration.
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// The bus readings are published on.
    pub fn bus(&self) -> &ReadingBus {
        &self.bus
    }

    /// Receive lifecycle events.
    pub fn subscribe_events(&self) -> EventReceiver {
        self.shared.events.subscribe()
    }

    /// Connect the configured filter's device.
    ///
    /// See [`connect`](Self::connect).
    pub async fn connect_default(&self) -> Result<()> {
        let filter = self.config.device_filter();
        self.connect(&filter).await
    }

    /// Select a device and start receiving readings from it.
    ///
    /// Returns `Ok(())` without doing anything if the session is already
    /// connecting or active.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidGeometry`], [`Error::Decode`] for a bad payload
    ///   layout or [`Error::InvalidConfig`] before any radio work if the
    ///   configuration cannot produce readings
    /// - [`Error::UnsupportedPlatform`] if the host has no usable Bluetooth
    /// - [`Error::UserCancelled`] if device selection was dismissed, or the
    ///   session was disconnected while connecting
    /// - a connection error if GATT setup failed
    ///
    /// On error the session is back in `Idle` (or `Disconnected` when a
    /// concurrent [`disconnect`](Self::disconnect) cancelled the attempt).
    /// Dropping the returned future mid-attempt also returns to `Idle`.
    #[tracing::instrument(level = "info", skip_all, fields(prefix = ?filter.name_prefix))]
    pub async fn connect(&self, filter: &DeviceFilter) -> Result<()> {
        // Validates the configuration.
        let pipeline: SharedPipeline = Arc::new(Mutex::new(Pipeline::new(
            &self.config,
            Arc::clone(&self.clock),
            Arc::clone(&self.history),
            self.bus.clone(),
        )?));

        if self.capabilities.is_platform_ios_safari() {
            return Err(Error::unsupported(
                "iOS Safari does not expose Web Bluetooth",
            ));
        }
        if !self.capabilities.is_bluetooth_supported() {
            return Err(Error::unsupported("no usable Bluetooth adapter"));
        }

        let pending = CancellationToken::new();
        let attempt = {
            let mut inner = self.shared.lock();
            match inner.state {
                SessionState::Connecting | SessionState::Active(_) => {
                    debug!("Already {}; ignoring connect", inner.state);
                    return Ok(());
                }
                SessionState::Disconnected => {
                    self.shared.set_state(&mut inner, SessionState::Idle);
                }
                SessionState::Idle => {}
            }
            inner.pending = Some(pending.clone());
            inner.attempt += 1;
            self.shared.set_state(&mut inner, SessionState::Connecting);
            ConnectAttempt {
                shared: Arc::clone(&self.shared),
                pending: pending.clone(),
                id: inner.attempt,
                settled: false,
            }
        };

        let link = tokio::select! {
            biased;
            _ = pending.cancelled() => Err(Error::UserCancelled),
            result = self.connector.request_device(filter) => result,
        };
        let link = match link {
            Ok(link) => link,
            Err(e) => {
                attempt.abort();
                return Err(e);
            }
        };

        let plan = tokio::select! {
            biased;
            _ = pending.cancelled() => Err(Error::UserCancelled),
            result = self.plan_transport(link.as_ref()) => result,
        };
        let plan = match plan {
            Ok(plan) => plan,
            Err(e) => {
                if let Err(close) = link.disconnect().await {
                    debug!("Disconnect after failed setup: {}", close);
                }
                attempt.abort();
                return Err(e);
            }
        };

        self.activate(link, plan, pipeline, attempt).await
    }

    /// Tear down the connection.
    ///
    /// Safe from any state and idempotent. Cancels an in-flight connect.
    pub async fn disconnect(&self) -> Result<()> {
        let cancelled_pending = {
            let mut inner = self.shared.lock();
            match inner.pending.take() {
                Some(token) => {
                    token.cancel();
                    if inner.active.is_none() {
                        self.shared.set_state(&mut inner, SessionState::Disconnected);
                    }
                    true
                }
                None => false,
            }
        };
        if cancelled_pending {
            info!("Cancelled connection attempt");
        }
        teardown(&self.shared, DisconnectReason::UserRequested, None).await;
        Ok(())
    }

    async fn plan_transport(&self, link: &dyn SensorLink) -> Result<Plan> {
        let Some(id) = self.config.data_characteristic() else {
            return Ok(Plan::Silent);
        };
        let properties = link.find_characteristic(&id).await?;
        if properties.can_push() {
            let stream = link.subscribe(&id).await?;
            Ok(Plan::Notify(id, stream))
        } else {
            Ok(Plan::Poll(id, self.config.poll_interval()))
        }
    }

    async fn activate(
        &self,
        link: Arc<dyn SensorLink>,
        plan: Plan,
        pipeline: SharedPipeline,
        attempt: ConnectAttempt,
    ) -> Result<()> {
        let device = link.name();
        let cancel = CancellationToken::new();

        let armed = {
            let mut inner = self.shared.lock();
            if attempt.pending.is_cancelled() || inner.attempt != attempt.id {
                None
            } else {
                inner.pending = None;
                inner.generation += 1;
                let generation = inner.generation;

                let (transport, characteristic) = match plan {
                    Plan::Silent => (None, None),
                    Plan::Notify(id, stream) => {
                        spawn_notify_loop(stream, Arc::clone(&pipeline), cancel.clone());
                        (Some(Transport::Notify), Some(id))
                    }
                    Plan::Poll(id, interval) => {
                        spawn_poll_loop(
                            Arc::clone(&link),
                            id,
                            interval,
                            Arc::clone(&pipeline),
                            cancel.clone(),
                        );
                        (Some(Transport::Poll { interval }), Some(id))
                    }
                };

                inner.active = Some(ActiveConnection {
                    link: Arc::clone(&link),
                    characteristic,
                    transport,
                    cancel: cancel.clone(),
                    device: device.clone(),
                    generation,
                });
                self.shared
                    .set_state(&mut inner, SessionState::Active(transport));
                Some((transport, characteristic, generation))
            }
        };
        let Some((transport, characteristic, generation)) = armed else {
            if let Err(e) = link.disconnect().await {
                debug!("Disconnect after cancelled connect: {}", e);
            }
            attempt.abort();
            return Err(Error::UserCancelled);
        };
        attempt.complete();

        spawn_link_watcher(Arc::clone(&self.shared), link, cancel, generation);

        let name = device.unwrap_or_else(|| "unnamed device".to_string());
        self.shared.events.send(SessionEvent::Connected {
            device: name.clone(),
        });
        match (transport, characteristic) {
            (Some(transport), Some(id)) => {
                info!("Connected to {}; receiving {} via {}", name, id, transport);
            }
            _ => {
                let warnings = self.config.warnings();
                let message = if warnings.is_empty() {
                    "GATT identifiers are not configured; no data will be received".to_string()
                } else {
                    warnings.join("; ")
                };
                warn!("Connected to {} without a data transport: {}", name, message);
                self.shared
                    .events
                    .send(SessionEvent::ConfigWarning { message });
            }
        }
        Ok(())
    }
}

impl Drop for SensorSession {
    fn drop(&mut self) {
        let mut inner = self.shared.lock();
        if let Some(token) = inner.pending.take() {
            token.cancel();
        }
        if let Some(active) = inner.active.take() {
            warn!(
                device = ?active.device,
                "SensorSession dropped while connected - call disconnect() for a clean teardown"
            );
            active.cancel.cancel();
            let link = active.link;
            if let Ok(handle) = tokio::runtime::Handle::try_current() {
                handle.spawn(async move {
                    if let Err(e) = link.disconnect().await {
                        debug!(error = %e, "Best-effort disconnect failed");
                    }
                });
            }
        }
    }
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn set_state(&self, inner: &mut Inner, state: SessionState) {
        if inner.state == state {
            return;
        }
        debug!("Session state {} -> {}", inner.state, state);
        inner.state = state;
        self.events.send(SessionEvent::StateChanged { state });
    }
}

/// An in-flight connect.
///
/// Unless completed, puts the session back to rest when dropped, so a
/// connect future abandoned mid-await never leaves `Connecting` behind.
struct ConnectAttempt {
    shared: Arc<Shared>,
    pending: CancellationToken,
    id: u64,
    settled: bool,
}

impl ConnectAttempt {
    /// The session went active.
    fn complete(mut self) {
        self.settled = true;
    }

    /// The attempt failed or was cancelled.
    fn abort(self) {}
}

impl Drop for ConnectAttempt {
    fn drop(&mut self) {
        if self.settled {
            return;
        }
        let mut inner = self.shared.lock();
        // A later attempt, or a disconnect, already owns the state.
        if inner.attempt != self.id || inner.state != SessionState::Connecting {
            return;
        }
        if self.pending.is_cancelled() {
            self.shared.set_state(&mut inner, SessionState::Disconnected);
        } else {
            inner.pending = None;
            self.shared.set_state(&mut inner, SessionState::Idle);
        }
    }
}

/// Release everything an active connection holds.
///
/// Returns `false` when there was nothing to tear down, or when `only` names
/// a connection generation that is no longer current.
#[tracing::instrument(level = "debug", skip(shared))]
async fn teardown(shared: &Shared, reason: DisconnectReason, only: Option<u64>) -> bool {
    let active = {
        let mut inner = shared.lock();
        match (&inner.active, only) {
            (None, _) => return false,
            (Some(active), Some(generation)) if active.generation != generation => return false,
            _ => {}
        }
        let Some(active) = inner.active.take() else {
            return false;
        };
        shared.set_state(&mut inner, SessionState::Disconnected);
        active
    };

    active.cancel.cancel();
    if let (Some(Transport::Notify), Some(id)) = (active.transport, active.characteristic)
        && reason == DisconnectReason::UserRequested
        && let Err(e) = active.link.unsubscribe(&id).await
    {
        debug!("Stopping notifications failed: {}", e);
    }
    if let Err(e) = active.link.disconnect().await {
        debug!("Disconnect failed: {}", e);
    }

    info!(
        "Disconnected from {} ({})",
        active.device.as_deref().unwrap_or("device"),
        reason
    );
    shared.events.send(SessionEvent::Disconnected {
        device: active.device,
        reason,
    });
    true
}

fn spawn_notify_loop(mut stream: PayloadStream, pipeline: SharedPipeline, cancel: CancellationToken) {
    tokio::spawn(async move {
        loop {
            let payload = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                next = stream.next() => next,
            };
            let Some(payload) = payload else {
                debug!("Notification stream ended");
                break;
            };
            if cancel.is_cancelled() {
                break;
            }
            lock_pipeline(&pipeline).process_payload(&payload);
        }
    });
}

fn spawn_poll_loop(
    link: Arc<dyn SensorLink>,
    id: CharacteristicId,
    interval: Duration,
    pipeline: SharedPipeline,
    cancel: CancellationToken,
) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }
            let result = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                result = link.read(&id) => result,
            };
            // A read that finished after stop is discarded.
            if cancel.is_cancelled() {
                break;
            }
            match result {
                Ok(payload) => {
                    lock_pipeline(&pipeline).process_payload(&payload);
                }
                Err(e) => warn!("Polling read failed: {}", e),
            }
        }
    });
}

fn spawn_link_watcher(
    shared: Arc<Shared>,
    link: Arc<dyn SensorLink>,
    cancel: CancellationToken,
    generation: u64,
) {
    tokio::spawn(async move {
        tokio::select! {
            _ = cancel.cancelled() => {}
            _ = link.wait_for_disconnect() => {
                info!("Device-initiated disconnect");
                teardown(&shared, DisconnectReason::LinkLost, Some(generation)).await;
            }
        }
    });
}

fn lock_pipeline(pipeline: &SharedPipeline) -> MutexGuard<'_, Pipeline> {
    pipeline
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
}
