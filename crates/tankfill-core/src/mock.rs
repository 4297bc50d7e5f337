//! Mock device implementation for testing.
//!
//! [`MockConnector`] and [`MockLink`] implement the device traits without
//! BLE hardware, so the whole session pipeline can be driven from tests.
//!
//! # Features
//!
//! - **Transport selection**: advertise notify/indicate/read support
//! - **Payload injection**: push notifications or set the value reads return
//! - **Failure injection**: dismissed pickers, GATT errors, failing reads
//! - **Latency simulation**: delay reads to exercise cancellation
//! - **Link loss**: drop the connection from the device side
//! - **Call counters**: observe reads, subscriptions and disconnects

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use futures::channel::mpsc;
use tokio_util::sync::CancellationToken;

use crate::error::{ConnectionFailureReason, Error, Result};
use crate::traits::{
    CharacteristicId, CharacteristicProperties, Connector, DeviceFilter, PayloadStream, SensorLink,
};

/// A mock sensor connection.
///
/// # Example
///
/// ```
/// use tankfill_core::mock::MockLink;
///
/// let link = MockLink::builder()
///     .name("ShellyBLU Test")
///     .notify(true)
///     .build();
/// assert_eq!(link.subscribe_count(), 0);
/// ```
pub struct MockLink {
    name: Option<String>,
    properties: CharacteristicProperties,
    characteristic: Option<CharacteristicId>,
    read_value: Mutex<Vec<u8>>,
    read_latency_ms: AtomicU64,
    fail_reads: AtomicBool,
    fail_find: Option<ConnectionFailureReason>,
    subscribers: Mutex<Vec<mpsc::UnboundedSender<Vec<u8>>>>,
    link_lost: Mutex<CancellationToken>,
    connected: AtomicBool,
    read_count: AtomicU32,
    subscribe_count: AtomicU32,
    unsubscribe_count: AtomicU32,
    disconnect_count: AtomicU32,
}

impl std::fmt::Debug for MockLink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockLink")
            .field("name", &self.name)
            .field("properties", &self.properties)
            .field("connected", &self.is_connected())
            .finish_non_exhaustive()
    }
}

impl MockLink {
    /// Start building a mock link.
    pub fn builder() -> MockLinkBuilder {
        MockLinkBuilder::default()
    }

    /// Deliver a notification to every active subscription.
    ///
    /// Returns the number of subscriptions that received it.
    pub fn push_notification(&self, payload: &[u8]) -> usize {
        let mut subscribers = lock(&self.subscribers);
        subscribers.retain(|tx| tx.unbounded_send(payload.to_vec()).is_ok());
        subscribers.len()
    }

    /// Set the value future reads return.
    pub fn set_read_value(&self, payload: &[u8]) {
        *lock(&self.read_value) = payload.to_vec();
    }

    /// Delay every read by `latency`.
    pub fn set_read_latency(&self, latency: Duration) {
        self.read_latency_ms
            .store(latency.as_millis() as u64, Ordering::Relaxed);
    }

    /// Make reads fail.
    pub fn set_fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::Relaxed);
    }

    /// Drop the connection from the device side.
    pub fn drop_link(&self) {
        self.connected.store(false, Ordering::SeqCst);
        lock(&self.subscribers).clear();
        lock(&self.link_lost).cancel();
    }

    fn reconnect(&self) {
        let mut link_lost = lock(&self.link_lost);
        if link_lost.is_cancelled() {
            *link_lost = CancellationToken::new();
        }
        self.connected.store(true, Ordering::SeqCst);
    }

    /// Whether the link is open.
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// Number of reads issued.
    pub fn read_count(&self) -> u32 {
        self.read_count.load(Ordering::Relaxed)
    }

    /// Number of subscriptions started.
    pub fn subscribe_count(&self) -> u32 {
        self.subscribe_count.load(Ordering::Relaxed)
    }

    /// Number of subscriptions stopped.
    pub fn unsubscribe_count(&self) -> u32 {
        self.unsubscribe_count.load(Ordering::Relaxed)
    }

    /// Number of disconnect calls.
    pub fn disconnect_count(&self) -> u32 {
        self.disconnect_count.load(Ordering::Relaxed)
    }

    fn check(&self, id: &CharacteristicId) -> Result<()> {
        if !self.is_connected() {
            return Err(Error::NotConnected);
        }
        if let Some(reason) = &self.fail_find {
            return Err(Error::connection_failed(self.name.clone(), reason.clone()));
        }
        match self.characteristic {
            Some(expected) if expected.service != id.service => Err(Error::connection_failed(
                self.name.clone(),
                ConnectionFailureReason::ServiceNotFound(id.service.to_string()),
            )),
            Some(expected) if expected.characteristic != id.characteristic => {
                Err(Error::connection_failed(
                    self.name.clone(),
                    ConnectionFailureReason::CharacteristicNotFound(id.characteristic.to_string()),
                ))
            }
            _ => Ok(()),
        }
    }
}

#[async_trait]
impl SensorLink for MockLink {
    fn name(&self) -> Option<String> {
        self.name.clone()
    }

    async fn find_characteristic(&self, id: &CharacteristicId) -> Result<CharacteristicProperties> {
        self.check(id)?;
        Ok(self.properties)
    }

    async fn read(&self, id: &CharacteristicId) -> Result<Vec<u8>> {
        self.read_count.fetch_add(1, Ordering::Relaxed);
        let latency = self.read_latency_ms.load(Ordering::Relaxed);
        if latency > 0 {
            tokio::time::sleep(Duration::from_millis(latency)).await;
        }
        self.check(id)?;
        if self.fail_reads.load(Ordering::Relaxed) {
            return Err(Error::timeout("mock read", Duration::from_millis(latency)));
        }
        Ok(lock(&self.read_value).clone())
    }

    async fn subscribe(&self, id: &CharacteristicId) -> Result<PayloadStream> {
        self.check(id)?;
        self.subscribe_count.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::unbounded();
        lock(&self.subscribers).push(tx);
        Ok(Box::pin(rx))
    }

    async fn unsubscribe(&self, _id: &CharacteristicId) -> Result<()> {
        self.unsubscribe_count.fetch_add(1, Ordering::Relaxed);
        lock(&self.subscribers).clear();
        Ok(())
    }

    async fn wait_for_disconnect(&self) {
        let link_lost = lock(&self.link_lost).clone();
        link_lost.cancelled().await;
    }

    async fn disconnect(&self) -> Result<()> {
        self.disconnect_count.fetch_add(1, Ordering::Relaxed);
        self.connected.store(false, Ordering::SeqCst);
        lock(&self.subscribers).clear();
        Ok(())
    }
}

/// Builder for [`MockLink`].
#[derive(Debug, Clone, Default)]
pub struct MockLinkBuilder {
    name: Option<String>,
    properties: CharacteristicProperties,
    characteristic: Option<CharacteristicId>,
    read_value: Vec<u8>,
    fail_find: Option<ConnectionFailureReason>,
}

impl MockLinkBuilder {
    /// Set the advertised name.
    #[must_use]
    pub fn name(mut self, name: &str) -> Self {
        self.name = Some(name.to_string());
        self
    }

    /// Advertise notification support.
    #[must_use]
    pub fn notify(mut self, notify: bool) -> Self {
        self.properties.notify = notify;
        self
    }

    /// Advertise indication support.
    #[must_use]
    pub fn indicate(mut self, indicate: bool) -> Self {
        self.properties.indicate = indicate;
        self
    }

    /// Advertise read support.
    #[must_use]
    pub fn read(mut self, read: bool) -> Self {
        self.properties.read = read;
        self
    }

    /// Only expose this characteristic; others fail lookup.
    #[must_use]
    pub fn characteristic(mut self, id: CharacteristicId) -> Self {
        self.characteristic = Some(id);
        self
    }

    /// Initial value returned by reads.
    #[must_use]
    pub fn read_value(mut self, payload: &[u8]) -> Self {
        self.read_value = payload.to_vec();
        self
    }

    /// Fail every characteristic lookup with `reason`.
    #[must_use]
    pub fn fail_find(mut self, reason: ConnectionFailureReason) -> Self {
        self.fail_find = Some(reason);
        self
    }

    /// Build the link, already connected.
    pub fn build(self) -> MockLink {
        MockLink {
            name: self.name,
            properties: self.properties,
            characteristic: self.characteristic,
            read_value: Mutex::new(self.read_value),
            read_latency_ms: AtomicU64::new(0),
            fail_reads: AtomicBool::new(false),
            fail_find: self.fail_find,
            subscribers: Mutex::new(Vec::new()),
            link_lost: Mutex::new(CancellationToken::new()),
            connected: AtomicBool::new(true),
            read_count: AtomicU32::new(0),
            subscribe_count: AtomicU32::new(0),
            unsubscribe_count: AtomicU32::new(0),
            disconnect_count: AtomicU32::new(0),
        }
    }
}

/// What a [`MockConnector`] does when asked for a device.
#[derive(Debug, Clone)]
enum Behavior {
    Connect,
    Cancel,
    Fail(ConnectionFailureReason),
}

/// A mock device picker and connector handing out one [`MockLink`].
pub struct MockConnector {
    link: Arc<MockLink>,
    behavior: Behavior,
    latency: Duration,
    requests: AtomicU32,
    last_filter: Mutex<Option<DeviceFilter>>,
}

impl std::fmt::Debug for MockConnector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockConnector")
            .field("behavior", &self.behavior)
            .field("requests", &self.request_count())
            .finish_non_exhaustive()
    }
}

impl MockConnector {
    /// Connect to `link` on every request.
    pub fn new(link: Arc<MockLink>) -> Self {
        Self {
            link,
            behavior: Behavior::Connect,
            latency: Duration::ZERO,
            requests: AtomicU32::new(0),
            last_filter: Mutex::new(None),
        }
    }

    /// Behave as if the operator dismissed the picker.
    pub fn cancelled() -> Self {
        Self {
            behavior: Behavior::Cancel,
            ..Self::new(Arc::new(MockLink::builder().build()))
        }
    }

    /// Fail every request with `reason`.
    pub fn failing(reason: ConnectionFailureReason) -> Self {
        Self {
            behavior: Behavior::Fail(reason),
            ..Self::new(Arc::new(MockLink::builder().build()))
        }
    }

    /// Delay every request by `latency`.
    #[must_use]
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// The link handed out.
    pub fn link(&self) -> &Arc<MockLink> {
        &self.link
    }

    /// Number of device requests.
    pub fn request_count(&self) -> u32 {
        self.requests.load(Ordering::Relaxed)
    }

    /// Filter passed to the last request.
    pub fn last_filter(&self) -> Option<DeviceFilter> {
        lock(&self.last_filter).clone()
    }
}

#[async_trait]
impl Connector for MockConnector {
    async fn request_device(&self, filter: &DeviceFilter) -> Result<Arc<dyn SensorLink>> {
        self.requests.fetch_add(1, Ordering::Relaxed);
        *lock(&self.last_filter) = Some(filter.clone());
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        match &self.behavior {
            Behavior::Connect => {
                self.link.reconnect();
                Ok(Arc::clone(&self.link) as Arc<dyn SensorLink>)
            }
            Behavior::Cancel => Err(Error::UserCancelled),
            Behavior::Fail(reason) => Err(Error::connection_failed(None, reason.clone())),
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
