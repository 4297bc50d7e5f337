//! BLE transport over btleplug.
//!
//! [`BleConnector`] scans for sensors matching a [`DeviceFilter`], lets a
//! [`DevicePicker`] choose one and opens a [`BleLink`] to it.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use btleplug::api::{CentralEvent, CharPropFlags, Characteristic, Central, Peripheral as _};
use btleplug::platform::{Adapter, Peripheral};
use futures::StreamExt;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::ConnectionConfig;
use crate::error::{ConnectionFailureReason, Error, Result};
use crate::scan::{Discovered, get_adapter, scan_with_adapter};
use crate::traits::{
    CharacteristicId, CharacteristicProperties, Connector, DeviceFilter, DevicePicker,
    PayloadStream, SensorLink, StrongestSignal,
};

/// Finds and connects sensors over the first Bluetooth adapter.
pub struct BleConnector {
    config: ConnectionConfig,
    picker: Arc<dyn DevicePicker>,
}

impl std::fmt::Debug for BleConnector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BleConnector")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl BleConnector {
    /// Create a connector that picks the strongest matching device.
    pub fn new(config: ConnectionConfig) -> Self {
        Self {
            config,
            picker: Arc::new(StrongestSignal),
        }
    }

    /// Use `picker` to choose among matching devices.
    #[must_use]
    pub fn with_picker(mut self, picker: Arc<dyn DevicePicker>) -> Self {
        self.picker = picker;
        self
    }
}

impl Default for BleConnector {
    fn default() -> Self {
        Self::new(ConnectionConfig::default())
    }
}

#[async_trait]
impl Connector for BleConnector {
    #[tracing::instrument(level = "info", skip_all, fields(prefix = ?filter.name_prefix))]
    async fn request_device(&self, filter: &DeviceFilter) -> Result<Arc<dyn SensorLink>> {
        let adapter = get_adapter().await?;
        let mut found = scan_with_adapter(&adapter, filter, self.config.scan_duration).await?;
        if found.is_empty() {
            return Err(Error::connection_failed(
                None,
                ConnectionFailureReason::NoMatchingDevice,
            ));
        }

        let candidates: Vec<_> = found.iter().map(|d| d.candidate.clone()).collect();
        let index = self.picker.pick(&candidates).ok_or(Error::UserCancelled)?;
        if index >= found.len() {
            return Err(Error::UserCancelled);
        }
        let chosen = found.swap_remove(index);

        let link = BleLink::connect(adapter, chosen, self.config).await?;
        Ok(Arc::new(link))
    }
}

/// An open connection to a sensor.
///
/// Link loss is detected from the adapter's event stream and reported
/// through [`SensorLink::wait_for_disconnect`].
pub struct BleLink {
    /// Kept alive for the lifetime of the peripheral connection.
    #[allow(dead_code)]
    adapter: Adapter,
    peripheral: Peripheral,
    name: Option<String>,
    identifier: String,
    config: ConnectionConfig,
    link_lost: CancellationToken,
    closed: CancellationToken,
    disconnected: AtomicBool,
}

impl std::fmt::Debug for BleLink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BleLink")
            .field("name", &self.name)
            .field("identifier", &self.identifier)
            .finish_non_exhaustive()
    }
}

impl BleLink {
    /// Connect a discovered device and discover its services.
    #[tracing::instrument(level = "info", skip_all, fields(device = %discovered.candidate))]
    pub async fn connect(
        adapter: Adapter,
        discovered: Discovered,
        config: ConnectionConfig,
    ) -> Result<Self> {
        let Discovered {
            candidate,
            peripheral,
        } = discovered;

        // Subscribe before connecting so an early drop is not missed.
        let mut events = adapter.events().await?;

        info!("Connecting to device...");
        let connected = timeout(config.connection_timeout, peripheral.connect())
            .await
            .map_err(|_| Error::timeout("connect to device", config.connection_timeout))
            .and_then(|r| r.map_err(Error::from));
        if let Err(e) = connected {
            let _ = peripheral.disconnect().await;
            return Err(e);
        }
        info!("Connected!");

        info!("Discovering services...");
        let discovered = timeout(config.discovery_timeout, peripheral.discover_services())
            .await
            .map_err(|_| Error::timeout("discover services", config.discovery_timeout))
            .and_then(|r| r.map_err(Error::from));
        if let Err(e) = discovered {
            let _ = peripheral.disconnect().await;
            return Err(e);
        }
        for service in peripheral.services() {
            debug!("  Service: {}", service.uuid);
            for characteristic in &service.characteristics {
                debug!(
                    "    Characteristic: {} {:?}",
                    characteristic.uuid, characteristic.properties
                );
            }
        }

        let link_lost = CancellationToken::new();
        let closed = CancellationToken::new();
        let id = peripheral.id();
        let lost = link_lost.clone();
        let stop = closed.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = stop.cancelled() => break,
                    event = events.next() => match event {
                        Some(CentralEvent::DeviceDisconnected(gone)) if gone == id => {
                            info!("Device dropped the connection");
                            lost.cancel();
                            break;
                        }
                        Some(_) => {}
                        None => {
                            debug!("Adapter event stream ended");
                            break;
                        }
                    }
                }
            }
        });

        Ok(Self {
            adapter,
            peripheral,
            name: candidate.name,
            identifier: candidate.id,
            config,
            link_lost,
            closed,
            disconnected: AtomicBool::new(false),
        })
    }

    /// Platform identifier of the device.
    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    fn characteristic(&self, id: &CharacteristicId) -> Result<Characteristic> {
        let services = self.peripheral.services();
        let service = services
            .iter()
            .find(|s| s.uuid == id.service)
            .ok_or_else(|| {
                Error::connection_failed(
                    self.name.clone(),
                    ConnectionFailureReason::ServiceNotFound(id.service.to_string()),
                )
            })?;
        service
            .characteristics
            .iter()
            .find(|c| c.uuid == id.characteristic)
            .cloned()
            .ok_or_else(|| {
                Error::connection_failed(
                    self.name.clone(),
                    ConnectionFailureReason::CharacteristicNotFound(id.characteristic.to_string()),
                )
            })
    }
}

#[async_trait]
impl SensorLink for BleLink {
    fn name(&self) -> Option<String> {
        self.name.clone()
    }

    async fn find_characteristic(&self, id: &CharacteristicId) -> Result<CharacteristicProperties> {
        let flags = self.characteristic(id)?.properties;
        Ok(CharacteristicProperties {
            notify: flags.contains(CharPropFlags::NOTIFY),
            indicate: flags.contains(CharPropFlags::INDICATE),
            read: flags.contains(CharPropFlags::READ),
        })
    }

    async fn read(&self, id: &CharacteristicId) -> Result<Vec<u8>> {
        let characteristic = self.characteristic(id)?;
        let data = timeout(self.config.read_timeout, self.peripheral.read(&characteristic))
            .await
            .map_err(|_| {
                Error::timeout(
                    format!("read characteristic {}", id.characteristic),
                    self.config.read_timeout,
                )
            })??;
        Ok(data)
    }

    async fn subscribe(&self, id: &CharacteristicId) -> Result<PayloadStream> {
        let characteristic = self.characteristic(id)?;
        self.peripheral.subscribe(&characteristic).await?;

        let uuid = characteristic.uuid;
        let stream = self
            .peripheral
            .notifications()
            .await?
            .filter_map(move |n| futures::future::ready((n.uuid == uuid).then_some(n.value)));
        Ok(Box::pin(stream))
    }

    async fn unsubscribe(&self, id: &CharacteristicId) -> Result<()> {
        let characteristic = self.characteristic(id)?;
        self.peripheral.unsubscribe(&characteristic).await?;
        Ok(())
    }

    async fn wait_for_disconnect(&self) {
        self.link_lost.cancelled().await;
    }

    #[tracing::instrument(level = "info", skip(self), fields(device_name = ?self.name))]
    async fn disconnect(&self) -> Result<()> {
        if self.disconnected.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        self.closed.cancel();
        if self.link_lost.is_cancelled() {
            debug!("Link already lost; skipping GATT disconnect");
            return Ok(());
        }
        info!("Disconnecting from device...");
        self.peripheral.disconnect().await?;
        Ok(())
    }
}

impl Drop for BleLink {
    fn drop(&mut self) {
        self.closed.cancel();
        if self.disconnected.swap(true, Ordering::SeqCst) {
            return;
        }
        warn!(
            device_name = ?self.name,
            device_address = %self.identifier,
            "BleLink dropped without calling disconnect() - performing best-effort cleanup"
        );
        let peripheral = self.peripheral.clone();
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            handle.spawn(async move {
                if let Err(e) = peripheral.disconnect().await {
                    debug!(error = %e, "Best-effort disconnect failed");
                }
            });
        }
    }
}
