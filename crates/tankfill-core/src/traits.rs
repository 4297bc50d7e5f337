//! Trait abstractions over the BLE device.
//!
//! [`Connector`] and [`SensorLink`] cover the handful of GATT operations the
//! session needs. [`BleConnector`](crate::device::BleConnector) implements
//! them over btleplug and [`MockConnector`](crate::mock::MockConnector)
//! implements them for tests.

use std::fmt;
use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use futures::Stream;
use uuid::Uuid;

use crate::error::Result;

/// A stream of raw characteristic payloads.
pub type PayloadStream = Pin<Box<dyn Stream<Item = Vec<u8>> + Send>>;

/// Which devices a [`Connector`] may offer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceFilter {
    /// Only devices whose advertised name starts with this.
    pub name_prefix: Option<String>,
    /// Services that must be reachable once connected.
    pub optional_services: Vec<Uuid>,
}

impl DeviceFilter {
    /// Filter by advertised name prefix.
    pub fn name_prefix(prefix: impl Into<String>) -> Self {
        Self {
            name_prefix: Some(prefix.into()),
            optional_services: Vec::new(),
        }
    }

    /// Also request access to `service`.
    #[must_use]
    pub fn with_service(mut self, service: Uuid) -> Self {
        if !self.optional_services.contains(&service) {
            self.optional_services.push(service);
        }
        self
    }

    /// Whether a device called `name` passes the filter.
    pub fn matches_name(&self, name: Option<&str>) -> bool {
        match (&self.name_prefix, name) {
            (None, _) => true,
            (Some(prefix), Some(name)) => name.starts_with(prefix.as_str()),
            (Some(_), None) => false,
        }
    }
}

/// A GATT characteristic address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CharacteristicId {
    /// Owning service.
    pub service: Uuid,
    /// Characteristic within the service.
    pub characteristic: Uuid,
}

impl CharacteristicId {
    /// Create a characteristic address.
    pub fn new(service: Uuid, characteristic: Uuid) -> Self {
        Self {
            service,
            characteristic,
        }
    }
}

impl fmt::Display for CharacteristicId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.service, self.characteristic)
    }
}

/// Operations a characteristic supports.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CharacteristicProperties {
    /// Supports notifications.
    pub notify: bool,
    /// Supports indications.
    pub indicate: bool,
    /// Supports reads.
    pub read: bool,
}

impl CharacteristicProperties {
    /// Whether the device can push values.
    pub fn can_push(&self) -> bool {
        self.notify || self.indicate
    }
}

/// A device candidate offered to a [`DevicePicker`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    /// Platform identifier (MAC address, or UUID on macOS).
    pub id: String,
    /// Advertised name.
    pub name: Option<String>,
    /// Signal strength.
    pub rssi: Option<i16>,
}

impl fmt::Display for Candidate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name.as_deref().unwrap_or("(unnamed)"))?;
        write!(f, " [{}]", self.id)?;
        if let Some(rssi) = self.rssi {
            write!(f, " {} dBm", rssi)?;
        }
        Ok(())
    }
}

/// Chooses one of several matching devices.
pub trait DevicePicker: Send + Sync {
    /// Return the index of the chosen candidate, or `None` if the
    /// selection was dismissed.
    fn pick(&self, candidates: &[Candidate]) -> Option<usize>;
}

/// Picks the candidate with the strongest signal.
#[derive(Debug, Clone, Copy, Default)]
pub struct StrongestSignal;

impl DevicePicker for StrongestSignal {
    fn pick(&self, candidates: &[Candidate]) -> Option<usize> {
        candidates
            .iter()
            .enumerate()
            .max_by_key(|(_, c)| c.rssi.unwrap_or(i16::MIN))
            .map(|(i, _)| i)
    }
}

/// Selects and connects a device.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Let the operator pick a device matching `filter` and open a GATT
    /// connection to it.
    ///
    /// # Errors
    ///
    /// [`Error::UserCancelled`](crate::Error::UserCancelled) if the picker
    /// was dismissed; a connection error if the device could not be reached.
    async fn request_device(&self, filter: &DeviceFilter) -> Result<Arc<dyn SensorLink>>;
}

/// An open GATT connection to a sensor.
#[async_trait]
pub trait SensorLink: Send + Sync {
    /// The device's advertised name.
    fn name(&self) -> Option<String>;

    /// Look up a characteristic and report what it supports.
    async fn find_characteristic(&self, id: &CharacteristicId) -> Result<CharacteristicProperties>;

    /// Read the characteristic's current value.
    async fn read(&self, id: &CharacteristicId) -> Result<Vec<u8>>;

    /// Start notifications and return the payload stream.
    async fn subscribe(&self, id: &CharacteristicId) -> Result<PayloadStream>;

    /// Stop notifications.
    async fn unsubscribe(&self, id: &CharacteristicId) -> Result<()>;

    /// Resolve once the device drops the connection.
    async fn wait_for_disconnect(&self);

    /// Close the connection. Closing twice is not an error.
    async fn disconnect(&self) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(name: &str, rssi: Option<i16>) -> Candidate {
        Candidate {
            id: name.to_lowercase(),
            name: Some(name.to_string()),
            rssi,
        }
    }

    #[test]
    fn test_filter_matches_name() {
        let filter = DeviceFilter::name_prefix("ShellyBLU");
        assert!(filter.matches_name(Some("ShellyBLU Distance")));
        assert!(!filter.matches_name(Some("Govee_H5075_1A2B")));
        assert!(!filter.matches_name(None));
        assert!(DeviceFilter::default().matches_name(None));
    }

    #[test]
    fn test_filter_service_dedup() {
        let service = Uuid::from_u128(0x181a);
        let filter = DeviceFilter::default()
            .with_service(service)
            .with_service(service);
        assert_eq!(filter.optional_services, vec![service]);
    }

    #[test]
    fn test_strongest_signal() {
        let candidates = vec![
            candidate("A", Some(-80)),
            candidate("B", Some(-40)),
            candidate("C", None),
        ];
        assert_eq!(StrongestSignal.pick(&candidates), Some(1));
        assert_eq!(StrongestSignal.pick(&[]), None);
    }

    #[test]
    fn test_properties_can_push() {
        assert!(!CharacteristicProperties::default().can_push());
        let indicate = CharacteristicProperties {
            indicate: true,
            ..Default::default()
        };
        assert!(indicate.can_push());
    }

    #[test]
    fn test_candidate_display() {
        let c = candidate("ShellyBLU", Some(-55));
        assert_eq!(c.to_string(), "ShellyBLU [shellyblu] -55 dBm");
    }
}
