//! Session configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use tankfill_types::uuid::{
    DEFAULT_DEVICE_NAME_PREFIX, PLACEHOLDER_CHARACTERISTIC, PLACEHOLDER_SERVICE, is_placeholder,
    parse_gatt_id,
};
use tankfill_types::{PayloadLayout, TankGeometry};

use crate::error::{Error, Result};
use crate::traits::{CharacteristicId, DeviceFilter};

/// Default minimum time between accepted samples.
pub const DEFAULT_DEBOUNCE_MS: u64 = 200;

/// Polling never runs faster than this.
pub const MIN_POLL_INTERVAL: Duration = Duration::from_millis(1000);

/// Default timeout for establishing a BLE connection.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(15);

/// Default timeout for BLE read operations.
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(10);

/// Default timeout for service discovery after connection.
pub const DEFAULT_DISCOVERY_TIMEOUT: Duration = Duration::from_secs(10);

/// Default duration of the scan that collects device candidates.
pub const DEFAULT_SCAN_DURATION: Duration = Duration::from_secs(5);

/// BLE timeouts.
///
/// # Example
///
/// ```
/// use std::time::Duration;
/// use tankfill_core::config::ConnectionConfig;
///
/// let config = ConnectionConfig::default()
///     .scan_duration(Duration::from_secs(8))
///     .read_timeout(Duration::from_secs(5));
/// assert_eq!(config.scan_duration, Duration::from_secs(8));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionConfig {
    /// How long to scan for candidates.
    pub scan_duration: Duration,
    /// Timeout for establishing a BLE connection.
    pub connection_timeout: Duration,
    /// Timeout for BLE read operations.
    pub read_timeout: Duration,
    /// Timeout for service discovery after connection.
    pub discovery_timeout: Duration,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            scan_duration: DEFAULT_SCAN_DURATION,
            connection_timeout: DEFAULT_CONNECT_TIMEOUT,
            read_timeout: DEFAULT_READ_TIMEOUT,
            discovery_timeout: DEFAULT_DISCOVERY_TIMEOUT,
        }
    }
}

impl ConnectionConfig {
    /// Set the scan duration.
    #[must_use]
    pub fn scan_duration(mut self, duration: Duration) -> Self {
        self.scan_duration = duration;
        self
    }

    /// Set the connection timeout.
    #[must_use]
    pub fn connection_timeout(mut self, timeout: Duration) -> Self {
        self.connection_timeout = timeout;
        self
    }

    /// Set the read timeout.
    #[must_use]
    pub fn read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }

    /// Set the service discovery timeout.
    #[must_use]
    pub fn discovery_timeout(mut self, timeout: Duration) -> Self {
        self.discovery_timeout = timeout;
        self
    }
}

/// Static configuration of a [`SensorSession`](crate::session::SensorSession).
///
/// GATT identifiers are kept as the strings the operator wrote. Anything
/// that is not a valid 16-bit alias or 128-bit UUID leaves the session
/// connected but without a data transport.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Advertised name prefix of the sensor.
    pub device_name_prefix: String,
    /// Service holding the distance characteristic.
    pub service_uuid: String,
    /// Characteristic carrying the distance.
    pub characteristic_uuid: String,
    /// Tank calibration.
    pub geometry: TankGeometry,
    /// Minimum milliseconds between accepted samples.
    pub debounce_ms: u64,
    /// Where the distance sits in a payload.
    pub payload: PayloadLayout,
    /// Exponential smoothing factor in `(0, 1]` applied to distances.
    pub smoothing_alpha: Option<f64>,
    /// BLE timeouts.
    #[serde(skip)]
    pub connection: ConnectionConfig,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            device_name_prefix: DEFAULT_DEVICE_NAME_PREFIX.to_string(),
            service_uuid: PLACEHOLDER_SERVICE.to_string(),
            characteristic_uuid: PLACEHOLDER_CHARACTERISTIC.to_string(),
            geometry: TankGeometry::default(),
            debounce_ms: DEFAULT_DEBOUNCE_MS,
            payload: PayloadLayout::default(),
            smoothing_alpha: None,
            connection: ConnectionConfig::default(),
        }
    }
}

impl SessionConfig {
    /// Set the GATT identifiers.
    #[must_use]
    pub fn gatt(mut self, service: impl Into<String>, characteristic: impl Into<String>) -> Self {
        self.service_uuid = service.into();
        self.characteristic_uuid = characteristic.into();
        self
    }

    /// Set the tank geometry.
    #[must_use]
    pub fn geometry(mut self, geometry: TankGeometry) -> Self {
        self.geometry = geometry;
        self
    }

    /// Set the debounce interval.
    #[must_use]
    pub fn debounce_ms(mut self, debounce_ms: u64) -> Self {
        self.debounce_ms = debounce_ms;
        self
    }

    /// Set the payload layout.
    #[must_use]
    pub fn payload(mut self, payload: PayloadLayout) -> Self {
        self.payload = payload;
        self
    }

    /// Enable distance smoothing.
    #[must_use]
    pub fn smoothing(mut self, alpha: f64) -> Self {
        self.smoothing_alpha = Some(alpha);
        self
    }

    /// Set the BLE timeouts.
    #[must_use]
    pub fn connection(mut self, connection: ConnectionConfig) -> Self {
        self.connection = connection;
        self
    }

    /// Check everything that would make every sample fail.
    ///
    /// GATT identifiers are not checked here; invalid ones select degraded
    /// mode instead of failing.
    pub fn validate(&self) -> Result<()> {
        self.geometry.validate()?;
        self.payload.validate()?;
        if let Some(alpha) = self.smoothing_alpha
            && !(alpha > 0.0 && alpha <= 1.0)
        {
            return Err(Error::invalid_config(format!(
                "smoothing_alpha must be in (0, 1], got {alpha}"
            )));
        }
        Ok(())
    }

    /// The configured service, if valid.
    pub fn service(&self) -> Option<uuid::Uuid> {
        parse_gatt_id(&self.service_uuid)
    }

    /// The configured data characteristic, if both identifiers are valid.
    pub fn data_characteristic(&self) -> Option<CharacteristicId> {
        let service = self.service()?;
        let characteristic = parse_gatt_id(&self.characteristic_uuid)?;
        Some(CharacteristicId::new(service, characteristic))
    }

    /// The filter used to request a device.
    ///
    /// The service is only requested when it parses.
    pub fn device_filter(&self) -> DeviceFilter {
        let filter = DeviceFilter::name_prefix(self.device_name_prefix.clone());
        match self.service() {
            Some(service) => filter.with_service(service),
            None => filter,
        }
    }

    /// Interval of the poll fallback: the debounce, but at least one second.
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.debounce_ms).max(MIN_POLL_INTERVAL)
    }

    /// Human-readable problems that will leave a session without data.
    pub fn warnings(&self) -> Vec<String> {
        let mut warnings = Vec::new();
        for (label, value) in [
            ("service", &self.service_uuid),
            ("characteristic", &self.characteristic_uuid),
        ] {
            if is_placeholder(value) {
                warnings.push(format!(
                    "{} UUID is still the placeholder {:?}; set the real value to receive data",
                    label, value
                ));
            } else if parse_gatt_id(value).is_none() {
                warnings.push(format!(
                    "{} UUID {:?} is neither a 0xXXXX alias nor a lowercase 128-bit UUID",
                    label, value
                ));
            }
        }
        warnings
    }
}
