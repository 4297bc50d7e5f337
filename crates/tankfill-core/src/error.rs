//! Error types for tankfill-core.
//!
//! # Error taxonomy
//!
//! | Error | Meaning | Session outcome |
//! |-------|---------|-----------------|
//! | [`Error::UnsupportedPlatform`] | Host has no usable Bluetooth | connect fails, stays idle |
//! | [`Error::UserCancelled`] | Device picker dismissed | connect fails, back to idle |
//! | [`Error::ConnectionFailed`], [`Error::Bluetooth`], [`Error::Timeout`] | GATT connect/service/characteristic failure | connect fails, back to idle |
//! | [`Error::InvalidGeometry`] | Tank geometry misconfigured | fix the configuration |
//! | [`Error::Decode`] | Payload not interpretable | sample dropped, never surfaced to consumers |
//!
//! Persistence failures while emitting a reading and panics inside reading
//! listeners are logged and swallowed; they never reach the producer.

use std::time::Duration;

use thiserror::Error;

use tankfill_types::{GeometryError, ParseError};

/// Errors that can occur in the acquisition pipeline.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new error variants
/// in future versions without breaking downstream code.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// The host lacks Bluetooth capability.
    #[error("Bluetooth is not supported on this platform: {0}")]
    UnsupportedPlatform(String),

    /// The device picker was dismissed without a selection.
    #[error("Device selection cancelled")]
    UserCancelled,

    /// Bluetooth Low Energy error.
    #[error("Bluetooth error: {0}")]
    Bluetooth(#[from] btleplug::Error),

    /// Connection or GATT lookup failed.
    #[error("Connection failed: {reason}")]
    ConnectionFailed {
        /// The device identifier, if one had been selected.
        device: Option<String>,
        /// The structured reason for the failure.
        reason: ConnectionFailureReason,
    },

    /// Operation timed out.
    #[error("Operation '{operation}' timed out after {duration:?}")]
    Timeout {
        /// The operation that timed out.
        operation: String,
        /// The timeout duration.
        duration: Duration,
    },

    /// Tank geometry is misconfigured.
    #[error("Invalid tank geometry: {0}")]
    InvalidGeometry(#[from] GeometryError),

    /// A payload could not be decoded.
    #[error("Decode failure: {0}")]
    Decode(#[from] ParseError),

    /// Invalid configuration provided.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Operation attempted while not connected to a device.
    #[error("Not connected to device")]
    NotConnected,

    /// The history store rejected an operation.
    #[error("Storage error: {0}")]
    Storage(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// I/O error.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Structured reasons for connection failures.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new reasons
/// in future versions without breaking downstream code.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ConnectionFailureReason {
    /// Bluetooth adapter not available or powered off.
    AdapterUnavailable,
    /// No advertising device matched the name filter.
    NoMatchingDevice,
    /// The configured service is not offered by the device.
    ServiceNotFound(String),
    /// The configured characteristic is not offered by the service.
    CharacteristicNotFound(String),
    /// The link dropped while connecting.
    LinkLost,
    /// Generic BLE error.
    BleError(String),
    /// Other/unknown error.
    Other(String),
}

impl std::fmt::Display for ConnectionFailureReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::AdapterUnavailable => write!(f, "Bluetooth adapter unavailable"),
            Self::NoMatchingDevice => write!(f, "no matching device in range"),
            Self::ServiceNotFound(uuid) => write!(f, "service {} not found", uuid),
            Self::CharacteristicNotFound(uuid) => write!(f, "characteristic {} not found", uuid),
            Self::LinkLost => write!(f, "link lost during connection"),
            Self::BleError(msg) => write!(f, "BLE error: {}", msg),
            Self::Other(msg) => write!(f, "{}", msg),
        }
    }
}

impl Error {
    /// Create an unsupported platform error.
    pub fn unsupported(message: impl Into<String>) -> Self {
        Self::UnsupportedPlatform(message.into())
    }

    /// Create a connection failure with structured reason.
    pub fn connection_failed(device: Option<String>, reason: ConnectionFailureReason) -> Self {
        Self::ConnectionFailed { device, reason }
    }

    /// Create a timeout error with operation context.
    pub fn timeout(operation: impl Into<String>, duration: Duration) -> Self {
        Self::Timeout {
            operation: operation.into(),
            duration,
        }
    }

    /// Create a configuration error.
    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig(message.into())
    }

    /// Wrap a storage backend error.
    pub fn storage(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Storage(Box::new(err))
    }

    /// Whether this error is a GATT-level connection failure.
    ///
    /// These are surfaced to the caller and return the session to idle.
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            Error::ConnectionFailed { .. }
                | Error::Bluetooth(_)
                | Error::Timeout { .. }
                | Error::NotConnected
        )
    }
}

/// Result type alias using tankfill-core's Error type.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::unsupported("no adapter");
        assert!(err.to_string().contains("no adapter"));

        assert_eq!(Error::UserCancelled.to_string(), "Device selection cancelled");

        let err = Error::connection_failed(
            Some("AA:BB".to_string()),
            ConnectionFailureReason::ServiceNotFound("0x181a".to_string()),
        );
        assert!(err.to_string().contains("service 0x181a not found"));

        let err = Error::timeout("connect", Duration::from_secs(15));
        assert!(err.to_string().contains("connect"));
        assert!(err.to_string().contains("15s"));
    }

    #[test]
    fn test_geometry_error_conversion() {
        let err: Error = tankfill_types::validate_geometry(0.0, 10.0).unwrap_err().into();
        assert!(matches!(err, Error::InvalidGeometry(_)));
        assert!(!err.is_connection_error());
    }

    #[test]
    fn test_parse_error_conversion() {
        let err: Error = tankfill_types::decode_distance(&[]).unwrap_err().into();
        assert!(matches!(err, Error::Decode(_)));
    }

    #[test]
    fn test_connection_classification() {
        assert!(
            Error::connection_failed(None, ConnectionFailureReason::LinkLost).is_connection_error()
        );
        assert!(Error::timeout("read", Duration::from_secs(1)).is_connection_error());
        assert!(!Error::UserCancelled.is_connection_error());
        assert!(!Error::unsupported("x").is_connection_error());
    }

    #[test]
    fn test_btleplug_error_conversion() {
        fn _assert_from_impl<T: From<btleplug::Error>>() {}
        _assert_from_impl::<Error>();
    }

    #[test]
    fn test_storage_error_wraps_source() {
        let io = std::io::Error::other("disk full");
        let err = Error::storage(io);
        assert!(err.to_string().contains("disk full"));
        assert!(std::error::Error::source(&err).is_some());
    }
}
