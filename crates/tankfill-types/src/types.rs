//! Core types for tank level data.

use core::fmt;
use core::time::Duration;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::convert;
use crate::error::GeometryError;

/// Distance at a full tank used when nothing is configured (millimetres).
pub const DEFAULT_MIN_DISTANCE_MM: f64 = 100.0;

/// Distance at an empty tank used when nothing is configured (millimetres).
pub const DEFAULT_MAX_DISTANCE_MM: f64 = 1000.0;

/// One timestamped fill-level measurement.
///
/// A reading is produced once per accepted sample and never mutated
/// afterwards. Consumers receive it by shared reference.
///
/// # Example
///
/// ```
/// use tankfill_types::{Reading, TankGeometry};
///
/// let geometry = TankGeometry::new(100.0, 1000.0);
/// let reading = Reading::from_distance(1_700_000_000_000, 550.0, &geometry).unwrap();
/// assert_eq!(reading.percent, 50.0);
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase"))]
pub struct Reading {
    /// Milliseconds since the Unix epoch.
    #[cfg_attr(feature = "serde", serde(rename = "ts"))]
    pub timestamp: i64,
    /// Raw distance from the sensor to the liquid surface.
    pub distance_mm: f64,
    /// Fill level in `[0, 100]`.
    pub percent: f64,
}

impl Reading {
    /// Create a reading from already-converted values.
    pub fn new(timestamp: i64, distance_mm: f64, percent: f64) -> Self {
        Self {
            timestamp,
            distance_mm,
            percent,
        }
    }

    /// Create a reading by converting `distance_mm` against `geometry`.
    ///
    /// # Errors
    ///
    /// Returns a [`GeometryError`] if the geometry is invalid.
    pub fn from_distance(
        timestamp: i64,
        distance_mm: f64,
        geometry: &TankGeometry,
    ) -> Result<Self, GeometryError> {
        let percent = geometry.percent(distance_mm)?;
        Ok(Self::new(timestamp, distance_mm, percent))
    }

    /// The capture time as an [`OffsetDateTime`].
    ///
    /// Returns `None` if the timestamp is outside the representable range.
    pub fn captured_at(&self) -> Option<OffsetDateTime> {
        OffsetDateTime::from_unix_timestamp_nanos(i128::from(self.timestamp) * 1_000_000).ok()
    }
}

/// Calibration bounds of a tank.
///
/// `min_distance_mm` is the sensor-to-surface distance when the tank is FULL
/// (closest), `max_distance_mm` the distance when it is EMPTY (farthest).
/// The invariant `0 < min < max` is checked on every conversion, not at
/// construction, so a geometry can be loaded from configuration as-is and
/// reported when first used.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct TankGeometry {
    /// Distance at full tank.
    #[cfg_attr(feature = "serde", serde(alias = "min"))]
    pub min_distance_mm: f64,
    /// Distance at empty tank.
    #[cfg_attr(feature = "serde", serde(alias = "max"))]
    pub max_distance_mm: f64,
}

impl Default for TankGeometry {
    fn default() -> Self {
        Self {
            min_distance_mm: DEFAULT_MIN_DISTANCE_MM,
            max_distance_mm: DEFAULT_MAX_DISTANCE_MM,
        }
    }
}

impl TankGeometry {
    /// Create a geometry. Call [`validate`](Self::validate) to check it.
    pub const fn new(min_distance_mm: f64, max_distance_mm: f64) -> Self {
        Self {
            min_distance_mm,
            max_distance_mm,
        }
    }

    /// Check the `0 < min < max` invariant.
    pub fn validate(&self) -> Result<(), GeometryError> {
        convert::validate_geometry(self.min_distance_mm, self.max_distance_mm)
    }

    /// Span between the empty and full distances.
    pub fn range(&self) -> f64 {
        self.max_distance_mm - self.min_distance_mm
    }

    /// Distance halfway between full and empty.
    pub fn midpoint(&self) -> f64 {
        self.min_distance_mm + self.range() / 2.0
    }

    /// Whether `distance_mm` lies within the calibrated span (inclusive).
    pub fn contains(&self, distance_mm: f64) -> bool {
        (self.min_distance_mm..=self.max_distance_mm).contains(&distance_mm)
    }

    /// Convert a distance to a fill percentage.
    pub fn percent(&self, distance_mm: f64) -> Result<f64, GeometryError> {
        convert::distance_to_percent(distance_mm, self.min_distance_mm, self.max_distance_mm)
    }
}

impl fmt::Display for TankGeometry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} mm (full) .. {} mm (empty)",
            self.min_distance_mm, self.max_distance_mm
        )
    }
}

/// How raw samples arrive from a connected sensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(tag = "mode", rename_all = "snake_case"))]
pub enum Transport {
    /// The device pushes notifications or indications.
    Notify,
    /// The characteristic is read on a fixed interval.
    Poll {
        /// Time between reads.
        interval: Duration,
    },
}

impl fmt::Display for Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Transport::Notify => write!(f, "notify"),
            Transport::Poll { interval } => write!(f, "poll every {}ms", interval.as_millis()),
        }
    }
}

/// Lifecycle state of a sensor session.
///
/// `Active(None)` is the degraded mode: the device is connected but no data
/// transport could be armed because the GATT identifiers are not configured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(tag = "state", content = "transport", rename_all = "snake_case"))]
pub enum SessionState {
    /// No connection and none in progress.
    #[default]
    Idle,
    /// Device selection or GATT connection in progress.
    Connecting,
    /// Connected, with the armed transport if any.
    Active(Option<Transport>),
    /// The connection was torn down; the session may connect again.
    Disconnected,
}

impl SessionState {
    /// Whether the session holds a live connection.
    pub fn is_active(&self) -> bool {
        matches!(self, SessionState::Active(_))
    }

    /// Whether the session is connected without a data transport.
    pub fn is_degraded(&self) -> bool {
        matches!(self, SessionState::Active(None))
    }

    /// The armed transport, if any.
    pub fn transport(&self) -> Option<Transport> {
        match self {
            SessionState::Active(transport) => *transport,
            _ => None,
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionState::Idle => write!(f, "idle"),
            SessionState::Connecting => write!(f, "connecting"),
            SessionState::Active(Some(transport)) => write!(f, "active ({})", transport),
            SessionState::Active(None) => write!(f, "active (no data transport)"),
            SessionState::Disconnected => write!(f, "disconnected"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reading_from_distance() {
        let geometry = TankGeometry::new(100.0, 1000.0);
        let reading = Reading::from_distance(42, 550.0, &geometry).unwrap();
        assert_eq!(reading.timestamp, 42);
        assert_eq!(reading.distance_mm, 550.0);
        assert!((reading.percent - 50.0).abs() < 1e-9);
    }

    #[test]
    fn test_reading_from_distance_invalid_geometry() {
        let geometry = TankGeometry::new(1000.0, 100.0);
        let err = Reading::from_distance(0, 550.0, &geometry).unwrap_err();
        assert!(matches!(err, GeometryError::Inverted { .. }));
    }

    #[test]
    fn test_reading_captured_at() {
        let reading = Reading::new(1_700_000_000_123, 500.0, 55.5);
        let at = reading.captured_at().unwrap();
        assert_eq!(at.unix_timestamp(), 1_700_000_000);
        assert_eq!(at.millisecond(), 123);
    }

    #[test]
    fn test_geometry_defaults() {
        let geometry = TankGeometry::default();
        assert_eq!(geometry.min_distance_mm, 100.0);
        assert_eq!(geometry.max_distance_mm, 1000.0);
        assert!(geometry.validate().is_ok());
        assert_eq!(geometry.range(), 900.0);
        assert_eq!(geometry.midpoint(), 550.0);
    }

    #[test]
    fn test_geometry_contains() {
        let geometry = TankGeometry::default();
        assert!(geometry.contains(100.0));
        assert!(geometry.contains(1000.0));
        assert!(!geometry.contains(99.9));
        assert!(!geometry.contains(1000.1));
    }

    #[test]
    fn test_session_state_helpers() {
        assert!(!SessionState::Idle.is_active());
        assert!(SessionState::Active(None).is_active());
        assert!(SessionState::Active(None).is_degraded());
        assert!(!SessionState::Active(Some(Transport::Notify)).is_degraded());
        assert_eq!(
            SessionState::Active(Some(Transport::Notify)).transport(),
            Some(Transport::Notify)
        );
        assert_eq!(SessionState::Disconnected.transport(), None);
    }

    #[test]
    fn test_session_state_display() {
        assert_eq!(SessionState::Idle.to_string(), "idle");
        let poll = SessionState::Active(Some(Transport::Poll {
            interval: Duration::from_millis(1000),
        }));
        assert_eq!(poll.to_string(), "active (poll every 1000ms)");
        assert_eq!(
            SessionState::Active(None).to_string(),
            "active (no data transport)"
        );
    }

    #[cfg(feature = "serde")]
    #[test]
    fn test_reading_json_field_names() {
        let reading = Reading::new(1000, 550.0, 50.0);
        let json = serde_json::to_string(&reading).unwrap();
        assert_eq!(json, r#"{"ts":1000,"distanceMm":550.0,"percent":50.0}"#);

        let back: Reading = serde_json::from_str(&json).unwrap();
        assert_eq!(back, reading);
    }
}
