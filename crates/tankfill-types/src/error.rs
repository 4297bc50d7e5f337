//! Error types for data parsing and tank geometry in tankfill-types.

use thiserror::Error;

/// Errors that can occur when decoding a sensor payload.
///
/// This error type is platform-agnostic and does not include
/// BLE-specific errors (those belong in tankfill-core).
///
/// This enum is marked `#[non_exhaustive]` to allow adding new error variants
/// in future versions without breaking downstream code.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum ParseError {
    /// The payload is too short to contain the distance field.
    #[error("Insufficient bytes: expected at least {expected}, got {actual}")]
    InsufficientBytes {
        /// Minimum number of bytes required.
        expected: usize,
        /// Number of bytes received.
        actual: usize,
    },

    /// The payload decoded to a value that cannot be a distance.
    #[error("Invalid value: {0}")]
    InvalidValue(String),
}

/// Result type alias using tankfill-types' ParseError type.
pub type ParseResult<T> = std::result::Result<T, ParseError>;

/// Invalid tank geometry or converter parameters.
///
/// These are configuration defects: they are reported eagerly on the first
/// conversion attempt and must be fixed where the geometry is configured.
#[derive(Debug, Clone, Copy, PartialEq, Error)]
#[non_exhaustive]
pub enum GeometryError {
    /// One of the bounds is NaN or infinite.
    #[error("Tank geometry must be finite numbers (min={min}, max={max})")]
    NonFinite { min: f64, max: f64 },

    /// One of the bounds is zero or negative.
    #[error("Tank geometry must be positive millimetres (min={min}, max={max})")]
    NonPositive { min: f64, max: f64 },

    /// The full-tank distance is not smaller than the empty-tank distance.
    #[error(
        "min_distance_mm ({min}) must be less than max_distance_mm ({max}); min is the FULL distance, max the EMPTY distance"
    )]
    Inverted { min: f64, max: f64 },

    /// Smoothing factor outside `(0, 1]`.
    #[error("Smoothing alpha must be in (0, 1], got {0}")]
    InvalidAlpha(f64),
}
