//! Distance to fill-percentage conversion.
//!
//! Distances are measured from the sensor down to the liquid surface, so a
//! smaller distance means a fuller tank:
//!
//! - `distance <= min_distance_mm` is 100% (full)
//! - `distance >= max_distance_mm` is 0% (empty)
//!
//! Everything here is pure: no state, no side effects.

use crate::error::GeometryError;

/// Default weight of the newest sample in [`smooth`].
pub const DEFAULT_SMOOTHING_ALPHA: f64 = 0.3;

/// Restrict `value` to `[min, max]`.
pub fn clamp(value: f64, min: f64, max: f64) -> f64 {
    value.max(min).min(max)
}

/// Check that the geometry bounds are finite, positive and ordered.
///
/// # Errors
///
/// - [`GeometryError::NonFinite`] if either bound is NaN or infinite
/// - [`GeometryError::NonPositive`] if either bound is `<= 0`
/// - [`GeometryError::Inverted`] if `min >= max`
pub fn validate_geometry(min_distance_mm: f64, max_distance_mm: f64) -> Result<(), GeometryError> {
    let (min, max) = (min_distance_mm, max_distance_mm);
    if !min.is_finite() || !max.is_finite() {
        return Err(GeometryError::NonFinite { min, max });
    }
    if min <= 0.0 || max <= 0.0 {
        return Err(GeometryError::NonPositive { min, max });
    }
    if min >= max {
        return Err(GeometryError::Inverted { min, max });
    }
    Ok(())
}

/// Convert a measured distance to a fill percentage in `[0, 100]`.
///
/// The geometry is validated on every call.
///
/// # Example
///
/// ```
/// use tankfill_types::convert::distance_to_percent;
///
/// assert_eq!(distance_to_percent(550.0, 100.0, 1000.0).unwrap(), 50.0);
/// assert_eq!(distance_to_percent(50.0, 100.0, 1000.0).unwrap(), 100.0);
/// assert_eq!(distance_to_percent(1200.0, 100.0, 1000.0).unwrap(), 0.0);
/// ```
pub fn distance_to_percent(
    distance_mm: f64,
    min_distance_mm: f64,
    max_distance_mm: f64,
) -> Result<f64, GeometryError> {
    validate_geometry(min_distance_mm, max_distance_mm)?;

    let span = max_distance_mm - min_distance_mm;
    let raw = ((max_distance_mm - distance_mm) / span) * 100.0;
    Ok(clamp(raw, 0.0, 100.0))
}

/// Exponential moving average of a noisy series.
///
/// With no previous value the new sample is returned unchanged. Smaller
/// `alpha` means heavier smoothing.
///
/// # Errors
///
/// Returns [`GeometryError::InvalidAlpha`] if `alpha` is outside `(0, 1]`.
pub fn smooth(previous: Option<f64>, next: f64, alpha: f64) -> Result<f64, GeometryError> {
    if !(alpha > 0.0 && alpha <= 1.0) {
        return Err(GeometryError::InvalidAlpha(alpha));
    }
    Ok(match previous {
        None => next,
        Some(prev) => alpha * next + (1.0 - alpha) * prev,
    })
}
