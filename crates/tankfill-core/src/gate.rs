//! Time-based throttling of accepted samples.
//!
//! BLE notifications can arrive far faster than a display or a history
//! store needs them. The gate bounds the emission rate independently of the
//! transport's native rate.

/// Whether a sample at `now_ms` may be emitted given the last emission.
///
/// True iff `now_ms - last_emit_ms >= min_interval_ms`. The caller owns
/// `last_emit_ms` and updates it only when it actually emits.
///
/// # Example
///
/// ```
/// use tankfill_core::gate::should_emit;
///
/// assert!(!should_emit(1000, 900, 200));
/// assert!(should_emit(1100, 900, 200));
/// ```
pub fn should_emit(now_ms: i64, last_emit_ms: i64, min_interval_ms: u64) -> bool {
    i128::from(now_ms) - i128::from(last_emit_ms) >= i128::from(min_interval_ms)
}

/// Holds the last emission time for [`should_emit`].
///
/// The first sample is always accepted.
#[derive(Debug, Clone, Default)]
pub struct SamplingGate {
    min_interval_ms: u64,
    last_emit_ms: Option<i64>,
}

impl SamplingGate {
    /// Create a gate with the given minimum interval between emissions.
    pub fn new(min_interval_ms: u64) -> Self {
        Self {
            min_interval_ms,
            last_emit_ms: None,
        }
    }

    /// The configured minimum interval.
    pub fn min_interval_ms(&self) -> u64 {
        self.min_interval_ms
    }

    /// Time of the last accepted sample, if any.
    pub fn last_emit_ms(&self) -> Option<i64> {
        self.last_emit_ms
    }

    /// Decide on a sample at `now_ms`, recording it if accepted.
    pub fn try_accept(&mut self, now_ms: i64) -> bool {
        let open = match self.last_emit_ms {
            None => true,
            Some(last) => should_emit(now_ms, last, self.min_interval_ms),
        };
        if open {
            self.last_emit_ms = Some(now_ms);
        }
        open
    }

    /// Forget the last emission so the next sample passes.
    pub fn reset(&mut self) {
        self.last_emit_ms = None;
    }
}
