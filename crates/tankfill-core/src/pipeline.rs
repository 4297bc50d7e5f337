//! Turning raw samples into published readings.
//!
//! Every inbound payload goes through the same steps regardless of where
//! it came from:
//!
//! 1. decode the distance ([`PayloadLayout::decode`]); undecodable samples
//!    are dropped
//! 2. throttle ([`SamplingGate`])
//! 3. optionally smooth, then convert to a fill percentage
//! 4. store the reading as the latest value, append it to history without
//!    waiting, and publish it on the [`ReadingBus`]

use tracing::{debug, warn};

use tankfill_types::{PayloadLayout, Reading, TankGeometry, smooth};

use crate::bus::ReadingBus;
use crate::clock::SharedClock;
use crate::config::SessionConfig;
use crate::error::Result;
use crate::gate::SamplingGate;
use crate::history::{SharedHistory, append_detached};

/// What happened to one sample.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SampleOutcome {
    /// A reading was produced and published.
    Emitted(Reading),
    /// The payload did not contain a distance.
    Undecodable,
    /// The sample arrived too soon after the previous emission.
    Throttled,
}

impl SampleOutcome {
    /// The emitted reading, if any.
    pub fn reading(&self) -> Option<Reading> {
        match self {
            SampleOutcome::Emitted(reading) => Some(*reading),
            _ => None,
        }
    }
}

/// Per-connection sample processor.
pub struct Pipeline {
    geometry: TankGeometry,
    layout: PayloadLayout,
    gate: SamplingGate,
    smoothing_alpha: Option<f64>,
    smoothed: Option<f64>,
    clock: SharedClock,
    history: SharedHistory,
    bus: ReadingBus,
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("geometry", &self.geometry)
            .field("layout", &self.layout)
            .field("gate", &self.gate)
            .field("smoothing_alpha", &self.smoothing_alpha)
            .finish_non_exhaustive()
    }
}

impl Pipeline {
    /// Build a pipeline for `config`.
    ///
    /// # Errors
    ///
    /// Fails if the geometry, payload layout or smoothing factor is invalid.
    pub fn new(
        config: &SessionConfig,
        clock: SharedClock,
        history: SharedHistory,
        bus: ReadingBus,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            geometry: config.geometry,
            layout: config.payload,
            gate: SamplingGate::new(config.debounce_ms),
            smoothing_alpha: config.smoothing_alpha,
            smoothed: None,
            clock,
            history,
            bus,
        })
    }

    /// Process a raw characteristic payload.
    pub fn process_payload(&mut self, payload: &[u8]) -> SampleOutcome {
        match self.layout.decode(payload) {
            Ok(distance_mm) => self.process_distance(distance_mm),
            Err(e) => {
                debug!("Dropping undecodable payload {:02x?}: {}", payload, e);
                SampleOutcome::Undecodable
            }
        }
    }

    /// Process an already decoded distance.
    pub fn process_distance(&mut self, distance_mm: f64) -> SampleOutcome {
        if !distance_mm.is_finite() {
            debug!("Dropping non-finite distance");
            return SampleOutcome::Undecodable;
        }
        let now = self.clock.now_ms();
        if !self.gate.try_accept(now) {
            return SampleOutcome::Throttled;
        }

        let distance_mm = self.apply_smoothing(distance_mm);
        // Geometry was validated in `new`.
        let percent = match self.geometry.percent(distance_mm) {
            Ok(p) => p,
            Err(e) => {
                warn!("Dropping sample: {}", e);
                return SampleOutcome::Undecodable;
            }
        };
        let reading = Reading::new(now, distance_mm, percent);
        emit(&reading, &self.history, &self.bus);
        SampleOutcome::Emitted(reading)
    }

    fn apply_smoothing(&mut self, distance_mm: f64) -> f64 {
        let Some(alpha) = self.smoothing_alpha else {
            return distance_mm;
        };
        let value = smooth(self.smoothed, distance_mm, alpha).unwrap_or(distance_mm);
        self.smoothed = Some(value);
        value
    }
}

/// Persist and publish a reading.
///
/// The latest slot is written synchronously, the history append runs
/// detached, and publication never waits on or fails with storage.
pub(crate) fn emit(reading: &Reading, history: &SharedHistory, bus: &ReadingBus) {
    if let Err(e) = history.save_latest(reading) {
        warn!("Failed to save latest reading: {}", e);
    }
    append_detached(history, *reading);
    bus.publish(reading);
}
