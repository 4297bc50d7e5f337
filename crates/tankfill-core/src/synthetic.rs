//! Synthetic readings for running without hardware.
//!
//! [`SyntheticSource`] produces readings with exactly the shape a live
//! [`SensorSession`](crate::session::SensorSession) produces: same
//! conversion, same persistence, same consumer contract. [`seed_history`]
//! backfills a run of past readings so charts have something to show.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use rand::Rng;
use tokio::time::{Instant, MissedTickBehavior, interval_at};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use tankfill_types::{Reading, TankGeometry, convert::clamp};

use crate::bus::{Listener, panic_message};
use crate::clock::{Clock, SharedClock};
use crate::error::{Error, Result};
use crate::history::{HistoryStore, SharedHistory, append_detached};

/// Ticks never come faster than this.
pub const MIN_TICK_INTERVAL: Duration = Duration::from_millis(250);

/// Tick interval when none is requested.
pub const DEFAULT_TICK_INTERVAL: Duration = Duration::from_millis(1000);

/// Oscillation amplitude as a fraction of half the range.
const AMPLITUDE_RATIO: f64 = 0.9;

/// Peak-to-peak noise as a fraction of the range.
const NOISE_RATIO: f64 = 0.02;

/// Synthetic distance for step `t`.
///
/// `mid + amplitude * sin(t / 10) + noise`, clamped to the geometry, where
/// `amplitude` is 90% of half the range and `noise` is `unit_noise` in
/// `[0, 1)` mapped onto ±1% of the range.
///
/// # Example
///
/// ```
/// use tankfill_core::synthetic::synthetic_distance;
/// use tankfill_types::TankGeometry;
///
/// let geometry = TankGeometry::new(100.0, 1000.0);
/// assert_eq!(synthetic_distance(&geometry, 0, 0.5), 550.0);
/// ```
pub fn synthetic_distance(geometry: &TankGeometry, t: u64, unit_noise: f64) -> f64 {
    let range = geometry.range();
    let mid = geometry.min_distance_mm + range / 2.0;
    let amplitude = range / 2.0 * AMPLITUDE_RATIO;
    let noise = (unit_noise - 0.5) * range * NOISE_RATIO;
    let phase = (t as f64 / 10.0).sin();
    clamp(
        mid + phase * amplitude + noise,
        geometry.min_distance_mm,
        geometry.max_distance_mm,
    )
}

/// Options for [`SyntheticSource::start`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyntheticOptions {
    /// Requested time between ticks.
    pub interval: Duration,
}

impl Default for SyntheticOptions {
    fn default() -> Self {
        Self {
            interval: DEFAULT_TICK_INTERVAL,
        }
    }
}

/// Periodic generator of synthetic readings.
pub struct SyntheticSource {
    geometry: TankGeometry,
    debounce: Duration,
    history: SharedHistory,
    clock: SharedClock,
    running: Mutex<Option<CancellationToken>>,
    ticks: Arc<AtomicU64>,
}

impl std::fmt::Debug for SyntheticSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyntheticSource")
            .field("geometry", &self.geometry)
            .field("debounce", &self.debounce)
            .field("running", &self.is_running())
            .field("ticks", &self.ticks())
            .finish_non_exhaustive()
    }
}

impl SyntheticSource {
    /// Create a stopped source.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidGeometry`] for an invalid geometry.
    pub fn new(
        geometry: TankGeometry,
        debounce: Duration,
        history: SharedHistory,
        clock: SharedClock,
    ) -> Result<Self> {
        geometry.validate()?;
        Ok(Self {
            geometry,
            debounce,
            history,
            clock,
            running: Mutex::new(None),
            ticks: Arc::new(AtomicU64::new(0)),
        })
    }

    /// The effective tick interval for `options`.
    pub fn tick_interval(&self, options: SyntheticOptions) -> Duration {
        options.interval.max(self.debounce).max(MIN_TICK_INTERVAL)
    }

    /// Start ticking, handing each reading to `consumer`.
    ///
    /// The first reading comes one interval after the call. Returns `false`
    /// without starting anything if the source is already running. Must be
    /// called within a tokio runtime.
    pub fn start(&self, consumer: Listener, options: SyntheticOptions) -> bool {
        let mut running = self.lock();
        if running.is_some() {
            debug!("Synthetic source already running");
            return false;
        }
        let cancel = CancellationToken::new();
        *running = Some(cancel.clone());

        let period = self.tick_interval(options);
        info!("Starting synthetic readings every {}ms", period.as_millis());

        let geometry = self.geometry;
        let history = Arc::clone(&self.history);
        let clock = Arc::clone(&self.clock);
        let ticks = Arc::clone(&self.ticks);
        tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {}
                }
                let t = ticks.fetch_add(1, Ordering::SeqCst) + 1;
                let distance_mm = synthetic_distance(&geometry, t, rand::rng().random::<f64>());
                let reading = match Reading::from_distance(clock.now_ms(), distance_mm, &geometry) {
                    Ok(reading) => reading,
                    Err(e) => {
                        warn!("Synthetic reading rejected: {}", e);
                        continue;
                    }
                };

                if let Err(e) = history.save_latest(&reading) {
                    warn!("Failed to save latest reading: {}", e);
                }
                append_detached(&history, reading);
                if let Err(payload) = catch_unwind(AssertUnwindSafe(|| consumer(&reading))) {
                    warn!(
                        "Synthetic reading consumer panicked: {}",
                        panic_message(payload.as_ref())
                    );
                }
            }
            debug!("Synthetic source stopped");
        });
        true
    }

    /// Stop ticking. Returns `false` if it was not running.
    pub fn stop(&self) -> bool {
        match self.lock().take() {
            Some(cancel) => {
                cancel.cancel();
                info!("Stopped synthetic readings");
                true
            }
            None => false,
        }
    }

    /// Whether the source is ticking.
    pub fn is_running(&self) -> bool {
        self.lock().is_some()
    }

    /// Ticks produced since creation.
    pub fn ticks(&self) -> u64 {
        self.ticks.load(Ordering::SeqCst)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Option<CancellationToken>> {
        self.running
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Drop for SyntheticSource {
    fn drop(&mut self) {
        if let Some(cancel) = self.lock().take() {
            cancel.cancel();
        }
    }
}

/// Options for [`seed_history`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SeedOptions {
    /// Hours of history to generate, ending now.
    pub hours: f64,
    /// Readings per hour.
    pub samples_per_hour: u32,
}

impl Default for SeedOptions {
    fn default() -> Self {
        Self {
            hours: 6.0,
            samples_per_hour: 12,
        }
    }
}

impl SeedOptions {
    /// Number of readings that will be written (at least one).
    pub fn total(&self) -> u64 {
        let total = (self.hours * f64::from(self.samples_per_hour)).floor();
        if total.is_finite() && total >= 1.0 {
            total as u64
        } else {
            1
        }
    }

    /// Milliseconds between readings.
    pub fn step_ms(&self) -> i64 {
        3_600_000 / i64::from(self.samples_per_hour.max(1))
    }
}

/// Backfill history with synthetic readings ending just before now.
///
/// Readings are written oldest first and never touch the latest-reading
/// slot. A failed append is logged and skipped. Returns how many readings
/// were written.
///
/// # Errors
///
/// Fails before writing anything if the geometry is invalid or
/// `samples_per_hour` is zero.
pub async fn seed_history(
    history: &dyn HistoryStore,
    geometry: &TankGeometry,
    clock: &dyn Clock,
    options: SeedOptions,
) -> Result<usize> {
    geometry.validate()?;
    if options.samples_per_hour == 0 {
        return Err(Error::invalid_config("samples per hour must be at least 1"));
    }

    let total = options.total();
    let step = options.step_ms();
    let now = clock.now_ms();
    info!("Seeding {} readings, {}ms apart", total, step);

    let mut written = 0;
    for i in (1..=total).rev() {
        let offset = i64::try_from(i).unwrap_or(i64::MAX).saturating_mul(step);
        let ts = now.saturating_sub(offset);
        let distance_mm = synthetic_distance(geometry, i, rand::rng().random::<f64>());
        let reading = Reading::from_distance(ts, distance_mm, geometry)?;
        match history.append(reading).await {
            Ok(()) => written += 1,
            Err(e) => warn!("Skipping seeded reading at {}: {}", ts, e),
        }
    }
    Ok(written)
}
