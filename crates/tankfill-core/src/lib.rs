//! Acquisition pipeline for BLE tank level sensors.
//!
//! This crate connects to a distance sensor mounted above a tank (such as
//! the Shelly BLU Distance), turns its raw samples into fill-level
//! [`Reading`]s, persists them and fans them out to live consumers.
//!
//! # Features
//!
//! - **Session lifecycle**: connect, notify or poll transport, degraded mode,
//!   link-loss handling with idempotent teardown
//! - **Payload decoding**: configurable 16-bit field with endianness fallback
//! - **Throttling**: minimum interval between accepted samples
//! - **Fan-out**: panic-isolated listener set
//! - **History**: async storage seam with an in-memory implementation
//! - **Synthetic data**: a demo source and history backfill without hardware
//!
//! # Pipeline
//!
//! ```text
//! SensorLink / SyntheticSource
//!         -> PayloadLayout::decode -> SamplingGate -> distance_to_percent
//!         -> HistoryStore (latest slot + detached append) -> ReadingBus
//! ```
//!
//! # Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use tankfill_core::{
//!     BleConnector, MemoryHistory, ReadingBus, SensorSession, SessionConfig, SystemClock,
//!     detect_capabilities, listener,
//! };
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = SessionConfig::default()
//!         .gatt("0000181a-0000-1000-8000-00805f9b34fb", "0x2A6F");
//!     let bus = ReadingBus::new();
//!     let print = listener(|r| println!("{:.1}% ({} mm)", r.percent, r.distance_mm));
//!     bus.subscribe(&print);
//!
//!     let session = SensorSession::new(
//!         config.clone(),
//!         Arc::new(BleConnector::new(config.connection)),
//!         Arc::new(detect_capabilities().await),
//!         Arc::new(MemoryHistory::new()),
//!         bus,
//!         Arc::new(SystemClock),
//!     );
//!     session.connect_default().await?;
//!     tokio::signal::ctrl_c().await?;
//!     session.disconnect().await?;
//!     Ok(())
//! }
//! ```

pub mod bus;
pub mod clock;
pub mod config;
pub mod device;
pub mod error;
pub mod events;
pub mod gate;
pub mod history;
pub mod mock;
pub mod pipeline;
pub mod platform;
pub mod scan;
pub mod session;
pub mod synthetic;
pub mod traits;

pub use bus::{Listener, ReadingBus, listener};
pub use clock::{Clock, ManualClock, SharedClock, SystemClock, TokioClock};
pub use config::{ConnectionConfig, SessionConfig};
pub use device::{BleConnector, BleLink};
pub use error::{ConnectionFailureReason, Error, Result};
pub use events::{DisconnectReason, EventDispatcher, EventReceiver, SessionEvent};
pub use gate::{SamplingGate, should_emit};
pub use history::{DEFAULT_RECENT_LIMIT, HistoryStore, MemoryHistory, SharedHistory};
pub use mock::{MockConnector, MockLink, MockLinkBuilder};
pub use pipeline::{Pipeline, SampleOutcome};
pub use platform::{
    CapabilityOracle, Platform, PlatformCapabilities, PlatformInfo, detect_capabilities,
};
pub use session::SensorSession;
pub use synthetic::{SeedOptions, SyntheticOptions, SyntheticSource, seed_history, synthetic_distance};
pub use traits::{
    Candidate, CharacteristicId, CharacteristicProperties, Connector, DeviceFilter, DevicePicker,
    PayloadStream, SensorLink, StrongestSignal,
};

pub use tankfill_types::{
    ByteOrder, GeometryError, ParseError, PayloadLayout, Reading, SessionState, TankGeometry,
    Transport, distance_to_percent, smooth, validate_geometry,
};
