//! Platform-agnostic types for BLE tank level sensors.
//!
//! This crate holds the pieces of the acquisition pipeline that do not
//! touch a radio, a clock or a runtime, so they can be shared by the native
//! core and by any other front end.
//!
//! # Features
//!
//! - [`Reading`], [`TankGeometry`] and session state types
//! - Distance to percentage conversion and smoothing ([`convert`])
//! - Provisional payload decoding with a configurable layout ([`payload`])
//! - GATT identifier parsing and placeholder detection ([`uuid`])
//!
//! # Example
//!
//! ```
//! use tankfill_types::{TankGeometry, payload::decode_distance};
//!
//! let geometry = TankGeometry::new(100.0, 1000.0);
//! let distance = decode_distance(&[0x26, 0x02]).unwrap();
//! assert_eq!(geometry.percent(distance).unwrap(), 50.0);
//! ```

pub mod convert;
pub mod error;
pub mod payload;
pub mod types;
pub mod uuid;

pub use convert::{DEFAULT_SMOOTHING_ALPHA, distance_to_percent, smooth, validate_geometry};
pub use error::{GeometryError, ParseError, ParseResult};
pub use payload::{ByteOrder, PayloadLayout, decode_distance};
pub use types::{Reading, SessionState, TankGeometry, Transport};
