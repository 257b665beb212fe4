//! # zwgate-core
//!
//! The surface the gateway consumes from the device-control driver:
//!
//! - [`driver::Driver`]: async operations, a live state snapshot and the
//!   event/log subscription channels
//! - [`driver::InclusionUserCallbacks`]: decisions the driver asks for while
//!   an inclusion is running
//! - [`model`]: canonical (schema-independent) controller/node/value state
//! - [`events::DriverEvent`]: everything the driver pushes
//! - [`sim::SimulatedDriver`]: an in-memory driver for tests and demos

#![deny(unsafe_code)]

pub mod driver;
pub mod errors;
pub mod events;
pub mod logging;
pub mod model;
pub mod sim;

pub use driver::{Driver, InclusionUserCallbacks};
pub use errors::{DriverError, ZWaveErrorCode};
pub use events::{DriverEvent, SequencedEvent};
