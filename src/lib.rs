//! A library for polling CN740 process temperature controllers over Modbus-ASCII.
//!
//! The controller is read and commanded through a point-to-point (or
//! multi-drop) serial line using ASCII frames with an LRC checksum. The crate
//! is split the way an exchange flows:
//!
//! 1.  **[`codec`]**: pure encoding of requests and decoding of replies,
//!     including checksum computation and validation. No I/O.
//! 2.  **[`transport`]**: the [`transport::Transport`] trait for the physical
//!     line and a serial implementation (feature `serial`).
//! 3.  **[`session`]**: [`session::DeviceSession`], which binds a unit address
//!     to a line and offers `read_measurement` and `write_setpoint`.
//!
//! Every failed exchange surfaces as a distinct [`Error`]; no reading is ever
//! substituted by a placeholder value.
//!
//! ## Quick Start
//!
//! ```no_run
//! use cn740_lib::{config::SerialConfig, protocol::Address, session::DeviceSession};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = SerialConfig::new("/dev/ttyUSB0");
//!     let session = DeviceSession::open(&config, Address::try_from(3)?)?;
//!
//!     let measurement = session.read_measurement()?;
//!     println!("Temperature: {} °C", measurement.temperature);
//!
//!     Ok(())
//! }
//! ```

pub mod codec;
pub mod config;
pub mod error;
pub mod protocol;
pub mod session;
pub mod transport;

pub use error::{Error, Result};
