//! Request/response sessions with a single controller.
//!
//! A [`DeviceSession`] binds a unit address to a line. Several sessions may
//! share one line (controllers with distinct addresses on the same bus); the
//! line is then guarded by one mutex and only one exchange can be in flight
//! on it at a time.
//!
//! ## Example
//!
//! ```no_run
//! use cn740_lib::{config::SerialConfig, protocol::Address, session::DeviceSession};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = SerialConfig::new("/dev/ttyUSB0");
//!     let session = DeviceSession::open(&config, Address::try_from(3)?)?;
//!
//!     let measurement = session.read_measurement()?;
//!     println!("Current value: {measurement}");
//!
//!     session.write_setpoint(25.5)?;
//!     Ok(())
//! }
//! ```

use crate::{
    codec,
    error::{Error, Result},
    protocol as proto,
    transport::{Transport, LINE_END},
};
use log::*;
use std::sync::{Arc, Mutex, TryLockError};
use std::time::Duration;

/// Session with one controller on a (possibly shared) line.
#[derive(Debug)]
pub struct DeviceSession<T> {
    bus: Arc<Mutex<T>>,
    unit: proto::Address,
    timeout: Duration,
}

impl<T> Clone for DeviceSession<T> {
    fn clone(&self) -> Self {
        Self {
            bus: self.bus.clone(),
            unit: self.unit,
            timeout: self.timeout,
        }
    }
}

#[cfg(feature = "serial")]
impl DeviceSession<crate::transport::SerialTransport> {
    /// Opens the serial line described by `config` and binds it to `unit`.
    ///
    /// # Errors
    ///
    /// [`Error::PortUnavailable`] if the device cannot be opened.
    pub fn open(config: &crate::config::SerialConfig, unit: proto::Address) -> Result<Self> {
        let transport = crate::transport::SerialTransport::open(config)?;
        let mut session = Self::new(transport, unit);
        session.set_timeout(config.timeout);
        Ok(session)
    }
}

impl<T: Transport> DeviceSession<T> {
    /// Creates a session owning `transport`.
    pub fn new(transport: T, unit: proto::Address) -> Self {
        Self::from_shared(Arc::new(Mutex::new(transport)), unit)
    }

    /// Creates a session on a line already used by other sessions.
    pub fn from_shared(bus: Arc<Mutex<T>>, unit: proto::Address) -> Self {
        Self {
            bus,
            unit,
            timeout: crate::config::SerialConfig::DEFAULT_TIMEOUT,
        }
    }

    /// Clones the shared line, e.g. to bind another unit address to it.
    pub fn clone_shared(&self) -> Arc<Mutex<T>> {
        self.bus.clone()
    }

    pub fn unit(&self) -> proto::Address {
        self.unit
    }

    /// Time allowed for a complete reply to arrive.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn set_timeout(&mut self, timeout: Duration) {
        self.timeout = timeout;
    }

    /// Reads the current process value and setpoint.
    ///
    /// # Errors
    ///
    /// * [`Error::Busy`] if another exchange is in flight on the line.
    /// * [`Error::Timeout`] if no complete line arrived in time.
    /// * [`Error::MalformedReply`], [`Error::ChecksumMismatch`] or
    ///   [`Error::Exception`] if the reply cannot be trusted.
    /// * [`Error::Io`] if the line itself failed.
    pub fn read_measurement(&self) -> Result<proto::Measurement> {
        match self.exchange(&proto::Request::READ_MEASUREMENT)? {
            proto::Reply::Measurement(measurement) => {
                debug!("Unit {}: {measurement}", self.unit);
                Ok(measurement)
            }
            proto::Reply::WriteAck => Err(Error::MalformedReply("expected a measurement")),
        }
    }

    /// Writes a new setpoint in degrees Celsius, rounded to a tenth.
    ///
    /// # Errors
    ///
    /// * [`Error::Protocol`] if `celsius` cannot be represented; nothing is sent.
    /// * [`Error::WriteRejected`] if the controller echoed another register or value.
    /// * Any error of [`Self::read_measurement`].
    pub fn write_setpoint(&self, celsius: f64) -> Result<()> {
        let request = proto::Request::write_setpoint(celsius)?;
        match self.exchange(&request)? {
            proto::Reply::WriteAck => {
                debug!("Unit {}: setpoint set to {celsius:.1} °C", self.unit);
                Ok(())
            }
            proto::Reply::Measurement(_) => {
                Err(Error::MalformedReply("expected a write acknowledgement"))
            }
        }
    }

    /// Sends `request` and decodes its reply while holding the line.
    fn exchange(&self, request: &proto::Request) -> Result<proto::Reply> {
        let mut bus = match self.bus.try_lock() {
            Ok(bus) => bus,
            Err(TryLockError::WouldBlock) => return Err(Error::Busy),
            Err(TryLockError::Poisoned(poisoned)) => {
                warn!(
                    "Unit {}: previous exchange on this line was aborted, continuing",
                    self.unit
                );
                self.bus.clear_poison();
                poisoned.into_inner()
            }
        };

        let frame = codec::encode(self.unit, request);
        trace!("Unit {}: sending {frame}", self.unit);
        bus.write_frame(frame.as_bytes())?;

        let line = bus.read_line(self.timeout)?;
        trace!(
            "Unit {}: received {:?}",
            self.unit,
            String::from_utf8_lossy(&line)
        );
        if !line.ends_with(LINE_END) {
            return Err(Error::Timeout);
        }
        codec::decode_reply(self.unit, request, &line)
    }
}
