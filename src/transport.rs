//! The physical line a controller is attached to.
//!
//! A [`Transport`] moves bytes and nothing else: it knows about line
//! terminators and timeouts but not about unit addresses, function codes or
//! checksums.

use std::io;
use std::time::Duration;

/// Line terminator of every frame.
pub const LINE_END: &[u8; 2] = b"\r\n";

/// A byte oriented, line terminated connection to one or more controllers.
pub trait Transport {
    /// Writes a complete frame.
    ///
    /// Either the whole frame is handed to the line or an error is returned.
    fn write_frame(&mut self, frame: &[u8]) -> io::Result<()>;

    /// Reads until `\r\n` is seen or `timeout` elapses.
    ///
    /// Returns whatever was accumulated, which may be empty or lack the
    /// terminator. Running out of time is not an error.
    fn read_line(&mut self, timeout: Duration) -> io::Result<Vec<u8>>;
}

#[cfg(feature = "serial")]
pub use serial::{serial_port_builder, SerialTransport};

#[cfg(feature = "serial")]
mod serial {
    use super::{Transport, LINE_END};
    use crate::{config::SerialConfig, error::Error};
    use std::io::{self, Read, Write};
    use std::time::{Duration, Instant};
    use tokio_serial::{ClearBuffer, SerialPort};

    /// The parity used for serial communication.
    pub const PARITY: &tokio_serial::Parity = &tokio_serial::Parity::None;
    /// The number of stop bits used for serial communication.
    pub const STOP_BITS: &tokio_serial::StopBits = &tokio_serial::StopBits::One;
    /// The number of data bits used for serial communication.
    pub const DATA_BITS: &tokio_serial::DataBits = &tokio_serial::DataBits::Eight;

    /// Creates a `tokio_serial::SerialPortBuilder` with the line settings of the controller.
    pub fn serial_port_builder(config: &SerialConfig) -> tokio_serial::SerialPortBuilder {
        tokio_serial::new(config.device.as_str(), u32::from(config.baud_rate))
            .parity(*PARITY)
            .stop_bits(*STOP_BITS)
            .data_bits(*DATA_BITS)
            .flow_control(tokio_serial::FlowControl::None)
            .timeout(config.timeout)
    }

    /// A serial port in blocking mode.
    pub struct SerialTransport {
        port: Box<dyn SerialPort>,
    }

    impl std::fmt::Debug for SerialTransport {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            f.debug_struct("SerialTransport")
                .field("port", &self.port.name())
                .finish()
        }
    }

    impl SerialTransport {
        /// Opens the device and discards anything left in its buffers.
        ///
        /// # Errors
        ///
        /// [`Error::PortUnavailable`] if the device cannot be opened or configured.
        pub fn open(config: &SerialConfig) -> Result<Self, Error> {
            let unavailable = |err: tokio_serial::Error| Error::PortUnavailable {
                device: config.device.clone(),
                source: err.into(),
            };
            log::debug!(
                "Opening {} at {} baud, timeout {:?}",
                config.device,
                config.baud_rate,
                config.timeout
            );
            let port = serial_port_builder(config).open().map_err(unavailable)?;
            port.clear(ClearBuffer::All).map_err(unavailable)?;
            if !config.settle_time.is_zero() {
                std::thread::sleep(config.settle_time);
            }
            Ok(Self { port })
        }
    }

    impl Transport for SerialTransport {
        fn write_frame(&mut self, frame: &[u8]) -> io::Result<()> {
            self.port.write_all(frame)?;
            self.port.flush()
        }

        fn read_line(&mut self, timeout: Duration) -> io::Result<Vec<u8>> {
            let deadline = Instant::now() + timeout;
            let mut line = Vec::new();
            // One byte at a time so nothing past the terminator is consumed.
            while !line.ends_with(LINE_END) {
                let now = Instant::now();
                if now >= deadline {
                    break;
                }
                self.port.set_timeout(deadline - now)?;
                match read_byte(&mut self.port)? {
                    Some(byte) => line.push(byte),
                    None => break,
                }
            }
            Ok(line)
        }
    }

    /// Reads a single byte; `None` once the line went quiet or was closed.
    fn read_byte(reader: &mut impl Read) -> io::Result<Option<u8>> {
        let mut byte = [0u8; 1];
        loop {
            match reader.read(&mut byte) {
                Ok(0) => return Ok(None),
                Ok(_) => return Ok(Some(byte[0])),
                Err(err) if err.kind() == io::ErrorKind::TimedOut => return Ok(None),
                Err(err) if err.kind() == io::ErrorKind::Interrupted => {}
                Err(err) => return Err(err),
            }
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;
        use assert_matches::assert_matches;

        /// Reader that fails every call with the given error kind.
        struct Failing(io::ErrorKind);

        impl Read for Failing {
            fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
                Err(io::Error::from(self.0))
            }
        }

        #[test]
        fn open_missing_device() {
            let config = SerialConfig {
                settle_time: Duration::ZERO,
                ..SerialConfig::new("/dev/does-not-exist")
            };
            assert_matches!(
                SerialTransport::open(&config),
                Err(Error::PortUnavailable { device, .. }) if device == "/dev/does-not-exist"
            );
        }

        #[test]
        fn read_byte_stops_at_end_of_input() {
            let mut input: &[u8] = b":0";
            assert_eq!(read_byte(&mut input).unwrap(), Some(b':'));
            assert_eq!(read_byte(&mut input).unwrap(), Some(b'0'));
            // A closed line returns zero bytes; this must end the read, not repeat it.
            assert_eq!(read_byte(&mut input).unwrap(), None);
        }

        #[test]
        fn read_byte_timeout_is_not_an_error() {
            assert_eq!(
                read_byte(&mut Failing(io::ErrorKind::TimedOut)).unwrap(),
                None
            );
            assert_matches!(
                read_byte(&mut Failing(io::ErrorKind::BrokenPipe)),
                Err(err) if err.kind() == io::ErrorKind::BrokenPipe
            );
        }
    }
}
