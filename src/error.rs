//! The error type returned by every exchange with a controller.
use crate::protocol as proto;

/// Represents all possible failures of a request/response exchange.
///
/// None of these variants carries a substitute reading: a caller that wants a
/// placeholder (for example `NaN` in a plot) applies that policy itself.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// The serial device could not be opened.
    #[error("Serial port {device} is unavailable: {source}")]
    PortUnavailable {
        device: String,
        #[source]
        source: std::io::Error,
    },

    /// No line terminator was observed within the read window.
    #[error("Timed out waiting for a reply")]
    Timeout,

    /// A reply was received but does not have the expected structure.
    #[error("Malformed reply: {0}")]
    MalformedReply(&'static str),

    /// A structurally valid reply whose LRC disagrees with its body.
    #[error("Checksum mismatch: expected {expected:#04x}, found {found:#04x}")]
    ChecksumMismatch { expected: u8, found: u8 },

    /// The write reply echoed a different register or value.
    #[error("Write rejected: device echoed register {register:#06x} value {value:#06x}")]
    WriteRejected { register: u16, value: u16 },

    /// Another exchange is in flight on the same line.
    #[error("Another request is outstanding on this line")]
    Busy,

    /// The device answered with a Modbus exception.
    #[error("Device exception {code:#04x} for function {function:#04x}")]
    Exception { function: u8, code: u8 },

    /// Writing to or reading from the line failed.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Wraps `proto::Error`.
    #[error(transparent)]
    Protocol(#[from] proto::Error),
}

/// The result type for exchanges with a controller.
pub type Result<T> = std::result::Result<T, Error>;
