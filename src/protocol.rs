//! Domain types and constants of the CN740 Modbus-ASCII protocol.
//!
//! This module holds the strongly typed values exchanged with the controller
//! ([`Address`], [`BaudRate`], [`Request`], [`Measurement`], [`Reply`]) and the
//! conversions between degrees Celsius and raw register values. It performs
//! no I/O; framing lives in [`crate::codec`].

use std::fmt;

/// Errors raised when a caller supplies a value the protocol cannot carry.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum Error {
    /// The unit address is outside of `1..=255`.
    #[error("Unit address {0} is out of range ({min}..={max})", min = Address::MIN, max = Address::MAX)]
    AddressOutOfRange(u8),

    /// The setpoint cannot be represented as an unsigned tenth-of-degree register.
    #[error("Setpoint {0} °C is out of range ({min}..={max})", min = SETPOINT_MIN, max = SETPOINT_MAX)]
    SetpointOutOfRange(f64),

    /// The baud rate is not supported by the controller.
    #[error("Unsupported baud rate {0}")]
    BaudRateInvalid(u32),
}

/// Modbus function code for "read holding registers".
pub const FUNCTION_READ_HOLDING_REGISTERS: u8 = 0x03;
/// Modbus function code for "write single register".
pub const FUNCTION_WRITE_SINGLE_REGISTER: u8 = 0x06;
/// Bit set by the device on the echoed function code of an exception reply.
pub const FUNCTION_EXCEPTION_FLAG: u8 = 0x80;

/// First register of the process value / setpoint block.
pub const READ_MEASUREMENT_REG_ADDR: u16 = 0x4700;
/// Process value and setpoint are read in one exchange.
pub const READ_MEASUREMENT_REG_QUAN: u16 = 2;
/// Setpoint register.
pub const WRITE_SETPOINT_REG_ADDR: u16 = 0x4701;

/// Registers carry tenths of a degree.
pub const SCALE_FACTOR: f64 = 10.0;

pub const SETPOINT_MIN: f64 = 0.0;
pub const SETPOINT_MAX: f64 = u16::MAX as f64 / SCALE_FACTOR;

/// Converts a raw register value into degrees Celsius.
pub fn degree_celsius_decode(value: u16) -> f64 {
    value as f64 / SCALE_FACTOR
}

/// Converts degrees Celsius into a raw register value, rounding to the nearest tenth.
pub fn degree_celsius_encode(value: f64) -> Result<u16, Error> {
    let raw = (value * SCALE_FACTOR).round();
    if raw.is_finite() && (0.0..=u16::MAX as f64).contains(&raw) {
        Ok(raw as u16)
    } else {
        Err(Error::SetpointOutOfRange(value))
    }
}

/// The bus address (slave id) of one controller.
///
/// Address `0` is the Modbus broadcast address. Controllers never answer it,
/// so it cannot be used for a request/response exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(try_from = "u8", into = "u8"))]
pub struct Address(u8);

impl Address {
    pub const MIN: u8 = 1;
    pub const MAX: u8 = 255;
}

impl std::ops::Deref for Address {
    type Target = u8;
    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl Default for Address {
    fn default() -> Self {
        Self(0x01)
    }
}

impl TryFrom<u8> for Address {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        if (Self::MIN..=Self::MAX).contains(&value) {
            Ok(Self(value))
        } else {
            Err(Error::AddressOutOfRange(value))
        }
    }
}

impl From<Address> for u8 {
    fn from(address: Address) -> u8 {
        address.0
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#04x}", self.0)
    }
}

/// Serial line speeds supported by the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(try_from = "u32", into = "u32"))]
pub enum BaudRate {
    B2400,
    B4800,
    B9600,
    #[default]
    B19200,
    B38400,
}

impl TryFrom<u32> for BaudRate {
    type Error = Error;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        match value {
            2400 => Ok(BaudRate::B2400),
            4800 => Ok(BaudRate::B4800),
            9600 => Ok(BaudRate::B9600),
            19200 => Ok(BaudRate::B19200),
            38400 => Ok(BaudRate::B38400),
            _ => Err(Error::BaudRateInvalid(value)),
        }
    }
}

impl From<BaudRate> for u32 {
    fn from(baud_rate: BaudRate) -> u32 {
        match baud_rate {
            BaudRate::B2400 => 2400,
            BaudRate::B4800 => 4800,
            BaudRate::B9600 => 9600,
            BaudRate::B19200 => 19200,
            BaudRate::B38400 => 38400,
        }
    }
}

impl fmt::Display for BaudRate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", u32::from(*self))
    }
}

/// A single request sent to the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Request {
    ReadRegisters { start: u16, count: u16 },
    WriteRegister { address: u16, value: u16 },
}

impl Request {
    /// Reads the process value and the setpoint in one exchange.
    pub const READ_MEASUREMENT: Request = Request::ReadRegisters {
        start: READ_MEASUREMENT_REG_ADDR,
        count: READ_MEASUREMENT_REG_QUAN,
    };

    /// Builds the request writing `celsius` to the setpoint register.
    pub fn write_setpoint(celsius: f64) -> Result<Self, Error> {
        Ok(Request::WriteRegister {
            address: WRITE_SETPOINT_REG_ADDR,
            value: degree_celsius_encode(celsius)?,
        })
    }

    /// The function code selecting this operation.
    pub fn function_code(&self) -> u8 {
        match self {
            Request::ReadRegisters { .. } => FUNCTION_READ_HOLDING_REGISTERS,
            Request::WriteRegister { .. } => FUNCTION_WRITE_SINGLE_REGISTER,
        }
    }
}

/// Process value reported by the controller, with the setpoint when the
/// reply carried one.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Measurement {
    pub temperature: f64,
    pub setpoint: Option<f64>,
}

impl fmt::Display for Measurement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.1} °C", self.temperature)?;
        if let Some(setpoint) = self.setpoint {
            write!(f, " (setpoint {setpoint:.1} °C)")?;
        }
        Ok(())
    }
}

/// A successfully decoded reply.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Reply {
    Measurement(Measurement),
    WriteAck,
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn degree_celsius() {
        assert_eq!(degree_celsius_decode(0x04B0), 120.0);
        assert_eq!(degree_celsius_decode(0x012C), 30.0);
        assert_eq!(degree_celsius_decode(219), 21.9);
        assert_eq!(degree_celsius_decode(0), 0.0);
        assert_eq!(degree_celsius_decode(u16::MAX), 6553.5);

        assert_matches!(degree_celsius_encode(25.5), Ok(255));
        assert_matches!(degree_celsius_encode(21.9), Ok(219));
        assert_matches!(degree_celsius_encode(21.94), Ok(219));
        assert_matches!(degree_celsius_encode(21.96), Ok(220));
        assert_matches!(degree_celsius_encode(0.0), Ok(0));
        assert_matches!(degree_celsius_encode(6553.5), Ok(u16::MAX));
    }

    #[test]
    fn degree_celsius_out_of_range() {
        assert_matches!(
            degree_celsius_encode(6553.6),
            Err(Error::SetpointOutOfRange(..))
        );
        assert_matches!(
            degree_celsius_encode(-0.1),
            Err(Error::SetpointOutOfRange(..))
        );
        assert_matches!(
            degree_celsius_encode(f64::NAN),
            Err(Error::SetpointOutOfRange(..))
        );
        assert_matches!(
            degree_celsius_encode(f64::INFINITY),
            Err(Error::SetpointOutOfRange(..))
        );
        // Rounds to zero.
        assert_matches!(degree_celsius_encode(-0.04), Ok(0));
    }

    #[test]
    fn address() {
        assert_matches!(Address::try_from(0), Err(Error::AddressOutOfRange(0)));
        assert_eq!(*Address::try_from(1).unwrap(), 1);
        assert_eq!(*Address::try_from(255).unwrap(), 255);
        assert_eq!(*Address::default(), 1);
        assert_eq!(Address::try_from(3).unwrap().to_string(), "0x03");
    }

    #[test]
    fn baud_rate() {
        assert_eq!(BaudRate::default(), BaudRate::B19200);
        assert_eq!(BaudRate::try_from(9600), Ok(BaudRate::B9600));
        assert_eq!(BaudRate::try_from(1200), Err(Error::BaudRateInvalid(1200)));
        assert_eq!(u32::from(BaudRate::B38400), 38400);
        assert_eq!(BaudRate::B19200.to_string(), "19200");
    }

    #[test]
    fn write_setpoint_request() {
        assert_eq!(
            Request::write_setpoint(25.5),
            Ok(Request::WriteRegister {
                address: 0x4701,
                value: 0x00FF
            })
        );
        assert_eq!(Request::READ_MEASUREMENT.function_code(), 0x03);
        assert_matches!(
            Request::write_setpoint(-5.0),
            Err(Error::SetpointOutOfRange(..))
        );
    }

    #[test]
    fn measurement_display() {
        let m = Measurement {
            temperature: 120.0,
            setpoint: Some(30.0),
        };
        assert_eq!(m.to_string(), "120.0 °C (setpoint 30.0 °C)");
        let m = Measurement {
            temperature: 0.1,
            setpoint: None,
        };
        assert_eq!(m.to_string(), "0.1 °C");
    }
}
