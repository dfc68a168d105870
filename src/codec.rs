//! Stateless encoding and decoding of Modbus-ASCII frames.
//!
//! A frame on the wire looks like `:AAFFDDDD…CC\r\n`: a colon, the hex encoded
//! body (unit address, function code and data), the two digit LRC of the body
//! and a CR LF terminator. Output is always upper case; input is accepted in
//! either case.
//!
//! ```
//! use cn740_lib::{codec, protocol::Address};
//!
//! let unit = Address::try_from(3).unwrap();
//! let frame = codec::encode_read(unit, 0x4700, 2);
//! assert_eq!(frame.as_bytes(), b":030347000002B1\r\n");
//! ```

use crate::{
    error::{Error, Result},
    protocol as proto,
};
use std::fmt;

const FRAME_START: u8 = b':';
const FRAME_END: &[u8; 2] = b"\r\n";
const HEX_DIGITS: &[u8; 16] = b"0123456789ABCDEF";

/// Longitudinal redundancy check: the two's complement of the byte sum.
pub fn lrc(body: &[u8]) -> u8 {
    body.iter()
        .fold(0u8, |sum, byte| sum.wrapping_add(*byte))
        .wrapping_neg()
}

/// A complete, checksummed ASCII frame ready to be written to the line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawFrame(Vec<u8>);

impl RawFrame {
    /// Builds a frame from the binary body, appending the LRC.
    pub(crate) fn from_body(body: &[u8]) -> Self {
        let mut frame = Vec::with_capacity(body.len() * 2 + 5);
        frame.push(FRAME_START);
        for byte in body.iter().copied().chain(std::iter::once(lrc(body))) {
            frame.extend_from_slice(&hex_pair(byte));
        }
        frame.extend_from_slice(FRAME_END);
        Self(frame)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// The hex digits between the start character and the checksum.
    pub fn body(&self) -> &[u8] {
        &self.0[1..self.0.len() - 4]
    }

    /// The two hex digits of the checksum.
    pub fn checksum(&self) -> &[u8] {
        &self.0[self.0.len() - 4..self.0.len() - 2]
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.0
    }
}

impl AsRef<[u8]> for RawFrame {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Display for RawFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Frames only ever contain ASCII.
        let text = String::from_utf8_lossy(&self.0[..self.0.len() - FRAME_END.len()]);
        write!(f, "{text}")
    }
}

fn hex_pair(byte: u8) -> [u8; 2] {
    [
        HEX_DIGITS[(byte >> 4) as usize],
        HEX_DIGITS[(byte & 0x0F) as usize],
    ]
}

fn hex_digit(c: u8) -> Option<u8> {
    match c {
        b'0'..=b'9' => Some(c - b'0'),
        b'A'..=b'F' => Some(c - b'A' + 10),
        b'a'..=b'f' => Some(c - b'a' + 10),
        _ => None,
    }
}

/// Encodes a "read holding registers" request.
pub fn encode_read(unit: proto::Address, start_register: u16, register_count: u16) -> RawFrame {
    let [start_hi, start_lo] = start_register.to_be_bytes();
    let [count_hi, count_lo] = register_count.to_be_bytes();
    RawFrame::from_body(&[
        *unit,
        proto::FUNCTION_READ_HOLDING_REGISTERS,
        start_hi,
        start_lo,
        count_hi,
        count_lo,
    ])
}

/// Encodes a "write single register" request.
pub fn encode_write(unit: proto::Address, register: u16, raw_value: u16) -> RawFrame {
    let [register_hi, register_lo] = register.to_be_bytes();
    let [value_hi, value_lo] = raw_value.to_be_bytes();
    RawFrame::from_body(&[
        *unit,
        proto::FUNCTION_WRITE_SINGLE_REGISTER,
        register_hi,
        register_lo,
        value_hi,
        value_lo,
    ])
}

/// Encodes any request.
pub fn encode(unit: proto::Address, request: &proto::Request) -> RawFrame {
    match *request {
        proto::Request::ReadRegisters { start, count } => encode_read(unit, start, count),
        proto::Request::WriteRegister { address, value } => encode_write(unit, address, value),
    }
}

/// Sequential reader over the hex digits of a reply.
///
/// Every byte read is accumulated so the LRC can be recomputed over exactly
/// the bytes that were decoded.
struct HexReader<'a> {
    input: &'a [u8],
    body: Vec<u8>,
}

impl<'a> HexReader<'a> {
    fn new(input: &'a [u8]) -> Self {
        Self {
            input,
            body: Vec::with_capacity(input.len() / 2),
        }
    }

    fn next_byte(&mut self) -> Result<u8> {
        let Some((pair, rest)) = self.input.split_first_chunk::<2>() else {
            return Err(Error::MalformedReply("reply is truncated"));
        };
        let byte = match (hex_digit(pair[0]), hex_digit(pair[1])) {
            (Some(hi), Some(lo)) => (hi << 4) | lo,
            _ => return Err(Error::MalformedReply("reply contains a non-hex character")),
        };
        self.input = rest;
        Ok(byte)
    }

    fn byte(&mut self) -> Result<u8> {
        let byte = self.next_byte()?;
        self.body.push(byte);
        Ok(byte)
    }

    fn word(&mut self) -> Result<u16> {
        Ok(u16::from_be_bytes([self.byte()?, self.byte()?]))
    }

    /// Reads the declared checksum, requires the frame to end there and
    /// compares it against the LRC of everything read so far.
    fn finish(mut self) -> Result<()> {
        let found = self.next_byte()?;
        if self.input.iter().any(|c| !matches!(c, b'\r' | b'\n')) {
            return Err(Error::MalformedReply("unexpected data after checksum"));
        }
        let expected = lrc(&self.body);
        if expected != found {
            return Err(Error::ChecksumMismatch { expected, found });
        }
        Ok(())
    }
}

fn find_marker(haystack: &[u8], marker: &[u8]) -> Option<usize> {
    haystack
        .windows(marker.len())
        .position(|window| window.eq_ignore_ascii_case(marker))
}

fn marker(unit: proto::Address, function: u8) -> [u8; 4] {
    let [a, b] = hex_pair(*unit);
    let [c, d] = hex_pair(function);
    [a, b, c, d]
}

/// Decodes the reply to `request` sent to `unit`.
///
/// Bytes before the `unit + function` marker are ignored. The LRC is always
/// verified before any decoded value is returned.
pub fn decode_reply(
    unit: proto::Address,
    request: &proto::Request,
    raw: &[u8],
) -> Result<proto::Reply> {
    let function = request.function_code();
    let Some(start) = find_marker(raw, &marker(unit, function)) else {
        return decode_exception(unit, function, raw);
    };

    let mut reader = HexReader::new(&raw[start..]);
    reader.byte()?; // unit
    reader.byte()?; // function

    match *request {
        proto::Request::ReadRegisters { .. } => {
            let byte_count = reader.byte()?;
            let measurement = match byte_count {
                4 => proto::Measurement {
                    temperature: proto::degree_celsius_decode(reader.word()?),
                    setpoint: Some(proto::degree_celsius_decode(reader.word()?)),
                },
                // A lone register is reported as the plain integer reading.
                2 => proto::Measurement {
                    temperature: f64::from(reader.word()?),
                    setpoint: None,
                },
                _ => return Err(Error::MalformedReply("unexpected byte count")),
            };
            reader.finish()?;
            Ok(proto::Reply::Measurement(measurement))
        }
        proto::Request::WriteRegister { address, value } => {
            let echoed_register = reader.word()?;
            let echoed_value = reader.word()?;
            reader.finish()?;
            if (echoed_register, echoed_value) != (address, value) {
                return Err(Error::WriteRejected {
                    register: echoed_register,
                    value: echoed_value,
                });
            }
            Ok(proto::Reply::WriteAck)
        }
    }
}

fn decode_exception(unit: proto::Address, function: u8, raw: &[u8]) -> Result<proto::Reply> {
    let exception_function = function | proto::FUNCTION_EXCEPTION_FLAG;
    let Some(start) = find_marker(raw, &marker(unit, exception_function)) else {
        return Err(Error::MalformedReply("reply marker not found"));
    };
    let mut reader = HexReader::new(&raw[start..]);
    reader.byte()?;
    reader.byte()?;
    let code = reader.byte()?;
    reader.finish()?;
    Err(Error::Exception { function, code })
}

/// Decodes a request frame as a controller would see it.
///
/// The frame must start with `:`; this is the counterpart of [`encode`] and
/// is what a simulated device on the line uses to answer requests.
pub fn decode_request(raw: &[u8]) -> Result<(proto::Address, proto::Request)> {
    let Some((&FRAME_START, rest)) = raw.split_first() else {
        return Err(Error::MalformedReply("request does not start with ':'"));
    };
    let mut reader = HexReader::new(rest);
    let unit = proto::Address::try_from(reader.byte()?)?;
    let function = reader.byte()?;
    let request = match function {
        proto::FUNCTION_READ_HOLDING_REGISTERS => proto::Request::ReadRegisters {
            start: reader.word()?,
            count: reader.word()?,
        },
        proto::FUNCTION_WRITE_SINGLE_REGISTER => proto::Request::WriteRegister {
            address: reader.word()?,
            value: reader.word()?,
        },
        _ => return Err(Error::MalformedReply("unsupported function code")),
    };
    reader.finish()?;
    Ok((unit, request))
}
