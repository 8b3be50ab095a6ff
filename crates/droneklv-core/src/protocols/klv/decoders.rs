//! Scalar decoders for KLV field payloads.
//!
//! Every registered tag maps to one [`Decoder`] variant. Linear fields read a
//! big-endian integer of fixed width and map it onto a physical range with
//! `output_span / input_span * raw + offset`; the numeric contract (width,
//! signedness, bounds, resolution) lives in the [`LinearScale`] next to the
//! formula that uses it.

use std::fmt;

use time::OffsetDateTime;

use super::error::KlvError;

/// Payload byte-length contract for a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadSize {
    Exact(usize),
    Between { min: usize, max: usize },
    Any,
}

impl PayloadSize {
    pub fn check(&self, actual: usize) -> Result<(), KlvError> {
        let ok = match *self {
            PayloadSize::Exact(len) => actual == len,
            PayloadSize::Between { min, max } => (min..=max).contains(&actual),
            PayloadSize::Any => true,
        };
        if ok {
            Ok(())
        } else {
            Err(KlvError::InvalidPayloadSize {
                expected: *self,
                actual,
            })
        }
    }
}

impl fmt::Display for PayloadSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PayloadSize::Exact(len) => write!(f, "exactly {len} bytes"),
            PayloadSize::Between { min, max } => write!(f, "{min}..={max} bytes"),
            PayloadSize::Any => write!(f, "any size"),
        }
    }
}

/// Big-endian integer encoding of a raw field value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntKind {
    U8,
    U16,
    I16,
    U32,
    I32,
    U64,
}

impl IntKind {
    pub const fn width(self) -> usize {
        match self {
            IntKind::U8 => 1,
            IntKind::U16 | IntKind::I16 => 2,
            IntKind::U32 | IntKind::I32 => 4,
            IntKind::U64 => 8,
        }
    }

    pub fn is_signed(self) -> bool {
        matches!(self, IntKind::I16 | IntKind::I32)
    }

    /// Smallest raw value inside the mapped range.
    ///
    /// Signed kinds are symmetric: the most negative two's complement value
    /// is reserved and sits outside the range.
    pub fn min_input(self) -> i128 {
        if self.is_signed() {
            -self.max_input()
        } else {
            0
        }
    }

    pub fn max_input(self) -> i128 {
        match self {
            IntKind::U8 => i128::from(u8::MAX),
            IntKind::U16 => i128::from(u16::MAX),
            IntKind::I16 => i128::from(i16::MAX),
            IntKind::U32 => i128::from(u32::MAX),
            IntKind::I32 => i128::from(i32::MAX),
            IntKind::U64 => i128::from(u64::MAX),
        }
    }

    /// Read the raw integer, requiring exactly `width()` bytes.
    pub fn read(self, payload: &[u8]) -> Result<i128, KlvError> {
        let bytes = exact::<8>(payload, self.width())?;
        let tail = &bytes[8 - self.width()..];
        let value = match self {
            IntKind::U8 => i128::from(tail[0]),
            IntKind::U16 => i128::from(u16::from_be_bytes([tail[0], tail[1]])),
            IntKind::I16 => i128::from(i16::from_be_bytes([tail[0], tail[1]])),
            IntKind::U32 => i128::from(u32::from_be_bytes([tail[0], tail[1], tail[2], tail[3]])),
            IntKind::I32 => i128::from(i32::from_be_bytes([tail[0], tail[1], tail[2], tail[3]])),
            IntKind::U64 => i128::from(u64::from_be_bytes(bytes)),
        };
        Ok(value)
    }

    /// Big-endian encoding of `raw`; used to build fixtures.
    pub fn encode(self, raw: i128) -> Vec<u8> {
        match self {
            IntKind::U8 => vec![raw as u8],
            IntKind::U16 => (raw as u16).to_be_bytes().to_vec(),
            IntKind::I16 => (raw as i16).to_be_bytes().to_vec(),
            IntKind::U32 => (raw as u32).to_be_bytes().to_vec(),
            IntKind::I32 => (raw as i32).to_be_bytes().to_vec(),
            IntKind::U64 => (raw as u64).to_be_bytes().to_vec(),
        }
    }
}

/// Right-aligns a payload of exactly `width` bytes into an `N`-byte array.
fn exact<const N: usize>(payload: &[u8], width: usize) -> Result<[u8; N], KlvError> {
    PayloadSize::Exact(width).check(payload.len())?;
    let mut out = [0u8; N];
    out[N - width..].copy_from_slice(payload);
    Ok(out)
}

/// Linear mapping from a fixed-width integer onto a physical range.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LinearScale {
    pub input: IntKind,
    /// Width of the output range (numerator of the scale factor).
    pub output_span: f64,
    /// Width of the input range (denominator of the scale factor).
    pub input_span: f64,
    pub offset: f64,
    pub min_output: f64,
    pub max_output: f64,
    /// Largest acceptable absolute decode error.
    pub resolution: f64,
}

impl LinearScale {
    pub fn apply(&self, raw: i128) -> f64 {
        self.output_span / self.input_span * raw as f64 + self.offset
    }

    pub fn decode(&self, payload: &[u8]) -> Result<f64, KlvError> {
        let raw = self.input.read(payload)?;
        Ok(self.apply(raw))
    }
}

/// Decoded field value.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Float(f64),
    Integer(u64),
    Text(String),
    Timestamp(OffsetDateTime),
    /// Registered tag without a transform.
    Bytes(Vec<u8>),
    /// Tag absent from the registry.
    Unknown(Vec<u8>),
}

impl FieldValue {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            FieldValue::Float(value) => Some(*value),
            FieldValue::Integer(value) => Some(*value as f64),
            _ => None,
        }
    }
}

/// Closed set of payload transforms.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Decoder {
    Linear(LinearScale),
    Unsigned(IntKind),
    /// Microseconds since the Unix epoch, 8 bytes unsigned.
    Timestamp,
    Text,
    Passthrough,
}

impl Decoder {
    pub fn decode(&self, payload: &[u8]) -> Result<FieldValue, KlvError> {
        match self {
            Decoder::Linear(scale) => scale.decode(payload).map(FieldValue::Float),
            Decoder::Unsigned(kind) => kind
                .read(payload)
                .map(|raw| FieldValue::Integer(raw as u64)),
            Decoder::Timestamp => decode_timestamp(payload).map(FieldValue::Timestamp),
            Decoder::Text => Ok(FieldValue::Text(decode_text(payload))),
            Decoder::Passthrough => Ok(FieldValue::Bytes(payload.to_vec())),
        }
    }
}

/// Decode an 8-byte microsecond Unix timestamp as UTC.
pub fn decode_timestamp(payload: &[u8]) -> Result<OffsetDateTime, KlvError> {
    let micros = IntKind::U64.read(payload)?;
    OffsetDateTime::from_unix_timestamp_nanos(micros * 1_000).map_err(|_| {
        KlvError::InvalidTimestamp {
            micros: micros as u64,
        }
    })
}

/// ISO 646 text; bytes outside 7-bit ASCII become U+FFFD.
pub fn decode_text(payload: &[u8]) -> String {
    payload
        .iter()
        .map(|byte| {
            if byte.is_ascii() {
                char::from(*byte)
            } else {
                char::REPLACEMENT_CHARACTER
            }
        })
        .collect()
}
