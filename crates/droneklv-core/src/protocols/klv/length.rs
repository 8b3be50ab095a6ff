//! BER length codec.
//!
//! Short form: one byte, high bit clear, value in the low 7 bits.
//! Long form: first byte `0x80 | n`, followed by `n` big-endian value bytes.

use super::error::KlvError;
use super::layout;

/// Decode a BER length at `offset`.
///
/// Returns `(bytes_consumed, value)`.
///
/// # Examples
/// ```
/// use droneklv_core::protocols::klv::decode_length;
///
/// assert_eq!(decode_length(&[0x05], 0).unwrap(), (1, 5));
/// assert_eq!(decode_length(&[0xFF, 0x82, 0x01, 0x00], 1).unwrap(), (3, 256));
/// ```
///
/// # Errors
/// `TruncatedInput` when the buffer ends before the declared length bytes,
/// `LengthTooWide` when the value would not fit in 64 bits.
pub fn decode_length(buffer: &[u8], offset: usize) -> Result<(usize, u64), KlvError> {
    let first = *buffer.get(offset).ok_or(KlvError::TruncatedInput {
        needed: offset.saturating_add(1),
        actual: buffer.len(),
    })?;

    if first & layout::LONG_FORM_FLAG == 0 {
        return Ok((1, u64::from(first & layout::SHORT_FORM_MASK)));
    }

    let width = usize::from(first & layout::SHORT_FORM_MASK);
    if width > layout::MAX_LENGTH_BYTES {
        return Err(KlvError::LengthTooWide { width });
    }
    let start = offset + 1;
    let bytes = buffer
        .get(start..start + width)
        .ok_or(KlvError::TruncatedInput {
            needed: start + width,
            actual: buffer.len(),
        })?;
    let value = bytes
        .iter()
        .fold(0u64, |acc, byte| (acc << 8) | u64::from(*byte));
    Ok((1 + width, value))
}

/// Encode `value` with the minimal BER form.
///
/// # Examples
/// ```
/// use droneklv_core::protocols::klv::encode_length;
///
/// assert_eq!(encode_length(127), vec![0x7F]);
/// assert_eq!(encode_length(128), vec![0x81, 0x80]);
/// assert_eq!(encode_length(0x1_0000), vec![0x83, 0x01, 0x00, 0x00]);
/// ```
pub fn encode_length(value: u64) -> Vec<u8> {
    if value <= layout::SHORT_FORM_MAX {
        return vec![value as u8];
    }
    let bytes = value.to_be_bytes();
    let skip = bytes.iter().take_while(|byte| **byte == 0).count();
    let significant = &bytes[skip..];
    let mut out = Vec::with_capacity(1 + significant.len());
    out.push(layout::LONG_FORM_FLAG | significant.len() as u8);
    out.extend_from_slice(significant);
    out
}
