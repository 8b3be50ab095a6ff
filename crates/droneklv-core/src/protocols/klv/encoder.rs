//! Frame builder for fixtures and conformance tests.
//!
//! Mirrors the length codec and checksum bit-exactly; it is not meant for
//! producing metadata for transmission.

use super::checksum;
use super::layout;
use super::length::encode_length;

/// Tag + BER length + value.
pub fn encode_field(tag: u8, value: &[u8]) -> Vec<u8> {
    let mut out = vec![tag];
    out.extend(encode_length(value.len() as u64));
    out.extend_from_slice(value);
    out
}

/// Checksum field closing `frame_so_far` (key, length and preceding fields).
///
/// The checksum covers its own tag and length bytes.
pub fn checksum_field(frame_so_far: &[u8]) -> Vec<u8> {
    let header = [layout::CHECKSUM_TAG, layout::CHECKSUM_VALUE_LEN as u8];
    let mut covered = frame_so_far.to_vec();
    covered.extend_from_slice(&header);
    let value = checksum::compute(&covered);
    let mut out = header.to_vec();
    out.extend_from_slice(&value.to_be_bytes());
    out
}

/// Complete frame: universal key, length, `fields` in order, checksum field.
///
/// # Examples
/// ```
/// use droneklv_core::protocols::klv::{decode_packet, encoder};
///
/// let frame = encoder::build_frame(&[(65, &[0x0B][..]), (2, &[0u8; 8][..])]);
/// let packet = decode_packet(&frame, 0)?;
/// assert_eq!(packet.len(), 3);
/// # Ok::<(), droneklv_core::protocols::klv::KlvError>(())
/// ```
pub fn build_frame(fields: &[(u8, &[u8])]) -> Vec<u8> {
    let mut payload: Vec<u8> = fields
        .iter()
        .flat_map(|(tag, value)| encode_field(*tag, value))
        .collect();
    let payload_len = payload.len() + layout::CHECKSUM_FIELD_SIZE;

    let mut frame = layout::UNIVERSAL_KEY.to_vec();
    frame.extend(encode_length(payload_len as u64));
    frame.append(&mut payload);
    let checksum = checksum_field(&frame);
    frame.extend(checksum);
    frame
}

#[cfg(test)]
mod tests {
    use super::{build_frame, checksum_field, encode_field};
    use crate::protocols::klv::checksum;
    use crate::protocols::klv::layout;

    #[test]
    fn field_uses_short_and_long_lengths() {
        assert_eq!(encode_field(5, &[0x71, 0xC2]), vec![5, 2, 0x71, 0xC2]);
        let long = encode_field(3, &[0u8; 200]);
        assert_eq!(&long[..3], &[3, 0x81, 200]);
        assert_eq!(long.len(), 203);
    }

    #[test]
    fn checksum_field_closes_frame() {
        let mut frame = layout::UNIVERSAL_KEY.to_vec();
        frame.extend_from_slice(&[0x0E, 2, 8, 0, 0, 0, 0, 0, 0, 0, 0]);
        frame.extend(checksum_field(&frame));
        assert_eq!(frame[frame.len() - 4..frame.len() - 2], [1, 2]);
        assert!(checksum::verify(&frame, 0, frame.len()));
    }

    #[test]
    fn built_frame_declares_its_payload() {
        let frame = build_frame(&[(2, &[0u8; 8][..])]);
        assert_eq!(frame.len(), layout::MIN_FRAME_SIZE);
        assert_eq!(frame[layout::UNIVERSAL_KEY_LEN] as usize, 14);
        assert!(checksum::verify(&frame, 0, frame.len()));
    }
}
