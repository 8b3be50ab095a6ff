//! 16-bit running checksum carried by tag 1.
//!
//! Bytes at odd 1-indexed positions contribute `byte << 8`, bytes at even
//! positions contribute `byte`; the sum wraps at 65536.

use super::layout;

/// Compute the checksum over `bytes`.
///
/// # Examples
/// ```
/// use droneklv_core::protocols::klv::checksum;
///
/// assert_eq!(checksum::compute(&[0x01, 0x02, 0x03]), 0x0402);
/// ```
pub fn compute(bytes: &[u8]) -> u16 {
    bytes.iter().enumerate().fold(0u16, |acc, (idx, byte)| {
        let shift = if idx % 2 == 0 { 8 } else { 0 };
        acc.wrapping_add(u16::from(*byte) << shift)
    })
}

/// Check the big-endian checksum stored in the last two bytes of `[start, end)`.
///
/// Returns `false` when the range is out of bounds or shorter than two bytes.
pub fn verify(buffer: &[u8], start: usize, end: usize) -> bool {
    match (stored(buffer, start, end), computed(buffer, start, end)) {
        (Some(stored), Some(computed)) => stored == computed,
        _ => false,
    }
}

/// Checksum value stored at the end of `[start, end)`.
pub fn stored(buffer: &[u8], start: usize, end: usize) -> Option<u16> {
    let value_start = value_start(start, end)?;
    let bytes = buffer.get(value_start..end)?;
    Some((u16::from(bytes[0]) << 8) + u16::from(bytes[1]))
}

/// Checksum computed over `[start, end)` minus its trailing value bytes.
pub fn computed(buffer: &[u8], start: usize, end: usize) -> Option<u16> {
    let value_start = value_start(start, end)?;
    buffer.get(start..value_start).map(compute)
}

fn value_start(start: usize, end: usize) -> Option<usize> {
    end.checked_sub(layout::CHECKSUM_VALUE_LEN)
        .filter(|value_start| *value_start >= start)
}

#[cfg(test)]
mod tests {
    use super::{compute, computed, stored, verify};

    fn with_checksum(body: &[u8]) -> Vec<u8> {
        let mut frame = body.to_vec();
        frame.extend_from_slice(&compute(body).to_be_bytes());
        frame
    }

    #[test]
    fn alternating_weights() {
        assert_eq!(compute(&[]), 0);
        assert_eq!(compute(&[0xAB]), 0xAB00);
        assert_eq!(compute(&[0xAB, 0xCD]), 0xABCD);
        assert_eq!(compute(&[0x00, 0x01, 0x02]), 0x0201);
    }

    #[test]
    fn sum_wraps() {
        assert_eq!(compute(&[0xFF, 0xFF, 0x00, 0x01]), 0x0000);
    }

    #[test]
    fn verify_accepts_matching_frame() {
        let frame = with_checksum(&[0x06, 0x0E, 0x2B, 0x34, 0x01, 0x02]);
        assert!(verify(&frame, 0, frame.len()));
    }

    #[test]
    fn verify_honours_start_offset() {
        let mut buffer = vec![0x99, 0x98];
        buffer.extend(with_checksum(&[0x10, 0x20, 0x30]));
        assert!(verify(&buffer, 2, buffer.len()));
        assert!(!verify(&buffer, 0, buffer.len()));
    }

    #[test]
    fn verify_detects_every_single_bit_flip() {
        let body: Vec<u8> = (0u8..40).map(|b| b.wrapping_mul(37)).collect();
        let frame = with_checksum(&body);
        for byte in 0..body.len() {
            for bit in 0..8 {
                let mut corrupted = frame.clone();
                corrupted[byte] ^= 1 << bit;
                assert!(
                    !verify(&corrupted, 0, corrupted.len()),
                    "flip byte {byte} bit {bit}"
                );
            }
        }
    }

    #[test]
    fn verify_rejects_short_or_out_of_range() {
        assert!(!verify(&[0x01], 0, 1));
        assert!(!verify(&[0x01, 0x02], 0, 5));
        assert!(!verify(&[0x01, 0x02, 0x03], 2, 1));
    }

    #[test]
    fn extreme_offsets_do_not_overflow() {
        assert!(!verify(&[0u8; 4], usize::MAX, usize::MAX));
        assert!(!verify(&[0u8; 4], usize::MAX - 1, 1));
        assert_eq!(stored(&[0u8; 4], 0, usize::MAX), None);
        assert_eq!(computed(&[0u8; 4], usize::MAX, 4), None);
    }
}
