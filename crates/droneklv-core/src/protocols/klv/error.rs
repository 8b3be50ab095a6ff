use thiserror::Error;

use super::decoders::PayloadSize;

/// Errors returned by KLV frame and field decoding.
///
/// # Examples
/// ```
/// use droneklv_core::protocols::klv::KlvError;
///
/// let err = KlvError::ChecksumError { expected: 0x1234, actual: 0x4321 };
/// assert!(err.to_string().contains("checksum mismatch"));
/// assert_eq!(err.kind(), "checksum");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum KlvError {
    #[error("buffer too small: need {needed} bytes, got {actual}")]
    BufferTooSmall { needed: usize, actual: usize },
    #[error("universal key not found")]
    UniversalKeyNotFound,
    #[error("checksum mismatch: frame carries {expected:#06x}, computed {actual:#06x}")]
    ChecksumError { expected: u16, actual: u16 },
    #[error("invalid payload size: expected {expected}, got {actual} bytes")]
    InvalidPayloadSize { expected: PayloadSize, actual: usize },
    #[error("malformed field (tag {tag}) at payload offset {offset}")]
    MalformedField { tag: u8, offset: usize },
    #[error("truncated input: need {needed} bytes, got {actual}")]
    TruncatedInput { needed: usize, actual: usize },
    #[error("length field too wide: {width} bytes")]
    LengthTooWide { width: usize },
    #[error("timestamp out of calendar range: {micros} us")]
    InvalidTimestamp { micros: u64 },
}

impl KlvError {
    /// Stable short label used to aggregate errors in reports.
    pub fn kind(&self) -> &'static str {
        match self {
            KlvError::BufferTooSmall { .. } => "buffer_too_small",
            KlvError::UniversalKeyNotFound => "universal_key_not_found",
            KlvError::ChecksumError { .. } => "checksum",
            KlvError::InvalidPayloadSize { .. } => "invalid_payload_size",
            KlvError::MalformedField { .. } => "malformed_field",
            KlvError::TruncatedInput { .. } => "truncated_input",
            KlvError::LengthTooWide { .. } => "length_too_wide",
            KlvError::InvalidTimestamp { .. } => "invalid_timestamp",
        }
    }
}
