use indexmap::IndexMap;
use tracing::trace;

use super::checksum;
use super::decoders::FieldValue;
use super::error::KlvError;
use super::layout;
use super::length::decode_length;
use super::reader::KlvReader;
use super::registry::{self, UNKNOWN_DESCRIPTION};

/// One decoded tag-length-value field.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedField {
    pub tag: u8,
    pub description: &'static str,
    pub len: usize,
    pub bytes: Vec<u8>,
    pub value: FieldValue,
}

/// Fields in order of first appearance, keyed by tag.
pub type Packet = IndexMap<u8, DecodedField>;

/// A decoded packet and where its frame sits in the input buffer.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    /// Offset of the universal key.
    pub offset: usize,
    /// Key + length field + payload.
    pub size: usize,
    pub packet: Packet,
}

impl Frame {
    pub fn end(&self) -> usize {
        self.offset + self.size
    }
}

/// Decode the first KLV packet at or after `start_index`.
///
/// # Errors
/// See [`decode_frame`].
pub fn decode_packet(buffer: &[u8], start_index: usize) -> Result<Packet, KlvError> {
    decode_frame(buffer, start_index).map(|frame| frame.packet)
}

/// Locate, verify and decode the first KLV frame at or after `start_index`.
///
/// # Examples
/// ```
/// use droneklv_core::protocols::klv::{decode_frame, encoder};
///
/// let timestamp = 1_221_508_675_029_672u64.to_be_bytes();
/// let bytes = encoder::build_frame(&[(2, &timestamp[..])]);
/// let frame = decode_frame(&bytes, 0)?;
/// assert_eq!(frame.size, bytes.len());
/// assert_eq!(frame.packet.keys().copied().collect::<Vec<_>>(), vec![2, 1]);
/// # Ok::<(), droneklv_core::protocols::klv::KlvError>(())
/// ```
///
/// # Errors
/// - `BufferTooSmall` when the buffer cannot hold a minimal frame or the
///   declared payload.
/// - `UniversalKeyNotFound` when no key starts at or after `start_index`.
/// - `ChecksumError` when the frame checksum does not match.
/// - `MalformedField` when a field overruns the declared payload.
/// - `InvalidPayloadSize`/`InvalidTimestamp` from field decoders.
pub fn decode_frame(buffer: &[u8], start_index: usize) -> Result<Frame, KlvError> {
    let reader = KlvReader::new(buffer);
    reader.require_remaining(start_index, layout::MIN_FRAME_SIZE)?;

    let key_start = reader
        .find_universal_key(start_index)
        .ok_or(KlvError::UniversalKeyNotFound)?;
    let length_start = key_start + layout::UNIVERSAL_KEY_LEN;

    let (length_bytes, declared) = decode_length(buffer, length_start).map_err(|err| match err {
        KlvError::TruncatedInput { needed, actual } => KlvError::BufferTooSmall { needed, actual },
        other => other,
    })?;
    let payload_start = length_start + length_bytes;
    let remaining = reader.remaining_from(payload_start);
    let payload_len = usize::try_from(declared)
        .ok()
        .filter(|len| *len <= remaining)
        .ok_or(KlvError::BufferTooSmall {
            needed: usize::try_from(declared).unwrap_or(usize::MAX),
            actual: remaining,
        })?;

    let size = layout::UNIVERSAL_KEY_LEN + length_bytes + payload_len;
    let frame_end = key_start + size;
    if !checksum::verify(buffer, key_start, frame_end) {
        return Err(KlvError::ChecksumError {
            expected: checksum::stored(buffer, key_start, frame_end).unwrap_or_default(),
            actual: checksum::computed(buffer, key_start, frame_end).unwrap_or_default(),
        });
    }

    let payload = reader.read_slice(payload_start..frame_end)?;
    let packet = decode_fields(payload)?;
    Ok(Frame {
        offset: key_start,
        size,
        packet,
    })
}

/// Walk the tag-length-value fields of a verified payload.
pub fn decode_fields(payload: &[u8]) -> Result<Packet, KlvError> {
    let reader = KlvReader::new(payload);
    let mut packet = Packet::new();
    let mut cursor = 0usize;

    while cursor < payload.len() {
        let tag = reader.read_u8(cursor)?;
        let malformed = KlvError::MalformedField {
            tag,
            offset: cursor,
        };
        let (length_bytes, declared) =
            decode_length(payload, cursor + 1).map_err(|_| malformed.clone())?;
        let value_start = cursor + 1 + length_bytes;
        let value_len = usize::try_from(declared).map_err(|_| malformed.clone())?;
        let value_end = value_start
            .checked_add(value_len)
            .filter(|end| *end <= payload.len())
            .ok_or(malformed)?;
        let bytes = reader.read_slice(value_start..value_end)?;

        let field = decode_field(tag, bytes)?;
        trace!(tag, len = value_len, "decoded field");
        packet.insert(tag, field);
        cursor = value_end;
    }

    Ok(packet)
}

fn decode_field(tag: u8, bytes: &[u8]) -> Result<DecodedField, KlvError> {
    let (description, value) = match registry::lookup(tag) {
        Some(meta) => (meta.description, meta.decode(bytes)?),
        None => (UNKNOWN_DESCRIPTION, FieldValue::Unknown(bytes.to_vec())),
    };
    Ok(DecodedField {
        tag,
        description,
        len: bytes.len(),
        bytes: bytes.to_vec(),
        value,
    })
}
