/// MISB ST 0601 UAS Datalink Local Set universal key.
pub const UNIVERSAL_KEY: &[u8; 16] = &[
    0x06, 0x0E, 0x2B, 0x34, 0x02, 0x0B, 0x01, 0x01, 0x0E, 0x01, 0x03, 0x01, 0x01, 0x00, 0x00, 0x00,
];
pub const UNIVERSAL_KEY_LEN: usize = UNIVERSAL_KEY.len();

pub const MIN_LENGTH_FIELD_SIZE: usize = 1;
/// Tag + length + 8-byte timestamp.
pub const TIMESTAMP_FIELD_SIZE: usize = 10;
/// Tag + length + 2-byte checksum.
pub const CHECKSUM_FIELD_SIZE: usize = 4;
pub const MIN_FRAME_SIZE: usize =
    UNIVERSAL_KEY_LEN + MIN_LENGTH_FIELD_SIZE + TIMESTAMP_FIELD_SIZE + CHECKSUM_FIELD_SIZE;

pub const CHECKSUM_TAG: u8 = 1;
pub const CHECKSUM_VALUE_LEN: usize = 2;
pub const TIMESTAMP_TAG: u8 = 2;

pub const LONG_FORM_FLAG: u8 = 0x80;
pub const SHORT_FORM_MASK: u8 = 0x7F;
pub const SHORT_FORM_MAX: u64 = 0x7F;
/// Widest long-form length accepted (value must fit in a `u64`).
pub const MAX_LENGTH_BYTES: usize = 8;
