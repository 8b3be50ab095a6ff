pub const TS_PACKET_SIZE: usize = 188;
pub const TS_HEADER_LEN: usize = 4;
pub const SYNC_BYTE: u8 = 0x47;

pub const PUSI_FLAG: u8 = 0x40;
pub const PID_HIGH_MASK: u8 = 0x1F;
pub const CONTINUITY_MODULUS: u8 = 16;

pub const PES_START_CODE: &[u8; 3] = &[0x00, 0x00, 0x01];
/// Bytes up to and including `PES_packet_length`.
pub const PES_PREFIX_LEN: usize = 6;

/// `stream_type` of metadata carried in PES packets (ISO/IEC 13818-1).
pub const METADATA_IN_PES: u8 = 0x15;
