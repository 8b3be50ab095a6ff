use std::io::{Read, Seek, SeekFrom};

use pcap_parser::Linktype;

use super::error::PcapSourceError;
use super::layout;

/// Per-interface state announced by a PCAPNG interface description block.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InterfaceInfo {
    pub linktype: Linktype,
    /// Timestamp units per second.
    pub units_per_second: f64,
    /// Seconds added to every timestamp (`if_tsoffset`).
    pub offset_seconds: i64,
}

impl Default for InterfaceInfo {
    fn default() -> Self {
        Self {
            linktype: Linktype::ETHERNET,
            units_per_second: layout::MICROS_PER_SECOND,
            offset_seconds: 0,
        }
    }
}

/// Read the magic bytes and rewind the reader to the start.
///
/// # Errors
/// Returns `PcapSourceError` when the reader cannot be read or rewound.
pub fn read_magic_and_rewind<R: Read + Seek>(reader: &mut R) -> Result<[u8; 4], PcapSourceError> {
    let mut magic = [0u8; 4];
    reader.read_exact(&mut magic)?;
    reader.seek(SeekFrom::Start(0))?;
    Ok(magic)
}

pub fn is_pcapng_magic(magic: &[u8; 4]) -> bool {
    magic == &layout::PCAPNG_MAGIC
}

pub fn is_legacy_magic(magic: &[u8; 4]) -> bool {
    layout::LEGACY_MAGICS.contains(magic)
}

/// Interface state for a packet, defaulting to Ethernet/microseconds when
/// the capture never described the interface.
pub fn interface_for(interfaces: &[InterfaceInfo], if_id: u32) -> InterfaceInfo {
    interfaces
        .get(if_id as usize)
        .copied()
        .unwrap_or_default()
}

/// Units per second encoded by a PCAPNG `if_tsresol` option value.
///
/// ```text
/// 6    -> 1e6 (microseconds, the default)
/// 9    -> 1e9
/// 0x8A -> 2^10
/// ```
pub fn tsresol_units_per_second(tsresol: u8) -> f64 {
    let exponent = i32::from(tsresol & !layout::TSRESOL_BINARY_FLAG);
    if tsresol & layout::TSRESOL_BINARY_FLAG != 0 {
        2f64.powi(exponent)
    } else {
        10f64.powi(exponent)
    }
}

/// Convert a PCAPNG high/low timestamp to seconds.
pub fn pcapng_ts_to_seconds(ts_high: u32, ts_low: u32, interface: &InterfaceInfo) -> f64 {
    let ts = (u64::from(ts_high) << 32) | u64::from(ts_low);
    ts as f64 / interface.units_per_second + interface.offset_seconds as f64
}

/// Convert a legacy PCAP record timestamp to seconds.
pub fn legacy_ts_to_seconds(ts_sec: u32, ts_frac: u32, nanosecond: bool) -> f64 {
    let per_second = if nanosecond {
        layout::NANOS_PER_SECOND
    } else {
        layout::MICROS_PER_SECOND
    };
    f64::from(ts_sec) + f64::from(ts_frac) / per_second
}
