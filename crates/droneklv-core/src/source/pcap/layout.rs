pub const PCAPNG_MAGIC: [u8; 4] = [0x0a, 0x0d, 0x0d, 0x0a];
/// Legacy PCAP magic as stored on disk, both byte orders, micro- and nanosecond.
pub const LEGACY_MAGICS: [[u8; 4]; 4] = [
    [0xd4, 0xc3, 0xb2, 0xa1],
    [0xa1, 0xb2, 0xc3, 0xd4],
    [0x4d, 0x3c, 0xb2, 0xa1],
    [0xa1, 0xb2, 0x3c, 0x4d],
];
pub const PCAP_READER_BUFFER_SIZE: usize = 65_536;

/// Default PCAPNG timestamp resolution (microseconds).
pub const DEFAULT_TSRESOL: u8 = 6;
/// `if_tsresol` high bit: the remaining bits are a power of two.
pub const TSRESOL_BINARY_FLAG: u8 = 0x80;
pub const MICROS_PER_SECOND: f64 = 1e6;
pub const NANOS_PER_SECOND: f64 = 1e9;
