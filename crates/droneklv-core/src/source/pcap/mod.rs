//! PCAP/PCAPNG source implementation.
//!
//! Legacy PCAP (micro- or nanosecond) and PCAPNG (any `if_tsresol`) files are
//! both accepted; the format is chosen from the first four bytes.

pub mod error;
pub mod layout;
pub mod parser;
pub mod reader;

pub use parser::PcapFileSource;
