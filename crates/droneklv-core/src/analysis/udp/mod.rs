//! UDP payload extraction from link-layer frames (Ethernet, raw IP, Linux SLL).

pub mod error;
pub mod layout;
pub mod parser;
pub mod reader;

pub use parser::{UdpPacket, parse_udp_packet};
