//! KLV (Key-Length-Value) UAS datalink metadata decoding.
//!
//! A frame starts with the 16-byte universal key, followed by a BER length
//! and a payload of tag-length-value fields. The last field (tag 1) carries a
//! 16-bit checksum over the whole frame up to the checksum value itself.
//!
//! Decoding is layered like the other protocols:
//! - `layout`: key bytes and fixed sizes
//! - `reader`: bounds-checked access and key search
//! - `length`/`checksum`: the two wire conventions
//! - `decoders`/`registry`: per-tag value transforms
//! - `parser`: frame location, verification and the field walk
//!
//! `encoder` mirrors the wire conventions to build test frames.

pub mod checksum;
pub mod decoders;
pub mod encoder;
pub mod error;
pub mod layout;
pub mod length;
pub mod parser;
pub mod reader;
pub mod registry;

pub use decoders::FieldValue;
pub use error::KlvError;
pub use length::{decode_length, encode_length};
pub use parser::{DecodedField, Frame, Packet, decode_fields, decode_frame, decode_packet};
