//! MPEG transport stream demultiplexing.
//!
//! Datagrams carry whole 188-byte transport packets. `demux` drives
//! `mpeg2ts-reader` and reassembles PES units per PID so the KLV decoder
//! sees one access unit at a time.

pub mod demux;
pub mod error;
pub mod layout;

pub use demux::{PesUnit, TsDemux};
pub use error::TsError;
