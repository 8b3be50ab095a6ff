//! droneklv core library: UAS datalink KLV metadata decoding.
//!
//! The decoding core lives in [`protocols::klv`]: it locates frames by their
//! universal key, decodes BER lengths, verifies the frame checksum and turns
//! each tag-length-value field into a scaled physical value through a static
//! registry. Everything in `protocols` is byte-oriented and side-effect free.
//!
//! Around it, the offline pipeline used by the CLI reads PCAP/PCAPNG captures
//! (`source`), extracts UDP datagrams, demultiplexes MPEG transport streams
//! ([`protocols::mpegts`]) and aggregates decoded packets and per-kind error
//! counts into a versioned, deterministic [`Report`]. [`LiveDecoder`] runs the
//! same per-datagram path for packets received from a socket.
//!
//! Invariants:
//! - Report outputs are deterministic and stable across runs.
//! - A decode failure never aborts an analysis; it is counted and skipped.
//! - No partially decoded packet is ever returned.
//!
//! # Examples
//! ```no_run
//! use std::path::Path;
//!
//! use droneklv_core::{AnalysisOptions, analyze_pcap_file};
//!
//! let report = analyze_pcap_file(Path::new("flight.pcapng"), &AnalysisOptions::default())?;
//! println!("decoded {} packets", report.packets.len());
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

use serde::{Deserialize, Serialize};

mod analysis;
pub mod fixtures;
pub mod protocols;
mod source;

pub use analysis::{
    AnalysisError, AnalysisOptions, KlvScan, LiveDecoder, ScanError, analyze_klv_file,
    analyze_pcap_file, analyze_source, decode_klv_buffer,
};
pub use source::{PacketEvent, PacketSource, PcapFileSource, SourceError};

/// Current report schema version.
pub const REPORT_VERSION: u32 = 1;
/// Default timestamp used when no capture time is available.
pub const DEFAULT_GENERATED_AT: &str = "1970-01-01T00:00:00Z";
/// Tool name embedded in reports.
pub const TOOL_NAME: &str = "droneklv";

/// Aggregated analysis report with deterministic ordering.
///
/// # Examples
/// ```
/// use droneklv_core::make_stub_report;
///
/// let report = make_stub_report("flight.pcapng", 123);
/// assert_eq!(report.report_version, droneklv_core::REPORT_VERSION);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Report {
    /// Report schema version (not the binary version).
    pub report_version: u32,
    /// Tool identification metadata.
    pub tool: ToolInfo,
    /// RFC3339 timestamp representing the report generation time.
    pub generated_at: String,

    /// Input metadata.
    pub input: InputInfo,

    /// Capture summary; absent for raw KLV inputs.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub capture_summary: Option<CaptureSummary>,
    /// Per-stream summaries sorted by source, destination and PID.
    pub streams: Vec<StreamSummary>,
    /// Decoded KLV packets in capture order.
    pub packets: Vec<PacketRecord>,
    /// Error summaries sorted by stage and kind.
    pub errors: Vec<ErrorSummary>,
}

impl Report {
    /// Total number of recorded decode errors across all kinds.
    pub fn error_count(&self) -> u64 {
        self.errors.iter().map(|summary| summary.count).sum()
    }
}

/// Tool metadata embedded in reports.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolInfo {
    /// Tool name (`droneklv`).
    pub name: String,
    /// Tool version (semver).
    pub version: String,
}

/// Input metadata embedded in reports.
///
/// # Examples
/// ```
/// use droneklv_core::InputInfo;
///
/// let input = InputInfo {
///     path: "flight.pcapng".to_string(),
///     bytes: 1024,
/// };
/// assert_eq!(input.bytes, 1024);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InputInfo {
    /// Input path as provided to the analyzer.
    pub path: String,
    /// Input size in bytes.
    pub bytes: u64,
}

/// Capture-level counters (timestamps may be absent).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CaptureSummary {
    /// Total frames read from the capture.
    pub packets_total: u64,
    /// UDP datagrams that passed the port filter.
    pub udp_datagrams: u64,
    /// KLV packets decoded successfully.
    pub klv_packets: u64,
    /// RFC3339 timestamp of the first frame (if known).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time_start: Option<String>,
    /// RFC3339 timestamp of the last frame (if known).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time_end: Option<String>,
}

/// One metadata stream: a UDP endpoint pair and, for transport streams, a PID.
///
/// # Examples
/// ```
/// use droneklv_core::StreamSummary;
///
/// let stream = StreamSummary {
///     src: "10.0.0.1:5000".to_string(),
///     dst: "239.0.0.1:20000".to_string(),
///     pid: Some(0x0101),
///     units: 10,
///     klv_packets: 10,
///     decode_errors: 0,
///     klv_rate_hz: None,
/// };
/// assert_eq!(stream.pid, Some(257));
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamSummary {
    /// Source endpoint in `ip:port` form.
    pub src: String,
    /// Destination endpoint in `ip:port` form.
    pub dst: String,
    /// Transport stream PID; absent when KLV rides directly on UDP.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pid: Option<u16>,
    /// PES units (or raw datagrams) handed to the KLV decoder.
    pub units: u64,
    /// KLV packets decoded successfully.
    pub klv_packets: u64,
    /// KLV decode failures on this stream.
    pub decode_errors: u64,
    /// Decoded packets per second over the stream's active interval.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub klv_rate_hz: Option<f64>,
}

/// One decoded KLV packet.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PacketRecord {
    /// Capture frame that completed the packet; absent for raw KLV inputs.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub capture_index: Option<u64>,
    /// RFC3339 capture timestamp of that frame.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ts: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub src: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dst: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pid: Option<u16>,
    /// Offset of the universal key inside the decoded buffer.
    pub offset: usize,
    /// Frame size in bytes (key + length + payload).
    pub size: usize,
    /// Fields in order of first appearance.
    pub fields: Vec<FieldRecord>,
}

/// One decoded field of a KLV packet.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldRecord {
    pub tag: u8,
    pub name: String,
    /// Payload length in bytes.
    pub len: usize,
    pub value: FieldValueSummary,
}

/// JSON form of a decoded field value.
///
/// # Examples
/// ```
/// use droneklv_core::FieldValueSummary;
///
/// let value = serde_json::to_value(FieldValueSummary::Float(159.97)).unwrap();
/// assert_eq!(value["type"], "float");
/// assert_eq!(value["value"], 159.97);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum FieldValueSummary {
    Float(f64),
    Integer(u64),
    Text(String),
    /// RFC3339 UTC timestamp.
    Timestamp(String),
    /// Lowercase hex of a registered pass-through field.
    Bytes(String),
    /// Lowercase hex of an unregistered field.
    Unknown(String),
}

/// Aggregated decode errors of one kind.
///
/// # Examples
/// ```
/// use droneklv_core::ErrorSummary;
///
/// let summary = ErrorSummary {
///     stage: "klv".to_string(),
///     kind: "checksum".to_string(),
///     count: 2,
///     examples: vec!["frame #4 10.0.0.1:5000 -> 10.0.0.2:20000 pid 0x0101".to_string()],
/// };
/// assert_eq!(summary.count, 2);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorSummary {
    /// Pipeline stage that failed (`udp`, `ts` or `klv`).
    pub stage: String,
    /// Stable error kind label.
    pub kind: String,
    /// Number of occurrences aggregated into this summary.
    pub count: u64,
    /// At most three example contexts with their messages.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub examples: Vec<String>,
}

/// Build a stub report with base fields filled and empty aggregates.
///
/// # Examples
/// ```
/// use droneklv_core::make_stub_report;
///
/// let report = make_stub_report("flight.pcapng", 123);
/// assert!(report.streams.is_empty());
/// assert_eq!(report.error_count(), 0);
/// ```
pub fn make_stub_report(input_path: &str, input_bytes: u64) -> Report {
    Report {
        report_version: REPORT_VERSION,
        tool: ToolInfo {
            name: TOOL_NAME.to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        },
        generated_at: DEFAULT_GENERATED_AT.to_string(),
        input: InputInfo {
            path: input_path.to_string(),
            bytes: input_bytes,
        },
        capture_summary: None,
        streams: vec![],
        packets: vec![],
        errors: vec![],
    }
}
