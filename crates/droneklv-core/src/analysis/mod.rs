use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::path::Path;

use thiserror::Error;
use time::{OffsetDateTime, format_description::well_known::Rfc3339};
use tracing::{debug, trace, warn};

use crate::protocols::klv::reader::KlvReader;
use crate::protocols::klv::{Frame, KlvError, decode_frame};
use crate::protocols::mpegts::{PesUnit, TsDemux, layout as ts_layout};
use crate::source::{PacketEvent, PacketSource, PcapFileSource, SourceError};
use crate::{CaptureSummary, DEFAULT_GENERATED_AT, PacketRecord, Report, make_stub_report};

mod errors;
mod live;
mod records;
mod streams;
mod udp;

pub use live::LiveDecoder;

use errors::{ErrorTally, Stage};
use records::{FrameContext, packet_record};
use streams::{StreamKey, StreamStats, build_stream_summaries};
use udp::{UdpPacket, parse_udp_packet};

#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Source error: {0}")]
    Source(#[from] SourceError),
}

/// Filters and limits applied during analysis.
#[derive(Debug, Clone, Default)]
pub struct AnalysisOptions {
    /// Only datagrams whose source or destination port matches.
    pub udp_port: Option<u16>,
    /// Only this transport stream PID.
    pub pid: Option<u16>,
    /// Cap on stored packet records; counters still cover every packet.
    pub max_packets: Option<usize>,
    /// Byte offset where scanning starts in raw KLV inputs.
    pub start_offset: usize,
}

impl AnalysisOptions {
    fn accepts(&self, packet: &UdpPacket<'_>) -> bool {
        self.udp_port
            .is_none_or(|port| packet.src.port() == port || packet.dst.port() == port)
    }

    fn has_room(&self, stored: usize) -> bool {
        self.max_packets.is_none_or(|max| stored < max)
    }
}

/// A frame that failed to decode while scanning a buffer.
#[derive(Debug, Clone, PartialEq)]
pub struct ScanError {
    /// Offset of the universal key (or the scan start when no key was found).
    pub offset: usize,
    pub error: KlvError,
}

/// Every frame found in a buffer, plus the failures skipped on the way.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct KlvScan {
    pub frames: Vec<Frame>,
    pub errors: Vec<ScanError>,
}

/// Decode every KLV frame in `bytes`.
///
/// After a failure the scan resumes one byte past the failed key, so a
/// corrupt frame never hides the frames after it. A non-empty buffer without
/// any key yields a single `UniversalKeyNotFound` error.
///
/// # Examples
/// ```
/// use droneklv_core::decode_klv_buffer;
/// use droneklv_core::protocols::klv::encoder::build_frame;
///
/// let frame = build_frame(&[(2, &[0u8; 8][..])]);
/// let buffer = [frame.as_slice(), frame.as_slice()].concat();
/// let scan = decode_klv_buffer(&buffer);
/// assert_eq!(scan.frames.len(), 2);
/// assert!(scan.errors.is_empty());
/// ```
pub fn decode_klv_buffer(bytes: &[u8]) -> KlvScan {
    scan_klv(bytes, 0)
}

fn scan_klv(bytes: &[u8], start: usize) -> KlvScan {
    let reader = KlvReader::new(bytes);
    let mut scan = KlvScan::default();
    let mut offset = start;

    while let Some(key_start) = reader.find_universal_key(offset) {
        match decode_frame(bytes, key_start) {
            Ok(frame) => {
                trace!(
                    offset = frame.offset,
                    size = frame.size,
                    fields = frame.packet.len(),
                    "decoded KLV frame"
                );
                offset = frame.end();
                scan.frames.push(frame);
            }
            Err(error) => {
                debug!(offset = key_start, %error, "skipping KLV frame");
                scan.errors.push(ScanError {
                    offset: key_start,
                    error,
                });
                offset = key_start + 1;
            }
        }
    }

    if scan.frames.is_empty() && scan.errors.is_empty() && bytes.len() > start {
        scan.errors.push(ScanError {
            offset: start,
            error: KlvError::UniversalKeyNotFound,
        });
    }
    scan
}

pub fn analyze_pcap_file(path: &Path, options: &AnalysisOptions) -> Result<Report, AnalysisError> {
    let source = PcapFileSource::open(path)?;
    analyze_source(path, source, options)
}

pub fn analyze_source<S: PacketSource>(
    path: &Path,
    mut source: S,
    options: &AnalysisOptions,
) -> Result<Report, AnalysisError> {
    let mut analyzer = Analyzer::new(options.clone());
    let mut packets_total = 0u64;
    let mut first_ts = None;
    let mut last_ts = None;

    while let Some(event) = source.next_packet()? {
        packets_total += 1;
        update_ts_bounds(&mut first_ts, &mut last_ts, event.ts);
        analyzer.handle_event(&event);
    }
    analyzer.finish();

    let mut report = make_stub_report(&path.display().to_string(), path.metadata()?.len());
    report.capture_summary = Some(CaptureSummary {
        packets_total,
        udp_datagrams: analyzer.udp_datagrams,
        klv_packets: analyzer.klv_packets,
        time_start: ts_to_rfc3339(first_ts),
        time_end: ts_to_rfc3339(last_ts),
    });
    report.generated_at = report
        .capture_summary
        .as_ref()
        .and_then(|summary| summary.time_end.clone().or(summary.time_start.clone()))
        .unwrap_or_else(|| DEFAULT_GENERATED_AT.to_string());
    report.streams = build_stream_summaries(analyzer.streams);
    report.packets = analyzer.packets;
    report.errors = analyzer.errors.into_summaries();
    Ok(report)
}

/// Decode a file holding raw KLV bytes (no capture framing).
pub fn analyze_klv_file(path: &Path, options: &AnalysisOptions) -> Result<Report, AnalysisError> {
    let bytes = std::fs::read(path)?;
    let scan = scan_klv(&bytes, options.start_offset);

    let mut report = make_stub_report(&path.display().to_string(), bytes.len() as u64);
    let context = FrameContext::default();
    report.packets = scan
        .frames
        .iter()
        .take(options.max_packets.unwrap_or(usize::MAX))
        .map(|frame| packet_record(frame, &context))
        .collect();

    let mut tally = ErrorTally::default();
    for failure in &scan.errors {
        tally.record(Stage::Klv, failure.error.kind(), || {
            format!("offset {}: {}", failure.offset, failure.error)
        });
    }
    report.errors = tally.into_summaries();
    Ok(report)
}

type FlowKey = (SocketAddr, SocketAddr);

/// Capture position of the datagram that completed a unit.
#[derive(Debug, Clone, Copy)]
struct Position {
    index: u64,
    ts: Option<f64>,
}

struct FlowState {
    demux: TsDemux,
    last: Position,
}

struct Analyzer {
    options: AnalysisOptions,
    flows: BTreeMap<FlowKey, FlowState>,
    streams: BTreeMap<StreamKey, StreamStats>,
    packets: Vec<PacketRecord>,
    errors: ErrorTally,
    udp_datagrams: u64,
    klv_packets: u64,
    /// Also log every recorded error at `warn`.
    echo_errors: bool,
}

impl Analyzer {
    fn new(options: AnalysisOptions) -> Self {
        Self {
            options,
            flows: BTreeMap::new(),
            streams: BTreeMap::new(),
            packets: Vec::new(),
            errors: ErrorTally::default(),
            udp_datagrams: 0,
            klv_packets: 0,
            echo_errors: false,
        }
    }

    fn record_error(&mut self, stage: Stage, kind: &'static str, example: impl FnOnce() -> String) {
        if self.echo_errors {
            let example = example();
            warn!(stage = stage.as_str(), kind, "{example}");
            self.errors.record(stage, kind, || example);
        } else {
            self.errors.record(stage, kind, example);
        }
    }

    fn handle_event(&mut self, event: &PacketEvent) {
        let udp = match parse_udp_packet(event.linktype, &event.data) {
            Ok(Some(udp)) => udp,
            Ok(None) => return,
            Err(err) => {
                debug!(index = event.index, error = %err, "skipping frame");
                self.record_error(Stage::Udp, err.kind(), || {
                    format!("frame #{}: {err}", event.index)
                });
                return;
            }
        };
        if !self.options.accepts(&udp) {
            return;
        }
        let position = Position {
            index: event.index,
            ts: event.ts,
        };
        self.handle_datagram((udp.src, udp.dst), udp.payload, position);
    }

    fn handle_datagram(&mut self, flow: FlowKey, payload: &[u8], position: Position) {
        self.udp_datagrams += 1;
        if is_transport_stream(payload) {
            self.push_transport(flow, payload, position);
        } else if KlvReader::new(payload).find_universal_key(0).is_some() {
            let key = StreamKey {
                src: flow.0,
                dst: flow.1,
                pid: None,
            };
            self.streams.entry(key).or_default().units += 1;
            self.decode_unit(key, payload, position);
        } else {
            trace!(index = position.index, "datagram carries no KLV");
        }
    }

    fn push_transport(&mut self, flow: FlowKey, payload: &[u8], position: Position) {
        let pid_filter = self.options.pid;
        let state = self.flows.entry(flow).or_insert_with(|| FlowState {
            demux: TsDemux::new(pid_filter),
            last: position,
        });
        state.last = position;
        let units = state.demux.push(payload);
        let ts_errors = state.demux.take_errors();

        for err in ts_errors {
            self.record_error(Stage::Ts, err.kind(), || {
                format!("frame #{} {} -> {}: {err}", position.index, flow.0, flow.1)
            });
        }
        for unit in units {
            self.handle_unit(flow, &unit, position);
        }
    }

    fn handle_unit(&mut self, flow: FlowKey, unit: &PesUnit, position: Position) {
        let key = StreamKey {
            src: flow.0,
            dst: flow.1,
            pid: Some(unit.pid),
        };
        self.streams.entry(key).or_default().units += 1;
        self.decode_unit(key, &unit.payload, position);
    }

    fn decode_unit(&mut self, key: StreamKey, bytes: &[u8], position: Position) {
        let scan = decode_klv_buffer(bytes);
        let stats = self.streams.entry(key).or_default();

        for frame in &scan.frames {
            stats.record_packet(position.ts);
            self.klv_packets += 1;
            if self.options.has_room(self.packets.len()) {
                let context = FrameContext {
                    capture_index: Some(position.index),
                    ts: ts_to_rfc3339(position.ts),
                    src: Some(key.src.to_string()),
                    dst: Some(key.dst.to_string()),
                    pid: key.pid,
                };
                self.packets.push(packet_record(frame, &context));
            }
        }

        stats.decode_errors += scan.errors.len() as u64;
        for failure in &scan.errors {
            self.record_error(Stage::Klv, failure.error.kind(), || {
                format!(
                    "{} offset {}: {}",
                    describe(&key, position),
                    failure.offset,
                    failure.error
                )
            });
        }
    }

    /// Emit units still buffered when the capture ends.
    fn finish(&mut self) {
        let flows = std::mem::take(&mut self.flows);
        for (flow, mut state) in flows {
            let units = state.demux.flush();
            for err in state.demux.take_errors() {
                self.record_error(Stage::Ts, err.kind(), || {
                    format!("{} -> {}: {err}", flow.0, flow.1)
                });
            }
            for unit in units {
                self.handle_unit(flow, &unit, state.last);
            }
        }
    }
}

fn is_transport_stream(payload: &[u8]) -> bool {
    payload.len() >= ts_layout::TS_PACKET_SIZE && payload.first() == Some(&ts_layout::SYNC_BYTE)
}

fn describe(key: &StreamKey, position: Position) -> String {
    match key.pid {
        Some(pid) => format!(
            "frame #{} {} -> {} pid {pid:#06x}",
            position.index, key.src, key.dst
        ),
        None => format!("frame #{} {} -> {}", position.index, key.src, key.dst),
    }
}

fn update_ts_bounds(first: &mut Option<f64>, last: &mut Option<f64>, ts: Option<f64>) {
    let Some(ts) = ts else {
        return;
    };
    if first.is_none_or(|existing| ts < existing) {
        *first = Some(ts);
    }
    if last.is_none_or(|existing| ts > existing) {
        *last = Some(ts);
    }
}

fn ts_to_rfc3339(ts: Option<f64>) -> Option<String> {
    let ts = ts?;
    let nanos = (ts * 1_000_000_000.0) as i128;
    OffsetDateTime::from_unix_timestamp_nanos(nanos)
        .ok()
        .and_then(|dt| dt.format(&Rfc3339).ok())
}
