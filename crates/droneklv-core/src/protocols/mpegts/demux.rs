//! Per-PID PES reassembly driven by `mpeg2ts-reader`.
//!
//! Captures often carry the metadata PID without any PAT/PMT, so every PID
//! the demultiplexer has not been told about gets a PES filter. Once a PMT
//! announces the elementary streams, only metadata stream types (or the PID
//! the caller asked for) keep one.

use std::collections::BTreeMap;

use mpeg2ts_reader::StreamType;
use mpeg2ts_reader::demultiplex::{
    self, DemuxContext, FilterChangeset, FilterRequest, NullPacketFilter, PacketFilter,
    PatPacketFilter, PmtPacketFilter,
};
use mpeg2ts_reader::packet::Packet;
use mpeg2ts_reader::pes::{self, ElementaryStreamConsumer, PesContents, PesHeader, PesLength};
use mpeg2ts_reader::psi::pat::PAT_PID;
use tracing::debug;

use super::error::TsError;
use super::layout;

/// One reassembled PES packet. `payload` excludes the PES header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PesUnit {
    pub pid: u16,
    pub stream_id: u8,
    pub payload: Vec<u8>,
}

struct PendingUnit {
    stream_id: u8,
    payload: Vec<u8>,
    /// Payload size implied by `PES_packet_length`, when bounded.
    expected: Option<usize>,
}

impl PendingUnit {
    fn is_complete(&self) -> bool {
        self.expected.is_some_and(|len| self.payload.len() >= len)
    }

    fn finish(mut self, pid: u16) -> PesUnit {
        if let Some(len) = self.expected {
            self.payload.truncate(len);
        }
        PesUnit {
            pid,
            stream_id: self.stream_id,
            payload: self.payload,
        }
    }
}

/// Demultiplexer context: filter construction plus everything the PES
/// consumers produce.
struct DemuxState {
    pid_filter: Option<u16>,
    changeset: FilterChangeset<KlvPacketFilter>,
    pending: BTreeMap<u16, PendingUnit>,
    units: Vec<PesUnit>,
    errors: Vec<TsError>,
    /// TS payload length of the packet that opened the latest unit.
    lead_len: usize,
}

impl DemuxState {
    fn new(pid_filter: Option<u16>) -> Self {
        Self {
            pid_filter,
            changeset: FilterChangeset::default(),
            pending: BTreeMap::new(),
            units: Vec::new(),
            errors: Vec::new(),
            lead_len: 0,
        }
    }

    fn store(&mut self, pid: u16, pending: PendingUnit) {
        if pending.is_complete() {
            self.units.push(pending.finish(pid));
        } else {
            self.pending.insert(pid, pending);
        }
    }

    fn close(&mut self, pid: u16) {
        if let Some(pending) = self.pending.remove(&pid) {
            self.units.push(pending.finish(pid));
        }
    }

    fn elementary_filter(&mut self, pid: u16) -> KlvPacketFilter {
        if self.pid_filter.is_some_and(|wanted| wanted != pid) {
            return KlvPacketFilter::Null(NullPacketFilter::default());
        }
        KlvPacketFilter::Pes(pes::PesPacketFilter::new(UnitCollector { pid }))
    }
}

fn carries_metadata(stream_type: &StreamType) -> bool {
    *stream_type == StreamType::H222_0_PES_PRIVATE_DATA || stream_type.0 == layout::METADATA_IN_PES
}

impl DemuxContext for DemuxState {
    type F = KlvPacketFilter;

    fn filter_changeset(&mut self) -> &mut FilterChangeset<Self::F> {
        &mut self.changeset
    }

    fn construct(&mut self, req: FilterRequest<'_, '_>) -> Self::F {
        match req {
            FilterRequest::ByPid(PAT_PID) => KlvPacketFilter::Pat(PatPacketFilter::default()),
            FilterRequest::ByPid(mpeg2ts_reader::STUFFING_PID) => {
                KlvPacketFilter::Null(NullPacketFilter::default())
            }
            FilterRequest::ByPid(pid) => self.elementary_filter(pid.into()),
            FilterRequest::ByStream {
                stream_type,
                stream_info,
                ..
            } => {
                let pid: u16 = stream_info.elementary_pid().into();
                // Replaces the filter guessed before the PMT arrived.
                self.pending.remove(&pid);
                if carries_metadata(&stream_type) || self.pid_filter == Some(pid) {
                    self.elementary_filter(pid)
                } else {
                    debug!(pid, stream_type = stream_type.0, "ignoring elementary stream");
                    KlvPacketFilter::Null(NullPacketFilter::default())
                }
            }
            FilterRequest::Pmt {
                pid,
                program_number,
            } => KlvPacketFilter::Pmt(PmtPacketFilter::new(pid, program_number)),
            FilterRequest::Nit { .. } => KlvPacketFilter::Null(NullPacketFilter::default()),
        }
    }
}

enum KlvPacketFilter {
    Pat(PatPacketFilter<DemuxState>),
    Pmt(PmtPacketFilter<DemuxState>),
    Pes(pes::PesPacketFilter<DemuxState, UnitCollector>),
    Null(NullPacketFilter<DemuxState>),
}

impl PacketFilter for KlvPacketFilter {
    type Ctx = DemuxState;

    fn consume(&mut self, ctx: &mut Self::Ctx, pk: &Packet<'_>) {
        match self {
            KlvPacketFilter::Pat(f) => f.consume(ctx, pk),
            KlvPacketFilter::Pmt(f) => f.consume(ctx, pk),
            KlvPacketFilter::Pes(f) => {
                if pk.payload_unit_start_indicator() {
                    ctx.lead_len = pk.payload().map_or(0, <[u8]>::len);
                }
                f.consume(ctx, pk);
            }
            KlvPacketFilter::Null(f) => f.consume(ctx, pk),
        }
    }
}

/// Collects the payload of one PID's PES packets into the shared state.
struct UnitCollector {
    pid: u16,
}

impl ElementaryStreamConsumer<DemuxState> for UnitCollector {
    fn start_stream(&mut self, ctx: &mut DemuxState) {
        ctx.pending.remove(&self.pid);
    }

    fn begin_packet(&mut self, ctx: &mut DemuxState, header: PesHeader<'_>) {
        ctx.close(self.pid);
        let stream_id = header.stream_id();
        let declared = match header.pes_packet_length() {
            PesLength::Bounded(len) => Some(usize::from(len.get()) + layout::PES_PREFIX_LEN),
            PesLength::Unbounded => None,
        };
        let payload = match header.contents() {
            PesContents::Parsed(Some(parsed)) => parsed.payload(),
            PesContents::Parsed(None) => {
                debug!(pid = self.pid, "skipping PES packet with bad header");
                ctx.errors.push(TsError::InvalidPesHeader { pid: self.pid });
                return;
            }
            PesContents::Payload(payload) => payload,
        };
        let header_len = ctx.lead_len.saturating_sub(payload.len());
        let pending = PendingUnit {
            stream_id,
            payload: payload.to_vec(),
            expected: declared.map(|total| total.saturating_sub(header_len)),
        };
        ctx.store(self.pid, pending);
    }

    fn continue_packet(&mut self, ctx: &mut DemuxState, data: &[u8]) {
        if let Some(mut pending) = ctx.pending.remove(&self.pid) {
            pending.payload.extend_from_slice(data);
            ctx.store(self.pid, pending);
        }
    }

    fn end_packet(&mut self, ctx: &mut DemuxState) {
        ctx.close(self.pid);
    }

    fn continuity_error(&mut self, ctx: &mut DemuxState) {
        debug!(pid = self.pid, "dropping partial PES unit");
        ctx.pending.remove(&self.pid);
        ctx.errors.push(TsError::ContinuityGap { pid: self.pid });
    }
}

/// Stateful demultiplexer fed with transport-stream datagrams.
///
/// Units are emitted when the next unit starts on the same PID, when their
/// declared length is reached, or on [`TsDemux::flush`].
pub struct TsDemux {
    demux: demultiplex::Demultiplex<DemuxState>,
    state: DemuxState,
}

impl TsDemux {
    pub fn new(pid_filter: Option<u16>) -> Self {
        let mut state = DemuxState::new(pid_filter);
        let demux = demultiplex::Demultiplex::new(&mut state);
        Self { demux, state }
    }

    /// Feed one datagram of whole 188-byte packets.
    ///
    /// Packets without a sync byte are skipped and recorded; see
    /// [`TsDemux::take_errors`].
    pub fn push(&mut self, datagram: &[u8]) -> Vec<PesUnit> {
        if datagram.len() % layout::TS_PACKET_SIZE != 0 {
            debug!(len = datagram.len(), "datagram is not whole TS packets");
            self.state.errors.push(TsError::Misaligned {
                len: datagram.len(),
            });
        }
        for chunk in datagram.chunks_exact(layout::TS_PACKET_SIZE) {
            let found = chunk[0];
            if found != layout::SYNC_BYTE {
                debug!(found, "skipping TS packet without sync byte");
                self.state.errors.push(TsError::InvalidSync { found });
                continue;
            }
            self.demux.push(&mut self.state, chunk);
        }
        std::mem::take(&mut self.state.units)
    }

    /// Emit every pending unit in PID order.
    pub fn flush(&mut self) -> Vec<PesUnit> {
        let pending = std::mem::take(&mut self.state.pending);
        let mut units = std::mem::take(&mut self.state.units);
        units.extend(pending.into_iter().map(|(pid, unit)| unit.finish(pid)));
        units
    }

    /// Drain errors recorded since the last call.
    pub fn take_errors(&mut self) -> Vec<TsError> {
        std::mem::take(&mut self.state.errors)
    }
}
