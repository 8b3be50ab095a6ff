//! Synthetic capture builders for tests and demos.
//!
//! Layers nest the way a sender produces them: KLV frame -> PES packet ->
//! 188-byte transport packets -> UDP/IPv4/Ethernet frame -> PCAP(NG) file.

use std::io;
use std::net::SocketAddrV4;
use std::path::Path;

use etherparse::PacketBuilder;
use etherparse::err::packet::BuildWriteError;

use crate::protocols::klv::encoder::build_frame;
use crate::protocols::mpegts::layout as ts;

const SENDER_MAC: [u8; 6] = [0x02, 0x4B, 0x4C, 0x56, 0x00, 0x01];
const RECEIVER_MAC: [u8; 6] = [0x01, 0x00, 0x5E, 0x00, 0x00, 0x01];
const IPV4_TTL: u8 = 16;
const TS_PAYLOAD_LEN: usize = ts::TS_PACKET_SIZE - ts::TS_HEADER_LEN;

const PCAPNG_SECTION_HEADER: u32 = 0x0A0D_0D0A;
const PCAPNG_INTERFACE_DESCRIPTION: u32 = 1;
const PCAPNG_ENHANCED_PACKET: u32 = 6;
const PCAPNG_BYTE_ORDER_MAGIC: u32 = 0x1A2B_3C4D;
/// Major 1, minor 0.
const PCAPNG_VERSION: [u8; 4] = [0, 1, 0, 0];
const UNKNOWN_SECTION_LEN: u64 = u64::MAX;
/// Block type, leading and trailing total length.
const PCAPNG_BLOCK_OVERHEAD: usize = 12;
const PCAP_MAGIC_MICROS: u32 = 0xA1B2_C3D4;
const LINKTYPE_ETHERNET: u16 = 1;
const SNAPLEN: u32 = 65_535;

/// Stream id of synchronous metadata PES packets.
pub const KLV_STREAM_ID: u8 = 0xFC;
pub const FIXTURE_PID: u16 = 0x0101;

/// One captured frame: timestamp in microseconds and link-layer bytes.
pub type CapturedFrame = (u64, Vec<u8>);

/// A plausible platform metadata frame; `seq` varies heading and timestamp.
pub fn sample_frame(seq: u16) -> Vec<u8> {
    let timestamp = (1_221_508_675_029_672u64 + u64::from(seq) * 33_366).to_be_bytes();
    let heading = (0x71C2u16.wrapping_add(seq)).to_be_bytes();
    let latitude = 0x5595_B66Du32.to_be_bytes();
    let longitude = 0x5B53_60C4u32.to_be_bytes();
    build_frame(&[
        (2, &timestamp[..]),
        (3, &b"MISSION01"[..]),
        (5, &heading[..]),
        (13, &latitude[..]),
        (14, &longitude[..]),
        (65, &[0x0B][..]),
    ])
}

/// PES packet around `payload` with no optional header fields.
pub fn pes_packet(stream_id: u8, payload: &[u8]) -> Vec<u8> {
    let declared = u16::try_from(3 + payload.len()).unwrap_or(0);
    let mut out = ts::PES_START_CODE.to_vec();
    out.push(stream_id);
    out.extend_from_slice(&declared.to_be_bytes());
    out.extend_from_slice(&[0x80, 0x00, 0x00]);
    out.extend_from_slice(payload);
    out
}

/// Split a PES packet into transport packets, padding the last one with
/// adaptation-field stuffing. Returns the packets and the next continuity
/// counter.
pub fn ts_packets_for_pes(pid: u16, pes: &[u8], continuity: u8) -> (Vec<u8>, u8) {
    let mut out = Vec::new();
    let mut cc = continuity % ts::CONTINUITY_MODULUS;
    for (idx, chunk) in pes.chunks(TS_PAYLOAD_LEN).enumerate() {
        let mut high = (pid >> 8) as u8 & ts::PID_HIGH_MASK;
        if idx == 0 {
            high |= ts::PUSI_FLAG;
        }
        let stuffing = TS_PAYLOAD_LEN - chunk.len();
        let control = if stuffing == 0 { 0b01 } else { 0b11 };
        out.extend_from_slice(&[ts::SYNC_BYTE, high, pid as u8, (control << 4) | cc]);
        if stuffing > 0 {
            let adaptation_len = stuffing - 1;
            out.push(adaptation_len as u8);
            if adaptation_len > 0 {
                out.push(0x00);
                out.extend(std::iter::repeat_n(0xFF, adaptation_len - 1));
            }
        }
        out.extend_from_slice(chunk);
        cc = (cc + 1) % ts::CONTINUITY_MODULUS;
    }
    (out, cc)
}

/// Ethernet II + IPv4 + UDP frame carrying `payload`.
pub fn ipv4_udp_frame(
    src: SocketAddrV4,
    dst: SocketAddrV4,
    payload: &[u8],
) -> Result<Vec<u8>, BuildWriteError> {
    let builder = PacketBuilder::ethernet2(SENDER_MAC, RECEIVER_MAC)
        .ipv4(src.ip().octets(), dst.ip().octets(), IPV4_TTL)
        .udp(src.port(), dst.port());
    let mut frame = Vec::with_capacity(builder.size(payload.len()));
    builder.write(&mut frame, payload)?;
    Ok(frame)
}

/// One UDP frame per KLV frame, each wrapped in a PES packet on
/// [`FIXTURE_PID`], spaced `interval_us` apart.
pub fn transport_stream_capture(
    src: SocketAddrV4,
    dst: SocketAddrV4,
    frames: &[Vec<u8>],
    interval_us: u64,
) -> Result<Vec<CapturedFrame>, BuildWriteError> {
    let mut cc = 0;
    let mut capture = Vec::with_capacity(frames.len());
    for (idx, frame) in frames.iter().enumerate() {
        let pes = pes_packet(KLV_STREAM_ID, frame);
        let (packets, next) = ts_packets_for_pes(FIXTURE_PID, &pes, cc);
        cc = next;
        capture.push((idx as u64 * interval_us, ipv4_udp_frame(src, dst, &packets)?));
    }
    Ok(capture)
}

/// Big-endian PCAPNG file with one Ethernet interface (microsecond stamps).
pub fn pcapng_bytes(frames: &[CapturedFrame]) -> Vec<u8> {
    let mut out = Vec::new();
    push_block(
        &mut out,
        PCAPNG_SECTION_HEADER,
        &[
            &PCAPNG_BYTE_ORDER_MAGIC.to_be_bytes(),
            &PCAPNG_VERSION,
            &UNKNOWN_SECTION_LEN.to_be_bytes(),
        ],
    );
    push_block(
        &mut out,
        PCAPNG_INTERFACE_DESCRIPTION,
        &[&LINKTYPE_ETHERNET.to_be_bytes(), &[0u8, 0], &SNAPLEN.to_be_bytes()],
    );
    for (ts_us, data) in frames {
        // High and low halves of the 64-bit stamp, in that order.
        let stamp = ts_us.to_be_bytes();
        let len = (data.len() as u32).to_be_bytes();
        push_block(
            &mut out,
            PCAPNG_ENHANCED_PACKET,
            &[&[0u8; 4], &stamp, &len, &len, data.as_slice()],
        );
    }
    out
}

/// Little-endian legacy PCAP file (Ethernet, microsecond stamps).
pub fn legacy_pcap_bytes(frames: &[CapturedFrame]) -> Vec<u8> {
    let mut output = Vec::new();
    output.extend_from_slice(&PCAP_MAGIC_MICROS.to_le_bytes());
    output.extend_from_slice(&2u16.to_le_bytes());
    output.extend_from_slice(&4u16.to_le_bytes());
    output.extend_from_slice(&0i32.to_le_bytes());
    output.extend_from_slice(&0u32.to_le_bytes());
    output.extend_from_slice(&SNAPLEN.to_le_bytes());
    output.extend_from_slice(&u32::from(LINKTYPE_ETHERNET).to_le_bytes());
    for (ts_us, data) in frames {
        let len = data.len() as u32;
        output.extend_from_slice(&((ts_us / 1_000_000) as u32).to_le_bytes());
        output.extend_from_slice(&((ts_us % 1_000_000) as u32).to_le_bytes());
        output.extend_from_slice(&len.to_le_bytes());
        output.extend_from_slice(&len.to_le_bytes());
        output.extend_from_slice(data);
    }
    output
}

pub fn write_pcapng(path: &Path, frames: &[CapturedFrame]) -> io::Result<()> {
    std::fs::write(path, pcapng_bytes(frames))
}

/// Append one block: type, total length, 32-bit aligned body, total length.
fn push_block(out: &mut Vec<u8>, block_type: u32, fields: &[&[u8]]) {
    let body_len: usize = fields.iter().map(|field| field.len()).sum();
    let padded = body_len.next_multiple_of(4);
    let total = ((padded + PCAPNG_BLOCK_OVERHEAD) as u32).to_be_bytes();
    out.extend_from_slice(&block_type.to_be_bytes());
    out.extend_from_slice(&total);
    for field in fields {
        out.extend_from_slice(field);
    }
    out.resize(out.len() + padded - body_len, 0);
    out.extend_from_slice(&total);
}

#[cfg(test)]
mod tests {
    use std::net::SocketAddrV4;

    use etherparse::{SlicedPacket, TransportSlice};

    use super::{
        FIXTURE_PID, KLV_STREAM_ID, ipv4_udp_frame, pcapng_bytes, pes_packet, sample_frame,
        ts_packets_for_pes,
    };
    use crate::protocols::klv::decode_frame;
    use crate::protocols::mpegts::{TsDemux, layout};

    #[test]
    fn sample_frame_decodes() {
        let frame = sample_frame(3);
        let decoded = decode_frame(&frame, 0).unwrap();
        assert_eq!(decoded.size, frame.len());
        assert_eq!(decoded.packet.len(), 7);
    }

    #[test]
    fn ts_packets_are_aligned_and_stuffed() {
        let payload = [0xAB; 400];
        let pes = pes_packet(KLV_STREAM_ID, &payload);
        let (packets, next_cc) = ts_packets_for_pes(FIXTURE_PID, &pes, 14);
        assert_eq!(packets.len() % layout::TS_PACKET_SIZE, 0);
        assert_eq!(packets.len() / layout::TS_PACKET_SIZE, 3);
        assert_eq!(next_cc, 1);

        let tail = pes.len() - 2 * 184;
        let adaptation_len = packets[2 * layout::TS_PACKET_SIZE + 4];
        assert_eq!(usize::from(adaptation_len), 184 - tail - 1);

        let units = TsDemux::new(None).push(&packets);
        assert_eq!(units[0].payload, payload);
    }

    #[test]
    fn single_byte_stuffing_uses_empty_adaptation_field() {
        let payload = [0x11; 174];
        let (packets, _) = ts_packets_for_pes(FIXTURE_PID, &pes_packet(KLV_STREAM_ID, &payload), 0);
        assert_eq!(packets.len(), layout::TS_PACKET_SIZE);
        assert_eq!(packets[4], 0);
        let units = TsDemux::new(None).push(&packets);
        assert_eq!(units[0].payload, payload);
    }

    #[test]
    fn demux_recovers_frame() {
        let frame = sample_frame(0);
        let (packets, _) = ts_packets_for_pes(FIXTURE_PID, &pes_packet(KLV_STREAM_ID, &frame), 0);
        let mut demux = TsDemux::new(None);
        let units = demux.push(&packets);
        assert_eq!(units.len(), 1);
        assert_eq!(units[0].payload, frame);
    }

    #[test]
    fn udp_frame_slices_back_to_its_payload() {
        let src: SocketAddrV4 = "10.1.2.3:5000".parse().unwrap();
        let dst: SocketAddrV4 = "239.0.0.1:20000".parse().unwrap();
        let frame = ipv4_udp_frame(src, dst, b"metadata").unwrap();

        let sliced = SlicedPacket::from_ethernet(&frame).unwrap();
        let Some(TransportSlice::Udp(udp)) = sliced.transport else {
            panic!("expected UDP");
        };
        assert_eq!(udp.source_port(), 5000);
        assert_eq!(udp.destination_port(), 20000);
        assert_eq!(udp.payload(), b"metadata");
    }

    #[test]
    fn pcapng_blocks_are_word_aligned() {
        let bytes = pcapng_bytes(&[(1_500_000, vec![1, 2, 3]), (2_000_000, vec![4; 8])]);
        assert_eq!(bytes.len() % 4, 0);

        let mut offset = 0;
        let mut blocks = Vec::new();
        while offset < bytes.len() {
            let block_type = u32::from_be_bytes(bytes[offset..offset + 4].try_into().unwrap());
            let total = u32::from_be_bytes(bytes[offset + 4..offset + 8].try_into().unwrap()) as usize;
            let trailer = &bytes[offset + total - 4..offset + total];
            assert_eq!(u32::from_be_bytes(trailer.try_into().unwrap()) as usize, total);
            blocks.push((block_type, total));
            offset += total;
        }
        assert_eq!(blocks, vec![(0x0A0D_0D0A, 28), (1, 20), (6, 36), (6, 40)]);
    }
}
