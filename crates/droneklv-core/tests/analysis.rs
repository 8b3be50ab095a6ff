use std::fs;
use std::net::SocketAddrV4;
use std::path::{Path, PathBuf};

use droneklv_core::fixtures::{
    FIXTURE_PID, KLV_STREAM_ID, ipv4_udp_frame, pcapng_bytes, pes_packet, sample_frame,
    transport_stream_capture, ts_packets_for_pes,
};
use droneklv_core::{
    AnalysisOptions, FieldValueSummary, Report, analyze_klv_file, analyze_pcap_file,
};

fn src() -> SocketAddrV4 {
    "10.0.0.1:5000".parse().unwrap()
}

fn dst() -> SocketAddrV4 {
    "239.0.0.1:20000".parse().unwrap()
}

fn write_capture(dir: &Path, frames: &[(u64, Vec<u8>)]) -> PathBuf {
    let path = dir.join("flight.pcapng");
    fs::write(&path, pcapng_bytes(frames)).unwrap();
    path
}

fn analyze(frames: &[(u64, Vec<u8>)], options: &AnalysisOptions) -> Report {
    let dir = tempfile::tempdir().unwrap();
    let path = write_capture(dir.path(), frames);
    analyze_pcap_file(&path, options).unwrap()
}

#[test]
fn transport_stream_capture_decodes_every_frame() {
    let frames: Vec<Vec<u8>> = (0..5).map(sample_frame).collect();
    let capture = transport_stream_capture(src(), dst(), &frames, 100_000).unwrap();
    let report = analyze(&capture, &AnalysisOptions::default());

    let summary = report.capture_summary.as_ref().unwrap();
    assert_eq!(summary.packets_total, 5);
    assert_eq!(summary.udp_datagrams, 5);
    assert_eq!(summary.klv_packets, 5);
    assert_eq!(summary.time_start.as_deref(), Some("1970-01-01T00:00:00Z"));
    assert_eq!(summary.time_end.as_deref(), Some("1970-01-01T00:00:00.4Z"));
    assert_eq!(report.generated_at, "1970-01-01T00:00:00.4Z");

    assert_eq!(report.streams.len(), 1);
    let stream = &report.streams[0];
    assert_eq!(stream.src, "10.0.0.1:5000");
    assert_eq!(stream.dst, "239.0.0.1:20000");
    assert_eq!(stream.pid, Some(FIXTURE_PID));
    assert_eq!(stream.units, 5);
    assert_eq!(stream.klv_packets, 5);
    let rate = stream.klv_rate_hz.unwrap();
    assert!((rate - 10.0).abs() < 1e-6);

    assert_eq!(report.packets.len(), 5);
    assert!(report.errors.is_empty());

    let first = &report.packets[0];
    assert_eq!(first.capture_index, Some(0));
    let tags: Vec<u8> = first.fields.iter().map(|field| field.tag).collect();
    assert_eq!(tags, vec![2, 3, 5, 13, 14, 65, 1]);
    assert_eq!(
        first.fields[0].value,
        FieldValueSummary::Timestamp("2008-09-15T19:57:55.029672Z".to_string())
    );
    assert_eq!(
        first.fields[1].value,
        FieldValueSummary::Bytes("4d495353494f4e3031".to_string())
    );
    assert_eq!(first.fields[5].value, FieldValueSummary::Integer(11));
}

#[test]
fn frame_split_across_datagrams_is_reassembled() {
    let mut body = sample_frame(0);
    body.extend(sample_frame(1));
    body.extend(sample_frame(2));
    let (packets, _) = ts_packets_for_pes(FIXTURE_PID, &pes_packet(KLV_STREAM_ID, &body), 0);
    assert_eq!(packets.len(), 2 * 188);
    let (head, tail) = packets.split_at(188);
    let capture = vec![
        (0, ipv4_udp_frame(src(), dst(), head).unwrap()),
        (40_000, ipv4_udp_frame(src(), dst(), tail).unwrap()),
    ];

    let report = analyze(&capture, &AnalysisOptions::default());
    assert_eq!(report.streams[0].units, 1);
    assert_eq!(report.packets.len(), 3);
    assert!(report.packets.iter().all(|packet| packet.capture_index == Some(1)));
    assert!(report.errors.is_empty());
}

#[test]
fn lost_transport_packet_drops_the_unit() {
    let long: Vec<u8> = (0..7).flat_map(sample_frame).collect();
    let (first, cc) = ts_packets_for_pes(FIXTURE_PID, &pes_packet(KLV_STREAM_ID, &long), 0);
    assert_eq!(first.len(), 3 * 188);
    let next = pes_packet(KLV_STREAM_ID, &sample_frame(7));
    let (second, _) = ts_packets_for_pes(FIXTURE_PID, &next, cc);
    let capture = vec![
        (0, ipv4_udp_frame(src(), dst(), &first[..188]).unwrap()),
        (10_000, ipv4_udp_frame(src(), dst(), &first[2 * 188..]).unwrap()),
        (20_000, ipv4_udp_frame(src(), dst(), &second).unwrap()),
    ];

    let report = analyze(&capture, &AnalysisOptions::default());
    assert_eq!(report.packets.len(), 1);
    assert_eq!(report.packets[0].capture_index, Some(2));
    assert_eq!(report.errors.len(), 1);
    assert_eq!(report.errors[0].stage, "ts");
    assert_eq!(report.errors[0].kind, "ts_continuity_gap");
    assert_eq!(report.errors[0].count, 1);
}

#[test]
fn corrupt_frames_are_counted_and_skipped() {
    let mut frames: Vec<Vec<u8>> = (0..4).map(sample_frame).collect();
    let last = frames[1].len() - 1;
    frames[1][last] ^= 0xFF;
    frames[3][20] ^= 0x01;
    let capture = transport_stream_capture(src(), dst(), &frames, 100_000).unwrap();

    let report = analyze(&capture, &AnalysisOptions::default());
    assert_eq!(report.packets.len(), 2);
    assert_eq!(report.streams[0].decode_errors, 2);
    assert_eq!(report.error_count(), 2);
    assert_eq!(report.errors.len(), 1);
    let summary = &report.errors[0];
    assert_eq!(summary.stage, "klv");
    assert_eq!(summary.kind, "checksum");
    assert_eq!(summary.examples.len(), 2);
    assert!(summary.examples[0].starts_with("frame #1 10.0.0.1:5000 -> 239.0.0.1:20000"));
}

#[test]
fn raw_klv_over_udp_is_decoded_without_pid() {
    let capture = vec![
        (0, ipv4_udp_frame(src(), dst(), &sample_frame(0)).unwrap()),
        (1_000, ipv4_udp_frame(src(), dst(), b"not metadata").unwrap()),
    ];
    let report = analyze(&capture, &AnalysisOptions::default());
    assert_eq!(report.packets.len(), 1);
    assert_eq!(report.streams.len(), 1);
    assert_eq!(report.streams[0].pid, None);
    assert!(report.errors.is_empty());
}

#[test]
fn options_filter_and_cap() {
    let frames: Vec<Vec<u8>> = (0..4).map(sample_frame).collect();
    let capture = transport_stream_capture(src(), dst(), &frames, 100_000).unwrap();

    let other_port = AnalysisOptions {
        udp_port: Some(1234),
        ..AnalysisOptions::default()
    };
    let report = analyze(&capture, &other_port);
    assert_eq!(report.capture_summary.as_ref().unwrap().udp_datagrams, 0);
    assert!(report.packets.is_empty());

    let other_pid = AnalysisOptions {
        pid: Some(0x0200),
        ..AnalysisOptions::default()
    };
    assert!(analyze(&capture, &other_pid).streams.is_empty());

    let capped = AnalysisOptions {
        udp_port: Some(20000),
        max_packets: Some(2),
        ..AnalysisOptions::default()
    };
    let report = analyze(&capture, &capped);
    assert_eq!(report.packets.len(), 2);
    assert_eq!(report.capture_summary.as_ref().unwrap().klv_packets, 4);
}

#[test]
fn raw_klv_file_report() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("frames.klv");
    let mut bytes = sample_frame(0);
    bytes.extend_from_slice(&[0xFF; 3]);
    bytes.extend(sample_frame(1));
    fs::write(&path, &bytes).unwrap();

    let report = analyze_klv_file(&path, &AnalysisOptions::default()).unwrap();
    assert!(report.capture_summary.is_none());
    assert_eq!(report.input.bytes, bytes.len() as u64);
    assert_eq!(report.packets.len(), 2);
    assert_eq!(report.packets[1].offset, sample_frame(0).len() + 3);
    assert!(report.packets[0].src.is_none());

    let skip_first = AnalysisOptions {
        start_offset: 1,
        ..AnalysisOptions::default()
    };
    let report = analyze_klv_file(&path, &skip_first).unwrap();
    assert_eq!(report.packets.len(), 1);
    assert_eq!(report.packets[0].offset, sample_frame(0).len() + 3);
}

#[test]
fn report_is_deterministic() {
    let frames: Vec<Vec<u8>> = (0..3).map(sample_frame).collect();
    let capture = transport_stream_capture(src(), dst(), &frames, 100_000).unwrap();
    let first = serde_json::to_value(analyze(&capture, &AnalysisOptions::default())).unwrap();
    let mut second = analyze(&capture, &AnalysisOptions::default());
    second.input.path = first["input"]["path"].as_str().unwrap().to_string();
    assert_eq!(first, serde_json::to_value(second).unwrap());
}
