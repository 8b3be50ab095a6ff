use std::io::Read;
use std::net::{SocketAddrV4, UdpSocket};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::thread;
use std::time::Duration;

use assert_cmd::Command;
use droneklv_core::fixtures::{
    FIXTURE_PID, KLV_STREAM_ID, pes_packet, sample_frame, transport_stream_capture,
    ts_packets_for_pes, write_pcapng,
};
use predicates::prelude::PredicateBooleanExt;
use predicates::str::contains;
use serde_json::Value;
use tempfile::TempDir;

fn cmd() -> Command {
    Command::new(assert_cmd::cargo::cargo_bin!("droneklv"))
}

fn write_capture(dir: &Path, corrupt: bool) -> PathBuf {
    let src: SocketAddrV4 = "10.0.0.1:5000".parse().expect("src");
    let dst: SocketAddrV4 = "239.0.0.1:20000".parse().expect("dst");
    let mut frames: Vec<Vec<u8>> = (0..3).map(sample_frame).collect();
    if corrupt {
        let last = frames[1].len() - 1;
        frames[1][last] ^= 0xFF;
    }
    let path = dir.join(if corrupt { "corrupt.pcapng" } else { "flight.pcapng" });
    let capture = transport_stream_capture(src, dst, &frames, 100_000).expect("capture");
    write_pcapng(&path, &capture).expect("write capture");
    path
}

fn stdout_json(assert: &assert_cmd::assert::Assert) -> Value {
    let stdout = String::from_utf8(assert.get_output().stdout.clone()).expect("utf8 stdout");
    serde_json::from_str(&stdout).expect("valid json")
}

#[test]
fn help_supports_analyse_and_analyze() {
    cmd()
        .arg("pcap")
        .arg("analyse")
        .arg("--help")
        .assert()
        .success();
    cmd()
        .arg("pcap")
        .arg("analyze")
        .arg("--help")
        .assert()
        .success();
    cmd()
        .arg("klv")
        .arg("decode")
        .arg("--help")
        .assert()
        .success();
    cmd()
        .arg("udp")
        .arg("listen")
        .arg("--help")
        .assert()
        .success();
}

#[test]
fn missing_input_shows_error_and_hint() {
    let temp = TempDir::new().expect("tempdir");
    let missing = temp.path().join("missing.pcapng");
    let report = temp.path().join("report.json");

    cmd()
        .arg("pcap")
        .arg("analyze")
        .arg(missing)
        .arg("-o")
        .arg(report)
        .assert()
        .code(2)
        .stderr(contains("error:").and(contains("hint:")));
}

#[test]
fn unsupported_extension_is_rejected() {
    let temp = TempDir::new().expect("tempdir");
    let input = temp.path().join("capture.txt");
    std::fs::write(&input, b"not a capture").expect("write input");

    cmd()
        .arg("pcap")
        .arg("analyse")
        .arg(input)
        .arg("--stdout")
        .assert()
        .failure()
        .stderr(contains("unsupported input format"));
}

#[test]
fn stdout_outputs_decoded_packets() {
    let temp = TempDir::new().expect("tempdir");
    let input = write_capture(temp.path(), false);
    let assert = cmd()
        .arg("pcap")
        .arg("analyze")
        .arg(input)
        .arg("--stdout")
        .assert()
        .success();

    let report = stdout_json(&assert);
    assert_eq!(report["tool"]["name"], "droneklv");
    assert_eq!(report["packets"].as_array().expect("packets").len(), 3);
    assert_eq!(report["streams"][0]["pid"], 257);
    assert_eq!(report["packets"][0]["fields"][1]["name"], "Mission ID");
    assert_eq!(report["packets"][0]["fields"][1]["value"]["value"], "4d495353494f4e3031");
}

#[test]
fn pid_filter_accepts_hex() {
    let temp = TempDir::new().expect("tempdir");
    let input = write_capture(temp.path(), false);
    let assert = cmd()
        .arg("pcap")
        .arg("analyse")
        .arg(&input)
        .arg("--stdout")
        .arg("--pid")
        .arg("0x0200")
        .assert()
        .success();
    assert!(stdout_json(&assert)["packets"]
        .as_array()
        .expect("packets")
        .is_empty());

    cmd()
        .arg("pcap")
        .arg("analyse")
        .arg(&input)
        .arg("--stdout")
        .arg("--pid")
        .arg("0x4000")
        .assert()
        .failure();
}

#[test]
fn stdout_and_report_conflict() {
    let temp = TempDir::new().expect("tempdir");
    let input = write_capture(temp.path(), false);
    let report = temp.path().join("report.json");

    cmd()
        .arg("pcap")
        .arg("analyze")
        .arg(input)
        .arg("--stdout")
        .arg("-o")
        .arg(report)
        .assert()
        .failure()
        .stderr(contains("error:"));
}

#[test]
fn pretty_and_compact_conflict() {
    let temp = TempDir::new().expect("tempdir");
    let input = write_capture(temp.path(), false);
    let report = temp.path().join("report.json");

    cmd()
        .arg("pcap")
        .arg("analyze")
        .arg(input)
        .arg("-o")
        .arg(report)
        .arg("--pretty")
        .arg("--compact")
        .assert()
        .failure()
        .stderr(contains("error:"));
}

#[test]
fn report_file_is_written_with_summary_line() {
    let temp = TempDir::new().expect("tempdir");
    let input = write_capture(temp.path(), false);
    let report = temp.path().join("out").join("report.json");

    cmd()
        .arg("pcap")
        .arg("analyse")
        .arg(input)
        .arg("-o")
        .arg(&report)
        .arg("--pretty")
        .assert()
        .success()
        .stderr(contains("OK: 3 KLV packets, 0 decode errors"));

    let written = std::fs::read_to_string(&report).expect("report written");
    assert!(written.contains("\n  \"report_version\": 1"));
}

#[test]
fn report_must_differ_from_input() {
    let temp = TempDir::new().expect("tempdir");
    let input = write_capture(temp.path(), false);

    cmd()
        .arg("pcap")
        .arg("analyse")
        .arg(&input)
        .arg("-o")
        .arg(&input)
        .assert()
        .failure()
        .stderr(contains("report path must differ from input"));
}

#[test]
fn quiet_suppresses_ok_message() {
    let temp = TempDir::new().expect("tempdir");
    let input = write_capture(temp.path(), false);
    let report = temp.path().join("report.json");

    cmd()
        .arg("pcap")
        .arg("analyze")
        .arg(input)
        .arg("-o")
        .arg(report)
        .arg("--quiet")
        .assert()
        .success()
        .stderr(predicates::str::contains("OK:").not());
}

#[test]
fn strict_fails_when_decode_errors_present() {
    let temp = TempDir::new().expect("tempdir");
    let input = write_capture(temp.path(), true);
    let report = temp.path().join("report.json");

    cmd()
        .arg("pcap")
        .arg("analyze")
        .arg(&input)
        .arg("-o")
        .arg(&report)
        .arg("--strict")
        .assert()
        .code(2)
        .stderr(contains("1 decode errors detected"));
    assert!(report.exists());

    cmd()
        .arg("pcap")
        .arg("analyze")
        .arg(&input)
        .arg("--stdout")
        .assert()
        .success();
}

#[test]
fn glob_must_match_single_file() {
    let temp = TempDir::new().expect("tempdir");
    write_capture(temp.path(), false);
    write_capture(temp.path(), true);
    let pattern = temp.path().join("*.pcapng");

    cmd()
        .arg("pcap")
        .arg("analyse")
        .arg(pattern)
        .arg("--stdout")
        .assert()
        .failure()
        .stderr(contains("multiple files match pattern"));

    let pattern = temp.path().join("flight*.pcapng");
    cmd()
        .arg("pcap")
        .arg("analyse")
        .arg(pattern)
        .arg("--stdout")
        .assert()
        .success();
}

#[test]
fn klv_decode_reads_raw_frames() {
    let temp = TempDir::new().expect("tempdir");
    let input = temp.path().join("metadata.klv");
    let mut bytes = sample_frame(0);
    bytes.extend(sample_frame(1));
    std::fs::write(&input, &bytes).expect("write klv");

    let assert = cmd()
        .arg("klv")
        .arg("decode")
        .arg(&input)
        .arg("--stdout")
        .assert()
        .success();
    let report = stdout_json(&assert);
    assert!(report.get("capture_summary").is_none());
    assert_eq!(report["packets"].as_array().expect("packets").len(), 2);
    assert_eq!(report["packets"][0]["fields"][0]["name"], "UNIX Time Stamp");

    let assert = cmd()
        .arg("klv")
        .arg("decode")
        .arg(&input)
        .arg("--stdout")
        .arg("--offset")
        .arg("1")
        .assert()
        .success();
    let report = stdout_json(&assert);
    assert_eq!(report["packets"].as_array().expect("packets").len(), 1);
    assert_eq!(report["packets"][0]["offset"], sample_frame(0).len());
}

#[test]
fn klv_decode_strict_flags_garbage() {
    let temp = TempDir::new().expect("tempdir");
    let input = temp.path().join("garbage.bin");
    std::fs::write(&input, [0u8; 64]).expect("write input");

    cmd()
        .arg("klv")
        .arg("decode")
        .arg(input)
        .arg("--stdout")
        .arg("--strict")
        .assert()
        .code(2)
        .stdout(contains("universal_key_not_found"))
        .stderr(contains("decode errors detected"));
}

#[test]
fn udp_listen_prints_decoded_packet() {
    let port = {
        let reserved = UdpSocket::bind("127.0.0.1:0").expect("bind free port");
        reserved.local_addr().expect("local addr").port()
    };
    let mut child = std::process::Command::new(assert_cmd::cargo::cargo_bin!("droneklv"))
        .args(["udp", "listen", "127.0.0.1"])
        .arg(port.to_string())
        .args(["--pid", "0x0101", "--max-packets", "1"])
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn listener");

    let sender = UdpSocket::bind("127.0.0.1:0").expect("bind sender");
    let pes = pes_packet(KLV_STREAM_ID, &sample_frame(0));
    let mut cc = 0;
    let mut exited = false;
    for _ in 0..100 {
        let (datagram, next) = ts_packets_for_pes(FIXTURE_PID, &pes, cc);
        cc = next;
        sender
            .send_to(&datagram, ("127.0.0.1", port))
            .expect("send datagram");
        thread::sleep(Duration::from_millis(50));
        if child.try_wait().expect("poll listener").is_some() {
            exited = true;
            break;
        }
    }
    if !exited {
        let _ = child.kill();
    }
    let status = child.wait().expect("wait listener");
    assert!(exited, "listener did not stop after one packet");
    assert!(status.success());

    let mut stdout = String::new();
    child
        .stdout
        .take()
        .expect("stdout pipe")
        .read_to_string(&mut stdout)
        .expect("read stdout");
    let lines: Vec<&str> = stdout.lines().collect();
    assert_eq!(lines.len(), 1);
    let record: Value = serde_json::from_str(lines[0]).expect("json line");
    assert_eq!(record["pid"], 257);
    assert_eq!(record["capture_index"], 0);
    assert_eq!(record["fields"][0]["name"], "UNIX Time Stamp");
    assert_eq!(record["dst"], format!("127.0.0.1:{port}"));
}
