use std::fs;
use std::io::{self, Write};
use std::net::{IpAddr, Ipv4Addr, SocketAddr, UdpSocket};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::{Context, Result};
use clap::{ArgAction, Args, Parser, Subcommand};
use droneklv_core::{AnalysisOptions, LiveDecoder, PacketRecord, Report};
use glob::glob;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

const LONG_VERSION: &str = concat!(
    env!("CARGO_PKG_VERSION"),
    " (commit ",
    env!("DRONEKLV_BUILD_COMMIT"),
    ", built ",
    env!("DRONEKLV_BUILD_DATE"),
    ")"
);

#[derive(Parser, Debug)]
#[command(name = "droneklv")]
#[command(version, long_version = LONG_VERSION)]
#[command(
    about = "Decoder for UAS datalink KLV metadata in network captures and live UDP streams.",
    long_about = None,
    after_help = "Examples:\n  droneklv pcap analyse flight.pcapng -o report.json\n  droneklv pcap analyze flight.pcap --stdout --pretty\n  droneklv klv decode metadata.klv --stdout\n  droneklv udp listen 239.0.0.1 20000"
)]
struct Cli {
    /// Increase log verbosity (-v info, -vv debug, -vvv trace); RUST_LOG overrides
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Operations on PCAP/PCAPNG inputs (offline-first).
    Pcap {
        #[command(subcommand)]
        command: PcapCommands,
    },
    /// Operations on raw KLV byte files.
    Klv {
        #[command(subcommand)]
        command: KlvCommands,
    },
    /// Operations on live UDP streams.
    Udp {
        #[command(subcommand)]
        command: UdpCommands,
    },
}

#[derive(Subcommand, Debug)]
enum PcapCommands {
    /// Decode KLV metadata carried over UDP (MPEG-TS or raw) into a JSON report.
    #[command(alias = "analyze")]
    #[command(
        after_help = "Examples:\n  droneklv pcap analyse flight.pcapng -o report.json\n  droneklv pcap analyze flight.pcap --stdout --port 20000 --pid 0x0101"
    )]
    Analyse {
        /// Path to a .pcap or .pcapng file (glob patterns must match one file)
        input: PathBuf,

        #[command(flatten)]
        output: OutputArgs,

        /// Only UDP datagrams with this source or destination port
        #[arg(long)]
        port: Option<u16>,

        /// Only this transport stream PID (decimal or 0x-prefixed hex)
        #[arg(long, value_parser = parse_pid)]
        pid: Option<u16>,

        /// Store at most this many decoded packets in the report
        #[arg(long)]
        max_packets: Option<usize>,
    },
}

#[derive(Subcommand, Debug)]
enum KlvCommands {
    /// Decode every KLV frame in a raw byte file into a JSON report.
    #[command(
        after_help = "Examples:\n  droneklv klv decode metadata.klv --stdout --pretty\n  droneklv klv decode dump.bin --offset 512 -o report.json"
    )]
    Decode {
        /// Path to a file holding raw KLV bytes
        input: PathBuf,

        #[command(flatten)]
        output: OutputArgs,

        /// Byte offset where scanning starts
        #[arg(long, default_value_t = 0)]
        offset: usize,

        /// Store at most this many decoded packets in the report
        #[arg(long)]
        max_packets: Option<usize>,
    },
}

#[derive(Subcommand, Debug)]
enum UdpCommands {
    /// Receive datagrams and print one JSON line per decoded KLV packet.
    #[command(
        after_help = "Examples:\n  droneklv udp listen 0.0.0.0 20000\n  droneklv udp listen 239.0.0.1 20000 --pid 0x0101 --max-packets 10"
    )]
    Listen {
        /// Local address to bind; multicast groups are joined on all interfaces
        addr: IpAddr,

        /// UDP port to bind
        port: u16,

        /// Only this transport stream PID (decimal or 0x-prefixed hex)
        #[arg(long, value_parser = parse_pid)]
        pid: Option<u16>,

        /// Exit after printing this many packets
        #[arg(long)]
        max_packets: Option<usize>,
    },
}

#[derive(Args, Debug)]
struct OutputArgs {
    /// Output report path (JSON)
    #[arg(short = 'o', long, required_unless_present = "stdout")]
    report: Option<PathBuf>,

    /// Write JSON report to stdout
    #[arg(long, conflicts_with = "report")]
    stdout: bool,

    /// Pretty-print JSON output
    #[arg(long, conflicts_with = "compact")]
    pretty: bool,

    /// Compact JSON output (default)
    #[arg(long)]
    compact: bool,

    /// Suppress non-error output
    #[arg(long)]
    quiet: bool,

    /// Exit with a non-zero code if any decode error was recorded
    #[arg(long)]
    strict: bool,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let result = match cli.command {
        Commands::Pcap { command } => match command {
            PcapCommands::Analyse {
                input,
                output,
                port,
                pid,
                max_packets,
            } => {
                let options = AnalysisOptions {
                    udp_port: port,
                    pid,
                    max_packets,
                    ..AnalysisOptions::default()
                };
                cmd_pcap_analyse(input, output, options)
            }
        },
        Commands::Klv { command } => match command {
            KlvCommands::Decode {
                input,
                output,
                offset,
                max_packets,
            } => {
                let options = AnalysisOptions {
                    max_packets,
                    start_offset: offset,
                    ..AnalysisOptions::default()
                };
                cmd_klv_decode(input, output, options)
            }
        },
        Commands::Udp { command } => match command {
            UdpCommands::Listen {
                addr,
                port,
                pid,
                max_packets,
            } => cmd_udp_listen(SocketAddr::new(addr, port), pid, max_packets),
        },
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {}", err.message);
            if let Some(hint) = err.hint {
                eprintln!("hint: {}", hint);
            }
            ExitCode::from(2)
        }
    }
}

fn init_tracing(verbose: u8) {
    let default_level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

#[derive(Debug)]
struct CliError {
    message: String,
    hint: Option<String>,
}

impl CliError {
    fn new(message: impl Into<String>, hint: Option<String>) -> Self {
        Self {
            message: message.into(),
            hint,
        }
    }
}

impl std::fmt::Display for CliError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for CliError {}

impl From<anyhow::Error> for CliError {
    fn from(err: anyhow::Error) -> Self {
        CliError::new(format!("{:#}", err), None)
    }
}

fn cmd_pcap_analyse(
    input: PathBuf,
    output: OutputArgs,
    options: AnalysisOptions,
) -> Result<(), CliError> {
    let resolved_input = resolve_input_path(&input, "expected a .pcap or .pcapng file")?;
    validate_capture_file(&resolved_input)?;
    let report_path = prepare_report_path(&resolved_input, &output)?;

    info!(input = %resolved_input.display(), ?options, "analysing capture");
    let rep = droneklv_core::analyze_pcap_file(&resolved_input, &options)
        .context("PCAP/PCAPNG analysis failed")?;
    emit_report(&rep, &output, report_path.as_deref())
}

fn cmd_klv_decode(
    input: PathBuf,
    output: OutputArgs,
    options: AnalysisOptions,
) -> Result<(), CliError> {
    let resolved_input = resolve_input_path(&input, "expected a raw KLV file")?;
    ensure_input_file(&resolved_input, &input, "expected a raw KLV file")?;
    let report_path = prepare_report_path(&resolved_input, &output)?;

    info!(input = %resolved_input.display(), offset = options.start_offset, "decoding raw KLV");
    let rep = droneklv_core::analyze_klv_file(&resolved_input, &options)
        .context("KLV decoding failed")?;
    emit_report(&rep, &output, report_path.as_deref())
}

/// Largest payload a UDP datagram can carry.
const MAX_DATAGRAM_LEN: usize = 65_535;

fn cmd_udp_listen(
    bind: SocketAddr,
    pid: Option<u16>,
    max_packets: Option<usize>,
) -> Result<(), CliError> {
    let socket = UdpSocket::bind(bind).map_err(|err| {
        CliError::new(
            format!("failed to bind {bind}: {err}"),
            Some("check the address and that the port is free".to_string()),
        )
    })?;
    if let IpAddr::V4(group) = bind.ip() {
        if group.is_multicast() {
            socket
                .join_multicast_v4(&group, &Ipv4Addr::UNSPECIFIED)
                .with_context(|| format!("Failed to join multicast group {group}"))?;
        }
    }
    let local = socket.local_addr().context("Failed to read local address")?;
    info!(%local, ?pid, "listening for KLV datagrams");

    let mut decoder = LiveDecoder::new(pid);
    let mut buffer = vec![0u8; MAX_DATAGRAM_LEN];
    let mut printed = 0usize;
    let stdout = io::stdout();
    let mut out = stdout.lock();
    loop {
        let (len, src) = socket
            .recv_from(&mut buffer)
            .context("Failed to receive datagram")?;
        let records = decoder.push(src, local, &buffer[..len], receive_time());
        if records.is_empty() {
            debug!(%src, len, "datagram completed no KLV packet");
        }
        for record in records {
            print_record(&mut out, &record)?;
            printed += 1;
            if max_packets.is_some_and(|max| printed >= max) {
                info!(printed, datagrams = decoder.received(), "packet limit reached");
                return Ok(());
            }
        }
    }
}

fn print_record(out: &mut impl Write, record: &PacketRecord) -> Result<(), CliError> {
    let line = serde_json::to_string(record).context("JSON serialization failed")?;
    writeln!(out, "{line}")
        .and_then(|()| out.flush())
        .context("Failed to write to stdout")?;
    Ok(())
}

fn receive_time() -> Option<f64> {
    match SystemTime::now().duration_since(UNIX_EPOCH) {
        Ok(elapsed) => Some(elapsed.as_secs_f64()),
        Err(err) => {
            warn!(error = %err, "system clock is before the Unix epoch");
            None
        }
    }
}

/// Resolve the report path, refusing to overwrite the input.
fn prepare_report_path(input: &Path, output: &OutputArgs) -> Result<Option<PathBuf>, CliError> {
    if output.stdout {
        return Ok(None);
    }
    let report_path = output.report.clone().ok_or_else(|| {
        CliError::new(
            "missing output path",
            Some("use -o/--report or --stdout".to_string()),
        )
    })?;

    let input_abs = fs::canonicalize(input)
        .with_context(|| format!("Failed to resolve input path: {}", input.display()))?;
    let report_dir = report_path
        .parent()
        .map(|parent| {
            if parent.as_os_str().is_empty() {
                fs::canonicalize(".")
            } else {
                fs::canonicalize(parent)
            }
        })
        .transpose();
    // A missing parent directory is created later, so it cannot alias the input.
    if let Ok(Some(report_dir)) = report_dir {
        let file_name = report_path
            .file_name()
            .ok_or_else(|| anyhow::anyhow!("Invalid report path"))?;
        if report_dir.join(file_name) == input_abs {
            return Err(CliError::new(
                format!(
                    "report path must differ from input: {}",
                    report_path.display()
                ),
                Some("choose a different output path".to_string()),
            ));
        }
    }
    Ok(Some(report_path))
}

fn emit_report(
    rep: &Report,
    output: &OutputArgs,
    report_path: Option<&Path>,
) -> Result<(), CliError> {
    let json = serialize_report(rep, output.pretty, output.compact)?;

    match report_path {
        None => print!("{}", json),
        Some(path) => {
            if let Some(parent) = path.parent() {
                if !parent.as_os_str().is_empty() {
                    fs::create_dir_all(parent).with_context(|| {
                        format!("Failed to create output directory: {}", parent.display())
                    })?;
                }
            }
            fs::write(path, json)
                .with_context(|| format!("Failed to write report: {}", path.display()))?;
            debug!(path = %path.display(), "report written");
            if !output.quiet {
                eprintln!(
                    "OK: {} KLV packets, {} decode errors -> {}",
                    rep.packets.len(),
                    rep.error_count(),
                    path.display()
                );
            }
        }
    }

    if output.strict && rep.error_count() > 0 {
        return Err(CliError::new(
            format!("{} decode errors detected", rep.error_count()),
            Some("inspect the `errors` section of the report".to_string()),
        ));
    }
    Ok(())
}

fn serialize_report(rep: &Report, pretty: bool, compact: bool) -> Result<String, CliError> {
    if pretty && compact {
        return Err(CliError::new(
            "cannot use --pretty and --compact together",
            Some("choose one output format".to_string()),
        ));
    }
    if pretty {
        serde_json::to_string_pretty(rep)
            .context("JSON serialization failed")
            .map_err(Into::into)
    } else {
        serde_json::to_string(rep)
            .context("JSON serialization failed")
            .map_err(Into::into)
    }
}

fn parse_pid(value: &str) -> Result<u16, String> {
    let parsed = match value
        .strip_prefix("0x")
        .or_else(|| value.strip_prefix("0X"))
    {
        Some(hex) => u16::from_str_radix(hex, 16),
        None => value.parse::<u16>(),
    }
    .map_err(|err| format!("invalid PID '{}': {}", value, err))?;
    if parsed > 0x1FFF {
        return Err(format!("PID {:#06x} exceeds 13 bits", parsed));
    }
    Ok(parsed)
}

fn ensure_input_file(resolved: &Path, given: &Path, hint: &str) -> Result<(), CliError> {
    if !resolved.exists() {
        return Err(CliError::new(
            format!("input file not found: {}", given.display()),
            Some(hint.to_string()),
        ));
    }
    if !resolved.is_file() {
        return Err(CliError::new(
            format!("input is not a file: {}", given.display()),
            Some(hint.to_string()),
        ));
    }
    Ok(())
}

fn validate_capture_file(input: &Path) -> Result<(), CliError> {
    let hint = "use a .pcap or .pcapng file";
    ensure_input_file(input, input, hint)?;
    let ext = input
        .extension()
        .and_then(|ext| ext.to_str())
        .unwrap_or("")
        .to_ascii_lowercase();
    if ext != "pcap" && ext != "pcapng" {
        return Err(CliError::new(
            format!("unsupported input format '{}'", input.display()),
            Some("expected a .pcap or .pcapng file".to_string()),
        ));
    }
    Ok(())
}

fn resolve_input_path(input: &Path, expected: &str) -> Result<PathBuf, CliError> {
    let pattern = input.to_string_lossy();
    if !is_glob_pattern(&pattern) {
        return Ok(input.to_path_buf());
    }

    let mut matches = Vec::new();
    let paths = glob(&pattern).map_err(|err| {
        CliError::new(
            format!("invalid input pattern '{}'", pattern),
            Some(format!("pattern error: {}", err.msg)),
        )
    })?;
    for entry in paths {
        let path = entry.map_err(|err| {
            CliError::new(
                format!("invalid input pattern '{}'", pattern),
                Some(format!("pattern error: {}", err)),
            )
        })?;
        if path.is_file() {
            matches.push(path);
        }
    }

    if matches.is_empty() {
        return Err(CliError::new(
            format!("no files match pattern '{}'", pattern),
            Some(format!("check the path or quote the pattern; {}", expected)),
        ));
    }
    if matches.len() > 1 {
        let hint = "pass a single input file, or run once per file".to_string();
        let listed = matches
            .iter()
            .take(3)
            .map(|p| p.display().to_string())
            .collect::<Vec<_>>()
            .join(", ");
        let mut message = format!(
            "multiple files match pattern '{}' ({} matches); matches: {}",
            pattern,
            matches.len(),
            listed
        );
        if matches.len() > 3 {
            message.push_str(", ...");
        }
        return Err(CliError::new(message, Some(hint)));
    }

    Ok(matches.remove(0))
}

fn is_glob_pattern(input: &str) -> bool {
    input.contains('*') || input.contains('?') || input.contains('[')
}
