use thiserror::Error;

#[derive(Debug, Error)]
pub enum PcapSourceError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// Neither a PCAPNG section header nor a legacy PCAP global header.
    #[error("unknown capture format (magic {magic:02x?})")]
    UnknownFormat { magic: [u8; 4] },
    #[error("PCAP parse error ({context}): {message}")]
    Pcap {
        context: &'static str,
        message: String,
    },
}
