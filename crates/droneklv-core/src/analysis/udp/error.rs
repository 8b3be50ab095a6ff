use thiserror::Error;

/// Errors returned while extracting a UDP payload from a link-layer frame.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UdpError {
    #[error("packet slice error: {0}")]
    Slice(String),
    #[error("missing network layer in packet")]
    MissingNetworkLayer,
    #[error("missing IP payload in packet")]
    MissingIpPayload,
    #[error("payload too short: need {needed} bytes, got {actual}")]
    TooShort { needed: usize, actual: usize },
    #[error("invalid UDP length field {length}")]
    InvalidLength { length: u16 },
}

impl UdpError {
    /// Stable short label used to aggregate errors in reports.
    pub fn kind(&self) -> &'static str {
        match self {
            UdpError::Slice(_) => "udp_slice",
            UdpError::MissingNetworkLayer => "udp_missing_network_layer",
            UdpError::MissingIpPayload => "udp_missing_ip_payload",
            UdpError::TooShort { .. } => "udp_too_short",
            UdpError::InvalidLength { .. } => "udp_invalid_length",
        }
    }
}
