use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TsError {
    #[error("datagram length {len} is not a multiple of 188")]
    Misaligned { len: usize },
    #[error("invalid sync byte {found:#04x}")]
    InvalidSync { found: u8 },
    #[error("continuity gap on PID {pid:#06x}")]
    ContinuityGap { pid: u16 },
    #[error("unparsable PES header on PID {pid:#06x}")]
    InvalidPesHeader { pid: u16 },
}

impl TsError {
    /// Stable short label used to aggregate errors in reports.
    pub fn kind(&self) -> &'static str {
        match self {
            TsError::Misaligned { .. } => "ts_misaligned",
            TsError::InvalidSync { .. } => "ts_invalid_sync",
            TsError::ContinuityGap { .. } => "ts_continuity_gap",
            TsError::InvalidPesHeader { .. } => "pes_invalid_header",
        }
    }
}
