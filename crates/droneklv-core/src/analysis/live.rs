use std::net::SocketAddr;

use super::{AnalysisOptions, Analyzer, Position};
use crate::PacketRecord;

/// Decodes UDP payloads handed over one at a time, e.g. from a live socket.
///
/// Each datagram goes through the same path as a capture: per-flow TS demux,
/// or the raw-key path when it is not a transport stream. Decode failures are
/// logged at `warn` and skipped.
pub struct LiveDecoder {
    analyzer: Analyzer,
    received: u64,
}

impl LiveDecoder {
    pub fn new(pid: Option<u16>) -> Self {
        let mut analyzer = Analyzer::new(AnalysisOptions {
            pid,
            ..AnalysisOptions::default()
        });
        analyzer.echo_errors = true;
        Self {
            analyzer,
            received: 0,
        }
    }

    /// Decode one datagram and return the packets it completed.
    ///
    /// `ts` is the receive time in seconds since the Unix epoch.
    pub fn push(
        &mut self,
        src: SocketAddr,
        dst: SocketAddr,
        payload: &[u8],
        ts: Option<f64>,
    ) -> Vec<PacketRecord> {
        let position = Position {
            index: self.received,
            ts,
        };
        self.received += 1;
        self.analyzer.handle_datagram((src, dst), payload, position);
        std::mem::take(&mut self.analyzer.packets)
    }

    /// Decode units still buffered in the demultiplexers.
    pub fn finish(&mut self) -> Vec<PacketRecord> {
        self.analyzer.finish();
        std::mem::take(&mut self.analyzer.packets)
    }

    /// Datagrams seen so far.
    pub fn received(&self) -> u64 {
        self.received
    }
}
