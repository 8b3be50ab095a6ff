use std::collections::BTreeMap;
use std::net::SocketAddr;

use crate::StreamSummary;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub(crate) struct StreamKey {
    pub src: SocketAddr,
    pub dst: SocketAddr,
    pub pid: Option<u16>,
}

#[derive(Debug, Default, Clone)]
pub(crate) struct StreamStats {
    pub units: u64,
    pub klv_packets: u64,
    pub decode_errors: u64,
    first_ts: Option<f64>,
    last_ts: Option<f64>,
}

impl StreamStats {
    pub fn record_packet(&mut self, ts: Option<f64>) {
        self.klv_packets += 1;
        super::update_ts_bounds(&mut self.first_ts, &mut self.last_ts, ts);
    }

    fn active_seconds(&self) -> Option<f64> {
        match (self.first_ts, self.last_ts) {
            (Some(start), Some(end)) if end > start => Some(end - start),
            _ => None,
        }
    }
}

pub(crate) fn build_stream_summaries(stats: BTreeMap<StreamKey, StreamStats>) -> Vec<StreamSummary> {
    stats
        .into_iter()
        .map(|(key, stats)| StreamSummary {
            src: key.src.to_string(),
            dst: key.dst.to_string(),
            pid: key.pid,
            units: stats.units,
            klv_packets: stats.klv_packets,
            decode_errors: stats.decode_errors,
            klv_rate_hz: stats
                .active_seconds()
                .map(|seconds| stats.klv_packets.saturating_sub(1) as f64 / seconds),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::{StreamKey, StreamStats, build_stream_summaries};
    use std::collections::BTreeMap;

    fn key(src: &str, pid: Option<u16>) -> StreamKey {
        StreamKey {
            src: src.parse().unwrap(),
            dst: "239.1.1.1:20000".parse().unwrap(),
            pid,
        }
    }

    #[test]
    fn summaries_are_sorted() {
        let mut stats = BTreeMap::new();
        stats.insert(key("10.0.0.2:5000", Some(0x101)), StreamStats::default());
        stats.insert(key("10.0.0.1:5000", Some(0x102)), StreamStats::default());
        stats.insert(key("10.0.0.1:5000", Some(0x101)), StreamStats::default());

        let summaries = build_stream_summaries(stats);
        let order: Vec<(String, Option<u16>)> = summaries
            .iter()
            .map(|summary| (summary.src.clone(), summary.pid))
            .collect();
        assert_eq!(
            order,
            vec![
                ("10.0.0.1:5000".to_string(), Some(0x101)),
                ("10.0.0.1:5000".to_string(), Some(0x102)),
                ("10.0.0.2:5000".to_string(), Some(0x101)),
            ]
        );
        assert!(summaries.iter().all(|summary| summary.klv_rate_hz.is_none()));
    }

    #[test]
    fn rate_uses_active_interval() {
        let mut stream = StreamStats::default();
        for ts in [10.0, 10.5, 11.0] {
            stream.record_packet(Some(ts));
        }
        let mut stats = BTreeMap::new();
        stats.insert(key("10.0.0.1:5000", None), stream);

        let summaries = build_stream_summaries(stats);
        assert_eq!(summaries[0].klv_packets, 3);
        assert_eq!(summaries[0].klv_rate_hz, Some(2.0));
    }

    #[test]
    fn single_packet_has_no_rate() {
        let mut stream = StreamStats::default();
        stream.record_packet(Some(3.0));
        assert!(stream.active_seconds().is_none());
    }
}
