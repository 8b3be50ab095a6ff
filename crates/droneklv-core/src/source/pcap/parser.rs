use std::fs::File;
use std::path::Path;

use pcap_parser::{
    Block, LegacyPcapReader, Linktype, PcapBlockOwned, PcapError, PcapNGReader,
    traits::PcapReaderIterator,
};
use tracing::debug;

use crate::source::{PacketEvent, PacketSource, SourceError};

use super::error::PcapSourceError;
use super::layout;
use super::reader::{
    InterfaceInfo, interface_for, is_legacy_magic, is_pcapng_magic, legacy_ts_to_seconds,
    pcapng_ts_to_seconds, read_magic_and_rewind, tsresol_units_per_second,
};

/// Packet source over a legacy PCAP or PCAPNG file, detected by magic.
pub struct PcapFileSource {
    inner: PcapReader,
    next_index: u64,
}

enum PcapReader {
    Legacy {
        reader: LegacyPcapReader<File>,
        linktype: Linktype,
        nanosecond: bool,
    },
    Ng {
        reader: PcapNGReader<File>,
        interfaces: Vec<InterfaceInfo>,
    },
}

/// Error contexts for one capture format.
struct Contexts {
    refill: &'static str,
    next: &'static str,
}

const LEGACY_CONTEXTS: Contexts = Contexts {
    refill: "pcap reader refill",
    next: "pcap reader next",
};

const NG_CONTEXTS: Contexts = Contexts {
    refill: "pcapng reader refill",
    next: "pcapng reader next",
};

/// Decoded block, detached from the reader buffer.
struct Record {
    ts: f64,
    linktype: Linktype,
    data: Vec<u8>,
}

impl PcapFileSource {
    pub fn open(path: &Path) -> Result<Self, SourceError> {
        let file = File::open(path)?;
        let inner = create_reader(file)?;
        Ok(Self {
            inner,
            next_index: 0,
        })
    }
}

impl PacketSource for PcapFileSource {
    fn next_packet(&mut self) -> Result<Option<PacketEvent>, SourceError> {
        let Some(record) = next_record(&mut self.inner)? else {
            return Ok(None);
        };
        let index = self.next_index;
        self.next_index += 1;
        Ok(Some(PacketEvent {
            index,
            ts: Some(record.ts),
            linktype: record.linktype,
            data: record.data,
        }))
    }
}

fn create_reader(mut file: File) -> Result<PcapReader, PcapSourceError> {
    let magic = read_magic_and_rewind(&mut file)?;

    if is_pcapng_magic(&magic) {
        let reader = PcapNGReader::new(layout::PCAP_READER_BUFFER_SIZE, file)
            .map_err(|e| pcap_error("pcapng reader init", e))?;
        Ok(PcapReader::Ng {
            reader,
            interfaces: Vec::new(),
        })
    } else if is_legacy_magic(&magic) {
        let reader = LegacyPcapReader::new(layout::PCAP_READER_BUFFER_SIZE, file)
            .map_err(|e| pcap_error("pcap reader init", e))?;
        Ok(PcapReader::Legacy {
            reader,
            linktype: Linktype::ETHERNET,
            nanosecond: false,
        })
    } else {
        Err(PcapSourceError::UnknownFormat { magic })
    }
}

fn next_record(reader: &mut PcapReader) -> Result<Option<Record>, PcapSourceError> {
    match reader {
        PcapReader::Legacy {
            reader,
            linktype,
            nanosecond,
        } => drive(reader, &LEGACY_CONTEXTS, |block| match block {
            PcapBlockOwned::LegacyHeader(header) => {
                *linktype = header.network;
                *nanosecond = header.is_nanosecond_precision();
                None
            }
            PcapBlockOwned::Legacy(packet) => Some(Record {
                ts: legacy_ts_to_seconds(packet.ts_sec, packet.ts_usec, *nanosecond),
                linktype: *linktype,
                data: packet.data.to_vec(),
            }),
            _ => None,
        }),
        PcapReader::Ng { reader, interfaces } => drive(reader, &NG_CONTEXTS, |block| match block {
            PcapBlockOwned::NG(Block::SectionHeader(_)) => {
                // Interface ids restart with every section.
                interfaces.clear();
                None
            }
            PcapBlockOwned::NG(Block::InterfaceDescription(intf)) => {
                interfaces.push(InterfaceInfo {
                    linktype: intf.linktype,
                    units_per_second: tsresol_units_per_second(intf.if_tsresol),
                    offset_seconds: intf.if_tsoffset,
                });
                None
            }
            PcapBlockOwned::NG(Block::EnhancedPacket(packet)) => {
                let interface = interface_for(interfaces, packet.if_id);
                Some(Record {
                    ts: pcapng_ts_to_seconds(packet.ts_high, packet.ts_low, &interface),
                    linktype: interface.linktype,
                    data: packet.data.to_vec(),
                })
            }
            PcapBlockOwned::NG(Block::SimplePacket(packet)) => Some(Record {
                ts: 0.0,
                linktype: interface_for(interfaces, 0).linktype,
                data: packet.data.to_vec(),
            }),
            _ => None,
        }),
    }
}

/// Pull blocks until `on_block` yields a record, refilling on short reads.
fn drive<R, F>(
    reader: &mut R,
    contexts: &Contexts,
    mut on_block: F,
) -> Result<Option<Record>, PcapSourceError>
where
    R: PcapReaderIterator,
    F: FnMut(PcapBlockOwned<'_>) -> Option<Record>,
{
    loop {
        match reader.next() {
            Ok((offset, block)) => {
                let record = on_block(block);
                reader.consume(offset);
                if record.is_some() {
                    return Ok(record);
                }
            }
            Err(PcapError::Eof) => return Ok(None),
            Err(PcapError::Incomplete(_)) => {
                reader
                    .refill()
                    .map_err(|e| pcap_error(contexts.refill, e))?;
            }
            Err(e) => {
                debug!(context = contexts.next, error = %e, "capture parse failed");
                return Err(pcap_error(contexts.next, e));
            }
        }
    }
}

fn pcap_error<E: std::fmt::Display>(context: &'static str, err: E) -> PcapSourceError {
    PcapSourceError::Pcap {
        context,
        message: err.to_string(),
    }
}
