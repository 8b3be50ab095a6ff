use std::fmt::Write as _;

use time::format_description::well_known::Rfc3339;

use crate::protocols::klv::{DecodedField, FieldValue, Frame};
use crate::{FieldRecord, FieldValueSummary, PacketRecord};

/// Where a frame came from inside the capture.
#[derive(Debug, Clone, Default)]
pub(crate) struct FrameContext {
    pub capture_index: Option<u64>,
    pub ts: Option<String>,
    pub src: Option<String>,
    pub dst: Option<String>,
    pub pid: Option<u16>,
}

pub(crate) fn packet_record(frame: &Frame, context: &FrameContext) -> PacketRecord {
    PacketRecord {
        capture_index: context.capture_index,
        ts: context.ts.clone(),
        src: context.src.clone(),
        dst: context.dst.clone(),
        pid: context.pid,
        offset: frame.offset,
        size: frame.size,
        fields: frame.packet.values().map(field_record).collect(),
    }
}

fn field_record(field: &DecodedField) -> FieldRecord {
    FieldRecord {
        tag: field.tag,
        name: field.description.to_string(),
        len: field.len,
        value: value_summary(&field.value),
    }
}

pub(crate) fn value_summary(value: &FieldValue) -> FieldValueSummary {
    match value {
        FieldValue::Float(value) => FieldValueSummary::Float(*value),
        FieldValue::Integer(value) => FieldValueSummary::Integer(*value),
        FieldValue::Text(text) => FieldValueSummary::Text(text.clone()),
        FieldValue::Timestamp(dt) => FieldValueSummary::Timestamp(
            dt.format(&Rfc3339)
                .unwrap_or_else(|_| dt.unix_timestamp().to_string()),
        ),
        FieldValue::Bytes(bytes) => FieldValueSummary::Bytes(to_hex(bytes)),
        FieldValue::Unknown(bytes) => FieldValueSummary::Unknown(to_hex(bytes)),
    }
}

pub(crate) fn to_hex(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 2);
    for byte in bytes {
        let _ = write!(out, "{byte:02x}");
    }
    out
}
