//! Tag registry for the UAS Datalink Local Set.
//!
//! `FIELDS` is the single declarative table; `lookup` resolves a tag through a
//! 256-slot index built on first use. Nothing here is mutated after that.

use std::sync::LazyLock;

use super::decoders::{Decoder, IntKind, LinearScale, PayloadSize};
use super::error::KlvError;

/// Description used for tags absent from the registry.
pub const UNKNOWN_DESCRIPTION: &str = "unknown";

const TEXT_MAX_LEN: usize = 127;

/// Static metadata describing one tag.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FieldMetadata {
    pub tag: u8,
    pub description: &'static str,
    pub decoder: Decoder,
    pub size: PayloadSize,
    /// Conversion documented for this tag, used as conformance data.
    pub example: Option<Example>,
}

/// Hex payload and the value it must decode to.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Example {
    pub input_hex: &'static str,
    pub expected: Expected,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Expected {
    Float(f64),
    /// UTC calendar time down to the microsecond.
    Timestamp {
        year: i32,
        month: u8,
        day: u8,
        hour: u8,
        minute: u8,
        second: u8,
        micro: u32,
    },
}

impl FieldMetadata {
    /// Apply the size rule, then the decoder.
    pub fn decode(&self, payload: &[u8]) -> Result<super::decoders::FieldValue, KlvError> {
        self.size.check(payload.len())?;
        self.decoder.decode(payload)
    }

    pub fn linear(&self) -> Option<&LinearScale> {
        match &self.decoder {
            Decoder::Linear(scale) => Some(scale),
            _ => None,
        }
    }

    pub fn resolution(&self) -> Option<f64> {
        self.linear().map(|scale| scale.resolution)
    }
}

pub const HEADING: LinearScale = LinearScale {
    input: IntKind::U16,
    output_span: 360.0,
    input_span: 65_535.0,
    offset: 0.0,
    min_output: 0.0,
    max_output: 360.0,
    resolution: 5.5e-3,
};

pub const PITCH: LinearScale = LinearScale {
    input: IntKind::I16,
    output_span: 40.0,
    input_span: 65_534.0,
    offset: 0.0,
    min_output: -20.0,
    max_output: 20.0,
    resolution: 610e-6,
};

pub const ROLL: LinearScale = LinearScale {
    input: IntKind::I16,
    output_span: 100.0,
    input_span: 65_534.0,
    offset: 0.0,
    min_output: -50.0,
    max_output: 50.0,
    resolution: 1525e-6,
};

pub const LATITUDE: LinearScale = LinearScale {
    input: IntKind::I32,
    output_span: 180.0,
    input_span: 4_294_967_294.0,
    offset: 0.0,
    min_output: -90.0,
    max_output: 90.0,
    resolution: 42e-9,
};

pub const LONGITUDE: LinearScale = LinearScale {
    input: IntKind::I32,
    output_span: 360.0,
    input_span: 4_294_967_294.0,
    offset: 0.0,
    min_output: -180.0,
    max_output: 180.0,
    resolution: 84e-9,
};

pub const ALTITUDE: LinearScale = LinearScale {
    input: IntKind::U16,
    output_span: 19_900.0,
    input_span: 65_535.0,
    offset: -900.0,
    min_output: -900.0,
    max_output: 19_000.0,
    resolution: 0.3,
};

pub const FIELD_OF_VIEW: LinearScale = LinearScale {
    input: IntKind::U16,
    output_span: 180.0,
    input_span: 65_535.0,
    offset: 0.0,
    min_output: 0.0,
    max_output: 180.0,
    resolution: 2.7e-3,
};

pub const RELATIVE_ANGLE: LinearScale = LinearScale {
    input: IntKind::U32,
    output_span: 360.0,
    input_span: 4_294_967_295.0,
    offset: 0.0,
    min_output: 0.0,
    max_output: 360.0,
    resolution: 84e-9,
};

pub const RELATIVE_ELEVATION: LinearScale = LinearScale {
    input: IntKind::I32,
    output_span: 360.0,
    input_span: 4_294_967_294.0,
    offset: 0.0,
    min_output: -180.0,
    max_output: 180.0,
    resolution: 84e-9,
};

pub const SLANT_RANGE: LinearScale = LinearScale {
    input: IntKind::U32,
    output_span: 5_000_000.0,
    input_span: 4_294_967_295.0,
    offset: 0.0,
    min_output: 0.0,
    max_output: 5_000_000.0,
    resolution: 1.2e-3,
};

pub const TARGET_WIDTH: LinearScale = LinearScale {
    input: IntKind::U16,
    output_span: 10_000.0,
    input_span: 65_535.0,
    offset: 0.0,
    min_output: 0.0,
    max_output: 10_000.0,
    resolution: 0.16,
};

pub const CORNER_OFFSET: LinearScale = LinearScale {
    input: IntKind::I16,
    output_span: 0.15,
    input_span: 65_534.0,
    offset: 0.0,
    min_output: -0.075,
    max_output: 0.075,
    resolution: 1.2e-6,
};

const fn linear(
    tag: u8,
    description: &'static str,
    scale: LinearScale,
    example: Option<Example>,
) -> FieldMetadata {
    FieldMetadata {
        tag,
        description,
        decoder: Decoder::Linear(scale),
        size: PayloadSize::Exact(scale.input.width()),
        example,
    }
}

const fn text(tag: u8, description: &'static str) -> FieldMetadata {
    FieldMetadata {
        tag,
        description,
        decoder: Decoder::Text,
        size: PayloadSize::Between {
            min: 0,
            max: TEXT_MAX_LEN,
        },
        example: None,
    }
}

const fn unsigned(tag: u8, description: &'static str, kind: IntKind) -> FieldMetadata {
    FieldMetadata {
        tag,
        description,
        decoder: Decoder::Unsigned(kind),
        size: PayloadSize::Exact(kind.width()),
        example: None,
    }
}

/// Pass-through bytes under the same length cap as text fields.
const fn identifier(tag: u8, description: &'static str) -> FieldMetadata {
    FieldMetadata {
        tag,
        description,
        decoder: Decoder::Passthrough,
        size: PayloadSize::Between {
            min: 0,
            max: TEXT_MAX_LEN,
        },
        example: None,
    }
}

const fn raw(tag: u8, description: &'static str) -> FieldMetadata {
    FieldMetadata {
        tag,
        description,
        decoder: Decoder::Passthrough,
        size: PayloadSize::Any,
        example: None,
    }
}

const fn float(input_hex: &'static str, value: f64) -> Option<Example> {
    Some(Example {
        input_hex,
        expected: Expected::Float(value),
    })
}

pub static FIELDS: &[FieldMetadata] = &[
    unsigned(1, "Checksum", IntKind::U16),
    FieldMetadata {
        tag: 2,
        description: "UNIX Time Stamp",
        decoder: Decoder::Timestamp,
        size: PayloadSize::Exact(8),
        example: Some(Example {
            input_hex: "000456F4A6AA4AA8",
            expected: Expected::Timestamp {
                year: 2008,
                month: 9,
                day: 15,
                hour: 19,
                minute: 57,
                second: 55,
                micro: 29_672,
            },
        }),
    },
    identifier(3, "Mission ID"),
    identifier(4, "Platform Tail Number"),
    linear(5, "Platform Heading Angle", HEADING, float("71C2", 159.9744)),
    linear(6, "Platform Pitch Angle", PITCH, float("FD3D", -0.4315251)),
    linear(7, "Platform Roll Angle", ROLL, float("08B8", 3.405814)),
    text(10, "Platform Designation"),
    text(11, "Image Source Sensor"),
    text(12, "Image Coordinate System"),
    linear(13, "Sensor Latitude", LATITUDE, float("5595B66D", 60.1768229669783)),
    linear(14, "Sensor Longitude", LONGITUDE, float("5B5360C4", 128.426759042045)),
    linear(15, "Sensor True Altitude", ALTITUDE, float("C221", 14190.72)),
    linear(16, "Sensor Horizontal Field of View", FIELD_OF_VIEW, float("CD9C", 144.5713)),
    linear(17, "Sensor Vertical Field of View", FIELD_OF_VIEW, float("D917", 152.6436)),
    linear(18, "Sensor Relative Azimuth Angle", RELATIVE_ANGLE, float("724A0A20", 160.719211474396)),
    linear(19, "Sensor Relative Elevation Angle", RELATIVE_ELEVATION, float("87F84B86", -168.792324833941)),
    linear(20, "Sensor Relative Roll Angle", RELATIVE_ANGLE, float("7DC55ECE", 176.865437690572)),
    linear(21, "Slant Range", SLANT_RANGE, float("03830926", 68590.983)),
    linear(22, "Target Width", TARGET_WIDTH, None),
    linear(23, "Frame Center Latitude", LATITUDE, float("F101A229", -10.5423886331461)),
    linear(24, "Frame Center Longitude", LONGITUDE, float("14BC082B", 29.157890122923)),
    linear(25, "Frame Center Elevation", ALTITUDE, float("34F3", 3216.037)),
    linear(26, "Offset Corner Latitude Point 1", CORNER_OFFSET, None),
    linear(27, "Offset Corner Longitude Point 1", CORNER_OFFSET, None),
    linear(28, "Offset Corner Latitude Point 2", CORNER_OFFSET, None),
    linear(29, "Offset Corner Longitude Point 2", CORNER_OFFSET, None),
    linear(30, "Offset Corner Latitude Point 3", CORNER_OFFSET, None),
    linear(31, "Offset Corner Longitude Point 3", CORNER_OFFSET, None),
    linear(32, "Offset Corner Latitude Point 4", CORNER_OFFSET, None),
    linear(33, "Offset Corner Longitude Point 4", CORNER_OFFSET, None),
    linear(40, "Target Location Latitude", LATITUDE, None),
    linear(41, "Target Location Longitude", LONGITUDE, None),
    linear(42, "Target Location Elevation", ALTITUDE, None),
    raw(43, "Target Track Gate Width"),
    raw(44, "Target Track Gate Height"),
    raw(48, "Security Local Metadata Set"),
    unsigned(65, "UAS LDS Version", IntKind::U8),
    raw(74, "VMTI Data Set"),
    raw(94, "MIIS Core Identifier"),
];

static INDEX: LazyLock<[Option<&'static FieldMetadata>; 256]> = LazyLock::new(|| {
    let mut index = [None; 256];
    for field in FIELDS {
        index[usize::from(field.tag)] = Some(field);
    }
    index
});

/// Metadata for `tag`, if registered.
///
/// # Examples
/// ```
/// use droneklv_core::protocols::klv::registry;
///
/// assert_eq!(registry::lookup(14).unwrap().description, "Sensor Longitude");
/// assert!(registry::lookup(200).is_none());
/// ```
pub fn lookup(tag: u8) -> Option<&'static FieldMetadata> {
    INDEX[usize::from(tag)]
}

/// Parse a worked-example hex string (whitespace ignored).
pub fn hex_to_bytes(hex: &str) -> Option<Vec<u8>> {
    let digits: Vec<u8> = hex
        .bytes()
        .filter(|byte| !byte.is_ascii_whitespace())
        .collect();
    if digits.len() % 2 != 0 {
        return None;
    }
    digits
        .chunks(2)
        .map(|pair| {
            let pair = std::str::from_utf8(pair).ok()?;
            u8::from_str_radix(pair, 16).ok()
        })
        .collect()
}
