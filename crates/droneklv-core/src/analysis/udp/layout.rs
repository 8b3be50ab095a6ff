pub const UDP_HEADER_LEN: usize = 8;
pub const UDP_LENGTH_RANGE: std::ops::Range<usize> = 4..6;
