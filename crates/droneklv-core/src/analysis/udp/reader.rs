use super::error::UdpError;
use super::layout;

pub struct UdpReader<'a> {
    datagram: &'a [u8],
}

impl<'a> UdpReader<'a> {
    pub fn new(datagram: &'a [u8]) -> Self {
        Self { datagram }
    }

    pub fn require_len(&self, needed: usize) -> Result<(), UdpError> {
        if self.datagram.len() < needed {
            return Err(UdpError::TooShort {
                needed,
                actual: self.datagram.len(),
            });
        }
        Ok(())
    }

    pub fn read_length(&self) -> Result<u16, UdpError> {
        self.require_len(layout::UDP_HEADER_LEN)?;
        let bytes = &self.datagram[layout::UDP_LENGTH_RANGE];
        Ok(u16::from_be_bytes([bytes[0], bytes[1]]))
    }

    /// Payload bounded by the UDP length field, which drops link-layer
    /// padding after the datagram.
    pub fn payload_without_header(&self) -> Result<&'a [u8], UdpError> {
        let length = self.read_length()?;
        let end = usize::from(length);
        if end < layout::UDP_HEADER_LEN {
            return Err(UdpError::InvalidLength { length });
        }
        self.datagram
            .get(layout::UDP_HEADER_LEN..end)
            .ok_or(UdpError::TooShort {
                needed: end,
                actual: self.datagram.len(),
            })
    }
}
