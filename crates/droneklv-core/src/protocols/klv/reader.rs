use super::error::KlvError;
use super::layout;

pub struct KlvReader<'a> {
    buffer: &'a [u8],
}

impl<'a> KlvReader<'a> {
    pub fn new(buffer: &'a [u8]) -> Self {
        Self { buffer }
    }

    pub fn remaining_from(&self, offset: usize) -> usize {
        self.buffer.len().saturating_sub(offset)
    }

    pub fn require_remaining(&self, offset: usize, needed: usize) -> Result<(), KlvError> {
        let actual = self.remaining_from(offset);
        if actual < needed {
            return Err(KlvError::BufferTooSmall { needed, actual });
        }
        Ok(())
    }

    pub fn read_u8(&self, offset: usize) -> Result<u8, KlvError> {
        self.buffer
            .get(offset)
            .copied()
            .ok_or(KlvError::TruncatedInput {
                needed: offset.saturating_add(1),
                actual: self.buffer.len(),
            })
    }

    pub fn read_slice(&self, range: std::ops::Range<usize>) -> Result<&'a [u8], KlvError> {
        self.buffer
            .get(range.clone())
            .ok_or(KlvError::TruncatedInput {
                needed: range.end,
                actual: self.buffer.len(),
            })
    }

    /// Index of the first universal key at or after `from`.
    pub fn find_universal_key(&self, from: usize) -> Option<usize> {
        let haystack = self.buffer.get(from..)?;
        haystack
            .windows(layout::UNIVERSAL_KEY_LEN)
            .position(|window| window == layout::UNIVERSAL_KEY)
            .map(|pos| from + pos)
    }
}
