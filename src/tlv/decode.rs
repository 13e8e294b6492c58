//! Byte-level reading of tags and lengths

use std::ops::Range;

use super::TlvError;

/// Widest long-form length accepted
const MAX_LENGTH_OCTETS: usize = 4;

pub(crate) struct Cursor<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    pub(crate) fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.pos >= self.data.len()
    }

    pub(crate) fn position(&self) -> usize {
        self.pos
    }

    pub(crate) fn next_byte(&mut self, part: &'static str) -> Result<u8, TlvError> {
        let byte = self.data.get(self.pos).copied().ok_or(TlvError::Truncated {
            offset: self.pos,
            part,
        })?;
        self.pos += 1;
        Ok(byte)
    }

    /// Claim the next `len` bytes, returning their range in the buffer
    pub(crate) fn take(&mut self, len: usize, part: &'static str) -> Result<Range<usize>, TlvError> {
        let end = self
            .pos
            .checked_add(len)
            .filter(|end| *end <= self.data.len())
            .ok_or(TlvError::Truncated {
                offset: self.pos,
                part,
            })?;
        let range = self.pos..end;
        self.pos = end;
        Ok(range)
    }
}

/// Read a tag id.
///
/// A first byte with all five low bits set continues into following bytes
/// while their high bit is set; each shifts the id left one byte and adds its
/// low seven bits, so two-byte EMV tags keep their usual hex form (`9F38`).
pub(crate) fn read_tag(cursor: &mut Cursor<'_>) -> Result<u32, TlvError> {
    let offset = cursor.position();
    let first = cursor.next_byte("tag")?;
    let mut tag = u32::from(first);

    if first & 0x1F == 0x1F {
        loop {
            let byte = cursor.next_byte("tag")?;
            if byte & 0x7F == 0 || tag > 0x00FF_FFFF {
                return Err(TlvError::MalformedTag { offset });
            }
            tag = (tag << 8) | u32::from(byte & 0x7F);
            if byte & 0x80 == 0 {
                break;
            }
        }
    }

    Ok(tag)
}

/// Read a definite length in short or long form
pub(crate) fn read_length(cursor: &mut Cursor<'_>) -> Result<usize, TlvError> {
    let offset = cursor.position();
    let first = cursor.next_byte("length")?;
    if first & 0x80 == 0 {
        return Ok(usize::from(first));
    }

    let octets = usize::from(first & 0x7F);
    if octets == 0 {
        return Err(TlvError::Unsupported {
            offset,
            reason: "indefinite length",
        });
    }
    if octets > MAX_LENGTH_OCTETS {
        return Err(TlvError::Unsupported {
            offset,
            reason: "length field wider than four bytes",
        });
    }

    let mut length = 0usize;
    for _ in 0..octets {
        length = (length << 8) | usize::from(cursor.next_byte("length")?);
    }
    Ok(length)
}
