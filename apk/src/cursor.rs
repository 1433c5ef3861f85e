use crate::error::{DecodeError, Result};
use byteorder::{ByteOrder, LittleEndian};

/// Bounds checked little-endian reader over a borrowed buffer.
///
/// Every read either returns the requested data and advances the position, or
/// fails with [`DecodeError::TruncatedData`] and leaves the position unchanged.
#[derive(Clone, Debug)]
pub struct ByteCursor<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> ByteCursor<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    /// Moves to an absolute offset. Seeking to the end of the buffer is allowed.
    pub fn seek(&mut self, offset: usize) -> Result<()> {
        if offset > self.buf.len() {
            return Err(DecodeError::TruncatedData {
                offset,
                needed: 0,
                available: 0,
            });
        }
        self.pos = offset;
        Ok(())
    }

    pub fn skip(&mut self, n: usize) -> Result<()> {
        self.take(n).map(|_| ())
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        let end = self
            .pos
            .checked_add(n)
            .filter(|end| *end <= self.buf.len())
            .ok_or(DecodeError::TruncatedData {
                offset: self.pos,
                needed: n,
                available: self.remaining(),
            })?;
        let bytes = &self.buf[self.pos..end];
        self.pos = end;
        Ok(bytes)
    }

    pub fn read_u8(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    pub fn read_u16(&mut self) -> Result<u16> {
        self.take(2).map(LittleEndian::read_u16)
    }

    pub fn read_u32(&mut self) -> Result<u32> {
        self.take(4).map(LittleEndian::read_u32)
    }

    pub fn read_i32(&mut self) -> Result<i32> {
        self.take(4).map(LittleEndian::read_i32)
    }

    pub fn read_u64(&mut self) -> Result<u64> {
        self.take(8).map(LittleEndian::read_u64)
    }

    pub fn read_bytes(&mut self, n: usize) -> Result<&'a [u8]> {
        self.take(n)
    }

    /// Borrows `start..end` without moving the cursor.
    pub fn slice(&self, start: usize, end: usize) -> Result<&'a [u8]> {
        if start > end || end > self.buf.len() {
            return Err(DecodeError::TruncatedData {
                offset: start,
                needed: end.saturating_sub(start),
                available: self.buf.len().saturating_sub(start),
            });
        }
        Ok(&self.buf[start..end])
    }

    pub fn read_utf8_string(&mut self, byte_count: usize) -> Result<String> {
        let offset = self.pos;
        let bytes = self.take(byte_count)?;
        String::from_utf8(bytes.to_vec()).map_err(|_| DecodeError::InvalidString { offset })
    }

    pub fn read_utf16_string(&mut self, char_count: usize) -> Result<String> {
        let offset = self.pos;
        let too_long = DecodeError::TruncatedData {
            offset,
            needed: usize::MAX,
            available: self.remaining(),
        };
        let bytes = self.take(char_count.checked_mul(2).ok_or(too_long)?)?;
        let units: Vec<u16> = bytes.chunks_exact(2).map(LittleEndian::read_u16).collect();
        String::from_utf16(&units).map_err(|_| DecodeError::InvalidString { offset })
    }
}
