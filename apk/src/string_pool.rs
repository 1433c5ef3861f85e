use crate::cursor::ByteCursor;
use crate::error::{DecodeError, Result};
use crate::res::ResChunkHeader;

/// A style span: the characters `first_char..=last_char` of a string carry the
/// tag named by the pool string `name`.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct ResSpan {
    pub name: u32,
    pub first_char: u32,
    pub last_char: u32,
}

impl ResSpan {
    const END: u32 = 0xffff_ffff;

    fn read(r: &mut ByteCursor) -> Result<Option<Self>> {
        let name = r.read_u32()?;
        if name == Self::END {
            return Ok(None);
        }
        let first_char = r.read_u32()?;
        let last_char = r.read_u32()?;
        Ok(Some(Self {
            name,
            first_char,
            last_char,
        }))
    }
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct ResStringPoolHeader {
    pub string_count: u32,
    pub style_count: u32,
    pub flags: u32,
    pub strings_start: u32,
    pub styles_start: u32,
}

impl ResStringPoolHeader {
    pub const SIZE: usize = 28;
    pub const SORTED_FLAG: u32 = 1 << 0;
    pub const UTF8_FLAG: u32 = 1 << 8;

    pub fn read(r: &mut ByteCursor) -> Result<Self> {
        Ok(Self {
            string_count: r.read_u32()?,
            style_count: r.read_u32()?,
            flags: r.read_u32()?,
            strings_start: r.read_u32()?,
            styles_start: r.read_u32()?,
        })
    }

    pub fn is_utf8(&self) -> bool {
        self.flags & Self::UTF8_FLAG > 0
    }

    pub fn is_sorted(&self) -> bool {
        self.flags & Self::SORTED_FLAG > 0
    }
}

/// Decoded `STRING_POOL` chunk.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct StringPool {
    strings: Vec<String>,
    styles: Vec<Vec<ResSpan>>,
    utf8: bool,
    sorted: bool,
}

impl StringPool {
    /// Decodes the pool whose header was just read.
    ///
    /// Only the framing (offset tables) can fail the pool. A string that can't be
    /// decoded becomes an empty string and a style that can't be decoded has no
    /// spans.
    pub fn read(r: &mut ByteCursor, header: &ResChunkHeader) -> Result<Self> {
        header.expect_header_size(ResStringPoolHeader::SIZE)?;
        r.seek(header.offset + ResChunkHeader::SIZE)?;
        let pool = ResStringPoolHeader::read(r)?;
        let known = ResStringPoolHeader::SORTED_FLAG | ResStringPoolHeader::UTF8_FLAG;
        if pool.flags & !known != 0 {
            let err = DecodeError::UnsupportedEncoding(pool.flags);
            let encoding = if pool.is_utf8() { "utf-8" } else { "utf-16" };
            tracing::warn!("{err}, decoding as {encoding}");
        }

        let end = header.end();
        let offsets_start = header.body();
        let offsets_len = (pool.string_count as u64 + pool.style_count as u64) * 4;
        if offsets_start as u64 + offsets_len > end as u64 {
            return Err(DecodeError::malformed(
                header.offset,
                format!(
                    "{} string and {} style offsets don't fit in a {} byte pool",
                    pool.string_count, pool.style_count, header.size
                ),
            ));
        }
        let strings_start = header.offset + pool.strings_start as usize;
        let styles_start = header.offset + pool.styles_start as usize;
        if pool.string_count > 0 && strings_start > end {
            return Err(DecodeError::malformed(header.offset, "string data starts past the pool"));
        }
        if pool.style_count > 0 && styles_start > end {
            return Err(DecodeError::malformed(header.offset, "style data starts past the pool"));
        }

        r.seek(offsets_start)?;
        let mut string_offsets = Vec::with_capacity(pool.string_count as usize);
        for _ in 0..pool.string_count {
            string_offsets.push(r.read_u32()? as usize);
        }
        let mut style_offsets = Vec::with_capacity(pool.style_count as usize);
        for _ in 0..pool.style_count {
            style_offsets.push(r.read_u32()? as usize);
        }

        // strings may not run into the style data
        let strings_end = if pool.style_count > 0 && styles_start > strings_start {
            styles_start
        } else {
            end
        };
        let data = ByteCursor::new(r.slice(0, strings_end)?);
        let strings = string_offsets
            .into_iter()
            .enumerate()
            .map(|(i, offset)| {
                let mut data = data.clone();
                let string = data
                    .seek(strings_start.saturating_add(offset))
                    .and_then(|_| {
                        if pool.is_utf8() {
                            read_utf8_entry(&mut data)
                        } else {
                            read_utf16_entry(&mut data)
                        }
                    });
                string.unwrap_or_else(|err| {
                    tracing::warn!(
                        "string {i} of pool at {} is unreadable: {err}",
                        header.offset
                    );
                    String::new()
                })
            })
            .collect();

        let data = ByteCursor::new(r.slice(0, end)?);
        let styles = style_offsets
            .into_iter()
            .enumerate()
            .map(|(i, offset)| {
                let mut data = data.clone();
                let mut spans = vec![];
                let res = data
                    .seek(styles_start.saturating_add(offset))
                    .and_then(|_| {
                        while let Some(span) = ResSpan::read(&mut data)? {
                            spans.push(span);
                        }
                        Ok(())
                    });
                if let Err(err) = res {
                    tracing::warn!(
                        "style {i} of pool at {} is unreadable: {err}",
                        header.offset
                    );
                    spans.clear();
                }
                spans
            })
            .collect();

        r.seek(end)?;
        Ok(Self {
            strings,
            styles,
            utf8: pool.is_utf8(),
            sorted: pool.is_sorted(),
        })
    }

    /// Reads the chunk at the cursor position, which must be a string pool ending
    /// before `limit`.
    pub fn read_chunk(r: &mut ByteCursor, limit: usize) -> Result<Self> {
        let header = ResChunkHeader::read(r, limit)?;
        if header.chunk_type() != Some(crate::res::ChunkType::StringPool) {
            return Err(DecodeError::malformed(
                header.offset,
                format!(
                    "expected a string pool, found chunk type 0x{:04x}",
                    header.ty
                ),
            ));
        }
        Self::read(r, &header)
    }

    /// Looks up a string. Indices past the end, including the `0xffffffff`
    /// "no string" marker, are absent.
    pub fn get(&self, index: u32) -> Option<&str> {
        self.strings.get(index as usize).map(String::as_str)
    }

    pub fn styles(&self, index: u32) -> &[ResSpan] {
        self.styles
            .get(index as usize)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.strings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.strings.is_empty()
    }

    pub fn is_utf8(&self) -> bool {
        self.utf8
    }

    pub fn is_sorted(&self) -> bool {
        self.sorted
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.strings.iter().map(String::as_str)
    }
}

/// Lengths of 0x80 and above take two bytes, the high bit of the first marking
/// the extension.
fn read_utf8_length(r: &mut ByteCursor) -> Result<usize> {
    let first = r.read_u8()? as usize;
    if first & 0x80 != 0 {
        Ok(((first & 0x7f) << 8) | r.read_u8()? as usize)
    } else {
        Ok(first)
    }
}

fn read_utf16_length(r: &mut ByteCursor) -> Result<usize> {
    let first = r.read_u16()? as usize;
    if first & 0x8000 != 0 {
        Ok(((first & 0x7fff) << 16) | r.read_u16()? as usize)
    } else {
        Ok(first)
    }
}

fn read_utf8_entry(r: &mut ByteCursor) -> Result<String> {
    let _chars = read_utf8_length(r)?;
    let len = read_utf8_length(r)?;
    let offset = r.position();
    let bytes = r.read_bytes(len)?;
    match std::str::from_utf8(bytes) {
        Ok(s) => Ok(s.to_string()),
        // aapt encodes supplementary characters as surrogate pairs
        Err(_) => cesu8::from_cesu8(bytes)
            .map(|s| s.into_owned())
            .map_err(|_| DecodeError::InvalidString { offset }),
    }
}

fn read_utf16_entry(r: &mut ByteCursor) -> Result<String> {
    let len = read_utf16_length(r)?;
    r.read_utf16_string(len)
}
