use crate::cursor::ByteCursor;
use crate::error::{DecodeError, Result};
use crate::locale::Locale;
use crate::string_pool::StringPool;
use std::fmt;
use std::num::NonZeroU8;

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
#[repr(u16)]
pub enum ChunkType {
    Null = 0x0000,
    StringPool = 0x0001,
    Table = 0x0002,
    Xml = 0x0003,
    XmlStartNamespace = 0x0100,
    XmlEndNamespace = 0x0101,
    XmlStartElement = 0x0102,
    XmlEndElement = 0x0103,
    XmlCdata = 0x0104,
    XmlResourceMap = 0x0180,
    TablePackage = 0x0200,
    TableType = 0x0201,
    TableTypeSpec = 0x0202,
    TableLibrary = 0x0203,
}

impl ChunkType {
    pub fn from_u16(ty: u16) -> Option<Self> {
        Some(match ty {
            ty if ty == ChunkType::Null as u16 => ChunkType::Null,
            ty if ty == ChunkType::StringPool as u16 => ChunkType::StringPool,
            ty if ty == ChunkType::Table as u16 => ChunkType::Table,
            ty if ty == ChunkType::Xml as u16 => ChunkType::Xml,
            ty if ty == ChunkType::XmlStartNamespace as u16 => ChunkType::XmlStartNamespace,
            ty if ty == ChunkType::XmlEndNamespace as u16 => ChunkType::XmlEndNamespace,
            ty if ty == ChunkType::XmlStartElement as u16 => ChunkType::XmlStartElement,
            ty if ty == ChunkType::XmlEndElement as u16 => ChunkType::XmlEndElement,
            ty if ty == ChunkType::XmlCdata as u16 => ChunkType::XmlCdata,
            ty if ty == ChunkType::XmlResourceMap as u16 => ChunkType::XmlResourceMap,
            ty if ty == ChunkType::TablePackage as u16 => ChunkType::TablePackage,
            ty if ty == ChunkType::TableType as u16 => ChunkType::TableType,
            ty if ty == ChunkType::TableTypeSpec as u16 => ChunkType::TableTypeSpec,
            ty if ty == ChunkType::TableLibrary as u16 => ChunkType::TableLibrary,
            _ => return None,
        })
    }
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct ResChunkHeader {
    /// Absolute offset of the chunk in the buffer it was read from.
    pub offset: usize,
    /// Type identifier for this chunk. The meaning of this value depends
    /// on the containing chunk.
    pub ty: u16,
    /// Size of the chunk header (in bytes). Adding this value to the address
    /// of the chunk allows you to find its associated data (if any).
    pub header_size: u16,
    /// Total size of this chunk (in bytes). This is the header_size plus the
    /// size of any data associated with the chunk. Adding this value to the
    /// chunk allows you to completely skip its contents (including any child
    /// chunks). If this value is the same as header_size, there is no data
    /// associated with the chunk.
    pub size: u32,
}

impl ResChunkHeader {
    pub const SIZE: usize = 8;

    /// Reads and validates a chunk header at the cursor position. The chunk must
    /// end at or before `limit`, the end of the enclosing chunk.
    pub fn read(r: &mut ByteCursor, limit: usize) -> Result<Self> {
        let offset = r.position();
        if r.remaining() < Self::SIZE {
            return Err(DecodeError::TruncatedData {
                offset,
                needed: Self::SIZE,
                available: r.remaining(),
            });
        }
        let ty = r.read_u16()?;
        let header_size = r.read_u16()?;
        let size = r.read_u32()?;
        let header = Self {
            offset,
            ty,
            header_size,
            size,
        };
        if (header_size as usize) < Self::SIZE {
            return Err(DecodeError::malformed(
                offset,
                format!("header size {header_size} is smaller than {}", Self::SIZE),
            ));
        }
        if size < header_size as u32 {
            return Err(DecodeError::malformed(
                offset,
                format!("chunk size {size} is smaller than its header size {header_size}"),
            ));
        }
        if header.end() > limit.min(r.len()) {
            return Err(DecodeError::malformed(
                offset,
                format!(
                    "chunk of {size} bytes overruns its parent, which ends at {}",
                    limit.min(r.len())
                ),
            ));
        }
        Ok(header)
    }

    pub fn chunk_type(&self) -> Option<ChunkType> {
        ChunkType::from_u16(self.ty)
    }

    /// Offset of the chunk body, right after the type specific header.
    pub fn body(&self) -> usize {
        self.offset + self.header_size as usize
    }

    pub fn end(&self) -> usize {
        self.offset + self.size as usize
    }

    /// Fails unless the type specific header is at least `min` bytes long.
    pub fn expect_header_size(&self, min: usize) -> Result<()> {
        if (self.header_size as usize) < min {
            return Err(DecodeError::malformed(
                self.offset,
                format!(
                    "header of chunk type 0x{:04x} is {} bytes, expected at least {min}",
                    self.ty, self.header_size
                ),
            ));
        }
        Ok(())
    }
}

/// Iterates the direct children of a container chunk, starting at `start`.
pub(crate) struct ChildChunks<'c, 'a> {
    cursor: &'c mut ByteCursor<'a>,
    next: usize,
    end: usize,
}

impl<'c, 'a> ChildChunks<'c, 'a> {
    pub fn new(cursor: &'c mut ByteCursor<'a>, start: usize, end: usize) -> Self {
        Self {
            cursor,
            next: start,
            end,
        }
    }

    pub fn cursor(&mut self) -> &mut ByteCursor<'a> {
        self.cursor
    }

    pub fn next_chunk(&mut self) -> Option<Result<ResChunkHeader>> {
        if self.next >= self.end {
            return None;
        }
        let header = self
            .cursor
            .seek(self.next)
            .and_then(|_| ResChunkHeader::read(self.cursor, self.end));
        match header {
            Ok(header) => {
                self.next = header.end();
                Some(Ok(header))
            }
            Err(err) => {
                self.next = self.end;
                Some(Err(err))
            }
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct ResTableRef(u32);

impl ResTableRef {
    pub fn new(package: u8, ty: NonZeroU8, entry: u16) -> Self {
        let package = (package as u32) << 24;
        let ty = (ty.get() as u32) << 16;
        let entry = entry as u32;
        Self(package | ty | entry)
    }

    pub fn package(self) -> u8 {
        (self.0 >> 24) as u8
    }

    pub fn ty(self) -> u8 {
        (self.0 >> 16) as u8
    }

    pub fn entry(self) -> u16 {
        self.0 as u16
    }
}

impl From<u32> for ResTableRef {
    fn from(r: u32) -> Self {
        Self(r)
    }
}

impl From<ResTableRef> for u32 {
    fn from(r: ResTableRef) -> u32 {
        r.0
    }
}

impl fmt::Display for ResTableRef {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "0x{:08x}", self.0)
    }
}

/// The raw 8 byte `Res_value` record.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct ResValue {
    pub size: u16,
    pub res0: u8,
    pub data_type: u8,
    pub data: u32,
}

impl ResValue {
    pub const SIZE: usize = 8;

    pub fn read(r: &mut ByteCursor) -> Result<Self> {
        let offset = r.position();
        let size = r.read_u16()?;
        if (size as usize) < Self::SIZE {
            return Err(DecodeError::malformed(
                offset,
                format!("typed value of {size} bytes"),
            ));
        }
        let res0 = r.read_u8()?;
        let data_type = r.read_u8()?;
        let data = r.read_u32()?;
        // newer tools may append fields
        r.skip(size as usize - Self::SIZE)?;
        Ok(Self {
            size,
            res0,
            data_type,
            data,
        })
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[repr(u8)]
pub enum ResValueType {
    Null = 0x00,
    Reference = 0x01,
    Attribute = 0x02,
    String = 0x03,
    Float = 0x04,
    Dimension = 0x05,
    Fraction = 0x06,
    DynamicReference = 0x07,
    DynamicAttribute = 0x08,
    IntDec = 0x10,
    IntHex = 0x11,
    IntBoolean = 0x12,
    IntColorArgb8 = 0x1c,
    IntColorRgb8 = 0x1d,
    IntColorArgb4 = 0x1e,
    IntColorRgb4 = 0x1f,
}

impl ResValueType {
    pub fn from_u8(ty: u8) -> Option<Self> {
        Some(match ty {
            x if x == Self::Null as u8 => Self::Null,
            x if x == Self::Reference as u8 => Self::Reference,
            x if x == Self::Attribute as u8 => Self::Attribute,
            x if x == Self::String as u8 => Self::String,
            x if x == Self::Float as u8 => Self::Float,
            x if x == Self::Dimension as u8 => Self::Dimension,
            x if x == Self::Fraction as u8 => Self::Fraction,
            x if x == Self::DynamicReference as u8 => Self::DynamicReference,
            x if x == Self::DynamicAttribute as u8 => Self::DynamicAttribute,
            x if x == Self::IntDec as u8 => Self::IntDec,
            x if x == Self::IntHex as u8 => Self::IntHex,
            x if x == Self::IntBoolean as u8 => Self::IntBoolean,
            x if x == Self::IntColorArgb8 as u8 => Self::IntColorArgb8,
            x if x == Self::IntColorRgb8 as u8 => Self::IntColorRgb8,
            x if x == Self::IntColorArgb4 as u8 => Self::IntColorArgb4,
            x if x == Self::IntColorRgb4 as u8 => Self::IntColorRgb4,
            _ => return None,
        })
    }
}

/// A decoded typed value.
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    Null,
    String(String),
    Integer(i32),
    IntegerHex(u32),
    Boolean(bool),
    Reference(ResTableRef),
    Attribute(ResTableRef),
    Float(f32),
    Dimension(u32),
    Fraction(u32),
    Color(u32),
    /// Bag entries (styles, arrays, plurals). Kept as decoded but not resolved.
    Complex {
        parent: ResTableRef,
        entries: Vec<(ResTableRef, Value)>,
    },
    Other {
        data_type: u8,
        data: u32,
    },
}

impl Value {
    /// Converts a raw typed value. String values are looked up in `strings`;
    /// `None` is returned when the index is out of range.
    pub fn from_res_value(value: ResValue, strings: &StringPool) -> Option<Self> {
        let data = value.data;
        Some(match ResValueType::from_u8(value.data_type) {
            Some(ResValueType::Null) => Value::Null,
            Some(ResValueType::Reference | ResValueType::DynamicReference) => {
                if data == 0 {
                    Value::Null
                } else {
                    Value::Reference(data.into())
                }
            }
            Some(ResValueType::Attribute | ResValueType::DynamicAttribute) => {
                Value::Attribute(data.into())
            }
            Some(ResValueType::String) => Value::String(strings.get(data)?.to_string()),
            Some(ResValueType::Float) => Value::Float(f32::from_bits(data)),
            Some(ResValueType::Dimension) => Value::Dimension(data),
            Some(ResValueType::Fraction) => Value::Fraction(data),
            Some(ResValueType::IntDec) => Value::Integer(data as i32),
            Some(ResValueType::IntHex) => Value::IntegerHex(data),
            Some(ResValueType::IntBoolean) => Value::Boolean(data != 0),
            Some(
                ResValueType::IntColorArgb8
                | ResValueType::IntColorRgb8
                | ResValueType::IntColorArgb4
                | ResValueType::IntColorRgb4,
            ) => Value::Color(data),
            None => Value::Other {
                data_type: value.data_type,
                data,
            },
        })
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_reference(&self) -> Option<ResTableRef> {
        match self {
            Self::Reference(r) => Some(*r),
            _ => None,
        }
    }

    /// Integer view of integer and boolean values, also accepting decimal strings.
    pub fn as_u64(&self) -> Option<u64> {
        match self {
            Self::Integer(i) => u64::try_from(*i).ok(),
            Self::IntegerHex(i) => Some(*i as u64),
            Self::Boolean(b) => Some(*b as u64),
            Self::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Boolean(b) => Some(*b),
            Self::Integer(i) => Some(*i != 0),
            Self::String(s) => s.parse().ok(),
            _ => None,
        }
    }
}

const RADIX_MULTS: [f32; 4] = [
    1.0 / (1 << 8) as f32,
    1.0 / (1 << 15) as f32,
    1.0 / (1 << 23) as f32,
    1.0 / (1u32 << 31) as f32,
];
const DIMENSION_UNITS: [&str; 6] = ["px", "dip", "sp", "pt", "in", "mm"];
const FRACTION_UNITS: [&str; 2] = ["%", "%p"];

fn complex_to_float(data: u32) -> f32 {
    let mantissa = (data & 0xffff_ff00) as i32 as f32;
    mantissa * RADIX_MULTS[((data >> 4) & 0x3) as usize]
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Null => Ok(()),
            Self::String(s) => f.write_str(s),
            Self::Integer(i) => write!(f, "{i}"),
            Self::IntegerHex(i) => write!(f, "0x{i:x}"),
            Self::Boolean(b) => write!(f, "{b}"),
            Self::Reference(r) => write!(f, "resourceId:{r}"),
            Self::Attribute(r) => write!(f, "?{r}"),
            Self::Float(v) => write!(f, "{v:?}"),
            Self::Dimension(data) => {
                let unit = DIMENSION_UNITS
                    .get((data & 0xf) as usize)
                    .unwrap_or(&"");
                write!(f, "{:?}{unit}", complex_to_float(*data))
            }
            Self::Fraction(data) => {
                let unit = FRACTION_UNITS.get((data & 0xf) as usize).unwrap_or(&"");
                write!(f, "{:?}{unit}", complex_to_float(*data) * 100.0)
            }
            Self::Color(argb) => write!(f, "#{argb:08x}"),
            Self::Complex { parent, entries } => {
                write!(f, "{{complex parent={parent} entries={}}}", entries.len())
            }
            Self::Other { data_type, data } => {
                write!(f, "{{type=0x{data_type:02x} data=0x{data:08x}}}")
            }
        }
    }
}

#[derive(Clone, Copy, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct ScreenType {
    pub orientation: u8,
    pub touchscreen: u8,
    pub density: u16,
}

/// Decoded `ResTable_config`. Only the locale is interpreted, everything else is
/// carried so that distinct configurations stay distinct.
#[derive(Clone, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct ResTableConfig {
    pub imsi: u32,
    pub language: [u8; 2],
    pub country: [u8; 2],
    pub screen_type: ScreenType,
    pub input: u32,
    pub screen_size: u32,
    pub version: u32,
    pub screen_config: u32,
    pub screen_size_dp: u32,
    pub locale_script: [u8; 4],
    pub locale_variant: [u8; 8],
    pub screen_config2: u32,
    /// Fields added by newer platforms. Empty when they are all zero.
    pub unknown: Vec<u8>,
}

impl ResTableConfig {
    const MIN_SIZE: usize = 28;

    /// Reads a size prefixed config which must end before `limit`.
    pub fn read(r: &mut ByteCursor, limit: usize) -> Result<Self> {
        let start = r.position();
        let size = r.read_u32()? as usize;
        if size < Self::MIN_SIZE || start + size > limit {
            return Err(DecodeError::malformed(
                start,
                format!("config of {size} bytes does not fit its chunk"),
            ));
        }
        let end = start + size;
        let mut config = Self {
            imsi: r.read_u32()?,
            ..Default::default()
        };
        config.language.copy_from_slice(r.read_bytes(2)?);
        config.country.copy_from_slice(r.read_bytes(2)?);
        config.screen_type = ScreenType {
            orientation: r.read_u8()?,
            touchscreen: r.read_u8()?,
            density: r.read_u16()?,
        };
        config.input = r.read_u32()?;
        config.screen_size = r.read_u32()?;
        config.version = r.read_u32()?;
        if r.position() + 4 <= end {
            config.screen_config = r.read_u32()?;
        }
        if r.position() + 4 <= end {
            config.screen_size_dp = r.read_u32()?;
        }
        if r.position() + 12 <= end {
            config.locale_script.copy_from_slice(r.read_bytes(4)?);
            config.locale_variant.copy_from_slice(r.read_bytes(8)?);
        }
        if r.position() + 4 <= end {
            config.screen_config2 = r.read_u32()?;
        }
        let rest = r.read_bytes(end - r.position())?;
        if rest.iter().any(|b| *b != 0) {
            config.unknown = rest.to_vec();
        }
        Ok(config)
    }

    pub fn has_locale(&self) -> bool {
        self.language != [0, 0]
    }

    /// True when no qualifier at all is set.
    pub fn is_default(&self) -> bool {
        *self == Self::default()
    }

    pub fn locale(&self) -> Option<Locale> {
        if !self.has_locale() {
            return None;
        }
        let language = unpack_language_or_region(self.language, b'a');
        let region = unpack_language_or_region(self.country, b'0');
        let script = self
            .locale_script
            .iter()
            .take_while(|b| **b != 0)
            .map(|b| *b as char)
            .collect::<String>();
        Some(Locale::with_script(&language, &script, &region))
    }
}

/// Two letter codes are stored verbatim, three letter codes are packed into
/// 15 bits with the high bit set.
fn unpack_language_or_region(packed: [u8; 2], base: u8) -> String {
    if packed[0] & 0x80 != 0 {
        let first = packed[1] & 0x1f;
        let second = ((packed[1] & 0xe0) >> 5) + ((packed[0] & 0x03) << 3);
        let third = (packed[0] & 0x7c) >> 2;
        [first, second, third]
            .iter()
            .map(|c| (c + base) as char)
            .collect()
    } else {
        packed
            .iter()
            .take_while(|b| **b != 0)
            .map(|b| *b as char)
            .collect()
    }
}
