use crate::cursor::ByteCursor;
use crate::error::{DecodeError, Result};
use serde::Serialize;

const DEX_MAGIC: &[u8; 4] = b"dex\n";
const HEADER_SIZE: usize = 0x70;
const ENDIAN_CONSTANT: u32 = 0x1234_5678;
const CLASS_DEF_SIZE: usize = 32;
const NO_INDEX: u32 = 0xffff_ffff;

pub const ACC_PUBLIC: u32 = 0x1;
pub const ACC_FINAL: u32 = 0x10;
pub const ACC_INTERFACE: u32 = 0x200;
pub const ACC_ABSTRACT: u32 = 0x400;
pub const ACC_ENUM: u32 = 0x4000;

/// Size and offset of one of the id sections.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize)]
pub struct Section {
    pub size: u32,
    pub offset: u32,
}

impl Section {
    fn read(r: &mut ByteCursor) -> Result<Self> {
        Ok(Self {
            size: r.read_u32()?,
            offset: r.read_u32()?,
        })
    }

    /// Fails unless `size` items of `item_size` bytes fit in `len` bytes.
    fn check(&self, name: &str, item_size: usize, len: usize) -> Result<()> {
        let end = (self.offset as u64).saturating_add(self.size as u64 * item_size as u64);
        if self.size > 0 && end > len as u64 {
            return Err(DecodeError::InvalidDex(format!(
                "{} {name} at 0x{:x} don't fit in {len} bytes",
                self.size, self.offset
            )));
        }
        Ok(())
    }
}

#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize)]
pub struct DexHeader {
    /// Format version, `035` to `041`.
    pub version: String,
    pub checksum: u32,
    #[serde(serialize_with = "serialize_hex")]
    pub signature: [u8; 20],
    pub file_size: u32,
    pub header_size: u32,
    pub endian_tag: u32,
    pub link: Section,
    pub map_offset: u32,
    pub string_ids: Section,
    pub type_ids: Section,
    pub proto_ids: Section,
    pub field_ids: Section,
    pub method_ids: Section,
    pub class_defs: Section,
    pub data: Section,
}

fn serialize_hex<S: serde::Serializer>(bytes: &[u8; 20], serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&crate::hex(bytes))
}

impl DexHeader {
    pub fn read(r: &mut ByteCursor) -> Result<Self> {
        let magic = r.read_bytes(8)?;
        if &magic[..4] != DEX_MAGIC || magic[7] != 0 {
            return Err(DecodeError::InvalidDex("bad magic".into()));
        }
        let version = String::from_utf8_lossy(&magic[4..7]).into_owned();
        let checksum = r.read_u32()?;
        let mut signature = [0; 20];
        signature.copy_from_slice(r.read_bytes(20)?);
        let header = Self {
            version,
            checksum,
            signature,
            file_size: r.read_u32()?,
            header_size: r.read_u32()?,
            endian_tag: r.read_u32()?,
            link: Section::read(r)?,
            map_offset: r.read_u32()?,
            string_ids: Section::read(r)?,
            type_ids: Section::read(r)?,
            proto_ids: Section::read(r)?,
            field_ids: Section::read(r)?,
            method_ids: Section::read(r)?,
            class_defs: Section::read(r)?,
            data: Section::read(r)?,
        };
        if header.endian_tag != ENDIAN_CONSTANT {
            return Err(DecodeError::InvalidDex(format!(
                "unsupported endian tag 0x{:08x}",
                header.endian_tag
            )));
        }
        Ok(header)
    }
}

/// A class defined in a dex file.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct DexClass {
    /// Type descriptor, `Lcom/example/Main;`.
    pub descriptor: String,
    pub superclass: Option<String>,
    pub access_flags: u32,
}

impl DexClass {
    /// `com.example.Main` for `Lcom/example/Main;`.
    pub fn class_name(&self) -> String {
        descriptor_to_name(&self.descriptor)
    }

    pub fn is_public(&self) -> bool {
        self.access_flags & ACC_PUBLIC != 0
    }

    pub fn is_interface(&self) -> bool {
        self.access_flags & ACC_INTERFACE != 0
    }
}

pub fn descriptor_to_name(descriptor: &str) -> String {
    descriptor
        .strip_prefix('L')
        .and_then(|d| d.strip_suffix(';'))
        .unwrap_or(descriptor)
        .replace('/', ".")
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct DexInfo {
    pub header: DexHeader,
    pub classes: Vec<DexClass>,
}

struct DexReader<'a> {
    r: ByteCursor<'a>,
    header: &'a DexHeader,
}

impl DexReader<'_> {
    fn read_uleb128(&mut self) -> Result<u32> {
        let mut value = 0u32;
        for i in 0..5 {
            let byte = self.r.read_u8()?;
            value |= ((byte & 0x7f) as u32) << (i * 7);
            if byte & 0x80 == 0 {
                return Ok(value);
            }
        }
        Err(DecodeError::InvalidDex(format!(
            "uleb128 at 0x{:x} is too long",
            self.r.position()
        )))
    }

    fn string(&mut self, index: u32) -> Result<String> {
        if index >= self.header.string_ids.size {
            return Err(DecodeError::InvalidDex(format!("string index {index} out of range")));
        }
        self.r
            .seek(self.header.string_ids.offset as usize + index as usize * 4)?;
        let offset = self.r.read_u32()? as usize;
        self.r.seek(offset)?;
        let _utf16_size = self.read_uleb128()?;
        let start = self.r.position();
        let len = self
            .r
            .slice(start, self.r.len())?
            .iter()
            .position(|b| *b == 0)
            .ok_or(DecodeError::TruncatedData {
                offset: start,
                needed: self.r.remaining() + 1,
                available: self.r.remaining(),
            })?;
        let bytes = self.r.read_bytes(len)?;
        cesu8::from_java_cesu8(bytes)
            .map(|s| s.into_owned())
            .map_err(|_| DecodeError::InvalidString { offset: start })
    }

    fn type_descriptor(&mut self, index: u32) -> Result<String> {
        if index >= self.header.type_ids.size {
            return Err(DecodeError::InvalidDex(format!("type index {index} out of range")));
        }
        self.r
            .seek(self.header.type_ids.offset as usize + index as usize * 4)?;
        let descriptor = self.r.read_u32()?;
        self.string(descriptor)
    }

    fn class(&mut self, index: u32) -> Result<DexClass> {
        self.r
            .seek(self.header.class_defs.offset as usize + index as usize * CLASS_DEF_SIZE)?;
        let class = self.r.read_u32()?;
        let access_flags = self.r.read_u32()?;
        let superclass = self.r.read_u32()?;
        let descriptor = self.type_descriptor(class)?;
        let superclass = if superclass == NO_INDEX {
            None
        } else {
            Some(self.type_descriptor(superclass)?)
        };
        Ok(DexClass {
            descriptor,
            superclass,
            access_flags,
        })
    }
}

impl DexInfo {
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < HEADER_SIZE {
            if bytes.len() >= 4 && &bytes[..4] != DEX_MAGIC {
                return Err(DecodeError::InvalidDex("bad magic".into()));
            }
            return Err(DecodeError::TruncatedData {
                offset: 0,
                needed: HEADER_SIZE,
                available: bytes.len(),
            });
        }
        let header = DexHeader::read(&mut ByteCursor::new(bytes))?;
        let len = bytes.len();
        header.string_ids.check("string ids", 4, len)?;
        header.type_ids.check("type ids", 4, len)?;
        header.class_defs.check("class defs", CLASS_DEF_SIZE, len)?;
        tracing::trace!(
            "dex {}: {} strings, {} types, {} classes",
            header.version,
            header.string_ids.size,
            header.type_ids.size,
            header.class_defs.size
        );

        let mut reader = DexReader {
            r: ByteCursor::new(bytes),
            header: &header,
        };
        let classes = (0..header.class_defs.size)
            .map(|i| reader.class(i))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { header, classes })
    }
}
