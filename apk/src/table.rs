use crate::cursor::ByteCursor;
use crate::error::{DecodeError, Result};
use crate::locale::{best_match, Locale};
use crate::res::{
    ChildChunks, ChunkType, ResChunkHeader, ResTableConfig, ResTableRef, ResValue, Value,
};
use crate::string_pool::StringPool;
use anyhow::Context;
use std::collections::{BTreeMap, BTreeSet};

/// References are followed at most this many times before giving up.
const MAX_REFERENCE_DEPTH: usize = 8;

const TABLE_HEADER_SIZE: usize = 12;
const PACKAGE_HEADER_SIZE: usize = 284;
const PACKAGE_HEADER_SIZE_V2: usize = 288;
const TYPE_HEADER_SIZE: usize = 20;

/// `@[package:]type/name`
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Ref<'a> {
    package: Option<&'a str>,
    ty: &'a str,
    name: &'a str,
}

impl<'a> Ref<'a> {
    pub fn new(package: Option<&'a str>, ty: &'a str, name: &'a str) -> Self {
        Self { package, ty, name }
    }

    pub fn parse(s: &'a str) -> anyhow::Result<Self> {
        let s = s
            .strip_prefix('@')
            .with_context(|| format!("invalid reference {s}: expected `@`"))?;
        let (descr, name) = s
            .split_once('/')
            .with_context(|| format!("invalid reference {s}: expected `/`"))?;
        let (package, ty) = if let Some((package, ty)) = descr.split_once(':') {
            (Some(package), ty)
        } else {
            (None, descr)
        };
        Ok(Self { package, ty, name })
    }
}

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Package {
    pub id: u8,
    pub name: String,
    pub type_names: Vec<String>,
    pub type_id_offset: u32,
}

impl Package {
    pub fn type_name(&self, ty: u8) -> Option<&str> {
        let index = (ty as u32).checked_sub(1 + self.type_id_offset)?;
        self.type_names.get(index as usize).map(String::as_str)
    }

    fn type_id(&self, name: &str) -> Option<u8> {
        let index = self.type_names.iter().position(|t| t == name)?;
        u8::try_from(index as u32 + 1 + self.type_id_offset).ok()
    }
}

/// All values of one resource id, keyed by configuration.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ResourceEntry {
    pub key: String,
    pub values: BTreeMap<ResTableConfig, Value>,
}

/// A decoded `resources.arsc`.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ResourceTable {
    packages: BTreeMap<u8, Package>,
    entries: BTreeMap<u32, ResourceEntry>,
    libraries: BTreeMap<u8, String>,
    locales: BTreeSet<Locale>,
    warnings: Vec<String>,
}

struct DecodedEntry {
    id: u32,
    key: String,
    value: Value,
}

impl ResourceTable {
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let mut r = ByteCursor::new(bytes);
        let tag = r.read_u16()?;
        if tag != ChunkType::Table as u16 {
            return Err(DecodeError::NotResourceTable(tag));
        }
        r.seek(0)?;
        let header = ResChunkHeader::read(&mut r, bytes.len())?;
        header.expect_header_size(TABLE_HEADER_SIZE)?;
        let package_count = r.read_u32()?;
        tracing::trace!(
            "resource table of {} bytes, {package_count} packages",
            header.size
        );

        let mut table = Self::default();
        let mut strings: Option<StringPool> = None;
        let mut packages = 0;
        let mut chunks = ChildChunks::new(&mut r, header.body(), header.end());
        while let Some(chunk) = chunks.next_chunk() {
            let chunk = chunk?;
            match chunk.chunk_type() {
                Some(ChunkType::StringPool) if strings.is_none() => {
                    strings = Some(StringPool::read(chunks.cursor(), &chunk)?);
                }
                Some(ChunkType::TablePackage) => {
                    let empty = StringPool::default();
                    let strings = strings.as_ref().unwrap_or(&empty);
                    table.read_package(chunks.cursor(), &chunk, strings)?;
                    packages += 1;
                }
                _ => tracing::debug!("skipping chunk 0x{:04x} at {}", chunk.ty, chunk.offset),
            }
        }
        if packages != package_count {
            table.warn(format!(
                "table declares {package_count} packages but contains {packages}"
            ));
        }
        Ok(table)
    }

    fn warn(&mut self, warning: String) {
        tracing::warn!("{warning}");
        self.warnings.push(warning);
    }

    fn read_package(
        &mut self,
        r: &mut ByteCursor,
        header: &ResChunkHeader,
        strings: &StringPool,
    ) -> Result<()> {
        header.expect_header_size(PACKAGE_HEADER_SIZE)?;
        r.seek(header.offset + ResChunkHeader::SIZE)?;
        let id = r.read_u32()?;
        let id = u8::try_from(id)
            .map_err(|_| DecodeError::malformed(header.offset, format!("package id {id}")))?;
        let name = read_fixed_utf16(r, 128)?;
        let type_strings = r.read_u32()? as usize;
        let _last_public_type = r.read_u32()?;
        let key_strings = r.read_u32()? as usize;
        let _last_public_key = r.read_u32()?;
        // the extended header carries a type id offset
        let type_id_offset = if header.header_size as usize >= PACKAGE_HEADER_SIZE_V2 {
            r.read_u32()?
        } else {
            0
        };
        tracing::trace!("package 0x{id:02x} `{name}`");

        r.seek(header.offset.saturating_add(type_strings).min(r.len()))?;
        let types = StringPool::read_chunk(r, header.end())?;
        r.seek(header.offset.saturating_add(key_strings).min(r.len()))?;
        let keys = StringPool::read_chunk(r, header.end())?;

        let package = Package {
            id,
            name,
            type_names: types.iter().map(str::to_string).collect(),
            type_id_offset,
        };
        if let Some(previous) = self.packages.insert(id, package) {
            self.warn(format!(
                "package 0x{id:02x} `{}` is defined more than once",
                previous.name
            ));
        }

        let mut chunks = ChildChunks::new(r, header.body(), header.end());
        while let Some(chunk) = chunks.next_chunk() {
            let chunk = chunk?;
            match chunk.chunk_type() {
                Some(ChunkType::TableType) => {
                    match read_type(chunks.cursor(), &chunk, id, strings, &keys) {
                        Ok((config, entries)) => self.commit(config, entries),
                        Err(err) => self.warn(format!(
                            "skipping type chunk at {} in package 0x{id:02x}: {err}",
                            chunk.offset
                        )),
                    }
                }
                Some(ChunkType::TableLibrary) => {
                    if let Err(err) = self.read_library(chunks.cursor(), &chunk) {
                        self.warn(format!("skipping library chunk at {}: {err}", chunk.offset));
                    }
                }
                Some(ChunkType::TableTypeSpec | ChunkType::StringPool) => {}
                _ => tracing::debug!("skipping chunk 0x{:04x} at {}", chunk.ty, chunk.offset),
            }
        }
        Ok(())
    }

    fn read_library(&mut self, r: &mut ByteCursor, header: &ResChunkHeader) -> Result<()> {
        header.expect_header_size(12)?;
        r.seek(header.offset + ResChunkHeader::SIZE)?;
        let count = r.read_u32()? as usize;
        // package id + 128 utf-16 units
        if count.saturating_mul(260) > header.end() - header.body() {
            return Err(DecodeError::malformed(
                header.offset,
                format!("{count} libraries don't fit the chunk"),
            ));
        }
        r.seek(header.body())?;
        for _ in 0..count {
            let id = r.read_u32()?;
            let name = read_fixed_utf16(r, 128)?;
            self.libraries.insert(id as u8, name);
        }
        Ok(())
    }

    fn commit(&mut self, config: ResTableConfig, entries: Vec<DecodedEntry>) {
        if let Some(locale) = config.locale() {
            self.locales.insert(locale);
        }
        for DecodedEntry { id, key, value } in entries {
            let entry = self.entries.entry(id).or_default();
            if entry.key.is_empty() {
                entry.key = key;
            }
            if entry.values.insert(config.clone(), value).is_some() {
                self.warn(format!(
                    "resource {} is defined more than once for {config:?}",
                    ResTableRef::from(id)
                ));
            }
        }
    }

    /// The value of `id` that best fits `locale`, without following references.
    pub fn get(&self, id: u32, locale: &Locale) -> Option<&Value> {
        let entry = self.entries.get(&id)?;
        best_match(locale, &entry.values).map(|(_, value)| value)
    }

    /// The value of `id` that best fits `locale`. References to other entries of
    /// the table are followed.
    pub fn resolve(&self, id: u32, locale: &Locale) -> Option<&Value> {
        let mut value = self.get(id, locale)?;
        for _ in 0..MAX_REFERENCE_DEPTH {
            match value
                .as_reference()
                .and_then(|r| self.get(r.into(), locale))
            {
                Some(next) => value = next,
                None => break,
            }
        }
        Some(value)
    }

    pub fn entry(&self, id: u32) -> Option<&ResourceEntry> {
        self.entries.get(&id)
    }

    pub fn entries(&self) -> impl Iterator<Item = (ResTableRef, &ResourceEntry)> {
        self.entries.iter().map(|(id, entry)| ((*id).into(), entry))
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Every locale some value is qualified with.
    pub fn locales(&self) -> &BTreeSet<Locale> {
        &self.locales
    }

    pub fn packages(&self) -> impl Iterator<Item = &Package> {
        self.packages.values()
    }

    pub fn package_name(&self, package: u8) -> Option<&str> {
        self.packages
            .get(&package)
            .map(|p| p.name.as_str())
            .or_else(|| self.libraries.get(&package).map(String::as_str))
    }

    /// Shared libraries this table references, by the package id assigned to them.
    pub fn libraries(&self) -> &BTreeMap<u8, String> {
        &self.libraries
    }

    pub fn type_name(&self, id: u32) -> Option<&str> {
        let r = ResTableRef::from(id);
        self.packages.get(&r.package())?.type_name(r.ty())
    }

    /// `@[package:]type/key`; the package is only named for ids outside the
    /// application package.
    pub fn resource_name(&self, id: u32) -> Option<String> {
        let r = ResTableRef::from(id);
        let package = self.packages.get(&r.package())?;
        let ty = package.type_name(r.ty())?;
        let key = &self.entries.get(&id)?.key;
        if r.package() == 0x7f {
            Some(format!("@{ty}/{key}"))
        } else {
            Some(format!("@{}:{ty}/{key}", package.name))
        }
    }

    pub fn lookup(&self, r: &Ref) -> Option<ResTableRef> {
        let package = match r.package {
            Some(name) => self.packages.values().find(|p| p.name == name)?,
            None => self
                .packages
                .get(&0x7f)
                .or_else(|| self.packages.values().next())?,
        };
        let ty = package.type_id(r.ty)?;
        let start = (package.id as u32) << 24 | (ty as u32) << 16;
        self.entries
            .range(start..=start | 0xffff)
            .find(|(_, entry)| entry.key == r.name)
            .map(|(id, _)| (*id).into())
    }

    /// Problems that were skipped over while decoding.
    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }
}

fn read_fixed_utf16(r: &mut ByteCursor, units: usize) -> Result<String> {
    let offset = r.position();
    let bytes = r.read_bytes(units * 2)?;
    let units: Vec<u16> = bytes
        .chunks_exact(2)
        .map(|c| u16::from_le_bytes([c[0], c[1]]))
        .take_while(|u| *u != 0)
        .collect();
    String::from_utf16(&units).map_err(|_| DecodeError::InvalidString { offset })
}

const TYPE_FLAG_SPARSE: u8 = 0x01;
const TYPE_FLAG_OFFSET16: u8 = 0x02;
const NO_ENTRY: u32 = 0xffff_ffff;
const NO_ENTRY16: u16 = 0xffff;

const ENTRY_FLAG_COMPLEX: u16 = 0x0001;
const ENTRY_FLAG_COMPACT: u16 = 0x0008;

/// Decodes a `TABLE_TYPE` chunk without touching the table so that a broken
/// chunk can be dropped as a whole.
fn read_type(
    r: &mut ByteCursor,
    header: &ResChunkHeader,
    package: u8,
    strings: &StringPool,
    keys: &StringPool,
) -> Result<(ResTableConfig, Vec<DecodedEntry>)> {
    header.expect_header_size(TYPE_HEADER_SIZE)?;
    r.seek(header.offset + ResChunkHeader::SIZE)?;
    let ty = r.read_u8()?;
    let flags = r.read_u8()?;
    let _reserved = r.read_u16()?;
    let entry_count = r.read_u32()? as usize;
    let entries_start = header.offset.saturating_add(r.read_u32()? as usize);
    let config = ResTableConfig::read(r, header.body())?;
    if ty == 0 {
        return Err(DecodeError::malformed(header.offset, "type id 0"));
    }
    let end = header.end();
    if entries_start > end {
        return Err(DecodeError::malformed(
            header.offset,
            "entries start past the end of the chunk",
        ));
    }
    let offset_size = if flags & TYPE_FLAG_OFFSET16 != 0 && flags & TYPE_FLAG_SPARSE == 0 {
        2
    } else {
        4
    };
    if entry_count.saturating_mul(offset_size) > entries_start.saturating_sub(header.body()) {
        return Err(DecodeError::malformed(
            header.offset,
            format!("{entry_count} entry offsets don't fit before the entries"),
        ));
    }
    tracing::trace!(
        "type {ty} of package 0x{package:02x}: {entry_count} entries, flags 0x{flags:02x}, {:?}",
        config.locale()
    );

    r.seek(header.body())?;
    let mut offsets = Vec::with_capacity(entry_count);
    for index in 0..entry_count {
        if flags & TYPE_FLAG_SPARSE != 0 {
            let index = r.read_u16()?;
            let offset = r.read_u16()? as usize * 4;
            offsets.push((index, offset));
        } else if offset_size == 2 {
            let offset = r.read_u16()?;
            if offset != NO_ENTRY16 {
                offsets.push((index as u16, offset as usize * 4));
            }
        } else {
            let offset = r.read_u32()?;
            if offset != NO_ENTRY {
                offsets.push((index as u16, offset as usize));
            }
        }
    }

    let mut entries = Vec::with_capacity(offsets.len());
    for (index, offset) in offsets {
        let pos = entries_start.saturating_add(offset);
        if pos >= end {
            return Err(DecodeError::malformed(
                header.offset,
                format!("entry {index} starts past the end of the chunk"),
            ));
        }
        r.seek(pos)?;
        let mut entry = ByteCursor::new(r.slice(0, end)?);
        entry.seek(pos)?;
        let id = (package as u32) << 24 | (ty as u32) << 16 | index as u32;
        let (key, value) = read_entry(&mut entry, strings)?;
        let Some(value) = value else {
            tracing::warn!(
                "dropping value of {} with a dangling string reference",
                ResTableRef::from(id)
            );
            continue;
        };
        let key = keys.get(key).unwrap_or_default().to_string();
        entries.push(DecodedEntry { id, key, value });
    }
    Ok((config, entries))
}

fn read_entry(r: &mut ByteCursor, strings: &StringPool) -> Result<(u32, Option<Value>)> {
    let start = r.position();
    let size = r.read_u16()?;
    let flags = r.read_u16()?;
    if flags & ENTRY_FLAG_COMPACT != 0 {
        let data = r.read_u32()?;
        let value = ResValue {
            size: ResValue::SIZE as u16,
            res0: 0,
            data_type: (flags >> 8) as u8,
            data,
        };
        return Ok((size as u32, Value::from_res_value(value, strings)));
    }
    let key = r.read_u32()?;
    if flags & ENTRY_FLAG_COMPLEX != 0 {
        let parent = r.read_u32()?;
        let count = r.read_u32()? as usize;
        r.seek(start + size as usize)?;
        // name + 8 byte value
        if count.saturating_mul(12) > r.remaining() {
            return Err(DecodeError::malformed(
                start,
                format!("{count} bag items don't fit the chunk"),
            ));
        }
        let mut entries = Vec::with_capacity(count);
        for _ in 0..count {
            let name = r.read_u32()?;
            let value = ResValue::read(r)?;
            let value = Value::from_res_value(value, strings).unwrap_or(Value::Other {
                data_type: value.data_type,
                data: value.data,
            });
            entries.push((name.into(), value));
        }
        let value = Value::Complex {
            parent: parent.into(),
            entries,
        };
        return Ok((key, Some(value)));
    }
    r.seek(start + size as usize)?;
    let value = ResValue::read(r)?;
    Ok((key, Value::from_res_value(value, strings)))
}
