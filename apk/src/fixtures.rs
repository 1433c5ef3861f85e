//! Builders for the binary formats, used by the unit tests to lay out chunks.

use crate::res::{ChunkType, ResTableConfig, ResValueType};
use crate::string_pool::{ResSpan, ResStringPoolHeader};
use byteorder::{LittleEndian, WriteBytesExt};
use std::collections::{BTreeMap, HashMap};
use std::io::{Cursor, Seek, SeekFrom, Write};

pub use crate::xml::ANDROID_NS;

type W = Cursor<Vec<u8>>;

/// Writes a chunk header placeholder and patches it once the chunk is complete.
struct ChunkWriter {
    ty: ChunkType,
    start_chunk: u64,
    end_header: u64,
}

impl ChunkWriter {
    fn start_chunk(ty: ChunkType, w: &mut W) -> Self {
        let start_chunk = w.position();
        w.write_all(&[0; 8]).unwrap();
        Self {
            ty,
            start_chunk,
            end_header: 0,
        }
    }

    fn end_header(&mut self, w: &mut W) {
        self.end_header = w.position();
    }

    fn end_chunk(self, w: &mut W) -> (u64, u64, u64) {
        assert_ne!(self.end_header, 0);
        let end_chunk = w.position();
        w.seek(SeekFrom::Start(self.start_chunk)).unwrap();
        w.write_u16::<LittleEndian>(self.ty as u16).unwrap();
        w.write_u16::<LittleEndian>((self.end_header - self.start_chunk) as u16)
            .unwrap();
        w.write_u32::<LittleEndian>((end_chunk - self.start_chunk) as u32)
            .unwrap();
        w.seek(SeekFrom::Start(end_chunk)).unwrap();
        (self.start_chunk, self.end_header, end_chunk)
    }
}

fn patch_u32(w: &mut W, at: u64, value: u32) {
    let pos = w.position();
    w.seek(SeekFrom::Start(at)).unwrap();
    w.write_u32::<LittleEndian>(value).unwrap();
    w.seek(SeekFrom::Start(pos)).unwrap();
}

fn pad4(w: &mut W) {
    while w.position() % 4 != 0 {
        w.write_u8(0).unwrap();
    }
}

fn write_utf8_len(w: &mut W, len: usize) {
    assert!(len < 0x8000);
    if len >= 0x80 {
        w.write_u8(((len >> 8) as u8) | 0x80).unwrap();
    }
    w.write_u8(len as u8).unwrap();
}

fn write_string_pool<S: AsRef<str>>(w: &mut W, strings: &[S], styles: &[Vec<ResSpan>], utf8: bool) {
    let mut chunk = ChunkWriter::start_chunk(ChunkType::StringPool, w);
    w.write_all(&[0; 20]).unwrap();
    chunk.end_header(w);
    let indices_start = w.position();
    for _ in 0..strings.len() + styles.len() {
        w.write_u32::<LittleEndian>(0).unwrap();
    }
    let strings_start = w.position();
    let mut indices = Vec::with_capacity(strings.len() + styles.len());
    for string in strings {
        let string = string.as_ref();
        indices.push(w.position() - strings_start);
        let units = string.encode_utf16().count();
        if utf8 {
            // supplementary characters are written as surrogate pairs
            let bytes = cesu8::to_cesu8(string);
            write_utf8_len(w, units);
            write_utf8_len(w, bytes.len());
            w.write_all(&bytes).unwrap();
            w.write_u8(0).unwrap();
        } else {
            assert!(units < 0x8000);
            w.write_u16::<LittleEndian>(units as u16).unwrap();
            for unit in string.encode_utf16() {
                w.write_u16::<LittleEndian>(unit).unwrap();
            }
            w.write_u16::<LittleEndian>(0).unwrap();
        }
    }
    pad4(w);
    let styles_start = w.position();
    for style in styles {
        indices.push(w.position() - styles_start);
        for span in style {
            w.write_u32::<LittleEndian>(span.name).unwrap();
            w.write_u32::<LittleEndian>(span.first_char).unwrap();
            w.write_u32::<LittleEndian>(span.last_char).unwrap();
        }
        w.write_i32::<LittleEndian>(-1).unwrap();
    }
    let (start_chunk, _, end_chunk) = chunk.end_chunk(w);

    w.seek(SeekFrom::Start(start_chunk + 8)).unwrap();
    w.write_u32::<LittleEndian>(strings.len() as u32).unwrap();
    w.write_u32::<LittleEndian>(styles.len() as u32).unwrap();
    let flags = if utf8 {
        ResStringPoolHeader::UTF8_FLAG
    } else {
        0
    };
    w.write_u32::<LittleEndian>(flags).unwrap();
    w.write_u32::<LittleEndian>((strings_start - start_chunk) as u32)
        .unwrap();
    let styles_offset = if styles.is_empty() {
        0
    } else {
        styles_start - start_chunk
    };
    w.write_u32::<LittleEndian>(styles_offset as u32).unwrap();
    w.seek(SeekFrom::Start(indices_start)).unwrap();
    for index in indices {
        w.write_u32::<LittleEndian>(index as u32).unwrap();
    }
    w.seek(SeekFrom::Start(end_chunk)).unwrap();
}

pub fn string_pool<S: AsRef<str>>(strings: &[S], utf8: bool) -> Vec<u8> {
    string_pool_with_styles(strings, &[], utf8)
}

pub fn string_pool_with_styles<S: AsRef<str>>(
    strings: &[S],
    styles: &[Vec<ResSpan>],
    utf8: bool,
) -> Vec<u8> {
    let mut w = Cursor::new(vec![]);
    write_string_pool(&mut w, strings, styles, utf8);
    w.into_inner()
}

fn write_config(w: &mut W, config: &ResTableConfig) {
    let start = w.position();
    w.write_u32::<LittleEndian>(0).unwrap();
    w.write_u32::<LittleEndian>(config.imsi).unwrap();
    w.write_all(&config.language).unwrap();
    w.write_all(&config.country).unwrap();
    w.write_u8(config.screen_type.orientation).unwrap();
    w.write_u8(config.screen_type.touchscreen).unwrap();
    w.write_u16::<LittleEndian>(config.screen_type.density)
        .unwrap();
    w.write_u32::<LittleEndian>(config.input).unwrap();
    w.write_u32::<LittleEndian>(config.screen_size).unwrap();
    w.write_u32::<LittleEndian>(config.version).unwrap();
    w.write_u32::<LittleEndian>(config.screen_config).unwrap();
    w.write_u32::<LittleEndian>(config.screen_size_dp).unwrap();
    w.write_all(&config.locale_script).unwrap();
    w.write_all(&config.locale_variant).unwrap();
    w.write_u32::<LittleEndian>(config.screen_config2).unwrap();
    // newer platforms append more fields
    w.write_all(&[0; 12]).unwrap();
    let size = (w.position() - start) as u32;
    patch_u32(w, start, size);
}

pub fn locale_config(language: &str, region: &str) -> ResTableConfig {
    let mut config = ResTableConfig::default();
    config.language[..language.len()].copy_from_slice(language.as_bytes());
    config.country[..region.len()].copy_from_slice(region.as_bytes());
    config
}

/// Values stored in a fixture resource table.
#[derive(Clone, Debug)]
pub enum TestValue {
    String(String),
    Int(i32),
    Bool(bool),
    Reference(u32),
    Bag { parent: u32, items: Vec<(u32, i32)> },
}

impl TestValue {
    pub fn string(s: &str) -> Self {
        Self::String(s.to_string())
    }
}

impl From<&str> for TestValue {
    fn from(s: &str) -> Self {
        Self::string(s)
    }
}

impl From<i32> for TestValue {
    fn from(i: i32) -> Self {
        Self::Int(i)
    }
}

impl From<bool> for TestValue {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum EntryLayout {
    #[default]
    Dense,
    Offset16,
    Sparse,
    Compact,
}

pub struct TestPackage {
    id: u8,
    name: String,
    types: Vec<String>,
    keys: Vec<String>,
    /// type index -> entry keys, entry id is the position
    type_entries: Vec<Vec<u32>>,
    values: BTreeMap<(usize, ResTableConfig), BTreeMap<u16, TestValue>>,
    libraries: Vec<(u8, String)>,
    pub layout: EntryLayout,
}

impl TestPackage {
    /// Declares a shared library package.
    pub fn library(&mut self, id: u8, name: &str) -> &mut Self {
        self.libraries.push((id, name.to_string()));
        self
    }

    /// Adds a value for the default configuration, returning the resource id.
    pub fn value(&mut self, ty: &str, key: &str, value: impl Into<TestValue>) -> u32 {
        self.entry(ty, key, ResTableConfig::default(), value)
    }

    /// Adds a value, returning the resource id.
    pub fn entry(
        &mut self,
        ty: &str,
        key: &str,
        config: ResTableConfig,
        value: impl Into<TestValue>,
    ) -> u32 {
        let type_index = match self.types.iter().position(|t| t == ty) {
            Some(i) => i,
            None => {
                self.types.push(ty.to_string());
                self.type_entries.push(vec![]);
                self.types.len() - 1
            }
        };
        let key_index = match self.keys.iter().position(|k| k == key) {
            Some(i) => i,
            None => {
                self.keys.push(key.to_string());
                self.keys.len() - 1
            }
        } as u32;
        let entries = &mut self.type_entries[type_index];
        let entry = match entries.iter().position(|k| *k == key_index) {
            Some(i) => i,
            None => {
                entries.push(key_index);
                entries.len() - 1
            }
        } as u16;
        self.values
            .entry((type_index, config))
            .or_default()
            .insert(entry, value.into());
        (self.id as u32) << 24 | (type_index as u32 + 1) << 16 | entry as u32
    }
}

#[derive(Default)]
pub struct TestTable {
    strings: Vec<String>,
    packages: Vec<TestPackage>,
}

impl TestTable {
    pub fn package(&mut self, id: u8, name: &str) -> &mut TestPackage {
        self.packages.push(TestPackage {
            id,
            name: name.to_string(),
            types: vec![],
            keys: vec![],
            type_entries: vec![],
            values: BTreeMap::new(),
            libraries: vec![],
            layout: EntryLayout::Dense,
        });
        self.packages.last_mut().unwrap()
    }

    fn intern(strings: &mut Vec<String>, s: &str) -> u32 {
        match strings.iter().position(|x| x == s) {
            Some(i) => i as u32,
            None => {
                strings.push(s.to_string());
                strings.len() as u32 - 1
            }
        }
    }

    pub fn build(&self) -> Vec<u8> {
        let mut strings = self.strings.clone();
        for package in &self.packages {
            for values in package.values.values() {
                for value in values.values() {
                    if let TestValue::String(s) = value {
                        Self::intern(&mut strings, s);
                    }
                }
            }
        }

        let mut w = Cursor::new(vec![]);
        let mut chunk = ChunkWriter::start_chunk(ChunkType::Table, &mut w);
        w.write_u32::<LittleEndian>(self.packages.len() as u32)
            .unwrap();
        chunk.end_header(&mut w);
        write_string_pool(&mut w, &strings, &[], true);
        for package in &self.packages {
            write_package(&mut w, package, &strings);
        }
        chunk.end_chunk(&mut w);
        w.into_inner()
    }
}

fn write_package_name(w: &mut W, name: &str) {
    let mut units = [0u16; 128];
    for (i, unit) in name.encode_utf16().take(127).enumerate() {
        units[i] = unit;
    }
    for unit in units {
        w.write_u16::<LittleEndian>(unit).unwrap();
    }
}

fn write_package(w: &mut W, package: &TestPackage, strings: &[String]) {
    let mut chunk = ChunkWriter::start_chunk(ChunkType::TablePackage, w);
    let package_start = chunk.start_chunk;
    w.write_u32::<LittleEndian>(package.id as u32).unwrap();
    write_package_name(w, &package.name);
    let type_strings_at = w.position();
    w.write_u32::<LittleEndian>(0).unwrap();
    w.write_u32::<LittleEndian>(package.types.len() as u32)
        .unwrap();
    let key_strings_at = w.position();
    w.write_u32::<LittleEndian>(0).unwrap();
    w.write_u32::<LittleEndian>(package.keys.len() as u32)
        .unwrap();
    // type id offset
    w.write_u32::<LittleEndian>(0).unwrap();
    chunk.end_header(w);

    patch_u32(w, type_strings_at, (w.position() - package_start) as u32);
    write_string_pool(w, &package.types, &[], false);
    patch_u32(w, key_strings_at, (w.position() - package_start) as u32);
    write_string_pool(w, &package.keys, &[], true);

    for (i, entries) in package.type_entries.iter().enumerate() {
        let mut spec = ChunkWriter::start_chunk(ChunkType::TableTypeSpec, w);
        w.write_u8(i as u8 + 1).unwrap();
        w.write_u8(0).unwrap();
        w.write_u16::<LittleEndian>(0).unwrap();
        w.write_u32::<LittleEndian>(entries.len() as u32).unwrap();
        spec.end_header(w);
        for _ in entries {
            w.write_u32::<LittleEndian>(0).unwrap();
        }
        spec.end_chunk(w);
    }

    if !package.libraries.is_empty() {
        let mut library = ChunkWriter::start_chunk(ChunkType::TableLibrary, w);
        w.write_u32::<LittleEndian>(package.libraries.len() as u32)
            .unwrap();
        library.end_header(w);
        for (id, name) in &package.libraries {
            w.write_u32::<LittleEndian>(*id as u32).unwrap();
            write_package_name(w, name);
        }
        library.end_chunk(w);
    }

    for ((type_index, config), values) in &package.values {
        let entry_keys = &package.type_entries[*type_index];
        write_type(
            w,
            package.layout,
            *type_index as u8 + 1,
            config,
            entry_keys,
            values,
            strings,
        );
    }
    chunk.end_chunk(w);
}

const FLAG_SPARSE: u8 = 0x01;
const FLAG_OFFSET16: u8 = 0x02;
const ENTRY_COMPLEX: u16 = 0x0001;
const ENTRY_COMPACT: u16 = 0x0008;

fn res_value(value: &TestValue, strings: &[String]) -> (u8, u32) {
    match value {
        TestValue::String(s) => (
            ResValueType::String as u8,
            strings.iter().position(|x| x == s).unwrap() as u32,
        ),
        TestValue::Int(i) => (ResValueType::IntDec as u8, *i as u32),
        TestValue::Bool(b) => (
            ResValueType::IntBoolean as u8,
            if *b { 0xffff_ffff } else { 0 },
        ),
        TestValue::Reference(id) => (ResValueType::Reference as u8, *id),
        TestValue::Bag { .. } => unreachable!(),
    }
}

fn write_res_value(w: &mut W, data_type: u8, data: u32) {
    w.write_u16::<LittleEndian>(8).unwrap();
    w.write_u8(0).unwrap();
    w.write_u8(data_type).unwrap();
    w.write_u32::<LittleEndian>(data).unwrap();
}

fn write_type(
    w: &mut W,
    layout: EntryLayout,
    type_id: u8,
    config: &ResTableConfig,
    entry_keys: &[u32],
    values: &BTreeMap<u16, TestValue>,
    strings: &[String],
) {
    let mut chunk = ChunkWriter::start_chunk(ChunkType::TableType, w);
    let flags = match layout {
        EntryLayout::Sparse => FLAG_SPARSE,
        EntryLayout::Offset16 => FLAG_OFFSET16,
        _ => 0,
    };
    w.write_u8(type_id).unwrap();
    w.write_u8(flags).unwrap();
    w.write_u16::<LittleEndian>(0).unwrap();
    let entry_count = if layout == EntryLayout::Sparse {
        values.len()
    } else {
        entry_keys.len()
    };
    w.write_u32::<LittleEndian>(entry_count as u32).unwrap();
    let entries_start_at = w.position();
    w.write_u32::<LittleEndian>(0).unwrap();
    write_config(w, config);
    chunk.end_header(w);

    let offsets_at = w.position();
    let offset_size = if layout == EntryLayout::Offset16 { 2 } else { 4 };
    w.write_all(&vec![0; entry_count * offset_size]).unwrap();
    pad4(w);
    let entries_start = w.position();
    patch_u32(
        w,
        entries_start_at,
        (entries_start - chunk.start_chunk) as u32,
    );

    let mut offsets: HashMap<u16, u32> = HashMap::new();
    for (entry, value) in values {
        offsets.insert(*entry, (w.position() - entries_start) as u32);
        let key = entry_keys[*entry as usize];
        match value {
            TestValue::Bag { parent, items } => {
                w.write_u16::<LittleEndian>(16).unwrap();
                w.write_u16::<LittleEndian>(ENTRY_COMPLEX).unwrap();
                w.write_u32::<LittleEndian>(key).unwrap();
                w.write_u32::<LittleEndian>(*parent).unwrap();
                w.write_u32::<LittleEndian>(items.len() as u32).unwrap();
                for (name, value) in items {
                    w.write_u32::<LittleEndian>(*name).unwrap();
                    write_res_value(w, ResValueType::IntDec as u8, *value as u32);
                }
            }
            value if layout == EntryLayout::Compact => {
                let (data_type, data) = res_value(value, strings);
                w.write_u16::<LittleEndian>(key as u16).unwrap();
                w.write_u16::<LittleEndian>(ENTRY_COMPACT | (data_type as u16) << 8)
                    .unwrap();
                w.write_u32::<LittleEndian>(data).unwrap();
            }
            value => {
                let (data_type, data) = res_value(value, strings);
                w.write_u16::<LittleEndian>(8).unwrap();
                w.write_u16::<LittleEndian>(0).unwrap();
                w.write_u32::<LittleEndian>(key).unwrap();
                write_res_value(w, data_type, data);
            }
        }
    }
    let end = w.position();

    w.seek(SeekFrom::Start(offsets_at)).unwrap();
    match layout {
        EntryLayout::Sparse => {
            for (entry, offset) in values.keys().map(|e| (*e, offsets[e])) {
                w.write_u16::<LittleEndian>(entry).unwrap();
                w.write_u16::<LittleEndian>((offset / 4) as u16).unwrap();
            }
        }
        EntryLayout::Offset16 => {
            for entry in 0..entry_count as u16 {
                let offset = offsets
                    .get(&entry)
                    .map(|o| (o / 4) as u16)
                    .unwrap_or(0xffff);
                w.write_u16::<LittleEndian>(offset).unwrap();
            }
        }
        EntryLayout::Dense | EntryLayout::Compact => {
            for entry in 0..entry_count as u16 {
                let offset = offsets.get(&entry).copied().unwrap_or(0xffff_ffff);
                w.write_u32::<LittleEndian>(offset).unwrap();
            }
        }
    }
    w.seek(SeekFrom::Start(end)).unwrap();
    chunk.end_chunk(w);
}

/// An attribute of a fixture element.
#[derive(Clone, Debug)]
pub struct TestAttr {
    pub namespace: Option<String>,
    pub name: String,
    pub resource_id: Option<u32>,
    pub raw: Option<String>,
    pub data_type: u8,
    pub data: TestData,
}

#[derive(Clone, Debug)]
pub enum TestData {
    /// Index of this string in the pool.
    String(String),
    Raw(u32),
}

impl TestAttr {
    fn new(name: &str, data_type: ResValueType, data: TestData) -> Self {
        Self {
            namespace: Some(ANDROID_NS.to_string()),
            name: name.to_string(),
            resource_id: None,
            raw: None,
            data_type: data_type as u8,
            data,
        }
    }

    pub fn string(name: &str, value: &str) -> Self {
        let mut attr = Self::new(
            name,
            ResValueType::String,
            TestData::String(value.to_string()),
        );
        attr.raw = Some(value.to_string());
        attr
    }

    pub fn int(name: &str, value: i32) -> Self {
        Self::new(name, ResValueType::IntDec, TestData::Raw(value as u32))
    }

    pub fn boolean(name: &str, value: bool) -> Self {
        Self::new(
            name,
            ResValueType::IntBoolean,
            TestData::Raw(if value { 0xffff_ffff } else { 0 }),
        )
    }

    pub fn reference(name: &str, id: u32) -> Self {
        Self::new(name, ResValueType::Reference, TestData::Raw(id))
    }

    pub fn with_id(mut self, id: u32) -> Self {
        self.resource_id = Some(id);
        self
    }

    pub fn without_namespace(mut self) -> Self {
        self.namespace = None;
        self
    }
}

enum Node {
    StartNamespace(String, String),
    EndNamespace(String, String),
    Start(Option<String>, String, Vec<TestAttr>),
    End(Option<String>, String),
    Cdata(String),
}

/// A binary xml document, built in document order.
#[derive(Default)]
pub struct TestXml {
    nodes: Vec<Node>,
}

impl TestXml {
    pub fn android_manifest() -> Self {
        let mut xml = Self::default();
        xml.start_namespace("android", ANDROID_NS);
        xml
    }

    pub fn start_namespace(&mut self, prefix: &str, uri: &str) -> &mut Self {
        self.nodes
            .push(Node::StartNamespace(prefix.to_string(), uri.to_string()));
        self
    }

    pub fn end_namespace(&mut self, prefix: &str, uri: &str) -> &mut Self {
        self.nodes
            .push(Node::EndNamespace(prefix.to_string(), uri.to_string()));
        self
    }

    pub fn start(&mut self, name: &str, attrs: Vec<TestAttr>) -> &mut Self {
        self.nodes.push(Node::Start(None, name.to_string(), attrs));
        self
    }

    pub fn end(&mut self, name: &str) -> &mut Self {
        self.nodes.push(Node::End(None, name.to_string()));
        self
    }

    pub fn cdata(&mut self, text: &str) -> &mut Self {
        self.nodes.push(Node::Cdata(text.to_string()));
        self
    }

    pub fn build(&self) -> Vec<u8> {
        // attribute names with resource ids come first so the resource map
        // lines up with the string pool
        let mut strings: Vec<String> = vec![];
        let mut resource_map = vec![];
        for node in &self.nodes {
            if let Node::Start(_, _, attrs) = node {
                for attr in attrs {
                    if let Some(id) = attr.resource_id {
                        if !strings.contains(&attr.name) {
                            strings.push(attr.name.clone());
                            resource_map.push(id);
                        }
                    }
                }
            }
        }
        // absent strings are written as 0xffffffff
        let mut intern = |s: Option<&str>| match s {
            Some(s) => TestTable::intern(&mut strings, s),
            None => u32::MAX,
        };
        let mut indices = vec![];
        for node in &self.nodes {
            match node {
                Node::StartNamespace(prefix, uri) | Node::EndNamespace(prefix, uri) => {
                    indices.push(vec![intern(Some(prefix.as_str())), intern(Some(uri.as_str()))]);
                }
                Node::Start(ns, name, attrs) => {
                    let mut idx = vec![intern(ns.as_deref()), intern(Some(name.as_str()))];
                    for attr in attrs {
                        idx.push(intern(attr.namespace.as_deref()));
                        idx.push(intern(Some(attr.name.as_str())));
                        idx.push(intern(attr.raw.as_deref()));
                        idx.push(match &attr.data {
                            TestData::String(s) => intern(Some(s.as_str())),
                            TestData::Raw(data) => *data,
                        });
                    }
                    indices.push(idx);
                }
                Node::End(ns, name) => {
                    indices.push(vec![intern(ns.as_deref()), intern(Some(name.as_str()))]);
                }
                Node::Cdata(text) => indices.push(vec![intern(Some(text.as_str()))]),
            }
        }

        let mut w = Cursor::new(vec![]);
        let mut xml = ChunkWriter::start_chunk(ChunkType::Xml, &mut w);
        xml.end_header(&mut w);
        write_string_pool(&mut w, &strings, &[], false);
        if !resource_map.is_empty() {
            let mut chunk = ChunkWriter::start_chunk(ChunkType::XmlResourceMap, &mut w);
            chunk.end_header(&mut w);
            for id in &resource_map {
                w.write_u32::<LittleEndian>(*id).unwrap();
            }
            chunk.end_chunk(&mut w);
        }
        for (line, (node, idx)) in self.nodes.iter().zip(indices).enumerate() {
            let ty = match node {
                Node::StartNamespace(..) => ChunkType::XmlStartNamespace,
                Node::EndNamespace(..) => ChunkType::XmlEndNamespace,
                Node::Start(..) => ChunkType::XmlStartElement,
                Node::End(..) => ChunkType::XmlEndElement,
                Node::Cdata(..) => ChunkType::XmlCdata,
            };
            let mut chunk = ChunkWriter::start_chunk(ty, &mut w);
            w.write_u32::<LittleEndian>(line as u32 + 1).unwrap();
            w.write_u32::<LittleEndian>(u32::MAX).unwrap();
            chunk.end_header(&mut w);
            match node {
                Node::Start(_, _, attrs) => {
                    w.write_u32::<LittleEndian>(idx[0]).unwrap();
                    w.write_u32::<LittleEndian>(idx[1]).unwrap();
                    w.write_u16::<LittleEndian>(20).unwrap();
                    w.write_u16::<LittleEndian>(20).unwrap();
                    w.write_u16::<LittleEndian>(attrs.len() as u16).unwrap();
                    w.write_all(&[0; 6]).unwrap();
                    for (attr, idx) in attrs.iter().zip(idx[2..].chunks(4)) {
                        w.write_u32::<LittleEndian>(idx[0]).unwrap();
                        w.write_u32::<LittleEndian>(idx[1]).unwrap();
                        w.write_u32::<LittleEndian>(idx[2]).unwrap();
                        write_res_value(&mut w, attr.data_type, idx[3]);
                    }
                }
                Node::Cdata(_) => {
                    w.write_u32::<LittleEndian>(idx[0]).unwrap();
                    write_res_value(&mut w, ResValueType::Null as u8, 0);
                }
                _ => {
                    for i in idx {
                        w.write_u32::<LittleEndian>(i).unwrap();
                    }
                }
            }
            chunk.end_chunk(&mut w);
        }
        xml.end_chunk(&mut w);
        w.into_inner()
    }
}
