use crate::cursor::ByteCursor;
use crate::error::{DecodeError, Result};
use crate::locale::Locale;
use crate::res::{ChunkType, ResChunkHeader, ResTableRef, ResValue, Value};
use crate::string_pool::StringPool;
use crate::table::ResourceTable;
use std::iter::FusedIterator;

/// Line number and comment precede every node.
const NODE_HEADER_SIZE: usize = 16;
const ATTRIBUTE_SIZE: usize = 20;
const NO_STRING: u32 = 0xffff_ffff;

#[derive(Clone, Debug, PartialEq)]
pub struct Attribute {
    pub namespace: Option<String>,
    pub name: String,
    /// Framework attribute id from the resource map.
    pub resource_id: Option<ResTableRef>,
    pub raw: Option<String>,
    pub typed: Value,
    /// `raw` if present, otherwise `typed` with references resolved.
    pub value: Value,
}

impl Attribute {
    pub fn is_android(&self) -> bool {
        self.namespace.as_deref() == Some(ANDROID_NS)
    }
}

pub const ANDROID_NS: &str = "http://schemas.android.com/apk/res/android";

#[derive(Clone, Debug, PartialEq)]
pub enum XmlEvent {
    StartNamespace {
        prefix: String,
        uri: String,
    },
    EndNamespace {
        prefix: String,
        uri: String,
    },
    StartElement {
        namespace: Option<String>,
        name: String,
        attributes: Vec<Attribute>,
    },
    EndElement {
        namespace: Option<String>,
        name: String,
    },
    CData {
        text: String,
    },
}

/// Streams the nodes of a binary xml document in file order.
///
/// Attribute references are resolved through `table` for `locale`. The first
/// structural error is returned once, after which the iterator is exhausted.
pub struct BinaryXmlDecoder<'a> {
    cursor: ByteCursor<'a>,
    strings: StringPool,
    resource_map: Vec<u32>,
    table: Option<&'a ResourceTable>,
    locale: Locale,
    next: usize,
    end: usize,
    done: bool,
}

impl<'a> BinaryXmlDecoder<'a> {
    pub fn new(bytes: &'a [u8], table: Option<&'a ResourceTable>, locale: &Locale) -> Result<Self> {
        if bytes.len() < 2 {
            let tag = bytes.first().copied().unwrap_or_default();
            return Err(DecodeError::NotBinaryXml(tag.into()));
        }
        let mut cursor = ByteCursor::new(bytes);
        let tag = cursor.read_u16()?;
        if tag != ChunkType::Xml as u16 {
            return Err(DecodeError::NotBinaryXml(tag));
        }
        cursor.seek(0)?;
        let header = ResChunkHeader::read(&mut cursor, bytes.len())?;
        let mut decoder = Self {
            cursor,
            strings: StringPool::default(),
            resource_map: vec![],
            table,
            locale: locale.clone(),
            next: header.body(),
            end: header.end(),
            done: false,
        };
        // string pool and resource map precede the first node
        while decoder.next < decoder.end {
            decoder.cursor.seek(decoder.next)?;
            let chunk = ResChunkHeader::read(&mut decoder.cursor, decoder.end)?;
            match chunk.chunk_type() {
                Some(ChunkType::StringPool) => {
                    decoder.strings = StringPool::read(&mut decoder.cursor, &chunk)?;
                }
                Some(ChunkType::XmlResourceMap) => decoder.read_resource_map(&chunk)?,
                _ => break,
            }
            decoder.next = chunk.end();
        }
        Ok(decoder)
    }

    fn read_resource_map(&mut self, header: &ResChunkHeader) -> Result<()> {
        let count = (header.end() - header.body()) / 4;
        self.cursor.seek(header.body())?;
        self.resource_map = (0..count)
            .map(|_| self.cursor.read_u32())
            .collect::<Result<_>>()?;
        Ok(())
    }

    fn string(&self, index: u32) -> Option<String> {
        if index == NO_STRING {
            return None;
        }
        self.strings.get(index).map(str::to_string)
    }

    fn read_event(&mut self) -> Result<Option<XmlEvent>> {
        self.cursor.seek(self.next)?;
        let header = ResChunkHeader::read(&mut self.cursor, self.end)?;
        self.next = header.end();
        let ty = match header.chunk_type() {
            Some(
                ty @ (ChunkType::XmlStartNamespace
                | ChunkType::XmlEndNamespace
                | ChunkType::XmlStartElement
                | ChunkType::XmlEndElement
                | ChunkType::XmlCdata),
            ) => ty,
            Some(ChunkType::StringPool) => {
                self.strings = StringPool::read(&mut self.cursor, &header)?;
                return Ok(None);
            }
            Some(ChunkType::XmlResourceMap) => {
                self.read_resource_map(&header)?;
                return Ok(None);
            }
            _ => {
                tracing::debug!("skipping chunk 0x{:04x} at {}", header.ty, header.offset);
                return Ok(None);
            }
        };
        header.expect_header_size(NODE_HEADER_SIZE)?;
        self.cursor.seek(header.offset + ResChunkHeader::SIZE)?;
        let line = self.cursor.read_u32()?;
        self.cursor.seek(header.body())?;
        tracing::trace!("{ty:?} at line {line}");

        let event = match ty {
            ChunkType::XmlStartNamespace | ChunkType::XmlEndNamespace => {
                let prefix = self.cursor.read_u32()?;
                let uri = self.cursor.read_u32()?;
                let prefix = self.string(prefix).unwrap_or_default();
                let uri = self.string(uri).unwrap_or_default();
                if ty == ChunkType::XmlStartNamespace {
                    XmlEvent::StartNamespace { prefix, uri }
                } else {
                    XmlEvent::EndNamespace { prefix, uri }
                }
            }
            ChunkType::XmlStartElement => self.read_start_element(&header)?,
            ChunkType::XmlEndElement => {
                let namespace = self.cursor.read_u32()?;
                let name = self.cursor.read_u32()?;
                XmlEvent::EndElement {
                    namespace: self.string(namespace),
                    name: self.string(name).unwrap_or_default(),
                }
            }
            _ => {
                let text = self.cursor.read_u32()?;
                let _typed = ResValue::read(&mut self.cursor)?;
                XmlEvent::CData {
                    text: self.string(text).unwrap_or_default(),
                }
            }
        };
        if self.cursor.position() > header.end() {
            return Err(DecodeError::malformed(
                header.offset,
                "node extends past the end of its chunk",
            ));
        }
        Ok(Some(event))
    }

    fn read_start_element(&mut self, header: &ResChunkHeader) -> Result<XmlEvent> {
        let start = self.cursor.position();
        let namespace = self.cursor.read_u32()?;
        let name = self.cursor.read_u32()?;
        let attribute_start = self.cursor.read_u16()? as usize;
        let attribute_size = self.cursor.read_u16()? as usize;
        let attribute_count = self.cursor.read_u16()? as usize;
        let _id_index = self.cursor.read_u16()?;
        let _class_index = self.cursor.read_u16()?;
        let _style_index = self.cursor.read_u16()?;
        if attribute_count > 0 && attribute_size < ATTRIBUTE_SIZE {
            return Err(DecodeError::malformed(
                header.offset,
                format!("attributes of {attribute_size} bytes"),
            ));
        }
        let attributes_start = start + attribute_start;
        if attributes_start + attribute_count * attribute_size > header.end() {
            return Err(DecodeError::malformed(
                header.offset,
                format!("{attribute_count} attributes don't fit the element"),
            ));
        }
        let mut attributes = Vec::with_capacity(attribute_count);
        for i in 0..attribute_count {
            self.cursor.seek(attributes_start + i * attribute_size)?;
            attributes.push(self.read_attribute()?);
        }
        Ok(XmlEvent::StartElement {
            namespace: self.string(namespace),
            name: self.string(name).unwrap_or_default(),
            attributes,
        })
    }

    fn read_attribute(&mut self) -> Result<Attribute> {
        let namespace = self.cursor.read_u32()?;
        let name_index = self.cursor.read_u32()?;
        let raw = self.cursor.read_u32()?;
        let typed = ResValue::read(&mut self.cursor)?;

        let resource_id = self
            .resource_map
            .get(name_index as usize)
            .map(|id| ResTableRef::from(*id));
        let mut name = self.string(name_index).unwrap_or_default();
        if name.is_empty() {
            if let Some(id) = resource_id {
                name = self
                    .table
                    .and_then(|table| table.entry(id.into()))
                    .map(|entry| entry.key.clone())
                    .unwrap_or_else(|| id.to_string());
            }
        }
        let raw = self.string(raw);
        let typed = Value::from_res_value(typed, &self.strings).unwrap_or(Value::Null);
        let value = match (&raw, &typed) {
            (Some(raw), _) => Value::String(raw.clone()),
            (None, Value::Reference(id)) => self.resolve(*id).unwrap_or_else(|| typed.clone()),
            (None, _) => typed.clone(),
        };
        Ok(Attribute {
            namespace: self.string(namespace),
            name,
            resource_id,
            raw,
            typed,
            value,
        })
    }

    fn resolve(&self, id: ResTableRef) -> Option<Value> {
        match self.table?.resolve(id.into(), &self.locale)? {
            Value::Complex { .. } => None,
            value => Some(value.clone()),
        }
    }
}

impl Iterator for BinaryXmlDecoder<'_> {
    type Item = Result<XmlEvent>;

    fn next(&mut self) -> Option<Self::Item> {
        while !self.done {
            if self.next >= self.end {
                self.done = true;
                break;
            }
            match self.read_event() {
                Ok(Some(event)) => return Some(Ok(event)),
                Ok(None) => {}
                Err(err) => {
                    self.done = true;
                    return Some(Err(err));
                }
            }
        }
        None
    }
}

impl FusedIterator for BinaryXmlDecoder<'_> {}

/// Decodes a whole document.
pub fn decode_all(
    bytes: &[u8],
    table: Option<&ResourceTable>,
    locale: &Locale,
) -> Result<Vec<XmlEvent>> {
    BinaryXmlDecoder::new(bytes, table, locale)?.collect()
}
