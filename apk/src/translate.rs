use crate::error::DecodeError;
use crate::res::Value;
use crate::table::ResourceTable;
use crate::xml::{Attribute, XmlEvent};
use anyhow::Result;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;
use std::collections::HashMap;

/// Renders decoded events as indented xml text.
pub struct XmlTranslator<'a> {
    writer: Writer<Vec<u8>>,
    table: Option<&'a ResourceTable>,
    /// uri -> prefixes in scope, innermost last
    prefixes: HashMap<String, Vec<String>>,
    /// namespaces declared since the last element
    declare: Vec<(String, String)>,
    /// start tag that may still turn into an empty element
    pending: Option<BytesStart<'static>>,
}

impl<'a> XmlTranslator<'a> {
    pub fn new(table: Option<&'a ResourceTable>) -> Result<Self> {
        let mut writer = Writer::new_with_indent(Vec::new(), b'\t', 1);
        writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("utf-8"), None)))?;
        Ok(Self {
            writer,
            table,
            prefixes: HashMap::new(),
            declare: vec![],
            pending: None,
        })
    }

    fn qualified(&self, namespace: Option<&str>, name: &str) -> String {
        let prefix = namespace
            .and_then(|uri| self.prefixes.get(uri))
            .and_then(|prefixes| prefixes.last())
            .filter(|prefix| !prefix.is_empty());
        match prefix {
            Some(prefix) => format!("{prefix}:{name}"),
            None => name.to_string(),
        }
    }

    fn value(&self, attr: &Attribute) -> String {
        match &attr.value {
            Value::Reference(id) => self
                .table
                .and_then(|table| table.resource_name((*id).into()))
                .unwrap_or_else(|| attr.value.to_string()),
            Value::Attribute(id) => self
                .table
                .and_then(|table| table.resource_name((*id).into()))
                .map(|name| name.replacen('@', "?", 1))
                .unwrap_or_else(|| attr.value.to_string()),
            value => value.to_string(),
        }
    }

    fn flush(&mut self) -> Result<()> {
        if let Some(start) = self.pending.take() {
            self.writer.write_event(Event::Start(start))?;
        }
        Ok(())
    }

    pub fn event(&mut self, event: &XmlEvent) -> Result<()> {
        match event {
            XmlEvent::StartNamespace { prefix, uri } => {
                self.prefixes
                    .entry(uri.clone())
                    .or_default()
                    .push(prefix.clone());
                self.declare.push((prefix.clone(), uri.clone()));
            }
            XmlEvent::EndNamespace { prefix, uri } => {
                if let Some(prefixes) = self.prefixes.get_mut(uri) {
                    if let Some(i) = prefixes.iter().rposition(|p| p == prefix) {
                        prefixes.remove(i);
                    }
                }
            }
            XmlEvent::StartElement {
                namespace,
                name,
                attributes,
            } => {
                self.flush()?;
                let mut start = BytesStart::new(self.qualified(namespace.as_deref(), name));
                for (prefix, uri) in self.declare.drain(..) {
                    let key = if prefix.is_empty() {
                        "xmlns".to_string()
                    } else {
                        format!("xmlns:{prefix}")
                    };
                    start.push_attribute((key.as_str(), uri.as_str()));
                }
                for attr in attributes {
                    let key = self.qualified(attr.namespace.as_deref(), &attr.name);
                    let value = self.value(attr);
                    start.push_attribute((key.as_str(), value.as_str()));
                }
                self.pending = Some(start);
            }
            XmlEvent::EndElement { namespace, name } => {
                if let Some(start) = self.pending.take() {
                    self.writer.write_event(Event::Empty(start))?;
                } else {
                    let name = self.qualified(namespace.as_deref(), name);
                    self.writer.write_event(Event::End(BytesEnd::new(name)))?;
                }
            }
            XmlEvent::CData { text } => {
                self.flush()?;
                self.writer.write_event(Event::Text(BytesText::new(text)))?;
            }
        }
        Ok(())
    }

    pub fn finish(mut self) -> Result<String> {
        self.flush()?;
        Ok(String::from_utf8(self.writer.into_inner())?)
    }
}

/// Translates a whole event stream, stopping at the first decode error.
pub fn to_xml<I>(events: I, table: Option<&ResourceTable>) -> Result<String>
where
    I: IntoIterator<Item = Result<XmlEvent, DecodeError>>,
{
    let mut translator = XmlTranslator::new(table)?;
    for event in events {
        translator.event(&event?)?;
    }
    translator.finish()
}
