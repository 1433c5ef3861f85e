use anyhow::{Context, Result};
use once_cell::sync::OnceCell;
use std::collections::BTreeSet;
use std::fmt::Write as _;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::sync::{Arc, Mutex};

pub mod archive;
pub mod cert;
mod cursor;
pub mod dex;
pub mod error;
#[cfg(test)]
mod fixtures;
pub mod locale;
pub mod manifest;
pub mod res;
pub mod string_pool;
pub mod table;
pub mod translate;
pub mod xml;

pub use crate::archive::{EntrySource, MemoryEntries, ZipEntries};
pub use crate::cert::CertificateMeta;
pub use crate::dex::DexInfo;
pub use crate::error::DecodeError;
pub use crate::locale::Locale;
pub use crate::manifest::ApkMeta;
pub use crate::res::{ResTableConfig, ResTableRef, Value};
pub use crate::table::ResourceTable;
pub use crate::xml::{BinaryXmlDecoder, XmlEvent};

pub const MANIFEST: &str = "AndroidManifest.xml";
pub const RESOURCES: &str = "resources.arsc";

pub(crate) fn hex(bytes: &[u8]) -> String {
    let mut s = String::with_capacity(bytes.len() * 2);
    for byte in bytes {
        write!(s, "{byte:02x}").ok();
    }
    s
}

#[derive(Clone, Debug)]
pub struct ParserConfig {
    /// Locale used when resolving references into strings.
    pub locale: Locale,
    /// Entries inflating to more than this are refused.
    pub max_entry_size: u64,
}

impl Default for ParserConfig {
    fn default() -> Self {
        Self {
            locale: Locale::en_us(),
            max_entry_size: 256 * 1024 * 1024,
        }
    }
}

/// Lazily decodes the parts of an apk, caching each after first use.
pub struct ApkParser<S> {
    source: Mutex<S>,
    config: ParserConfig,
    table: OnceCell<Arc<ResourceTable>>,
    manifest_xml: OnceCell<String>,
    apk_meta: OnceCell<ApkMeta>,
    certificates: OnceCell<Vec<CertificateMeta>>,
    dex_infos: OnceCell<Vec<DexInfo>>,
}

impl ApkParser<ZipEntries<BufReader<File>>> {
    pub fn open(path: &Path) -> Result<Self> {
        let config = ParserConfig::default();
        let source = ZipEntries::open(path, config.max_entry_size)?;
        Ok(Self::with_config(source, config))
    }
}

impl<S: EntrySource> ApkParser<S> {
    pub fn new(source: S) -> Self {
        Self::with_config(source, ParserConfig::default())
    }

    pub fn with_config(source: S, config: ParserConfig) -> Self {
        Self {
            source: Mutex::new(source),
            config,
            table: OnceCell::new(),
            manifest_xml: OnceCell::new(),
            apk_meta: OnceCell::new(),
            certificates: OnceCell::new(),
            dex_infos: OnceCell::new(),
        }
    }

    pub fn config(&self) -> &ParserConfig {
        &self.config
    }

    /// Raw bytes of an entry, `None` if the apk has no such entry.
    pub fn file_data(&self, path: &str) -> Result<Option<Vec<u8>>> {
        let mut source = self
            .source
            .lock()
            .map_err(|_| anyhow::anyhow!("entry source lock poisoned"))?;
        source.get_entry_bytes(path)
    }

    pub fn entry_names(&self) -> Result<Vec<String>> {
        let mut source = self
            .source
            .lock()
            .map_err(|_| anyhow::anyhow!("entry source lock poisoned"))?;
        source.entry_names()
    }

    fn require(&self, path: &str) -> Result<Vec<u8>> {
        self.file_data(path)?
            .with_context(|| format!("apk has no entry {path}"))
    }

    /// The decoded `resources.arsc`, empty if the apk has none.
    pub fn resource_table(&self) -> Result<Arc<ResourceTable>> {
        self.table
            .get_or_try_init(|| {
                let table = match self.file_data(RESOURCES)? {
                    Some(bytes) => ResourceTable::decode(&bytes)
                        .with_context(|| format!("failed to decode {RESOURCES}"))?,
                    None => {
                        tracing::debug!("apk has no {RESOURCES}");
                        ResourceTable::default()
                    }
                };
                for warning in table.warnings() {
                    tracing::warn!("{RESOURCES}: {warning}");
                }
                Ok(Arc::new(table))
            })
            .cloned()
    }

    /// Locales the resource table carries configurations for.
    pub fn locales(&self) -> Result<BTreeSet<Locale>> {
        Ok(self.resource_table()?.locales().clone())
    }

    pub fn preferred_locale(&self) -> &Locale {
        &self.config.locale
    }

    /// Changes the locale references are resolved with. Only the manifest derived
    /// caches depend on it.
    pub fn set_preferred_locale(&mut self, locale: Locale) {
        if locale != self.config.locale {
            self.config.locale = locale;
            self.manifest_xml.take();
            self.apk_meta.take();
        }
    }

    /// Decoded events of a binary xml entry.
    pub fn xml_events(&self, path: &str) -> Result<Vec<XmlEvent>> {
        let bytes = self.require(path)?;
        let table = self.resource_table()?;
        let events = xml::decode_all(&bytes, Some(&table), &self.config.locale)
            .with_context(|| format!("failed to decode {path}"))?;
        Ok(events)
    }

    /// An xml entry as text, `None` if the apk has no such entry. Entries that are
    /// not binary xml are returned as they are.
    pub fn translate_xml(&self, path: &str) -> Result<Option<String>> {
        let Some(bytes) = self.file_data(path)? else {
            return Ok(None);
        };
        let table = self.resource_table()?;
        let decoder = match BinaryXmlDecoder::new(&bytes, Some(&table), &self.config.locale) {
            Ok(decoder) => decoder,
            Err(DecodeError::NotBinaryXml(tag)) => {
                tracing::debug!("{path} is not binary xml (0x{tag:04x}), reading as text");
                return String::from_utf8(bytes)
                    .map(Some)
                    .with_context(|| format!("{path} is not utf-8"));
            }
            Err(err) => return Err(err).with_context(|| format!("failed to decode {path}")),
        };
        let xml = translate::to_xml(decoder, Some(&table))
            .with_context(|| format!("failed to decode {path}"))?;
        Ok(Some(xml))
    }

    pub fn manifest_xml(&self) -> Result<&str> {
        self.manifest_xml
            .get_or_try_init(|| {
                self.translate_xml(MANIFEST)?
                    .with_context(|| format!("apk has no entry {MANIFEST}"))
            })
            .map(String::as_str)
    }

    pub fn apk_meta(&self) -> Result<&ApkMeta> {
        self.apk_meta.get_or_try_init(|| {
            let bytes = self.require(MANIFEST)?;
            let table = self.resource_table()?;
            let decoder = BinaryXmlDecoder::new(&bytes, Some(&table), &self.config.locale)
                .with_context(|| format!("failed to decode {MANIFEST}"))?;
            ApkMeta::from_events(decoder).with_context(|| format!("failed to decode {MANIFEST}"))
        })
    }

    /// Icon of the application for the preferred locale, as `(path, bytes)`.
    pub fn icon(&self) -> Result<Option<(String, Vec<u8>)>> {
        let Some(path) = self.apk_meta()?.icon.clone() else {
            return Ok(None);
        };
        Ok(self.file_data(&path)?.map(|data| (path, data)))
    }

    /// Signing certificates of the v1 signature, or of the signing block if the apk
    /// has no v1 signature.
    pub fn certificates(&self) -> Result<&[CertificateMeta]> {
        self.certificates
            .get_or_try_init(|| {
                let mut names = self.entry_names()?;
                names.sort();
                if let Some(name) = names.iter().find(|name| cert::is_signature_block(name)) {
                    let der = self.require(name)?;
                    return CertificateMeta::from_pkcs7(&der)
                        .with_context(|| format!("failed to decode {name}"));
                }
                let certs = {
                    let mut source = self
                        .source
                        .lock()
                        .map_err(|_| anyhow::anyhow!("entry source lock poisoned"))?;
                    source.signing_block_certificates()?
                };
                certs
                    .iter()
                    .map(|der| CertificateMeta::from_der(der))
                    .collect::<Result<Vec<_>>>()
                    .context("failed to decode apk signing block certificate")
            })
            .map(Vec::as_slice)
    }

    /// `classes.dex`, `classes2.dex` and so on, stopping at the first missing one.
    pub fn dex_infos(&self) -> Result<&[DexInfo]> {
        self.dex_infos
            .get_or_try_init(|| {
                let mut infos = vec![];
                for i in 1.. {
                    let name = if i == 1 {
                        "classes.dex".to_string()
                    } else {
                        format!("classes{i}.dex")
                    };
                    let Some(bytes) = self.file_data(&name)? else {
                        break;
                    };
                    let info = DexInfo::decode(&bytes)
                        .with_context(|| format!("failed to decode {name}"))?;
                    infos.push(info);
                }
                Ok(infos)
            })
            .map(Vec::as_slice)
    }
}
