use anyhow::{Context, Result};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufReader, Read, Seek};
use std::path::Path;
use zip::result::ZipError;
use zip::ZipArchive;

/// Something that yields the raw bytes of apk entries by path.
pub trait EntrySource {
    /// Returns `None` if there is no entry at `path`.
    fn get_entry_bytes(&mut self, path: &str) -> Result<Option<Vec<u8>>>;

    fn entry_names(&mut self) -> Result<Vec<String>>;

    /// Der certificates from the apk signing block, if the source has access to the
    /// raw archive.
    fn signing_block_certificates(&mut self) -> Result<Vec<Vec<u8>>> {
        Ok(vec![])
    }
}

/// Entries of a zip archive, refusing to inflate any entry above `max_entry_size`.
pub struct ZipEntries<R> {
    zip: ZipArchive<R>,
    max_entry_size: u64,
    signing_block: Vec<Vec<u8>>,
}

impl ZipEntries<BufReader<File>> {
    pub fn open(path: &Path, max_entry_size: u64) -> Result<Self> {
        let file = File::open(path).with_context(|| format!("failed to open {}", path.display()))?;
        Self::new(BufReader::new(file), max_entry_size)
            .with_context(|| format!("failed to read {} as a zip archive", path.display()))
    }
}

impl<R: Read + Seek> ZipEntries<R> {
    pub fn new(mut reader: R, max_entry_size: u64) -> Result<Self> {
        let signing_block = match crate::cert::read_signing_block_certificates(&mut reader) {
            Ok(certs) => certs,
            Err(err) => {
                tracing::warn!("ignoring unreadable apk signing block: {err:#}");
                vec![]
            }
        };
        reader.rewind()?;
        Ok(Self {
            zip: ZipArchive::new(reader)?,
            max_entry_size,
            signing_block,
        })
    }
}

impl<R: Read + Seek> EntrySource for ZipEntries<R> {
    fn get_entry_bytes(&mut self, path: &str) -> Result<Option<Vec<u8>>> {
        let entry = match self.zip.by_name(path) {
            Ok(entry) => entry,
            Err(ZipError::FileNotFound) => return Ok(None),
            Err(err) => return Err(err).with_context(|| format!("failed to read entry {path}")),
        };
        if entry.size() > self.max_entry_size {
            anyhow::bail!(
                "entry {path} is {} bytes, more than the limit of {}",
                entry.size(),
                self.max_entry_size
            );
        }
        tracing::trace!("reading {path}: {} bytes", entry.size());
        let mut data = Vec::with_capacity(entry.size() as usize);
        // the declared size is not trusted
        entry
            .take(self.max_entry_size + 1)
            .read_to_end(&mut data)
            .with_context(|| format!("failed to inflate entry {path}"))?;
        if data.len() as u64 > self.max_entry_size {
            anyhow::bail!(
                "entry {path} exceeds the limit of {} bytes",
                self.max_entry_size
            );
        }
        Ok(Some(data))
    }

    fn entry_names(&mut self) -> Result<Vec<String>> {
        Ok(self.zip.file_names().map(str::to_string).collect())
    }

    fn signing_block_certificates(&mut self) -> Result<Vec<Vec<u8>>> {
        Ok(self.signing_block.clone())
    }
}

/// Entries held in memory.
#[derive(Clone, Debug, Default)]
pub struct MemoryEntries {
    entries: BTreeMap<String, Vec<u8>>,
}

impl MemoryEntries {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, path: impl Into<String>, data: impl Into<Vec<u8>>) {
        self.entries.insert(path.into(), data.into());
    }
}

impl FromIterator<(String, Vec<u8>)> for MemoryEntries {
    fn from_iter<T: IntoIterator<Item = (String, Vec<u8>)>>(iter: T) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}

impl EntrySource for MemoryEntries {
    fn get_entry_bytes(&mut self, path: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.entries.get(path).cloned())
    }

    fn entry_names(&mut self) -> Result<Vec<String>> {
        Ok(self.entries.keys().cloned().collect())
    }
}
