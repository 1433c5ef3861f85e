use anyhow::Result;
use byteorder::{LittleEndian, ReadBytesExt};
use rasn_cms::{CertificateChoices, ContentInfo, SignedData, CONTENT_SIGNED_DATA};
use rasn_pkix::{Certificate, Time};
use serde::Serialize;
use sha2::{Digest as _, Sha256};
use std::io::{Cursor, Read, Seek, SeekFrom};

const APK_SIGNING_BLOCK_MAGIC: &[u8] = b"APK Sig Block 42";
const APK_SIGNING_BLOCK_V2_ID: u32 = 0x7109871a;
const APK_SIGNING_BLOCK_V3_ID: u32 = 0xf05368c0;
const EOCD_SIGNATURE: u32 = 0x06054b50;
const EOCD_SIZE: u64 = 22;

/// Summary of one signing certificate. Nothing here is verified.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CertificateMeta {
    pub serial: String,
    /// Dotted object identifier of the signature algorithm.
    pub signature_algorithm: String,
    pub not_before: String,
    pub not_after: String,
    pub sha256_fingerprint: String,
    #[serde(skip)]
    pub der: Vec<u8>,
}

impl CertificateMeta {
    pub fn from_der(der: &[u8]) -> Result<Self> {
        let cert =
            rasn::der::decode::<Certificate>(der).map_err(|err| anyhow::anyhow!("{}", err))?;
        Self::new(&cert, der.to_vec())
    }

    fn new(cert: &Certificate, der: Vec<u8>) -> Result<Self> {
        let tbs = &cert.tbs_certificate;
        let serial = rasn::der::encode(&tbs.serial_number)
            .map_err(|err| anyhow::anyhow!("{}", err))?;
        Ok(Self {
            serial: crate::hex(der_contents(&serial)),
            signature_algorithm: cert
                .signature_algorithm
                .algorithm
                .iter()
                .map(|arc| arc.to_string())
                .collect::<Vec<_>>()
                .join("."),
            not_before: format_time(&tbs.validity.not_before),
            not_after: format_time(&tbs.validity.not_after),
            sha256_fingerprint: crate::hex(&Sha256::digest(&der)),
            der,
        })
    }

    /// Certificates embedded in a v1 signature block (`META-INF/*.RSA` and friends).
    pub fn from_pkcs7(der: &[u8]) -> Result<Vec<Self>> {
        let info =
            rasn::der::decode::<ContentInfo>(der).map_err(|err| anyhow::anyhow!("{}", err))?;
        anyhow::ensure!(
            CONTENT_SIGNED_DATA == info.content_type,
            "signature block is not pkcs7 signed data"
        );
        let data = rasn::der::decode::<SignedData>(info.content.as_bytes())
            .map_err(|err| anyhow::anyhow!("{}", err))?;
        let mut certificates = vec![];
        for choice in data
            .certificates
            .map(|set| set.to_vec().into_iter().cloned().collect::<Vec<_>>())
            .unwrap_or_default() {
            match choice {
                CertificateChoices::Certificate(cert) => {
                    let der =
                        rasn::der::encode(&*cert).map_err(|err| anyhow::anyhow!("{}", err))?;
                    certificates.push(Self::new(&cert, der)?);
                }
                _ => tracing::debug!("skipping non x509 certificate choice"),
            }
        }
        Ok(certificates)
    }
}

/// Strips the tag and length of a der encoded value.
fn der_contents(der: &[u8]) -> &[u8] {
    let Some(&len) = der.get(1) else {
        return &[];
    };
    let start = if len & 0x80 == 0 {
        2
    } else {
        2 + (len & 0x7f) as usize
    };
    der.get(start..).unwrap_or_default()
}

fn format_time(time: &Time) -> String {
    match time {
        Time::Utc(time) => time.to_rfc3339(),
        Time::General(time) => time.to_rfc3339(),
    }
}

/// Whether `path` names a v1 signature block.
pub fn is_signature_block(path: &str) -> bool {
    let Some(name) = path.strip_prefix("META-INF/") else {
        return false;
    };
    if name.contains('/') {
        return false;
    }
    let upper = name.to_ascii_uppercase();
    [".RSA", ".DSA", ".EC"]
        .iter()
        .any(|ext| upper.ends_with(ext))
}

/// Finds the start of the zip central directory from the end of central directory
/// record.
fn central_directory_start<R: Read + Seek>(r: &mut R) -> Result<u64> {
    let len = r.seek(SeekFrom::End(0))?;
    anyhow::ensure!(len >= EOCD_SIZE, "file is too small to be a zip archive");
    // the record is followed by a comment of at most 64k
    let search = std::cmp::min(len, EOCD_SIZE + u16::MAX as u64);
    r.seek(SeekFrom::Start(len - search))?;
    let mut tail = vec![0; search as usize];
    r.read_exact(&mut tail)?;
    for pos in (0..=tail.len() - EOCD_SIZE as usize).rev() {
        let mut record = &tail[pos..];
        if record.read_u32::<LittleEndian>()? != EOCD_SIGNATURE {
            continue;
        }
        let mut record = &tail[pos + 16..];
        let cd_start = record.read_u32::<LittleEndian>()? as u64;
        anyhow::ensure!(
            cd_start <= len - search + pos as u64,
            "central directory offset is out of bounds"
        );
        return Ok(cd_start);
    }
    anyhow::bail!("no end of central directory record found")
}

/// Returns the raw id-value pairs of the apk signing block, which sits right before
/// the central directory. An apk without one yields an empty list.
fn read_signing_block<R: Read + Seek>(r: &mut R) -> Result<Vec<(u32, Vec<u8>)>> {
    let cd_start = central_directory_start(r)?;
    if cd_start < 16 + 8 {
        return Ok(vec![]);
    }
    r.seek(SeekFrom::Start(cd_start - 16 - 8))?;
    let size = r.read_u64::<LittleEndian>()?;
    let mut magic = [0; 16];
    r.read_exact(&mut magic)?;
    if magic != APK_SIGNING_BLOCK_MAGIC {
        return Ok(vec![]);
    }
    anyhow::ensure!(
        size >= 24 && size <= cd_start - 8,
        "invalid apk signing block size {size}"
    );
    r.seek(SeekFrom::Start(cd_start - size))?;
    let mut block = vec![0; size as usize - 24];
    r.read_exact(&mut block)?;

    let mut pairs = vec![];
    let mut r = Cursor::new(&block[..]);
    while (r.position() as usize) < block.len() {
        let length = r.read_u64::<LittleEndian>()?;
        anyhow::ensure!(length >= 4, "invalid signing block pair length {length}");
        let id = r.read_u32::<LittleEndian>()?;
        let value = read_exact_vec(&mut r, length - 4)?;
        pairs.push((id, value));
    }
    Ok(pairs)
}

fn read_exact_vec(r: &mut Cursor<&[u8]>, len: u64) -> Result<Vec<u8>> {
    let remaining = r.get_ref().len() as u64 - r.position();
    anyhow::ensure!(
        len <= remaining,
        "length {len} exceeds the {remaining} remaining bytes"
    );
    let mut buf = vec![0; len as usize];
    r.read_exact(&mut buf)?;
    Ok(buf)
}

/// Reads a u32 length prefixed sequence.
fn read_prefixed<'a>(r: &mut Cursor<&'a [u8]>) -> Result<&'a [u8]> {
    let len = r.read_u32::<LittleEndian>()? as u64;
    let start = r.position();
    let data: &'a [u8] = *r.get_ref();
    anyhow::ensure!(
        len <= data.len() as u64 - start,
        "length {len} exceeds the {} remaining bytes",
        data.len() as u64 - start
    );
    r.set_position(start + len);
    Ok(&data[start as usize..(start + len) as usize])
}

/// Collects the der certificates of every signer in a v2 or v3 signature scheme block.
fn read_scheme_certificates(block: &[u8]) -> Result<Vec<Vec<u8>>> {
    let mut certificates = vec![];
    let mut r = Cursor::new(block);
    let signers = read_prefixed(&mut r)?;
    let mut signers = Cursor::new(signers);
    while (signers.position() as usize) < signers.get_ref().len() {
        let signer = read_prefixed(&mut signers)?;
        let mut signer = Cursor::new(signer);
        let signed_data = read_prefixed(&mut signer)?;
        let mut signed_data = Cursor::new(signed_data);
        let _digests = read_prefixed(&mut signed_data)?;
        let certs = read_prefixed(&mut signed_data)?;
        let mut certs = Cursor::new(certs);
        while (certs.position() as usize) < certs.get_ref().len() {
            certificates.push(read_prefixed(&mut certs)?.to_vec());
        }
    }
    Ok(certificates)
}

/// Der certificates of the v2 signature scheme block, falling back to v3.
pub fn read_signing_block_certificates<R: Read + Seek>(r: &mut R) -> Result<Vec<Vec<u8>>> {
    let pairs = read_signing_block(r)?;
    for scheme in [APK_SIGNING_BLOCK_V2_ID, APK_SIGNING_BLOCK_V3_ID] {
        if let Some((_, block)) = pairs.iter().find(|(id, _)| *id == scheme) {
            tracing::debug!("reading certificates from signing block 0x{:x}", scheme);
            return read_scheme_certificates(block);
        }
    }
    for (id, _) in &pairs {
        tracing::debug!("unknown signing block 0x{:x}", id);
    }
    Ok(vec![])
}
