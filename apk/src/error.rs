use thiserror::Error;

/// Failure decoding one of the binary formats stored inside an apk.
///
/// Resources that are simply not present are never reported through this type;
/// lookups return `Option` for that.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum DecodeError {
    #[error("truncated data: {needed} bytes requested at offset {offset}, {available} available")]
    TruncatedData {
        offset: usize,
        needed: usize,
        available: usize,
    },
    #[error("malformed chunk at offset {offset}: {reason}")]
    MalformedChunk { offset: usize, reason: String },
    #[error("unsupported string pool encoding flags 0x{0:x}")]
    UnsupportedEncoding(u32),
    #[error("invalid string data at offset {offset}")]
    InvalidString { offset: usize },
    #[error("not a binary xml document (leading chunk type 0x{0:04x})")]
    NotBinaryXml(u16),
    #[error("not a resource table (leading chunk type 0x{0:04x})")]
    NotResourceTable(u16),
    #[error("invalid dex file: {0}")]
    InvalidDex(String),
}

impl DecodeError {
    pub(crate) fn malformed(offset: usize, reason: impl Into<String>) -> Self {
        Self::MalformedChunk {
            offset,
            reason: reason.into(),
        }
    }

    /// True if the input is not in the format that was asked for, as opposed to
    /// being in that format but corrupt.
    pub fn is_wrong_format(&self) -> bool {
        matches!(self, Self::NotBinaryXml(_) | Self::NotResourceTable(_))
    }
}

pub type Result<T, E = DecodeError> = std::result::Result<T, E>;
