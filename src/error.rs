use std::fmt;
use std::io;
use thiserror::Error;

/// Structural decode failures.  Every variant aborts the current parse;
/// none of them are worth retrying against the same bytes.
#[derive(Error, Debug)]
pub enum RecError {
    #[error("Byte string {hex} has length {len}; expected 2, 4 or 8 bytes")]
    LengthMismatch { len: usize, hex: String },
    #[error("Received bytes ({actual}) did not match expected bytes ({expected})")]
    ConstantMismatch { expected: String, actual: String },
    #[error("Truncated input at offset {offset}: needed {needed} bytes, {available} available")]
    TruncatedInput { offset: u64, needed: u64, available: u64 },
    #[error("String payload at offset {offset} is not valid UTF-8: {source}")]
    Utf8Decode {
        offset: u64,
        #[source]
        source: std::string::FromUtf8Error,
    },
    #[error("Unsupported configuration: {0}")]
    UnsupportedConfiguration(String),
    #[error("No zstd magic number found in {searched} bytes")]
    MagicNumberNotFound { searched: usize },
    #[error("Corrupt zstd frame at offset {offset}: {reason}")]
    CorruptFrame { offset: usize, reason: String },
    #[error("Decompression error: {0}")]
    Decompression(String),
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

pub type Result<T> = std::result::Result<T, RecError>;

// ── Integrity warnings ───────────────────────────────────────────────────────

/// A non-fatal sanity check that did not hold.  Returned next to a
/// successful result; the caller decides whether to stop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IntegrityWarning {
    pub message:  String,
    pub expected: Option<String>,
    pub actual:   Option<String>,
}

impl IntegrityWarning {
    pub fn new(message: impl Into<String>) -> Self {
        Self { message: message.into(), expected: None, actual: None }
    }

    pub fn with_values(message: impl Into<String>, expected: String, actual: String) -> Self {
        Self { message: message.into(), expected: Some(expected), actual: Some(actual) }
    }
}

impl fmt::Display for IntegrityWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "WARNING: {}", self.message)?;
        if let Some(expected) = &self.expected {
            write!(f, "\nExpected Value:\t\t{}", expected)?;
        }
        if let Some(actual) = &self.actual {
            write!(f, "\nActual Value:\t\t{}", actual)?;
        }
        Ok(())
    }
}
