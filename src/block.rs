//! Blocks: the smallest decoded units of a .rec file.
//!
//! Every block keeps the exact source bytes it was read from next to its
//! decoded value, so a dump can show both side by side.

use std::borrow::Cow;
use std::io::Read;

use serde::{Serialize, Serializer};
use tracing::trace;

use crate::binary::{decode_uint, render_block, to_hex, ByteSource, RenderOptions};
use crate::error::{RecError, Result};
use crate::packet::Packet;

/// `dissect` followed by `00 04 00 00 00`.
pub const FILE_MAGIC: &[u8; 12] = b"dissect\x00\x04\x00\x00\x00";
/// Width of the length prefix in front of every string.
pub const STRING_LENGTH_WIDTH: u64 = 8;

pub(crate) fn hex_bytes<T: AsRef<[u8]>, S: Serializer>(bytes: &T, s: S) -> std::result::Result<S::Ok, S::Error> {
    s.serialize_str(&to_hex(bytes.as_ref()))
}

// ── Block variants ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StringBlock {
    #[serde(serialize_with = "hex_bytes")]
    pub raw:     Vec<u8>,
    pub length:  u64,
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct KeyValueBlock {
    pub key:   StringBlock,
    pub value: StringBlock,
}

/// One decoded unit of a .rec file.  `raw()` always returns exactly the bytes
/// consumed from the source to build the block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RecBlock {
    Opaque {
        #[serde(serialize_with = "hex_bytes")]
        raw: Vec<u8>,
    },
    Expected {
        #[serde(serialize_with = "hex_bytes")]
        raw: Vec<u8>,
    },
    MagicNumber {
        #[serde(serialize_with = "hex_bytes")]
        raw: Vec<u8>,
    },
    String(StringBlock),
    KeyValue(KeyValueBlock),
    Packet(Packet),
}

/// Structured view of a block's contents.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum BlockValue<'a> {
    Empty,
    Text { length: u64, content: &'a str },
    Pair { key: &'a str, value: &'a str },
    Packet { id: u32, timestamp: u32 },
}

impl RecBlock {
    pub fn raw(&self) -> Cow<'_, [u8]> {
        match self {
            RecBlock::Opaque { raw }
            | RecBlock::Expected { raw }
            | RecBlock::MagicNumber { raw } => Cow::Borrowed(raw),
            RecBlock::String(s) => Cow::Borrowed(&s.raw),
            RecBlock::KeyValue(kv) => {
                let mut joined = kv.key.raw.clone();
                joined.extend_from_slice(&kv.value.raw);
                Cow::Owned(joined)
            }
            RecBlock::Packet(p) => Cow::Borrowed(p.raw()),
        }
    }

    pub fn len(&self) -> usize {
        match self {
            RecBlock::KeyValue(kv) => kv.key.raw.len() + kv.value.raw.len(),
            _ => self.raw().len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn label(&self) -> String {
        match self {
            RecBlock::Opaque { .. } => "Unknown block".to_string(),
            RecBlock::Expected { .. } => "As expected".to_string(),
            RecBlock::MagicNumber { .. } => ".REC file magic number".to_string(),
            RecBlock::String(s) => format!("\"{}\"", s.content),
            RecBlock::KeyValue(kv) => format!("'{}': '{}'", kv.key.content, kv.value.content),
            RecBlock::Packet(p) => p.label(),
        }
    }

    /// Raw bytes plus the human-readable label.
    pub fn describe(&self) -> (Cow<'_, [u8]>, String) {
        (self.raw(), self.label())
    }

    pub fn value(&self) -> BlockValue<'_> {
        match self {
            RecBlock::Opaque { .. } | RecBlock::Expected { .. } | RecBlock::MagicNumber { .. } => {
                BlockValue::Empty
            }
            RecBlock::String(s) => BlockValue::Text { length: s.length, content: &s.content },
            RecBlock::KeyValue(kv) => BlockValue::Pair { key: &kv.key.content, value: &kv.value.content },
            RecBlock::Packet(p) => BlockValue::Packet { id: p.id, timestamp: p.timestamp },
        }
    }

    pub fn render(&self, opts: &RenderOptions) -> String {
        let (raw, label) = self.describe();
        render_block(&raw, &label, opts)
    }

    // ── Parsers ──────────────────────────────────────────────────────────────

    pub fn parse_opaque<R: Read>(src: &mut ByteSource<R>, len: u64) -> Result<Self> {
        Ok(RecBlock::Opaque { raw: src.read_bytes(len)? })
    }

    /// Read `expected.len()` bytes and require them to equal `expected`.
    pub fn parse_expected<R: Read>(src: &mut ByteSource<R>, expected: &[u8]) -> Result<Self> {
        Ok(RecBlock::Expected { raw: read_expected(src, expected)? })
    }

    pub fn parse_magic<R: Read>(src: &mut ByteSource<R>) -> Result<Self> {
        Ok(RecBlock::MagicNumber { raw: read_expected(src, FILE_MAGIC)? })
    }

    pub fn parse_string<R: Read>(src: &mut ByteSource<R>) -> Result<Self> {
        Ok(RecBlock::String(StringBlock::parse(src, STRING_LENGTH_WIDTH)?))
    }

    pub fn parse_key_value<R: Read>(src: &mut ByteSource<R>) -> Result<Self> {
        let key = StringBlock::parse(src, STRING_LENGTH_WIDTH)?;
        let value = StringBlock::parse(src, STRING_LENGTH_WIDTH)?;
        trace!(key = %key.content, value = %value.content, "key-value pair");
        Ok(RecBlock::KeyValue(KeyValueBlock { key, value }))
    }

    pub fn parse_packet<R: Read>(src: &mut ByteSource<R>) -> Result<Self> {
        Ok(RecBlock::Packet(Packet::parse(src)?))
    }
}

fn read_expected<R: Read>(src: &mut ByteSource<R>, expected: &[u8]) -> Result<Vec<u8>> {
    let raw = src.read_bytes(expected.len() as u64)?;
    if raw != expected {
        return Err(RecError::ConstantMismatch {
            expected: to_hex(expected),
            actual:   to_hex(&raw),
        });
    }
    Ok(raw)
}

impl StringBlock {
    /// Length prefix of `width` bytes, then that many UTF-8 bytes.
    pub fn parse<R: Read>(src: &mut ByteSource<R>, width: u64) -> Result<Self> {
        let mut raw = src.read_bytes(width)?;
        let length = decode_uint(&raw)?;
        let offset = src.position();
        let content_bytes = src.read_bytes(length)?;
        raw.extend_from_slice(&content_bytes);
        let content = String::from_utf8(content_bytes)
            .map_err(|source| RecError::Utf8Decode { offset, source })?;
        Ok(Self { raw, length, content })
    }
}

// ── Parse strategies ─────────────────────────────────────────────────────────

/// The closed set of ways a block can be read from a source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockKind<'a> {
    Opaque(u64),
    Expected(&'a [u8]),
    MagicNumber,
    String,
    KeyValue,
    Packet,
}

impl BlockKind<'_> {
    pub fn parse<R: Read>(self, src: &mut ByteSource<R>) -> Result<RecBlock> {
        match self {
            BlockKind::Opaque(len) => RecBlock::parse_opaque(src, len),
            BlockKind::Expected(bytes) => RecBlock::parse_expected(src, bytes),
            BlockKind::MagicNumber => RecBlock::parse_magic(src),
            BlockKind::String => RecBlock::parse_string(src),
            BlockKind::KeyValue => RecBlock::parse_key_value(src),
            BlockKind::Packet => RecBlock::parse_packet(src),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn encode_string(s: &str) -> Vec<u8> {
        let mut out = (s.len() as u64).to_le_bytes().to_vec();
        out.extend_from_slice(s.as_bytes());
        out
    }

    #[test]
    fn magic_number_accepted() {
        let mut src = ByteSource::new(&FILE_MAGIC[..]);
        let block = RecBlock::parse_magic(&mut src).unwrap();
        assert_eq!(block.raw().as_ref(), FILE_MAGIC);
        assert_eq!(block.value(), BlockValue::Empty);
        assert_eq!(block.label(), ".REC file magic number");
    }

    #[test]
    fn magic_number_mismatch_reports_both_values() {
        let mut bad = *FILE_MAGIC;
        bad[0] = b'D';
        let mut src = ByteSource::new(&bad[..]);
        match RecBlock::parse_magic(&mut src) {
            Err(RecError::ConstantMismatch { expected, actual }) => {
                assert!(expected.starts_with("6469"));
                assert!(actual.starts_with("4469"));
            }
            other => panic!("expected mismatch, got {:?}", other),
        }
    }

    #[test]
    fn expected_block_short_input_is_truncation() {
        let mut src = ByteSource::new(&[0xAAu8, 0xBB][..]);
        let err = RecBlock::parse_expected(&mut src, &[0xAA, 0xBB, 0xCC]).unwrap_err();
        assert!(matches!(err, RecError::TruncatedInput { needed: 3, available: 2, .. }));
    }

    #[test]
    fn string_block_roundtrip() {
        let bytes = encode_string("Y8S4");
        let mut src = ByteSource::new(&bytes[..]);
        let block = RecBlock::parse_string(&mut src).unwrap();
        assert_eq!(block.raw().as_ref(), &bytes[..]);
        assert_eq!(block.value(), BlockValue::Text { length: 4, content: "Y8S4" });
        assert_eq!(src.position(), bytes.len() as u64);
    }

    #[test]
    fn string_block_rejects_invalid_utf8() {
        let mut bytes = 2u64.to_le_bytes().to_vec();
        bytes.extend_from_slice(&[0xC3, 0x28]);
        let mut src = ByteSource::new(&bytes[..]);
        let err = RecBlock::parse_string(&mut src).unwrap_err();
        assert!(matches!(err, RecError::Utf8Decode { offset: 8, .. }));
    }

    #[test]
    fn string_block_truncated_payload() {
        let mut bytes = 10u64.to_le_bytes().to_vec();
        bytes.extend_from_slice(b"abc");
        let mut src = ByteSource::new(&bytes[..]);
        let err = RecBlock::parse_string(&mut src).unwrap_err();
        assert!(matches!(err, RecError::TruncatedInput { offset: 8, needed: 10, available: 3 }));
    }

    #[test]
    fn key_value_consumes_two_strings() {
        let mut bytes = encode_string("playerid");
        bytes.extend(encode_string("42"));
        bytes.push(0xFF);
        let mut src = ByteSource::new(&bytes[..]);
        let block = BlockKind::KeyValue.parse(&mut src).unwrap();
        assert_eq!(block.value(), BlockValue::Pair { key: "playerid", value: "42" });
        assert_eq!(block.len(), bytes.len() - 1);
        assert_eq!(block.raw().as_ref(), &bytes[..bytes.len() - 1]);
        assert_eq!(block.label(), "'playerid': '42'");
    }

    #[test]
    fn serializes_raw_as_hex() {
        let block = RecBlock::Opaque { raw: vec![0xDE, 0xAD, 0xBE] };
        let json = serde_json::to_string(&block).unwrap();
        assert_eq!(json, r#"{"kind":"opaque","raw":"DEAD BE"}"#);
    }

    proptest! {
        #[test]
        fn string_parse_returns_input(s in ".{0,64}") {
            let bytes = encode_string(&s);
            let mut src = ByteSource::new(&bytes[..]);
            match RecBlock::parse_string(&mut src).unwrap() {
                RecBlock::String(block) => prop_assert_eq!(block.content, s),
                other => prop_assert!(false, "unexpected block {:?}", other),
            }
        }

        #[test]
        fn expected_constant_accepts_only_itself(
            expected in proptest::collection::vec(any::<u8>(), 1..24),
            other in proptest::collection::vec(any::<u8>(), 1..24),
        ) {
            let mut src = ByteSource::new(&expected[..]);
            prop_assert!(RecBlock::parse_expected(&mut src, &expected).is_ok());

            let mut src = ByteSource::new(&other[..]);
            let result = RecBlock::parse_expected(&mut src, &expected);
            if other.len() < expected.len() {
                prop_assert!(matches!(result, Err(RecError::TruncatedInput { .. })), "short input must truncate");
            } else if other[..expected.len()] != expected[..] {
                prop_assert!(matches!(result, Err(RecError::ConstantMismatch { .. })), "different bytes must mismatch");
            } else {
                prop_assert!(result.is_ok());
            }
        }
    }
}
