//! Locate where the last zstd frame in a buffer ends.
//!
//! A raw .rec payload is a zstd stream with a footer appended.  The
//! decompressor rejects trailing garbage, so the footer has to be cut off
//! first.  The scanner:
//!
//! 1. searches backwards for the rightmost frame magic number,
//! 2. sizes the frame header,
//! 3. walks the 3-byte block headers until one has the last-block bit set,
//! 4. adds the optional content checksum.
//!
//! The resulting offset is the first byte after the frame.

use tracing::{debug, trace};

use crate::error::{RecError, Result};
use crate::frame::header::{FrameFormat, Zstd};

pub const ZSTD_MAGIC: [u8; 4] = [0x28, 0xB5, 0x2F, 0xFD];
/// Bytes handed to the header sizer, starting at the magic number.
pub const HEADER_PROBE_LEN: usize = 25;
pub const BLOCK_HEADER_SIZE: usize = 3;

// ── Block headers ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockType {
    Raw,
    Rle,
    Compressed,
    Reserved,
}

impl From<u8> for BlockType {
    fn from(bits: u8) -> Self {
        match bits & 0x03 {
            0 => BlockType::Raw,
            1 => BlockType::Rle,
            2 => BlockType::Compressed,
            _ => BlockType::Reserved,
        }
    }
}

/// A decoded 3-byte block header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockHeader {
    pub last_block: bool,
    pub block_type: BlockType,
    pub block_size: u32,
}

impl BlockHeader {
    /// bit 0: last block, bits 1-2: type, bits 3-23: size.
    pub fn parse(bytes: [u8; BLOCK_HEADER_SIZE]) -> Self {
        let word = u32::from_le_bytes([bytes[0], bytes[1], bytes[2], 0]);
        Self {
            last_block: word & 0x01 == 0x01,
            block_type: BlockType::from((word >> 1) as u8),
            block_size: word >> 3,
        }
    }

    /// Bytes of block content following this header.  RLE blocks store a
    /// single byte regardless of their declared (regenerated) size.
    pub fn content_len(&self) -> Option<usize> {
        match self.block_type {
            BlockType::Raw | BlockType::Compressed => Some(self.block_size as usize),
            BlockType::Rle => Some(1),
            BlockType::Reserved => None,
        }
    }
}

// ── Boundary ──────────────────────────────────────────────────────────────────

/// Where the last frame sits in the scanned buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameBoundary {
    pub magic_offset: usize,
    pub header_size:  usize,
    /// Offset of each block header together with its decoded value.
    pub blocks:       Vec<(usize, BlockHeader)>,
    /// First byte after the frame.
    pub end:          usize,
}

/// Offset of the rightmost zstd magic number, probing one byte at a time
/// from the end of the buffer.
pub fn find_last_magic(buf: &[u8]) -> Option<usize> {
    buf.windows(ZSTD_MAGIC.len()).rposition(|w| w == ZSTD_MAGIC)
}

pub fn find_frame_end(buf: &[u8]) -> Result<FrameBoundary> {
    find_frame_end_with(buf, &Zstd)
}

/// Walk the last frame in `buf` using `format` to size its header.
pub fn find_frame_end_with<F: FrameFormat>(buf: &[u8], format: &F) -> Result<FrameBoundary> {
    let magic_offset = find_last_magic(buf)
        .ok_or(RecError::MagicNumberNotFound { searched: buf.len() })?;
    debug!(magic_offset, "found last frame magic number");

    let probe = &buf[magic_offset..buf.len().min(magic_offset + HEADER_PROBE_LEN)];
    let header_size = format.frame_header_size(probe).map_err(|e| rebase(e, magic_offset))?;

    let mut cursor = magic_offset + header_size;
    let mut blocks = Vec::new();
    loop {
        let raw: [u8; BLOCK_HEADER_SIZE] = buf
            .get(cursor..cursor + BLOCK_HEADER_SIZE)
            .and_then(|s| s.try_into().ok())
            .ok_or_else(|| RecError::CorruptFrame {
                offset: cursor,
                reason: "block header runs past the end of the buffer".to_string(),
            })?;
        let header = BlockHeader::parse(raw);
        trace!(cursor, ?header, "block header");

        let content = header.content_len().ok_or_else(|| RecError::CorruptFrame {
            offset: cursor,
            reason: "reserved block type".to_string(),
        })?;
        blocks.push((cursor, header));
        cursor += BLOCK_HEADER_SIZE + content;

        if cursor > buf.len() {
            return Err(RecError::CorruptFrame {
                offset: cursor,
                reason: format!("block content ends {} bytes past the buffer", cursor - buf.len()),
            });
        }
        if header.last_block {
            break;
        }
    }

    let end = cursor + format.trailer_size(probe).map_err(|e| rebase(e, magic_offset))?;
    if end > buf.len() {
        return Err(RecError::CorruptFrame {
            offset: cursor,
            reason: "content checksum runs past the end of the buffer".to_string(),
        });
    }
    debug!(end, blocks = blocks.len(), trailing = buf.len() - end, "frame boundary");

    Ok(FrameBoundary { magic_offset, header_size, blocks, end })
}

/// Header sizers report offsets relative to the magic number.
fn rebase(err: RecError, base: usize) -> RecError {
    match err {
        RecError::TruncatedInput { offset, needed, available } => RecError::TruncatedInput {
            offset: offset + base as u64,
            needed,
            available,
        },
        RecError::CorruptFrame { offset, reason } => RecError::CorruptFrame { offset: offset + base, reason },
        other => other,
    }
}
