//! Byte-level primitives shared by every decoder in the crate.
//!
//! All multi-byte integers in a .rec file are little-endian and exactly 2, 4
//! or 8 bytes wide.  Readers never seek backwards: [`ByteSource`] wraps any
//! `Read` and tracks the absolute offset so errors can point at the byte
//! where decoding stopped.

use std::io::Read;

use byteorder::{ByteOrder, LittleEndian};

use crate::error::{RecError, Result};

/// Horizontal rule printed between rendered blocks and segments.
pub const SEPARATOR: &str = "----------------------------------------------------------------------------------------------------------------------------------";

pub const DEFAULT_COLUMN_WIDTH: usize = 70;

// ── Integers and hex ─────────────────────────────────────────────────────────

/// Decode a 2, 4 or 8 byte little-endian unsigned integer.
pub fn decode_uint(bytes: &[u8]) -> Result<u64> {
    match bytes.len() {
        2 => Ok(LittleEndian::read_u16(bytes) as u64),
        4 => Ok(LittleEndian::read_u32(bytes) as u64),
        8 => Ok(LittleEndian::read_u64(bytes)),
        len => Err(RecError::LengthMismatch { len, hex: to_hex(bytes) }),
    }
}

/// Uppercase hex, two bytes per group: `6469 7373 6563 7400`.
pub fn to_hex(bytes: &[u8]) -> String {
    bytes
        .chunks(2)
        .map(hex::encode_upper)
        .collect::<Vec<_>>()
        .join(" ")
}

// ── Rendering ────────────────────────────────────────────────────────────────

/// Display settings threaded through every `render` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderOptions {
    /// Width of the hex preview column, including padding.
    pub column_width:      usize,
    /// Print only labels, without the hex preview column.
    pub hide_source_bytes: bool,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            column_width:      DEFAULT_COLUMN_WIDTH,
            hide_source_bytes: false,
        }
    }
}

/// One line: hex preview padded to `column_width`, then the label.
///
/// Previews longer than `column_width - 10` characters are cut and end in
/// `...` so the label column always lines up.
pub fn render_block(bytes: &[u8], label: &str, opts: &RenderOptions) -> String {
    if opts.hide_source_bytes {
        return label.to_string();
    }

    let mut preview = to_hex(bytes);
    if preview.len() > opts.column_width.saturating_sub(10) {
        preview.truncate(opts.column_width.saturating_sub(13));
        preview.push_str("...");
    }

    let pad = opts.column_width.saturating_sub(preview.len());
    format!("{}{}{}", preview, " ".repeat(pad), label)
}

// ── Forward-only byte source ─────────────────────────────────────────────────

/// Forward-only cursor over any reader.  The only operation is "read exactly
/// N bytes or fail", which is all the block decoders need.
pub struct ByteSource<R> {
    inner:    R,
    position: u64,
}

impl<R: Read> ByteSource<R> {
    pub fn new(inner: R) -> Self {
        Self { inner, position: 0 }
    }

    /// Absolute offset of the next unread byte.
    pub fn position(&self) -> u64 {
        self.position
    }

    /// Read exactly `len` bytes.  Fails with `TruncatedInput` if the source
    /// ends first; the buffer grows with the data actually read, so a bogus
    /// length prefix cannot trigger a huge allocation.
    pub fn read_bytes(&mut self, len: u64) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        (&mut self.inner).take(len).read_to_end(&mut buf)?;
        if (buf.len() as u64) < len {
            return Err(RecError::TruncatedInput {
                offset:    self.position,
                needed:    len,
                available: buf.len() as u64,
            });
        }
        self.position += len;
        Ok(buf)
    }

    pub fn into_inner(self) -> R {
        self.inner
    }
}
