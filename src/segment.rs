//! Segments: ordered runs of blocks read back to back from one source.
//!
//! A .rec file is a header segment followed by counted segments.  A counted
//! segment starts with a little-endian count field, may carry a fixed-size
//! padding block, and then holds exactly `count` content blocks.  Body
//! segments additionally close with an opaque spacer, and their stored count
//! is one higher than the number of records that follow.  File order is
//! preserved everywhere; nothing is sorted or merged.

use std::io::Read;

use serde::Serialize;
use tracing::{debug, trace};

use crate::binary::{decode_uint, render_block, ByteSource, RenderOptions, SEPARATOR};
use crate::block::{hex_bytes, BlockKind, RecBlock};
use crate::error::{RecError, Result};
use crate::packet::PACKET_SIZE;

/// Default width of the count prefix on counted segments.
pub const COUNT_WIDTH: u64 = 8;
/// Size of the unlabelled block that closes the header segment.
pub const HEADER_TRAILER_SIZE: u64 = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SegmentKind {
    Header,
    MultiKeyValue,
    MultiBlock,
}

/// What each content block of a counted segment is decoded as.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Content {
    /// Opaque blocks of `MultiBlockLayout::block_size` bytes.
    Fixed,
    /// Packet records; `block_size` must equal the packet size.
    Packets,
    /// String key-value pairs; `block_size` must be unset.
    KeyValue,
}

/// Shape of a counted segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MultiBlockLayout {
    pub count_width: u64,
    pub block_size:  Option<u64>,
    pub padding:     u64,
    /// Entries included in the stored count that are not stored as blocks.
    pub count_bias:  u64,
    /// Opaque spacer read after the last content block.
    pub trailer:     u64,
    pub content:     Content,
}

impl MultiBlockLayout {
    const fn base(block_size: Option<u64>, padding: u64, content: Content) -> Self {
        Self { count_width: COUNT_WIDTH, block_size, padding, count_bias: 0, trailer: 0, content }
    }

    pub const fn fixed(block_size: u64, padding: u64) -> Self {
        Self::base(Some(block_size), padding, Content::Fixed)
    }

    pub const fn packets(padding: u64) -> Self {
        Self::base(Some(PACKET_SIZE), padding, Content::Packets)
    }

    pub const fn key_value() -> Self {
        Self::base(None, 0, Content::KeyValue)
    }

    pub const fn with_count_width(self, count_width: u64) -> Self {
        Self { count_width, ..self }
    }

    pub const fn with_count_bias(self, count_bias: u64) -> Self {
        Self { count_bias, ..self }
    }

    pub const fn with_trailer(self, trailer: u64) -> Self {
        Self { trailer, ..self }
    }

    /// Content blocks that follow a stored count of `count`.
    pub fn block_count(&self, count: u64) -> u64 {
        count.saturating_sub(self.count_bias)
    }

    /// Resolve the per-block parse strategy, rejecting combinations the
    /// format does not allow.
    fn block_kind(&self) -> Result<BlockKind<'static>> {
        match (self.content, self.block_size) {
            (Content::KeyValue, None) => Ok(BlockKind::KeyValue),
            (Content::KeyValue, Some(size)) => Err(RecError::UnsupportedConfiguration(format!(
                "block size {} is not supported for key-value segments",
                size
            ))),
            (Content::Packets, Some(PACKET_SIZE)) => Ok(BlockKind::Packet),
            (Content::Packets, other) => Err(RecError::UnsupportedConfiguration(format!(
                "packet segments need a block size of {}, got {:?}",
                PACKET_SIZE, other
            ))),
            (Content::Fixed, Some(0)) => Err(RecError::UnsupportedConfiguration(
                "fixed-width segments need a non-zero block size".to_string(),
            )),
            (Content::Fixed, Some(size)) => Ok(BlockKind::Opaque(size)),
            (Content::Fixed, None) => Err(RecError::UnsupportedConfiguration(
                "fixed-width segments need a block size".to_string(),
            )),
        }
    }
}

impl Default for MultiBlockLayout {
    fn default() -> Self {
        Self::key_value()
    }
}

/// The count prefix of a counted segment, kept with its source bytes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CountField {
    #[serde(serialize_with = "hex_bytes")]
    pub raw:   Vec<u8>,
    pub value: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Segment {
    pub kind:           SegmentKind,
    pub count:          Option<CountField>,
    pub header_blocks:  Vec<RecBlock>,
    pub content_blocks: Vec<RecBlock>,
    pub trailer_blocks: Vec<RecBlock>,
}

impl Segment {
    // ── Parsers ──────────────────────────────────────────────────────────────

    /// Magic number, version string, then an 8-byte block of unknown purpose.
    pub fn parse_header<R: Read>(src: &mut ByteSource<R>) -> Result<Self> {
        let start = src.position();
        let content_blocks = vec![
            RecBlock::parse_magic(src)?,
            RecBlock::parse_string(src)?,
            RecBlock::parse_opaque(src, HEADER_TRAILER_SIZE)?,
        ];
        debug!(start, end = src.position(), "parsed header segment");
        Ok(Self {
            kind: SegmentKind::Header,
            count: None,
            header_blocks: Vec::new(),
            content_blocks,
            trailer_blocks: Vec::new(),
        })
    }

    pub fn parse_key_values<R: Read>(src: &mut ByteSource<R>) -> Result<Self> {
        Self::parse_counted(src, &MultiBlockLayout::key_value())
    }

    pub fn parse_multi_block<R: Read>(
        src:        &mut ByteSource<R>,
        block_size: u64,
        padding:    u64,
    ) -> Result<Self> {
        Self::parse_counted(src, &MultiBlockLayout::fixed(block_size, padding))
    }

    /// Count field, optional padding block, `count - count_bias` blocks,
    /// then the optional trailing spacer.
    pub fn parse_counted<R: Read>(src: &mut ByteSource<R>, layout: &MultiBlockLayout) -> Result<Self> {
        let kind = layout.block_kind()?;
        let start = src.position();

        let raw = src.read_bytes(layout.count_width)?;
        let value = decode_uint(&raw)?;
        trace!(count = value, offset = start, "segment count");

        let mut header_blocks = Vec::new();
        if layout.padding > 0 {
            header_blocks.push(RecBlock::parse_opaque(src, layout.padding)?);
        }

        // No pre-allocation: the count comes straight from the file.
        let mut content_blocks = Vec::new();
        for _ in 0..layout.block_count(value) {
            content_blocks.push(kind.parse(src)?);
        }

        let mut trailer_blocks = Vec::new();
        if layout.trailer > 0 {
            trailer_blocks.push(RecBlock::parse_opaque(src, layout.trailer)?);
        }

        let segment_kind = match layout.content {
            Content::KeyValue => SegmentKind::MultiKeyValue,
            Content::Fixed | Content::Packets => SegmentKind::MultiBlock,
        };
        debug!(?segment_kind, blocks = content_blocks.len(), start, end = src.position(), "parsed segment");

        Ok(Self {
            kind: segment_kind,
            count: Some(CountField { raw, value }),
            header_blocks,
            content_blocks,
            trailer_blocks,
        })
    }

    // ── Accessors ────────────────────────────────────────────────────────────

    pub fn len(&self) -> usize {
        self.content_blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.content_blocks.is_empty()
    }

    /// Number of source bytes this segment covers.
    pub fn byte_len(&self) -> usize {
        self.count.as_ref().map_or(0, |c| c.raw.len())
            + self.header_blocks.iter().map(RecBlock::len).sum::<usize>()
            + self.content_blocks.iter().map(RecBlock::len).sum::<usize>()
            + self.trailer_blocks.iter().map(RecBlock::len).sum::<usize>()
    }

    /// Every source byte of the segment, in file order.
    pub fn raw(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.byte_len());
        if let Some(count) = &self.count {
            out.extend_from_slice(&count.raw);
        }
        for block in self.header_blocks.iter().chain(&self.content_blocks).chain(&self.trailer_blocks) {
            out.extend_from_slice(&block.raw());
        }
        out
    }

    pub fn title(&self) -> String {
        match self.kind {
            SegmentKind::Header => "Header Segment".to_string(),
            SegmentKind::MultiKeyValue => {
                format!("Multi-Key-Value Segment ({} key-value pairs follow)", self.len())
            }
            SegmentKind::MultiBlock => format!("Multi-Block Segment ({} blocks follow)", self.len()),
        }
    }

    // ── Rendering ────────────────────────────────────────────────────────────

    /// Banner, count line, header blocks, then content blocks in file order.
    /// `limit` caps how many content blocks are printed.
    pub fn render(&self, opts: &RenderOptions, limit: Option<usize>) -> String {
        let mut out = String::new();
        let mut line = |text: &str| {
            out.push_str(text);
            out.push('\n');
        };

        line(SEPARATOR);
        line(SEPARATOR);
        line(&format!("{}{}", " ".repeat(45), self.title()));
        line(SEPARATOR);

        if let Some(count) = &self.count {
            let what = match self.kind {
                SegmentKind::MultiKeyValue => "key-value string pairs",
                _ => "blocks",
            };
            line(&render_block(&count.raw, &format!("{} {} follow...", count.value, what), opts));
        }
        for block in &self.header_blocks {
            line(&block.render(opts));
        }
        if self.count.is_some() || !self.header_blocks.is_empty() {
            line(SEPARATOR);
        }

        let shown = limit.unwrap_or(usize::MAX).min(self.content_blocks.len());
        for (i, block) in self.content_blocks[..shown].iter().enumerate() {
            if i > 0 {
                line(SEPARATOR);
            }
            line(&block.render(opts));
        }
        let omitted = self.content_blocks.len() - shown;
        if omitted > 0 {
            line(SEPARATOR);
            line(&format!("... {} more blocks not shown", omitted));
        }
        for block in &self.trailer_blocks {
            line(SEPARATOR);
            line(&block.render(opts));
        }
        line(SEPARATOR);
        out
    }
}
