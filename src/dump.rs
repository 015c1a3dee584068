//! Whole-file structural walk.
//!
//! ```text
//! Header segment        magic, version string, 8 unknown bytes
//! Key-value segment     u64 count, then count string pairs
//! Body segment 0        u64 count, 8 zero bytes, count-1 12-byte packets, 8-byte spacer
//! Body segment 1        u32 count, count-1 29-byte records, 8-byte spacer
//! ```
//!
//! The packet segment's count is stored in 4 bytes followed by 12 zeros; the
//! first 4 zeros are read as the high half of a u64 count.  Body counts
//! include one entry more than the records stored.  Bytes after the last
//! known body segment are left alone.

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use serde::Serialize;
use tracing::debug;

use crate::binary::{ByteSource, RenderOptions};
use crate::block::{BlockValue, RecBlock};
use crate::error::Result;
use crate::packet::PacketLog;
use crate::segment::{MultiBlockLayout, Segment};

pub const DEFAULT_MAX_RECORDS: usize = 200;

/// Body segments in file order.
pub const BODY_LAYOUTS: [MultiBlockLayout; 2] = [
    MultiBlockLayout::packets(8).with_count_bias(1).with_trailer(SEGMENT_SPACER),
    MultiBlockLayout::fixed(29, 0).with_count_width(4).with_count_bias(1).with_trailer(SEGMENT_SPACER),
];

/// Zero bytes separating consecutive body segments.
pub const SEGMENT_SPACER: u64 = 8;

/// What to parse and print.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DumpOptions {
    pub show_header:   bool,
    /// How many body segments to walk (capped at the known layouts).
    pub body_segments: usize,
    /// Most content blocks printed per body segment.
    pub max_records:   usize,
    pub render:        RenderOptions,
}

impl Default for DumpOptions {
    fn default() -> Self {
        Self {
            show_header:   false,
            body_segments: 0,
            max_records:   DEFAULT_MAX_RECORDS,
            render:        RenderOptions::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecFile {
    pub header:     Segment,
    pub properties: Segment,
    pub body:       Vec<Segment>,
}

impl RecFile {
    pub fn read<R: Read>(src: &mut ByteSource<R>, body_segments: usize, log: &mut PacketLog) -> Result<Self> {
        Self::walk(src, body_segments, log, |_| {})
    }

    /// Parse segment by segment, calling `on_segment` as each completes so
    /// output is produced even if a later segment turns out to be corrupt.
    pub fn walk<R, F>(
        src:           &mut ByteSource<R>,
        body_segments: usize,
        log:           &mut PacketLog,
        mut on_segment: F,
    ) -> Result<Self>
    where
        R: Read,
        F: FnMut(&Segment),
    {
        let header = Segment::parse_header(src)?;
        on_segment(&header);

        let properties = Segment::parse_key_values(src)?;
        on_segment(&properties);

        let mut body = Vec::new();
        for layout in BODY_LAYOUTS.iter().take(body_segments) {
            let segment = Segment::parse_counted(src, layout)?;
            for block in &segment.content_blocks {
                if let RecBlock::Packet(p) = block {
                    log.record(p);
                }
            }
            on_segment(&segment);
            body.push(segment);
        }
        debug!(body = body.len(), packets = log.len(), end = src.position(), "walk finished");

        Ok(Self { header, properties, body })
    }

    pub fn version(&self) -> Option<&str> {
        self.header.content_blocks.iter().find_map(|b| match b.value() {
            BlockValue::Text { content, .. } => Some(content),
            _ => None,
        })
    }

    /// Header key-value pairs in file order.
    pub fn properties(&self) -> impl Iterator<Item = (&str, &str)> {
        self.properties.content_blocks.iter().filter_map(|b| match b.value() {
            BlockValue::Pair { key, value } => Some((key, value)),
            _ => None,
        })
    }

    /// First value stored under `key`.
    pub fn property(&self, key: &str) -> Option<&str> {
        self.properties().find(|(k, _)| *k == key).map(|(_, v)| v)
    }

    /// Total bytes covered by the parsed segments.
    pub fn parsed_len(&self) -> usize {
        self.header.byte_len()
            + self.properties.byte_len()
            + self.body.iter().map(Segment::byte_len).sum::<usize>()
    }
}

/// Render one segment the way `dump` prints it.  Header and key-value
/// segments are hidden unless `show_header`; body segments are capped at
/// `max_records` blocks.
pub fn render_segment(segment: &Segment, index: usize, opts: &DumpOptions) -> Option<String> {
    if index < 2 {
        opts.show_header.then(|| segment.render(&opts.render, None))
    } else {
        Some(segment.render(&opts.render, Some(opts.max_records)))
    }
}

/// Open `path` and walk it, handing each rendered segment to `emit`.
pub fn dump_file<F: FnMut(String)>(path: &Path, opts: &DumpOptions, mut emit: F) -> Result<(RecFile, PacketLog)> {
    let mut src = ByteSource::new(BufReader::new(File::open(path)?));
    let mut log = PacketLog::new();
    let mut index = 0;
    let file = RecFile::walk(&mut src, opts.body_segments, &mut log, |segment| {
        if let Some(text) = render_segment(segment, index, opts) {
            emit(text);
        }
        index += 1;
    })?;
    Ok((file, log))
}
