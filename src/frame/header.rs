//! Frame-header sizing for the compression format wrapped inside .rec files.
//!
//! The scanner only needs two facts about a frame header: how long it is and
//! how many bytes trail the last block.  Both come from the zstd Frame Header
//! Descriptor (RFC 8878 §3.1.1.1):
//!
//! ```text
//! bit 7-6  Frame_Content_Size_flag   -> 0/2/4/8 bytes (1 if single segment and flag 0)
//! bit 5    Single_Segment_flag       -> no Window_Descriptor byte when set
//! bit 4    unused
//! bit 3    reserved, must be 0
//! bit 2    Content_Checksum_flag     -> 4-byte checksum after the last block
//! bit 1-0  Dictionary_ID_flag        -> 0/1/2/4 bytes
//! ```

use crate::error::{RecError, Result};

/// Magic number plus the descriptor byte.
pub const FRAME_HEADER_MIN: usize = 5;
/// Upper bound on a zstd frame header.
pub const FRAME_HEADER_MAX: usize = 18;
pub const CONTENT_CHECKSUM_SIZE: usize = 4;

/// The compression collaborator as seen by the boundary scanner.
pub trait FrameFormat {
    /// Total frame header length, magic number included.  `header` starts at
    /// the magic number and may extend past the header.
    fn frame_header_size(&self, header: &[u8]) -> Result<usize>;

    /// Bytes that follow the last block of the frame.
    fn trailer_size(&self, _header: &[u8]) -> Result<usize> {
        Ok(0)
    }
}

/// zstd frame layout.
#[derive(Debug, Clone, Copy, Default)]
pub struct Zstd;

impl Zstd {
    fn descriptor(header: &[u8]) -> Result<u8> {
        if header.len() < FRAME_HEADER_MIN {
            return Err(RecError::TruncatedInput {
                offset:    0,
                needed:    FRAME_HEADER_MIN as u64,
                available: header.len() as u64,
            });
        }
        let fhd = header[4];
        if fhd & 0x08 != 0 {
            return Err(RecError::CorruptFrame {
                offset: 4,
                reason: format!("reserved bit set in frame header descriptor {:#04x}", fhd),
            });
        }
        Ok(fhd)
    }
}

impl FrameFormat for Zstd {
    fn frame_header_size(&self, header: &[u8]) -> Result<usize> {
        let fhd = Self::descriptor(header)?;
        let single_segment = fhd & 0x20 != 0;

        let window = if single_segment { 0 } else { 1 };
        let dict_id = [0, 1, 2, 4][(fhd & 0x03) as usize];
        let content_size = match fhd >> 6 {
            0 if single_segment => 1,
            0 => 0,
            1 => 2,
            2 => 4,
            _ => 8,
        };

        let size = FRAME_HEADER_MIN + window + dict_id + content_size;
        if header.len() < size {
            return Err(RecError::TruncatedInput {
                offset:    0,
                needed:    size as u64,
                available: header.len() as u64,
            });
        }
        Ok(size)
    }

    fn trailer_size(&self, header: &[u8]) -> Result<usize> {
        let fhd = Self::descriptor(header)?;
        Ok(if fhd & 0x04 != 0 { CONTENT_CHECKSUM_SIZE } else { 0 })
    }
}
