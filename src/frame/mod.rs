//! zstd frame boundary recovery.

pub mod header;
pub mod scanner;

pub use header::{FrameFormat, Zstd};
pub use scanner::{find_frame_end, find_frame_end_with, find_last_magic, BlockHeader, BlockType, FrameBoundary, ZSTD_MAGIC};
