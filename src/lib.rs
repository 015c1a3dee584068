pub mod error;
pub mod binary;
pub mod block;
pub mod packet;
pub mod segment;
pub mod dump;
pub mod frame;
pub mod extract;

pub use error::{IntegrityWarning, RecError, Result};
pub use binary::{decode_uint, to_hex, render_block, ByteSource, RenderOptions};
pub use block::{BlockKind, BlockValue, RecBlock, FILE_MAGIC};
pub use segment::{MultiBlockLayout, Segment, SegmentKind};
pub use dump::{DumpOptions, RecFile};
pub use frame::{find_frame_end, FrameBoundary};
pub use extract::{extract, extract_file, ExtractOptions, ExtractOutcome, TRAILER_SIGNATURE};
