//! Write-Ahead Log (WAL) Module
//!
//! Durable, segmented operation log.
//!
//! ## Responsibilities
//! - Append operation records before they are applied
//! - CRC32 checksums for corruption detection
//! - Segment rotation and removal of superseded segments
//! - Sequential replay across all segments
//!
//! ## File Format
//! ```text
//! {data_dir}/000000001.seg, 000000002.seg, ...
//!
//! ┌─────────────────────────────────────────┐
//! │ Frame 1                                 │
//! │ ┌─────────┬─────────┬─────────────────┐ │
//! │ │ CRC (4) │ Len (4) │ Record          │ │
//! │ └─────────┴─────────┴─────────────────┘ │
//! ├─────────────────────────────────────────┤
//! │ Frame 2                                 │
//! │ ┌─────────┬─────────┬─────────────────┐ │
//! │ │ CRC (4) │ Len (4) │ Record          │ │
//! │ └─────────┴─────────┴─────────────────┘ │
//! └─────────────────────────────────────────┘
//! ```

mod reader;
mod segment;
mod writer;

pub use reader::WalReader;
pub use segment::{list_segments, segment_path, FRAME_HEADER_SIZE};
pub use writer::Wal;
