//! Codec Module
//!
//! Binary encoding of operation records.
//!
//! ## Record Format
//! ```text
//! ┌─────────┬──────────┬──────────┬─────┐
//! │ Tag (1) │ Field 1  │ Field 2  │ ... │
//! └─────────┴──────────┴──────────┴─────┘
//!
//! string/bytes: [uvarint len][len bytes]
//! integer:      uvarint (unsigned) or zigzag uvarint (signed)
//! bool:         1 byte, 0 or 1
//! ```
//!
//! ### Tags
//! - 0x01: SET_TX  - key, value, expire_at
//! - 0x02: REMOVE  - count, key...
//! - 0x03: SET_TTL - key, expire_at
//! - 0x04: INCR    - key, delta
//! - 0x05: RENAME  - from, to, overwrite

mod buffer;
mod operation;
pub mod varint;

pub use buffer::{BufferPool, RecordDecoder, RecordEncoder};
pub use operation::{OpKind, Operation};
