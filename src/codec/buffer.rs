//! Record buffers
//!
//! `RecordEncoder` builds one operation record, `RecordDecoder` walks one
//! back field by field, and `BufferPool` recycles encoder buffers so the
//! write path does not allocate per call.

use bytes::{BufMut, BytesMut};
use crossbeam::queue::ArrayQueue;

use crate::error::{EmberError, Result};

use super::varint::{put_uvarint, uvarint, zigzag_decode, zigzag_encode};

/// Starting capacity of a fresh encoder buffer
const DEFAULT_BUFFER_CAPACITY: usize = 256;

/// Buffers that grew past this are dropped instead of pooled
const MAX_RETAINED_CAPACITY: usize = 64 * 1024;

// =============================================================================
// Encoder
// =============================================================================

/// Builds a `[tag][field]...` record
#[derive(Debug)]
pub struct RecordEncoder {
    buf: BytesMut,
}

impl RecordEncoder {
    pub fn new() -> Self {
        Self {
            buf: BytesMut::with_capacity(DEFAULT_BUFFER_CAPACITY),
        }
    }

    /// Write the 1-byte operation tag
    pub fn put_tag(&mut self, tag: u8) -> &mut Self {
        self.buf.put_u8(tag);
        self
    }

    /// Write a length-prefixed string field
    pub fn put_str(&mut self, value: &str) -> &mut Self {
        self.put_bytes(value.as_bytes())
    }

    /// Write a length-prefixed byte field
    pub fn put_bytes(&mut self, value: &[u8]) -> &mut Self {
        put_uvarint(&mut self.buf, value.len() as u64);
        self.buf.put_slice(value);
        self
    }

    /// Write an unsigned varint field
    pub fn put_uint(&mut self, value: u64) -> &mut Self {
        put_uvarint(&mut self.buf, value);
        self
    }

    /// Write a zigzag varint field
    pub fn put_int(&mut self, value: i64) -> &mut Self {
        put_uvarint(&mut self.buf, zigzag_encode(value));
        self
    }

    /// Write a single-byte bool field
    pub fn put_bool(&mut self, value: bool) -> &mut Self {
        self.buf.put_u8(value as u8);
        self
    }

    /// The encoded record so far
    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn clear(&mut self) {
        self.buf.clear();
    }
}

impl Default for RecordEncoder {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// Decoder
// =============================================================================

/// Reads fields back out of one encoded record
///
/// Borrowed fields point into the record, nothing is copied.
#[derive(Debug)]
pub struct RecordDecoder<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> RecordDecoder<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    /// Read the 1-byte operation tag
    pub fn read_tag(&mut self) -> Result<u8> {
        self.read_u8("tag")
    }

    /// Read a length-prefixed byte field
    pub fn read_bytes(&mut self) -> Result<&'a [u8]> {
        let len = self.read_uint()? as usize;
        let end = self
            .pos
            .checked_add(len)
            .filter(|&end| end <= self.data.len())
            .ok_or_else(|| {
                EmberError::CorruptLogRecord(format!(
                    "field of {} bytes overruns record at offset {}",
                    len, self.pos
                ))
            })?;
        let field = &self.data[self.pos..end];
        self.pos = end;
        Ok(field)
    }

    /// Read a length-prefixed UTF-8 string field
    pub fn read_str(&mut self) -> Result<&'a str> {
        let bytes = self.read_bytes()?;
        std::str::from_utf8(bytes).map_err(|e| {
            EmberError::CorruptLogRecord(format!("string field is not UTF-8: {}", e))
        })
    }

    /// Read an unsigned varint field
    pub fn read_uint(&mut self) -> Result<u64> {
        let (value, used) = uvarint(&self.data[self.pos..]).ok_or_else(|| {
            EmberError::CorruptLogRecord(format!("bad varint at offset {}", self.pos))
        })?;
        self.pos += used;
        Ok(value)
    }

    /// Read a zigzag varint field
    pub fn read_int(&mut self) -> Result<i64> {
        self.read_uint().map(zigzag_decode)
    }

    /// Read a single-byte bool field
    pub fn read_bool(&mut self) -> Result<bool> {
        match self.read_u8("bool")? {
            0 => Ok(false),
            1 => Ok(true),
            other => Err(EmberError::CorruptLogRecord(format!(
                "bool field holds 0x{:02x}",
                other
            ))),
        }
    }

    /// Bytes not consumed yet
    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    /// Fail if the record has trailing bytes
    pub fn finish(&self) -> Result<()> {
        if self.remaining() != 0 {
            return Err(EmberError::CorruptLogRecord(format!(
                "{} trailing bytes after last field",
                self.remaining()
            )));
        }
        Ok(())
    }

    fn read_u8(&mut self, what: &str) -> Result<u8> {
        let byte = *self.data.get(self.pos).ok_or_else(|| {
            EmberError::CorruptLogRecord(format!("record ends before {} byte", what))
        })?;
        self.pos += 1;
        Ok(byte)
    }
}

// =============================================================================
// Pool
// =============================================================================

/// Bounded pool of reusable encoders, owned by a store
pub struct BufferPool {
    slots: ArrayQueue<RecordEncoder>,
}

impl BufferPool {
    /// Create a pool retaining at most `capacity` idle encoders
    pub fn new(capacity: usize) -> Self {
        Self {
            slots: ArrayQueue::new(capacity.max(1)),
        }
    }

    /// Take an empty encoder, allocating one if the pool is dry
    pub fn get(&self) -> RecordEncoder {
        self.slots.pop().unwrap_or_default()
    }

    /// Hand an encoder back for reuse
    pub fn put(&self, mut encoder: RecordEncoder) {
        if encoder.buf.capacity() > MAX_RETAINED_CAPACITY {
            return;
        }
        encoder.clear();
        // A full pool just drops the buffer.
        let _ = self.slots.push(encoder);
    }

    /// Number of idle encoders
    pub fn idle(&self) -> usize {
        self.slots.len()
    }
}

impl std::fmt::Debug for BufferPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BufferPool")
            .field("idle", &self.slots.len())
            .field("capacity", &self.slots.capacity())
            .finish()
    }
}
