//! Value arena
//!
//! Append-only byte buffer holding `[uvarint len][len bytes]` records,
//! addressed by 32-bit offset.

use std::ops::Range;

use crate::codec::varint::{put_uvarint, uvarint, uvarint_len};
use crate::error::{EmberError, Result};

/// Largest arena a 32-bit offset can address
const MAX_ARENA_LEN: usize = u32::MAX as usize;

#[derive(Debug, Default)]
pub struct Arena {
    buf: Vec<u8>,
}

impl Arena {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: Vec::with_capacity(capacity),
        }
    }

    /// Total bytes held, live or not
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Bytes one record of `value_len` takes
    pub fn record_size(value_len: usize) -> usize {
        uvarint_len(value_len as u64) + value_len
    }

    /// Whether `additional` more bytes still fit the offset space
    pub fn has_room(&self, additional: usize) -> bool {
        self.buf.len() + additional <= MAX_ARENA_LEN
    }

    /// Largest arena a shard can address
    pub fn max_len() -> usize {
        MAX_ARENA_LEN
    }

    /// Append a value record, returning its offset
    pub fn append(&mut self, value: &[u8]) -> Result<u32> {
        let start = self.reserve(Self::record_size(value.len()))?;
        put_uvarint(&mut self.buf, value.len() as u64);
        self.buf.extend_from_slice(value);
        Ok(start)
    }

    /// Append an already-framed record verbatim (compaction copy)
    pub fn append_record(&mut self, record: &[u8]) -> Result<u32> {
        let start = self.reserve(record.len())?;
        self.buf.extend_from_slice(record);
        Ok(start)
    }

    /// Value bytes of the record at `offset`
    pub fn get(&self, offset: u32) -> Option<&[u8]> {
        let (_, value) = self.locate(offset)?;
        Some(&self.buf[value])
    }

    /// Whole record (header included) at `offset`
    pub fn record(&self, offset: u32) -> Option<&[u8]> {
        let (record, _) = self.locate(offset)?;
        Some(&self.buf[record])
    }

    /// Size of the whole record at `offset`
    pub fn record_len(&self, offset: u32) -> Option<usize> {
        self.locate(offset).map(|(record, _)| record.len())
    }

    /// Length of the value at `offset`
    pub fn value_len(&self, offset: u32) -> Option<usize> {
        self.locate(offset).map(|(_, value)| value.len())
    }

    /// Overwrite a value in place; only same-length values fit
    pub fn overwrite(&mut self, offset: u32, value: &[u8]) -> bool {
        match self.locate(offset) {
            Some((_, range)) if range.len() == value.len() => {
                self.buf[range].copy_from_slice(value);
                true
            }
            _ => false,
        }
    }

    fn reserve(&mut self, size: usize) -> Result<u32> {
        if !self.has_room(size) {
            return Err(EmberError::ArenaFull);
        }
        Ok(self.buf.len() as u32)
    }

    /// (record range, value range) of the record at `offset`
    fn locate(&self, offset: u32) -> Option<(Range<usize>, Range<usize>)> {
        let start = offset as usize;
        let (len, header) = uvarint(self.buf.get(start..)?)?;
        let value_start = start + header;
        let value_end = value_start.checked_add(len as usize)?;
        if value_end > self.buf.len() {
            return None;
        }
        Some((start..value_end, value_start..value_end))
    }
}
