//! Operation definitions
//!
//! Every mutation the store logs is one `Operation`. Records borrow their
//! string and byte fields, so encoding a caller's arguments and decoding a
//! replayed record are both copy-free.

use crate::error::{EmberError, Result};

use super::buffer::{RecordDecoder, RecordEncoder};

/// Operation tags (first byte of every record)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum OpKind {
    SetTx = 0x01,
    Remove = 0x02,
    SetTtl = 0x03,
    Incr = 0x04,
    Rename = 0x05,
}

impl TryFrom<u8> for OpKind {
    type Error = EmberError;

    fn try_from(tag: u8) -> Result<Self> {
        match tag {
            0x01 => Ok(OpKind::SetTx),
            0x02 => Ok(OpKind::Remove),
            0x03 => Ok(OpKind::SetTtl),
            0x04 => Ok(OpKind::Incr),
            0x05 => Ok(OpKind::Rename),
            other => Err(EmberError::UnsupportedValueType(other)),
        }
    }
}

/// A logged mutation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation<'a> {
    /// Set a value with an absolute expiration (0 = no TTL)
    SetTx {
        key: &'a str,
        value: &'a [u8],
        expire_at: i64,
    },

    /// Remove one or more keys
    Remove { keys: Vec<&'a str> },

    /// Replace the expiration of an existing key
    SetTtl { key: &'a str, expire_at: i64 },

    /// Add `delta` to an integer value
    Incr { key: &'a str, delta: i64 },

    /// Move a value (and its TTL) to another key
    Rename {
        from: &'a str,
        to: &'a str,
        overwrite: bool,
    },
}

impl<'a> Operation<'a> {
    /// Get the operation tag
    pub fn kind(&self) -> OpKind {
        match self {
            Operation::SetTx { .. } => OpKind::SetTx,
            Operation::Remove { .. } => OpKind::Remove,
            Operation::SetTtl { .. } => OpKind::SetTtl,
            Operation::Incr { .. } => OpKind::Incr,
            Operation::Rename { .. } => OpKind::Rename,
        }
    }

    /// Append this operation as one record
    pub fn encode(&self, enc: &mut RecordEncoder) {
        enc.put_tag(self.kind() as u8);
        match self {
            Operation::SetTx {
                key,
                value,
                expire_at,
            } => {
                enc.put_str(key).put_bytes(value).put_int(*expire_at);
            }
            Operation::Remove { keys } => {
                enc.put_uint(keys.len() as u64);
                for key in keys {
                    enc.put_str(key);
                }
            }
            Operation::SetTtl { key, expire_at } => {
                enc.put_str(key).put_int(*expire_at);
            }
            Operation::Incr { key, delta } => {
                enc.put_str(key).put_int(*delta);
            }
            Operation::Rename {
                from,
                to,
                overwrite,
            } => {
                enc.put_str(from).put_str(to).put_bool(*overwrite);
            }
        }
    }

    /// Decode one complete record
    ///
    /// Trailing bytes after the last field are an error.
    pub fn decode(record: &'a [u8]) -> Result<Self> {
        let mut dec = RecordDecoder::new(record);
        let op = match OpKind::try_from(dec.read_tag()?)? {
            OpKind::SetTx => Operation::SetTx {
                key: dec.read_str()?,
                value: dec.read_bytes()?,
                expire_at: dec.read_int()?,
            },
            OpKind::Remove => {
                let count = dec.read_uint()? as usize;
                // Every key costs at least one length byte.
                if count > dec.remaining() {
                    return Err(EmberError::CorruptLogRecord(format!(
                        "remove record claims {} keys in {} bytes",
                        count,
                        dec.remaining()
                    )));
                }
                let mut keys = Vec::with_capacity(count);
                for _ in 0..count {
                    keys.push(dec.read_str()?);
                }
                Operation::Remove { keys }
            }
            OpKind::SetTtl => Operation::SetTtl {
                key: dec.read_str()?,
                expire_at: dec.read_int()?,
            },
            OpKind::Incr => Operation::Incr {
                key: dec.read_str()?,
                delta: dec.read_int()?,
            },
            OpKind::Rename => Operation::Rename {
                from: dec.read_str()?,
                to: dec.read_str()?,
                overwrite: dec.read_bool()?,
            },
        };
        dec.finish()?;
        Ok(op)
    }
}
