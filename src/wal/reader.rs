//! WAL Reader
//!
//! Iterates records across all segments in ascending segment order.

use std::collections::VecDeque;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use bytes::Bytes;

use crate::error::{EmberError, Result};

use super::segment::{list_segments, read_frame, segment_path};

/// Sequential reader over every segment in a directory
///
/// Yields each record payload in append order. Iteration ends after the
/// last frame of the last segment, or right after the first error.
pub struct WalReader {
    dir: PathBuf,
    pending: VecDeque<u64>,
    current: Option<(u64, BufReader<File>)>,
    segments_read: usize,
    failed: bool,
}

impl WalReader {
    /// Snapshot the segment list of `dir`
    pub fn open(dir: &Path) -> Result<Self> {
        Ok(Self {
            dir: dir.to_path_buf(),
            pending: list_segments(dir)?.into(),
            current: None,
            segments_read: 0,
            failed: false,
        })
    }

    /// Segments opened so far
    pub fn segments_read(&self) -> usize {
        self.segments_read
    }

    fn next_record(&mut self) -> Result<Option<Bytes>> {
        loop {
            if self.current.is_none() {
                let Some(id) = self.pending.pop_front() else {
                    return Ok(None);
                };
                let file = File::open(segment_path(&self.dir, id))?;
                self.current = Some((id, BufReader::new(file)));
                self.segments_read += 1;
            }

            let Some((id, reader)) = self.current.as_mut() else {
                continue;
            };
            let id = *id;
            match read_frame(reader) {
                Ok(Some(payload)) => return Ok(Some(Bytes::from(payload))),
                Ok(None) => self.current = None,
                Err(EmberError::CorruptLogRecord(msg)) => {
                    return Err(EmberError::CorruptLogRecord(format!(
                        "segment {}: {}",
                        id, msg
                    )))
                }
                Err(e) => return Err(e),
            }
        }
    }
}

impl Iterator for WalReader {
    type Item = Result<Bytes>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        match self.next_record() {
            Ok(record) => record.map(Ok),
            Err(e) => {
                self.failed = true;
                Some(Err(e))
            }
        }
    }
}

impl std::fmt::Debug for WalReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WalReader")
            .field("dir", &self.dir)
            .field("pending", &self.pending)
            .field("current", &self.current.as_ref().map(|(id, _)| *id))
            .finish()
    }
}
