//! WAL Writer
//!
//! Appends framed records to the active segment and owns the segment set.

use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use tracing::{debug, error, trace, warn};

use crate::config::SyncPolicy;
use crate::error::Result;

use super::reader::WalReader;
use super::segment::{frame_header, list_segments, segment_path, FRAME_HEADER_SIZE};

/// Segmented append-only operation log
pub struct Wal {
    dir: PathBuf,
    sync_policy: SyncPolicy,
    segment_size: u64,

    /// Id of the segment receiving appends
    active_id: u64,

    /// Bytes in the active segment, buffered ones included
    active_len: u64,

    writer: BufWriter<File>,

    /// Appended bytes not fsynced yet
    dirty: bool,

    /// Set when a torn append could not be rolled back
    broken: bool,
}

impl Wal {
    /// Attach to the highest segment in `dir`, creating segment 1 if none
    pub fn open(dir: &Path, sync_policy: SyncPolicy, segment_size: u64) -> Result<Self> {
        fs::create_dir_all(dir)?;

        let active_id = list_segments(dir)?.last().copied().unwrap_or(1);
        let file = open_segment(dir, active_id)?;
        let active_len = file.metadata()?.len();

        debug!(
            dir = %dir.display(),
            segment = active_id,
            len = active_len,
            "WAL opened"
        );

        Ok(Self {
            dir: dir.to_path_buf(),
            sync_policy,
            segment_size,
            active_id,
            active_len,
            writer: BufWriter::new(file),
            dirty: false,
            broken: false,
        })
    }

    /// Append one record, then sync if the policy asks for it
    pub fn write(&mut self, record: &[u8]) -> Result<()> {
        self.append(record)?;
        if self.sync_policy == SyncPolicy::Always {
            self.sync()?;
        }
        Ok(())
    }

    /// Append one record without consulting the sync policy
    ///
    /// Rotates first when the record would push a non-empty segment past
    /// the size limit. A failed append leaves the segment as it was before
    /// the call.
    pub fn append(&mut self, record: &[u8]) -> Result<()> {
        if self.broken {
            return Err(io::Error::new(
                io::ErrorKind::Other,
                "log segment holds a torn frame, reopen the store",
            )
            .into());
        }

        let header = frame_header(record)?;
        let frame_len = (FRAME_HEADER_SIZE + record.len()) as u64;

        if self.active_len > 0 && self.active_len + frame_len > self.segment_size {
            self.rotate()?;
        }

        let written = self
            .writer
            .write_all(&header)
            .and_then(|()| self.writer.write_all(record));
        if let Err(e) = written {
            warn!(segment = self.active_id, error = %e, "WAL append failed, rolling back");
            self.discard_torn_tail()?;
            return Err(e.into());
        }
        self.active_len += frame_len;
        self.dirty = true;

        trace!(segment = self.active_id, len = record.len(), "WAL append");
        Ok(())
    }

    /// Push buffered bytes to the OS
    pub fn flush(&mut self) -> Result<()> {
        self.writer.flush()?;
        Ok(())
    }

    /// Flush and fsync the active segment
    pub fn sync(&mut self) -> Result<()> {
        self.writer.flush()?;
        if self.dirty {
            self.writer.get_ref().sync_data()?;
            self.dirty = false;
        }
        Ok(())
    }

    /// Seal the active segment and start the next one, returning its id
    pub fn open_new_segment(&mut self) -> Result<u64> {
        self.rotate()?;
        Ok(self.active_id)
    }

    /// Delete every segment with an id lower than `id`
    pub fn remove_segments_before(&mut self, id: u64) -> Result<usize> {
        let mut removed = 0;
        for old in list_segments(&self.dir)?.into_iter().filter(|&s| s < id) {
            fs::remove_file(segment_path(&self.dir, old))?;
            removed += 1;
        }
        if removed > 0 {
            // Persist the unlinks.
            File::open(&self.dir)?.sync_all()?;
        }
        Ok(removed)
    }

    /// Ids of all segments on disk, ascending
    pub fn segment_ids(&self) -> Result<Vec<u64>> {
        list_segments(&self.dir)
    }

    pub fn active_segment(&self) -> u64 {
        self.active_id
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Read every record written so far, oldest first
    pub fn reader(&mut self) -> Result<WalReader> {
        self.flush()?;
        WalReader::open(&self.dir)
    }

    /// Drop buffered bytes and cut the segment back to its last whole frame
    fn discard_torn_tail(&mut self) -> Result<()> {
        let reopened = open_segment(&self.dir, self.active_id)
            .and_then(|file| file.set_len(self.active_len).map(|()| file).map_err(Into::into));
        match reopened {
            Ok(file) => {
                // into_parts hands back the buffer without flushing it.
                let (_, _unflushed) = std::mem::replace(&mut self.writer, BufWriter::new(file))
                    .into_parts();
                Ok(())
            }
            Err(e) => {
                error!(segment = self.active_id, error = %e, "Failed to roll back torn WAL append");
                self.broken = true;
                Err(e)
            }
        }
    }

    fn rotate(&mut self) -> Result<()> {
        self.sync()?;

        let next = self.active_id + 1;
        let file = open_segment(&self.dir, next)?;
        self.writer = BufWriter::new(file);
        self.active_id = next;
        self.active_len = 0;

        debug!(segment = next, "WAL segment rotated");
        Ok(())
    }
}

impl std::fmt::Debug for Wal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Wal")
            .field("dir", &self.dir)
            .field("sync_policy", &self.sync_policy)
            .field("active_id", &self.active_id)
            .field("active_len", &self.active_len)
            .finish()
    }
}

fn open_segment(dir: &Path, id: u64) -> Result<File> {
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(segment_path(dir, id))?;
    Ok(file)
}
