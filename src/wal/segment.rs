//! WAL segment files and record frames
//!
//! Segment naming, directory listing, and the CRC frame wrapped around every
//! record.

use std::io::{self, Read};
use std::path::{Path, PathBuf};

use crate::error::{EmberError, Result};

/// Bytes of frame header before each payload: `[crc32][len]`
pub const FRAME_HEADER_SIZE: usize = 8;

/// File extension of segment files
const SEGMENT_EXT: &str = "seg";

/// Path of segment `id` inside `dir`
pub fn segment_path(dir: &Path, id: u64) -> PathBuf {
    dir.join(format!("{:09}.{}", id, SEGMENT_EXT))
}

/// Segment id encoded in a file name, if it is a segment file
pub fn parse_segment_id(name: &str) -> Option<u64> {
    let stem = name.strip_suffix(SEGMENT_EXT)?.strip_suffix('.')?;
    if stem.is_empty() || !stem.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    stem.parse().ok()
}

/// All segment ids in `dir`, ascending
pub fn list_segments(dir: &Path) -> Result<Vec<u64>> {
    let mut ids = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        if let Some(id) = entry.file_name().to_str().and_then(parse_segment_id) {
            ids.push(id);
        }
    }
    ids.sort_unstable();
    Ok(ids)
}

/// Build the header for `payload`
pub fn frame_header(payload: &[u8]) -> Result<[u8; FRAME_HEADER_SIZE]> {
    let len = u32::try_from(payload.len()).map_err(|_| {
        EmberError::Io(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("record of {} bytes exceeds frame limit", payload.len()),
        ))
    })?;

    let mut header = [0u8; FRAME_HEADER_SIZE];
    header[..4].copy_from_slice(&crc32fast::hash(payload).to_le_bytes());
    header[4..].copy_from_slice(&len.to_le_bytes());
    Ok(header)
}

/// Read one frame, `Ok(None)` at a clean end of input
///
/// A partial header, a short payload or a checksum mismatch is
/// `CorruptLogRecord`.
pub fn read_frame<R: Read>(reader: &mut R) -> Result<Option<Vec<u8>>> {
    let mut header = [0u8; FRAME_HEADER_SIZE];
    match read_full(reader, &mut header)? {
        0 => return Ok(None),
        FRAME_HEADER_SIZE => {}
        n => {
            return Err(EmberError::CorruptLogRecord(format!(
                "truncated frame header ({} of {} bytes)",
                n, FRAME_HEADER_SIZE
            )))
        }
    }

    let crc = u32::from_le_bytes([header[0], header[1], header[2], header[3]]);
    let len = u32::from_le_bytes([header[4], header[5], header[6], header[7]]) as usize;

    let mut payload = vec![0u8; len];
    let read = read_full(reader, &mut payload)?;
    if read != len {
        return Err(EmberError::CorruptLogRecord(format!(
            "truncated frame payload ({} of {} bytes)",
            read, len
        )));
    }

    let actual = crc32fast::hash(&payload);
    if actual != crc {
        return Err(EmberError::CorruptLogRecord(format!(
            "checksum mismatch: expected {:08x}, got {:08x}",
            crc, actual
        )));
    }

    Ok(Some(payload))
}

/// Fill `buf` as far as the input allows, returning the bytes read
fn read_full<R: Read>(reader: &mut R, buf: &mut [u8]) -> Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        }
    }
    Ok(filled)
}
