#![forbid(unsafe_code)]

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

use lexdrift_contracts::UnixTimeMs;

use crate::error::{io_at, StorageError};

/// Readers see either the old file or the new one, never a prefix.
pub fn atomic_write(path: &Path, data: &[u8]) -> Result<(), StorageError> {
    let mut tmp = path.to_path_buf();
    tmp.set_extension("tmp");
    write_synced(&tmp, data)?;
    fs::rename(&tmp, path).map_err(io_at(path))?;
    Ok(())
}

pub fn write_synced(path: &Path, data: &[u8]) -> Result<(), StorageError> {
    let mut file = File::create(path).map_err(io_at(path))?;
    file.write_all(data)
        .and_then(|_| file.sync_all())
        .map_err(io_at(path))
}

/// The line and its terminator go out in one write on an `O_APPEND` handle,
/// so concurrent appenders never interleave inside a record.
pub fn append_line(path: &Path, line: &str) -> Result<(), StorageError> {
    let mut buf = Vec::with_capacity(line.len() + 1);
    buf.extend_from_slice(line.as_bytes());
    buf.push(b'\n');
    let mut file = OpenOptions::new()
        .append(true)
        .create(true)
        .open(path)
        .map_err(io_at(path))?;
    file.write_all(&buf)
        .and_then(|_| file.sync_data())
        .map_err(io_at(path))
}

pub fn ensure_parent(path: &Path) -> Result<(), StorageError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).map_err(io_at(parent))?;
        }
    }
    Ok(())
}

pub fn now_unix_ms() -> UnixTimeMs {
    let ms = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(1)
        .max(1);
    UnixTimeMs(ms)
}

pub(crate) fn unique_suffix() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or(1)
}
