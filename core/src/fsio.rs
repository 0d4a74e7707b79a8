//! Small file helpers shared by the packer, unpacker and provisioning.
//!
//! Writes are in-place overwrites. A file whose bytes already match is left
//! untouched so repeated unpack runs produce no changes.

use crate::error::Result;
use crate::error::SyncError;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::path::Path;

/// Read and parse a JSON file. `Ok(None)` when the file does not exist.
pub(crate) fn read_json_opt<T: DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    let bytes = match std::fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(SyncError::io(path, e)),
    };
    serde_json::from_slice(&bytes)
        .map(Some)
        .map_err(|e| SyncError::malformed(path, e))
}

/// Pretty JSON with a trailing newline, the format of every tree file.
pub(crate) fn json_bytes<T: Serialize>(value: &T, path: &Path) -> Result<Vec<u8>> {
    let mut bytes = serde_json::to_vec_pretty(value).map_err(|e| SyncError::malformed(path, e))?;
    bytes.push(b'\n');
    Ok(bytes)
}

/// Overwrite `path` with `bytes` unless it already holds exactly them.
/// Returns whether a write happened.
pub(crate) fn write_if_changed(path: &Path, bytes: &[u8]) -> Result<bool> {
    match std::fs::read(path) {
        Ok(existing) if existing == bytes => return Ok(false),
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => return Err(SyncError::io(path, e)),
    }
    std::fs::write(path, bytes).map_err(|e| SyncError::io(path, e))?;
    tracing::debug!(path = %path.display(), "wrote file");
    Ok(true)
}

pub(crate) fn create_dir_all(path: &Path) -> Result<()> {
    std::fs::create_dir_all(path).map_err(|e| SyncError::io(path, e))
}

/// Final path component as UTF-8, if it has one.
pub(crate) fn dir_name(path: &Path) -> Option<String> {
    path.file_name()
        .and_then(|name| name.to_str())
        .map(str::to_string)
}
