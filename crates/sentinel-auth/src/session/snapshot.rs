//! Crash-safe JSON snapshot of the session table.
//!
//! The document is a single object mapping session id to session. Writes
//! go to `<path>.tmp`, are fsynced, then renamed over `<path>`, so a crash
//! mid-write leaves the previous snapshot intact.

use std::collections::HashMap;
use std::ffi::OsString;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use sentinel_core::error::{SentinelError, SentinelResult};
use sentinel_core::models::session::Session;
use tokio::io::AsyncWriteExt;
use tracing::error;

pub(super) type Table = HashMap<String, Session>;

/// Read a snapshot. `Ok(None)` when the file does not exist.
pub(super) async fn read(path: &Path) -> SentinelResult<Option<Table>> {
    let bytes = match tokio::fs::read(path).await {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(io_error("read", path, e)),
    };

    serde_json::from_slice(&bytes).map(Some).map_err(|e| {
        error!(path = %path.display(), error = %e, "Session snapshot is corrupt");
        SentinelError::Internal("session snapshot is unreadable".into())
    })
}

/// Replace the snapshot with `table`, or remove it when `table` is empty.
pub(super) async fn write(path: &Path, table: &Table) -> SentinelResult<()> {
    if table.is_empty() {
        return remove(path).await;
    }

    let json = serde_json::to_vec_pretty(table).map_err(|e| {
        error!(error = %e, "Failed to serialize session snapshot");
        SentinelError::Internal("session snapshot could not be written".into())
    })?;

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| io_error("create directory for", path, e))?;
    }

    let tmp = tmp_path(path);
    let mut file = tokio::fs::File::create(&tmp)
        .await
        .map_err(|e| io_error("create", &tmp, e))?;
    file.write_all(&json)
        .await
        .map_err(|e| io_error("write", &tmp, e))?;
    file.sync_all()
        .await
        .map_err(|e| io_error("sync", &tmp, e))?;
    drop(file);

    tokio::fs::rename(&tmp, path)
        .await
        .map_err(|e| io_error("rename", path, e))
}

async fn remove(path: &Path) -> SentinelResult<()> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(io_error("remove", path, e)),
    }
}

pub(super) fn tmp_path(path: &Path) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(".tmp");
    PathBuf::from(name)
}

fn io_error(op: &str, path: &Path, e: std::io::Error) -> SentinelError {
    error!(path = %path.display(), error = %e, "Failed to {op} session snapshot");
    SentinelError::Internal("session snapshot I/O failed".into())
}
