//! Atomic file writes
//!
//! Every persisted file (artifacts, the index, geography enumerations) is
//! written to a uniquely named temp file beside its destination and renamed
//! into place, so readers see either the old file or the complete new one.

use std::path::{Path, PathBuf};

use tokio::fs;
use tracing::error;

use crate::constants::files;
use crate::errors::{CacheError, CacheResult};

/// Temp path next to `path`, unique per call
pub fn temp_path_for(path: &Path) -> PathBuf {
    let file_name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    path.with_file_name(format!(
        "{}.{:08x}{}",
        file_name,
        fastrand::u32(..),
        files::TEMP_FILE_SUFFIX
    ))
}

/// Write `content` to `path` using temp file + rename
pub async fn write_atomic(path: &Path, content: &[u8]) -> CacheResult<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).await?;
    }

    let temp_path = temp_path_for(path);
    if let Err(e) = fs::write(&temp_path, content).await {
        let _ = fs::remove_file(&temp_path).await;
        return Err(CacheError::WriteFailed {
            path: temp_path,
            reason: e.to_string(),
        });
    }

    if let Err(e) = fs::rename(&temp_path, path).await {
        error!("Failed to rename temporary file: {}", e);
        let _ = fs::remove_file(&temp_path).await;
        return Err(CacheError::AtomicOperationFailed {
            temp_path,
            final_path: path.to_path_buf(),
        });
    }

    Ok(())
}
