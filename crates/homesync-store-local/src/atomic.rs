use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use homesync_core::StoreError;
use tokio::fs;

static NEXT_STAGE: AtomicU64 = AtomicU64::new(0);

/// Write a file atomically via a sibling temp file and a rename.
pub(crate) async fn write_atomic(path: &Path, data: &[u8]) -> Result<(), StoreError> {
    let staged = stage(path, data).await?;
    publish(&staged, path).await
}

/// Write `data` to a fresh sibling temp file of `path` without touching `path`.
pub(crate) async fn stage(path: &Path, data: &[u8]) -> Result<PathBuf, StoreError> {
    let mut temp_name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    temp_name.push(format!(".{}.tmp", NEXT_STAGE.fetch_add(1, Ordering::Relaxed)));
    let temp_path = path.with_file_name(temp_name);

    fs::write(&temp_path, data).await.map_err(|e| {
        StoreError::Io(format!("Failed to write {}: {}", temp_path.display(), e))
    })?;
    Ok(temp_path)
}

/// Move a staged file over `path`.
pub(crate) async fn publish(staged: &Path, path: &Path) -> Result<(), StoreError> {
    if let Err(e) = fs::rename(staged, path).await {
        let _ = fs::remove_file(staged).await;
        return Err(StoreError::Io(format!(
            "Failed to rename to {}: {}",
            path.display(),
            e
        )));
    }
    Ok(())
}

/// Remove a file, treating a missing file as success.
pub(crate) async fn remove_if_exists(path: &Path) -> Result<bool, StoreError> {
    match fs::remove_file(path).await {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(StoreError::Io(format!(
            "Failed to delete {}: {}",
            path.display(),
            e
        ))),
    }
}
