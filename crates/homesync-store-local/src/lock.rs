use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

use fs2::FileExt;
use homesync_core::StoreError;
use tracing::debug;

/// Exclusive lock on a data directory.
///
/// Uses OS-level file locking (flock on Unix, LockFile on Windows) on
/// `{dir}/.lock`. The lock is held as long as this value lives; a crashed
/// process releases it automatically when the OS closes its descriptors.
#[derive(Debug)]
pub struct DirLock {
    path: PathBuf,
    file: File,
}

impl DirLock {
    /// Try to lock `dir`. Fails immediately if another holder has it.
    pub fn acquire(dir: impl AsRef<Path>) -> Result<Self, StoreError> {
        let dir = dir.as_ref();
        std::fs::create_dir_all(dir).map_err(|e| {
            StoreError::Io(format!("Failed to create data dir {}: {}", dir.display(), e))
        })?;

        let path = dir.join(".lock");
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&path)
            .map_err(|e| StoreError::Lock(format!("Failed to open {}: {}", path.display(), e)))?;

        file.try_lock_exclusive().map_err(|e| {
            StoreError::Lock(format!(
                "Data dir {} is in use by another process: {}",
                dir.display(),
                e
            ))
        })?;

        debug!("Acquired data dir lock {}", path.display());
        Ok(Self { path, file })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for DirLock {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.file);
        debug!("Released data dir lock {}", self.path.display());
    }
}
