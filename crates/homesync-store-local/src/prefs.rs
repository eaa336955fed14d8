use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use homesync_core::{PreferenceStore, StoreError};
use serde::{Deserialize, Serialize};
use tokio::fs;
use tracing::{debug, instrument};

use crate::atomic::write_atomic;

/// On-disk format of the preference file.
#[derive(Debug, Default, Serialize, Deserialize)]
struct PreferenceFile {
    #[serde(default = "default_version")]
    version: u32,
    #[serde(default)]
    entries: BTreeMap<String, String>,
}

fn default_version() -> u32 {
    1
}

/// JSON-file preference store.
///
/// Entries live in memory between `load` and `flush`; `flush` rewrites the
/// whole file atomically.
#[derive(Debug)]
pub struct FilePreferences {
    path: PathBuf,
    entries: RwLock<BTreeMap<String, String>>,
}

impl FilePreferences {
    /// Create a store backed by `path`. Nothing is read until `load`.
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            entries: RwLock::new(BTreeMap::new()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read(&self) -> RwLockReadGuard<'_, BTreeMap<String, String>> {
        self.entries.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, BTreeMap<String, String>> {
        self.entries.write().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl PreferenceStore for FilePreferences {
    #[instrument(skip(self), level = "debug")]
    async fn load(&self) -> Result<(), StoreError> {
        let entries = match fs::read(&self.path).await {
            Ok(data) => serde_json::from_slice::<PreferenceFile>(&data)?.entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => {
                return Err(StoreError::Io(format!(
                    "Failed to read {}: {}",
                    self.path.display(),
                    e
                )))
            }
        };

        debug!("Loaded {} preferences", entries.len());
        *self.write() = entries;
        Ok(())
    }

    #[instrument(skip(self), level = "debug")]
    async fn flush(&self) -> Result<(), StoreError> {
        let file = PreferenceFile {
            version: default_version(),
            entries: self.read().clone(),
        };
        let json = serde_json::to_vec_pretty(&file)?;

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).await.map_err(|e| {
                StoreError::Io(format!("Failed to create dir {}: {}", parent.display(), e))
            })?;
        }
        write_atomic(&self.path, &json).await?;

        debug!("Flushed {} preferences", file.entries.len());
        Ok(())
    }

    fn get(&self, key: &str) -> Option<String> {
        self.read().get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) {
        self.write().insert(key.to_string(), value.to_string());
    }

    fn remove(&self, key: &str) -> bool {
        self.write().remove(key).is_some()
    }

    fn keys(&self) -> Vec<String> {
        self.read().keys().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_flush_and_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("preferences.json");

        let prefs = FilePreferences::new(&path);
        prefs.load().await.unwrap();
        assert!(prefs.keys().is_empty());

        prefs.set("db_last_time_products", "2024-01-01 00:00:00");
        prefs.set("server_url", "https://example.test/api");
        prefs.flush().await.unwrap();

        let reopened = FilePreferences::new(&path);
        assert!(reopened.get("server_url").is_none());
        reopened.load().await.unwrap();
        assert_eq!(
            reopened.get("db_last_time_products").as_deref(),
            Some("2024-01-01 00:00:00")
        );
        assert_eq!(reopened.keys().len(), 2);
    }

    #[tokio::test]
    async fn test_unflushed_changes_are_lost() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("preferences.json");

        let prefs = FilePreferences::new(&path);
        prefs.set("a", "1");
        prefs.flush().await.unwrap();
        prefs.set("b", "2");
        assert!(prefs.remove("a"));
        assert!(!prefs.remove("a"));

        let reopened = FilePreferences::new(&path);
        reopened.load().await.unwrap();
        assert_eq!(reopened.get("a").as_deref(), Some("1"));
        assert!(reopened.get("b").is_none());
    }

    #[tokio::test]
    async fn test_load_rejects_garbage() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("preferences.json");
        tokio::fs::write(&path, b"not json").await.unwrap();

        let prefs = FilePreferences::new(&path);
        assert!(matches!(
            prefs.load().await,
            Err(StoreError::Serialization(_))
        ));
    }
}
