use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use homesync_core::{
    EntityKind, LocalStore, PreferenceStore, Row, StoreError, TableSnapshot, TableStatus,
};
use tokio::fs;
use tokio::sync::RwLock;
use tracing::{debug, info, instrument, warn};

use crate::atomic::{publish, remove_if_exists, stage, write_atomic};
use crate::lock::DirLock;

/// Local filesystem cache.
///
/// Each kind's rows and change-token are persisted together in one file
/// (`tables/{kind}.json`), written via temp file + rename, so the on-disk pair
/// is replaced as a unit. In memory every kind maps to an immutable
/// `Arc<TableSnapshot>`; a replace stages the new file, then renames it into
/// place and swaps the pointer under the write lock.
///
/// Tokens are mirrored into the injected preference store under each kind's
/// token key. The table files are authoritative: `open` reconciles the
/// preference entries against them.
pub struct FileStore {
    base_dir: PathBuf,
    prefs: Arc<dyn PreferenceStore>,
    tables: RwLock<BTreeMap<EntityKind, Arc<TableSnapshot>>>,
    _lock: DirLock,
}

impl std::fmt::Debug for FileStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileStore")
            .field("base_dir", &self.base_dir)
            .finish_non_exhaustive()
    }
}

impl FileStore {
    /// Open (or create) a store in `base_dir`.
    ///
    /// Locks the directory, loads the preference store and every table file,
    /// and repairs token entries that disagree with the tables.
    pub async fn open(
        base_dir: impl AsRef<Path>,
        prefs: Arc<dyn PreferenceStore>,
    ) -> Result<Self, StoreError> {
        let base_dir = base_dir.as_ref().to_path_buf();
        let lock = DirLock::acquire(&base_dir)?;

        let tables_dir = Self::tables_dir_in(&base_dir);
        fs::create_dir_all(&tables_dir).await.map_err(|e| {
            StoreError::Io(format!(
                "Failed to create tables dir {}: {}",
                tables_dir.display(),
                e
            ))
        })?;

        prefs.load().await?;

        let mut tables = BTreeMap::new();
        for kind in EntityKind::ALL {
            if let Some(snapshot) = Self::load_table(&tables_dir, kind).await? {
                tables.insert(kind, Arc::new(snapshot));
            }
        }

        let repaired = Self::reconcile(prefs.as_ref(), &tables);
        if repaired > 0 {
            info!("Repaired {} change-token entries from table files", repaired);
            prefs.flush().await?;
        }

        info!(
            "Opened cache at {} ({} tables)",
            base_dir.display(),
            tables.len()
        );

        Ok(Self {
            base_dir,
            prefs,
            tables: RwLock::new(tables),
            _lock: lock,
        })
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    fn tables_dir_in(base_dir: &Path) -> PathBuf {
        base_dir.join("tables")
    }

    fn table_path(&self, kind: EntityKind) -> PathBuf {
        Self::tables_dir_in(&self.base_dir).join(format!("{}.json", kind.name()))
    }

    /// Read one table file. A corrupt file is dropped so the kind refetches.
    async fn load_table(
        tables_dir: &Path,
        kind: EntityKind,
    ) -> Result<Option<TableSnapshot>, StoreError> {
        let path = tables_dir.join(format!("{}.json", kind.name()));
        let data = match fs::read(&path).await {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(StoreError::Io(format!(
                    "Failed to read {}: {}",
                    path.display(),
                    e
                )))
            }
        };

        match serde_json::from_slice::<TableSnapshot>(&data) {
            Ok(snapshot) if snapshot.kind == kind => {
                debug!("Loaded table {} ({} rows)", kind, snapshot.rows.len());
                Ok(Some(snapshot))
            }
            Ok(snapshot) => {
                warn!(
                    "Table file {} holds kind {}, discarding",
                    path.display(),
                    snapshot.kind
                );
                remove_if_exists(&path).await?;
                Ok(None)
            }
            Err(e) => {
                warn!("Corrupt table file {}: {}, discarding", path.display(), e);
                remove_if_exists(&path).await?;
                Ok(None)
            }
        }
    }

    /// Align preference token entries with the loaded tables.
    /// Returns the number of entries changed.
    fn reconcile(
        prefs: &dyn PreferenceStore,
        tables: &BTreeMap<EntityKind, Arc<TableSnapshot>>,
    ) -> usize {
        let mut repaired = 0;
        for kind in EntityKind::ALL {
            let key = kind.token_key();
            let table_token = tables.get(&kind).and_then(|t| t.change_token.clone());
            let pref_token = prefs.get(&key);

            if table_token == pref_token {
                continue;
            }

            match &table_token {
                Some(token) => prefs.set(&key, token),
                None => {
                    prefs.remove(&key);
                }
            }
            debug!(
                "Token for {} repaired: {:?} -> {:?}",
                kind, pref_token, table_token
            );
            repaired += 1;
        }
        repaired
    }

    async fn persist(&self, snapshot: &TableSnapshot) -> Result<(), StoreError> {
        let json = serde_json::to_vec(snapshot)?;
        write_atomic(&self.table_path(snapshot.kind), &json).await
    }
}

#[async_trait]
impl LocalStore for FileStore {
    fn backend_name(&self) -> &'static str {
        "file"
    }

    async fn snapshot(&self, kind: EntityKind) -> Result<Option<Arc<TableSnapshot>>, StoreError> {
        Ok(self.tables.read().await.get(&kind).cloned())
    }

    #[instrument(skip(self, rows, commit), level = "debug", fields(rows = rows.len()))]
    async fn replace_if(
        &self,
        kind: EntityKind,
        rows: Vec<Row>,
        change_token: &str,
        commit: &(dyn Fn() -> bool + Send + Sync),
    ) -> Result<Arc<TableSnapshot>, StoreError> {
        let snapshot = Arc::new(TableSnapshot::new(kind, rows, change_token));
        let path = self.table_path(kind);

        // Readers and other kinds are not blocked while the file is written;
        // only the rename and the swap happen under the write lock.
        let json = serde_json::to_vec(snapshot.as_ref())?;
        let staged = stage(&path, &json).await?;

        let mut tables = self.tables.write().await;
        if !commit() {
            drop(tables);
            remove_if_exists(&staged).await?;
            debug!("Replace of {} rejected at commit", kind);
            return Err(StoreError::CommitRejected(kind.to_string()));
        }
        publish(&staged, &path).await?;
        self.prefs.set(&kind.token_key(), change_token);
        tables.insert(kind, snapshot.clone());
        drop(tables);

        debug!(
            "Replaced {} ({} rows, token {})",
            kind,
            snapshot.rows.len(),
            change_token
        );
        Ok(snapshot)
    }

    #[instrument(skip(self), level = "debug")]
    async fn invalidate(&self, kind: EntityKind) -> Result<bool, StoreError> {
        let mut tables = self.tables.write().await;
        let Some(current) = tables.get(&kind).cloned() else {
            return Ok(false);
        };
        if current.change_token.is_none() {
            return Ok(false);
        }

        let snapshot = Arc::new(TableSnapshot {
            change_token: None,
            ..current.as_ref().clone()
        });
        self.persist(&snapshot).await?;
        self.prefs.remove(&kind.token_key());
        tables.insert(kind, snapshot);

        debug!("Invalidated {}", kind);
        Ok(true)
    }

    #[instrument(skip(self), level = "debug")]
    async fn clear(&self) -> Result<(), StoreError> {
        let mut tables = self.tables.write().await;
        for kind in EntityKind::ALL {
            remove_if_exists(&self.table_path(kind)).await?;
            self.prefs.remove(&kind.token_key());
        }
        tables.clear();
        self.prefs.flush().await?;

        info!("Cleared cache at {}", self.base_dir.display());
        Ok(())
    }

    async fn status(&self) -> Result<Vec<TableStatus>, StoreError> {
        Ok(self
            .tables
            .read()
            .await
            .values()
            .map(|snapshot| TableStatus::from(snapshot.as_ref()))
            .collect())
    }

    #[instrument(skip(self), level = "debug")]
    async fn close(&self) -> Result<(), StoreError> {
        // Hold the read lock so no replace lands between snapshot and flush.
        let _tables = self.tables.read().await;
        self.prefs.flush().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prefs::FilePreferences;
    use serde_json::json;
    use tempfile::TempDir;

    fn rows(values: serde_json::Value) -> Vec<Row> {
        values
            .as_array()
            .unwrap()
            .iter()
            .map(|v| v.as_object().unwrap().clone())
            .collect()
    }

    fn prefs_in(dir: &TempDir) -> Arc<FilePreferences> {
        Arc::new(FilePreferences::new(dir.path().join("preferences.json")))
    }

    async fn setup() -> (FileStore, Arc<FilePreferences>, TempDir) {
        let dir = TempDir::new().unwrap();
        let prefs = prefs_in(&dir);
        let store = FileStore::open(dir.path(), prefs.clone()).await.unwrap();
        (store, prefs, dir)
    }

    #[tokio::test]
    async fn test_empty_store() {
        let (store, _prefs, _dir) = setup().await;
        assert_eq!(store.backend_name(), "file");
        assert!(store.snapshot(EntityKind::Products).await.unwrap().is_none());
        assert!(store.token(EntityKind::Products).await.unwrap().is_none());
        assert!(store.status().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_replace_sets_rows_and_token() {
        let (store, prefs, _dir) = setup().await;
        let data = rows(json!([{"id": 1, "name": "Milk"}, {"id": 2, "name": "Bread"}]));

        let snapshot = store
            .replace(EntityKind::Products, data.clone(), "t1")
            .await
            .unwrap();
        assert_eq!(snapshot.rows, data);

        let current = store.snapshot(EntityKind::Products).await.unwrap().unwrap();
        assert_eq!(current.rows, data);
        assert_eq!(current.change_token.as_deref(), Some("t1"));
        assert!(current.fetched_at.is_some());
        assert_eq!(
            prefs.get(&EntityKind::Products.token_key()).as_deref(),
            Some("t1")
        );
    }

    #[tokio::test]
    async fn test_held_snapshot_is_unaffected_by_replace() {
        let (store, _prefs, _dir) = setup().await;
        store
            .replace(EntityKind::Locations, rows(json!([{"id": 1}])), "t1")
            .await
            .unwrap();

        let held = store.snapshot(EntityKind::Locations).await.unwrap().unwrap();
        store
            .replace(
                EntityKind::Locations,
                rows(json!([{"id": 1}, {"id": 2}])),
                "t2",
            )
            .await
            .unwrap();

        assert_eq!(held.rows.len(), 1);
        assert_eq!(held.change_token.as_deref(), Some("t1"));
        let fresh = store.snapshot(EntityKind::Locations).await.unwrap().unwrap();
        assert_eq!(fresh.rows.len(), 2);
        assert_eq!(fresh.change_token.as_deref(), Some("t2"));
    }

    #[tokio::test]
    async fn test_reopen_restores_tables() {
        let dir = TempDir::new().unwrap();
        {
            let store = FileStore::open(dir.path(), prefs_in(&dir)).await.unwrap();
            store
                .replace(EntityKind::QuantityUnits, rows(json!([{"id": 1, "name": "Piece"}])), "t9")
                .await
                .unwrap();
            store.close().await.unwrap();
        }

        let store = FileStore::open(dir.path(), prefs_in(&dir)).await.unwrap();
        let snapshot = store
            .snapshot(EntityKind::QuantityUnits)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(snapshot.rows.len(), 1);
        assert_eq!(snapshot.change_token.as_deref(), Some("t9"));
    }

    #[tokio::test]
    async fn test_open_repairs_stale_preferences() {
        let dir = TempDir::new().unwrap();
        {
            // Replace without flushing the preferences: simulates a crash
            // after the table file was renamed into place.
            let store = FileStore::open(dir.path(), prefs_in(&dir)).await.unwrap();
            store
                .replace(EntityKind::Stores, rows(json!([{"id": 3}])), "fresh")
                .await
                .unwrap();
        }
        {
            // A token for a kind that has no table at all.
            let prefs = prefs_in(&dir);
            prefs.load().await.unwrap();
            assert!(prefs.get(&EntityKind::Stores.token_key()).is_none());
            prefs.set(&EntityKind::Tasks.token_key(), "orphan");
            prefs.flush().await.unwrap();
        }

        let prefs = prefs_in(&dir);
        let store = FileStore::open(dir.path(), prefs.clone()).await.unwrap();
        assert_eq!(
            prefs.get(&EntityKind::Stores.token_key()).as_deref(),
            Some("fresh")
        );
        assert!(prefs.get(&EntityKind::Tasks.token_key()).is_none());
        assert_eq!(
            store.token(EntityKind::Stores).await.unwrap().as_deref(),
            Some("fresh")
        );
    }

    #[tokio::test]
    async fn test_corrupt_table_is_discarded() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join("tables")).unwrap();
        std::fs::write(dir.path().join("tables").join("recipes.json"), b"{oops").unwrap();

        let store = FileStore::open(dir.path(), prefs_in(&dir)).await.unwrap();
        assert!(store.snapshot(EntityKind::Recipes).await.unwrap().is_none());
        assert!(!dir.path().join("tables").join("recipes.json").exists());
    }

    #[tokio::test]
    async fn test_invalidate_keeps_rows() {
        let (store, prefs, _dir) = setup().await;
        assert!(!store.invalidate(EntityKind::Chores).await.unwrap());

        store
            .replace(EntityKind::Chores, rows(json!([{"id": 1}])), "t1")
            .await
            .unwrap();
        assert!(store.invalidate(EntityKind::Chores).await.unwrap());
        assert!(!store.invalidate(EntityKind::Chores).await.unwrap());

        let snapshot = store.snapshot(EntityKind::Chores).await.unwrap().unwrap();
        assert_eq!(snapshot.rows.len(), 1);
        assert!(snapshot.change_token.is_none());
        assert!(prefs.get(&EntityKind::Chores.token_key()).is_none());
    }

    #[tokio::test]
    async fn test_clear_drops_everything() {
        let (store, prefs, dir) = setup().await;
        store
            .replace(EntityKind::Batteries, rows(json!([{"id": 1}])), "t1")
            .await
            .unwrap();
        store
            .replace(EntityKind::Equipment, rows(json!([{"id": 2}])), "t2")
            .await
            .unwrap();
        assert_eq!(store.status().await.unwrap().len(), 2);

        store.clear().await.unwrap();

        assert!(store.status().await.unwrap().is_empty());
        assert!(prefs.keys().is_empty());
        assert!(!dir.path().join("tables").join("batteries.json").exists());
    }

    #[tokio::test]
    async fn test_second_open_is_refused() {
        let (_store, _prefs, dir) = setup().await;
        let second = FileStore::open(dir.path(), prefs_in(&dir)).await;
        assert!(matches!(second, Err(StoreError::Lock(_))));
    }

    fn table_files(dir: &TempDir) -> Vec<String> {
        let mut names: Vec<String> = std::fs::read_dir(dir.path().join("tables"))
            .unwrap()
            .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    #[tokio::test]
    async fn test_rejected_replace_keeps_previous_pair() {
        let (store, prefs, dir) = setup().await;
        store
            .replace(EntityKind::Recipes, rows(json!([{"id": 1}])), "t1")
            .await
            .unwrap();

        let calls = std::sync::atomic::AtomicUsize::new(0);
        let reject = || {
            calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            false
        };
        let err = store
            .replace_if(
                EntityKind::Recipes,
                rows(json!([{"id": 1}, {"id": 2}])),
                "t2",
                &reject,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::CommitRejected(_)));
        assert_eq!(calls.load(std::sync::atomic::Ordering::SeqCst), 1);

        let current = store.snapshot(EntityKind::Recipes).await.unwrap().unwrap();
        assert_eq!(current.len(), 1);
        assert_eq!(current.change_token.as_deref(), Some("t1"));
        assert_eq!(
            prefs.get(&EntityKind::Recipes.token_key()).as_deref(),
            Some("t1")
        );
        assert_eq!(table_files(&dir), vec!["recipes.json".to_string()]);

        drop(store);
        let reopened = FileStore::open(dir.path(), prefs_in(&dir)).await.unwrap();
        let restored = reopened.snapshot(EntityKind::Recipes).await.unwrap().unwrap();
        assert_eq!(restored.change_token.as_deref(), Some("t1"));
    }

    #[tokio::test]
    async fn test_concurrent_replaces_of_different_kinds() {
        let (store, _prefs, dir) = setup().await;
        let kinds = [EntityKind::Products, EntityKind::Locations, EntityKind::Stores];
        let shared = &store;
        let write = move |kind| shared.replace(kind, rows(json!([{"id": 1}, {"id": 2}])), "t1");

        let (a, b, c) = tokio::join!(write(kinds[0]), write(kinds[1]), write(kinds[2]));
        a.unwrap();
        b.unwrap();
        c.unwrap();

        let status = store.status().await.unwrap();
        assert_eq!(status.len(), kinds.len());
        assert!(status.iter().all(|table| table.rows == 2));
        assert!(table_files(&dir).iter().all(|name| !name.ends_with(".tmp")));
    }
}
