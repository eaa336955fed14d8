use std::sync::Arc;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::StoreError;
use crate::kind::EntityKind;

/// One cached row. Columns mirror the server's field set 1:1.
pub type Row = serde_json::Map<String, serde_json::Value>;

/// An immutable snapshot of one kind's table together with its change-token.
///
/// Snapshots are never modified in place. A replace builds a new snapshot and
/// swaps the shared pointer, so a reader holding an `Arc<TableSnapshot>` always
/// sees rows and token that were committed together.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableSnapshot {
    pub kind: EntityKind,
    /// Token the server reported when these rows were fetched.
    /// `None` after an explicit invalidation.
    pub change_token: Option<String>,
    /// When the rows were fetched
    #[serde(default)]
    pub fetched_at: Option<chrono::DateTime<chrono::Utc>>,
    #[serde(default)]
    pub rows: Vec<Row>,
}

impl TableSnapshot {
    /// Create a snapshot stamped with the current time.
    pub fn new(kind: EntityKind, rows: Vec<Row>, change_token: impl Into<String>) -> Self {
        Self {
            kind,
            change_token: Some(change_token.into()),
            fetched_at: Some(chrono::Utc::now()),
            rows,
        }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Decode every row into a typed view.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<Vec<T>, StoreError> {
        self.rows
            .iter()
            .map(|row| {
                serde_json::from_value(serde_json::Value::Object(row.clone())).map_err(|e| {
                    StoreError::Serialization(format!("Failed to decode {} row: {}", self.kind, e))
                })
            })
            .collect()
    }
}

/// Summary of one cached table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableStatus {
    pub kind: EntityKind,
    pub rows: usize,
    pub change_token: Option<String>,
    pub fetched_at: Option<chrono::DateTime<chrono::Utc>>,
}

impl From<&TableSnapshot> for TableStatus {
    fn from(snapshot: &TableSnapshot) -> Self {
        Self {
            kind: snapshot.kind,
            rows: snapshot.rows.len(),
            change_token: snapshot.change_token.clone(),
            fetched_at: snapshot.fetched_at,
        }
    }
}

/// Local replica of the server's collections.
///
/// Each kind owns one table and one change-token. The pair is always read and
/// written as a unit: no reader may observe new rows with an old token, old
/// rows with a new token, or an empty table in the middle of a replace.
///
/// Only the sync engine writes. Everything else reads snapshots.
#[async_trait]
pub trait LocalStore: Send + Sync {
    /// Returns the backend identifier (e.g., "file").
    fn backend_name(&self) -> &'static str;

    /// Current snapshot of a kind, if it was ever synced.
    async fn snapshot(&self, kind: EntityKind) -> Result<Option<Arc<TableSnapshot>>, StoreError>;

    /// Current change-token of a kind.
    async fn token(&self, kind: EntityKind) -> Result<Option<String>, StoreError> {
        Ok(self
            .snapshot(kind)
            .await?
            .and_then(|snapshot| snapshot.change_token.clone()))
    }

    /// Atomically replace a kind's rows and token.
    async fn replace(
        &self,
        kind: EntityKind,
        rows: Vec<Row>,
        change_token: &str,
    ) -> Result<Arc<TableSnapshot>, StoreError> {
        let always = || true;
        self.replace_if(kind, rows, change_token, &always).await
    }

    /// Like [`LocalStore::replace`], but `commit` is evaluated at the point
    /// the new snapshot would become visible, with writers excluded. When it
    /// returns false nothing is written and `StoreError::CommitRejected` is
    /// returned.
    async fn replace_if(
        &self,
        kind: EntityKind,
        rows: Vec<Row>,
        change_token: &str,
        commit: &(dyn Fn() -> bool + Send + Sync),
    ) -> Result<Arc<TableSnapshot>, StoreError>;

    /// Forget a kind's token while keeping its rows readable.
    /// Returns whether a token was stored.
    async fn invalidate(&self, kind: EntityKind) -> Result<bool, StoreError>;

    /// Drop every table and token.
    async fn clear(&self) -> Result<(), StoreError>;

    /// Status of every cached table, in kind order.
    async fn status(&self) -> Result<Vec<TableStatus>, StoreError>;

    /// Flush pending state. Called on shutdown.
    async fn close(&self) -> Result<(), StoreError>;
}
