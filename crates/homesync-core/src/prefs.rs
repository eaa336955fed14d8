use async_trait::async_trait;

use crate::error::StoreError;

/// Key-value preference store with explicit lifecycle boundaries.
///
/// Implementations hold their entries in memory between `load` and `flush`:
/// - `load` is called once on startup and replaces the in-memory entries
///   with the persisted ones
/// - `get`/`set`/`remove` only touch memory
/// - `flush` persists the current entries and is called on shutdown
///   (and may be called at any other time)
#[async_trait]
pub trait PreferenceStore: Send + Sync {
    /// Load persisted entries, replacing anything held in memory.
    async fn load(&self) -> Result<(), StoreError>;

    /// Persist the current entries.
    async fn flush(&self) -> Result<(), StoreError>;

    fn get(&self, key: &str) -> Option<String>;

    fn set(&self, key: &str, value: &str);

    /// Remove an entry. Returns whether it existed.
    fn remove(&self, key: &str) -> bool;

    /// All keys currently held, sorted.
    fn keys(&self) -> Vec<String>;
}
