//! Core traits and types for the homesync local cache.
//!
//! This crate defines the abstractions shared between the sync engine and
//! the storage implementations:
//! - `EntityKind`: the server-side collections mirrored locally
//! - `LocalStore`: per-kind snapshots with their change-tokens
//! - `PreferenceStore`: injected key-value store with load/flush boundaries
//! - Typed row views consumed by readers of the cache

mod error;
mod kind;
mod prefs;
mod store;
mod units;

pub use error::StoreError;
pub use kind::EntityKind;
pub use prefs::PreferenceStore;
pub use store::{LocalStore, Row, TableSnapshot, TableStatus};
pub use units::{QuantityUnit, QuantityUnitConversion};
