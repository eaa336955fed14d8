//! Local filesystem backend for the homesync cache.
//!
//! Layout:
//! ```text
//! {data_dir}/
//!   .lock
//!   preferences.json
//!   tables/
//!     {kind}.json
//! ```

mod atomic;
mod lock;
mod prefs;
mod store;

pub use lock::DirLock;
pub use prefs::FilePreferences;
pub use store::FileStore;
