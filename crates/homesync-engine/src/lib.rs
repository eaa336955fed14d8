//! Sync engine for the homesync local cache.
//!
//! Mirrors the server's collections into a [`LocalStore`](homesync_core::LocalStore):
//! - `transport`: classified HTTP calls and the offline gate they drive
//! - `token`, `task`, `session`: cancellable tasks and fan-out/join sessions
//! - `manifest`, `descriptor`, `policy`: change-token checks and per-kind refresh
//! - `orchestrator`: refresh of many kinds at once, as used by screens

pub mod config;
mod descriptor;
mod error;
mod gate;
mod manifest;
mod orchestrator;
mod policy;
mod session;
mod task;
mod token;
mod transport;

pub use descriptor::{descriptor, EntityDescriptor, PayloadShape, DESCRIPTORS};
pub use error::{ConfigError, SyncError, SyncResult, TransportError};
pub use gate::{Connectivity, OfflineGate};
pub use manifest::{ChangeManifest, ManifestSource, DEFAULT_MANIFEST_PATH};
pub use orchestrator::{Orchestrator, RefreshReport};
pub use policy::{EntitySyncPolicy, SyncOutcome};
pub use session::{SessionOutcome, SyncSession};
pub use task::{SyncTask, TaskOutcome};
pub use token::{RequestScope, RequestToken};
pub use transport::{
    fetch_server_info, get_json, HttpTransport, Method, ServerInfo, Transport, TransportConfig,
    API_KEY_HEADER,
};
