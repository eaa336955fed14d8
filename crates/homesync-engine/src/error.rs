use homesync_core::{EntityKind, StoreError};
use thiserror::Error;

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Classified failure of a single outbound call.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("no connection to server: {0}")]
    NoConnection(String),

    #[error("request timed out")]
    Timeout,

    #[error("authentication failed (HTTP {0})")]
    AuthFailure(u16),

    #[error("server error (HTTP {0})")]
    ServerError(u16),

    #[error("malformed payload: {0}")]
    ParseError(String),
}

impl TransportError {
    /// Connectivity failures. These flip the offline gate.
    pub fn is_transient(&self) -> bool {
        matches!(self, TransportError::NoConnection(_) | TransportError::Timeout)
    }
}

/// A transport that cannot be built from its configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("invalid server URL {url}: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("failed to build HTTP client: {0}")]
    Client(String),
}

/// Errors surfaced by sync tasks, sessions and refreshes.
#[derive(Error, Debug)]
pub enum SyncError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// The request token was cancelled before the outcome was delivered.
    #[error("sync cancelled")]
    Cancelled,

    #[error("sync task failed: {0}")]
    TaskPanicked(String),

    /// One or more kinds of a refresh failed. Kinds in `committed` were
    /// replaced and stay replaced.
    #[error("refresh failed for {failed:?} ({committed:?} committed): {first}")]
    Partial {
        first: Box<SyncError>,
        failed: Vec<EntityKind>,
        committed: Vec<EntityKind>,
    },
}

impl SyncError {
    /// The transport error behind this failure, if any.
    pub fn transport(&self) -> Option<&TransportError> {
        match self {
            SyncError::Transport(e) => Some(e),
            SyncError::Partial { first, .. } => first.transport(),
            _ => None,
        }
    }

    /// Could not reach the server; cached data is still valid to show.
    pub fn is_transient(&self) -> bool {
        self.transport().is_some_and(TransportError::is_transient)
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, SyncError::Cancelled)
    }
}
