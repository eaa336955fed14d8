//! Process-wide online/offline flag.

use std::fmt;
use std::sync::Arc;

use tokio::sync::watch;
use tracing::{info, warn};

/// Last observed reachability of the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Connectivity {
    Online,
    Offline,
}

impl fmt::Display for Connectivity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Connectivity::Online => write!(f, "online"),
            Connectivity::Offline => write!(f, "offline"),
        }
    }
}

/// Shared offline flag.
///
/// Clones share the same state. Only the transport mutates it: a connectivity
/// failure (no connection, timeout) marks it offline, the next successful
/// call marks it online again. Starts online.
#[derive(Clone)]
pub struct OfflineGate {
    state: Arc<watch::Sender<Connectivity>>,
}

impl fmt::Debug for OfflineGate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OfflineGate")
            .field("state", &self.state())
            .finish()
    }
}

impl Default for OfflineGate {
    fn default() -> Self {
        Self::new()
    }
}

impl OfflineGate {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(Connectivity::Online);
        Self {
            state: Arc::new(tx),
        }
    }

    pub fn state(&self) -> Connectivity {
        *self.state.borrow()
    }

    pub fn is_offline(&self) -> bool {
        self.state() == Connectivity::Offline
    }

    /// Observe transitions.
    pub fn subscribe(&self) -> watch::Receiver<Connectivity> {
        self.state.subscribe()
    }

    pub(crate) fn mark_online(&self) {
        if self.transition(Connectivity::Online) {
            info!("Server reachable again, leaving offline mode");
        }
    }

    pub(crate) fn mark_offline(&self, reason: &str) {
        if self.transition(Connectivity::Offline) {
            warn!("Server unreachable ({}), entering offline mode", reason);
        }
    }

    /// Returns whether the state changed.
    fn transition(&self, to: Connectivity) -> bool {
        self.state.send_if_modified(|current| {
            if *current == to {
                false
            } else {
                *current = to;
                true
            }
        })
    }
}
