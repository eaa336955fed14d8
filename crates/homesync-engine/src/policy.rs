//! Change-token guarded refresh of a single kind.

use std::fmt;
use std::sync::Arc;

use dashmap::DashMap;
use homesync_core::{EntityKind, LocalStore, StoreError, TableSnapshot};
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, info, instrument, warn};

use crate::descriptor::EntityDescriptor;
use crate::error::{SyncError, SyncResult};
use crate::manifest::ManifestSource;
use crate::token::RequestToken;
use crate::transport::{Method, Transport};

/// Result of syncing one kind.
#[derive(Debug, Clone)]
pub enum SyncOutcome {
    /// Local token matched the server; nothing was fetched.
    Unchanged,
    /// Rows and token were replaced.
    Changed(Arc<TableSnapshot>),
}

impl SyncOutcome {
    pub fn is_changed(&self) -> bool {
        matches!(self, SyncOutcome::Changed(_))
    }
}

/// Decides per kind whether to fetch, and commits what it fetched.
pub struct EntitySyncPolicy {
    transport: Arc<dyn Transport>,
    store: Arc<dyn LocalStore>,
    /// One lock per kind, created on first use.
    locks: DashMap<EntityKind, Arc<Mutex<()>>>,
}

impl fmt::Debug for EntitySyncPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntitySyncPolicy")
            .field("store", &self.store.backend_name())
            .field("locks", &self.locks.len())
            .finish_non_exhaustive()
    }
}

impl EntitySyncPolicy {
    pub fn new(transport: Arc<dyn Transport>, store: Arc<dyn LocalStore>) -> Self {
        Self {
            transport,
            store,
            locks: DashMap::new(),
        }
    }

    fn lock_for(&self, kind: EntityKind) -> Arc<Mutex<()>> {
        self.locks.entry(kind).or_default().clone()
    }

    async fn lock_kind(&self, kind: EntityKind) -> OwnedMutexGuard<()> {
        self.lock_for(kind).lock_owned().await
    }

    /// Bring one kind up to date.
    ///
    /// Skips the fetch when `force` is false and the stored token equals the
    /// server's. Otherwise fetches the collection and replaces rows and token
    /// together. On any error the store is left as it was.
    #[instrument(skip(self, descriptor, manifest, token), fields(kind = %descriptor.kind), level = "debug")]
    pub async fn sync(
        &self,
        descriptor: &EntityDescriptor,
        force: bool,
        manifest: &ManifestSource,
        token: &RequestToken,
    ) -> SyncResult<SyncOutcome> {
        let kind = descriptor.kind;
        let _guard = self.lock_kind(kind).await;

        let local = self.store.token(kind).await?;
        let server = manifest.token_for(kind).await?;

        if !force && local.as_deref() == Some(server.as_str()) {
            debug!("{} unchanged at {}", kind, server);
            return Ok(SyncOutcome::Unchanged);
        }

        debug!(
            "Fetching {} (local {:?}, server {}, force {})",
            kind, local, server, force
        );
        let payload = self.transport.call(Method::Get, descriptor.path, None).await?;
        let rows = descriptor.parse(&payload).inspect_err(|e| {
            warn!("Discarding {} payload, keeping cached rows: {}", kind, e);
        })?;

        if token.is_cancelled() {
            debug!("Not committing {}: request scope cancelled", kind);
            return Err(SyncError::Cancelled);
        }

        // Re-checked by the store once it excludes other writers, so a cancel
        // that lands while the commit waits still prevents the write.
        let still_wanted = || !token.is_cancelled();
        let snapshot = match self
            .store
            .replace_if(kind, rows, &server, &still_wanted)
            .await
        {
            Ok(snapshot) => snapshot,
            Err(StoreError::CommitRejected(_)) => {
                debug!("Not committing {}: request scope cancelled", kind);
                return Err(SyncError::Cancelled);
            }
            Err(e) => return Err(e.into()),
        };
        info!("Replaced {} with {} rows at {}", kind, snapshot.len(), server);
        Ok(SyncOutcome::Changed(snapshot))
    }

    /// Drop the stored token of `kind` once no sync of it is running.
    pub async fn invalidate(&self, kind: EntityKind) -> SyncResult<bool> {
        let _guard = self.lock_kind(kind).await;
        Ok(self.store.invalidate(kind).await?)
    }

    /// Drop every table once no sync is running.
    pub async fn clear(&self) -> SyncResult<()> {
        let mut guards = Vec::with_capacity(EntityKind::ALL.len());
        for kind in EntityKind::ALL {
            guards.push(self.lock_kind(kind).await);
        }
        self.store.clear().await?;
        Ok(())
    }
}
