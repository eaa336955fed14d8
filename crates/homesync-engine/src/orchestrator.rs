//! Refresh of many kinds as one session.

use std::fmt;
use std::sync::Arc;

use homesync_core::{EntityKind, LocalStore, TableSnapshot, TableStatus};
use tokio::task::JoinHandle;
use tracing::{info, instrument, warn};

use crate::descriptor::descriptor;
use crate::error::{SyncError, SyncResult};
use crate::gate::OfflineGate;
use crate::manifest::{ManifestSource, DEFAULT_MANIFEST_PATH};
use crate::policy::{EntitySyncPolicy, SyncOutcome};
use crate::session::{SessionOutcome, SyncSession};
use crate::task::SyncTask;
use crate::token::RequestToken;
use crate::transport::Transport;

/// What a successful refresh did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RefreshReport {
    /// True iff at least one kind was replaced.
    pub updated: bool,
    pub changed: Vec<EntityKind>,
    pub unchanged: Vec<EntityKind>,
}

/// Entry point for screens: refreshes sets of kinds.
///
/// Cheap to clone; clones share the policy, and with it the per-kind locks.
#[derive(Clone)]
pub struct Orchestrator {
    policy: Arc<EntitySyncPolicy>,
    store: Arc<dyn LocalStore>,
    transport: Arc<dyn Transport>,
    gate: OfflineGate,
    manifest_path: String,
}

impl fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Orchestrator")
            .field("store", &self.store.backend_name())
            .field("gate", &self.gate)
            .field("manifest_path", &self.manifest_path)
            .finish_non_exhaustive()
    }
}

impl Orchestrator {
    pub fn new(transport: Arc<dyn Transport>, store: Arc<dyn LocalStore>, gate: OfflineGate) -> Self {
        Self {
            policy: Arc::new(EntitySyncPolicy::new(transport.clone(), store.clone())),
            store,
            transport,
            gate,
            manifest_path: DEFAULT_MANIFEST_PATH.to_string(),
        }
    }

    /// Override the change-manifest endpoint.
    pub fn with_manifest_path(mut self, path: impl Into<String>) -> Self {
        self.manifest_path = path.into();
        self
    }

    pub fn offline_gate(&self) -> &OfflineGate {
        &self.gate
    }

    pub fn transport(&self) -> &Arc<dyn Transport> {
        &self.transport
    }

    /// Read the cached snapshot of a kind.
    pub async fn snapshot(&self, kind: EntityKind) -> SyncResult<Option<Arc<TableSnapshot>>> {
        Ok(self.store.snapshot(kind).await?)
    }

    /// Refresh `kinds` concurrently.
    ///
    /// Every kind runs to completion even when a sibling fails. Kinds that
    /// were replaced stay replaced; a failure is reported as
    /// [`SyncError::Partial`] naming the failed and committed kinds.
    #[instrument(skip(self, token), fields(scope = %token.label()), level = "debug")]
    pub async fn refresh(
        &self,
        kinds: &[EntityKind],
        force: bool,
        token: &RequestToken,
    ) -> SyncResult<RefreshReport> {
        let mut requested = Vec::with_capacity(kinds.len());
        for kind in kinds {
            if !requested.contains(kind) {
                requested.push(*kind);
            }
        }
        if requested.is_empty() {
            return Ok(RefreshReport::default());
        }

        let manifest = Arc::new(ManifestSource::new(
            self.transport.clone(),
            self.manifest_path.clone(),
        ));
        let tasks = requested
            .iter()
            .map(|&kind| {
                let policy = self.policy.clone();
                let manifest = manifest.clone();
                let token = token.clone();
                SyncTask::new(kind.name(), async move {
                    policy.sync(descriptor(kind), force, &manifest, &token).await
                })
                .map(move |outcome| (kind, outcome))
            })
            .collect();

        let session = SyncSession::new(format!("refresh:{}", token.label()), tasks);
        match session.run(token).await {
            SessionOutcome::AllSucceeded(outcomes) => {
                let report = Self::report(outcomes);
                if report.updated {
                    info!(
                        "Refreshed {} kinds, {} changed",
                        requested.len(),
                        report.changed.len()
                    );
                }
                Ok(report)
            }
            SessionOutcome::PartialFailure {
                first_error,
                succeeded,
                ..
            } => {
                let report = Self::report(succeeded);
                let failed: Vec<EntityKind> = requested
                    .into_iter()
                    .filter(|kind| {
                        !report.changed.contains(kind) && !report.unchanged.contains(kind)
                    })
                    .collect();
                if first_error.is_transient() {
                    warn!(
                        "Server unreachable ({}), showing cached data for {:?}",
                        first_error, failed
                    );
                } else {
                    warn!("Refresh of {:?} failed: {}", failed, first_error);
                }
                Err(SyncError::Partial {
                    first: Box::new(first_error),
                    failed,
                    committed: report.changed,
                })
            }
            SessionOutcome::Cancelled => Err(SyncError::Cancelled),
        }
    }

    /// Refresh every kind.
    pub async fn refresh_all(&self, force: bool, token: &RequestToken) -> SyncResult<RefreshReport> {
        self.refresh(&EntityKind::ALL, force, token).await
    }

    /// Refresh in the background and hand the result to `listener`.
    ///
    /// `listener` runs at most once and never after `token` is cancelled.
    pub fn refresh_with<F>(
        &self,
        kinds: Vec<EntityKind>,
        force: bool,
        token: RequestToken,
        listener: F,
    ) -> JoinHandle<()>
    where
        F: FnOnce(SyncResult<RefreshReport>) + Send + 'static,
    {
        let this = self.clone();
        let scope = token.clone();
        SyncTask::new("refresh", async move { this.refresh(&kinds, force, &scope).await })
            .spawn(token, listener)
    }

    /// Forget the stored tokens of `kinds` so their next refresh fetches.
    /// Cached rows stay readable. Returns how many kinds had a token.
    pub async fn invalidate(&self, kinds: &[EntityKind]) -> SyncResult<usize> {
        let mut dropped = 0;
        for kind in kinds {
            if self.policy.invalidate(*kind).await? {
                dropped += 1;
            }
        }
        Ok(dropped)
    }

    /// Drop every cached table and token.
    pub async fn clear(&self) -> SyncResult<()> {
        self.policy.clear().await?;
        info!("Cleared local cache");
        Ok(())
    }

    pub async fn status(&self) -> SyncResult<Vec<TableStatus>> {
        Ok(self.store.status().await?)
    }

    fn report(outcomes: Vec<(EntityKind, SyncOutcome)>) -> RefreshReport {
        let mut report = RefreshReport::default();
        for (kind, outcome) in outcomes {
            match outcome {
                SyncOutcome::Changed(_) => report.changed.push(kind),
                SyncOutcome::Unchanged => report.unchanged.push(kind),
            }
        }
        report.changed.sort();
        report.unchanged.sort();
        report.updated = !report.changed.is_empty();
        report
    }
}
