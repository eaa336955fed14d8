//! Cancellation scopes for in-flight work.

use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::watch;
use tracing::debug;
use uuid::Uuid;

struct Inner {
    id: Uuid,
    label: String,
    cancelled: watch::Sender<bool>,
    live: AtomicUsize,
}

/// Groups every task started on behalf of one screen.
///
/// Cancelling a token suppresses delivery of every later outcome registered
/// under it. It does not abort the underlying network calls; those run to
/// completion and their results are dropped.
#[derive(Clone)]
pub struct RequestToken {
    inner: Arc<Inner>,
}

impl fmt::Debug for RequestToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestToken")
            .field("id", &self.inner.id)
            .field("label", &self.inner.label)
            .field("cancelled", &self.is_cancelled())
            .field("live", &self.live_tasks())
            .finish()
    }
}

impl RequestToken {
    pub fn new(label: impl Into<String>) -> Self {
        let (tx, _rx) = watch::channel(false);
        Self {
            inner: Arc::new(Inner {
                id: Uuid::new_v4(),
                label: label.into(),
                cancelled: tx,
                live: AtomicUsize::new(0),
            }),
        }
    }

    pub fn id(&self) -> Uuid {
        self.inner.id
    }

    pub fn label(&self) -> &str {
        &self.inner.label
    }

    /// Cancel the scope. Idempotent.
    pub fn cancel(&self) {
        let changed = self.inner.cancelled.send_if_modified(|cancelled| {
            let was = *cancelled;
            *cancelled = true;
            !was
        });
        if changed {
            debug!(
                "Cancelled request scope {} ({}) with {} live tasks",
                self.inner.label,
                self.inner.id,
                self.live_tasks()
            );
        }
    }

    pub fn is_cancelled(&self) -> bool {
        *self.inner.cancelled.borrow()
    }

    /// Resolves once the token is cancelled.
    pub async fn cancelled(&self) {
        let mut rx = self.inner.cancelled.subscribe();
        // The sender lives in `inner`, which `self` keeps alive.
        let _ = rx.wait_for(|cancelled| *cancelled).await;
    }

    /// Tasks whose underlying work is still running under this token,
    /// including work whose outcome will be discarded.
    pub fn live_tasks(&self) -> usize {
        self.inner.live.load(Ordering::SeqCst)
    }

    pub(crate) fn track(&self) -> LiveTask {
        self.inner.live.fetch_add(1, Ordering::SeqCst);
        LiveTask {
            token: self.clone(),
        }
    }
}

/// Registration of one running task; unregisters on drop.
pub(crate) struct LiveTask {
    token: RequestToken,
}

impl Drop for LiveTask {
    fn drop(&mut self) {
        self.token.inner.live.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Owns a token for the lifetime of a screen and cancels it on drop.
#[derive(Debug)]
pub struct RequestScope {
    token: RequestToken,
}

impl RequestScope {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            token: RequestToken::new(label),
        }
    }

    pub fn token(&self) -> &RequestToken {
        &self.token
    }
}

impl Drop for RequestScope {
    fn drop(&mut self) {
        self.token.cancel();
    }
}
