//! Fan-out/join over a fixed set of tasks.

use futures::stream::{FuturesUnordered, StreamExt};
use tokio::task::JoinHandle;
use tracing::debug;

use crate::error::SyncError;
use crate::task::{SyncTask, TaskOutcome};
use crate::token::RequestToken;

/// Aggregate of every task in a session.
#[derive(Debug)]
pub enum SessionOutcome<T> {
    AllSucceeded(Vec<T>),
    /// At least one task failed. Values of the tasks that succeeded are kept
    /// and their side effects stand.
    PartialFailure {
        /// Error of the first task to fail, in completion order.
        first_error: SyncError,
        succeeded: Vec<T>,
        failed: usize,
    },
    Cancelled,
}

impl<T> SessionOutcome<T> {
    pub fn is_success(&self) -> bool {
        matches!(self, SessionOutcome::AllSucceeded(_))
    }
}

/// Runs its tasks concurrently and joins them into one outcome.
///
/// The task set is fixed at construction. Tasks run with no ordering among
/// them; a failing task does not stop its siblings.
pub struct SyncSession<T> {
    label: String,
    tasks: Vec<SyncTask<T>>,
}

impl<T: Send + 'static> SyncSession<T> {
    pub fn new(label: impl Into<String>, tasks: Vec<SyncTask<T>>) -> Self {
        Self {
            label: label.into(),
            tasks,
        }
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Run every task and resolve exactly once: when the last task settles,
    /// or with `Cancelled` as soon as `token` is cancelled.
    pub async fn run(self, token: &RequestToken) -> SessionOutcome<T> {
        let label = self.label;
        let total = self.tasks.len();
        if token.is_cancelled() {
            return SessionOutcome::Cancelled;
        }

        let mut pending: FuturesUnordered<_> =
            self.tasks.into_iter().map(|task| task.run(token)).collect();

        let mut remaining = total;
        let mut succeeded = Vec::with_capacity(total);
        let mut first_error = None;
        let mut failed = 0;

        while remaining > 0 {
            tokio::select! {
                biased;
                _ = token.cancelled() => {
                    debug!("Session {} cancelled with {} of {} tasks outstanding", label, remaining, total);
                    return SessionOutcome::Cancelled;
                }
                Some(outcome) = pending.next() => {
                    remaining -= 1;
                    match outcome {
                        TaskOutcome::Succeeded(value) => succeeded.push(value),
                        TaskOutcome::Failed(err) => {
                            debug!("Session {} task failed: {}", label, err);
                            failed += 1;
                            if first_error.is_none() {
                                first_error = Some(err);
                            }
                        }
                        TaskOutcome::Cancelled => return SessionOutcome::Cancelled,
                    }
                }
            }
        }

        match first_error {
            None => {
                debug!("Session {}: all {} tasks succeeded", label, total);
                SessionOutcome::AllSucceeded(succeeded)
            }
            Some(first_error) => SessionOutcome::PartialFailure {
                first_error,
                succeeded,
                failed,
            },
        }
    }

    /// Run in the background and hand the aggregate to `on_complete`.
    ///
    /// `on_complete` fires exactly once for a session that settles, and never
    /// for one whose token is cancelled.
    pub fn spawn<F>(self, token: RequestToken, on_complete: F) -> JoinHandle<()>
    where
        F: FnOnce(SessionOutcome<T>) + Send + 'static,
    {
        tokio::spawn(async move {
            let outcome = self.run(&token).await;
            if matches!(outcome, SessionOutcome::Cancelled) || token.is_cancelled() {
                return;
            }
            on_complete(outcome);
        })
    }
}
