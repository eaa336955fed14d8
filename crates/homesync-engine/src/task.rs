//! One unit of asynchronous sync work.

use std::fmt;
use std::future::Future;

use futures::future::{self, BoxFuture};
use futures::{FutureExt, TryFutureExt};
use tokio::task::JoinHandle;
use tracing::debug;

use crate::error::{SyncError, SyncResult};
use crate::token::RequestToken;

/// Terminal state of a task.
#[derive(Debug)]
pub enum TaskOutcome<T> {
    Succeeded(T),
    Failed(SyncError),
    /// The token was cancelled first; any result was discarded.
    Cancelled,
}

impl<T> TaskOutcome<T> {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, TaskOutcome::Cancelled)
    }

    pub fn into_result(self) -> SyncResult<T> {
        match self {
            TaskOutcome::Succeeded(value) => Ok(value),
            TaskOutcome::Failed(err) => Err(err),
            TaskOutcome::Cancelled => Err(SyncError::Cancelled),
        }
    }
}

/// A labelled future producing `SyncResult<T>`, composable before it runs.
///
/// Nothing happens until [`SyncTask::run`]; the work then executes on the
/// tokio runtime, off the caller's task.
pub struct SyncTask<T> {
    label: String,
    work: BoxFuture<'static, SyncResult<T>>,
}

impl<T> fmt::Debug for SyncTask<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SyncTask")
            .field("label", &self.label)
            .finish_non_exhaustive()
    }
}

impl<T: Send + 'static> SyncTask<T> {
    pub fn new<F>(label: impl Into<String>, work: F) -> Self
    where
        F: Future<Output = SyncResult<T>> + Send + 'static,
    {
        Self {
            label: label.into(),
            work: work.boxed(),
        }
    }

    /// A task that resolves to `result` without doing any work.
    pub fn ready(label: impl Into<String>, result: SyncResult<T>) -> Self {
        Self::new(label, future::ready(result))
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// Transform the success value.
    pub fn map<U, F>(self, f: F) -> SyncTask<U>
    where
        U: Send + 'static,
        F: FnOnce(T) -> U + Send + 'static,
    {
        SyncTask {
            label: self.label,
            work: self.work.map_ok(f).boxed(),
        }
    }

    /// Chain asynchronous work onto the success value.
    pub fn then<U, F, Fut>(self, f: F) -> SyncTask<U>
    where
        U: Send + 'static,
        F: FnOnce(T) -> Fut + Send + 'static,
        Fut: Future<Output = SyncResult<U>> + Send + 'static,
    {
        SyncTask {
            label: self.label,
            work: self.work.and_then(f).boxed(),
        }
    }

    /// Recover from (or rewrite) a failure.
    pub fn catch<F>(self, f: F) -> SyncTask<T>
    where
        F: FnOnce(SyncError) -> SyncResult<T> + Send + 'static,
    {
        SyncTask {
            label: self.label,
            work: self.work.or_else(|err| future::ready(f(err))).boxed(),
        }
    }

    /// Run the task under `token`.
    ///
    /// The work is spawned and registered with the token until it finishes.
    /// If the token is cancelled before the result is delivered, the result
    /// is discarded and `Cancelled` is returned; the work itself keeps
    /// running to completion in the background.
    pub async fn run(self, token: &RequestToken) -> TaskOutcome<T> {
        let label = self.label;
        if token.is_cancelled() {
            debug!("Task {} not started, scope already cancelled", label);
            return TaskOutcome::Cancelled;
        }

        let live = token.track();
        let work = self.work;
        let handle = tokio::spawn(async move {
            let _live = live;
            work.await
        });

        tokio::select! {
            biased;
            _ = token.cancelled() => {
                debug!("Task {} cancelled, its result will be discarded", label);
                TaskOutcome::Cancelled
            }
            joined = handle => match joined {
                Ok(_) if token.is_cancelled() => TaskOutcome::Cancelled,
                Ok(Ok(value)) => TaskOutcome::Succeeded(value),
                Ok(Err(err)) => TaskOutcome::Failed(err),
                Err(err) => TaskOutcome::Failed(SyncError::TaskPanicked(format!("{}: {}", label, err))),
            },
        }
    }

    /// Run in the background and hand the result to `listener`.
    ///
    /// `listener` is invoked at most once, and never once `token` is cancelled.
    pub fn spawn<F>(self, token: RequestToken, listener: F) -> JoinHandle<()>
    where
        F: FnOnce(SyncResult<T>) + Send + 'static,
    {
        tokio::spawn(async move {
            let label = self.label.clone();
            let outcome = self.run(&token).await;
            if outcome.is_cancelled() || token.is_cancelled() {
                debug!("Dropping outcome of {} for cancelled scope", label);
                return;
            }
            listener(outcome.into_result());
        })
    }
}
