//! Tracking of background work for graceful shutdown.
//!
//! Threaded handlers and the dispatcher loop share one [`TaskSet`]. On
//! shutdown the set's [`StopSignal`] fires, the set stops accepting work and
//! waits for every tracked task to return. There is no timeout: long-running
//! handlers are expected to poll [`StopSignal::is_stopped`].

use std::future::Future;

use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info};

/// A cloneable stop notification.
#[derive(Debug, Clone, Default)]
pub struct StopSignal {
    token: CancellationToken,
}

impl StopSignal {
    /// Creates a signal that has not fired.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` once shutdown was requested.
    pub fn is_stopped(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Waits until shutdown is requested.
    pub async fn stopped(&self) {
        self.token.cancelled().await;
    }

    /// Requests shutdown.
    pub fn stop(&self) {
        self.token.cancel();
    }
}

/// Set of tracked background tasks.
#[derive(Debug, Clone, Default)]
pub struct TaskSet {
    tracker: TaskTracker,
    signal: StopSignal,
}

impl TaskSet {
    /// Creates an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// The stop signal shared by every task in the set.
    pub fn signal(&self) -> StopSignal {
        self.signal.clone()
    }

    /// Runs blocking work on the blocking pool.
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn_blocking<F>(&self, work: F)
    where
        F: FnOnce() + Send + 'static,
    {
        drop(self.tracker.spawn_blocking(work));
    }

    /// Runs a future on the current runtime.
    pub fn spawn<F>(&self, future: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        drop(self.tracker.spawn(future));
    }

    /// Number of tasks still running.
    pub fn len(&self) -> usize {
        self.tracker.len()
    }

    /// Returns `true` if no task is running.
    pub fn is_empty(&self) -> bool {
        self.tracker.is_empty()
    }

    /// Signals every task to stop and waits for all of them to finish.
    pub async fn shutdown(&self) {
        info!(tasks = self.tracker.len(), "Stopping background tasks");
        self.signal.stop();
        self.tracker.close();
        self.tracker.wait().await;
        debug!("All background tasks finished");
    }
}
