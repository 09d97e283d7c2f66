//! Outstanding directory task accounting.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::Notify;

/// Counts directory traversals that are still in flight.
///
/// Every walker task registers here before it is scheduled and releases its
/// registration once all of its entries have been processed. A child is
/// always registered before its parent releases, so the count only reaches
/// zero once every directory under every root has been drained.
#[derive(Debug, Clone, Default)]
pub struct TaskTracker {
    inner: Arc<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    outstanding: AtomicUsize,
    idle: Notify,
}

impl TaskTracker {
    /// Create a tracker with no outstanding tasks.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register one more outstanding task.
    ///
    /// The task is considered finished when the returned guard is dropped.
    pub fn register(&self) -> TaskGuard {
        self.inner.outstanding.fetch_add(1, Ordering::AcqRel);
        TaskGuard {
            tracker: self.clone(),
        }
    }

    /// Number of tasks registered and not yet finished.
    pub fn outstanding(&self) -> usize {
        self.inner.outstanding.load(Ordering::Acquire)
    }

    /// Check if no task is outstanding.
    pub fn is_idle(&self) -> bool {
        self.outstanding() == 0
    }

    /// Wait until the outstanding count drops to zero.
    ///
    /// Returns immediately if nothing is outstanding.
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.inner.idle.notified();
            tokio::pin!(notified);
            // Register interest before checking so a release in between is not missed.
            notified.as_mut().enable();

            if self.is_idle() {
                return;
            }
            notified.await;
        }
    }

    fn release(&self) {
        if self.inner.outstanding.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.inner.idle.notify_waiters();
        }
    }
}

/// Registration of one outstanding task; released on drop.
#[derive(Debug)]
#[must_use = "dropping the guard immediately marks the task as finished"]
pub struct TaskGuard {
    tracker: TaskTracker,
}

impl Drop for TaskGuard {
    fn drop(&mut self) {
        self.tracker.release();
    }
}
