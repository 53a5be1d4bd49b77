//! Busy tracking for `get_children` cycles and refresh completion.

use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::watch;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncStatus {
    /// Child queries currently running.
    pub in_flight: usize,
    /// Highest refresh generation that a finished query had observed.
    pub settled_epoch: u64,
}

/// Counts running child queries and resolves refresh completions.
///
/// A refresh only invalidates; it is complete once a child query that
/// started after it has finished.
pub struct StatusTracker {
    tx: watch::Sender<SyncStatus>,
    requested: AtomicU64,
}

impl Default for StatusTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl StatusTracker {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(SyncStatus::default());
        Self {
            tx,
            requested: AtomicU64::new(0),
        }
    }

    /// Snapshot of the busy flag. Sampling it gives no ordering guarantee;
    /// await a [`RefreshCompletion`] to know a refresh has been served.
    pub fn is_busy(&self) -> bool {
        self.tx.borrow().in_flight > 0
    }

    pub fn status(&self) -> SyncStatus {
        *self.tx.borrow()
    }

    /// Mark a child query as running until the guard drops.
    pub fn begin(&self) -> BusyGuard<'_> {
        let epoch = self.requested.load(Ordering::SeqCst);
        self.tx.send_modify(|s| s.in_flight += 1);
        BusyGuard {
            tracker: self,
            epoch,
        }
    }

    /// Register a refresh and hand back its completion signal.
    pub fn request(&self) -> RefreshCompletion {
        let target = self.requested.fetch_add(1, Ordering::SeqCst) + 1;
        RefreshCompletion {
            rx: self.tx.subscribe(),
            target,
        }
    }
}

/// Clears the busy flag on drop, on success and failure alike.
pub struct BusyGuard<'a> {
    tracker: &'a StatusTracker,
    epoch: u64,
}

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        let epoch = self.epoch;
        self.tracker.tx.send_modify(|s| {
            s.in_flight = s.in_flight.saturating_sub(1);
            s.settled_epoch = s.settled_epoch.max(epoch);
        });
    }
}

/// Resolves once the tree has re-fetched after a refresh.
///
/// Nothing fetches until the host expands the invalidated node again, so a
/// completion for a subtree that is never re-expanded stays pending.
#[derive(Debug)]
pub struct RefreshCompletion {
    rx: watch::Receiver<SyncStatus>,
    target: u64,
}

impl RefreshCompletion {
    pub fn is_complete(&self) -> bool {
        self.rx.borrow().settled_epoch >= self.target
    }

    /// Wait for completion. Returns `false` if the synchronizer went away
    /// first.
    pub async fn wait(mut self) -> bool {
        let target = self.target;
        self.rx
            .wait_for(|s| s.settled_epoch >= target)
            .await
            .is_ok()
    }
}
