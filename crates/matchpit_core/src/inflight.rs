//! Tracking of in-flight server command sequences.
//!
//! Destructive operations (tournament reset, deletion, regeneration) must
//! not mutate state while command tasks are still talking to game servers,
//! or a late reply could race freshly cleared match state. The tracker
//! counts live command tasks and offers a bounded drain.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::Instant;

#[derive(Default)]
pub struct InFlightTracker {
    count: AtomicUsize,
    notify: Notify,
}

impl InFlightTracker {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Register one in-flight command sequence. Dropping the guard marks it
    /// finished and wakes any drain waiter.
    pub fn guard(self: &Arc<Self>) -> InFlightGuard {
        self.count.fetch_add(1, Ordering::AcqRel);
        InFlightGuard {
            tracker: Arc::clone(self),
        }
    }

    pub fn active(&self) -> usize {
        self.count.load(Ordering::Acquire)
    }

    /// Wait until no command sequences are in flight, up to `limit`.
    /// Returns false when the wait timed out with work still outstanding;
    /// callers proceed anyway and rely on late events being discarded.
    pub async fn drain(&self, limit: Duration) -> bool {
        let deadline = Instant::now() + limit;
        loop {
            if self.active() == 0 {
                return true;
            }
            let notified = self.notify.notified();
            // Re-check after arming the waiter so a decrement between the
            // check and the wait cannot be missed.
            if self.active() == 0 {
                return true;
            }
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return self.active() == 0;
            }
        }
    }
}

pub struct InFlightGuard {
    tracker: Arc<InFlightTracker>,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        if self.tracker.count.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.tracker.notify.notify_waiters();
        }
    }
}
