//! Live-connection tracking for graceful shutdown
//!
//! Each accepted connection holds a [`ConnectionGuard`]; the count drops
//! when the guard is dropped, however the session task ends.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;

#[derive(Debug, Default)]
struct Inner {
    live: AtomicUsize,
    idle: Notify,
}

/// Counts connections that are still being served
#[derive(Debug, Clone, Default)]
pub struct ConnectionTracker {
    inner: Arc<Inner>,
}

impl ConnectionTracker {
    /// Create a tracker with no live connections
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a live connection
    pub fn guard(&self) -> ConnectionGuard {
        self.inner.live.fetch_add(1, Ordering::SeqCst);
        ConnectionGuard {
            inner: self.inner.clone(),
        }
    }

    /// Number of live connections
    pub fn live(&self) -> usize {
        self.inner.live.load(Ordering::SeqCst)
    }

    /// Wait until no connection is live
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.inner.idle.notified();
            tokio::pin!(notified);
            // Register before checking so a concurrent drop is not missed
            notified.as_mut().enable();

            if self.live() == 0 {
                return;
            }
            notified.await;
        }
    }
}

/// RAII registration of one live connection
#[derive(Debug)]
pub struct ConnectionGuard {
    inner: Arc<Inner>,
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        if self.inner.live.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.inner.idle.notify_waiters();
        }
    }
}
