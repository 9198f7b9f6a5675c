//! Connection identity and lifecycle tracking.
//!
//! # Responsibilities
//! - Generate unique connection IDs for tracing
//! - Count open connections for the active-connection gauge
//! - Let shutdown wait for open connections to drain

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Notify;

use crate::observability::metrics;

/// Only uniqueness matters here, so relaxed ordering is enough.
static CONNECTION_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Unique identifier for a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    pub fn new() -> Self {
        Self(CONNECTION_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

#[derive(Debug, Default)]
struct TrackerState {
    active: AtomicU64,
    drained: Notify,
}

/// Tracks open connections for graceful shutdown.
#[derive(Debug, Clone, Default)]
pub struct ConnectionTracker {
    state: Arc<TrackerState>,
}

impl ConnectionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a new connection. The returned guard releases it on drop.
    pub fn track(&self) -> ConnectionGuard {
        self.state.active.fetch_add(1, Ordering::SeqCst);
        metrics::record_connection_opened();
        ConnectionGuard {
            state: Arc::clone(&self.state),
            id: ConnectionId::new(),
        }
    }

    pub fn active_count(&self) -> u64 {
        self.state.active.load(Ordering::SeqCst)
    }

    /// Wait until every tracked connection has closed.
    ///
    /// Returns `false` if connections were still open when `timeout` elapsed.
    pub async fn wait_for_drain(&self, timeout: Duration) -> bool {
        let drain = async {
            loop {
                let notified = self.state.drained.notified();
                if self.active_count() == 0 {
                    return;
                }
                notified.await;
            }
        };
        tokio::time::timeout(timeout, drain).await.is_ok()
    }
}

/// Held for a connection's lifetime.
#[derive(Debug)]
pub struct ConnectionGuard {
    state: Arc<TrackerState>,
    id: ConnectionId,
}

impl ConnectionGuard {
    pub fn id(&self) -> ConnectionId {
        self.id
    }
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        metrics::record_connection_closed();
        if self.state.active.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.state.drained.notify_waiters();
        }
        tracing::trace!(connection_id = %self.id, "Connection closed");
    }
}
