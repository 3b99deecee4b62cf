//! Hooks for watching a connection manager without touching its state.

use std::time::Duration;

use crate::manager::SessionState;

/// Receives connection lifecycle notifications.
///
/// All methods default to no-ops. Implementations must not block: they are
/// called from the manager's background task as well as from callers.
pub trait ConnectionObserver: Send + Sync {
    fn state_changed(&self, _from: SessionState, _to: SessionState) {}

    fn reconnect_scheduled(&self, _attempt: u32, _delay: Duration) {}

    fn reconnect_failed(&self, _attempt: u32, _reason: &str) {}

    fn message_queued(&self, _topic: &str, _backlog: usize) {}

    fn message_drained(&self, _topic: &str) {}

    fn messages_dropped(&self, _count: usize) {}
}

/// Observer that ignores everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl ConnectionObserver for NoopObserver {}

/// Observer that logs every notification through `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl ConnectionObserver for TracingObserver {
    fn state_changed(&self, from: SessionState, to: SessionState) {
        tracing::debug!(%from, %to, "connection state changed");
    }

    fn reconnect_scheduled(&self, attempt: u32, delay: Duration) {
        tracing::info!(attempt, delay_ms = delay.as_millis() as u64, "reconnect scheduled");
    }

    fn reconnect_failed(&self, attempt: u32, reason: &str) {
        tracing::warn!(attempt, reason, "reconnect attempt failed");
    }

    fn message_queued(&self, topic: &str, backlog: usize) {
        tracing::info!(topic, backlog, "message queued while offline");
    }

    fn message_drained(&self, topic: &str) {
        tracing::debug!(topic, "queued message delivered");
    }

    fn messages_dropped(&self, count: usize) {
        tracing::warn!(count, "queued messages dropped before delivery");
    }
}
