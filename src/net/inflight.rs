//! In-flight work tracking for graceful drains.
//!
//! # Responsibilities
//! - Count units of work (datagrams, requests) currently being handled
//! - Give each unit a unique ID for tracing
//! - Let a stopper wait until the count reaches zero

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Global atomic counter for work IDs.
/// Using relaxed ordering is sufficient since we only need uniqueness, not synchronization.
static WORK_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// How often [`InFlight::wait_idle`] re-checks the count.
const IDLE_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Unique identifier for a unit of in-flight work.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WorkId(u64);

impl WorkId {
    pub fn new() -> Self {
        Self(WORK_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl Default for WorkId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for WorkId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "work-{}", self.0)
    }
}

/// Tracks in-flight work so a listener can drain before reporting stopped.
#[derive(Debug, Clone, Default)]
pub struct InFlight {
    active: Arc<AtomicU64>,
}

impl InFlight {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a new unit of work. Returns a guard that decrements on drop.
    pub fn track(&self) -> InFlightGuard {
        self.active.fetch_add(1, Ordering::SeqCst);
        InFlightGuard {
            active: Arc::clone(&self.active),
            id: WorkId::new(),
        }
    }

    pub fn active_count(&self) -> u64 {
        self.active.load(Ordering::SeqCst)
    }

    /// Wait until no work is in flight.
    pub async fn wait_idle(&self) {
        while self.active.load(Ordering::SeqCst) > 0 {
            tokio::time::sleep(IDLE_POLL_INTERVAL).await;
        }
    }
}

/// Guard held for the lifetime of one unit of work.
#[derive(Debug)]
pub struct InFlightGuard {
    active: Arc<AtomicU64>,
    id: WorkId,
}

impl InFlightGuard {
    pub fn id(&self) -> WorkId {
        self.id
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.active.fetch_sub(1, Ordering::SeqCst);
        tracing::trace!(work_id = %self.id, "Work finished");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn work_id_unique() {
        let id1 = WorkId::new();
        let id2 = WorkId::new();
        assert_ne!(id1, id2);
    }

    #[test]
    fn in_flight_counts() {
        let tracker = InFlight::new();
        assert_eq!(tracker.active_count(), 0);

        let guard1 = tracker.track();
        assert_eq!(tracker.active_count(), 1);

        let guard2 = tracker.track();
        assert_eq!(tracker.active_count(), 2);
        assert_ne!(guard1.id(), guard2.id());

        drop(guard1);
        assert_eq!(tracker.active_count(), 1);

        drop(guard2);
        assert_eq!(tracker.active_count(), 0);
    }

    #[tokio::test]
    async fn wait_idle_returns_after_last_guard_drops() {
        let tracker = InFlight::new();
        let guard = tracker.track();

        let waiter = {
            let tracker = tracker.clone();
            tokio::spawn(async move { tracker.wait_idle().await })
        };
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(!waiter.is_finished());

        drop(guard);
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("wait_idle should return")
            .unwrap();
    }
}
