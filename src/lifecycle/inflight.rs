//! In-flight dispatch tracking.
//!
//! A dispatch task outlives its HTTP handler whenever shadows are slower than
//! the primary. Shutdown waits on this tracker so that shadow work is drained,
//! not dropped.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Counts running dispatch tasks.
#[derive(Debug, Clone, Default)]
pub struct InflightTracker {
    active_count: Arc<AtomicU64>,
}

impl InflightTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a new dispatch. Returns a guard that decrements on drop.
    pub fn track(&self) -> InflightGuard {
        self.active_count.fetch_add(1, Ordering::SeqCst);
        InflightGuard {
            active_count: Arc::clone(&self.active_count),
        }
    }

    /// Get current in-flight dispatch count.
    pub fn active_count(&self) -> u64 {
        self.active_count.load(Ordering::SeqCst)
    }

    /// Wait until nothing is in flight or `deadline` passes.
    ///
    /// Returns true when everything drained in time.
    pub async fn wait_idle(&self, deadline: Duration) -> bool {
        let drained = async {
            while self.active_count() > 0 {
                tokio::time::sleep(Duration::from_millis(100)).await;
            }
        };
        tokio::time::timeout(deadline, drained).await.is_ok()
    }
}

/// Guard that tracks one dispatch's lifetime.
#[derive(Debug)]
pub struct InflightGuard {
    active_count: Arc<AtomicU64>,
}

impl Drop for InflightGuard {
    fn drop(&mut self) {
        self.active_count.fetch_sub(1, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tracker_counts() {
        let tracker = InflightTracker::new();
        assert_eq!(tracker.active_count(), 0);

        let guard1 = tracker.track();
        let guard2 = tracker.clone().track();
        assert_eq!(tracker.active_count(), 2);

        drop(guard1);
        assert_eq!(tracker.active_count(), 1);

        drop(guard2);
        assert_eq!(tracker.active_count(), 0);
    }

    #[tokio::test]
    async fn wait_idle_times_out_while_busy() {
        let tracker = InflightTracker::new();
        let guard = tracker.track();
        assert!(!tracker.wait_idle(Duration::from_millis(150)).await);

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            drop(guard);
        });
        assert!(tracker.wait_idle(Duration::from_secs(2)).await);
    }
}
