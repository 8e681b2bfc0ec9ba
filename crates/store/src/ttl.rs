//! Expiration scheduling: a min-heap of expiry points and a single
//! refreshable timer.
//!
//! Every non-permanent store pushes one `(expires_at, key)` entry; the
//! timer is re-armed only when the new point is sooner than the one
//! already scheduled, so a burst of short-TTL stores collapses into a
//! single pending firing. Stale entries for superseded or deleted keys
//! stay in the heap and are filtered when they reach the top.

use crate::record::now_millis;
use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::time::Duration;
use tokio::task::JoinHandle;

// ---------------------------------------------------------------------------
// Time-ordered heap
// ---------------------------------------------------------------------------

/// One scheduled expiration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Expiry {
    /// Expiration point, milliseconds since the Unix epoch.
    pub at: u64,
    /// The key the entry was pushed for.
    pub key: String,
}

// `BinaryHeap` is a max-heap; the ordering is reversed so the soonest
// expiration sits on top.
impl Ord for Expiry {
    fn cmp(&self, other: &Self) -> Ordering {
        other.at.cmp(&self.at).then_with(|| other.key.cmp(&self.key))
    }
}

impl PartialOrd for Expiry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Min-heap of expiration points.
#[derive(Debug, Default)]
pub(crate) struct TimeHeap {
    heap: BinaryHeap<Expiry>,
}

impl TimeHeap {
    pub fn with_capacity(cap: usize) -> Self {
        TimeHeap {
            heap: BinaryHeap::with_capacity(cap),
        }
    }

    pub fn push(&mut self, at: u64, key: String) {
        self.heap.push(Expiry { at, key });
    }

    /// The soonest scheduled expiration, if any.
    pub fn peek(&self) -> Option<&Expiry> {
        self.heap.peek()
    }

    pub fn pop(&mut self) -> Option<Expiry> {
        self.heap.pop()
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Refreshable timer
// ---------------------------------------------------------------------------

/// A one-shot timer that can be re-armed to an earlier firing point.
///
/// [`RefreshTimer::after_func`] keeps at most one firing pending: a
/// request for a point no sooner than the one already scheduled is a
/// no-op, a sooner point cancels the pending firing and replaces it.
#[derive(Debug, Default)]
pub(crate) struct RefreshTimer {
    /// The point the pending firing is armed for. Stays set after the
    /// firing runs; staleness is detected by comparing against now.
    cutoff: Option<u64>,
    handle: Option<JoinHandle<()>>,
}

impl RefreshTimer {
    /// Arm the timer to run `f` at `at` (milliseconds since the Unix
    /// epoch). Points in the past fire immediately.
    pub fn after_func<F>(&mut self, at: u64, f: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let now = now_millis();
        if let Some(cutoff) = self.cutoff {
            // A sooner or equal firing is already pending.
            if cutoff > now && cutoff <= at {
                return;
            }
        }

        if let Some(handle) = self.handle.take() {
            handle.abort();
        }

        self.cutoff = Some(at);
        let delay = Duration::from_millis(at.saturating_sub(now));
        self.handle = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            f();
        }));
    }
}

impl Drop for RefreshTimer {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};
    use std::sync::Arc;

    #[test]
    fn test_heap_orders_by_time() {
        let mut heap = TimeHeap::with_capacity(4);
        heap.push(300, "c".to_string());
        heap.push(100, "a".to_string());
        heap.push(200, "b".to_string());

        assert_eq!(heap.pop().map(|e| e.at), Some(100));
        assert_eq!(heap.pop().map(|e| e.at), Some(200));
        assert_eq!(heap.pop().map(|e| e.at), Some(300));
        assert!(heap.pop().is_none());
    }

    #[test]
    fn test_heap_peek_does_not_remove() {
        let mut heap = TimeHeap::with_capacity(4);
        heap.push(50, "a".to_string());
        assert_eq!(heap.peek().map(|e| e.at), Some(50));
        assert_eq!(heap.len(), 1);
    }

    #[tokio::test]
    async fn test_timer_fires() {
        let fired = Arc::new(AtomicUsize::new(0));
        let mut timer = RefreshTimer::default();

        let f = fired.clone();
        timer.after_func(now_millis() + 10, move || {
            f.fetch_add(1, AtomicOrdering::SeqCst);
        });

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(fired.load(AtomicOrdering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_timer_keeps_sooner_firing() {
        let fired = Arc::new(AtomicUsize::new(0));
        let mut timer = RefreshTimer::default();

        let f = fired.clone();
        timer.after_func(now_millis() + 10, move || {
            f.fetch_add(1, AtomicOrdering::SeqCst);
        });
        // A later point must not displace the pending sooner firing.
        timer.after_func(now_millis() + 60_000, || {
            panic!("later arm must be a no-op");
        });

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(fired.load(AtomicOrdering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_timer_rearms_to_sooner_firing() {
        let fired = Arc::new(AtomicUsize::new(0));
        let mut timer = RefreshTimer::default();

        timer.after_func(now_millis() + 60_000, || {
            panic!("displaced firing must not run");
        });
        let f = fired.clone();
        timer.after_func(now_millis() + 10, move || {
            f.fetch_add(1, AtomicOrdering::SeqCst);
        });

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(fired.load(AtomicOrdering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_timer_rearms_after_firing() {
        let fired = Arc::new(AtomicUsize::new(0));
        let mut timer = RefreshTimer::default();

        let f = fired.clone();
        timer.after_func(now_millis() + 5, move || {
            f.fetch_add(1, AtomicOrdering::SeqCst);
        });
        tokio::time::sleep(Duration::from_millis(50)).await;

        // The previous cutoff is in the past; a new later point still
        // arms a fresh firing.
        let f = fired.clone();
        timer.after_func(now_millis() + 5, move || {
            f.fetch_add(1, AtomicOrdering::SeqCst);
        });
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert_eq!(fired.load(AtomicOrdering::SeqCst), 2);
    }
}
