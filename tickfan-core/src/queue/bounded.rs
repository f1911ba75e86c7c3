//! Drop-Oldest Bounded Queue
//!
//! Fixed-capacity FIFO whose insert never blocks: pushing into a full queue
//! evicts the oldest buffered item and hands it back to the caller, who is
//! responsible for counting the drop.
//!
//! ```text
//!   capacity = 4
//!
//!   [t1 t2 t3 t4] ◄── try_push(t5)
//!     │
//!     └──► Evicted(t1)      [t2 t3 t4 t5]
//! ```
//!
//! ## Synchronization
//!
//! One `parking_lot::Mutex` per queue guards the ring buffer; it is never held
//! across an `.await`. Consumers park on a `tokio::sync::Notify` and re-check
//! the buffer after every wake-up, so spurious wake-ups are harmless.
//!
//! ## Closing
//!
//! `close()` rejects further inserts but leaves buffered items drainable.
//! `pop()` returns `None` only once the queue is closed *and* empty.

use parking_lot::Mutex;
use std::collections::VecDeque;
use tokio::sync::Notify;

/// Result of a non-blocking insert
#[derive(Debug, PartialEq, Eq)]
pub enum PushOutcome<T> {
    /// Item admitted without eviction
    Accepted,
    /// Item admitted; the previous oldest item was evicted and is returned
    Evicted(T),
    /// Queue is closed; the rejected item is handed back
    Closed(T),
}

impl<T> PushOutcome<T> {
    #[inline(always)]
    pub fn is_eviction(&self) -> bool {
        matches!(self, PushOutcome::Evicted(_))
    }

    #[inline(always)]
    pub fn is_closed(&self) -> bool {
        matches!(self, PushOutcome::Closed(_))
    }
}

struct Inner<T> {
    buf: VecDeque<T>,
    closed: bool,
    /// Lifetime eviction count, for per-consumer attribution
    evictions: u64,
}

/// Fixed-capacity FIFO with drop-oldest overflow
pub struct DropOldestQueue<T> {
    inner: Mutex<Inner<T>>,
    notify: Notify,
    capacity: usize,
}

impl<T> DropOldestQueue<T> {
    /// Create a queue holding at most `capacity` items
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is zero. Configuration validation rejects a zero
    /// capacity before any queue is built.
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "DropOldestQueue capacity must be at least 1");
        Self {
            inner: Mutex::new(Inner {
                buf: VecDeque::with_capacity(capacity),
                closed: false,
                evictions: 0,
            }),
            notify: Notify::new(),
            capacity,
        }
    }

    /// Insert without blocking, evicting the oldest item if full
    pub fn try_push(&self, item: T) -> PushOutcome<T> {
        let outcome = {
            let mut inner = self.inner.lock();
            if inner.closed {
                return PushOutcome::Closed(item);
            }
            let evicted = if inner.buf.len() >= self.capacity {
                inner.evictions += 1;
                inner.buf.pop_front()
            } else {
                None
            };
            inner.buf.push_back(item);
            match evicted {
                Some(old) => PushOutcome::Evicted(old),
                None => PushOutcome::Accepted,
            }
        };
        self.notify.notify_one();
        outcome
    }

    /// Remove the oldest item without waiting
    pub fn try_pop(&self) -> Option<T> {
        self.inner.lock().buf.pop_front()
    }

    /// Remove the oldest item, waiting until one is available
    ///
    /// Returns `None` once the queue is closed and fully drained.
    pub async fn pop(&self) -> Option<T> {
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            {
                let mut inner = self.inner.lock();
                if let Some(item) = inner.buf.pop_front() {
                    return Some(item);
                }
                if inner.closed {
                    return None;
                }
            }

            notified.await;
        }
    }

    /// Wait until the queue is non-empty or closed, without removing anything
    pub async fn ready(&self) {
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            {
                let inner = self.inner.lock();
                if !inner.buf.is_empty() || inner.closed {
                    return;
                }
            }

            notified.await;
        }
    }

    /// Reject all further inserts; buffered items stay drainable
    pub fn close(&self) {
        self.inner.lock().closed = true;
        self.notify.notify_waiters();
        // Also leave a permit for a consumer that registers after this point
        self.notify.notify_one();
    }

    /// Remove and return every buffered item, oldest first
    pub fn drain(&self) -> VecDeque<T> {
        std::mem::take(&mut self.inner.lock().buf)
    }

    /// Remove every buffered item, returning how many were discarded
    pub fn clear(&self) -> usize {
        let mut inner = self.inner.lock();
        let n = inner.buf.len();
        inner.buf.clear();
        n
    }

    pub fn is_closed(&self) -> bool {
        self.inner.lock().closed
    }

    /// Closed and nothing left to drain
    pub fn is_finished(&self) -> bool {
        let inner = self.inner.lock();
        inner.closed && inner.buf.is_empty()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().buf.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Total evictions performed by this queue
    pub fn evictions(&self) -> u64 {
        self.inner.lock().evictions
    }
}

impl<T: Clone> DropOldestQueue<T> {
    /// Clone of the oldest buffered item
    pub fn peek_oldest(&self) -> Option<T> {
        self.inner.lock().buf.front().cloned()
    }
}

impl<T> std::fmt::Debug for DropOldestQueue<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("DropOldestQueue")
            .field("len", &inner.buf.len())
            .field("capacity", &self.capacity)
            .field("closed", &inner.closed)
            .field("evictions", &inner.evictions)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    #[test]
    fn test_fifo_under_capacity() {
        let q = DropOldestQueue::new(4);
        assert_eq!(q.try_push(1), PushOutcome::Accepted);
        assert_eq!(q.try_push(2), PushOutcome::Accepted);
        assert_eq!(q.try_pop(), Some(1));
        assert_eq!(q.try_pop(), Some(2));
        assert_eq!(q.try_pop(), None);
    }

    #[test]
    fn test_overflow_evicts_oldest() {
        let q = DropOldestQueue::new(3);
        for i in 1..=3 {
            assert_eq!(q.try_push(i), PushOutcome::Accepted);
        }
        assert_eq!(q.try_push(4), PushOutcome::Evicted(1));
        assert_eq!(q.try_push(5), PushOutcome::Evicted(2));
        assert_eq!(q.len(), 3);
        assert_eq!(q.peek_oldest(), Some(3));
        assert_eq!(q.evictions(), 2);
    }

    #[test]
    fn test_capacity_one_burst() {
        let q = DropOldestQueue::new(1);
        let evicted = (0..10).filter(|i| q.try_push(*i).is_eviction()).count();
        assert_eq!(q.len(), 1);
        assert_eq!(evicted, 9);
        assert_eq!(q.try_pop(), Some(9));
    }

    #[test]
    fn test_closed_rejects_but_drains() {
        let q = DropOldestQueue::new(2);
        q.try_push("a");
        q.close();
        assert_eq!(q.try_push("b"), PushOutcome::Closed("b"));
        assert!(q.is_closed());
        assert!(!q.is_finished());
        assert_eq!(q.try_pop(), Some("a"));
        assert!(q.is_finished());
    }

    #[test]
    fn test_clear_reports_discarded() {
        let q = DropOldestQueue::new(8);
        for i in 0..5 {
            q.try_push(i);
        }
        assert_eq!(q.clear(), 5);
        assert!(q.is_empty());
    }

    #[test]
    fn test_drain_returns_fifo_order() {
        let q = DropOldestQueue::new(3);
        for i in 0..5 {
            q.try_push(i);
        }
        assert_eq!(q.drain(), VecDeque::from(vec![2, 3, 4]));
        assert!(q.is_empty());
        assert_eq!(q.try_push(9), PushOutcome::Accepted);
    }

    #[test]
    #[should_panic(expected = "capacity must be at least 1")]
    fn test_zero_capacity_panics() {
        let _ = DropOldestQueue::<u8>::new(0);
    }

    #[tokio::test]
    async fn test_pop_waits_for_push() {
        let q = Arc::new(DropOldestQueue::new(4));
        let consumer = {
            let q = Arc::clone(&q);
            tokio::spawn(async move { q.pop().await })
        };
        tokio::task::yield_now().await;
        q.try_push(42u32);
        assert_eq!(consumer.await.unwrap(), Some(42));
    }

    #[tokio::test]
    async fn test_pop_returns_none_after_close_and_drain() {
        let q = Arc::new(DropOldestQueue::new(4));
        q.try_push(1u32);
        let consumer = {
            let q = Arc::clone(&q);
            tokio::spawn(async move {
                let mut seen = Vec::new();
                while let Some(v) = q.pop().await {
                    seen.push(v);
                }
                seen
            })
        };
        tokio::task::yield_now().await;
        q.try_push(2);
        q.close();
        assert_eq!(consumer.await.unwrap(), vec![1, 2]);
    }

    #[tokio::test]
    async fn test_close_wakes_parked_consumer() {
        let q = Arc::new(DropOldestQueue::<u32>::new(4));
        let consumer = {
            let q = Arc::clone(&q);
            tokio::spawn(async move { q.pop().await })
        };
        tokio::time::sleep(Duration::from_millis(5)).await;
        q.close();
        let result = tokio::time::timeout(Duration::from_secs(1), consumer)
            .await
            .expect("consumer should wake on close")
            .unwrap();
        assert_eq!(result, None);
    }

    #[tokio::test]
    async fn test_ready_does_not_consume() {
        let q = DropOldestQueue::new(2);
        q.try_push(7u32);
        q.ready().await;
        assert_eq!(q.len(), 1);
    }
}
