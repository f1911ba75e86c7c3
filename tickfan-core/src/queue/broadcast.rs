//! Broadcast Stream with Replay Cache
//!
//! Multi-subscriber fan-out where every subscriber owns a private drop-oldest
//! buffer, plus a single-slot replay cache holding the most recent publish.
//!
//! ```text
//!                       publish(t)
//!                           │
//!              ┌────────────┼──────────────┐
//!              ▼            ▼              ▼
//!       ┌────────────┐ ┌──────────┐ ┌──────────┐    ┌──────────────┐
//!       │ sub 0 buf  │ │ sub 1 buf│ │ sub 2 buf│    │ replay slot  │
//!       │ (C, oldest │ │          │ │          │    │ (last value) │
//!       │  evicted)  │ │          │ │          │    └──────────────┘
//!       └────────────┘ └──────────┘ └──────────┘           │
//!                                                subscribe() seeds a new
//!                                                buffer with this value
//! ```
//!
//! ## Consistency
//!
//! Publishing, subscribing and resubscribing all take the registry lock, so a
//! new subscriber sees every item published after it attached plus (via the
//! replay slot) the last one published before. Nothing is seen twice and
//! nothing is skipped. The lock is never held across an `.await`.
//!
//! The replay slot lives outside the per-subscriber buffers: draining or
//! evicting a subscriber buffer never clears it.
//!
//! ## Loss accounting
//!
//! A replayed delivery is a copy of an item some earlier subscription already
//! received. Eviction and discard counts therefore only include original
//! deliveries, so every published item is counted as lost at most once per
//! subscriber lineage.

use super::bounded::{DropOldestQueue, PushOutcome};
use parking_lot::{Mutex, RwLock};
use std::sync::{Arc, Weak};
use tokio_util::sync::CancellationToken;

/// One item handed to a subscriber
#[derive(Debug, Clone, PartialEq)]
pub struct Delivery<T> {
    pub item: T,
    /// True when this item came from the replay cache at subscription time
    pub replayed: bool,
}

/// Stable identifier of a subscriber within one stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriberId(u64);

impl SubscriberId {
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

/// Single-slot last-value cache
#[derive(Debug)]
pub struct ReplayCache<T> {
    slot: RwLock<Option<T>>,
}

impl<T: Clone> ReplayCache<T> {
    /// The replay cache holds exactly one item
    pub const CAPACITY: usize = 1;

    pub fn new() -> Self {
        Self {
            slot: RwLock::new(None),
        }
    }

    pub fn store(&self, item: T) {
        *self.slot.write() = Some(item);
    }

    pub fn latest(&self) -> Option<T> {
        self.slot.read().clone()
    }
}

impl<T: Clone> Default for ReplayCache<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Outcome of one fan-out publish
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PublishReport {
    /// Subscriber buffers that received the item
    pub delivered: usize,
    /// Of those, how many evicted an original delivery to make room
    pub evicted: usize,
    /// Evictions of replayed copies (not losses)
    pub evicted_replays: usize,
}

struct Registry<T> {
    subscribers: Vec<(SubscriberId, Arc<DropOldestQueue<Delivery<T>>>)>,
    next_id: u64,
    closed: bool,
}

struct Shared<T> {
    registry: Mutex<Registry<T>>,
    replay: ReplayCache<T>,
    buffer_capacity: usize,
    closed: CancellationToken,
}

impl<T> Shared<T> {
    fn detach(&self, id: SubscriberId) -> bool {
        let mut registry = self.registry.lock();
        let before = registry.subscribers.len();
        registry.subscribers.retain(|(sid, _)| *sid != id);
        registry.subscribers.len() != before
    }
}

/// Fan-out stream with a 1-slot replay cache
///
/// Cloning yields another handle to the same stream.
pub struct BroadcastStream<T> {
    shared: Arc<Shared<T>>,
}

impl<T> Clone for BroadcastStream<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T: Clone> BroadcastStream<T> {
    /// Create a stream whose subscribers each buffer up to `buffer_capacity` items
    ///
    /// # Panics
    ///
    /// Panics if `buffer_capacity` is zero.
    pub fn new(buffer_capacity: usize) -> Self {
        assert!(buffer_capacity > 0, "broadcast buffer capacity must be at least 1");
        Self {
            shared: Arc::new(Shared {
                registry: Mutex::new(Registry {
                    subscribers: Vec::new(),
                    next_id: 0,
                    closed: false,
                }),
                replay: ReplayCache::new(),
                buffer_capacity,
                closed: CancellationToken::new(),
            }),
        }
    }

    /// Publish to every subscriber and update the replay cache
    ///
    /// Never blocks. Returns the item back if the stream is closed.
    pub fn publish(&self, item: T) -> Result<PublishReport, T> {
        let registry = self.shared.registry.lock();
        if registry.closed {
            return Err(item);
        }

        self.shared.replay.store(item.clone());

        let mut report = PublishReport::default();
        for (_, queue) in registry.subscribers.iter() {
            let delivery = Delivery {
                item: item.clone(),
                replayed: false,
            };
            match queue.try_push(delivery) {
                PushOutcome::Accepted => report.delivered += 1,
                PushOutcome::Evicted(old) => {
                    report.delivered += 1;
                    if old.replayed {
                        report.evicted_replays += 1;
                    } else {
                        report.evicted += 1;
                    }
                }
                PushOutcome::Closed(_) => {}
            }
        }
        Ok(report)
    }

    /// Attach a new subscriber, seeded with the replay cache if non-empty
    pub fn subscribe(&self) -> Subscription<T> {
        let mut registry = self.shared.registry.lock();
        self.attach_locked(&mut registry)
    }

    /// Atomically replace `old` with a fresh subscription
    ///
    /// Items still buffered in `old` are discarded; the count of discarded
    /// original deliveries is returned. No publish can land between the
    /// teardown and the new attachment.
    pub fn resubscribe(&self, mut old: Subscription<T>) -> Resubscribed<T> {
        let mut registry = self.shared.registry.lock();
        registry.subscribers.retain(|(sid, _)| *sid != old.id);
        let discarded = discard(&old.queue);
        old.detached = true;
        let subscription = self.attach_locked(&mut registry);
        Resubscribed {
            subscription,
            discarded,
        }
    }

    /// Detach `sub`, returning how many original deliveries were still
    /// buffered in it
    pub fn unsubscribe(&self, mut sub: Subscription<T>) -> usize {
        self.shared.detach(sub.id);
        sub.detached = true;
        discard(&sub.queue)
    }

    fn attach_locked(&self, registry: &mut Registry<T>) -> Subscription<T> {
        let id = SubscriberId(registry.next_id);
        registry.next_id += 1;

        let queue = Arc::new(DropOldestQueue::new(self.shared.buffer_capacity));
        if let Some(latest) = self.shared.replay.latest() {
            queue.try_push(Delivery {
                item: latest,
                replayed: true,
            });
        }

        if registry.closed {
            queue.close();
        } else {
            registry.subscribers.push((id, Arc::clone(&queue)));
        }

        Subscription {
            id,
            queue,
            shared: Arc::downgrade(&self.shared),
            detached: false,
        }
    }

    /// Most recent published item
    pub fn latest(&self) -> Option<T> {
        self.shared.replay.latest()
    }
}

impl<T> BroadcastStream<T> {
    /// Close the stream: no more publishes, subscribers drain then see the end
    pub fn close(&self) {
        let mut registry = self.shared.registry.lock();
        if registry.closed {
            return;
        }
        registry.closed = true;
        for (_, queue) in registry.subscribers.iter() {
            queue.close();
        }
        drop(registry);
        self.shared.closed.cancel();
    }

    pub fn is_closed(&self) -> bool {
        self.shared.registry.lock().closed
    }

    /// Resolves once the stream has been closed
    pub async fn closed(&self) {
        self.shared.closed.cancelled().await
    }

    pub fn subscriber_count(&self) -> usize {
        self.shared.registry.lock().subscribers.len()
    }

    pub fn buffer_capacity(&self) -> usize {
        self.shared.buffer_capacity
    }

    /// Sum of items currently buffered across all subscribers
    pub fn buffered(&self) -> usize {
        self.shared
            .registry
            .lock()
            .subscribers
            .iter()
            .map(|(_, q)| q.len())
            .sum()
    }
}

/// Empty a subscriber buffer, counting only original deliveries
fn discard<T>(queue: &DropOldestQueue<Delivery<T>>) -> usize {
    queue.drain().iter().filter(|d| !d.replayed).count()
}

/// Result of [`BroadcastStream::resubscribe`]
pub struct Resubscribed<T> {
    pub subscription: Subscription<T>,
    /// Items discarded from the torn-down buffer
    pub discarded: usize,
}

/// Receiving side of one subscriber
///
/// Dropping a subscription detaches it from the stream.
pub struct Subscription<T> {
    id: SubscriberId,
    queue: Arc<DropOldestQueue<Delivery<T>>>,
    shared: Weak<Shared<T>>,
    detached: bool,
}

impl<T> Subscription<T> {
    pub fn id(&self) -> SubscriberId {
        self.id
    }

    /// Next delivery, waiting if necessary
    ///
    /// Returns `None` once the stream is closed and this buffer is drained.
    pub async fn recv(&self) -> Option<Delivery<T>> {
        self.queue.pop().await
    }

    pub fn try_recv(&self) -> Option<Delivery<T>> {
        self.queue.try_pop()
    }

    /// Items waiting in this subscriber's buffer
    pub fn buffered(&self) -> usize {
        self.queue.len()
    }

    /// Items this subscriber lost to drop-oldest eviction
    pub fn evictions(&self) -> u64 {
        self.queue.evictions()
    }

    /// Stream closed and buffer drained
    pub fn is_finished(&self) -> bool {
        self.queue.is_finished()
    }
}

impl<T> Drop for Subscription<T> {
    fn drop(&mut self) {
        if self.detached {
            return;
        }
        if let Some(shared) = self.shared.upgrade() {
            shared.detach(self.id);
        }
    }
}

impl<T> std::fmt::Debug for Subscription<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("buffered", &self.queue.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fan_out_to_every_subscriber() {
        let stream = BroadcastStream::new(4);
        let a = stream.subscribe();
        let b = stream.subscribe();

        let report = stream.publish(1u32).unwrap();
        assert_eq!(report.delivered, 2);
        assert_eq!(report.evicted, 0);

        assert_eq!(a.try_recv().map(|d| d.item), Some(1));
        assert_eq!(b.try_recv().map(|d| d.item), Some(1));
    }

    #[test]
    fn test_new_subscriber_gets_replay() {
        let stream = BroadcastStream::new(4);
        stream.publish(1u32).unwrap();
        stream.publish(2u32).unwrap();

        let late = stream.subscribe();
        let first = late.try_recv().unwrap();
        assert_eq!(first.item, 2);
        assert!(first.replayed);
        assert_eq!(late.try_recv(), None);

        stream.publish(3).unwrap();
        let next = late.try_recv().unwrap();
        assert_eq!(next.item, 3);
        assert!(!next.replayed);
    }

    #[test]
    fn test_empty_replay_seeds_nothing() {
        let stream = BroadcastStream::<u32>::new(4);
        let sub = stream.subscribe();
        assert_eq!(sub.buffered(), 0);
        assert_eq!(stream.latest(), None);
    }

    #[test]
    fn test_slow_subscriber_evicts_independently() {
        let stream = BroadcastStream::new(2);
        let slow = stream.subscribe();
        let fast = stream.subscribe();

        let mut evicted = 0;
        for i in 0..5u32 {
            evicted += stream.publish(i).unwrap().evicted;
            // fast keeps up
            fast.try_recv();
        }

        assert_eq!(evicted, 3);
        assert_eq!(slow.evictions(), 3);
        assert_eq!(fast.evictions(), 0);
        assert_eq!(slow.try_recv().map(|d| d.item), Some(3));
        assert_eq!(slow.try_recv().map(|d| d.item), Some(4));
    }

    #[test]
    fn test_replay_survives_subscriber_drain() {
        let stream = BroadcastStream::new(1);
        let sub = stream.subscribe();
        stream.publish(9u32).unwrap();
        sub.try_recv();
        assert_eq!(stream.latest(), Some(9));
    }

    #[test]
    fn test_resubscribe_counts_discarded_and_replays() {
        let stream = BroadcastStream::new(8);
        let sub = stream.subscribe();
        for i in 0..3u32 {
            stream.publish(i).unwrap();
        }
        let old_id = sub.id();

        let Resubscribed {
            subscription,
            discarded,
        } = stream.resubscribe(sub);
        assert_eq!(discarded, 3);
        assert_ne!(subscription.id(), old_id);
        assert_eq!(stream.subscriber_count(), 1);

        let replay = subscription.try_recv().unwrap();
        assert_eq!(replay.item, 2);
        assert!(replay.replayed);
    }

    #[test]
    fn test_replayed_copies_are_not_losses() {
        let stream = BroadcastStream::new(1);
        stream.publish(1u32).unwrap();

        // seeded with a replayed copy of 1, then 2 evicts it
        let sub = stream.subscribe();
        let report = stream.publish(2).unwrap();
        assert_eq!(report.evicted, 0);
        assert_eq!(report.evicted_replays, 1);

        // 3 evicts the original 2
        assert_eq!(stream.publish(3).unwrap().evicted, 1);

        let Resubscribed { subscription, discarded } = stream.resubscribe(sub);
        assert_eq!(discarded, 1);
        // fresh buffer holds only the replayed copy of 3
        assert_eq!(stream.unsubscribe(subscription), 0);
    }

    #[test]
    fn test_drop_detaches() {
        let stream = BroadcastStream::<u32>::new(2);
        let sub = stream.subscribe();
        assert_eq!(stream.subscriber_count(), 1);
        drop(sub);
        assert_eq!(stream.subscriber_count(), 0);
        assert_eq!(stream.publish(1).unwrap().delivered, 0);
    }

    #[test]
    fn test_unsubscribe_reports_leftovers() {
        let stream = BroadcastStream::new(4);
        let sub = stream.subscribe();
        stream.publish(1u32).unwrap();
        stream.publish(2u32).unwrap();
        assert_eq!(stream.unsubscribe(sub), 2);
        assert_eq!(stream.subscriber_count(), 0);
    }

    #[test]
    fn test_publish_after_close_is_rejected() {
        let stream = BroadcastStream::new(2);
        stream.close();
        assert_eq!(stream.publish(5u32), Err(5));
        assert!(stream.is_closed());
    }

    #[tokio::test]
    async fn test_close_drains_then_ends() {
        let stream = BroadcastStream::new(4);
        let sub = stream.subscribe();
        stream.publish(1u32).unwrap();
        stream.close();
        stream.closed().await;

        assert_eq!(sub.recv().await.map(|d| d.item), Some(1));
        assert_eq!(sub.recv().await, None);
        assert!(sub.is_finished());
    }

    #[tokio::test]
    async fn test_subscribe_after_close_gets_replay_then_end() {
        let stream = BroadcastStream::new(4);
        stream.publish(7u32).unwrap();
        stream.close();

        let sub = stream.subscribe();
        assert_eq!(stream.subscriber_count(), 0);
        assert_eq!(sub.recv().await.map(|d| d.item), Some(7));
        assert_eq!(sub.recv().await, None);
    }
}
