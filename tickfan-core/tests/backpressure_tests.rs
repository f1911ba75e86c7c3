//! Tests for drop-oldest backpressure and fair lane arbitration
//!
//! Inserts never block anywhere in the pipeline. These tests verify:
//! 1. A full lane evicts its oldest tick and counts a drop
//! 2. Each lane is drained in FIFO order
//! 3. Neither lane starves the other when both are full
//! 4. Subscriber buffer evictions reach the global drop counter

use std::sync::Arc;
use tickfan_core::perf::PipelineMetrics;
use tickfan_core::queue::{BroadcastStream, DropOldestQueue};
use tickfan_core::router::{FairArbiter, PrioritySplitter};
use tickfan_core::testing::{buy, sell};
use tickfan_core::{Tick, TickId};
use tickfan_core::core::Lane;

fn lanes(capacity: usize) -> (Arc<DropOldestQueue<Tick>>, Arc<DropOldestQueue<Tick>>) {
    (
        Arc::new(DropOldestQueue::new(capacity)),
        Arc::new(DropOldestQueue::new(capacity)),
    )
}

#[cfg(test)]
mod lane_overflow {
    use super::*;

    /// Test: capacity 1, burst of 10 BUY ticks keeps only the newest
    #[test]
    fn test_burst_into_single_slot_lane() {
        let (high, low) = lanes(1);
        let metrics = Arc::new(PipelineMetrics::new());
        let mut splitter = PrioritySplitter::new(high.clone(), low.clone(), metrics.clone());

        for id in 1..=10 {
            assert_eq!(splitter.route(buy(id)).unwrap(), Lane::High);
        }

        assert_eq!(high.len(), 1);
        assert!(low.is_empty());
        assert_eq!(metrics.dropped(), 9);
        assert_eq!(splitter.stats().evicted, 9);
        assert_eq!(high.try_pop().map(|t| t.id), Some(TickId::new(10)));
    }

    /// Test: overflow in one lane never touches the other
    #[test]
    fn test_lanes_overflow_independently() {
        let (high, low) = lanes(2);
        let metrics = Arc::new(PipelineMetrics::new());
        let mut splitter = PrioritySplitter::new(high.clone(), low.clone(), metrics.clone());

        splitter.route(sell(1)).unwrap();
        for id in 2..=6 {
            splitter.route(buy(id)).unwrap();
        }

        assert_eq!(low.len(), 1);
        assert_eq!(high.len(), 2);
        assert_eq!(metrics.dropped(), 3);
        let stats = splitter.stats();
        assert_eq!((stats.routed_high, stats.routed_low), (5, 1));
    }

    /// Test: routing after close is an upstream error, not a silent loss
    #[test]
    fn test_route_after_close_fails() {
        let (high, low) = lanes(4);
        let mut splitter =
            PrioritySplitter::new(high, low, Arc::new(PipelineMetrics::new()));
        splitter.close();
        assert!(splitter.route(buy(1)).is_err());
    }
}

#[cfg(test)]
mod arbitration {
    use super::*;

    fn arbiter(
        high: &Arc<DropOldestQueue<Tick>>,
        low: &Arc<DropOldestQueue<Tick>>,
        seed: u64,
    ) -> FairArbiter {
        FairArbiter::new(
            high.clone(),
            low.clone(),
            BroadcastStream::new(16),
            Arc::new(PipelineMetrics::new()),
            seed,
        )
    }

    /// Test: ticks leave each lane in arrival order
    #[tokio::test]
    async fn test_fifo_within_each_lane() {
        let (high, low) = lanes(64);
        for id in 0..20 {
            high.try_push(buy(id));
            low.try_push(sell(100 + id));
        }
        high.close();
        low.close();

        let mut arbiter = arbiter(&high, &low, 3);
        let mut from_high = Vec::new();
        let mut from_low = Vec::new();
        while let Some((lane, tick)) = arbiter.next().await {
            match lane {
                Lane::High => from_high.push(tick.id.as_u64()),
                Lane::Low => from_low.push(tick.id.as_u64()),
            }
        }

        assert_eq!(from_high, (0..20).collect::<Vec<_>>());
        assert_eq!(from_low, (100..120).collect::<Vec<_>>());
    }

    /// Test: 1000 ticks in each lane, first 1000 pulls split roughly evenly
    #[tokio::test]
    async fn test_no_starvation_when_both_lanes_full() {
        for seed in [1, 42, 9_001] {
            let (high, low) = lanes(1_000);
            for id in 0..1_000 {
                high.try_push(buy(id));
                low.try_push(sell(1_000 + id));
            }

            let mut arbiter = arbiter(&high, &low, seed);
            let mut high_pulls = 0;
            for _ in 0..1_000 {
                if let Some((Lane::High, _)) = arbiter.next().await {
                    high_pulls += 1;
                }
            }

            assert!(
                (400..=600).contains(&high_pulls),
                "seed {seed}: high lane served {high_pulls} of 1000"
            );
            let stats = arbiter.stats();
            assert_eq!(stats.from_high + stats.from_low, 1_000);
        }
    }

    /// Test: a lone non-empty lane is always served
    #[tokio::test]
    async fn test_single_lane_served_without_coin_flip() {
        let (high, low) = lanes(8);
        for id in 0..5 {
            low.try_push(sell(id));
        }
        low.close();
        high.close();

        let mut arbiter = arbiter(&high, &low, 0);
        let mut pulled = 0;
        while let Some((lane, _)) = arbiter.next().await {
            assert_eq!(lane, Lane::Low);
            pulled += 1;
        }
        assert_eq!(pulled, 5);
    }
}

#[cfg(test)]
mod subscriber_overflow {
    use super::*;
    use tokio_util::sync::CancellationToken;

    /// Test: a stalled subscriber loses its oldest ticks, counted as drops
    #[tokio::test]
    async fn test_stalled_subscriber_evictions_counted() {
        let (high, low) = lanes(64);
        let stream = BroadcastStream::new(4);
        let stalled = stream.subscribe();
        let metrics = Arc::new(PipelineMetrics::new());

        for id in 0..10 {
            high.try_push(buy(id));
        }
        high.close();
        low.close();

        let arbiter = FairArbiter::new(high, low, stream.clone(), metrics.clone(), 5);
        let stats = arbiter.run(CancellationToken::new()).await.unwrap();

        assert_eq!(stats.published, 10);
        assert_eq!(metrics.dropped(), 6);
        assert_eq!(stalled.evictions(), 6);
        assert!(stream.is_closed());

        let mut ids = Vec::new();
        while let Some(delivery) = stalled.recv().await {
            assert!(!delivery.replayed);
            ids.push(delivery.item.id.as_u64());
        }
        assert_eq!(ids, vec![6, 7, 8, 9]);
    }
}
