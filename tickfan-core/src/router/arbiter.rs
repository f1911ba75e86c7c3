//! Fair Arbiter
//!
//! Drains both priority lanes onto the broadcast stream. When only one lane
//! has a tick, that lane is served; when both do, a seeded coin flip decides,
//! so neither lane can starve the other.
//!
//! ```text
//!   [high lane] ──┐
//!                 ├──► coin flip ──► BroadcastStream::publish ──► subscribers
//!   [low lane]  ──┘        (seeded)         + replay slot
//! ```
//!
//! Ticks leave each lane in FIFO order. The stream is closed once both lanes
//! are closed and drained, or on abort.

use crate::core::{Lane, PipelineError, Stage, Tick};
use crate::perf::PipelineMetrics;
use crate::queue::{BroadcastStream, DropOldestQueue};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

/// Arbiter activity counts
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ArbiterStats {
    pub from_high: u64,
    pub from_low: u64,
    pub published: u64,
}

pub struct FairArbiter {
    high: Arc<DropOldestQueue<Tick>>,
    low: Arc<DropOldestQueue<Tick>>,
    stream: BroadcastStream<Tick>,
    metrics: Arc<PipelineMetrics>,
    rng: StdRng,
    stats: ArbiterStats,
}

impl FairArbiter {
    pub fn new(
        high: Arc<DropOldestQueue<Tick>>,
        low: Arc<DropOldestQueue<Tick>>,
        stream: BroadcastStream<Tick>,
        metrics: Arc<PipelineMetrics>,
        seed: u64,
    ) -> Self {
        Self {
            high,
            low,
            stream,
            metrics,
            rng: StdRng::seed_from_u64(seed),
            stats: ArbiterStats::default(),
        }
    }

    #[inline(always)]
    fn lane(&self, lane: Lane) -> &DropOldestQueue<Tick> {
        match lane {
            Lane::High => &self.high,
            Lane::Low => &self.low,
        }
    }

    /// Next tick from whichever lane is ready, unbiased when both are
    ///
    /// Returns `None` once both lanes are closed and drained. Cancel-safe:
    /// a tick is only removed from a lane right before returning it.
    pub async fn next(&mut self) -> Option<(Lane, Tick)> {
        loop {
            let lane = match (!self.high.is_empty(), !self.low.is_empty()) {
                (true, true) => {
                    if self.rng.gen_bool(0.5) {
                        Lane::High
                    } else {
                        Lane::Low
                    }
                }
                (true, false) => Lane::High,
                (false, true) => Lane::Low,
                (false, false) => {
                    let wait_high = !self.high.is_finished();
                    let wait_low = !self.low.is_finished();
                    if !wait_high && !wait_low {
                        return None;
                    }
                    tokio::select! {
                        _ = self.high.ready(), if wait_high => {}
                        _ = self.low.ready(), if wait_low => {}
                    }
                    continue;
                }
            };

            // Only the arbiter pops, so a lane seen non-empty stays non-empty
            if let Some(tick) = self.lane(lane).try_pop() {
                match lane {
                    Lane::High => self.stats.from_high += 1,
                    Lane::Low => self.stats.from_low += 1,
                }
                return Some((lane, tick));
            }
        }
    }

    pub fn stats(&self) -> ArbiterStats {
        self.stats
    }

    /// Republish every tick until the lanes are drained or `abort` fires
    pub async fn run(mut self, abort: CancellationToken) -> Result<ArbiterStats, PipelineError> {
        info!(subscribers = self.stream.subscriber_count(), "Fair arbiter started");

        let result = loop {
            let next = tokio::select! {
                biased;
                _ = abort.cancelled() => None,
                next = self.next() => next,
            };
            let Some((lane, tick)) = next else {
                break Ok(self.stats);
            };

            let id = tick.id;
            match self.stream.publish(tick) {
                Ok(report) => {
                    self.stats.published += 1;
                    if report.evicted > 0 {
                        self.metrics.add_dropped(report.evicted as u64);
                        debug!(
                            tick = %id,
                            lane = %lane,
                            evicted = report.evicted,
                            "Subscriber buffers full, evicted oldest"
                        );
                    }
                }
                Err(rejected) => {
                    error!(tick = %rejected.id, "Broadcast stream closed while arbiter was live");
                    break Err(PipelineError::upstream(
                        Stage::Arbiter,
                        "broadcast stream closed while arbiter was live",
                    ));
                }
            }
        };

        self.stream.close();
        info!(
            from_high = self.stats.from_high,
            from_low = self.stats.from_low,
            published = self.stats.published,
            "Fair arbiter stopped"
        );
        result
    }
}
