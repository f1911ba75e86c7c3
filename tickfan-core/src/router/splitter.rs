//! Priority Splitter
//!
//! Routes every tick to exactly one lane: BUY → high, SELL → low. Inserts
//! never block; a full lane evicts its oldest tick and the eviction is
//! counted as a drop.
//!
//! ```text
//!   source ──mpsc──► splitter ──┬─ BUY ──► [high lane] (drop-oldest)
//!                               └─ SELL ─► [low lane]  (drop-oldest)
//! ```
//!
//! On exit (source ended or abort) both lanes are closed; buffered ticks
//! remain drainable by the arbiter.

use crate::core::{Lane, PipelineError, Stage, Tick};
use crate::perf::PipelineMetrics;
use crate::queue::{DropOldestQueue, PushOutcome};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

/// Per-lane routing counts
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SplitterStats {
    pub routed_high: u64,
    pub routed_low: u64,
    /// Ticks evicted from either lane
    pub evicted: u64,
}

pub struct PrioritySplitter {
    high: Arc<DropOldestQueue<Tick>>,
    low: Arc<DropOldestQueue<Tick>>,
    metrics: Arc<PipelineMetrics>,
    stats: SplitterStats,
}

impl PrioritySplitter {
    pub fn new(
        high: Arc<DropOldestQueue<Tick>>,
        low: Arc<DropOldestQueue<Tick>>,
        metrics: Arc<PipelineMetrics>,
    ) -> Self {
        Self {
            high,
            low,
            metrics,
            stats: SplitterStats::default(),
        }
    }

    #[inline(always)]
    fn lane(&self, lane: Lane) -> &DropOldestQueue<Tick> {
        match lane {
            Lane::High => &self.high,
            Lane::Low => &self.low,
        }
    }

    /// Route one tick, returning the lane it landed in
    pub fn route(&mut self, tick: Tick) -> Result<Lane, PipelineError> {
        let lane = tick.lane();
        match self.lane(lane).try_push(tick) {
            PushOutcome::Accepted => {}
            PushOutcome::Evicted(old) => {
                self.metrics.inc_dropped();
                self.stats.evicted += 1;
                debug!(lane = %lane, evicted = %old.id, "Lane full, evicted oldest tick");
            }
            PushOutcome::Closed(rejected) => {
                error!(lane = %lane, tick = %rejected.id, "Lane closed while splitter was live");
                return Err(PipelineError::upstream(
                    Stage::Splitter,
                    format!("{lane} lane closed while splitter was live"),
                ));
            }
        }
        match lane {
            Lane::High => self.stats.routed_high += 1,
            Lane::Low => self.stats.routed_low += 1,
        }
        Ok(lane)
    }

    /// Close both lanes
    pub fn close(&self) {
        self.high.close();
        self.low.close();
    }

    pub fn stats(&self) -> SplitterStats {
        self.stats
    }

    /// Consume the source channel until it ends or `abort` fires
    pub async fn run(
        mut self,
        mut rx: mpsc::Receiver<Tick>,
        abort: CancellationToken,
    ) -> Result<SplitterStats, PipelineError> {
        info!(
            high_capacity = self.high.capacity(),
            low_capacity = self.low.capacity(),
            "Priority splitter started"
        );

        let result = loop {
            let next = tokio::select! {
                biased;
                _ = abort.cancelled() => None,
                tick = rx.recv() => tick,
            };
            let Some(tick) = next else {
                break Ok(self.stats);
            };
            if let Err(e) = self.route(tick) {
                break Err(e);
            }
        };

        self.close();
        info!(
            routed_high = self.stats.routed_high,
            routed_low = self.stats.routed_low,
            evicted = self.stats.evicted,
            "Priority splitter stopped"
        );
        result
    }
}
