//! Lock-Free Pipeline Metrics
//!
//! Cache-padded atomic counters for the three pipeline outcomes. All counters
//! use relaxed ordering: each one is independent and only read as a whole at
//! shutdown, after every producer task has been joined.
//!
//! The counters are owned by whoever builds the pipeline and injected into
//! each stage as an `Arc<PipelineMetrics>`. Nothing here is global, so test
//! harnesses can run independent pipelines side by side.

use crossbeam_utils::CachePadded;
use serde::Serialize;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Pipeline outcome counters
///
/// Each counter sits on its own cache line to prevent false sharing between
/// the splitter, the arbiter and the engines.
#[derive(Debug, Default)]
pub struct PipelineMetrics {
    /// Ticks fully processed by an engine
    processed: CachePadded<AtomicU64>,

    /// Ticks evicted by a drop-oldest buffer or discarded on engine teardown
    dropped: CachePadded<AtomicU64>,

    /// Engine restarts performed by the supervisor
    restarted: CachePadded<AtomicU64>,
}

impl PipelineMetrics {
    /// Create new metrics with all counters at zero
    pub fn new() -> Self {
        Self::default()
    }

    #[inline(always)]
    pub fn inc_processed(&self) {
        self.processed.fetch_add(1, Ordering::Relaxed);
    }

    #[inline(always)]
    pub fn inc_dropped(&self) {
        self.dropped.fetch_add(1, Ordering::Relaxed);
    }

    /// Add several drops at once (e.g. a fan-out publish that evicted
    /// from more than one subscriber buffer)
    #[inline(always)]
    pub fn add_dropped(&self, count: u64) {
        if count > 0 {
            self.dropped.fetch_add(count, Ordering::Relaxed);
        }
    }

    #[inline(always)]
    pub fn inc_restarted(&self) {
        self.restarted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn processed(&self) -> u64 {
        self.processed.load(Ordering::Relaxed)
    }

    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    pub fn restarted(&self) -> u64 {
        self.restarted.load(Ordering::Relaxed)
    }

    /// Get snapshot of all metrics
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            processed: self.processed(),
            dropped: self.dropped(),
            restarted: self.restarted(),
        }
    }
}

/// Snapshot of metrics at a point in time
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub processed: u64,
    pub dropped: u64,
    pub restarted: u64,
}

impl MetricsSnapshot {
    /// Fraction of accounted ticks that were dropped
    pub fn drop_rate(&self) -> f64 {
        let total = self.processed + self.dropped;
        if total > 0 {
            self.dropped as f64 / total as f64
        } else {
            0.0
        }
    }
}

impl fmt::Display for MetricsSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Processed: {} | Dropped: {} | Restarted: {}",
            self.processed, self.dropped, self.restarted
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_metrics_padding() {
        // Each counter should be on its own cache line
        assert!(std::mem::align_of::<CachePadded<AtomicU64>>() >= 64);

        let metrics = PipelineMetrics::new();
        let processed_ptr = &metrics.processed as *const _ as usize;
        let dropped_ptr = &metrics.dropped as *const _ as usize;
        assert!(dropped_ptr - processed_ptr >= 64);
    }

    #[test]
    fn test_metrics_operations() {
        let metrics = PipelineMetrics::new();

        metrics.inc_processed();
        metrics.inc_processed();
        metrics.inc_dropped();
        metrics.add_dropped(3);
        metrics.add_dropped(0);
        metrics.inc_restarted();

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.processed, 2);
        assert_eq!(snapshot.dropped, 4);
        assert_eq!(snapshot.restarted, 1);
    }

    #[test]
    fn test_concurrent_increments_are_exact() {
        let metrics = Arc::new(PipelineMetrics::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let m = Arc::clone(&metrics);
                std::thread::spawn(move || {
                    for _ in 0..10_000 {
                        m.inc_processed();
                        m.inc_dropped();
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.processed, 80_000);
        assert_eq!(snapshot.dropped, 80_000);
        assert_eq!(snapshot.restarted, 0);
    }

    #[test]
    fn test_snapshot_drop_rate() {
        let snapshot = MetricsSnapshot {
            processed: 75,
            dropped: 25,
            restarted: 0,
        };
        assert_eq!(snapshot.drop_rate(), 0.25);
        assert_eq!(MetricsSnapshot::default().drop_rate(), 0.0);
    }

    #[test]
    fn test_snapshot_display() {
        let snapshot = MetricsSnapshot {
            processed: 10,
            dropped: 2,
            restarted: 1,
        };
        assert_eq!(
            snapshot.to_string(),
            "Processed: 10 | Dropped: 2 | Restarted: 1"
        );
    }
}
