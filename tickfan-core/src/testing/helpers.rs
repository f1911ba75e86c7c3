//! Test helper utilities for building ticks, configs and assertions
//!
//! Provides convenient builders and utilities for:
//! - Tick creation
//! - Deterministic pipeline configurations (zero latency, no faults)
//! - Accounting assertions over pipeline reports and observations

use crate::config::{PipelineConfig, SpeedProfile};
use crate::core::{EngineSpeed, Side, Symbol, Tick, TickId};
use crate::monitoring::TickObservation;
use crate::pipeline::PipelineReport;
use std::collections::HashSet;
use std::time::Duration;
use tokio::time::Instant;

/// Create a tick with a fixed price
pub fn test_tick(id: u64, side: Side, symbol: &str) -> Tick {
    Tick::new(TickId::new(id), Symbol::new(symbol), 100.0, side, Instant::now())
}

pub fn buy(id: u64) -> Tick {
    test_tick(id, Side::Buy, "AAPL")
}

pub fn sell(id: u64) -> Tick {
    test_tick(id, Side::Sell, "AAPL")
}

/// Deterministic config: exactly `max_ticks` ticks, instant fault-free
/// engines, buffers large enough that nothing is evicted
pub fn scenario_config(speeds: &[EngineSpeed], max_ticks: u64) -> PipelineConfig {
    let mut config = PipelineConfig {
        seed: 7,
        deadline_ms: 3_600_000,
        drain_grace_ms: 0,
        ..PipelineConfig::default()
    };
    let capacity = (max_ticks as usize).max(1);
    config.source.max_ticks = Some(max_ticks);
    config.source.emit_interval_us = 1_000;
    config.queues.priority_capacity = capacity;
    config.queues.broadcast_capacity = capacity;
    config.engines.speeds = speeds.to_vec();
    for speed in EngineSpeed::ALL {
        *config.engines.profile_mut(speed) = SpeedProfile::latency(0, 0);
    }
    config
}

/// `generated == processed - replayed + dropped + buffered_at_shutdown`
///
/// Holds for a single unfiltered engine under the default restart policy.
pub fn assert_conservation(report: &PipelineReport) {
    let accounted = report.metrics.processed - report.replayed()
        + report.metrics.dropped
        + report.buffered_at_shutdown;
    assert_eq!(
        report.generated, accounted,
        "generated {} != processed {} - replayed {} + dropped {} + buffered {}",
        report.generated,
        report.metrics.processed,
        report.replayed(),
        report.metrics.dropped,
        report.buffered_at_shutdown
    );
}

/// Every original (non-replayed) tick id appears at most once per engine
pub fn assert_no_double_processing(observations: &[TickObservation]) {
    let mut seen = HashSet::new();
    for o in observations.iter().filter(|o| !o.replayed) {
        assert!(
            seen.insert((o.speed, o.tick_id)),
            "{} processed {} twice",
            o.speed,
            o.tick_id
        );
    }
}

/// Tick ids observed by one engine, in processing order
pub fn observed_ids(observations: &[TickObservation], speed: EngineSpeed) -> Vec<u64> {
    observations
        .iter()
        .filter(|o| o.speed == speed)
        .map(|o| o.tick_id.as_u64())
        .collect()
}

/// Measure operation latency
pub fn measure_latency<F, R>(operation: F) -> (R, Duration)
where
    F: FnOnce() -> R,
{
    let start = std::time::Instant::now();
    let result = operation();
    (result, start.elapsed())
}
