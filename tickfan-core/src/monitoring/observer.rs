//! Per-tick observation sinks
//!
//! Every tick an engine completes produces exactly one [`TickObservation`],
//! handed to a caller-supplied [`TickObserver`]. Faulted ticks produce none.

use crate::core::{EngineSpeed, Side, Symbol, TickId};
use parking_lot::Mutex;
use std::time::Duration;
use tracing::info;

/// One completed tick
#[derive(Debug, Clone, PartialEq)]
pub struct TickObservation {
    pub speed: EngineSpeed,
    pub tick_id: TickId,
    pub side: Side,
    pub symbol: Symbol,
    pub price: f64,
    /// Simulated processing latency
    pub latency: Duration,
    /// Delivered from the replay cache after a (re)subscription
    pub replayed: bool,
}

/// Receives observations from every engine concurrently
pub trait TickObserver: Send + Sync {
    fn observe(&self, observation: TickObservation);
}

/// Logs each observation at info level
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl TickObserver for TracingObserver {
    fn observe(&self, o: TickObservation) {
        info!(
            engine = %o.speed,
            tick = %o.tick_id,
            side = %o.side,
            symbol = %o.symbol,
            price = format_args!("{:.2}", o.price),
            latency_ms = o.latency.as_millis() as u64,
            replayed = o.replayed,
            "Processed tick"
        );
    }
}

/// Discards everything
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl TickObserver for NoopObserver {
    #[inline(always)]
    fn observe(&self, _observation: TickObservation) {}
}

/// Keeps every observation in memory, in arrival order
#[derive(Debug, Default)]
pub struct RecordingObserver {
    records: Mutex<Vec<TickObservation>>,
}

impl RecordingObserver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of everything recorded so far
    pub fn records(&self) -> Vec<TickObservation> {
        self.records.lock().clone()
    }

    /// Observations from one engine
    pub fn for_speed(&self, speed: EngineSpeed) -> Vec<TickObservation> {
        self.records
            .lock()
            .iter()
            .filter(|o| o.speed == speed)
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }
}

impl TickObserver for RecordingObserver {
    fn observe(&self, observation: TickObservation) {
        self.records.lock().push(observation);
    }
}
