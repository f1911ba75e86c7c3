//! Observability sinks for processed ticks
//!
//! Counters live in `perf::metrics`; this module carries the per-tick
//! observation stream.

pub mod observer;

pub use observer::{
    NoopObserver, RecordingObserver, TickObservation, TickObserver, TracingObserver,
};
