//! Performance utilities
//!
//! Lock-free, cache-padded counters shared by every pipeline stage.

pub mod metrics;

pub use metrics::{MetricsSnapshot, PipelineMetrics};
