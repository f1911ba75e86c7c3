//! Tickfan Core - Supervised, Priority-Aware Tick Fan-Out Pipeline
//!
//! A bounded in-memory pipeline that routes synthetic market ticks through
//! two priority lanes into a broadcast stream consumed by a pool of
//! supervised engines of different speeds.
//!
//! ## Architecture
//! - **Never blocks on insert**: every buffer is drop-oldest
//! - **No starvation**: the arbiter breaks ties between lanes with a seeded coin flip
//! - **Failure isolation**: one engine's fault never touches its siblings
//! - **Replay on restart**: a restarted engine resumes from the last published tick
//! - **Exact accounting**: processed / dropped / restarted counters
//!
//! ## Core Modules
//! - `core`: Tick and engine value types, lifecycle state machine, errors
//! - `queue`: Drop-oldest queue and broadcast stream with replay cache
//! - `data`: Tick generator and source task
//! - `router`: Priority splitter and fair arbiter
//! - `engine`: Engine worker and supervisor
//! - `pipeline`: Orchestrator, cancellation tree and final report
//! - `config`: Serde configuration, validation and profiles
//! - `resilience`: Restart policy, backoff, panic hook
//! - `monitoring`: Per-tick observation sinks
//! - `perf`: Cache-padded pipeline counters

pub mod config;
pub mod core;
pub mod data;
pub mod engine;
pub mod monitoring;
pub mod perf;
pub mod pipeline;
pub mod queue;
pub mod resilience;
pub mod router;
pub mod testing;
pub mod utils;

pub use crate::core::{
    ConfigError, EngineFault, EngineSpeed, EngineState, PipelineError, Side, Symbol, Tick, TickId,
};
pub use config::PipelineConfig;
pub use pipeline::{Pipeline, PipelineReport, StopHandle, StopReason};

/// Prelude for convenient imports
pub mod prelude {
    // Core types
    pub use crate::core::{EngineSpeed, EngineState, Lane, Side, Symbol, Tick, TickId};

    // Pipeline
    pub use crate::config::{ConfigProfile, PipelineConfig, ProfileName};
    pub use crate::pipeline::{Pipeline, PipelineReport, StopHandle, StopReason};

    // Observation and counters
    pub use crate::monitoring::{RecordingObserver, TickObservation, TickObserver, TracingObserver};
    pub use crate::perf::{MetricsSnapshot, PipelineMetrics};

    // Error types
    pub use crate::core::{ConfigError, EngineFault, PipelineError};
}
