//! Domain-specific error types for the tick pipeline
//!
//! The taxonomy mirrors how each failure is handled:
//! - [`EngineFault`]: transient, engine-local, recovered by the supervisor
//! - [`PipelineError`]: upstream fatal, cancels the whole pipeline
//! - [`ConfigError`]: rejected before anything is spawned
//! - [`TransitionError`]: illegal engine lifecycle move
//!
//! Backpressure drops and deadline expiry are not errors and have no type here.

use super::engine_fsm::EngineState;
use super::types::{EngineSpeed, TickId};
use thiserror::Error;

/// Transient processing fault raised inside one engine
///
/// Never surfaced to the pipeline caller; the supervisor restarts the engine.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EngineFault {
    /// Fault drawn by the engine's fault injector while processing a tick
    #[error("{speed} engine faulted on tick {tick_id} (admission {admission})")]
    Injected {
        speed: EngineSpeed,
        tick_id: TickId,
        /// Lifetime admission ordinal of the faulted tick (1-based)
        admission: u64,
        /// The faulted tick was a replayed copy
        replayed: bool,
    },

    /// The engine task panicked; the panic was caught at the supervisor boundary
    #[error("{speed} engine panicked: {message}")]
    Panicked { speed: EngineSpeed, message: String },
}

impl EngineFault {
    pub fn speed(&self) -> EngineSpeed {
        match self {
            EngineFault::Injected { speed, .. } | EngineFault::Panicked { speed, .. } => *speed,
        }
    }

    /// Tick that was in flight when the fault occurred, if known
    pub fn in_flight(&self) -> Option<TickId> {
        match self {
            EngineFault::Injected { tick_id, .. } => Some(*tick_id),
            EngineFault::Panicked { .. } => None,
        }
    }

    /// Whether the fault lost an original delivery (replayed copies are not losses)
    pub fn lost_tick(&self) -> bool {
        matches!(self, EngineFault::Injected { replayed: false, .. })
    }
}

/// Upstream pipeline stage, used to attribute fatal faults
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Source,
    Splitter,
    Arbiter,
    Supervisor,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Stage::Source => write!(f, "source"),
            Stage::Splitter => write!(f, "splitter"),
            Stage::Arbiter => write!(f, "arbiter"),
            Stage::Supervisor => write!(f, "supervisor"),
        }
    }
}

/// Unrecoverable pipeline failure
///
/// Any of these cancels every stage and is returned from `Pipeline::run`.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// An upstream stage detected a broken invariant
    #[error("{stage} failed: {reason}")]
    Upstream { stage: Stage, reason: String },

    /// An upstream stage task panicked or was cancelled by the runtime
    #[error("{stage} task aborted: {source}")]
    TaskAborted {
        stage: Stage,
        #[source]
        source: tokio::task::JoinError,
    },

    /// Configuration rejected at construction
    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl PipelineError {
    pub fn upstream(stage: Stage, reason: impl Into<String>) -> Self {
        PipelineError::Upstream {
            stage,
            reason: reason.into(),
        }
    }

    pub fn stage(&self) -> Option<Stage> {
        match self {
            PipelineError::Upstream { stage, .. } | PipelineError::TaskAborted { stage, .. } => {
                Some(*stage)
            }
            PipelineError::Config(_) => None,
        }
    }
}

/// Configuration validation failure
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{field} must be at least 1 (got {value})")]
    ZeroCapacity { field: &'static str, value: usize },

    #[error("replay cache size is fixed at 1 (got {0})")]
    ReplaySize(usize),

    #[error("{field} must be a probability in [0, 1] (got {value})")]
    Probability { field: String, value: f64 },

    #[error("latency range for {speed} is inverted: {min_ms}ms > {max_ms}ms")]
    LatencyRange {
        speed: EngineSpeed,
        min_ms: u64,
        max_ms: u64,
    },

    #[error("price range must satisfy 0 < min < max (got {min}..{max})")]
    PriceRange { min: f64, max: f64 },

    #[error("engines.restart.backoff_multiplier must be finite and at least 1.0 (got {0})")]
    BackoffMultiplier(f64),

    #[error("symbol set must not be empty")]
    NoSymbols,

    #[error("engine set must not be empty")]
    NoEngines,

    #[error("engine {0} listed more than once")]
    DuplicateEngine(EngineSpeed),

    #[error("scripted fault ordinals are 1-based (got 0 for {0})")]
    ScriptedFaultOrdinal(EngineSpeed),

    #[error("unknown profile '{0}' (expected demo, burst or chaos)")]
    UnknownProfile(String),

    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Rejected engine lifecycle transition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("{speed} engine cannot move from {from:?} to {to:?}")]
pub struct TransitionError {
    pub speed: EngineSpeed,
    pub from: EngineState,
    pub to: EngineState,
}
