//! Core value types for the tick pipeline
//!
//! This module provides the fundamental building blocks shared by every stage:
//! - `Tick`: immutable synthetic market event (cheap to clone for fan-out)
//! - `EngineSpeed` / `Lane` / `Side`: small copy enums that drive routing
//! - `EngineLifecycle`: runtime-checked engine state machine
//! - Error taxonomy (transient engine faults vs. fatal pipeline errors)

pub mod engine_fsm;
pub mod errors;
pub mod types;

// Re-export commonly used types
pub use engine_fsm::{EngineLifecycle, EngineState};
pub use errors::{ConfigError, EngineFault, PipelineError, Stage, TransitionError};
pub use types::{EngineSpeed, Lane, Side, Symbol, Tick, TickId};
