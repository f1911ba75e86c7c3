//! Supervised processing engines
//!
//! - `worker`: one engine consuming one broadcast subscription
//! - `supervisor`: launches engines and restarts them in isolation

pub mod supervisor;
pub mod worker;

pub use supervisor::{
    EngineReport, EngineSupervisor, Supervised, SupervisorReport, SupervisorSettings,
};
pub use worker::{
    Engine, EngineCounters, EngineExit, EngineProfile, EngineRun, TickFilter,
};
