//! Engine Lifecycle State Machine
//!
//! Runtime-checked state machine for a supervised engine. The supervisor
//! owns one [`EngineLifecycle`] per speed tier and drives every transition;
//! engines themselves never touch it.
//!
//! # State Diagram
//!
//! ```text
//!      STARTING
//!          │
//!    subscribed()
//!          ▼
//!      RUNNING ◄─────────────┐
//!          │                 │
//!      fault()          relaunched()
//!          ▼                 │
//!      CRASHED ──restart()──► RESTARTING
//!
//!   any state ──stop()──► STOPPED (terminal)
//! ```
//!
//! **Key Invariants:**
//! - `Stopped` is terminal: no transition leaves it
//! - `Crashed` is only reachable from `Running`
//! - `Running` is only reachable from `Starting` or `Restarting`
//! - A fault never moves an engine further than `Crashed → Restarting → Running`

use super::errors::TransitionError;
use super::types::EngineSpeed;
use serde::Serialize;
use tokio::time::Instant;

/// Lifecycle state of one supervised engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum EngineState {
    /// Created, subscription not yet attached
    Starting,
    /// Consuming its subscription
    Running,
    /// Raised a transient fault; supervisor has not reacted yet
    Crashed,
    /// Fresh subscription attached, relaunch pending
    Restarting,
    /// Terminal
    Stopped,
}

impl EngineState {
    /// Whether `self → next` is a legal move
    pub const fn can_transition_to(self, next: EngineState) -> bool {
        use EngineState::*;
        matches!(
            (self, next),
            (Starting, Running)
                | (Running, Crashed)
                | (Crashed, Restarting)
                | (Restarting, Running)
                | (Starting, Stopped)
                | (Running, Stopped)
                | (Crashed, Stopped)
                | (Restarting, Stopped)
        )
    }

    #[inline(always)]
    pub const fn is_terminal(self) -> bool {
        matches!(self, EngineState::Stopped)
    }
}

/// Supervisor-side lifecycle record for one engine
///
/// Keeps the full transition history so a run can be audited afterwards.
#[derive(Debug, Clone)]
pub struct EngineLifecycle {
    speed: EngineSpeed,
    state: EngineState,
    history: Vec<EngineState>,
    last_change: Instant,
}

impl EngineLifecycle {
    /// New lifecycle in `Starting`
    pub fn new(speed: EngineSpeed) -> Self {
        Self {
            speed,
            state: EngineState::Starting,
            history: vec![EngineState::Starting],
            last_change: Instant::now(),
        }
    }

    pub fn speed(&self) -> EngineSpeed {
        self.speed
    }

    pub fn state(&self) -> EngineState {
        self.state
    }

    /// Every state visited, in order, starting with `Starting`
    pub fn history(&self) -> &[EngineState] {
        &self.history
    }

    /// Time spent in the current state
    pub fn time_in_state(&self) -> std::time::Duration {
        self.last_change.elapsed()
    }

    /// Attempt a transition, recording it on success
    pub fn transition(&mut self, next: EngineState) -> Result<EngineState, TransitionError> {
        if !self.state.can_transition_to(next) {
            return Err(TransitionError {
                speed: self.speed,
                from: self.state,
                to: next,
            });
        }
        let previous = self.state;
        self.state = next;
        self.history.push(next);
        self.last_change = Instant::now();
        Ok(previous)
    }

    /// Move to `Stopped` from wherever the engine is
    ///
    /// Idempotent: stopping an already stopped engine records nothing.
    pub fn stop(&mut self) {
        if !self.state.is_terminal() {
            self.state = EngineState::Stopped;
            self.history.push(EngineState::Stopped);
            self.last_change = Instant::now();
        }
    }

    /// Number of completed crash cycles recorded in the history
    pub fn crash_count(&self) -> usize {
        self.history
            .iter()
            .filter(|s| **s == EngineState::Crashed)
            .count()
    }
}
