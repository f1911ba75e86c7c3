//! Restart policy applied by the engine supervisor
//!
//! The default policy restarts immediately and without limit. A budget and
//! a backoff can be layered on top per deployment.

use super::backoff::{BackoffConfig, ExponentialBackoff};
use std::time::Duration;

/// How the supervisor reacts to a transient engine fault
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RestartPolicy {
    /// Restarts allowed per engine (None = unlimited)
    pub max_restarts: Option<u32>,
    /// Delay schedule between a crash and the relaunch (None = immediate)
    pub backoff: Option<BackoffConfig>,
}

impl RestartPolicy {
    /// Restart immediately, forever
    pub fn unlimited() -> Self {
        Self::default()
    }

    pub fn with_max_restarts(mut self, max: u32) -> Self {
        self.max_restarts = Some(max);
        self
    }

    pub fn with_backoff(mut self, backoff: BackoffConfig) -> Self {
        self.backoff = Some(backoff);
        self
    }

    /// Fresh per-engine budget; `seed` drives the backoff jitter
    pub fn budget(&self, seed: u64) -> RestartBudget {
        RestartBudget {
            max_restarts: self.max_restarts,
            used: 0,
            backoff: self
                .backoff
                .clone()
                .map(|config| ExponentialBackoff::with_seed(config, seed)),
        }
    }
}

/// Supervisor decision after a fault
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestartDecision {
    /// Relaunch after the given delay
    Restart { delay: Duration },
    /// Budget exhausted; the engine stays down
    GiveUp,
}

/// Restart bookkeeping for one engine
#[derive(Debug, Clone)]
pub struct RestartBudget {
    max_restarts: Option<u32>,
    used: u32,
    backoff: Option<ExponentialBackoff>,
}

impl RestartBudget {
    /// Consume one restart from the budget
    pub fn next(&mut self) -> RestartDecision {
        if let Some(max) = self.max_restarts {
            if self.used >= max {
                return RestartDecision::GiveUp;
            }
        }

        let delay = match self.backoff.as_mut() {
            Some(backoff) => match backoff.next_delay() {
                Some(delay) => delay,
                None => return RestartDecision::GiveUp,
            },
            None => Duration::ZERO,
        };

        self.used += 1;
        RestartDecision::Restart { delay }
    }

    #[inline(always)]
    pub fn used(&self) -> u32 {
        self.used
    }
}
