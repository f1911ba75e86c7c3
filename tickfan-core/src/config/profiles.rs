//! Configuration profiles for typical runs
//!
//! Provides pre-configured profiles for:
//! - Demo: the reference 10 second run with three engines
//! - Burst: tiny buffers and a fast source, so drops are visible
//! - Chaos: frequent engine faults with a bounded, backed-off restart policy

use super::types::*;
use crate::core::ConfigError;

/// Configuration profile name
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProfileName {
    Demo,
    Burst,
    Chaos,
}

impl ProfileName {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Demo => "demo",
            Self::Burst => "burst",
            Self::Chaos => "chaos",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "demo" | "default" => Some(Self::Demo),
            "burst" | "stress" => Some(Self::Burst),
            "chaos" => Some(Self::Chaos),
            _ => None,
        }
    }

    /// Parse or fail with a configuration error
    pub fn parse(s: &str) -> Result<Self, ConfigError> {
        Self::from_str(s).ok_or_else(|| ConfigError::UnknownProfile(s.to_string()))
    }
}

/// Configuration profile with run-specific defaults
pub struct ConfigProfile;

impl ConfigProfile {
    /// Reference run
    ///
    /// - 10 second deadline
    /// - 64-slot buffers everywhere
    /// - SLOW engine faults on ~4% of ticks
    pub fn demo() -> PipelineConfig {
        PipelineConfig::default()
    }

    /// Overload the buffers
    ///
    /// - Source emits every 100µs
    /// - 4-slot priority lanes and subscriber buffers
    /// - No faults, so every loss is a backpressure drop
    pub fn burst() -> PipelineConfig {
        let mut config = PipelineConfig {
            deadline_ms: 2_000,
            ..PipelineConfig::default()
        };
        config.source.emit_interval_us = 100;
        config.queues.priority_capacity = 4;
        config.queues.broadcast_capacity = 4;
        config.engines.slow.fault_probability = 0.0;
        config
    }

    /// Frequent engine faults
    ///
    /// - MEDIUM faults on 5% and SLOW on 25% of admitted ticks
    /// - At most 50 restarts per engine, 10ms to 200ms backoff
    pub fn chaos() -> PipelineConfig {
        let mut config = PipelineConfig {
            deadline_ms: 5_000,
            ..PipelineConfig::default()
        };
        config.engines.medium.fault_probability = 0.05;
        config.engines.slow.fault_probability = 0.25;
        config.engines.restart = RestartConfig {
            max_restarts: Some(50),
            backoff_initial_ms: 10,
            backoff_max_ms: 200,
            backoff_multiplier: 2.0,
            backoff_jitter: 0.2,
        };
        config
    }

    pub fn from_name(name: ProfileName) -> PipelineConfig {
        match name {
            ProfileName::Demo => Self::demo(),
            ProfileName::Burst => Self::burst(),
            ProfileName::Chaos => Self::chaos(),
        }
    }
}
