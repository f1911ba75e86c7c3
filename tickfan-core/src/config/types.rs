use crate::core::{ConfigError, EngineSpeed};
use crate::resilience::{BackoffConfig, RestartPolicy};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::ops::RangeInclusive;
use std::time::Duration;

/// Main configuration structure
///
/// Every field has a default; a JSON file only needs to name what it changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Seed for every RNG in the pipeline (source, arbiter, engines, backoff jitter)
    pub seed: u64,

    /// Overall run deadline in milliseconds
    pub deadline_ms: u64,

    /// How long engines keep draining after the deadline before being halted
    pub drain_grace_ms: u64,

    pub source: SourceConfig,
    pub queues: QueueConfig,
    pub engines: EngineConfig,
}

/// Tick generation parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    /// Fixed symbol set ticks are drawn from
    pub symbols: Vec<String>,

    /// Minimum delay between two emitted ticks, in microseconds
    pub emit_interval_us: u64,

    /// Stop after this many ticks (None = run until the deadline)
    pub max_ticks: Option<u64>,

    /// Prices are drawn uniformly from `[price_min, price_max)`
    pub price_min: f64,
    pub price_max: f64,

    /// Probability that a tick is a BUY
    pub buy_probability: f64,

    /// Fail the source with an upstream fault after this many ticks
    pub fault_after_ticks: Option<u64>,
}

/// Buffer sizing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// Capacity of each priority lane
    pub priority_capacity: usize,

    /// Capacity of each engine's broadcast buffer
    pub broadcast_capacity: usize,

    /// Replay cache size (fixed at 1)
    pub replay_size: usize,
}

/// Engine pool configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Speed tiers to launch, one engine each
    pub speeds: Vec<EngineSpeed>,

    /// Symbol admitted by the MEDIUM engine
    pub medium_symbol: String,

    pub fast: SpeedProfile,
    pub medium: SpeedProfile,
    pub slow: SpeedProfile,

    pub restart: RestartConfig,
}

/// Latency and fault parameters for one speed tier
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpeedProfile {
    /// Simulated processing latency range (inclusive), in milliseconds
    pub latency_min_ms: u64,
    pub latency_max_ms: u64,

    /// Probability of a transient fault per admitted tick
    pub fault_probability: f64,

    /// Lifetime admission ordinals (1-based) that always fault
    pub scripted_faults: Vec<u64>,
}

/// Supervisor restart policy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RestartConfig {
    /// Restarts allowed per engine (None = unlimited)
    pub max_restarts: Option<u32>,

    /// Initial delay before a relaunch; 0 disables backoff
    pub backoff_initial_ms: u64,

    /// Upper bound for the backoff delay
    pub backoff_max_ms: u64,

    /// Growth factor between consecutive restarts
    pub backoff_multiplier: f64,

    /// Randomization applied to each delay (0.0 to 1.0)
    pub backoff_jitter: f64,
}

// ============================================================================
// Defaults
// ============================================================================

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            seed: 42,
            deadline_ms: 10_000,
            drain_grace_ms: 500,
            source: SourceConfig::default(),
            queues: QueueConfig::default(),
            engines: EngineConfig::default(),
        }
    }
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            symbols: ["AAPL", "MSFT", "GOOGL", "TSLA", "NVDA"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            emit_interval_us: 1_000,
            max_ticks: None,
            price_min: 100.0,
            price_max: 1_000.0,
            buy_probability: 0.5,
            fault_after_ticks: None,
        }
    }
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            priority_capacity: 64,
            broadcast_capacity: 64,
            replay_size: 1,
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            speeds: EngineSpeed::ALL.to_vec(),
            medium_symbol: "MSFT".to_string(),
            fast: SpeedProfile::latency(10, 50),
            medium: SpeedProfile::latency(50, 150),
            slow: SpeedProfile {
                fault_probability: 0.04,
                ..SpeedProfile::latency(200, 300)
            },
            restart: RestartConfig::default(),
        }
    }
}

impl Default for SpeedProfile {
    fn default() -> Self {
        Self::latency(0, 0)
    }
}

impl Default for RestartConfig {
    fn default() -> Self {
        Self {
            max_restarts: None,
            backoff_initial_ms: 0,
            backoff_max_ms: 1_000,
            backoff_multiplier: 2.0,
            backoff_jitter: 0.1,
        }
    }
}

// ============================================================================
// Accessors
// ============================================================================

impl PipelineConfig {
    pub fn deadline(&self) -> Duration {
        Duration::from_millis(self.deadline_ms)
    }

    pub fn drain_grace(&self) -> Duration {
        Duration::from_millis(self.drain_grace_ms)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.source.validate()?;
        self.queues.validate()?;
        self.engines.validate()?;
        Ok(())
    }
}

impl SourceConfig {
    pub fn emit_interval(&self) -> Duration {
        Duration::from_micros(self.emit_interval_us)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.symbols.is_empty() {
            return Err(ConfigError::NoSymbols);
        }
        if !(self.price_min > 0.0 && self.price_min < self.price_max) {
            return Err(ConfigError::PriceRange {
                min: self.price_min,
                max: self.price_max,
            });
        }
        check_probability("source.buy_probability", self.buy_probability)
    }
}

impl QueueConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.priority_capacity == 0 {
            return Err(ConfigError::ZeroCapacity {
                field: "queues.priority_capacity",
                value: self.priority_capacity,
            });
        }
        if self.broadcast_capacity == 0 {
            return Err(ConfigError::ZeroCapacity {
                field: "queues.broadcast_capacity",
                value: self.broadcast_capacity,
            });
        }
        if self.replay_size != 1 {
            return Err(ConfigError::ReplaySize(self.replay_size));
        }
        Ok(())
    }
}

impl EngineConfig {
    /// Profile for one speed tier
    pub fn profile(&self, speed: EngineSpeed) -> &SpeedProfile {
        match speed {
            EngineSpeed::Fast => &self.fast,
            EngineSpeed::Medium => &self.medium,
            EngineSpeed::Slow => &self.slow,
        }
    }

    pub fn profile_mut(&mut self, speed: EngineSpeed) -> &mut SpeedProfile {
        match speed {
            EngineSpeed::Fast => &mut self.fast,
            EngineSpeed::Medium => &mut self.medium,
            EngineSpeed::Slow => &mut self.slow,
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.speeds.is_empty() {
            return Err(ConfigError::NoEngines);
        }
        let mut seen = HashSet::new();
        for speed in &self.speeds {
            if !seen.insert(*speed) {
                return Err(ConfigError::DuplicateEngine(*speed));
            }
        }
        for speed in EngineSpeed::ALL {
            self.profile(speed).validate(speed)?;
        }
        self.restart.validate()
    }
}

impl SpeedProfile {
    /// Fault-free profile with the given latency range
    pub fn latency(min_ms: u64, max_ms: u64) -> Self {
        Self {
            latency_min_ms: min_ms,
            latency_max_ms: max_ms,
            fault_probability: 0.0,
            scripted_faults: Vec::new(),
        }
    }

    pub fn latency_range(&self) -> RangeInclusive<Duration> {
        Duration::from_millis(self.latency_min_ms)..=Duration::from_millis(self.latency_max_ms)
    }

    fn validate(&self, speed: EngineSpeed) -> Result<(), ConfigError> {
        if self.latency_min_ms > self.latency_max_ms {
            return Err(ConfigError::LatencyRange {
                speed,
                min_ms: self.latency_min_ms,
                max_ms: self.latency_max_ms,
            });
        }
        if self.scripted_faults.contains(&0) {
            return Err(ConfigError::ScriptedFaultOrdinal(speed));
        }
        check_probability(
            &format!("engines.{}.fault_probability", speed.as_str().to_lowercase()),
            self.fault_probability,
        )
    }
}

impl RestartConfig {
    /// Build the runtime restart policy
    pub fn to_policy(&self) -> RestartPolicy {
        let backoff = (self.backoff_initial_ms > 0).then(|| BackoffConfig {
            initial_delay: Duration::from_millis(self.backoff_initial_ms),
            max_delay: Duration::from_millis(self.backoff_max_ms.max(self.backoff_initial_ms)),
            multiplier: self.backoff_multiplier,
            max_retries: None,
            jitter_factor: self.backoff_jitter,
        });
        RestartPolicy {
            max_restarts: self.max_restarts,
            backoff,
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if !BackoffConfig::multiplier_is_valid(self.backoff_multiplier) {
            return Err(ConfigError::BackoffMultiplier(self.backoff_multiplier));
        }
        check_probability("engines.restart.backoff_jitter", self.backoff_jitter)
    }
}

fn check_probability(field: &str, value: f64) -> Result<(), ConfigError> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(ConfigError::Probability {
            field: field.to_string(),
            value,
        })
    }
}
