//! Core value types flowing through the pipeline
//!
//! All types in this module are designed for:
//! - Cheap clones (ticks are fanned out to every engine)
//! - Immutability once created
//! - Copy semantics where possible

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tokio::time::Instant;

/// Monotonically increasing tick identifier (first tick is 1)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct TickId(pub u64);

impl TickId {
    #[inline(always)]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    #[inline(always)]
    pub const fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for TickId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Instrument symbol
///
/// Backed by a shared string so cloning a tick for fan-out is a refcount bump.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Symbol(Arc<str>);

impl Symbol {
    pub fn new(name: &str) -> Self {
        Self(Arc::from(name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Symbol {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

/// Order side (Buy or Sell)
///
/// Single byte enum for minimal size
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
#[serde(rename_all = "UPPERCASE")]
pub enum Side {
    Buy = 0,
    Sell = 1,
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Buy => write!(f, "BUY"),
            Side::Sell => write!(f, "SELL"),
        }
    }
}

/// Priority lane a tick is routed to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Lane {
    High,
    Low,
}

impl Lane {
    /// BUY ticks take the high-priority lane, SELL ticks the low-priority lane
    #[inline(always)]
    pub const fn for_side(side: Side) -> Self {
        match side {
            Side::Buy => Lane::High,
            Side::Sell => Lane::Low,
        }
    }

    pub const fn as_str(&self) -> &'static str {
        match self {
            Lane::High => "high",
            Lane::Low => "low",
        }
    }
}

impl fmt::Display for Lane {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Engine speed tier
///
/// Determines both which ticks an engine admits and how long it takes
/// to process each one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineSpeed {
    Fast,
    Medium,
    Slow,
}

impl EngineSpeed {
    /// Every speed tier, in launch order
    pub const ALL: [EngineSpeed; 3] = [EngineSpeed::Fast, EngineSpeed::Medium, EngineSpeed::Slow];

    pub const fn as_str(&self) -> &'static str {
        match self {
            EngineSpeed::Fast => "FAST",
            EngineSpeed::Medium => "MEDIUM",
            EngineSpeed::Slow => "SLOW",
        }
    }

    /// Stable index used to derive per-engine RNG seeds
    pub const fn index(&self) -> u64 {
        match self {
            EngineSpeed::Fast => 0,
            EngineSpeed::Medium => 1,
            EngineSpeed::Slow => 2,
        }
    }

    /// Parse a speed name, case-insensitively
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "fast" => Some(Self::Fast),
            "medium" => Some(Self::Medium),
            "slow" => Some(Self::Slow),
            _ => None,
        }
    }
}

impl fmt::Display for EngineSpeed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One synthetic market event
///
/// Immutable once created. Fields are public for reading; nothing in the
/// pipeline mutates a tick after the generator hands it off.
#[derive(Debug, Clone, PartialEq)]
pub struct Tick {
    pub id: TickId,
    pub symbol: Symbol,
    /// Always strictly positive
    pub price: f64,
    pub side: Side,
    pub timestamp: Instant,
}

impl Tick {
    pub fn new(id: TickId, symbol: Symbol, price: f64, side: Side, timestamp: Instant) -> Self {
        Self {
            id,
            symbol,
            price,
            side,
            timestamp,
        }
    }

    #[inline(always)]
    pub fn lane(&self) -> Lane {
        Lane::for_side(self.side)
    }
}

impl fmt::Display for Tick {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {} @ {:.2}",
            self.id, self.side, self.symbol, self.price
        )
    }
}
