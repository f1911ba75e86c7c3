//! Tick generation
//!
//! - `TickGenerator`: seeded, infinite iterator of synthetic ticks
//! - `TickSource`: async task pacing the generator into the splitter channel

pub mod generator;
pub mod source;

pub use generator::TickGenerator;
pub use source::{SourceSummary, TickSource};
