//! Priority routing between the source and the broadcast stream
//!
//! - `PrioritySplitter`: BUY/SELL classification into drop-oldest lanes
//! - `FairArbiter`: starvation-free merge of both lanes onto the stream

pub mod arbiter;
pub mod splitter;

pub use arbiter::{ArbiterStats, FairArbiter};
pub use splitter::{PrioritySplitter, SplitterStats};
