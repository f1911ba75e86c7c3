//! Recovery building blocks for supervised engines
//!
//! - Exponential backoff between relaunches
//! - Restart policy and per-engine budget
//! - Panic hook that logs instead of terminating

pub mod backoff;
pub mod panic;
pub mod restart;

pub use backoff::{BackoffConfig, ExponentialBackoff};
pub use panic::{install_panic_handler, panic_message};
pub use restart::{RestartBudget, RestartDecision, RestartPolicy};
