pub mod logger;
pub mod seed;

pub use logger::{init_logger, init_test_logger};
pub use seed::derive_seed;
