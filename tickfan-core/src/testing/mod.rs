//! Testing utilities for unit and integration tests
//!
//! Provides builders and assertions for:
//! - Ticks and deterministic scenario configurations
//! - Conservation and no-double-processing checks over run results

pub mod helpers;

pub use helpers::*;
