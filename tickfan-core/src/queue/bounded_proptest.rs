//! Property-based tests for the drop-oldest queue
//!
//! These tests use proptest to verify the overflow invariants across
//! randomized capacities and push/pop interleavings.
