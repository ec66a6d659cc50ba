//! Test utilities for storebench.
//!
//! Provides backends that wrap another backend to inject latency or failures, and a logger for
//! tests. See the modules for all available utilities.

pub mod backends;
pub mod tracing;
