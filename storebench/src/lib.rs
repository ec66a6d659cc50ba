//! Throughput benchmarking and functional verification of object storage backends.
//!
//! A [`Driver`] issues workloads against any [`Backend`](storebench_backend::Backend): it writes
//! synthetic payloads from the [`PayloadGenerator`], reads them back and verifies them, and
//! enumerates group hierarchies through listing calls. Every operation is timed, and each run
//! yields a [`RunReport`] from which [`metrics::summarize`] derives throughput and latency.
#![warn(missing_docs)]
#![warn(missing_debug_implementations)]

pub mod checks;
pub mod cli;
pub mod config;
pub mod driver;
pub mod metrics;
pub mod observability;
pub mod payload;
pub mod report;
pub mod verify;
pub mod workload;

pub use crate::driver::{Driver, DriverConfig, RunError, RunReport, RunState, WriteOutcome};
pub use crate::payload::PayloadGenerator;
pub use crate::workload::{HierarchyLayout, HierarchySpec, Manifest, WorkloadSpec};
