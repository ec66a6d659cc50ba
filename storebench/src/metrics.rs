//! Timing records of benchmark runs and the metrics derived from them.

use std::fmt;
use std::time::Duration;

use sketches_ddsketch::DDSketch;
use tokio::time::Instant;

/// The kind of operation a run issues.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum OpKind {
    /// `put` of synthetic payloads.
    Write,
    /// `get` with verification.
    Read,
    /// Listing of keys or group children.
    List,
    /// Removal of objects or groups.
    Delete,
}

impl OpKind {
    /// Verb used in progress checkpoints.
    pub fn verb(self) -> &'static str {
        match self {
            Self::Write => "Uploaded",
            Self::Read => "Downloaded",
            Self::List => "Listed",
            Self::Delete => "Deleted",
        }
    }
}

impl fmt::Display for OpKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Write => "write",
            Self::Read => "read",
            Self::List => "list",
            Self::Delete => "delete",
        };
        f.write_str(name)
    }
}

/// The raw record of a single run. Derived metrics are computed by [`summarize`].
pub struct RunRecord {
    /// What the run did.
    pub kind: OpKind,
    /// Number of objects the run was asked to process.
    pub object_count: u64,
    /// Declared size of each object.
    pub object_size: u64,
    /// Bytes moved by successful operations.
    pub total_bytes: u64,
    /// Number of successful operations.
    pub total_ops: u64,
    /// When the run started.
    pub started_at: Instant,
    /// When the run ended. Equal to `started_at` until [`finish`](Self::finish) is called.
    pub finished_at: Instant,
    /// Latency of each successful operation, in seconds.
    pub latency: DDSketch,
}

impl RunRecord {
    /// Starts a new record at the current instant.
    pub fn start(kind: OpKind, object_count: u64, object_size: u64) -> Self {
        let now = Instant::now();
        Self {
            kind,
            object_count,
            object_size,
            total_bytes: 0,
            total_ops: 0,
            started_at: now,
            finished_at: now,
            latency: DDSketch::default(),
        }
    }

    /// Adds one successful operation.
    pub fn record_op(&mut self, bytes: u64, latency: Duration) {
        self.total_ops += 1;
        self.total_bytes += bytes;
        self.latency.add(latency.as_secs_f64());
    }

    /// Stamps the end of the run.
    pub fn finish(&mut self) {
        self.finished_at = Instant::now();
    }

    /// Wall-clock time between start and end.
    pub fn elapsed(&self) -> Duration {
        self.finished_at.saturating_duration_since(self.started_at)
    }
}

impl fmt::Debug for RunRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RunRecord")
            .field("kind", &self.kind)
            .field("object_count", &self.object_count)
            .field("object_size", &self.object_size)
            .field("total_bytes", &self.total_bytes)
            .field("total_ops", &self.total_ops)
            .field("elapsed", &self.elapsed())
            .field("samples", &self.latency.count())
            .finish()
    }
}

/// Throughput of a run.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Throughput {
    /// Rates over the elapsed wall-clock time.
    Measured {
        /// Megabytes (10^6 bytes) per second.
        mb_per_sec: f64,
        /// Operations per second.
        ops_per_sec: f64,
    },
    /// The run finished below the resolution of the clock.
    Unmeasurable,
}

/// Latency distribution of successful operations.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Percentiles {
    /// Mean latency.
    pub avg: Duration,
    /// Median latency.
    pub p50: Duration,
    /// 90th percentile.
    pub p90: Duration,
    /// 99th percentile.
    pub p99: Duration,
}

impl Percentiles {
    /// Reads percentiles from a sketch of latencies in seconds. `None` if the sketch is empty.
    pub fn from_sketch(sketch: &DDSketch) -> Option<Self> {
        let count = sketch.count();
        if count == 0 {
            return None;
        }

        let quantile = |q| {
            let secs = sketch.quantile(q).ok().flatten().unwrap_or_default();
            Duration::from_secs_f64(secs.max(0.0))
        };
        let avg = sketch.sum().unwrap_or_default() / count as f64;

        Some(Self {
            avg: Duration::from_secs_f64(avg.max(0.0)),
            p50: quantile(0.5),
            p90: quantile(0.9),
            p99: quantile(0.99),
        })
    }
}

/// Metrics derived from a [`RunRecord`].
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Summary {
    /// Elapsed wall-clock time in seconds.
    pub elapsed_secs: f64,
    /// Bytes moved by successful operations.
    pub total_bytes: u64,
    /// Number of successful operations.
    pub total_ops: u64,
    /// Throughput, or [`Throughput::Unmeasurable`] for a zero elapsed time.
    pub throughput: Throughput,
    /// Latency percentiles, if any operation succeeded.
    pub latency: Option<Percentiles>,
}

/// Computes throughput and latency metrics of a run.
pub fn summarize(record: &RunRecord) -> Summary {
    let elapsed_secs = record.elapsed().as_secs_f64();

    let throughput = if elapsed_secs > 0.0 {
        Throughput::Measured {
            mb_per_sec: record.total_bytes as f64 / elapsed_secs / 1e6,
            ops_per_sec: record.total_ops as f64 / elapsed_secs,
        }
    } else {
        Throughput::Unmeasurable
    };

    Summary {
        elapsed_secs,
        total_bytes: record.total_bytes,
        total_ops: record.total_ops,
        throughput,
        latency: Percentiles::from_sketch(&record.latency),
    }
}
