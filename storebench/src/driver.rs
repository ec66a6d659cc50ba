//! Executes workloads against a backend, times every operation and verifies the results.
//!
//! Operations are issued strictly one after another by default, so each latency sample belongs
//! to exactly one request. With a concurrency above one, up to that many operations are in
//! flight. Each of them measures its own latency, and samples are folded into the run record as
//! they complete.
//!
//! Every run goes through `Idle -> Running -> {Completed, Failed}`. Write, delete and listing
//! runs abort on the first backend error. Read runs count errors and verification failures and
//! keep going, but end up `Failed` if any occurred.

use std::collections::BTreeSet;
use std::future::Future;
use std::time::Duration;

use bytes::Bytes;
use futures::{StreamExt, future, stream};
use storebench_backend::{BackendError, BackendResult, SharedBackend, path};
use thiserror::Error;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::metrics::{OpKind, RunRecord, Summary, summarize};
use crate::payload::PayloadGenerator;
use crate::verify::{self, FindingKind, Findings, VerifyMode};
use crate::workload::{Expected, HierarchyLayout, HierarchySpec, Manifest, WorkloadSpec};

/// Default number of operations between two progress checkpoints.
pub const DEFAULT_CHECKPOINT_INTERVAL: u64 = 100;

/// Default upper bound for a single backend call.
pub const DEFAULT_OP_TIMEOUT: Duration = Duration::from_secs(60);

/// Settings of a [`Driver`].
#[derive(Clone, Debug)]
pub struct DriverConfig {
    /// Namespace (bucket) all operations go to.
    pub namespace: String,
    /// Maximum number of operations in flight.
    pub concurrency: usize,
    /// Number of operations between two progress checkpoints.
    pub checkpoint_interval: u64,
    /// Upper bound for a single backend call. Elapsing counts as a transport failure.
    pub op_timeout: Duration,
    /// How read-backs are compared with what was written.
    pub verify: VerifyMode,
}

impl DriverConfig {
    /// Sequential, content-verifying defaults for the given namespace.
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            concurrency: 1,
            checkpoint_interval: DEFAULT_CHECKPOINT_INTERVAL,
            op_timeout: DEFAULT_OP_TIMEOUT,
            verify: VerifyMode::Content,
        }
    }
}

/// Lifecycle of a single run.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum RunState {
    /// Not started yet.
    Idle,
    /// Issuing operations.
    Running,
    /// Every operation succeeded and every check passed.
    Completed,
    /// The run aborted, was cancelled, or found integrity failures.
    Failed,
}

/// Result of a run that was carried out to the end.
#[derive(Debug)]
pub struct RunReport {
    /// Raw timing record.
    pub record: RunRecord,
    /// Final state, either [`RunState::Completed`] or [`RunState::Failed`].
    pub state: RunState,
    /// Verification results and counted failures.
    pub findings: Findings,
    /// Number of keys a listing run enumerated.
    pub enumerated: Option<u64>,
}

impl RunReport {
    /// Derived throughput and latency metrics.
    pub fn summary(&self) -> Summary {
        summarize(&self.record)
    }

    /// Returns `true` if the run ended in [`RunState::Completed`].
    pub fn is_completed(&self) -> bool {
        self.state == RunState::Completed
    }
}

/// Result of a write run.
#[derive(Debug)]
pub struct WriteOutcome {
    /// Timing and state of the run.
    pub report: RunReport,
    /// What was written, for verifying a later read run.
    pub manifest: Manifest,
}

/// Errors that end a run early.
#[derive(Debug, Error)]
pub enum RunError {
    /// The namespace could not be prepared.
    #[error("setup failed: {0}")]
    Setup(#[source] BackendError),

    /// A backend error in a run that does not tolerate failures.
    #[error("{phase} aborted after {completed} operations: {source}")]
    Aborted {
        /// The kind of run that aborted.
        phase: OpKind,
        /// Operations that succeeded before the failure.
        completed: u64,
        /// The failure.
        #[source]
        source: BackendError,
    },

    /// The run was cancelled between two operations.
    #[error("{phase} cancelled after {completed} operations")]
    Cancelled {
        /// The kind of run that was cancelled.
        phase: OpKind,
        /// Operations that succeeded before cancellation.
        completed: u64,
    },

    /// The workload cannot be executed as specified.
    #[error("invalid workload: {0}")]
    InvalidWorkload(&'static str),
}

/// Issues workloads against a backend.
///
/// The backend's remote state is not owned by the driver: it persists across runs and
/// processes, and the driver assumes exclusive use of the namespace while a run is active.
#[derive(Debug)]
pub struct Driver {
    backend: SharedBackend,
    config: DriverConfig,
    cancel: CancellationToken,
}

impl Driver {
    /// Creates a driver for the given backend.
    pub fn new(backend: SharedBackend, mut config: DriverConfig) -> Self {
        config.concurrency = config.concurrency.max(1);
        config.checkpoint_interval = config.checkpoint_interval.max(1);
        Self {
            backend,
            config,
            cancel: CancellationToken::new(),
        }
    }

    /// Uses `token` to stop runs between operations.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// The effective configuration.
    pub fn config(&self) -> &DriverConfig {
        &self.config
    }

    /// The backend operations are issued against.
    pub fn backend(&self) -> &SharedBackend {
        &self.backend
    }

    /// Creates the namespace if needed. Failures here are fatal for every subsequent run.
    pub async fn prepare(&self) -> Result<(), RunError> {
        let namespace = &self.config.namespace;
        tracing::info!(
            backend = self.backend.name(),
            namespace = %namespace,
            capabilities = ?self.backend.capabilities(),
            "Preparing namespace"
        );

        match tokio::time::timeout(
            self.config.op_timeout,
            self.backend.ensure_namespace(namespace),
        )
        .await
        {
            Ok(result) => result.map_err(RunError::Setup),
            Err(_) => Err(RunError::Setup(BackendError::unavailable(format!(
                "preparing `{namespace}` timed out after {:?}",
                self.config.op_timeout
            )))),
        }
    }

    /// Writes `object_count` fresh payloads. Aborts on the first failure.
    pub async fn run_write(&self, spec: &WorkloadSpec) -> Result<WriteOutcome, RunError> {
        validate_size(spec.object_size)?;
        let mut run = self.start(OpKind::Write, spec.object_count, spec.object_size);
        let mut generator = PayloadGenerator::new();
        let mut manifest = Manifest::default();

        let mut ops = stream::iter(spec.keys())
            .take_while(|_| future::ready(!self.cancel.is_cancelled()))
            .map(|key| {
                let payload = generator.generate(spec.object_size);
                async move {
                    let start = Instant::now();
                    let put = self.backend.put_object(
                        &self.config.namespace,
                        &key,
                        payload.clone(),
                    );
                    let result = self.call(OpKind::Write, &key, put).await;
                    Completion {
                        elapsed: start.elapsed(),
                        result: result.map(|()| payload),
                        key,
                    }
                }
            })
            .buffer_unordered(self.config.concurrency);

        while let Some(done) = ops.next().await {
            match done.result {
                Ok(payload) => {
                    run.record.record_op(payload.len() as u64, done.elapsed);
                    manifest.record(done.key, payload, self.config.verify);
                }
                Err(err) => return Err(run.abort(err)),
            }
            run.progress.advance(1);
        }

        if run.progress.is_short() {
            return Err(run.cancel());
        }
        Ok(WriteOutcome {
            report: run.finish(Findings::default(), None),
            manifest,
        })
    }

    /// Reads back `object_count` objects and verifies each of them.
    ///
    /// Objects recorded with their payload in `manifest` are compared byte for byte. All others
    /// are checked against the recorded or declared size. Failed reads and mismatches are
    /// counted without stopping the run.
    pub async fn run_read(
        &self,
        spec: &WorkloadSpec,
        manifest: Option<&Manifest>,
    ) -> Result<RunReport, RunError> {
        if !self.backend.capabilities().read_after_write {
            tracing::warn!(
                backend = self.backend.name(),
                "Backend does not guarantee read-after-write consistency, \
                 verification failures may be false positives"
            );
        }

        let mut run = self.start(OpKind::Read, spec.object_count, spec.object_size);
        let mut findings = Findings::default();

        let mut ops = stream::iter(spec.keys())
            .take_while(|_| future::ready(!self.cancel.is_cancelled()))
            .map(|key| async move {
                let start = Instant::now();
                let get = self.backend.get_object(&self.config.namespace, &key);
                let result = self.call(OpKind::Read, &key, get).await;
                Completion {
                    elapsed: start.elapsed(),
                    result,
                    key,
                }
            })
            .buffer_unordered(self.config.concurrency);

        while let Some(done) = ops.next().await {
            match done.result {
                Ok(payload) => {
                    run.record.record_op(payload.len() as u64, done.elapsed);
                    let outcome = match manifest.and_then(|m| m.get(&done.key)) {
                        Some(Expected::Payload(written)) => {
                            verify::verify_round_trip(written, &payload)
                        }
                        Some(Expected::Size(size)) => verify::verify_size(*size, &payload),
                        None => verify::verify_size(spec.object_size, &payload),
                    };
                    findings.round_trip(&done.key, outcome);
                }
                Err(err) => {
                    tracing::debug!(key = %done.key, error = %err, "Read failed");
                    findings.read_error(&done.key, &err);
                }
            }
            run.progress.advance(1);
        }

        if run.progress.is_short() {
            return Err(run.cancel());
        }
        Ok(run.finish(findings, None))
    }

    /// Lists the workload's prefix once and compares the result with its keys.
    pub async fn run_list(&self, spec: &WorkloadSpec) -> Result<RunReport, RunError> {
        let mut run = self.start(OpKind::List, spec.object_count, 0);
        let prefix = spec.pattern.list_prefix();

        let start = Instant::now();
        let list = self.backend.list_keys(&self.config.namespace, &prefix);
        let keys = match self.call(OpKind::List, &prefix, list).await {
            Ok(keys) => keys,
            Err(err) => return Err(run.abort(err)),
        };
        run.record.record_op(0, start.elapsed());

        let listed: BTreeSet<String> = keys.into_iter().collect();
        run.progress.advance(listed.len() as u64);

        let expected: BTreeSet<String> = spec.keys().collect();
        let mut findings = Findings::default();
        findings.listing(verify::verify_listing(&expected, &listed));

        Ok(run.finish(findings, Some(listed.len() as u64)))
    }

    /// Deletes the objects of a workload. Aborts on the first failure.
    pub async fn run_delete(&self, spec: &WorkloadSpec) -> Result<RunReport, RunError> {
        self.delete_keys(spec.keys().collect(), spec.object_size)
            .await
    }

    /// Deletes every key below `prefix`. Aborts on the first failure.
    pub async fn run_cleanup(&self, prefix: &str) -> Result<RunReport, RunError> {
        let prefix = path::child_prefix(prefix);
        let list = self.backend.list_keys(&self.config.namespace, &prefix);
        let keys = match self.call(OpKind::List, &prefix, list).await {
            Ok(keys) => keys,
            Err(err) if err.is_not_found() => Vec::new(),
            Err(source) => {
                return Err(RunError::Aborted {
                    phase: OpKind::List,
                    completed: 0,
                    source,
                });
            }
        };

        self.delete_keys(keys, 0).await
    }

    async fn delete_keys(&self, keys: Vec<String>, object_size: u64) -> Result<RunReport, RunError> {
        let mut run = self.start(OpKind::Delete, keys.len() as u64, object_size);

        let mut ops = stream::iter(keys)
            .take_while(|_| future::ready(!self.cancel.is_cancelled()))
            .map(|key| async move {
                let start = Instant::now();
                let delete = self.backend.delete_object(&self.config.namespace, &key);
                let result = self.call(OpKind::Delete, &key, delete).await;
                Completion {
                    elapsed: start.elapsed(),
                    result,
                    key,
                }
            })
            .buffer_unordered(self.config.concurrency);

        while let Some(done) = ops.next().await {
            match done.result {
                Ok(()) => run.record.record_op(0, done.elapsed),
                Err(err) => return Err(run.abort(err)),
            }
            run.progress.advance(1);
        }

        if run.progress.is_short() {
            return Err(run.cancel());
        }
        Ok(run.finish(Findings::default(), None))
    }

    /// Builds the hierarchy described by `spec`, replacing any existing leaf subtree.
    ///
    /// Groups are created before their children. Every leaf is deleted, including anything
    /// below it, and then written anew, so a rerun never merges with stale content. Leaves
    /// are written one after another regardless of the configured concurrency. Only leaf
    /// writes are counted as operations; group markers add to the elapsed time. A leaf's latency
    /// sample covers its subtree removal, which on S3 includes a listing of the leaf's prefix.
    pub async fn run_hierarchy_populate(
        &self,
        spec: &HierarchySpec,
    ) -> Result<(RunReport, HierarchyLayout), RunError> {
        validate_size(spec.leaf_size)?;
        let mut run = self.start(OpKind::Write, spec.expected_leaves(), spec.leaf_size);
        let mut generator = PayloadGenerator::new();
        if self.cancel.is_cancelled() {
            return Err(run.cancel());
        }

        if let Err(err) = self.create_group(&spec.root).await {
            return Err(run.abort(err));
        }

        for top in spec.top_group_paths() {
            if self.cancel.is_cancelled() {
                return Err(run.cancel());
            }
            if let Err(err) = self.create_group(&top).await {
                return Err(run.abort(err));
            }

            for sub in spec.sub_group_paths(&top) {
                if self.cancel.is_cancelled() {
                    return Err(run.cancel());
                }
                if let Err(err) = self.create_group(&sub).await {
                    return Err(run.abort(err));
                }

                for leaf in spec.leaf_keys(&sub) {
                    if self.cancel.is_cancelled() {
                        return Err(run.cancel());
                    }
                    let payload = generator.generate(spec.leaf_size);
                    let start = Instant::now();
                    if let Err(err) = self.overwrite(&leaf, payload).await {
                        return Err(run.abort(err));
                    }
                    run.record.record_op(spec.leaf_size, start.elapsed());
                    run.progress.advance(1);
                }
            }
        }

        let report = run.finish(Findings::default(), None);
        Ok((report, HierarchyLayout::from_spec(spec)))
    }

    /// Walks the hierarchy from its root and compares the enumerated leaves with `layout`.
    ///
    /// Every group is enumerated through its direct children, and every listing call counts as
    /// one operation. The run completes only if exactly the expected leaves are found.
    pub async fn run_hierarchy_list(&self, layout: &HierarchyLayout) -> Result<RunReport, RunError> {
        let mut run = self.start(OpKind::List, layout.expected_count(), 0);
        let mut found = BTreeSet::new();
        let mut pending = vec![layout.root().to_owned()];

        while let Some(group) = pending.pop() {
            if self.cancel.is_cancelled() {
                return Err(run.cancel());
            }
            let start = Instant::now();
            let list = self
                .backend
                .list_children(&self.config.namespace, &group);
            let children = match self.call(OpKind::List, &group, list).await {
                Ok(children) => children,
                Err(err) => return Err(run.abort(err)),
            };
            run.record.record_op(0, start.elapsed());
            run.progress.advance(children.objects.len() as u64);

            found.extend(children.objects);
            pending.extend(children.groups);
        }

        let enumerated = found.len() as u64;
        let mut findings = Findings::default();
        if enumerated != layout.expected_count() {
            findings.fail(
                FindingKind::LeafCount,
                layout.root(),
                format!(
                    "expected {} leaves, enumerated {enumerated}",
                    layout.expected_count()
                ),
            );
        }
        findings.listing(verify::verify_listing(layout.leaves(), &found));

        Ok(run.finish(findings, Some(enumerated)))
    }

    /// Downloads the first leaf of `layout` once and checks that it holds `leaf_size` bytes.
    ///
    /// An empty layout completes without issuing any operation.
    pub async fn run_sample_read(
        &self,
        layout: &HierarchyLayout,
        leaf_size: u64,
    ) -> Result<RunReport, RunError> {
        let sample = layout.leaves().first();
        let mut run = self.start(OpKind::Read, u64::from(sample.is_some()), leaf_size);
        let mut findings = Findings::default();

        if let Some(key) = sample {
            if self.cancel.is_cancelled() {
                return Err(run.cancel());
            }
            let start = Instant::now();
            let get = self.backend.get_object(&self.config.namespace, key);
            match self.call(OpKind::Read, key, get).await {
                Ok(payload) => {
                    run.record.record_op(payload.len() as u64, start.elapsed());
                    findings.round_trip(key, verify::verify_size(leaf_size, &payload));
                }
                Err(err) => findings.read_error(key, &err),
            }
            run.progress.advance(1);
        }

        Ok(run.finish(findings, None))
    }

    /// Removes a group and everything below it.
    pub async fn delete_group(&self, group: &str) -> Result<(), RunError> {
        let delete = self.backend.delete(&self.config.namespace, group);
        self.call(OpKind::Delete, group, delete)
            .await
            .map_err(|source| RunError::Aborted {
                phase: OpKind::Delete,
                completed: 0,
                source,
            })
    }

    /// Awaits a backend call, turning an elapsed timeout into a transport failure.
    pub(crate) async fn call<T>(
        &self,
        kind: OpKind,
        key: &str,
        op: impl Future<Output = BackendResult<T>>,
    ) -> BackendResult<T> {
        match tokio::time::timeout(self.config.op_timeout, op).await {
            Ok(result) => result,
            Err(_) => {
                let context = format!("timed out after {:?}", self.config.op_timeout);
                Err(match kind {
                    OpKind::Read | OpKind::List => BackendError::read_failed(key, context),
                    OpKind::Write | OpKind::Delete => BackendError::write_failed(key, context),
                })
            }
        }
    }

    async fn create_group(&self, group: &str) -> BackendResult<()> {
        let marker = path::group_marker(group);
        let put = self
            .backend
            .put_object(&self.config.namespace, &marker, Bytes::new());
        self.call(OpKind::Write, &marker, put).await
    }

    async fn overwrite(&self, key: &str, payload: Bytes) -> BackendResult<()> {
        let namespace = &self.config.namespace;
        let delete = self.backend.delete(namespace, key);
        self.call(OpKind::Delete, key, delete).await?;
        let put = self.backend.put_object(namespace, key, payload);
        self.call(OpKind::Write, key, put).await
    }

    fn start(&self, kind: OpKind, object_count: u64, object_size: u64) -> Run {
        let mut run = Run {
            record: RunRecord::start(kind, object_count, object_size),
            state: RunState::Idle,
            progress: Progress {
                kind,
                total: object_count,
                interval: self.config.checkpoint_interval,
                done: 0,
            },
        };
        run.transition(RunState::Running);
        run
    }
}

/// A finished operation, carrying its own latency sample.
struct Completion<T> {
    key: String,
    elapsed: Duration,
    result: BackendResult<T>,
}

/// Bookkeeping of an active run.
struct Run {
    record: RunRecord,
    state: RunState,
    progress: Progress,
}

impl Run {
    fn transition(&mut self, state: RunState) {
        tracing::debug!(kind = %self.record.kind, from = ?self.state, to = ?state, "Run state changed");
        self.state = state;
    }

    fn finish(mut self, findings: Findings, enumerated: Option<u64>) -> RunReport {
        self.record.finish();
        let state = if findings.is_clean() {
            RunState::Completed
        } else {
            RunState::Failed
        };
        self.transition(state);

        RunReport {
            record: self.record,
            state: self.state,
            findings,
            enumerated,
        }
    }

    fn abort(mut self, source: BackendError) -> RunError {
        self.record.finish();
        self.transition(RunState::Failed);
        tracing::error!(kind = %self.record.kind, error = %source, "Run aborted");

        RunError::Aborted {
            phase: self.record.kind,
            completed: self.record.total_ops,
            source,
        }
    }

    fn cancel(mut self) -> RunError {
        self.record.finish();
        self.transition(RunState::Failed);
        tracing::warn!(kind = %self.record.kind, "Run cancelled");

        RunError::Cancelled {
            phase: self.record.kind,
            completed: self.record.total_ops,
        }
    }
}

/// Emits a checkpoint every `interval` processed objects.
///
/// An advance that crosses several interval boundaries at once emits a single checkpoint.
struct Progress {
    kind: OpKind,
    total: u64,
    interval: u64,
    done: u64,
}

impl Progress {
    /// Counts `n` more processed objects. Returns `true` if a checkpoint was emitted.
    fn advance(&mut self, n: u64) -> bool {
        let before = self.done / self.interval;
        self.done += n;
        if self.done / self.interval == before {
            return false;
        }

        println!("  {} {}/{} objects", self.kind.verb(), self.done, self.total);
        tracing::debug!(kind = %self.kind, done = self.done, total = self.total, "Checkpoint");
        true
    }

    /// Returns `true` if fewer objects were processed than planned.
    fn is_short(&self) -> bool {
        self.done < self.total
    }
}

fn validate_size(size: u64) -> Result<(), RunError> {
    if size == 0 {
        return Err(RunError::InvalidWorkload("object size must be positive"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use storebench_backend::InMemoryBackend;

    use super::*;

    const NS: &str = "bench";

    async fn driver() -> (InMemoryBackend, Driver) {
        let backend = InMemoryBackend::new();
        let driver = Driver::new(Arc::new(backend.clone()), DriverConfig::new(NS));
        driver.prepare().await.unwrap();
        (backend, driver)
    }

    #[tokio::test]
    async fn writes_and_reads_back() {
        let (backend, driver) = driver().await;
        let spec = WorkloadSpec::new("bench", 64, 5);

        let written = driver.run_write(&spec).await.unwrap();
        assert!(written.report.is_completed());
        assert_eq!(written.report.record.total_ops, 5);
        assert_eq!(written.report.record.total_bytes, 320);
        assert_eq!(written.manifest.len(), 5);
        assert_eq!(backend.len(NS), 5);

        let read = driver
            .run_read(&spec, Some(&written.manifest))
            .await
            .unwrap();
        assert!(read.is_completed());
        assert_eq!(read.findings.passed(), 5);
    }

    #[tokio::test]
    async fn detects_corrupted_content() {
        let (backend, driver) = driver().await;
        let spec = WorkloadSpec::new("bench", 16, 3);
        let written = driver.run_write(&spec).await.unwrap();

        backend.insert_raw(NS, &spec.pattern.key(1), vec![0u8; 16]);
        let read = driver
            .run_read(&spec, Some(&written.manifest))
            .await
            .unwrap();

        assert_eq!(read.state, RunState::Failed);
        assert_eq!(read.findings.count(FindingKind::ContentMismatch), 1);
        assert_eq!(read.findings.passed(), 2);
        // throughput is still reported for every object that came back
        assert_eq!(read.record.total_ops, 3);
    }

    #[tokio::test]
    async fn size_mode_only_checks_length() {
        let backend = InMemoryBackend::new();
        let config = DriverConfig {
            verify: VerifyMode::Size,
            ..DriverConfig::new(NS)
        };
        let driver = Driver::new(Arc::new(backend.clone()), config);
        driver.prepare().await.unwrap();

        let spec = WorkloadSpec::new("bench", 16, 2);
        let written = driver.run_write(&spec).await.unwrap();
        assert_eq!(
            written.manifest.get(&spec.pattern.key(0)),
            Some(&Expected::Size(16))
        );

        backend.insert_raw(NS, &spec.pattern.key(0), vec![0u8; 16]);
        backend.insert_raw(NS, &spec.pattern.key(1), vec![0u8; 15]);
        let read = driver
            .run_read(&spec, Some(&written.manifest))
            .await
            .unwrap();

        assert_eq!(read.findings.count(FindingKind::ContentMismatch), 0);
        assert_eq!(read.findings.count(FindingKind::SizeMismatch), 1);
    }

    #[tokio::test]
    async fn missing_objects_are_counted() {
        let (_backend, driver) = driver().await;
        let spec = WorkloadSpec::new("never-written", 8, 4);

        let read = driver.run_read(&spec, None).await.unwrap();
        assert_eq!(read.state, RunState::Failed);
        assert_eq!(read.findings.count(FindingKind::NotFound), 4);
        assert_eq!(read.record.total_ops, 0);
    }

    #[tokio::test]
    async fn rejects_empty_payloads() {
        let (_backend, driver) = driver().await;
        let err = driver
            .run_write(&WorkloadSpec::new("bench", 0, 1))
            .await
            .unwrap_err();
        assert!(matches!(err, RunError::InvalidWorkload(_)));
    }

    #[tokio::test]
    async fn zero_objects_complete() {
        let (_backend, driver) = driver().await;
        let spec = WorkloadSpec::new("bench", 8, 0);

        let written = driver.run_write(&spec).await.unwrap();
        assert!(written.report.is_completed());
        let read = driver.run_read(&spec, Some(&written.manifest)).await.unwrap();
        assert!(read.is_completed());
        assert_eq!(read.record.total_ops, 0);
    }

    #[tokio::test]
    async fn lists_and_deletes_workload() {
        let (backend, driver) = driver().await;
        let spec = WorkloadSpec::new("bench", 8, 12);
        driver.run_write(&spec).await.unwrap();
        backend.insert_raw(NS, "bench/stray.bin", "x");

        let listed = driver.run_list(&spec).await.unwrap();
        assert_eq!(listed.state, RunState::Failed);
        assert_eq!(listed.enumerated, Some(13));
        assert_eq!(listed.findings.count(FindingKind::Unexpected), 1);

        let deleted = driver.run_delete(&spec).await.unwrap();
        assert!(deleted.is_completed());
        assert_eq!(deleted.record.total_ops, 12);
        assert_eq!(backend.len(NS), 1);

        let cleaned = driver.run_cleanup("bench").await.unwrap();
        assert_eq!(cleaned.record.total_ops, 1);
        assert!(backend.is_empty(NS));
    }

    #[tokio::test]
    async fn concurrent_runs_record_every_operation() {
        let backend = InMemoryBackend::new();
        let config = DriverConfig {
            concurrency: 8,
            ..DriverConfig::new(NS)
        };
        let driver = Driver::new(Arc::new(backend.clone()), config);
        driver.prepare().await.unwrap();

        let spec = WorkloadSpec::new("bench", 32, 50);
        let written = driver.run_write(&spec).await.unwrap();
        let read = driver
            .run_read(&spec, Some(&written.manifest))
            .await
            .unwrap();

        assert_eq!(written.report.record.latency.count(), 50);
        assert_eq!(read.findings.passed(), 50);
        assert!(read.is_completed());
    }

    #[tokio::test]
    async fn cancelled_run_fails() {
        let (backend, driver) = driver().await;
        let token = CancellationToken::new();
        let driver = driver.with_cancellation(token.clone());
        token.cancel();

        let err = driver
            .run_write(&WorkloadSpec::new("bench", 8, 10))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            RunError::Cancelled {
                phase: OpKind::Write,
                completed: 0
            }
        ));
        assert!(backend.is_empty(NS));
    }

    #[tokio::test]
    async fn cancelled_runs_issue_nothing() {
        let backend = InMemoryBackend::new();
        let config = DriverConfig {
            concurrency: 4,
            ..DriverConfig::new(NS)
        };
        let token = CancellationToken::new();
        let driver = Driver::new(Arc::new(backend.clone()), config).with_cancellation(token.clone());
        driver.prepare().await.unwrap();

        let spec = WorkloadSpec::new("bench", 8, 10);
        backend.insert_raw(NS, &spec.pattern.key(0), vec![0u8; 8]);
        token.cancel();

        let err = driver.run_write(&spec).await.unwrap_err();
        assert!(matches!(err, RunError::Cancelled { completed: 0, .. }));
        assert_eq!(backend.len(NS), 1);

        let err = driver.run_read(&spec, None).await.unwrap_err();
        assert!(matches!(err, RunError::Cancelled { phase: OpKind::Read, completed: 0 }));

        let err = driver.run_delete(&spec).await.unwrap_err();
        assert!(matches!(err, RunError::Cancelled { phase: OpKind::Delete, completed: 0 }));
        assert_eq!(backend.len(NS), 1);

        let hierarchy = HierarchySpec {
            root: "tree".into(),
            top_groups: 1,
            sub_groups: 1,
            leaves: 1,
            leaf_size: 8,
        };
        let err = driver.run_hierarchy_populate(&hierarchy).await.unwrap_err();
        assert!(matches!(err, RunError::Cancelled { completed: 0, .. }));
        assert!(!backend.contains(NS, "tree/.group"));
    }

    #[tokio::test]
    async fn deletes_only_the_workload_objects() {
        let (backend, driver) = driver().await;
        let spec = WorkloadSpec::new("bench", 8, 2);
        driver.run_write(&spec).await.unwrap();
        let nested = format!("{}/nested", spec.pattern.key(0));
        backend.insert_raw(NS, &nested, "x");

        let deleted = driver.run_delete(&spec).await.unwrap();
        assert_eq!(deleted.record.total_ops, 2);
        assert!(!backend.contains(NS, &spec.pattern.key(0)));
        assert!(backend.contains(NS, &nested));
    }

    fn progress(interval: u64) -> Progress {
        Progress {
            kind: OpKind::Write,
            total: 10,
            interval,
            done: 0,
        }
    }

    #[test]
    fn checkpoints_every_interval() {
        let mut progress = progress(3);
        let fired: Vec<u64> = (1..=10).filter(|_| progress.advance(1)).collect();
        assert_eq!(fired, [3, 6, 9]);
        assert!(!progress.is_short());
    }

    #[test]
    fn bulk_advances_emit_one_checkpoint() {
        let mut progress = progress(3);
        assert!(!progress.advance(2));
        // crosses 3 and 6 at once
        assert!(progress.advance(5));
        assert!(!progress.advance(1));
        assert!(progress.advance(1));
        assert!(progress.is_short());
        assert_eq!(progress.done, 9);
    }

    #[tokio::test]
    async fn populates_and_lists_hierarchy() {
        let (backend, driver) = driver().await;
        let spec = HierarchySpec {
            root: "tree".into(),
            top_groups: 2,
            sub_groups: 3,
            leaves: 4,
            leaf_size: 8,
        };

        let (populated, layout) = driver.run_hierarchy_populate(&spec).await.unwrap();
        assert!(populated.is_completed());
        assert_eq!(populated.record.total_ops, 24);
        assert!(backend.contains(NS, "tree/.group"));
        assert!(backend.contains(NS, "tree/group_01/subgroup_02/.group"));

        let listed = driver.run_hierarchy_list(&layout).await.unwrap();
        assert!(listed.is_completed());
        assert_eq!(listed.enumerated, Some(24));
        // root + 2 top-level groups + 6 subgroups
        assert_eq!(listed.record.total_ops, 9);
    }

    #[tokio::test]
    async fn repopulating_replaces_leaf_subtrees() {
        let (backend, driver) = driver().await;
        let spec = HierarchySpec {
            root: "tree".into(),
            top_groups: 1,
            sub_groups: 1,
            leaves: 1,
            leaf_size: 8,
        };
        backend.insert_raw(NS, "tree/group_00/subgroup_00/array_00/c/0", "stale chunk");

        let (_, layout) = driver.run_hierarchy_populate(&spec).await.unwrap();

        assert!(!backend.contains(NS, "tree/group_00/subgroup_00/array_00/c/0"));
        let listed = driver.run_hierarchy_list(&layout).await.unwrap();
        assert!(listed.is_completed());
    }
}
