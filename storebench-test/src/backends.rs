//! Backends wrapping another backend to make its behavior deterministic or faulty.

use std::collections::HashSet;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use bytes::Bytes;
use storebench_backend::{
    Backend, BackendError, BackendResult, Capabilities, Children, SharedBackend,
};

/// Delays every operation by a fixed latency before forwarding it.
///
/// Uses the tokio clock, so tests with a paused runtime advance time deterministically.
#[derive(Debug)]
pub struct SlowBackend {
    inner: SharedBackend,
    latency: Duration,
}

impl SlowBackend {
    /// Wraps `inner`, delaying each operation by `latency`.
    pub fn new(inner: SharedBackend, latency: Duration) -> Self {
        Self { inner, latency }
    }
}

#[async_trait::async_trait]
impl Backend for SlowBackend {
    fn name(&self) -> &'static str {
        "slow"
    }

    fn capabilities(&self) -> Capabilities {
        self.inner.capabilities()
    }

    async fn ensure_namespace(&self, namespace: &str) -> BackendResult<()> {
        self.inner.ensure_namespace(namespace).await
    }

    async fn put_object(&self, namespace: &str, key: &str, payload: Bytes) -> BackendResult<()> {
        tokio::time::sleep(self.latency).await;
        self.inner.put_object(namespace, key, payload).await
    }

    async fn get_object(&self, namespace: &str, key: &str) -> BackendResult<Bytes> {
        tokio::time::sleep(self.latency).await;
        self.inner.get_object(namespace, key).await
    }

    async fn list_keys(&self, namespace: &str, prefix: &str) -> BackendResult<Vec<String>> {
        tokio::time::sleep(self.latency).await;
        self.inner.list_keys(namespace, prefix).await
    }

    async fn list_children(&self, namespace: &str, group: &str) -> BackendResult<Children> {
        tokio::time::sleep(self.latency).await;
        self.inner.list_children(namespace, group).await
    }

    async fn delete(&self, namespace: &str, key: &str) -> BackendResult<()> {
        tokio::time::sleep(self.latency).await;
        self.inner.delete(namespace, key).await
    }

    async fn delete_object(&self, namespace: &str, key: &str) -> BackendResult<()> {
        tokio::time::sleep(self.latency).await;
        self.inner.delete_object(namespace, key).await
    }
}

/// Injects failures into an otherwise working backend.
#[derive(Debug)]
pub struct FaultyBackend {
    inner: SharedBackend,
    writes_left: Option<AtomicU64>,
    failing_reads: Mutex<HashSet<String>>,
    read_after_write: bool,
}

impl FaultyBackend {
    /// Wraps `inner` without injecting any failures yet.
    pub fn new(inner: SharedBackend) -> Self {
        let read_after_write = inner.capabilities().read_after_write;
        Self {
            inner,
            writes_left: None,
            failing_reads: Mutex::new(HashSet::new()),
            read_after_write,
        }
    }

    /// Lets `count` writes succeed and fails every write after that.
    pub fn fail_writes_after(mut self, count: u64) -> Self {
        self.writes_left = Some(AtomicU64::new(count));
        self
    }

    /// Fails every read of `key` in transport.
    pub fn fail_reads_of(self, key: impl Into<String>) -> Self {
        self.failing_reads
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(key.into());
        self
    }

    /// Reports the backend as eventually consistent.
    pub fn without_read_after_write(mut self) -> Self {
        self.read_after_write = false;
        self
    }

    fn take_write(&self) -> bool {
        match &self.writes_left {
            None => true,
            Some(left) => left
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok(),
        }
    }
}

#[async_trait::async_trait]
impl Backend for FaultyBackend {
    fn name(&self) -> &'static str {
        "faulty"
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            read_after_write: self.read_after_write,
            ..self.inner.capabilities()
        }
    }

    async fn ensure_namespace(&self, namespace: &str) -> BackendResult<()> {
        self.inner.ensure_namespace(namespace).await
    }

    async fn put_object(&self, namespace: &str, key: &str, payload: Bytes) -> BackendResult<()> {
        if !self.take_write() {
            return Err(BackendError::write_failed(key, "injected write failure"));
        }
        self.inner.put_object(namespace, key, payload).await
    }

    async fn get_object(&self, namespace: &str, key: &str) -> BackendResult<Bytes> {
        let failing = self
            .failing_reads
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .contains(key);
        if failing {
            return Err(BackendError::read_failed(key, "injected read failure"));
        }
        self.inner.get_object(namespace, key).await
    }

    async fn list_keys(&self, namespace: &str, prefix: &str) -> BackendResult<Vec<String>> {
        self.inner.list_keys(namespace, prefix).await
    }

    async fn list_children(&self, namespace: &str, group: &str) -> BackendResult<Children> {
        self.inner.list_children(namespace, group).await
    }

    async fn delete(&self, namespace: &str, key: &str) -> BackendResult<()> {
        self.inner.delete(namespace, key).await
    }

    async fn delete_object(&self, namespace: &str, key: &str) -> BackendResult<()> {
        self.inner.delete_object(namespace, key).await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use storebench_backend::InMemoryBackend;

    use super::*;

    async fn memory() -> SharedBackend {
        let backend = InMemoryBackend::new();
        backend.ensure_namespace("ns").await.unwrap();
        Arc::new(backend)
    }

    #[tokio::test]
    async fn fails_writes_after_budget() {
        let backend = FaultyBackend::new(memory().await).fail_writes_after(2);

        backend.put_object("ns", "a", "1".into()).await.unwrap();
        backend.put_object("ns", "b", "2".into()).await.unwrap();
        let err = backend.put_object("ns", "c", "3".into()).await.unwrap_err();
        assert!(matches!(err, BackendError::WriteFailed { .. }));
    }

    #[tokio::test]
    async fn fails_selected_reads() {
        let backend = FaultyBackend::new(memory().await).fail_reads_of("a");
        backend.put_object("ns", "a", "1".into()).await.unwrap();
        backend.put_object("ns", "b", "2".into()).await.unwrap();

        assert!(backend.get_object("ns", "a").await.is_err());
        assert_eq!(backend.get_object("ns", "b").await.unwrap(), "2");
    }

    #[tokio::test(start_paused = true)]
    async fn delays_operations() {
        let backend = SlowBackend::new(memory().await, Duration::from_millis(10));

        let start = tokio::time::Instant::now();
        backend.put_object("ns", "a", "1".into()).await.unwrap();
        backend.get_object("ns", "a").await.unwrap();
        assert_eq!(start.elapsed(), Duration::from_millis(20));
    }
}
