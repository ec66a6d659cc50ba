//! In-memory backend for tests.
//!
//! This provides a [`Backend`] backed by a `HashMap` of namespaces, so the driver and verifier
//! can be exercised without a live server. The backend is [`Clone`], so tests can hold a handle
//! for direct inspection while the driver owns a shared copy.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use bytes::Bytes;

use super::common::{Backend, Capabilities};
use crate::error::{BackendError, BackendResult};
use crate::path;

type Namespace = BTreeMap<String, Bytes>;
type Store = HashMap<String, Namespace>;

/// A [`Backend`] that keeps all objects in process memory.
#[derive(Debug, Clone, Default)]
pub struct InMemoryBackend {
    store: Arc<Mutex<Store>>,
}

impl InMemoryBackend {
    /// Creates an empty backend without any namespaces.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Store> {
        self.store.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Returns a clone of the stored bytes, if present.
    pub fn get_stored(&self, namespace: &str, key: &str) -> Option<Bytes> {
        self.lock().get(namespace)?.get(key).cloned()
    }

    /// Returns `true` if the namespace contains an entry for the given key.
    pub fn contains(&self, namespace: &str, key: &str) -> bool {
        self.get_stored(namespace, key).is_some()
    }

    /// Returns the number of objects in the namespace, including group markers.
    pub fn len(&self, namespace: &str) -> usize {
        self.lock().get(namespace).map_or(0, BTreeMap::len)
    }

    /// Returns `true` if the namespace holds no objects.
    pub fn is_empty(&self, namespace: &str) -> bool {
        self.len(namespace) == 0
    }

    /// Stores bytes directly, bypassing the `Backend` trait.
    ///
    /// Creates the namespace if needed. Useful for simulating corrupted or foreign objects.
    pub fn insert_raw(&self, namespace: &str, key: &str, payload: impl Into<Bytes>) {
        self.lock()
            .entry(namespace.to_owned())
            .or_default()
            .insert(key.to_owned(), payload.into());
    }
}

#[async_trait::async_trait]
impl Backend for InMemoryBackend {
    fn name(&self) -> &'static str {
        "in-memory"
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            read_after_write: true,
            native_hierarchy: false,
        }
    }

    async fn ensure_namespace(&self, namespace: &str) -> BackendResult<()> {
        self.lock().entry(namespace.to_owned()).or_default();
        Ok(())
    }

    async fn put_object(&self, namespace: &str, key: &str, payload: Bytes) -> BackendResult<()> {
        let mut store = self.lock();
        let Some(objects) = store.get_mut(namespace) else {
            return Err(BackendError::write_failed(
                key,
                format!("namespace `{namespace}` does not exist"),
            ));
        };
        objects.insert(key.to_owned(), payload);
        Ok(())
    }

    async fn get_object(&self, namespace: &str, key: &str) -> BackendResult<Bytes> {
        self.get_stored(namespace, key)
            .ok_or_else(|| BackendError::not_found(key))
    }

    async fn list_keys(&self, namespace: &str, prefix: &str) -> BackendResult<Vec<String>> {
        let store = self.lock();
        let objects = store
            .get(namespace)
            .ok_or_else(|| BackendError::not_found(namespace))?;

        Ok(objects
            .range(prefix.to_owned()..)
            .take_while(|(key, _)| key.starts_with(prefix))
            .map(|(key, _)| key.clone())
            .collect())
    }

    async fn delete(&self, namespace: &str, key: &str) -> BackendResult<()> {
        let mut store = self.lock();
        let Some(objects) = store.get_mut(namespace) else {
            return Ok(());
        };

        let subtree = path::child_prefix(key);
        objects.retain(|existing, _| existing != key && !existing.starts_with(subtree.as_str()));
        Ok(())
    }

    async fn delete_object(&self, namespace: &str, key: &str) -> BackendResult<()> {
        if let Some(objects) = self.lock().get_mut(namespace) {
            objects.remove(key);
        }
        Ok(())
    }
}
