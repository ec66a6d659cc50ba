use std::collections::BTreeSet;
use std::fmt::Debug;
use std::sync::Arc;

use bytes::Bytes;

use crate::error::BackendResult;
use crate::path;

/// A shared, type-erased [`Backend`] instance.
pub type SharedBackend = Arc<dyn Backend>;

/// Behavior a backend guarantees, used by the driver to qualify its findings.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Capabilities {
    /// A read issued after a completed write observes that write.
    ///
    /// When this is `false`, read-time verification failures may be false positives.
    pub read_after_write: bool,
    /// Direct children of a group are enumerated by the storage service itself, rather than
    /// derived from a flat prefix listing.
    pub native_hierarchy: bool,
}

/// Direct children of a group, as full paths.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Children {
    /// Paths of child groups, without trailing separator.
    pub groups: BTreeSet<String>,
    /// Keys of leaf objects directly inside the group.
    pub objects: BTreeSet<String>,
}

/// The capability interface of a storage target.
///
/// Implementations must not retry internally. Retries would hide latency from the caller and
/// corrupt its timing data.
#[async_trait::async_trait]
pub trait Backend: Debug + Send + Sync + 'static {
    /// The backend name, used for diagnostics.
    fn name(&self) -> &'static str;

    /// Consistency and hierarchy guarantees of this backend.
    fn capabilities(&self) -> Capabilities;

    /// Creates the namespace if it does not exist yet.
    async fn ensure_namespace(&self, namespace: &str) -> BackendResult<()>;

    /// Stores `payload` at `key`, replacing any previous value.
    async fn put_object(&self, namespace: &str, key: &str, payload: Bytes) -> BackendResult<()>;

    /// Retrieves the payload stored at `key`.
    ///
    /// Fails with [`NotFound`](crate::BackendError::NotFound) if the key does not exist.
    async fn get_object(&self, namespace: &str, key: &str) -> BackendResult<Bytes>;

    /// Lists every key starting with `prefix`, in no particular order.
    async fn list_keys(&self, namespace: &str, prefix: &str) -> BackendResult<Vec<String>>;

    /// Enumerates the direct children of `group`.
    ///
    /// The default implementation derives them from a flat [`list_keys`](Self::list_keys) of
    /// the group's prefix.
    async fn list_children(&self, namespace: &str, group: &str) -> BackendResult<Children> {
        let keys = self
            .list_keys(namespace, &path::child_prefix(group))
            .await?;
        Ok(path::direct_children(group, keys))
    }

    /// Removes the object at `key` along with everything below `key` as a group.
    ///
    /// Removing a key that does not exist is not an error.
    async fn delete(&self, namespace: &str, key: &str) -> BackendResult<()>;

    /// Removes only the object at `key`, leaving anything below it in place.
    ///
    /// Backends that can remove a single object without enumerating its subtree should
    /// override this. The default implementation falls back to [`delete`](Self::delete).
    async fn delete_object(&self, namespace: &str, key: &str) -> BackendResult<()> {
        self.delete(namespace, key).await
    }
}
