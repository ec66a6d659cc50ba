//! Storage backends that the benchmark driver issues operations against.
//!
//! Every backend implements the [`Backend`] capability interface: object
//! put/get/delete, namespace setup, prefix listing and direct-child
//! enumeration for hierarchical layouts. The driver never talks to a storage
//! client directly, so any S3-compatible service, a natively hierarchical
//! store, or the [`InMemoryBackend`] used in tests can be substituted.
//!
//! Hierarchies are mapped onto flat keys with the convention described in
//! [`path`].
#![warn(missing_docs)]
#![warn(missing_debug_implementations)]

mod backend;
mod error;
pub mod path;

pub use backend::{
    Backend, Capabilities, Children, InMemoryBackend, S3CompatibleBackend,
    S3CompatibleBackendConfig, SharedBackend,
};
pub use error::{BackendError, BackendResult, BoxError, ErrorKind};
