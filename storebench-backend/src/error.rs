use std::fmt;

use thiserror::Error;

/// A type-erased error used as the cause of a [`BackendError`].
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Result type for backend operations.
pub type BackendResult<T> = Result<T, BackendError>;

/// Errors returned by a [`Backend`](crate::Backend).
///
/// Backends never retry. Whatever the underlying client reports is classified into one of these
/// variants and handed to the caller unchanged.
#[derive(Debug, Error)]
pub enum BackendError {
    /// The storage service could not be reached during setup.
    #[error("backend unavailable: {context}")]
    Unavailable {
        context: String,
        #[source]
        cause: Option<BoxError>,
    },

    /// The storage service rejected our credentials.
    #[error("permission denied: {context}")]
    PermissionDenied {
        context: String,
        #[source]
        cause: Option<BoxError>,
    },

    /// A mutating operation (put or delete) failed in transport or on the server.
    #[error("write of `{key}` failed: {context}")]
    WriteFailed {
        key: String,
        context: String,
        #[source]
        cause: Option<BoxError>,
    },

    /// A reading operation (get or list) failed in transport or on the server.
    #[error("read of `{key}` failed: {context}")]
    ReadFailed {
        key: String,
        context: String,
        #[source]
        cause: Option<BoxError>,
    },

    /// The requested object or namespace does not exist.
    #[error("`{key}` not found")]
    NotFound { key: String },
}

impl BackendError {
    /// Creates a [`BackendError::Unavailable`] without a cause.
    pub fn unavailable(context: impl Into<String>) -> Self {
        Self::Unavailable {
            context: context.into(),
            cause: None,
        }
    }

    /// Creates a [`BackendError::PermissionDenied`] without a cause.
    pub fn permission_denied(context: impl Into<String>) -> Self {
        Self::PermissionDenied {
            context: context.into(),
            cause: None,
        }
    }

    /// Creates a [`BackendError::WriteFailed`] without a cause.
    pub fn write_failed(key: impl Into<String>, context: impl Into<String>) -> Self {
        Self::WriteFailed {
            key: key.into(),
            context: context.into(),
            cause: None,
        }
    }

    /// Creates a [`BackendError::ReadFailed`] without a cause.
    pub fn read_failed(key: impl Into<String>, context: impl Into<String>) -> Self {
        Self::ReadFailed {
            key: key.into(),
            context: context.into(),
            cause: None,
        }
    }

    /// Creates a [`BackendError::NotFound`].
    pub fn not_found(key: impl Into<String>) -> Self {
        Self::NotFound { key: key.into() }
    }

    /// Attaches the underlying error. Has no effect on [`BackendError::NotFound`].
    pub fn with_cause(mut self, err: impl Into<BoxError>) -> Self {
        match &mut self {
            Self::Unavailable { cause, .. }
            | Self::PermissionDenied { cause, .. }
            | Self::WriteFailed { cause, .. }
            | Self::ReadFailed { cause, .. } => *cause = Some(err.into()),
            Self::NotFound { .. } => {}
        }
        self
    }

    /// Returns the classification of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Unavailable { .. } => ErrorKind::BackendUnavailable,
            Self::PermissionDenied { .. } => ErrorKind::PermissionDenied,
            Self::WriteFailed { .. } => ErrorKind::WriteFailed,
            Self::ReadFailed { .. } => ErrorKind::ReadFailed,
            Self::NotFound { .. } => ErrorKind::NotFound,
        }
    }

    /// Returns `true` if this error is a [`BackendError::NotFound`].
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Returns `true` for errors that make any further operation pointless.
    pub fn is_setup_failure(&self) -> bool {
        matches!(self, Self::Unavailable { .. } | Self::PermissionDenied { .. })
    }
}

/// Fieldless classification of a [`BackendError`], used for counting and reporting.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum ErrorKind {
    /// See [`BackendError::Unavailable`].
    BackendUnavailable,
    /// See [`BackendError::PermissionDenied`].
    PermissionDenied,
    /// See [`BackendError::WriteFailed`].
    WriteFailed,
    /// See [`BackendError::ReadFailed`].
    ReadFailed,
    /// See [`BackendError::NotFound`].
    NotFound,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::BackendUnavailable => "BackendUnavailable",
            Self::PermissionDenied => "PermissionDenied",
            Self::WriteFailed => "WriteFailed",
            Self::ReadFailed => "ReadFailed",
            Self::NotFound => "NotFound",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use std::error::Error as _;
    use std::io;

    use super::*;

    #[test]
    fn cause_is_exposed_as_source() {
        let err = BackendError::write_failed("bench/00000.bin", "connection reset")
            .with_cause(io::Error::other("reset by peer"));

        assert_eq!(err.kind(), ErrorKind::WriteFailed);
        assert_eq!(err.source().unwrap().to_string(), "reset by peer");
        assert_eq!(
            err.to_string(),
            "write of `bench/00000.bin` failed: connection reset"
        );
    }

    #[test]
    fn not_found_ignores_cause() {
        let err = BackendError::not_found("missing").with_cause(io::Error::other("404"));
        assert!(err.is_not_found());
        assert!(err.source().is_none());
    }

    #[test]
    fn setup_failures() {
        assert!(BackendError::unavailable("connection refused").is_setup_failure());
        assert!(BackendError::permission_denied("403").is_setup_failure());
        assert!(!BackendError::read_failed("key", "timeout").is_setup_failure());
    }
}
