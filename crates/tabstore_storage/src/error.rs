//! Error types for storage operations.

use std::io;
use thiserror::Error;

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Boxed error produced by a remote backend client.
pub type BackendSource = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors that can occur during storage operations.
///
/// Every backend translates its own error shapes (OS `ENOENT`, HTTP 404,
/// a missing R2 object) into [`StorageError::NotFound`]. Everything else is
/// passed through as an opaque I/O or backend failure.
#[derive(Debug, Error)]
pub enum StorageError {
    /// The target object or file does not exist.
    #[error("file not found: {path}")]
    NotFound {
        /// The path or key that was requested.
        path: String,
    },

    /// A local I/O error occurred.
    #[error("I/O error on {path}: {source}")]
    Io {
        /// The path being accessed.
        path: String,
        /// The underlying error.
        #[source]
        source: io::Error,
    },

    /// A remote backend reported a failure.
    #[error("{operation} failed: {source}")]
    Backend {
        /// The backend call that failed (e.g. `GetObject`).
        operation: &'static str,
        /// The error reported by the backend client.
        #[source]
        source: BackendSource,
    },

    /// The caller passed an argument the engine cannot honour.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The stream was already closed or its consumer has gone away.
    #[error("stream is closed")]
    StreamClosed,

    /// The write was aborted before it completed.
    #[error("write aborted: {0}")]
    Aborted(String),

    /// Stored data is inconsistent.
    #[error("storage corrupted: {0}")]
    Corrupted(String),
}

impl StorageError {
    /// Creates a not-found error for the given path.
    pub fn not_found(path: impl Into<String>) -> Self {
        Self::NotFound { path: path.into() }
    }

    /// Maps an OS error onto the shared taxonomy.
    ///
    /// `ErrorKind::NotFound` becomes [`StorageError::NotFound`], everything
    /// else is kept as [`StorageError::Io`].
    pub fn from_io(source: io::Error, path: impl Into<String>) -> Self {
        let path = path.into();
        if source.kind() == io::ErrorKind::NotFound {
            Self::NotFound { path }
        } else {
            Self::Io { path, source }
        }
    }

    /// Wraps a backend client error.
    pub fn backend<E>(operation: &'static str, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Backend {
            operation,
            source: Box::new(source),
        }
    }

    /// Returns `true` if the error reports a missing target.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}
