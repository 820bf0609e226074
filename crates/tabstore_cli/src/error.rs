//! CLI error type.

use tabstore_storage::StorageError;
use tabstore_tabular::TabularError;
use thiserror::Error;

/// Result type for CLI commands.
pub type CliResult<T> = Result<T, CliError>;

/// Errors reported by CLI commands.
#[derive(Error, Debug)]
pub enum CliError {
    /// A storage engine operation failed.
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// A table operation failed.
    #[error(transparent)]
    Tabular(#[from] TabularError),

    /// Local I/O failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Output could not be serialized.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The command cannot run with the selected engine.
    #[error("unsupported: {0}")]
    Unsupported(&'static str),
}
