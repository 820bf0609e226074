//! Error types for the tabular crate.

use tabstore_storage::StorageError;
use thiserror::Error;

/// Result type for tabular operations.
pub type TabularResult<T> = Result<T, TabularError>;

/// Errors that can occur while reading or writing tables.
#[derive(Error, Debug)]
pub enum TabularError {
    /// The storage engine reported an error.
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// The stored bytes do not form whole rows.
    #[error("corrupted table: {message}")]
    Corrupted {
        /// Description of the inconsistency.
        message: String,
    },

    /// A row does not have one value per column.
    #[error("number of values ({actual}) does not match number of columns ({expected})")]
    ColumnMismatch {
        /// The table's column count.
        expected: usize,
        /// The row's length.
        actual: usize,
    },

    /// A row range is out of bounds or empty.
    #[error("invalid row range {start}..{end} for table with {num_rows} rows")]
    InvalidRowRange {
        /// First row, inclusive.
        start: u64,
        /// Last row, exclusive.
        end: u64,
        /// Rows in the table.
        num_rows: u64,
    },

    /// The write stream was destroyed and accepts nothing more.
    #[error("write stream destroyed: {reason}")]
    StreamDestroyed {
        /// Why the stream was destroyed.
        reason: String,
    },

    /// The write stream was already ended.
    #[error("write stream has ended")]
    StreamEnded,
}

impl TabularError {
    /// Create a corruption error.
    pub fn corrupted(message: impl Into<String>) -> Self {
        Self::Corrupted {
            message: message.into(),
        }
    }

    /// Returns `true` if the underlying object does not exist.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Storage(e) if e.is_not_found())
    }
}
