//! Streaming row writer.

use crate::encoder::encode_row;
use crate::error::{TabularError, TabularResult};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tabstore_storage::ByteSink;
use tracing::{debug, warn};

/// Lifecycle of a [`TableWriter`].
///
/// ```text
/// Accepting ──end()──> Ending ──done()──> Completed
///     │                   │
///     └──── mismatch / backend failure / abort ────> Failed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriterState {
    /// Rows are accepted.
    Accepting,
    /// No more rows; waiting for storage to confirm.
    Ending,
    /// Every row is durable.
    Completed,
    /// The stream was destroyed.
    Failed,
}

/// Appends rows to a table through a storage write stream.
///
/// Rows are validated against the column count before they are encoded. A
/// row of the wrong length is handled in one of two ways, chosen per call:
///
/// - [`TableWriter::write_row`] destroys the stream and returns the error
/// - [`TableWriter::write_row_with`] hands the error to a callback and keeps
///   the stream open
///
/// The table's row counter is shared with the writer and grows as soon as a
/// row is accepted, before its bytes reach storage. Durability is only
/// confirmed by [`TableWriter::done`].
pub struct TableWriter {
    sink: Option<ByteSink>,
    path: String,
    num_columns: usize,
    num_rows: Arc<AtomicU64>,
    state: WriterState,
    failure: Option<String>,
}

impl TableWriter {
    pub(crate) fn new(sink: ByteSink, num_columns: usize, num_rows: Arc<AtomicU64>) -> Self {
        Self {
            path: sink.path().to_string(),
            sink: Some(sink),
            num_columns,
            num_rows,
            state: WriterState::Accepting,
            failure: None,
        }
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> WriterState {
        self.state
    }

    /// Returns `true` while rows are accepted.
    #[must_use]
    pub fn is_writable(&self) -> bool {
        self.state == WriterState::Accepting
    }

    /// Path of the table being written.
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Column count rows are validated against.
    #[must_use]
    pub fn num_columns(&self) -> usize {
        self.num_columns
    }

    /// Rows accepted by the table so far, including ones still in flight.
    #[must_use]
    pub fn num_rows(&self) -> u64 {
        self.num_rows.load(Ordering::SeqCst)
    }

    /// Writes one row.
    ///
    /// # Errors
    ///
    /// - [`TabularError::ColumnMismatch`] if the row has the wrong length. The
    ///   stream is destroyed and the row is not counted.
    /// - [`TabularError::StreamEnded`] after [`TableWriter::end`].
    /// - [`TabularError::StreamDestroyed`] once the stream has failed.
    /// - The storage error that stopped the write stream.
    pub async fn write_row(&mut self, row: &[f64]) -> TabularResult<()> {
        self.ensure_accepting()?;
        if let Err(e) = self.check_width(row) {
            self.destroy(e.to_string()).await;
            return Err(e);
        }
        self.send(row).await
    }

    /// Writes one row, reporting every error to `on_error` instead.
    ///
    /// A row of the wrong length leaves the stream open, so the next valid
    /// row is still accepted. Returns whether the writer still accepts rows.
    pub async fn write_row_with<F>(&mut self, row: &[f64], on_error: F) -> bool
    where
        F: FnOnce(TabularError),
    {
        let outcome = match self.ensure_accepting().and_then(|()| self.check_width(row)) {
            Ok(()) => self.send(row).await,
            Err(e) => Err(e),
        };
        if let Err(e) = outcome {
            on_error(e);
        }
        self.is_writable()
    }

    /// Signals that no more rows follow.
    ///
    /// # Errors
    ///
    /// Returns [`TabularError::StreamEnded`] if already ended, or
    /// [`TabularError::StreamDestroyed`] if the stream has failed.
    pub async fn end(&mut self) -> TabularResult<()> {
        self.ensure_accepting()?;
        self.state = WriterState::Ending;
        if let Some(sink) = self.sink.as_mut() {
            // A consumer that already failed reports why from done().
            if sink.close().await.is_err() {
                debug!(path = %self.path, "write stream failed before close");
            }
        }
        Ok(())
    }

    /// Writes a final row, then ends the stream.
    ///
    /// # Errors
    ///
    /// See [`TableWriter::write_row`] and [`TableWriter::end`].
    pub async fn end_with_row(&mut self, row: &[f64]) -> TabularResult<()> {
        self.write_row(row).await?;
        self.end().await
    }

    /// Waits until every accepted row is durable.
    ///
    /// Ends the stream first if the caller has not. Calling it again after
    /// completion returns the same outcome.
    ///
    /// # Errors
    ///
    /// Returns the storage error that failed the write, or
    /// [`TabularError::StreamDestroyed`] if the stream was already destroyed.
    pub async fn done(&mut self) -> TabularResult<()> {
        match self.state {
            WriterState::Completed => return Ok(()),
            WriterState::Failed => return Err(self.destroyed()),
            WriterState::Accepting => self.end().await?,
            WriterState::Ending => {}
        }
        let Some(sink) = self.sink.take() else {
            return Err(TabularError::StreamEnded);
        };
        match sink.done().await {
            Ok(()) => {
                self.state = WriterState::Completed;
                debug!(path = %self.path, rows = self.num_rows(), "table write complete");
                Ok(())
            }
            Err(e) => {
                self.state = WriterState::Failed;
                self.failure = Some(e.to_string());
                Err(e.into())
            }
        }
    }

    /// Ends the stream and waits for durability.
    ///
    /// # Errors
    ///
    /// See [`TableWriter::done`].
    pub async fn finish(mut self) -> TabularResult<()> {
        self.done().await
    }

    /// Cancels the write. Rows already sent may or may not be persisted.
    pub async fn abort(&mut self) {
        if matches!(self.state, WriterState::Completed | WriterState::Failed) {
            return;
        }
        self.destroy("aborted by caller".to_string()).await;
    }

    fn check_width(&self, row: &[f64]) -> TabularResult<()> {
        if row.len() == self.num_columns {
            Ok(())
        } else {
            Err(TabularError::ColumnMismatch {
                expected: self.num_columns,
                actual: row.len(),
            })
        }
    }

    fn ensure_accepting(&self) -> TabularResult<()> {
        match self.state {
            WriterState::Accepting => Ok(()),
            WriterState::Ending | WriterState::Completed => Err(TabularError::StreamEnded),
            WriterState::Failed => Err(self.destroyed()),
        }
    }

    fn destroyed(&self) -> TabularError {
        TabularError::StreamDestroyed {
            reason: self
                .failure
                .clone()
                .unwrap_or_else(|| "unknown failure".to_string()),
        }
    }

    async fn send(&mut self, row: &[f64]) -> TabularResult<()> {
        self.num_rows.fetch_add(1, Ordering::SeqCst);
        let Some(sink) = self.sink.as_mut() else {
            return Err(TabularError::StreamEnded);
        };
        if sink.write(encode_row(row)).await.is_ok() {
            return Ok(());
        }

        // The consumer has stopped; its outcome carries the real cause.
        self.state = WriterState::Failed;
        let cause = match self.sink.take() {
            Some(sink) => sink.done().await.err(),
            None => None,
        };
        let err = match cause {
            Some(e) => TabularError::from(e),
            None => TabularError::StreamDestroyed {
                reason: "write stream closed".to_string(),
            },
        };
        warn!(path = %self.path, error = %err, "table write stream failed");
        self.failure = Some(err.to_string());
        Err(err)
    }

    async fn destroy(&mut self, reason: String) {
        debug!(path = %self.path, %reason, "destroying table write stream");
        self.state = WriterState::Failed;
        self.failure = Some(reason);
        if let Some(sink) = self.sink.take() {
            sink.abort().await;
        }
    }
}

impl std::fmt::Debug for TableWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TableWriter")
            .field("path", &self.path)
            .field("num_columns", &self.num_columns)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}
