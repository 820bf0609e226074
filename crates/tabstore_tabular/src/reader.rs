//! Streaming row reader.

use crate::decoder::RowDecoder;
use crate::error::TabularResult;
use crate::Row;
use futures_util::stream::{Stream, StreamExt, TryStreamExt};
use std::collections::VecDeque;
use std::fmt;
use std::pin::Pin;
use std::task::{ready, Context, Poll};
use tabstore_storage::ByteStream;

/// Rows decoded from a byte stream as it arrives.
///
/// Chunks from the storage engine are reassembled into rows by a
/// [`RowDecoder`], so chunk sizes never need to line up with the row width.
/// A partial row left when the byte stream ends is yielded as a
/// [`TabularError::Corrupted`](crate::TabularError::Corrupted) item.
///
/// Dropping the stream cancels the underlying read.
pub struct RowStream {
    source: Option<ByteStream>,
    decoder: RowDecoder,
    ready: VecDeque<Row>,
}

impl RowStream {
    /// Decode rows of `num_columns` values from `source`.
    #[must_use]
    pub fn new(source: ByteStream, num_columns: usize) -> Self {
        Self {
            source: Some(source),
            decoder: RowDecoder::new(num_columns),
            ready: VecDeque::new(),
        }
    }

    /// A stream with no rows.
    #[must_use]
    pub fn empty(num_columns: usize) -> Self {
        Self {
            source: None,
            decoder: RowDecoder::new(num_columns),
            ready: VecDeque::new(),
        }
    }

    /// Collect every remaining row.
    ///
    /// # Errors
    ///
    /// Returns the first error the stream yields.
    pub async fn collect_rows(self) -> TabularResult<Vec<Row>> {
        self.try_collect().await
    }
}

impl Stream for RowStream {
    type Item = TabularResult<Row>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        loop {
            if let Some(row) = this.ready.pop_front() {
                return Poll::Ready(Some(Ok(row)));
            }
            let Some(source) = this.source.as_mut() else {
                return Poll::Ready(None);
            };
            match ready!(source.poll_next_unpin(cx)) {
                Some(Ok(chunk)) => match this.decoder.push(&chunk) {
                    Ok(rows) => this.ready.extend(rows),
                    Err(e) => {
                        this.source = None;
                        return Poll::Ready(Some(Err(e)));
                    }
                },
                Some(Err(e)) => {
                    this.source = None;
                    return Poll::Ready(Some(Err(e.into())));
                }
                None => {
                    this.source = None;
                    if let Err(e) = this.decoder.finish() {
                        return Poll::Ready(Some(Err(e)));
                    }
                }
            }
        }
    }
}

impl fmt::Debug for RowStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RowStream")
            .field("open", &self.source.is_some())
            .field("pending_bytes", &self.decoder.pending())
            .field("ready_rows", &self.ready.len())
            .finish()
    }
}
