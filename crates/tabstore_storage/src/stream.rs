//! Push/pull byte stream primitives.
//!
//! [`ByteStream`] is the pull side: a boxed stream of byte chunks. Backpressure
//! is implicit, nothing is read from the backend until the consumer polls, and
//! dropping the stream releases whatever the backend holds open for it (a
//! file descriptor, an HTTP response body).
//!
//! [`ByteSink`] is the push side. Chunks are queued through a bounded channel
//! into a consumer task that is spawned as soon as the sink is created, so the
//! backend starts draining immediately. Closing the sink and the data being
//! durable are separate events: [`ByteSink::close`] only says "no more
//! input", while [`ByteSink::done`] resolves once the backend has confirmed
//! the write.

use crate::error::{StorageError, StorageResult};
use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use futures_util::stream::{self, BoxStream, Stream, StreamExt, TryStreamExt};
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Default number of chunks a [`ByteSink`] buffers before `write` suspends.
pub const DEFAULT_SINK_CAPACITY: usize = 16;

/// A pull-based stream of byte chunks read from a storage engine.
pub struct ByteStream {
    inner: BoxStream<'static, StorageResult<Bytes>>,
}

impl ByteStream {
    /// Wraps any stream of byte chunks.
    pub fn new<S>(stream: S) -> Self
    where
        S: Stream<Item = StorageResult<Bytes>> + Send + 'static,
    {
        Self {
            inner: stream.boxed(),
        }
    }

    /// A stream that ends immediately.
    #[must_use]
    pub fn empty() -> Self {
        Self::new(stream::empty())
    }

    /// A stream yielding `bytes` as a single chunk.
    #[must_use]
    pub fn from_bytes(bytes: Bytes) -> Self {
        if bytes.is_empty() {
            return Self::empty();
        }
        Self::new(stream::once(async move { Ok(bytes) }))
    }

    /// A stream whose source is only known once `future` resolves.
    ///
    /// Used by engines that must ask the backend before they can tell whether
    /// the target exists: an error from `future` becomes the first (and only)
    /// item of the stream instead of a synchronous failure.
    pub fn deferred<F>(future: F) -> Self
    where
        F: Future<Output = StorageResult<ByteStream>> + Send + 'static,
    {
        Self::new(stream::once(future).try_flatten())
    }

    /// Splits chunks so that none is larger than `max` bytes.
    ///
    /// A `max` of zero leaves the stream untouched.
    #[must_use]
    pub fn rechunk(self, max: usize) -> Self {
        if max == 0 {
            return self;
        }
        Self::new(
            self.inner
                .map_ok(move |mut chunk| {
                    let mut parts: Vec<StorageResult<Bytes>> =
                        Vec::with_capacity(chunk.len() / max + 1);
                    while chunk.len() > max {
                        parts.push(Ok(chunk.split_to(max)));
                    }
                    if !chunk.is_empty() {
                        parts.push(Ok(chunk));
                    }
                    stream::iter(parts)
                })
                .try_flatten(),
        )
    }

    /// Reads the whole stream into one contiguous buffer.
    ///
    /// # Errors
    ///
    /// Returns the first error yielded by the stream.
    pub async fn collect_bytes(mut self) -> StorageResult<Bytes> {
        let mut buf = BytesMut::new();
        while let Some(chunk) = self.next().await {
            buf.extend_from_slice(&chunk?);
        }
        Ok(buf.freeze())
    }

    /// Copies chunks into `buf` until it is full or the stream ends.
    ///
    /// The rest of the stream is dropped, which cancels the underlying read.
    /// Returns the number of bytes copied.
    ///
    /// # Errors
    ///
    /// Returns the first error yielded by the stream.
    pub async fn read_into(mut self, buf: &mut [u8]) -> StorageResult<usize> {
        let mut filled = 0;
        while filled < buf.len() {
            let Some(chunk) = self.next().await else {
                break;
            };
            let chunk = chunk?;
            let take = chunk.len().min(buf.len() - filled);
            buf[filled..filled + take].copy_from_slice(&chunk[..take]);
            filled += take;
        }
        Ok(filled)
    }
}

impl Stream for ByteStream {
    type Item = StorageResult<Bytes>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.inner.poll_next_unpin(cx)
    }
}

impl fmt::Debug for ByteStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ByteStream").finish_non_exhaustive()
    }
}

/// Backend half of a [`ByteSink`].
///
/// Each engine implements this for its write target. The sink's consumer task
/// calls `write_chunk` in order, then exactly one of `finish` or `abort`.
#[async_trait]
pub trait ChunkWriter: Send {
    /// Accepts the next chunk.
    async fn write_chunk(&mut self, chunk: Bytes) -> StorageResult<()>;

    /// Flushes everything and makes the write durable.
    async fn finish(self: Box<Self>) -> StorageResult<()>;

    /// Discards the write. Cleanup is best effort.
    async fn abort(self: Box<Self>) -> StorageResult<()>;
}

enum SinkMessage {
    Chunk(Bytes),
    Finish,
}

/// A push-based byte sink writing to a storage engine.
///
/// ```text
/// OPEN -> write()* -> close() -> done() -> COMPLETED | FAILED
/// ```
///
/// Dropping a sink that was never closed aborts the write.
pub struct ByteSink {
    path: String,
    tx: Option<mpsc::Sender<SinkMessage>>,
    aborted: Arc<AtomicBool>,
    task: JoinHandle<StorageResult<()>>,
}

impl ByteSink {
    /// Spawns the consumer task and returns the producer handle.
    ///
    /// `open` resolves to the backend writer; it runs on the consumer task so
    /// that opening a file or starting an upload never blocks the caller.
    ///
    /// # Panics
    ///
    /// Panics if called outside a tokio runtime.
    pub fn spawn<F>(path: impl Into<String>, capacity: usize, open: F) -> Self
    where
        F: Future<Output = StorageResult<Box<dyn ChunkWriter>>> + Send + 'static,
    {
        let path = path.into();
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let aborted = Arc::new(AtomicBool::new(false));
        let task = tokio::spawn(drive(path.clone(), open, rx, Arc::clone(&aborted)));
        Self {
            path,
            tx: Some(tx),
            aborted,
            task,
        }
    }

    /// The path this sink writes to.
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Returns `true` while the sink accepts input.
    #[must_use]
    pub fn is_writable(&self) -> bool {
        self.tx.as_ref().is_some_and(|tx| !tx.is_closed())
    }

    /// Queues a chunk, suspending while the queue is full.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::StreamClosed`] after `close` or once the
    /// consumer has failed; call [`ByteSink::done`] to learn why it failed.
    pub async fn write(&mut self, chunk: Bytes) -> StorageResult<()> {
        let tx = self.tx.as_ref().ok_or(StorageError::StreamClosed)?;
        if chunk.is_empty() {
            return Ok(());
        }
        tx.send(SinkMessage::Chunk(chunk))
            .await
            .map_err(|_| StorageError::StreamClosed)
    }

    /// Signals that no more input follows. Idempotent.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::StreamClosed`] if the consumer already failed.
    pub async fn close(&mut self) -> StorageResult<()> {
        match self.tx.take() {
            Some(tx) => tx
                .send(SinkMessage::Finish)
                .await
                .map_err(|_| StorageError::StreamClosed),
            None => Ok(()),
        }
    }

    /// Waits until the backend has made every written byte durable.
    ///
    /// Closes the sink first if the caller has not done so.
    ///
    /// # Errors
    ///
    /// Returns the error that stopped the consumer, if any.
    pub async fn done(mut self) -> StorageResult<()> {
        // A failed close is reported through the task outcome below.
        let _ = self.close().await;
        match self.task.await {
            Ok(outcome) => outcome,
            Err(e) => Err(StorageError::backend("write stream task", e)),
        }
    }

    /// Closes the sink and waits for durability.
    ///
    /// # Errors
    ///
    /// See [`ByteSink::done`].
    pub async fn finish(self) -> StorageResult<()> {
        self.done().await
    }

    /// Cancels the write and waits for the backend cleanup to run.
    pub async fn abort(mut self) {
        self.aborted.store(true, Ordering::SeqCst);
        self.tx.take();
        if let Err(e) = self.task.await {
            warn!(path = %self.path, error = %e, "write stream task did not shut down cleanly");
        }
    }
}

impl fmt::Debug for ByteSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ByteSink")
            .field("path", &self.path)
            .field("writable", &self.is_writable())
            .finish_non_exhaustive()
    }
}

async fn drive<F>(
    path: String,
    open: F,
    mut rx: mpsc::Receiver<SinkMessage>,
    aborted: Arc<AtomicBool>,
) -> StorageResult<()>
where
    F: Future<Output = StorageResult<Box<dyn ChunkWriter>>> + Send,
{
    let mut writer = match open.await {
        Ok(writer) => writer,
        Err(e) => {
            rx.close();
            return Err(e);
        }
    };

    loop {
        let message = rx.recv().await;
        if aborted.load(Ordering::SeqCst) {
            rx.close();
            abort_quietly(writer, &path).await;
            return Err(StorageError::Aborted(path));
        }
        match message {
            Some(SinkMessage::Chunk(chunk)) => {
                if let Err(e) = writer.write_chunk(chunk).await {
                    rx.close();
                    abort_quietly(writer, &path).await;
                    return Err(e);
                }
            }
            Some(SinkMessage::Finish) => {
                rx.close();
                return writer.finish().await;
            }
            None => {
                debug!(path = %path, "write stream dropped before close");
                abort_quietly(writer, &path).await;
                return Err(StorageError::Aborted(path));
            }
        }
    }
}

async fn abort_quietly(writer: Box<dyn ChunkWriter>, path: &str) {
    if let Err(e) = writer.abort().await {
        warn!(path, error = %e, "failed to clean up aborted write");
    }
}
