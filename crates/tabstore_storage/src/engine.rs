//! Storage engine trait definition.

use crate::error::{StorageError, StorageResult};
use crate::stream::{ByteSink, ByteStream, DEFAULT_SINK_CAPACITY};
use async_trait::async_trait;
use bytes::Bytes;
use std::fmt;

/// Number of bytes `read` fetches when neither a length nor a buffer is given.
pub const DEFAULT_READ_LENGTH: usize = 16 * 1024;

/// Options for [`StorageEngine::read`].
///
/// Every read is explicitly positioned; nothing is remembered between calls.
#[derive(Debug, Clone, Default)]
pub struct ReadOptions {
    /// Byte offset to start reading from. Defaults to 0.
    pub position: u64,
    /// Maximum number of bytes to read. Defaults to the buffer length, or
    /// [`DEFAULT_READ_LENGTH`] if no buffer is given.
    pub length: Option<usize>,
    /// Buffer to read into. Allocated if not given.
    pub buffer: Option<Vec<u8>>,
}

impl ReadOptions {
    /// Creates options reading from offset 0 with default length.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the starting offset.
    #[must_use]
    pub fn position(mut self, position: u64) -> Self {
        self.position = position;
        self
    }

    /// Sets the maximum number of bytes to read.
    #[must_use]
    pub fn length(mut self, length: usize) -> Self {
        self.length = Some(length);
        self
    }

    /// Reads into the given buffer.
    #[must_use]
    pub fn buffer(mut self, buffer: Vec<u8>) -> Self {
        self.buffer = Some(buffer);
        self
    }

    /// Resolves defaults into `(position, length, buffer)`.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::InvalidArgument`] if the buffer is shorter than
    /// the requested length.
    pub fn resolve(self) -> StorageResult<(u64, usize, Vec<u8>)> {
        let length = self
            .length
            .or(self.buffer.as_ref().map(Vec::len))
            .unwrap_or(DEFAULT_READ_LENGTH);
        let buffer = match self.buffer {
            Some(buffer) if buffer.len() < length => {
                return Err(StorageError::InvalidArgument(format!(
                    "buffer of {} bytes cannot hold {} bytes",
                    buffer.len(),
                    length
                )));
            }
            Some(buffer) => buffer,
            None => vec![0; length],
        };
        Ok((self.position, length, buffer))
    }
}

/// Result of [`StorageEngine::read`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadOutcome {
    /// The buffer that was read into. Only the first `bytes_read` bytes are valid.
    pub buffer: Vec<u8>,
    /// Number of bytes actually read. Shorter than requested at end of file.
    pub bytes_read: usize,
}

impl ReadOutcome {
    /// The bytes that were read.
    #[must_use]
    pub fn filled(&self) -> &[u8] {
        &self.buffer[..self.bytes_read]
    }

    /// Consumes the outcome, returning only the bytes that were read.
    #[must_use]
    pub fn into_filled(mut self) -> Vec<u8> {
        self.buffer.truncate(self.bytes_read);
        self.buffer
    }
}

/// Options for [`StorageEngine::create_read_stream`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReadStreamOptions {
    /// First byte to read. Defaults to 0.
    pub start: u64,
    /// Last byte to read, inclusive. Defaults to end of object.
    pub end: Option<u64>,
    /// Maximum chunk size. Defaults to an engine-specific value.
    pub chunk_size: Option<usize>,
}

impl ReadStreamOptions {
    /// Streams the whole object.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Streams the inclusive byte range `[start, end]`.
    #[must_use]
    pub fn range(start: u64, end: u64) -> Self {
        Self {
            start,
            end: Some(end),
            chunk_size: None,
        }
    }

    /// Streams from `start` to the end of the object.
    #[must_use]
    pub fn from_offset(start: u64) -> Self {
        Self {
            start,
            ..Self::default()
        }
    }

    /// Sets the maximum chunk size.
    #[must_use]
    pub fn chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = Some(chunk_size);
        self
    }

    /// Number of bytes the range covers if `end` is known.
    ///
    /// A range too long to count (`0..=u64::MAX`) is open-ended.
    #[must_use]
    pub fn len(&self) -> Option<u64> {
        match self.end {
            Some(end) if end < self.start => Some(0),
            Some(end) => (end - self.start).checked_add(1),
            None => None,
        }
    }

    /// Returns `true` if the range is known to be empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == Some(0)
    }

    /// Checks that the range is well formed.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::InvalidArgument`] if `end < start`.
    pub fn validate(&self) -> StorageResult<()> {
        match self.end {
            Some(end) if end < self.start => Err(StorageError::InvalidArgument(format!(
                "range end {} is before start {}",
                end, self.start
            ))),
            _ => Ok(()),
        }
    }
}

/// How a write stream treats existing content.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum WriteMode {
    /// Replace the object.
    #[default]
    Truncate,
    /// Keep existing content and add to the end. Creates the object if absent.
    Append,
}

/// Options for [`StorageEngine::create_write_stream`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteStreamOptions {
    /// Whether existing content is replaced or extended.
    pub mode: WriteMode,
    /// Number of chunks queued before `write` suspends.
    pub capacity: usize,
}

impl Default for WriteStreamOptions {
    fn default() -> Self {
        Self {
            mode: WriteMode::Truncate,
            capacity: DEFAULT_SINK_CAPACITY,
        }
    }
}

impl WriteStreamOptions {
    /// Options that replace the target.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Options that append to the target.
    #[must_use]
    pub fn append() -> Self {
        Self {
            mode: WriteMode::Append,
            ..Self::default()
        }
    }

    /// Sets the queue capacity in chunks.
    #[must_use]
    pub fn capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }
}

/// A byte-addressable storage backend.
///
/// Engines are **opaque byte stores** addressed by relative path. They do not
/// interpret what they store; the tabular format lives one layer up.
///
/// # Error contract
///
/// A missing target is always reported as [`StorageError::NotFound`], never as
/// a backend-specific error. Streaming reads report it as the first item of
/// the stream because some backends can only tell once they have answered.
///
/// # Implementors
///
/// - [`crate::FileSystemStorageEngine`] - local directory
/// - [`crate::MemoryStorageEngine`] - process memory, for tests
/// - [`crate::S3StorageEngine`] - S3-compatible object storage
/// - [`crate::R2StorageEngine`] - Cloudflare R2 bucket binding
#[async_trait]
pub trait StorageEngine: Send + Sync + fmt::Debug {
    /// Reads up to `length` bytes starting at `position`.
    ///
    /// Reading at or past end of file returns zero bytes. The default
    /// implementation issues one ranged stream and drops it once the buffer
    /// is full.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::NotFound`] if the target does not exist.
    async fn read(&self, path: &str, options: ReadOptions) -> StorageResult<ReadOutcome> {
        let (position, length, mut buffer) = options.resolve()?;
        if length == 0 {
            self.size(path).await?;
            return Ok(ReadOutcome {
                buffer,
                bytes_read: 0,
            });
        }
        let last = position.saturating_add(length as u64 - 1);
        let range = ReadStreamOptions::range(position, last);
        let bytes_read = self
            .create_read_stream(path, range)
            .read_into(&mut buffer[..length])
            .await?;
        Ok(ReadOutcome { buffer, bytes_read })
    }

    /// Reads the entire object.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::NotFound`] if the target does not exist.
    async fn read_file(&self, path: &str) -> StorageResult<Bytes> {
        self.create_read_stream(path, ReadStreamOptions::new())
            .collect_bytes()
            .await
    }

    /// Creates or replaces the object with `contents`.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend rejects the write.
    async fn write(&self, path: &str, contents: Bytes) -> StorageResult<()>;

    /// Appends `contents`, creating the object if needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend rejects the write.
    async fn append(&self, path: &str, contents: Bytes) -> StorageResult<()>;

    /// Deletes the object.
    ///
    /// # Errors
    ///
    /// Backends that can detect a missing target return
    /// [`StorageError::NotFound`]; object stores with idempotent deletes don't.
    async fn remove(&self, path: &str) -> StorageResult<()>;

    /// Moves `from` to `to`.
    ///
    /// Atomic where the backend has a native rename. Object stores emulate it
    /// as copy then delete; a crash in between leaves both objects present.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::NotFound`] if `from` does not exist.
    async fn rename(&self, from: &str, to: &str) -> StorageResult<()>;

    /// Returns the object size in bytes.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::NotFound`] if the target does not exist.
    async fn size(&self, path: &str) -> StorageResult<u64>;

    /// Returns whether the object exists.
    ///
    /// # Errors
    ///
    /// Returns any error other than not-found reported by `size`.
    async fn exists(&self, path: &str) -> StorageResult<bool> {
        match self.size(path).await {
            Ok(_) => Ok(true),
            Err(e) if e.is_not_found() => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Streams the inclusive byte range described by `options`.
    ///
    /// Nothing is fetched until the stream is polled. A missing target is
    /// delivered as an error item, not as a panic or synchronous failure.
    fn create_read_stream(&self, path: &str, options: ReadStreamOptions) -> ByteStream;

    /// Opens a write stream.
    ///
    /// The returned sink starts consuming immediately. Its
    /// [`ByteSink::done`] resolves once every byte is durable, which on
    /// object stores is later than the caller closing the sink.
    ///
    /// # Panics
    ///
    /// Implementations spawn a tokio task and panic outside a runtime.
    fn create_write_stream(&self, path: &str, options: WriteStreamOptions) -> ByteSink;

    /// Short human-readable description used in logs.
    fn describe(&self) -> String;
}
