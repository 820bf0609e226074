//! In-memory storage engine for testing.

use crate::engine::{
    ReadOptions, ReadOutcome, ReadStreamOptions, StorageEngine, WriteMode, WriteStreamOptions,
};
use crate::error::{StorageError, StorageResult};
use crate::path::relative_path;
use crate::stream::{ByteSink, ByteStream, ChunkWriter};
use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

/// Chunk size of read streams when the caller does not choose one.
const DEFAULT_CHUNK_SIZE: usize = 64 * 1024;

/// An in-memory storage engine.
///
/// Objects live in a map keyed by normalized path. This engine is suitable for:
/// - Unit tests
/// - Benchmarks that should not measure disk I/O
/// - Ephemeral tables that don't need persistence
///
/// Clones share the same objects. Write streams publish their content only
/// once they finish, so readers never observe a half-written object.
///
/// # Example
///
/// ```rust
/// use bytes::Bytes;
/// use tabstore_storage::{MemoryStorageEngine, StorageEngine};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let engine = MemoryStorageEngine::new();
/// engine.append("t.bin", Bytes::from_static(b"test data")).await.unwrap();
/// assert_eq!(engine.size("t.bin").await.unwrap(), 9);
/// # }
/// ```
#[derive(Debug, Clone, Default)]
pub struct MemoryStorageEngine {
    objects: Arc<RwLock<HashMap<String, Vec<u8>>>>,
}

impl MemoryStorageEngine {
    /// Creates an empty engine.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an engine holding the given objects.
    ///
    /// Useful for testing how readers cope with pre-existing content.
    pub fn with_objects<I, K>(objects: I) -> Self
    where
        I: IntoIterator<Item = (K, Vec<u8>)>,
        K: AsRef<str>,
    {
        let objects = objects
            .into_iter()
            .map(|(key, data)| (relative_path(key.as_ref()), data))
            .collect();
        Self {
            objects: Arc::new(RwLock::new(objects)),
        }
    }

    /// Returns a copy of the object at `path`, if any.
    #[must_use]
    pub fn data(&self, path: &str) -> Option<Vec<u8>> {
        self.objects.read().get(&relative_path(path)).cloned()
    }

    /// Returns all stored paths, sorted.
    #[must_use]
    pub fn paths(&self) -> Vec<String> {
        let mut paths: Vec<String> = self.objects.read().keys().cloned().collect();
        paths.sort();
        paths
    }

    /// Removes every object.
    pub fn clear(&self) {
        self.objects.write().clear();
    }
}

#[async_trait]
impl StorageEngine for MemoryStorageEngine {
    async fn read(&self, path: &str, options: ReadOptions) -> StorageResult<ReadOutcome> {
        let (position, length, mut buffer) = options.resolve()?;
        let objects = self.objects.read();
        let data = objects
            .get(&relative_path(path))
            .ok_or_else(|| StorageError::not_found(path))?;

        let start = usize::try_from(position).unwrap_or(usize::MAX).min(data.len());
        let end = start.saturating_add(length).min(data.len());
        let bytes_read = end - start;
        buffer[..bytes_read].copy_from_slice(&data[start..end]);
        Ok(ReadOutcome { buffer, bytes_read })
    }

    async fn write(&self, path: &str, contents: Bytes) -> StorageResult<()> {
        self.objects
            .write()
            .insert(relative_path(path), contents.to_vec());
        Ok(())
    }

    async fn append(&self, path: &str, contents: Bytes) -> StorageResult<()> {
        self.objects
            .write()
            .entry(relative_path(path))
            .or_default()
            .extend_from_slice(&contents);
        Ok(())
    }

    async fn remove(&self, path: &str) -> StorageResult<()> {
        self.objects
            .write()
            .remove(&relative_path(path))
            .map(|_| ())
            .ok_or_else(|| StorageError::not_found(path))
    }

    async fn rename(&self, from: &str, to: &str) -> StorageResult<()> {
        let mut objects = self.objects.write();
        let data = objects
            .remove(&relative_path(from))
            .ok_or_else(|| StorageError::not_found(from))?;
        objects.insert(relative_path(to), data);
        Ok(())
    }

    async fn size(&self, path: &str) -> StorageResult<u64> {
        self.objects
            .read()
            .get(&relative_path(path))
            .map(|data| data.len() as u64)
            .ok_or_else(|| StorageError::not_found(path))
    }

    fn create_read_stream(&self, path: &str, options: ReadStreamOptions) -> ByteStream {
        let objects = Arc::clone(&self.objects);
        let path = path.to_string();
        let chunk_size = options.chunk_size.unwrap_or(DEFAULT_CHUNK_SIZE);

        ByteStream::deferred(async move {
            options.validate()?;
            let objects = objects.read();
            let data = objects
                .get(&relative_path(&path))
                .ok_or_else(|| StorageError::not_found(path.as_str()))?;

            let len = data.len() as u64;
            let start = options.start.min(len);
            let end = options.end.map_or(len, |end| end.saturating_add(1).min(len));
            let slice = if start < end {
                Bytes::copy_from_slice(&data[start as usize..end as usize])
            } else {
                Bytes::new()
            };
            Ok(ByteStream::from_bytes(slice).rechunk(chunk_size))
        })
    }

    fn create_write_stream(&self, path: &str, options: WriteStreamOptions) -> ByteSink {
        let writer = MemoryChunkWriter {
            objects: Arc::clone(&self.objects),
            key: relative_path(path),
            mode: options.mode,
            buffer: BytesMut::new(),
        };
        ByteSink::spawn(path, options.capacity, async move {
            Ok(Box::new(writer) as Box<dyn ChunkWriter>)
        })
    }

    fn describe(&self) -> String {
        "memory".to_string()
    }
}

struct MemoryChunkWriter {
    objects: Arc<RwLock<HashMap<String, Vec<u8>>>>,
    key: String,
    mode: WriteMode,
    buffer: BytesMut,
}

#[async_trait]
impl ChunkWriter for MemoryChunkWriter {
    async fn write_chunk(&mut self, chunk: Bytes) -> StorageResult<()> {
        self.buffer.extend_from_slice(&chunk);
        Ok(())
    }

    async fn finish(self: Box<Self>) -> StorageResult<()> {
        let mut objects = self.objects.write();
        match self.mode {
            WriteMode::Truncate => {
                objects.insert(self.key, self.buffer.to_vec());
            }
            WriteMode::Append => {
                objects
                    .entry(self.key)
                    .or_default()
                    .extend_from_slice(&self.buffer);
            }
        }
        Ok(())
    }

    async fn abort(self: Box<Self>) -> StorageResult<()> {
        Ok(())
    }
}
