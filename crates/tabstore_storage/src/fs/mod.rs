//! Local filesystem storage engine.
//!
//! Paths are resolved relative to a root directory. Positioned reads, read
//! streams and appends go through a [`HandlePool`] so that reading a table row
//! by row does not reopen the file for every row; whole-file operations (`write`,
//! `remove`, `rename`) use the OS directly and evict any pooled handle for the
//! paths they touch.

mod handle;

pub use handle::{FileHandleLease, HandlePool, OpenMode, ReusableFileHandle};

use crate::config::FileSystemConfig;
use crate::engine::{
    ReadOptions, ReadOutcome, ReadStreamOptions, StorageEngine, WriteMode, WriteStreamOptions,
};
use crate::error::{StorageError, StorageResult};
use crate::path::relative_path;
use crate::stream::{ByteSink, ByteStream, ChunkWriter};
use async_trait::async_trait;
use bytes::Bytes;
use futures_util::stream;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs::{self, File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tracing::{debug, trace};

/// Default length of a [`FileSystemStorageEngine::read_reverse`] call.
pub const DEFAULT_REVERSE_READ_LENGTH: usize = 1024;

/// Default chunk size of a reverse read stream.
pub const DEFAULT_REVERSE_CHUNK_SIZE: usize = 16 * 1024;

/// Options for [`FileSystemStorageEngine::create_reverse_read_stream`].
///
/// Offsets count backwards from the end of the file: `start == 0` is the
/// last byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReverseReadOptions {
    /// Distance from the end of the file to start at. Defaults to 0.
    pub start: u64,
    /// Last distance from the end to read, inclusive. Defaults to the
    /// beginning of the file.
    pub end: Option<u64>,
    /// Maximum chunk size.
    pub chunk_size: usize,
}

impl Default for ReverseReadOptions {
    fn default() -> Self {
        Self {
            start: 0,
            end: None,
            chunk_size: DEFAULT_REVERSE_CHUNK_SIZE,
        }
    }
}

impl ReverseReadOptions {
    /// Reads the whole file backwards.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Stops after the byte `end` positions from the end of the file.
    #[must_use]
    pub fn end(mut self, end: u64) -> Self {
        self.end = Some(end);
        self
    }

    /// Sets the maximum chunk size.
    #[must_use]
    pub fn chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }
}

/// A storage engine backed by a local directory.
///
/// Cloning is cheap; clones share the handle pool.
///
/// # Example
///
/// ```no_run
/// use tabstore_storage::{FileSystemStorageEngine, StorageEngine};
///
/// # async fn demo() -> tabstore_storage::StorageResult<()> {
/// let engine = FileSystemStorageEngine::new("/var/lib/tables");
/// engine.write("t1.bin", bytes::Bytes::from_static(b"hello")).await?;
/// assert_eq!(engine.size("t1.bin").await?, 5);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct FileSystemStorageEngine {
    inner: Arc<Inner>,
}

#[derive(Debug)]
struct Inner {
    root: PathBuf,
    read_chunk_size: usize,
    pool: HandlePool,
}

impl FileSystemStorageEngine {
    /// Creates an engine rooted at `root` with default settings.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self::with_config(FileSystemConfig::new(root))
    }

    /// Creates an engine from a full configuration.
    #[must_use]
    pub fn with_config(config: FileSystemConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                root: config.root_directory,
                read_chunk_size: config.read_chunk_size.max(1),
                pool: HandlePool::new(config.handle_idle_timeout),
            }),
        }
    }

    /// The root directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.inner.root
    }

    /// Resolves `name` against the root directory.
    ///
    /// The name is normalized and cannot escape the root.
    #[must_use]
    pub fn full_path(&self, name: &str) -> PathBuf {
        self.inner.root.join(relative_path(name))
    }

    /// Number of pooled file handles currently holding a descriptor.
    #[must_use]
    pub fn open_handles(&self) -> usize {
        self.inner.pool.open_handles()
    }

    /// Number of pooled handle leases held by in-flight reads and streams.
    #[must_use]
    pub fn outstanding_leases(&self) -> usize {
        self.inner.pool.outstanding_leases()
    }

    /// Reads a window that ends `position` bytes before the end of the file,
    /// returning the bytes in reverse order.
    ///
    /// The length defaults to [`DEFAULT_REVERSE_READ_LENGTH`] and is clamped
    /// to the bytes available before `position`. A `position` at or past the
    /// file size reads nothing.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::NotFound`] if the file does not exist.
    pub async fn read_reverse(&self, path: &str, options: ReadOptions) -> StorageResult<ReadOutcome> {
        let size = self.size(path).await?;
        let options = if options.length.is_none() && options.buffer.is_none() {
            options.length(DEFAULT_REVERSE_READ_LENGTH)
        } else {
            options
        };
        let (position, length, buffer) = options.resolve()?;

        if position >= size {
            return Ok(ReadOutcome {
                buffer,
                bytes_read: 0,
            });
        }
        let available = size - position;
        let length = length.min(usize::try_from(available).unwrap_or(usize::MAX));
        let offset = available - length as u64;

        let full_path = self.full_path(path);
        let lease = self
            .inner
            .pool
            .checkout(&full_path, OpenMode::Read)
            .await
            .map_err(|e| StorageError::from_io(e, path))?;
        let (mut buffer, bytes_read) = lease
            .read_at(buffer, length, offset)
            .await
            .map_err(|e| StorageError::from_io(e, path))?;
        buffer[..bytes_read].reverse();
        Ok(ReadOutcome { buffer, bytes_read })
    }

    /// Streams the file from the end towards the start.
    ///
    /// Each chunk is a [`read_reverse`](Self::read_reverse) call, so its bytes
    /// are already reversed; concatenating all chunks yields the whole range
    /// in reverse order. The stream ends at the first empty read.
    #[must_use]
    pub fn create_reverse_read_stream(&self, path: &str, options: ReverseReadOptions) -> ByteStream {
        let engine = self.clone();
        let path = path.to_string();
        let chunk_size = options.chunk_size.max(1);
        let end = options.end;

        ByteStream::new(stream::try_unfold(options.start, move |position| {
            let engine = engine.clone();
            let path = path.clone();
            async move {
                let length = match end {
                    Some(end) if position > end => return Ok(None),
                    Some(end) => chunk_size.min(
                        usize::try_from((end - position).saturating_add(1)).unwrap_or(usize::MAX),
                    ),
                    None => chunk_size,
                };
                let outcome = engine
                    .read_reverse(&path, ReadOptions::new().position(position).length(length))
                    .await?;
                if outcome.bytes_read == 0 {
                    return Ok(None);
                }
                let next = position.saturating_add(outcome.bytes_read as u64);
                Ok(Some((Bytes::from(outcome.into_filled()), next)))
            }
        }))
    }

    async fn ensure_parent(&self, full_path: &Path, path: &str) -> StorageResult<()> {
        if let Some(parent) = full_path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| StorageError::from_io(e, path))?;
        }
        Ok(())
    }
}

#[async_trait]
impl StorageEngine for FileSystemStorageEngine {
    async fn read(&self, path: &str, options: ReadOptions) -> StorageResult<ReadOutcome> {
        let (position, length, buffer) = options.resolve()?;
        let full_path = self.full_path(path);
        let lease = self
            .inner
            .pool
            .checkout(&full_path, OpenMode::Read)
            .await
            .map_err(|e| StorageError::from_io(e, path))?;
        let (buffer, bytes_read) = lease
            .read_at(buffer, length, position)
            .await
            .map_err(|e| StorageError::from_io(e, path))?;
        trace!(path, position, bytes_read, "positioned read");
        Ok(ReadOutcome { buffer, bytes_read })
    }

    async fn read_file(&self, path: &str) -> StorageResult<Bytes> {
        fs::read(self.full_path(path))
            .await
            .map(Bytes::from)
            .map_err(|e| StorageError::from_io(e, path))
    }

    async fn write(&self, path: &str, contents: Bytes) -> StorageResult<()> {
        let full_path = self.full_path(path);
        self.inner.pool.evict(&full_path);
        self.ensure_parent(&full_path, path).await?;
        fs::write(&full_path, &contents)
            .await
            .map_err(|e| StorageError::from_io(e, path))
    }

    async fn append(&self, path: &str, contents: Bytes) -> StorageResult<()> {
        let full_path = self.full_path(path);
        self.ensure_parent(&full_path, path).await?;
        let lease = self
            .inner
            .pool
            .checkout(&full_path, OpenMode::Append)
            .await
            .map_err(|e| StorageError::from_io(e, path))?;
        lease
            .append(contents)
            .await
            .map_err(|e| StorageError::from_io(e, path))
    }

    async fn remove(&self, path: &str) -> StorageResult<()> {
        let full_path = self.full_path(path);
        self.inner.pool.evict(&full_path);
        fs::remove_file(&full_path)
            .await
            .map_err(|e| StorageError::from_io(e, path))
    }

    async fn rename(&self, from: &str, to: &str) -> StorageResult<()> {
        let source = self.full_path(from);
        let target = self.full_path(to);
        self.inner.pool.evict(&source);
        self.inner.pool.evict(&target);
        self.ensure_parent(&target, to).await?;
        fs::rename(&source, &target)
            .await
            .map_err(|e| StorageError::from_io(e, from))?;
        debug!(from, to, "renamed file");
        Ok(())
    }

    async fn size(&self, path: &str) -> StorageResult<u64> {
        let metadata = fs::metadata(self.full_path(path))
            .await
            .map_err(|e| StorageError::from_io(e, path))?;
        Ok(metadata.len())
    }

    fn create_read_stream(&self, path: &str, options: ReadStreamOptions) -> ByteStream {
        if let Err(e) = options.validate() {
            return ByteStream::new(stream::once(async move { Err(e) }));
        }
        let engine = self.clone();
        let full_path = self.full_path(path);
        let path = path.to_string();
        let chunk_size = options.chunk_size.unwrap_or(self.inner.read_chunk_size).max(1);

        ByteStream::deferred(async move {
            // The lease lives in the stream state, so dropping the stream
            // releases it whether or not it was read to the end.
            let lease = engine
                .inner
                .pool
                .checkout(&full_path, OpenMode::Read)
                .await
                .map_err(|e| StorageError::from_io(e, path.as_str()))?;
            let state = (lease, options.start, options.len());
            Ok(ByteStream::new(stream::try_unfold(
                state,
                move |(lease, position, remaining)| {
                    let path = path.clone();
                    async move {
                        let want = match remaining {
                            Some(0) => return Ok(None),
                            Some(left) => chunk_size.min(usize::try_from(left).unwrap_or(usize::MAX)),
                            None => chunk_size,
                        };
                        let (mut buf, filled) = lease
                            .read_at(vec![0u8; want], want, position)
                            .await
                            .map_err(|e| StorageError::from_io(e, path.as_str()))?;
                        if filled == 0 {
                            return Ok(None);
                        }
                        buf.truncate(filled);
                        let next = position.saturating_add(filled as u64);
                        let remaining = remaining.map(|left| left - filled as u64);
                        Ok(Some((Bytes::from(buf), (lease, next, remaining))))
                    }
                },
            )))
        })
    }

    fn create_write_stream(&self, path: &str, options: WriteStreamOptions) -> ByteSink {
        let engine = self.clone();
        let full_path = self.full_path(path);
        let name = path.to_string();
        if options.mode == WriteMode::Truncate {
            self.inner.pool.evict(&full_path);
        }

        ByteSink::spawn(path, options.capacity, async move {
            engine.ensure_parent(&full_path, &name).await?;
            let mut open = OpenOptions::new();
            match options.mode {
                WriteMode::Truncate => open.write(true).create(true).truncate(true),
                WriteMode::Append => open.append(true).create(true),
            };
            let file = open
                .open(&full_path)
                .await
                .map_err(|e| StorageError::from_io(e, name.as_str()))?;
            trace!(path = %name, mode = ?options.mode, "opened write stream");
            Ok(Box::new(FileChunkWriter { path: name, file }) as Box<dyn ChunkWriter>)
        })
    }

    fn describe(&self) -> String {
        format!("filesystem:{}", self.inner.root.display())
    }
}

struct FileChunkWriter {
    path: String,
    file: File,
}

#[async_trait]
impl ChunkWriter for FileChunkWriter {
    async fn write_chunk(&mut self, chunk: Bytes) -> StorageResult<()> {
        self.file
            .write_all(&chunk)
            .await
            .map_err(|e| StorageError::from_io(e, self.path.as_str()))
    }

    async fn finish(mut self: Box<Self>) -> StorageResult<()> {
        self.file
            .flush()
            .await
            .map_err(|e| StorageError::from_io(e, self.path.as_str()))?;
        self.file
            .sync_data()
            .await
            .map_err(|e| StorageError::from_io(e, self.path.as_str()))
    }

    async fn abort(mut self: Box<Self>) -> StorageResult<()> {
        // Bytes already written stay on disk, as with any interrupted write.
        self.file
            .flush()
            .await
            .map_err(|e| StorageError::from_io(e, self.path.as_str()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::StreamExt;
    use std::time::Duration;
    use tempfile::tempdir;

    const ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyz";

    fn engine(dir: &tempfile::TempDir) -> FileSystemStorageEngine {
        FileSystemStorageEngine::with_config(
            FileSystemConfig::new(dir.path()).handle_idle_timeout(Duration::from_millis(20)),
        )
    }

    async fn chunk_lengths(stream: ByteStream) -> Vec<usize> {
        stream.map(|c| c.unwrap().len()).collect().await
    }

    #[tokio::test]
    async fn write_then_read() {
        let dir = tempdir().unwrap();
        let engine = engine(&dir);
        engine.write("a/b/c.bin", Bytes::from_static(ALPHABET)).await.unwrap();

        let outcome = engine
            .read("a/b/c.bin", ReadOptions::new().position(3).length(4))
            .await
            .unwrap();
        assert_eq!(outcome.filled(), b"defg");
        assert_eq!(engine.size("a/b/c.bin").await.unwrap(), 26);
        assert!(dir.path().join("a/b/c.bin").exists());
    }

    #[tokio::test]
    async fn read_clamps_at_end_of_file() {
        let dir = tempdir().unwrap();
        let engine = engine(&dir);
        engine.write("f", Bytes::from_static(b"abc")).await.unwrap();

        let outcome = engine.read("f", ReadOptions::new().position(1).length(10)).await.unwrap();
        assert_eq!(outcome.filled(), b"bc");
        let outcome = engine.read("f", ReadOptions::new().position(10).length(10)).await.unwrap();
        assert_eq!(outcome.bytes_read, 0);
    }

    #[tokio::test]
    async fn missing_file_is_not_found() {
        let dir = tempdir().unwrap();
        let engine = engine(&dir);

        assert!(engine.size("nope").await.unwrap_err().is_not_found());
        assert!(engine.read("nope", ReadOptions::new()).await.unwrap_err().is_not_found());
        assert!(engine.remove("nope").await.unwrap_err().is_not_found());
        assert!(engine.rename("nope", "other").await.unwrap_err().is_not_found());

        let mut stream = engine.create_read_stream("nope", ReadStreamOptions::new());
        assert!(stream.next().await.unwrap().unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn reads_share_a_pooled_handle() {
        let dir = tempdir().unwrap();
        let engine = engine(&dir);
        engine.write("f", Bytes::from_static(ALPHABET)).await.unwrap();

        let (a, b) = tokio::join!(
            engine.read("f", ReadOptions::new().length(3)),
            engine.read("f", ReadOptions::new().position(23).length(3)),
        );
        assert_eq!(a.unwrap().filled(), b"abc");
        assert_eq!(b.unwrap().filled(), b"xyz");
        assert_eq!(engine.open_handles(), 1);

        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(engine.open_handles(), 0);
    }

    #[tokio::test]
    async fn dropped_read_stream_releases_its_handle() {
        let dir = tempdir().unwrap();
        let engine = engine(&dir);
        engine.write("f", Bytes::from(ALPHABET.repeat(100))).await.unwrap();

        let mut stream = engine.create_read_stream("f", ReadStreamOptions::new().chunk_size(16));
        assert_eq!(stream.next().await.unwrap().unwrap(), &ALPHABET[..16]);
        assert_eq!(engine.outstanding_leases(), 1);
        assert_eq!(engine.open_handles(), 1);

        drop(stream);
        assert_eq!(engine.outstanding_leases(), 0);
        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(engine.open_handles(), 0);
    }

    #[tokio::test]
    async fn ranges_reaching_the_top_of_u64() {
        let dir = tempdir().unwrap();
        let engine = engine(&dir);
        engine.write("f", Bytes::from_static(ALPHABET)).await.unwrap();

        let whole = engine
            .create_read_stream("f", ReadStreamOptions::range(0, u64::MAX))
            .collect_bytes()
            .await
            .unwrap();
        assert_eq!(whole, Bytes::from_static(ALPHABET));

        let beyond = engine
            .create_read_stream("f", ReadStreamOptions::range(u64::MAX, u64::MAX))
            .collect_bytes()
            .await
            .unwrap();
        assert!(beyond.is_empty());

        let outcome = engine
            .read("f", ReadOptions::new().position(u64::MAX).length(4))
            .await
            .unwrap();
        assert_eq!(outcome.bytes_read, 0);

        let reversed = engine
            .create_reverse_read_stream("f", ReverseReadOptions::new().end(u64::MAX).chunk_size(10))
            .collect_bytes()
            .await
            .unwrap();
        assert_eq!(reversed.len(), 26);
    }

    #[tokio::test]
    async fn remove_evicts_pooled_handle() {
        let dir = tempdir().unwrap();
        let engine = engine(&dir);
        engine.write("f", Bytes::from_static(b"abc")).await.unwrap();
        engine.read("f", ReadOptions::new()).await.unwrap();

        engine.remove("f").await.unwrap();
        assert_eq!(engine.open_handles(), 0);
        assert!(engine.read("f", ReadOptions::new()).await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn overwrite_is_visible_to_later_reads() {
        let dir = tempdir().unwrap();
        let engine = engine(&dir);
        engine.write("f", Bytes::from_static(b"old contents")).await.unwrap();
        engine.read("f", ReadOptions::new()).await.unwrap();

        engine.write("f", Bytes::from_static(b"new")).await.unwrap();
        let outcome = engine.read("f", ReadOptions::new()).await.unwrap();
        assert_eq!(outcome.filled(), b"new");
    }

    #[tokio::test]
    async fn append_creates_and_extends() {
        let dir = tempdir().unwrap();
        let engine = engine(&dir);
        engine.append("logs/x", Bytes::from_static(b"ab")).await.unwrap();
        engine.append("logs/x", Bytes::from_static(b"cd")).await.unwrap();
        assert_eq!(engine.read_file("logs/x").await.unwrap(), Bytes::from_static(b"abcd"));
    }

    #[tokio::test]
    async fn rename_moves_content() {
        let dir = tempdir().unwrap();
        let engine = engine(&dir);
        engine.write("src", Bytes::from_static(b"payload")).await.unwrap();
        engine.rename("src", "nested/dst").await.unwrap();

        assert!(!engine.exists("src").await.unwrap());
        assert_eq!(engine.read_file("nested/dst").await.unwrap(), Bytes::from_static(b"payload"));
    }

    #[tokio::test]
    async fn read_stream_honours_chunk_size() {
        let dir = tempdir().unwrap();
        let engine = engine(&dir);
        engine.write("f", Bytes::from_static(ALPHABET)).await.unwrap();

        let stream = engine.create_read_stream("f", ReadStreamOptions::new().chunk_size(8));
        assert_eq!(chunk_lengths(stream).await, vec![8, 8, 8, 2]);

        let range = engine
            .create_read_stream("f", ReadStreamOptions::range(2, 11).chunk_size(4))
            .collect_bytes()
            .await
            .unwrap();
        assert_eq!(&range[..], b"cdefghijkl");
    }

    #[tokio::test]
    async fn read_stream_can_stop_early() {
        let dir = tempdir().unwrap();
        let engine = engine(&dir);
        engine.write("f", Bytes::from_static(ALPHABET)).await.unwrap();

        let mut stream = engine.create_read_stream("f", ReadStreamOptions::new().chunk_size(4));
        assert_eq!(&stream.next().await.unwrap().unwrap()[..], b"abcd");
        drop(stream);
        engine.remove("f").await.unwrap();
    }

    #[tokio::test]
    async fn read_stream_rejects_inverted_range() {
        let dir = tempdir().unwrap();
        let engine = engine(&dir);
        let mut stream = engine.create_read_stream("f", ReadStreamOptions::range(5, 2));
        assert!(matches!(
            stream.next().await.unwrap(),
            Err(StorageError::InvalidArgument(_))
        ));
    }

    #[tokio::test]
    async fn reverse_read_from_end() {
        let dir = tempdir().unwrap();
        let engine = engine(&dir);
        engine.write("f", Bytes::from_static(ALPHABET)).await.unwrap();

        let outcome = engine
            .read_reverse("f", ReadOptions::new().length(10))
            .await
            .unwrap();
        assert_eq!(outcome.filled(), b"zyxwvutsrq");

        let outcome = engine
            .read_reverse("f", ReadOptions::new().position(20).length(10))
            .await
            .unwrap();
        assert_eq!(outcome.filled(), b"fedcba");

        let outcome = engine
            .read_reverse("f", ReadOptions::new().position(26).length(10))
            .await
            .unwrap();
        assert_eq!(outcome.bytes_read, 0);
    }

    #[tokio::test]
    async fn reverse_read_missing_file() {
        let dir = tempdir().unwrap();
        let engine = engine(&dir);
        let err = engine.read_reverse("nope", ReadOptions::new()).await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn reverse_stream_walks_to_start() {
        let dir = tempdir().unwrap();
        let engine = engine(&dir);
        engine.write("f", Bytes::from_static(ALPHABET)).await.unwrap();

        let stream =
            engine.create_reverse_read_stream("f", ReverseReadOptions::new().chunk_size(8));
        assert_eq!(chunk_lengths(stream).await, vec![8, 8, 8, 2]);

        let reversed = engine
            .create_reverse_read_stream("f", ReverseReadOptions::new().chunk_size(8))
            .collect_bytes()
            .await
            .unwrap();
        let mut expected = ALPHABET.to_vec();
        expected.reverse();
        assert_eq!(&reversed[..], &expected[..]);

        let tail = engine
            .create_reverse_read_stream("f", ReverseReadOptions::new().end(4).chunk_size(3))
            .collect_bytes()
            .await
            .unwrap();
        assert_eq!(&tail[..], b"zyxwv");
    }

    #[tokio::test]
    async fn write_stream_truncates_or_appends() {
        let dir = tempdir().unwrap();
        let engine = engine(&dir);
        engine.write("f", Bytes::from_static(b"previous")).await.unwrap();

        let mut sink = engine.create_write_stream("f", WriteStreamOptions::new());
        sink.write(Bytes::from_static(b"abc")).await.unwrap();
        sink.write(Bytes::from_static(b"def")).await.unwrap();
        sink.finish().await.unwrap();
        assert_eq!(engine.read_file("f").await.unwrap(), Bytes::from_static(b"abcdef"));

        let mut sink = engine.create_write_stream("f", WriteStreamOptions::append());
        sink.write(Bytes::from_static(b"gh")).await.unwrap();
        sink.finish().await.unwrap();
        assert_eq!(engine.read_file("f").await.unwrap(), Bytes::from_static(b"abcdefgh"));
    }

    #[test]
    fn full_path_stays_under_root() {
        let engine = FileSystemStorageEngine::new("/data");
        assert_eq!(engine.full_path("../../etc/passwd"), PathBuf::from("/data/etc/passwd"));
        assert_eq!(engine.full_path("/t/./x.bin"), PathBuf::from("/data/t/x.bin"));
        assert_eq!(engine.describe(), "filesystem:/data");
    }
}
