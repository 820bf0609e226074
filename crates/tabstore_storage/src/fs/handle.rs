//! Reusable file handles for the filesystem engine.
//!
//! Opening and closing a file for every small positioned read is wasteful
//! when a table is read row by row. The pool keeps one handle per path open
//! and shares it between overlapping reads through reference-counted leases.
//! Once the last lease is released an idle timer starts; if nobody checks the
//! handle out again before it fires, the descriptor is closed.

use bytes::Bytes;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tracing::{debug, trace};

/// The open mode a pooled handle was created with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OpenMode {
    /// Read-only. The file must exist.
    Read,
    /// Append-only. The file is created if missing.
    Append,
}

impl OpenMode {
    fn options(self) -> OpenOptions {
        let mut options = OpenOptions::new();
        match self {
            OpenMode::Read => options.read(true),
            OpenMode::Append => options.append(true).create(true),
        };
        options
    }
}

type Registry = Mutex<HashMap<PathBuf, Arc<ReusableFileHandle>>>;

#[derive(Debug, Default)]
struct HandleState {
    file: Option<Arc<File>>,
    refs: usize,
    // Bumped on every checkout; an idle timer only closes the file if the
    // generation it captured is still current.
    generation: u64,
}

/// One lazily opened file descriptor shared by concurrent operations.
///
/// Invariant: the descriptor is never closed while a lease is outstanding.
#[derive(Debug)]
pub struct ReusableFileHandle {
    path: PathBuf,
    mode: OpenMode,
    idle_timeout: Duration,
    state: Mutex<HandleState>,
    append_lock: tokio::sync::Mutex<()>,
    registry: Weak<Registry>,
}

impl ReusableFileHandle {
    fn new(
        path: PathBuf,
        mode: OpenMode,
        idle_timeout: Duration,
        registry: Weak<Registry>,
    ) -> Arc<Self> {
        Arc::new(Self {
            path,
            mode,
            idle_timeout,
            state: Mutex::new(HandleState::default()),
            append_lock: tokio::sync::Mutex::new(()),
            registry,
        })
    }

    /// The absolute path of the file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The mode the file is opened with.
    #[must_use]
    pub fn mode(&self) -> OpenMode {
        self.mode
    }

    /// Returns `true` while the descriptor is open.
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.state.lock().file.is_some()
    }

    /// Number of leases currently checked out.
    #[must_use]
    pub fn outstanding(&self) -> usize {
        self.state.lock().refs
    }

    /// Checks the handle out, opening the file if it is not open yet.
    ///
    /// The returned lease releases the checkout when dropped.
    ///
    /// # Errors
    ///
    /// Returns the OS error if the file cannot be opened.
    pub async fn checkout(self: &Arc<Self>) -> io::Result<FileHandleLease> {
        let cached = {
            let mut state = self.state.lock();
            state.refs += 1;
            state.generation += 1;
            state.file.clone()
        };
        if let Some(file) = cached {
            return Ok(FileHandleLease {
                handle: Arc::clone(self),
                file,
            });
        }

        let path = self.path.clone();
        let mode = self.mode;
        let opened = tokio::task::spawn_blocking(move || mode.options().open(path))
            .await
            .map_err(io::Error::other)
            .and_then(|result| result);

        match opened {
            Ok(file) => {
                let file = {
                    let mut state = self.state.lock();
                    // Another checkout may have opened the file concurrently.
                    let file = state.file.get_or_insert_with(|| Arc::new(file));
                    Arc::clone(file)
                };
                trace!(path = %self.path.display(), mode = ?self.mode, "opened pooled file handle");
                Ok(FileHandleLease {
                    handle: Arc::clone(self),
                    file,
                })
            }
            Err(e) => {
                self.release();
                Err(e)
            }
        }
    }

    fn release(self: &Arc<Self>) {
        let generation = {
            let mut state = self.state.lock();
            state.refs = state.refs.saturating_sub(1);
            if state.refs > 0 {
                return;
            }
            state.generation
        };

        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                let handle = Arc::downgrade(self);
                let timeout = self.idle_timeout;
                runtime.spawn(async move {
                    tokio::time::sleep(timeout).await;
                    if let Some(handle) = handle.upgrade() {
                        handle.close_if_idle(generation);
                    }
                });
            }
            Err(_) => self.close_if_idle(generation),
        }
    }

    // Lock order is registry, then state, the same as `HandlePool::evict`.
    fn close_if_idle(self: &Arc<Self>, generation: u64) {
        let registry = self.registry.upgrade();
        let mut handles = registry.as_ref().map(|registry| registry.lock());
        let mut state = self.state.lock();
        if state.refs != 0 || state.generation != generation {
            return;
        }
        if state.file.take().is_some() {
            trace!(path = %self.path.display(), "closed idle file handle");
        }
        if let Some(handles) = handles.as_mut() {
            if handles.get(&self.path).is_some_and(|entry| Arc::ptr_eq(entry, self)) {
                handles.remove(&self.path);
            }
        }
    }

    fn retire(&self) {
        let mut state = self.state.lock();
        state.generation += 1;
        if state.refs == 0 {
            state.file = None;
        }
    }
}

/// A checked-out [`ReusableFileHandle`].
///
/// Dropping the lease is the release; it happens exactly once on every path,
/// including early returns and errors.
#[derive(Debug)]
pub struct FileHandleLease {
    handle: Arc<ReusableFileHandle>,
    file: Arc<File>,
}

impl FileHandleLease {
    /// The handle this lease belongs to.
    #[must_use]
    pub fn handle(&self) -> &Arc<ReusableFileHandle> {
        &self.handle
    }

    /// Reads up to `length` bytes at `position` into `buffer`.
    ///
    /// Uses positional reads, so concurrent leases never share a cursor.
    /// Returns the buffer and the number of bytes read, which is short only
    /// at end of file.
    ///
    /// # Errors
    ///
    /// Returns the OS error if the read fails.
    pub async fn read_at(
        &self,
        mut buffer: Vec<u8>,
        length: usize,
        position: u64,
    ) -> io::Result<(Vec<u8>, usize)> {
        let file = Arc::clone(&self.file);
        let length = length.min(buffer.len());
        tokio::task::spawn_blocking(move || {
            let n = read_full_at(&file, &mut buffer[..length], position)?;
            Ok((buffer, n))
        })
        .await
        .map_err(io::Error::other)?
    }

    /// Appends `contents` to the end of the file.
    ///
    /// Appends through the same handle are serialized.
    ///
    /// # Errors
    ///
    /// Returns the OS error if the write fails.
    pub async fn append(&self, contents: Bytes) -> io::Result<()> {
        if self.handle.mode != OpenMode::Append {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "handle was not opened for appending",
            ));
        }
        let _guard = self.handle.append_lock.lock().await;
        let file = Arc::clone(&self.file);
        tokio::task::spawn_blocking(move || (&*file).write_all(&contents))
            .await
            .map_err(io::Error::other)?
    }
}

impl Drop for FileHandleLease {
    fn drop(&mut self) {
        self.handle.release();
    }
}

/// Pool of [`ReusableFileHandle`]s owned by one engine, keyed by path.
#[derive(Debug)]
pub struct HandlePool {
    idle_timeout: Duration,
    handles: Arc<Registry>,
}

impl HandlePool {
    /// Creates an empty pool whose handles close after `idle_timeout`.
    #[must_use]
    pub fn new(idle_timeout: Duration) -> Self {
        Self {
            idle_timeout,
            handles: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Returns the handle for `path`, creating it if needed.
    ///
    /// A cached handle opened with a different mode is replaced; the old one
    /// keeps serving its outstanding leases and closes on its own timer.
    pub fn handle(&self, path: &Path, mode: OpenMode) -> Arc<ReusableFileHandle> {
        let mut handles = self.handles.lock();
        match handles.get(path) {
            Some(handle) if handle.mode == mode => Arc::clone(handle),
            previous => {
                if previous.is_some() {
                    debug!(path = %path.display(), ?mode, "replacing pooled handle with new mode");
                }
                let handle = ReusableFileHandle::new(
                    path.to_path_buf(),
                    mode,
                    self.idle_timeout,
                    Arc::downgrade(&self.handles),
                );
                handles.insert(path.to_path_buf(), Arc::clone(&handle));
                handle
            }
        }
    }

    /// Checks out the handle for `path` in `mode`.
    ///
    /// # Errors
    ///
    /// Returns the OS error if the file cannot be opened.
    pub async fn checkout(&self, path: &Path, mode: OpenMode) -> io::Result<FileHandleLease> {
        self.handle(path, mode).checkout().await
    }

    /// Drops the pooled handle for `path`.
    ///
    /// Called when the file is removed or replaced so a stale descriptor is
    /// never served. An idle handle closes immediately, a busy one once its
    /// last lease is released.
    pub fn evict(&self, path: &Path) {
        let mut handles = self.handles.lock();
        if let Some(handle) = handles.remove(path) {
            handle.retire();
        }
    }

    /// Number of pooled handles with an open descriptor.
    #[must_use]
    pub fn open_handles(&self) -> usize {
        self.handles.lock().values().filter(|h| h.is_open()).count()
    }

    /// Number of paths the pool is tracking. Idle handles drop out once their
    /// timer closes them.
    #[must_use]
    pub fn pooled_paths(&self) -> usize {
        self.handles.lock().len()
    }

    /// Total leases checked out across all pooled handles.
    #[must_use]
    pub fn outstanding_leases(&self) -> usize {
        self.handles.lock().values().map(|h| h.outstanding()).sum()
    }
}

const MAX_FILE_OFFSET: u64 = i64::MAX as u64;

fn read_full_at(file: &File, buf: &mut [u8], mut offset: u64) -> io::Result<usize> {
    let mut filled = 0;
    // No file extends past the largest signed offset; the OS rejects such reads.
    while filled < buf.len() && offset <= MAX_FILE_OFFSET {
        match positional_read(file, &mut buf[filled..], offset) {
            Ok(0) => break,
            Ok(n) => {
                filled += n;
                offset = offset.saturating_add(n as u64);
            }
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

#[cfg(unix)]
fn positional_read(file: &File, buf: &mut [u8], offset: u64) -> io::Result<usize> {
    std::os::unix::fs::FileExt::read_at(file, buf, offset)
}

#[cfg(windows)]
fn positional_read(file: &File, buf: &mut [u8], offset: u64) -> io::Result<usize> {
    std::os::windows::fs::FileExt::seek_read(file, buf, offset)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    const IDLE: Duration = Duration::from_millis(20);
    const PAST_IDLE: Duration = Duration::from_millis(150);

    fn fixture(contents: &[u8]) -> (tempfile::TempDir, PathBuf) {
        let dir = tempdir().unwrap();
        let path = dir.path().join("data.bin");
        std::fs::write(&path, contents).unwrap();
        (dir, path)
    }

    #[tokio::test]
    async fn concurrent_leases_share_one_descriptor() {
        let (_dir, path) = fixture(b"hello world");
        let pool = HandlePool::new(IDLE);

        let a = pool.checkout(&path, OpenMode::Read).await.unwrap();
        let b = pool.checkout(&path, OpenMode::Read).await.unwrap();
        assert!(Arc::ptr_eq(a.handle(), b.handle()));
        assert_eq!(a.handle().outstanding(), 2);
        assert_eq!(pool.open_handles(), 1);

        let (buf, n) = b.read_at(vec![0; 5], 5, 6).await.unwrap();
        assert_eq!(&buf[..n], b"world");
        let (buf, n) = a.read_at(vec![0; 5], 5, 0).await.unwrap();
        assert_eq!(&buf[..n], b"hello");
    }

    #[tokio::test]
    async fn never_closed_while_checked_out() {
        let (_dir, path) = fixture(b"abc");
        let pool = HandlePool::new(IDLE);

        let lease = pool.checkout(&path, OpenMode::Read).await.unwrap();
        let other = pool.checkout(&path, OpenMode::Read).await.unwrap();
        drop(other);
        tokio::time::sleep(PAST_IDLE).await;
        assert!(lease.handle().is_open());

        let handle = Arc::clone(lease.handle());
        drop(lease);
        tokio::time::sleep(PAST_IDLE).await;
        assert!(!handle.is_open());
        assert_eq!(pool.open_handles(), 0);
    }

    #[tokio::test]
    async fn new_checkout_cancels_pending_close() {
        let (_dir, path) = fixture(b"abc");
        let pool = HandlePool::new(IDLE);

        drop(pool.checkout(&path, OpenMode::Read).await.unwrap());
        let lease = pool.checkout(&path, OpenMode::Read).await.unwrap();
        tokio::time::sleep(PAST_IDLE).await;
        assert!(lease.handle().is_open());
    }

    #[tokio::test]
    async fn closed_handle_reopens_on_demand() {
        let (_dir, path) = fixture(b"abc");
        let pool = HandlePool::new(IDLE);

        drop(pool.checkout(&path, OpenMode::Read).await.unwrap());
        tokio::time::sleep(PAST_IDLE).await;
        assert_eq!(pool.open_handles(), 0);
        assert_eq!(pool.pooled_paths(), 0);

        let lease = pool.checkout(&path, OpenMode::Read).await.unwrap();
        let (buf, n) = lease.read_at(vec![0; 8], 8, 0).await.unwrap();
        assert_eq!(&buf[..n], b"abc");
    }

    #[tokio::test]
    async fn mode_change_replaces_entry() {
        let (_dir, path) = fixture(b"abc");
        let pool = HandlePool::new(IDLE);

        let reader = pool.handle(&path, OpenMode::Read);
        let appender = pool.handle(&path, OpenMode::Append);
        assert!(!Arc::ptr_eq(&reader, &appender));
        assert_eq!(appender.mode(), OpenMode::Append);
        assert!(Arc::ptr_eq(&appender, &pool.handle(&path, OpenMode::Append)));
    }

    #[tokio::test]
    async fn append_through_lease() {
        let (_dir, path) = fixture(b"abc");
        let pool = HandlePool::new(IDLE);

        let lease = pool.checkout(&path, OpenMode::Append).await.unwrap();
        lease.append(Bytes::from_static(b"def")).await.unwrap();
        lease.append(Bytes::from_static(b"gh")).await.unwrap();
        drop(lease);

        assert_eq!(std::fs::read(&path).unwrap(), b"abcdefgh");
    }

    #[tokio::test]
    async fn read_lease_refuses_append() {
        let (_dir, path) = fixture(b"abc");
        let pool = HandlePool::new(IDLE);
        let lease = pool.checkout(&path, OpenMode::Read).await.unwrap();
        assert!(lease.append(Bytes::from_static(b"x")).await.is_err());
    }

    #[tokio::test]
    async fn failed_open_releases_checkout() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("missing");
        let pool = HandlePool::new(IDLE);

        let err = pool.checkout(&path, OpenMode::Read).await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
        assert_eq!(pool.handle(&path, OpenMode::Read).outstanding(), 0);
    }

    #[tokio::test]
    async fn evict_closes_idle_handle() {
        let (_dir, path) = fixture(b"abc");
        let pool = HandlePool::new(Duration::from_secs(60));

        let handle = Arc::clone(pool.checkout(&path, OpenMode::Read).await.unwrap().handle());
        assert!(handle.is_open());
        pool.evict(&path);
        assert!(!handle.is_open());
        assert_eq!(pool.open_handles(), 0);
    }

    #[tokio::test]
    async fn idle_close_forgets_each_path() {
        let dir = tempdir().unwrap();
        let pool = HandlePool::new(IDLE);
        for i in 0..8 {
            let path = dir.path().join(format!("file-{i}"));
            std::fs::write(&path, b"x").unwrap();
            drop(pool.checkout(&path, OpenMode::Read).await.unwrap());
        }
        assert_eq!(pool.pooled_paths(), 8);

        tokio::time::sleep(PAST_IDLE).await;
        assert_eq!(pool.pooled_paths(), 0);
        assert_eq!(pool.outstanding_leases(), 0);
    }

    #[tokio::test]
    async fn idle_close_keeps_replacement_entry() {
        let (_dir, path) = fixture(b"abc");
        let pool = HandlePool::new(IDLE);

        drop(pool.checkout(&path, OpenMode::Read).await.unwrap());
        let appender = pool.checkout(&path, OpenMode::Append).await.unwrap();
        tokio::time::sleep(PAST_IDLE).await;

        assert_eq!(pool.pooled_paths(), 1);
        assert!(Arc::ptr_eq(appender.handle(), &pool.handle(&path, OpenMode::Append)));
    }

    #[tokio::test]
    async fn read_far_past_end_is_empty() {
        let (_dir, path) = fixture(b"abc");
        let pool = HandlePool::new(IDLE);
        let lease = pool.checkout(&path, OpenMode::Read).await.unwrap();

        let (_, n) = lease.read_at(vec![0; 4], 4, u64::MAX).await.unwrap();
        assert_eq!(n, 0);
    }

    #[tokio::test]
    async fn read_past_end_is_short() {
        let (_dir, path) = fixture(b"abc");
        let pool = HandlePool::new(IDLE);
        let lease = pool.checkout(&path, OpenMode::Read).await.unwrap();

        let (_, n) = lease.read_at(vec![0; 10], 10, 1).await.unwrap();
        assert_eq!(n, 2);
        let (_, n) = lease.read_at(vec![0; 10], 10, 50).await.unwrap();
        assert_eq!(n, 0);
    }
}
