//! Engine fixtures with automatic cleanup.
//!
//! Provides ready-made storage engines for tests and a few helpers for
//! building test objects.

use std::sync::Arc;
use tabstore_storage::{
    FileSystemStorageEngine, MemoryR2Bucket, MemoryStorageEngine, R2Config, R2StorageEngine,
    S3Config, S3StorageEngine, StorageEngine,
};
use tempfile::TempDir;

use crate::tracking::TrackingR2Bucket;

/// Part size used by [`TestEngine::r2`], small enough that modest test
/// objects span several parts.
pub const TEST_PART_SIZE: usize = 16;

/// A storage engine together with whatever keeps its backing store alive.
pub struct TestEngine {
    /// The engine under test.
    pub engine: Arc<dyn StorageEngine>,
    /// The temporary directory (kept alive to prevent cleanup).
    _temp_dir: Option<TempDir>,
    filesystem: Option<FileSystemStorageEngine>,
    r2_bucket: Option<Arc<TrackingR2Bucket>>,
}

impl TestEngine {
    /// A filesystem engine rooted in a fresh temporary directory.
    pub fn filesystem() -> Self {
        let temp_dir = tempfile::Builder::new()
            .prefix("tabstore-")
            .tempdir()
            .expect("Failed to create temp directory");
        let filesystem = FileSystemStorageEngine::new(temp_dir.path());
        Self {
            engine: Arc::new(filesystem.clone()),
            _temp_dir: Some(temp_dir),
            filesystem: Some(filesystem),
            r2_bucket: None,
        }
    }

    /// An in-memory engine.
    pub fn memory() -> Self {
        Self {
            engine: Arc::new(MemoryStorageEngine::new()),
            _temp_dir: None,
            filesystem: None,
            r2_bucket: None,
        }
    }

    /// An R2 engine over an in-process bucket, with tiny multipart parts.
    pub fn r2() -> Self {
        let bucket = Arc::new(TrackingR2Bucket::new());
        let config = R2Config::new(bucket.clone()).part_size(TEST_PART_SIZE).queue_size(2);
        Self {
            engine: Arc::new(R2StorageEngine::with_config(config)),
            _temp_dir: None,
            filesystem: None,
            r2_bucket: Some(bucket),
        }
    }

    /// An S3 engine configured from `S3_*` environment variables.
    ///
    /// Each call uses its own key prefix so concurrent runs don't collide.
    /// Returns `None` when the variables are not set.
    pub fn s3_from_env() -> Option<Self> {
        let config = S3Config::from_env().ok()?;
        let prefix = format!("tests/{}", uuid::Uuid::new_v4());
        Some(Self {
            engine: Arc::new(S3StorageEngine::new(config.prefix(prefix))),
            _temp_dir: None,
            filesystem: None,
            r2_bucket: None,
        })
    }

    /// The temporary root directory, for filesystem engines.
    pub fn root(&self) -> Option<&std::path::Path> {
        self._temp_dir.as_ref().map(TempDir::path)
    }

    /// The in-process bucket, for R2 engines.
    pub fn r2_bucket(&self) -> Option<&MemoryR2Bucket> {
        self.r2_bucket.as_deref().map(TrackingR2Bucket::inner)
    }

    /// Read-side resources still held by streams: pooled handle leases on
    /// the filesystem engine, undropped object bodies on the R2 engine.
    ///
    /// `None` for engines whose streams can't be observed this way.
    pub fn held_read_resources(&self) -> Option<usize> {
        if let Some(filesystem) = &self.filesystem {
            return Some(filesystem.outstanding_leases());
        }
        self.r2_bucket.as_ref().map(|bucket| bucket.open_bodies())
    }
}

impl std::ops::Deref for TestEngine {
    type Target = Arc<dyn StorageEngine>;

    fn deref(&self) -> &Self::Target {
        &self.engine
    }
}

/// `len` bytes cycling through the lowercase alphabet.
///
/// Every byte is predictable from its offset, which makes ranged reads easy to
/// check.
pub fn alphabet(len: usize) -> Vec<u8> {
    (b'a'..=b'z').cycle().take(len).collect()
}

/// A path that no other test uses.
pub fn unique_path(prefix: &str) -> String {
    format!("{prefix}-{}.bin", uuid::Uuid::new_v4().simple())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alphabet_cycles() {
        assert_eq!(alphabet(3), b"abc");
        assert_eq!(&alphabet(28)[26..], b"ab");
    }

    #[test]
    fn unique_paths_differ() {
        assert_ne!(unique_path("x"), unique_path("x"));
    }

    #[test]
    fn filesystem_fixture_has_root() {
        let fixture = TestEngine::filesystem();
        assert!(fixture.root().unwrap().exists());
        assert!(fixture.describe().starts_with("filesystem:"));
    }

    #[test]
    fn r2_fixture_exposes_bucket() {
        let fixture = TestEngine::r2();
        assert!(fixture.r2_bucket().unwrap().is_empty());
        assert!(TestEngine::memory().r2_bucket().is_none());
    }

    #[test]
    fn read_resources_are_observable_where_supported() {
        assert_eq!(TestEngine::filesystem().held_read_resources(), Some(0));
        assert_eq!(TestEngine::r2().held_read_resources(), Some(0));
        assert_eq!(TestEngine::memory().held_read_resources(), None);
    }
}
