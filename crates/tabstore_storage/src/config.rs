//! Engine configuration.

use crate::engine::StorageEngine;
use crate::error::{StorageError, StorageResult};
use crate::fs::FileSystemStorageEngine;
use crate::memory::MemoryStorageEngine;
use crate::r2::{R2Bucket, R2StorageEngine};
use crate::s3::S3StorageEngine;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Key prefix S3 engines use when none is configured.
pub const DEFAULT_S3_PREFIX: &str = "resources";

/// Smallest part size object stores accept for non-final multipart parts.
pub const MIN_PART_SIZE: usize = 5 * 1024 * 1024;

/// Default multipart part size.
pub const DEFAULT_PART_SIZE: usize = MIN_PART_SIZE;

/// Default number of parts uploaded concurrently.
pub const DEFAULT_QUEUE_SIZE: usize = 4;

/// Configuration for [`FileSystemStorageEngine`].
#[derive(Debug, Clone)]
pub struct FileSystemConfig {
    /// Directory all paths are resolved against.
    pub root_directory: PathBuf,

    /// How long an unused pooled file handle stays open.
    pub handle_idle_timeout: Duration,

    /// Chunk size of read streams when the caller does not choose one.
    pub read_chunk_size: usize,
}

impl Default for FileSystemConfig {
    fn default() -> Self {
        Self {
            root_directory: std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
            handle_idle_timeout: Duration::from_secs(1),
            read_chunk_size: 64 * 1024, // 64 KiB
        }
    }
}

impl FileSystemConfig {
    /// Creates a configuration rooted at `root_directory`.
    pub fn new(root_directory: impl Into<PathBuf>) -> Self {
        Self {
            root_directory: root_directory.into(),
            ..Self::default()
        }
    }

    /// Sets the idle timeout of pooled file handles.
    #[must_use]
    pub const fn handle_idle_timeout(mut self, timeout: Duration) -> Self {
        self.handle_idle_timeout = timeout;
        self
    }

    /// Sets the default read stream chunk size.
    #[must_use]
    pub const fn read_chunk_size(mut self, size: usize) -> Self {
        self.read_chunk_size = size;
        self
    }
}

/// Configuration for [`S3StorageEngine`].
#[derive(Clone)]
pub struct S3Config {
    /// Endpoint URL, e.g. `https://s3.eu-central-1.amazonaws.com` or a MinIO URL.
    pub endpoint: String,

    /// Region name.
    pub region: String,

    /// Access key id.
    pub access_key_id: String,

    /// Secret access key.
    pub secret_access_key: String,

    /// Bucket name.
    pub bucket: String,

    /// Every key is stored under `prefix/`.
    pub prefix: String,

    /// Use path-style URLs (required by MinIO).
    pub force_path_style: bool,

    /// Multipart part size in bytes. Never below [`MIN_PART_SIZE`].
    pub part_size: usize,

    /// Maximum number of parts in flight per write stream.
    pub queue_size: usize,
}

impl S3Config {
    /// Creates a configuration with the default prefix and upload settings.
    pub fn new(
        endpoint: impl Into<String>,
        region: impl Into<String>,
        access_key_id: impl Into<String>,
        secret_access_key: impl Into<String>,
        bucket: impl Into<String>,
    ) -> Self {
        Self {
            endpoint: endpoint.into(),
            region: region.into(),
            access_key_id: access_key_id.into(),
            secret_access_key: secret_access_key.into(),
            bucket: bucket.into(),
            prefix: DEFAULT_S3_PREFIX.to_string(),
            force_path_style: false,
            part_size: DEFAULT_PART_SIZE,
            queue_size: DEFAULT_QUEUE_SIZE,
        }
    }

    /// Reads the configuration from `S3_ENDPOINT`, `S3_REGION`,
    /// `S3_ACCESS_KEY`, `S3_SECRET_ACCESS_KEY`, `S3_BUCKET` and the optional
    /// `S3_PREFIX`.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::InvalidArgument`] naming the first missing variable.
    pub fn from_env() -> StorageResult<Self> {
        let var = |name: &str| {
            std::env::var(name).map_err(|_| {
                StorageError::InvalidArgument(format!("environment variable {name} is not set"))
            })
        };
        let mut config = Self::new(
            var("S3_ENDPOINT")?,
            var("S3_REGION")?,
            var("S3_ACCESS_KEY")?,
            var("S3_SECRET_ACCESS_KEY")?,
            var("S3_BUCKET")?,
        );
        if let Ok(prefix) = std::env::var("S3_PREFIX") {
            config.prefix = prefix;
        }
        Ok(config)
    }

    /// Sets the key prefix.
    #[must_use]
    pub fn prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    /// Sets whether path-style URLs are used.
    #[must_use]
    pub const fn force_path_style(mut self, value: bool) -> Self {
        self.force_path_style = value;
        self
    }

    /// Sets the multipart part size, raised to [`MIN_PART_SIZE`] if smaller.
    #[must_use]
    pub fn part_size(mut self, size: usize) -> Self {
        self.part_size = size.max(MIN_PART_SIZE);
        self
    }

    /// Sets the number of parts uploaded concurrently.
    #[must_use]
    pub fn queue_size(mut self, size: usize) -> Self {
        self.queue_size = size.max(1);
        self
    }
}

impl fmt::Debug for S3Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("S3Config")
            .field("endpoint", &self.endpoint)
            .field("region", &self.region)
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"<redacted>")
            .field("bucket", &self.bucket)
            .field("prefix", &self.prefix)
            .field("force_path_style", &self.force_path_style)
            .field("part_size", &self.part_size)
            .field("queue_size", &self.queue_size)
            .finish()
    }
}

/// Configuration for [`R2StorageEngine`].
#[derive(Debug, Clone)]
pub struct R2Config {
    /// The bucket binding.
    pub bucket: Arc<dyn R2Bucket>,

    /// Multipart part size in bytes.
    pub part_size: usize,

    /// Maximum number of parts in flight per write stream.
    pub queue_size: usize,
}

impl R2Config {
    /// Creates a configuration for `bucket` with default upload settings.
    pub fn new(bucket: Arc<dyn R2Bucket>) -> Self {
        Self {
            bucket,
            part_size: DEFAULT_PART_SIZE,
            queue_size: DEFAULT_QUEUE_SIZE,
        }
    }

    /// Sets the multipart part size.
    #[must_use]
    pub fn part_size(mut self, size: usize) -> Self {
        self.part_size = size.max(1);
        self
    }

    /// Sets the number of parts uploaded concurrently.
    #[must_use]
    pub fn queue_size(mut self, size: usize) -> Self {
        self.queue_size = size.max(1);
        self
    }
}

/// Selects and configures a storage engine.
#[derive(Debug, Clone)]
pub enum StorageConfig {
    /// A local directory.
    FileSystem(FileSystemConfig),
    /// Process memory. Nothing is persisted.
    Memory,
    /// An S3-compatible bucket.
    S3(S3Config),
    /// An R2 bucket binding.
    R2(R2Config),
}

impl StorageConfig {
    /// Local storage rooted at `root`.
    pub fn file_system(root: impl Into<PathBuf>) -> Self {
        Self::FileSystem(FileSystemConfig::new(root))
    }

    /// Builds the configured engine.
    #[must_use]
    pub fn build(&self) -> Arc<dyn StorageEngine> {
        match self {
            Self::FileSystem(config) => Arc::new(FileSystemStorageEngine::with_config(config.clone())),
            Self::Memory => Arc::new(MemoryStorageEngine::new()),
            Self::S3(config) => Arc::new(S3StorageEngine::new(config.clone())),
            Self::R2(config) => Arc::new(R2StorageEngine::with_config(config.clone())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::r2::MemoryR2Bucket;

    #[test]
    fn file_system_defaults() {
        let config = FileSystemConfig::new("/tmp/tables");
        assert_eq!(config.root_directory, PathBuf::from("/tmp/tables"));
        assert_eq!(config.handle_idle_timeout, Duration::from_secs(1));
        assert_eq!(config.read_chunk_size, 64 * 1024);
    }

    #[test]
    fn s3_defaults_and_clamping() {
        let config = S3Config::new("http://localhost:9000", "us-east-1", "key", "secret", "b");
        assert_eq!(config.prefix, "resources");
        assert_eq!(config.part_size, MIN_PART_SIZE);
        assert_eq!(config.queue_size, 4);

        let config = config.part_size(1024).queue_size(0).prefix("tables");
        assert_eq!(config.part_size, MIN_PART_SIZE);
        assert_eq!(config.queue_size, 1);
        assert_eq!(config.prefix, "tables");
    }

    #[test]
    fn s3_debug_hides_secret() {
        let config = S3Config::new("e", "r", "key", "very-secret", "b");
        let debug = format!("{config:?}");
        assert!(!debug.contains("very-secret"));
        assert!(debug.contains("<redacted>"));
    }

    #[test]
    fn builds_selected_engine() {
        let dir = tempfile::tempdir().unwrap();
        let engine = StorageConfig::file_system(dir.path()).build();
        assert!(engine.describe().starts_with("filesystem:"));

        assert_eq!(StorageConfig::Memory.build().describe(), "memory");

        let bucket = Arc::new(MemoryR2Bucket::new());
        let engine = StorageConfig::R2(R2Config::new(bucket)).build();
        assert_eq!(engine.describe(), "r2");
    }
}
