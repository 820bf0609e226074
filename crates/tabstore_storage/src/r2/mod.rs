//! Cloudflare R2 storage engine.
//!
//! R2 is reached through a bucket binding rather than an HTTP client. The
//! binding is modelled by the [`R2Bucket`] trait: lookups return `None` for a
//! missing object instead of failing, which this engine translates into
//! [`StorageError::NotFound`].

mod memory;

pub use memory::MemoryR2Bucket;

use crate::config::R2Config;
use crate::engine::{ReadStreamOptions, StorageEngine, WriteMode, WriteStreamOptions};
use crate::error::{StorageError, StorageResult};
use crate::multipart::{MultipartTarget, QueuedUpload, UploadedPart};
use crate::path::relative_path;
use crate::stream::{ByteSink, ByteStream, ChunkWriter};
use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// Metadata of a stored object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct R2Object {
    /// The object key.
    pub key: String,
    /// Size in bytes.
    pub size: u64,
    /// Entity tag.
    pub etag: String,
}

/// An object together with its (possibly ranged) body.
#[derive(Debug)]
pub struct R2ObjectBody {
    /// Object metadata. `size` is the full object size, not the range length.
    pub object: R2Object,
    /// The requested bytes.
    pub body: ByteStream,
}

/// A byte range for [`R2Bucket::get`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct R2Range {
    /// First byte.
    pub offset: u64,
    /// Number of bytes. `None` reads to the end.
    pub length: Option<u64>,
}

/// The subset of the R2 bucket binding the engine uses.
#[async_trait]
pub trait R2Bucket: Send + Sync + fmt::Debug {
    /// Returns the object's metadata, or `None` if it does not exist.
    async fn head(&self, key: &str) -> StorageResult<Option<R2Object>>;

    /// Returns the object's body, or `None` if it does not exist.
    async fn get(&self, key: &str, range: Option<R2Range>) -> StorageResult<Option<R2ObjectBody>>;

    /// Stores `value` under `key`, replacing any existing object.
    async fn put(&self, key: &str, value: Bytes) -> StorageResult<R2Object>;

    /// Deletes the object. Deleting a missing key is not an error.
    async fn delete(&self, key: &str) -> StorageResult<()>;

    /// Starts a multipart upload and returns its id.
    async fn create_multipart_upload(&self, key: &str) -> StorageResult<String>;

    /// Uploads one part of a multipart upload.
    async fn upload_part(
        &self,
        key: &str,
        upload_id: &str,
        part_number: i32,
        value: Bytes,
    ) -> StorageResult<UploadedPart>;

    /// Assembles the listed parts into the final object.
    async fn complete_multipart_upload(
        &self,
        key: &str,
        upload_id: &str,
        parts: Vec<UploadedPart>,
    ) -> StorageResult<R2Object>;

    /// Discards a multipart upload and its parts.
    async fn abort_multipart_upload(&self, key: &str, upload_id: &str) -> StorageResult<()>;
}

/// A storage engine backed by an R2 bucket binding.
#[derive(Debug, Clone)]
pub struct R2StorageEngine {
    bucket: Arc<BucketTarget>,
    part_size: usize,
    queue_size: usize,
}

impl R2StorageEngine {
    /// Creates an engine for `bucket` with default upload settings.
    pub fn new(bucket: Arc<dyn R2Bucket>) -> Self {
        Self::with_config(R2Config::new(bucket))
    }

    /// Creates an engine from a full configuration.
    #[must_use]
    pub fn with_config(config: R2Config) -> Self {
        Self {
            bucket: Arc::new(BucketTarget(config.bucket)),
            part_size: config.part_size,
            queue_size: config.queue_size,
        }
    }

    async fn fetch(&self, key: &str) -> StorageResult<Option<Bytes>> {
        match self.bucket.0.get(key, None).await? {
            Some(object) => object.body.collect_bytes().await.map(Some),
            None => Ok(None),
        }
    }
}

#[async_trait]
impl StorageEngine for R2StorageEngine {
    async fn read_file(&self, path: &str) -> StorageResult<Bytes> {
        self.fetch(&relative_path(path))
            .await?
            .ok_or_else(|| StorageError::not_found(path))
    }

    async fn write(&self, path: &str, contents: Bytes) -> StorageResult<()> {
        self.bucket.0.put(&relative_path(path), contents).await?;
        Ok(())
    }

    async fn append(&self, path: &str, contents: Bytes) -> StorageResult<()> {
        // No native append; rewrite the object. Not atomic.
        let key = relative_path(path);
        let combined = match self.fetch(&key).await? {
            Some(existing) => {
                let mut buf = BytesMut::with_capacity(existing.len() + contents.len());
                buf.extend_from_slice(&existing);
                buf.extend_from_slice(&contents);
                buf.freeze()
            }
            None => contents,
        };
        self.bucket.0.put(&key, combined).await?;
        Ok(())
    }

    async fn remove(&self, path: &str) -> StorageResult<()> {
        self.bucket.0.delete(&relative_path(path)).await
    }

    async fn rename(&self, from: &str, to: &str) -> StorageResult<()> {
        let source = relative_path(from);
        let contents = self
            .fetch(&source)
            .await?
            .ok_or_else(|| StorageError::not_found(from))?;
        self.bucket.0.put(&relative_path(to), contents).await?;
        self.bucket.0.delete(&source).await?;
        debug!(from, to, "renamed object by copy and delete");
        Ok(())
    }

    async fn size(&self, path: &str) -> StorageResult<u64> {
        self.bucket
            .0
            .head(&relative_path(path))
            .await?
            .map(|object| object.size)
            .ok_or_else(|| StorageError::not_found(path))
    }

    fn create_read_stream(&self, path: &str, options: ReadStreamOptions) -> ByteStream {
        let bucket = Arc::clone(&self.bucket);
        let key = relative_path(path);
        let path = path.to_string();

        ByteStream::deferred(async move {
            options.validate()?;
            let range = R2Range {
                offset: options.start,
                length: options.len(),
            };
            let object = bucket
                .0
                .get(&key, Some(range))
                .await?
                .ok_or_else(|| StorageError::not_found(path))?;
            Ok(match options.chunk_size {
                Some(max) => object.body.rechunk(max),
                None => object.body,
            })
        })
    }

    fn create_write_stream(&self, path: &str, options: WriteStreamOptions) -> ByteSink {
        let engine = self.clone();
        let key = relative_path(path);

        ByteSink::spawn(path, options.capacity, async move {
            let existing = match options.mode {
                WriteMode::Append => engine.fetch(&key).await?,
                WriteMode::Truncate => None,
            };
            let mut upload = QueuedUpload::new(
                Arc::clone(&engine.bucket),
                key,
                engine.part_size,
                engine.queue_size,
            );
            if let Some(existing) = existing {
                upload.write_chunk(existing).await?;
            }
            Ok(Box::new(upload) as Box<dyn ChunkWriter>)
        })
    }

    fn describe(&self) -> String {
        "r2".to_string()
    }
}

#[derive(Debug)]
struct BucketTarget(Arc<dyn R2Bucket>);

#[async_trait]
impl MultipartTarget for BucketTarget {
    async fn put_object(&self, key: &str, body: Bytes) -> StorageResult<()> {
        self.0.put(key, body).await?;
        Ok(())
    }

    async fn create_upload(&self, key: &str) -> StorageResult<String> {
        self.0.create_multipart_upload(key).await
    }

    async fn upload_part(
        &self,
        key: &str,
        upload_id: &str,
        part_number: i32,
        body: Bytes,
    ) -> StorageResult<UploadedPart> {
        self.0.upload_part(key, upload_id, part_number, body).await
    }

    async fn complete_upload(
        &self,
        key: &str,
        upload_id: &str,
        parts: Vec<UploadedPart>,
    ) -> StorageResult<()> {
        self.0
            .complete_multipart_upload(key, upload_id, parts)
            .await?;
        Ok(())
    }

    async fn abort_upload(&self, key: &str, upload_id: &str) -> StorageResult<()> {
        self.0.abort_multipart_upload(key, upload_id).await
    }
}
