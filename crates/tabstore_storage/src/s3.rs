//! S3-compatible storage engine.
//!
//! Works against AWS S3, MinIO, R2's S3 API and anything else speaking the
//! protocol:
//! - ranged `GetObject` for reads (HTTP `Range` header, inclusive bounds)
//! - `HeadObject` for sizes
//! - queued multipart upload for write streams
//! - `CopyObject` + `DeleteObject` for rename
//!
//! HTTP 404 responses are turned into [`StorageError::NotFound`] here and
//! nowhere else; every other SDK error is passed through as
//! [`StorageError::Backend`].

use crate::config::S3Config;
use crate::engine::{ReadStreamOptions, StorageEngine, WriteMode, WriteStreamOptions};
use crate::error::{StorageError, StorageResult};
use crate::multipart::{range_header, MultipartTarget, QueuedUpload, UploadedPart};
use crate::path::relative_path;
use crate::stream::{ByteSink, ByteStream, ChunkWriter};
use async_trait::async_trait;
use aws_sdk_s3::config::http::HttpResponse;
use aws_sdk_s3::config::{BehaviorVersion, Builder, Credentials, Region};
use aws_sdk_s3::error::{ProvideErrorMetadata, SdkError};
use aws_sdk_s3::presigning::PresigningConfig;
use aws_sdk_s3::primitives::ByteStream as S3Body;
use aws_sdk_s3::types::{CompletedMultipartUpload, CompletedPart};
use aws_sdk_s3::Client;
use bytes::{Bytes, BytesMut};
use futures_util::stream;
use std::io;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Lifetime of presigned links when the caller does not choose one.
pub const DEFAULT_LINK_EXPIRY: Duration = Duration::from_secs(3600);

/// An object addressed by bucket, prefix and name.
///
/// Used by [`S3StorageEngine::copy_between_buckets`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectLocation {
    /// Bucket name.
    pub bucket: String,
    /// Key prefix inside the bucket.
    pub prefix: String,
    /// Object name below the prefix.
    pub name: String,
}

impl ObjectLocation {
    /// Creates a location.
    pub fn new(
        bucket: impl Into<String>,
        prefix: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            bucket: bucket.into(),
            prefix: prefix.into(),
            name: name.into(),
        }
    }

    /// The object key.
    #[must_use]
    pub fn key(&self) -> String {
        object_key(&self.prefix, &self.name)
    }
}

/// A storage engine backed by an S3-compatible bucket.
///
/// Every path is stored under `prefix/`. Cloning is cheap; clones share the
/// HTTP client and its connection pool.
#[derive(Debug, Clone)]
pub struct S3StorageEngine {
    bucket: Arc<S3Bucket>,
    prefix: String,
    part_size: usize,
    queue_size: usize,
}

#[derive(Debug)]
struct S3Bucket {
    client: Client,
    name: String,
}

impl S3StorageEngine {
    /// Creates an engine using static credentials from `config`.
    #[must_use]
    pub fn new(config: S3Config) -> Self {
        let credentials = Credentials::new(
            config.access_key_id.as_str(),
            config.secret_access_key.as_str(),
            None,
            None,
            "tabstore",
        );
        let client_config = Builder::new()
            .behavior_version(BehaviorVersion::latest())
            .region(Region::new(config.region.clone()))
            .endpoint_url(config.endpoint.as_str())
            .credentials_provider(credentials)
            .force_path_style(config.force_path_style)
            .build();

        Self::with_client(Client::from_conf(client_config), config)
    }

    /// Creates an engine around an existing client.
    ///
    /// Credentials and endpoint in `config` are ignored.
    #[must_use]
    pub fn with_client(client: Client, config: S3Config) -> Self {
        Self {
            bucket: Arc::new(S3Bucket {
                client,
                name: config.bucket,
            }),
            prefix: config.prefix,
            part_size: config.part_size,
            queue_size: config.queue_size,
        }
    }

    /// The bucket name.
    #[must_use]
    pub fn bucket(&self) -> &str {
        &self.bucket.name
    }

    /// The key prefix.
    #[must_use]
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// The object key `path` is stored under.
    #[must_use]
    pub fn key(&self, path: &str) -> String {
        object_key(&self.prefix, path)
    }

    /// Returns a presigned URL that downloads `path` without credentials.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Backend`] if the request cannot be signed.
    pub async fn download_link(&self, path: &str, expires_in: Duration) -> StorageResult<String> {
        let presigning = PresigningConfig::expires_in(expires_in)
            .map_err(|e| StorageError::backend("PresigningConfig", e))?;
        let request = self
            .bucket
            .client
            .get_object()
            .bucket(&self.bucket.name)
            .key(self.key(path))
            .presigned(presigning)
            .await
            .map_err(|e| StorageError::backend("GetObject", e))?;
        Ok(request.uri().to_string())
    }

    /// Returns a presigned URL that uploads `path` with a plain PUT.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Backend`] if the request cannot be signed.
    pub async fn upload_link(&self, path: &str, expires_in: Duration) -> StorageResult<String> {
        let presigning = PresigningConfig::expires_in(expires_in)
            .map_err(|e| StorageError::backend("PresigningConfig", e))?;
        let request = self
            .bucket
            .client
            .put_object()
            .bucket(&self.bucket.name)
            .key(self.key(path))
            .presigned(presigning)
            .await
            .map_err(|e| StorageError::backend("PutObject", e))?;
        Ok(request.uri().to_string())
    }

    /// Copies an object between arbitrary buckets reachable by this client.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::NotFound`] if the source does not exist.
    pub async fn copy_between_buckets(
        &self,
        source: &ObjectLocation,
        target: &ObjectLocation,
    ) -> StorageResult<()> {
        let source_key = source.key();
        self.bucket
            .client
            .copy_object()
            .copy_source(format!("{}/{}", source.bucket, source_key))
            .bucket(&target.bucket)
            .key(target.key())
            .send()
            .await
            .map_err(|e| classify("CopyObject", &source_key, e))?;
        debug!(
            from_bucket = %source.bucket,
            to_bucket = %target.bucket,
            key = %source_key,
            "copied object between buckets"
        );
        Ok(())
    }
}

#[async_trait]
impl StorageEngine for S3StorageEngine {
    async fn read_file(&self, path: &str) -> StorageResult<Bytes> {
        self.bucket
            .fetch(&self.key(path))
            .await?
            .ok_or_else(|| StorageError::not_found(path))
    }

    async fn write(&self, path: &str, contents: Bytes) -> StorageResult<()> {
        self.bucket.put_object(&self.key(path), contents).await
    }

    async fn append(&self, path: &str, contents: Bytes) -> StorageResult<()> {
        // S3 has no append; rewrite the object. Not atomic.
        let key = self.key(path);
        let combined = match self.bucket.fetch(&key).await? {
            Some(existing) => {
                let mut buf = BytesMut::with_capacity(existing.len() + contents.len());
                buf.extend_from_slice(&existing);
                buf.extend_from_slice(&contents);
                buf.freeze()
            }
            None => contents,
        };
        self.bucket.put_object(&key, combined).await
    }

    async fn remove(&self, path: &str) -> StorageResult<()> {
        self.bucket
            .client
            .delete_object()
            .bucket(&self.bucket.name)
            .key(self.key(path))
            .send()
            .await
            .map_err(|e| classify("DeleteObject", path, e))?;
        Ok(())
    }

    async fn rename(&self, from: &str, to: &str) -> StorageResult<()> {
        // Copy then delete: a crash in between leaves both objects.
        let source_key = self.key(from);
        self.bucket
            .client
            .copy_object()
            .copy_source(format!("{}/{}", self.bucket.name, source_key))
            .bucket(&self.bucket.name)
            .key(self.key(to))
            .send()
            .await
            .map_err(|e| classify("CopyObject", from, e))?;
        self.remove(from).await?;
        debug!(from, to, "renamed object by copy and delete");
        Ok(())
    }

    async fn size(&self, path: &str) -> StorageResult<u64> {
        let output = self
            .bucket
            .client
            .head_object()
            .bucket(&self.bucket.name)
            .key(self.key(path))
            .send()
            .await
            .map_err(|e| classify("HeadObject", path, e))?;
        output
            .content_length()
            .and_then(|len| u64::try_from(len).ok())
            .ok_or_else(|| {
                StorageError::backend(
                    "HeadObject",
                    io::Error::other(format!("no content length for {path}")),
                )
            })
    }

    fn create_read_stream(&self, path: &str, options: ReadStreamOptions) -> ByteStream {
        let bucket = Arc::clone(&self.bucket);
        let key = self.key(path);
        let path = path.to_string();

        ByteStream::deferred(async move {
            options.validate()?;
            let result = bucket
                .client
                .get_object()
                .bucket(&bucket.name)
                .key(&key)
                .range(range_header(options.start, options.end))
                .send()
                .await;
            let output = match result {
                Ok(output) => output,
                // Start past the end of the object, e.g. any range on an empty one.
                Err(e) if status(&e) == Some(416) => return Ok(ByteStream::empty()),
                Err(e) => return Err(classify("GetObject", &path, e)),
            };
            let body = body_stream(output.body);
            Ok(match options.chunk_size {
                Some(max) => body.rechunk(max),
                None => body,
            })
        })
    }

    fn create_write_stream(&self, path: &str, options: WriteStreamOptions) -> ByteSink {
        let bucket = Arc::clone(&self.bucket);
        let key = self.key(path);
        let part_size = self.part_size;
        let queue_size = self.queue_size;

        ByteSink::spawn(path, options.capacity, async move {
            let existing = match options.mode {
                WriteMode::Append => bucket.fetch(&key).await?,
                WriteMode::Truncate => None,
            };
            let mut upload = QueuedUpload::new(bucket, key, part_size, queue_size);
            if let Some(existing) = existing {
                upload.write_chunk(existing).await?;
            }
            Ok(Box::new(upload) as Box<dyn ChunkWriter>)
        })
    }

    fn describe(&self) -> String {
        format!("s3://{}/{}", self.bucket.name, self.prefix)
    }
}

impl S3Bucket {
    async fn fetch(&self, key: &str) -> StorageResult<Option<Bytes>> {
        let output = match self.client.get_object().bucket(&self.name).key(key).send().await {
            Ok(output) => output,
            Err(e) if is_not_found(&e) => return Ok(None),
            Err(e) => return Err(StorageError::backend("GetObject", e)),
        };
        let body = output
            .body
            .collect()
            .await
            .map_err(|e| StorageError::backend("GetObject", e))?;
        Ok(Some(body.into_bytes()))
    }
}

#[async_trait]
impl MultipartTarget for S3Bucket {
    async fn put_object(&self, key: &str, body: Bytes) -> StorageResult<()> {
        self.client
            .put_object()
            .bucket(&self.name)
            .key(key)
            .body(S3Body::from(body))
            .send()
            .await
            .map_err(|e| StorageError::backend("PutObject", e))?;
        Ok(())
    }

    async fn create_upload(&self, key: &str) -> StorageResult<String> {
        let output = self
            .client
            .create_multipart_upload()
            .bucket(&self.name)
            .key(key)
            .send()
            .await
            .map_err(|e| StorageError::backend("CreateMultipartUpload", e))?;
        output.upload_id().map(str::to_string).ok_or_else(|| {
            StorageError::backend(
                "CreateMultipartUpload",
                io::Error::other("response carried no upload id"),
            )
        })
    }

    async fn upload_part(
        &self,
        key: &str,
        upload_id: &str,
        part_number: i32,
        body: Bytes,
    ) -> StorageResult<UploadedPart> {
        let output = self
            .client
            .upload_part()
            .bucket(&self.name)
            .key(key)
            .upload_id(upload_id)
            .part_number(part_number)
            .body(S3Body::from(body))
            .send()
            .await
            .map_err(|e| StorageError::backend("UploadPart", e))?;
        Ok(UploadedPart {
            part_number,
            etag: output.e_tag().unwrap_or_default().to_string(),
        })
    }

    async fn complete_upload(
        &self,
        key: &str,
        upload_id: &str,
        parts: Vec<UploadedPart>,
    ) -> StorageResult<()> {
        let parts = parts
            .into_iter()
            .map(|part| {
                CompletedPart::builder()
                    .part_number(part.part_number)
                    .e_tag(part.etag)
                    .build()
            })
            .collect();
        self.client
            .complete_multipart_upload()
            .bucket(&self.name)
            .key(key)
            .upload_id(upload_id)
            .multipart_upload(CompletedMultipartUpload::builder().set_parts(Some(parts)).build())
            .send()
            .await
            .map_err(|e| StorageError::backend("CompleteMultipartUpload", e))?;
        Ok(())
    }

    async fn abort_upload(&self, key: &str, upload_id: &str) -> StorageResult<()> {
        self.client
            .abort_multipart_upload()
            .bucket(&self.name)
            .key(key)
            .upload_id(upload_id)
            .send()
            .await
            .map_err(|e| StorageError::backend("AbortMultipartUpload", e))?;
        Ok(())
    }
}

fn object_key(prefix: &str, name: &str) -> String {
    relative_path(&format!("{prefix}/{name}"))
}

fn body_stream(body: S3Body) -> ByteStream {
    ByteStream::new(stream::try_unfold(body, |mut body| async move {
        match body.try_next().await {
            Ok(Some(chunk)) => Ok(Some((chunk, body))),
            Ok(None) => Ok(None),
            Err(e) => Err(StorageError::backend("GetObject", e)),
        }
    }))
}

fn status<E>(err: &SdkError<E, HttpResponse>) -> Option<u16> {
    err.raw_response().map(|response| response.status().as_u16())
}

fn is_not_found<E: ProvideErrorMetadata>(err: &SdkError<E, HttpResponse>) -> bool {
    status(err) == Some(404) || matches!(err.code(), Some("NoSuchKey" | "NotFound"))
}

fn classify<E>(operation: &'static str, path: &str, err: SdkError<E, HttpResponse>) -> StorageError
where
    E: ProvideErrorMetadata + std::error::Error + Send + Sync + 'static,
{
    if is_not_found(&err) {
        StorageError::not_found(path)
    } else {
        StorageError::backend(operation, err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine() -> S3StorageEngine {
        S3StorageEngine::new(
            S3Config::new("http://localhost:9000", "us-east-1", "minio", "minio123", "tables")
                .force_path_style(true),
        )
    }

    #[test]
    fn keys_live_under_prefix() {
        let engine = engine();
        assert_eq!(engine.key("t1.bin"), "resources/t1.bin");
        assert_eq!(engine.key("/a//b/./c"), "resources/a/b/c");
        assert_eq!(engine.key("a/../b"), "resources/b");
        assert_eq!(engine.describe(), "s3://tables/resources");
    }

    #[test]
    fn custom_prefix() {
        let engine = S3StorageEngine::new(
            S3Config::new("http://localhost:9000", "us-east-1", "k", "s", "b").prefix("env/dev"),
        );
        assert_eq!(engine.key("x"), "env/dev/x");
        assert_eq!(engine.prefix(), "env/dev");
        assert_eq!(engine.bucket(), "b");
    }

    #[test]
    fn object_location_key() {
        let location = ObjectLocation::new("other", "resources/", "/t.bin");
        assert_eq!(location.key(), "resources/t.bin");
    }

    #[tokio::test]
    async fn download_link_is_presigned() {
        let link = engine()
            .download_link("t1.bin", DEFAULT_LINK_EXPIRY)
            .await
            .unwrap();
        assert!(link.starts_with("http://localhost:9000/tables/resources/t1.bin?"));
        assert!(link.contains("X-Amz-Expires=3600"));
        assert!(link.contains("X-Amz-Signature="));
    }

    #[tokio::test]
    async fn upload_link_is_presigned() {
        let link = engine()
            .upload_link("incoming/u1", Duration::from_secs(60))
            .await
            .unwrap();
        assert!(link.contains("/tables/resources/incoming/u1?"));
        assert!(link.contains("X-Amz-Expires=60"));
    }
}
