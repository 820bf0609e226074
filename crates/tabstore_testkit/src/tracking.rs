//! An R2 bucket that counts the object bodies it hands out.
//!
//! Wraps a [`MemoryR2Bucket`] and tags every body returned by `get` with a
//! guard; the guard is dropped together with the body, so
//! [`TrackingR2Bucket::open_bodies`] tells whether a cancelled read stream
//! really let go of what it was reading.

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::Stream;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};
use tabstore_storage::{
    ByteStream, MemoryR2Bucket, R2Bucket, R2Object, R2ObjectBody, R2Range, StorageResult,
    UploadedPart,
};

/// A [`MemoryR2Bucket`] that tracks live object bodies.
#[derive(Debug, Default)]
pub struct TrackingR2Bucket {
    inner: MemoryR2Bucket,
    open: Arc<AtomicUsize>,
    served: AtomicUsize,
}

impl TrackingR2Bucket {
    /// Creates an empty bucket.
    pub fn new() -> Self {
        Self::default()
    }

    /// The wrapped bucket.
    pub fn inner(&self) -> &MemoryR2Bucket {
        &self.inner
    }

    /// Bodies returned by `get` that have not been dropped yet.
    pub fn open_bodies(&self) -> usize {
        self.open.load(Ordering::SeqCst)
    }

    /// Bodies returned by `get` so far.
    pub fn served_bodies(&self) -> usize {
        self.served.load(Ordering::SeqCst)
    }
}

struct BodyGuard(Arc<AtomicUsize>);

impl Drop for BodyGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

struct TrackedBody {
    body: ByteStream,
    _guard: BodyGuard,
}

impl Stream for TrackedBody {
    type Item = StorageResult<Bytes>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.get_mut().body).poll_next(cx)
    }
}

#[async_trait]
impl R2Bucket for TrackingR2Bucket {
    async fn head(&self, key: &str) -> StorageResult<Option<R2Object>> {
        self.inner.head(key).await
    }

    async fn get(&self, key: &str, range: Option<R2Range>) -> StorageResult<Option<R2ObjectBody>> {
        let Some(object) = self.inner.get(key, range).await? else {
            return Ok(None);
        };
        self.open.fetch_add(1, Ordering::SeqCst);
        self.served.fetch_add(1, Ordering::SeqCst);
        let guard = BodyGuard(Arc::clone(&self.open));
        Ok(Some(R2ObjectBody {
            object: object.object,
            body: ByteStream::new(TrackedBody {
                body: object.body,
                _guard: guard,
            }),
        }))
    }

    async fn put(&self, key: &str, value: Bytes) -> StorageResult<R2Object> {
        self.inner.put(key, value).await
    }

    async fn delete(&self, key: &str) -> StorageResult<()> {
        self.inner.delete(key).await
    }

    async fn create_multipart_upload(&self, key: &str) -> StorageResult<String> {
        self.inner.create_multipart_upload(key).await
    }

    async fn upload_part(
        &self,
        key: &str,
        upload_id: &str,
        part_number: i32,
        value: Bytes,
    ) -> StorageResult<UploadedPart> {
        self.inner.upload_part(key, upload_id, part_number, value).await
    }

    async fn complete_multipart_upload(
        &self,
        key: &str,
        upload_id: &str,
        parts: Vec<UploadedPart>,
    ) -> StorageResult<R2Object> {
        self.inner.complete_multipart_upload(key, upload_id, parts).await
    }

    async fn abort_multipart_upload(&self, key: &str, upload_id: &str) -> StorageResult<()> {
        self.inner.abort_multipart_upload(key, upload_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::StreamExt;

    #[tokio::test]
    async fn guard_follows_body() {
        let bucket = TrackingR2Bucket::new();
        bucket.put("k", Bytes::from_static(b"abc")).await.unwrap();
        assert!(bucket.get("missing", None).await.unwrap().is_none());
        assert_eq!(bucket.served_bodies(), 0);

        let mut object = bucket.get("k", None).await.unwrap().unwrap();
        assert_eq!(bucket.open_bodies(), 1);
        assert_eq!(object.body.next().await.unwrap().unwrap(), Bytes::from_static(b"abc"));
        drop(object);
        assert_eq!(bucket.open_bodies(), 0);
        assert_eq!(bucket.served_bodies(), 1);
    }
}
