//! In-process R2 bucket.

use super::{R2Bucket, R2Object, R2ObjectBody, R2Range};
use crate::error::{StorageError, StorageResult};
use crate::multipart::UploadedPart;
use crate::stream::ByteStream;
use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use uuid::Uuid;

#[derive(Debug)]
struct StoredObject {
    data: Bytes,
    etag: String,
}

#[derive(Debug)]
struct PendingUpload {
    key: String,
    parts: BTreeMap<i32, (String, Bytes)>,
}

/// An [`R2Bucket`] that keeps everything in memory.
///
/// Behaves like the real binding for every call the engine makes, including
/// multipart uploads, so the R2 engine can be tested without Cloudflare.
#[derive(Debug, Default)]
pub struct MemoryR2Bucket {
    objects: Mutex<HashMap<String, StoredObject>>,
    uploads: Mutex<HashMap<String, PendingUpload>>,
    completed: AtomicUsize,
}

impl MemoryR2Bucket {
    /// Creates an empty bucket.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored objects.
    #[must_use]
    pub fn len(&self) -> usize {
        self.objects.lock().len()
    }

    /// Returns `true` if the bucket holds no objects.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.objects.lock().is_empty()
    }

    /// Number of multipart uploads started but neither completed nor aborted.
    #[must_use]
    pub fn pending_uploads(&self) -> usize {
        self.uploads.lock().len()
    }

    /// Number of multipart uploads completed so far.
    #[must_use]
    pub fn completed_uploads(&self) -> usize {
        self.completed.load(Ordering::SeqCst)
    }

    fn store(&self, key: &str, data: Bytes) -> R2Object {
        let etag = Uuid::new_v4().simple().to_string();
        let object = R2Object {
            key: key.to_string(),
            size: data.len() as u64,
            etag: etag.clone(),
        };
        self.objects
            .lock()
            .insert(key.to_string(), StoredObject { data, etag });
        object
    }
}

#[async_trait]
impl R2Bucket for MemoryR2Bucket {
    async fn head(&self, key: &str) -> StorageResult<Option<R2Object>> {
        Ok(self.objects.lock().get(key).map(|stored| R2Object {
            key: key.to_string(),
            size: stored.data.len() as u64,
            etag: stored.etag.clone(),
        }))
    }

    async fn get(&self, key: &str, range: Option<R2Range>) -> StorageResult<Option<R2ObjectBody>> {
        let objects = self.objects.lock();
        let Some(stored) = objects.get(key) else {
            return Ok(None);
        };

        let len = stored.data.len();
        let range = range.unwrap_or_default();
        let start = usize::try_from(range.offset).unwrap_or(usize::MAX).min(len);
        let end = match range.length {
            Some(length) => start
                .saturating_add(usize::try_from(length).unwrap_or(usize::MAX))
                .min(len),
            None => len,
        };

        Ok(Some(R2ObjectBody {
            object: R2Object {
                key: key.to_string(),
                size: len as u64,
                etag: stored.etag.clone(),
            },
            body: ByteStream::from_bytes(stored.data.slice(start..end)),
        }))
    }

    async fn put(&self, key: &str, value: Bytes) -> StorageResult<R2Object> {
        Ok(self.store(key, value))
    }

    async fn delete(&self, key: &str) -> StorageResult<()> {
        self.objects.lock().remove(key);
        Ok(())
    }

    async fn create_multipart_upload(&self, key: &str) -> StorageResult<String> {
        let upload_id = Uuid::new_v4().to_string();
        self.uploads.lock().insert(
            upload_id.clone(),
            PendingUpload {
                key: key.to_string(),
                parts: BTreeMap::new(),
            },
        );
        Ok(upload_id)
    }

    async fn upload_part(
        &self,
        key: &str,
        upload_id: &str,
        part_number: i32,
        value: Bytes,
    ) -> StorageResult<UploadedPart> {
        let mut uploads = self.uploads.lock();
        let upload = uploads
            .get_mut(upload_id)
            .filter(|upload| upload.key == key)
            .ok_or_else(|| StorageError::InvalidArgument(format!("unknown upload {upload_id}")))?;
        let etag = Uuid::new_v4().simple().to_string();
        upload.parts.insert(part_number, (etag.clone(), value));
        Ok(UploadedPart { part_number, etag })
    }

    async fn complete_multipart_upload(
        &self,
        key: &str,
        upload_id: &str,
        parts: Vec<UploadedPart>,
    ) -> StorageResult<R2Object> {
        let upload = {
            let mut uploads = self.uploads.lock();
            match uploads.get(upload_id) {
                Some(upload) if upload.key == key => uploads.remove(upload_id),
                _ => None,
            }
        }
        .ok_or_else(|| StorageError::InvalidArgument(format!("unknown upload {upload_id}")))?;

        let mut data = BytesMut::new();
        for part in &parts {
            match upload.parts.get(&part.part_number) {
                Some((etag, bytes)) if *etag == part.etag => data.extend_from_slice(bytes),
                _ => {
                    return Err(StorageError::InvalidArgument(format!(
                        "part {} of upload {upload_id} does not match",
                        part.part_number
                    )));
                }
            }
        }
        self.completed.fetch_add(1, Ordering::SeqCst);
        Ok(self.store(key, data.freeze()))
    }

    async fn abort_multipart_upload(&self, _key: &str, upload_id: &str) -> StorageResult<()> {
        self.uploads.lock().remove(upload_id);
        Ok(())
    }
}
