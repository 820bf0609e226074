//! Queued multipart upload shared by the object-store engines.
//!
//! The size of a streamed object is unknown up front, so writes are buffered
//! into parts of a fixed size and uploaded while the caller keeps writing. At
//! most `queue_size` parts are in flight; once the queue is full the consumer
//! waits for the oldest upload, which in turn suspends the producer through
//! the sink's bounded channel. Objects smaller than one part skip the
//! multipart protocol and are stored with a single PUT.

use crate::error::{StorageError, StorageResult};
use crate::stream::ChunkWriter;
use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use std::sync::Arc;
use tokio::task::JoinSet;
use tracing::{debug, trace, warn};

/// A part acknowledged by the object store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadedPart {
    /// 1-based part number.
    pub part_number: i32,
    /// Entity tag returned for the part.
    pub etag: String,
}

/// The object-store calls a [`QueuedUpload`] needs.
#[async_trait]
pub(crate) trait MultipartTarget: Send + Sync + 'static {
    async fn put_object(&self, key: &str, body: Bytes) -> StorageResult<()>;

    async fn create_upload(&self, key: &str) -> StorageResult<String>;

    async fn upload_part(
        &self,
        key: &str,
        upload_id: &str,
        part_number: i32,
        body: Bytes,
    ) -> StorageResult<UploadedPart>;

    async fn complete_upload(
        &self,
        key: &str,
        upload_id: &str,
        parts: Vec<UploadedPart>,
    ) -> StorageResult<()>;

    async fn abort_upload(&self, key: &str, upload_id: &str) -> StorageResult<()>;
}

/// [`ChunkWriter`] that turns a byte stream into a multipart upload.
pub(crate) struct QueuedUpload<T: MultipartTarget> {
    target: Arc<T>,
    key: String,
    part_size: usize,
    queue_size: usize,
    buffer: BytesMut,
    upload_id: Option<String>,
    next_part: i32,
    in_flight: JoinSet<StorageResult<UploadedPart>>,
    completed: Vec<UploadedPart>,
}

impl<T: MultipartTarget> QueuedUpload<T> {
    pub(crate) fn new(target: Arc<T>, key: String, part_size: usize, queue_size: usize) -> Self {
        Self {
            target,
            key,
            part_size: part_size.max(1),
            queue_size: queue_size.max(1),
            buffer: BytesMut::new(),
            upload_id: None,
            next_part: 1,
            in_flight: JoinSet::new(),
            completed: Vec::new(),
        }
    }

    async fn send_part(&mut self, body: Bytes) -> StorageResult<()> {
        let upload_id = match &self.upload_id {
            Some(id) => id.clone(),
            None => {
                let id = self.target.create_upload(&self.key).await?;
                debug!(key = %self.key, upload_id = %id, "started multipart upload");
                self.upload_id = Some(id.clone());
                id
            }
        };

        while self.in_flight.len() >= self.queue_size {
            self.join_one().await?;
        }

        let part_number = self.next_part;
        self.next_part += 1;
        trace!(key = %self.key, part = part_number, bytes = body.len(), "uploading part");

        let target = Arc::clone(&self.target);
        let key = self.key.clone();
        self.in_flight.spawn(async move {
            target
                .upload_part(&key, &upload_id, part_number, body)
                .await
        });
        Ok(())
    }

    async fn join_one(&mut self) -> StorageResult<()> {
        match self.in_flight.join_next().await {
            Some(Ok(Ok(part))) => {
                self.completed.push(part);
                Ok(())
            }
            Some(Ok(Err(e))) => Err(e),
            Some(Err(e)) => Err(StorageError::backend("UploadPart", e)),
            None => Ok(()),
        }
    }

    async fn complete(&mut self) -> StorageResult<()> {
        let Some(upload_id) = self.upload_id.clone() else {
            let body = self.buffer.split().freeze();
            trace!(key = %self.key, bytes = body.len(), "object fits in one part, using single put");
            return self.target.put_object(&self.key, body).await;
        };

        if !self.buffer.is_empty() {
            let rest = self.buffer.split().freeze();
            self.send_part(rest).await?;
        }
        while !self.in_flight.is_empty() {
            self.join_one().await?;
        }

        let mut parts = std::mem::take(&mut self.completed);
        parts.sort_by_key(|part| part.part_number);
        let count = parts.len();
        self.target
            .complete_upload(&self.key, &upload_id, parts)
            .await?;
        debug!(key = %self.key, upload_id = %upload_id, parts = count, "completed multipart upload");
        Ok(())
    }

    async fn cancel(&mut self) {
        self.in_flight.abort_all();
        while self.in_flight.join_next().await.is_some() {}

        if let Some(upload_id) = self.upload_id.take() {
            match self.target.abort_upload(&self.key, &upload_id).await {
                Ok(()) => debug!(key = %self.key, upload_id = %upload_id, "aborted multipart upload"),
                Err(e) => {
                    warn!(key = %self.key, upload_id = %upload_id, error = %e, "failed to abort multipart upload");
                }
            }
        }
    }
}

#[async_trait]
impl<T: MultipartTarget> ChunkWriter for QueuedUpload<T> {
    async fn write_chunk(&mut self, chunk: Bytes) -> StorageResult<()> {
        self.buffer.extend_from_slice(&chunk);
        while self.buffer.len() >= self.part_size {
            let part = self.buffer.split_to(self.part_size).freeze();
            self.send_part(part).await?;
        }
        Ok(())
    }

    async fn finish(mut self: Box<Self>) -> StorageResult<()> {
        match self.complete().await {
            Ok(()) => Ok(()),
            Err(e) => {
                self.cancel().await;
                Err(e)
            }
        }
    }

    async fn abort(mut self: Box<Self>) -> StorageResult<()> {
        self.cancel().await;
        Ok(())
    }
}

/// Formats an HTTP `Range` header for the inclusive range `[start, end]`.
///
/// An open `end` reads to the end of the object.
#[must_use]
pub(crate) fn range_header(start: u64, end: Option<u64>) -> String {
    match end {
        Some(end) => format!("bytes={start}-{end}"),
        None => format!("bytes={start}-"),
    }
}
