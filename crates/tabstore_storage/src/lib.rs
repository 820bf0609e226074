//! # Tabstore Storage
//!
//! Storage engine contract and backends for Tabstore.
//!
//! A storage engine is an **opaque byte store** addressed by relative path.
//! Engines know nothing about the tabular format stored on top of them; they
//! only have to agree on one contract:
//!
//! - explicitly positioned reads (no cursor state between calls)
//! - whole-object write, append, remove, rename and size
//! - pull-based read streams over an inclusive byte range
//! - push-based write streams whose durability is signalled separately
//!   from the caller finishing
//! - a missing target is always [`StorageError::NotFound`]
//!
//! ## Available Engines
//!
//! - [`FileSystemStorageEngine`] - local directory with a pooled file handle cache
//! - [`MemoryStorageEngine`] - for testing and ephemeral storage
//! - [`S3StorageEngine`] - S3-compatible object storage
//! - [`R2StorageEngine`] - Cloudflare R2 bucket binding
//!
//! ## Example
//!
//! ```rust
//! use bytes::Bytes;
//! use tabstore_storage::{ReadOptions, StorageConfig, StorageEngine};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let engine = StorageConfig::Memory.build();
//! engine.write("hello.bin", Bytes::from_static(b"hello world")).await.unwrap();
//! let outcome = engine
//!     .read("hello.bin", ReadOptions::new().position(6).length(5))
//!     .await
//!     .unwrap();
//! assert_eq!(outcome.filled(), b"world");
//! # }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod engine;
mod error;
mod fs;
mod memory;
mod multipart;
mod path;
mod r2;
mod s3;
mod stream;

pub use config::{
    FileSystemConfig, R2Config, S3Config, StorageConfig, DEFAULT_PART_SIZE, DEFAULT_QUEUE_SIZE,
    DEFAULT_S3_PREFIX, MIN_PART_SIZE,
};
pub use engine::{
    ReadOptions, ReadOutcome, ReadStreamOptions, StorageEngine, WriteMode, WriteStreamOptions,
    DEFAULT_READ_LENGTH,
};
pub use error::{BackendSource, StorageError, StorageResult};
pub use fs::{
    FileHandleLease, FileSystemStorageEngine, HandlePool, OpenMode, ReusableFileHandle,
    ReverseReadOptions, DEFAULT_REVERSE_CHUNK_SIZE, DEFAULT_REVERSE_READ_LENGTH,
};
pub use memory::MemoryStorageEngine;
pub use multipart::UploadedPart;
pub use path::{join_segments, normalize_path, relative_path};
pub use r2::{MemoryR2Bucket, R2Bucket, R2Object, R2ObjectBody, R2Range, R2StorageEngine};
pub use s3::{ObjectLocation, S3StorageEngine, DEFAULT_LINK_EXPIRY};
pub use stream::{ByteSink, ByteStream, ChunkWriter, DEFAULT_SINK_CAPACITY};
