//! Object commands: copy, move and remove.

use crate::error::CliResult;
use futures_util::StreamExt;
use std::sync::Arc;
use tabstore_storage::{ReadStreamOptions, StorageEngine, WriteStreamOptions};
use tracing::info;

/// Streams `from` into `to` without buffering the whole object.
///
/// Returns the number of bytes copied.
pub async fn copy(engine: &Arc<dyn StorageEngine>, from: &str, to: &str) -> CliResult<u64> {
    let mut source = engine.create_read_stream(from, ReadStreamOptions::new());
    let mut sink = engine.create_write_stream(to, WriteStreamOptions::new());
    let mut copied = 0u64;

    while let Some(chunk) = source.next().await {
        let chunk = match chunk {
            Ok(chunk) => chunk,
            Err(e) => {
                sink.abort().await;
                return Err(e.into());
            }
        };
        copied += chunk.len() as u64;
        if let Err(e) = sink.write(chunk).await {
            // The sink's own outcome names the real failure.
            return Err(sink.done().await.err().unwrap_or(e).into());
        }
    }
    sink.finish().await?;

    info!(from, to, bytes = copied, "copied");
    Ok(copied)
}

/// Moves `from` to `to`.
pub async fn rename(engine: &Arc<dyn StorageEngine>, from: &str, to: &str) -> CliResult<()> {
    engine.rename(from, to).await?;
    info!(from, to, "moved");
    Ok(())
}

/// Removes `path`.
pub async fn remove(engine: &Arc<dyn StorageEngine>, path: &str) -> CliResult<()> {
    engine.remove(path).await?;
    info!(path, "removed");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use tabstore_storage::StorageConfig;

    #[tokio::test]
    async fn copy_move_remove() {
        let dir = tempfile::tempdir().unwrap();
        let engine = StorageConfig::file_system(dir.path()).build();
        engine.write("a.bin", Bytes::from(vec![7u8; 100_000])).await.unwrap();

        assert_eq!(copy(&engine, "a.bin", "b/b.bin").await.unwrap(), 100_000);
        assert_eq!(engine.read_file("b/b.bin").await.unwrap(), vec![7u8; 100_000]);

        rename(&engine, "b/b.bin", "c.bin").await.unwrap();
        assert!(!engine.exists("b/b.bin").await.unwrap());

        remove(&engine, "c.bin").await.unwrap();
        assert!(!engine.exists("c.bin").await.unwrap());
        assert!(engine.exists("a.bin").await.unwrap());
    }

    #[tokio::test]
    async fn copy_of_missing_object_fails() {
        let engine = StorageConfig::Memory.build();
        let err = copy(&engine, "missing", "dest").await.unwrap_err();
        assert!(err.to_string().contains("missing"));
        assert!(!engine.exists("dest").await.unwrap());
    }
}
