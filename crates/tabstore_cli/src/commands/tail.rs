//! Tail command implementation.

use crate::error::CliResult;
use std::io::Write;
use tabstore_storage::{FileSystemStorageEngine, ReadOptions};

/// Reads the last `bytes` bytes of a file, in file order.
pub async fn tail(engine: &FileSystemStorageEngine, path: &str, bytes: usize) -> CliResult<Vec<u8>> {
    let outcome = engine
        .read_reverse(path, ReadOptions::new().length(bytes))
        .await?;
    let mut data = outcome.into_filled();
    data.reverse();
    Ok(data)
}

/// Runs the tail command.
pub async fn run(engine: &FileSystemStorageEngine, path: &str, bytes: usize) -> CliResult<()> {
    let data = tail(engine, path, bytes).await?;
    let mut stdout = std::io::stdout().lock();
    stdout.write_all(&data)?;
    stdout.flush()?;
    Ok(())
}
