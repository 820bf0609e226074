//! Dump command implementation.

use crate::error::CliResult;
use futures_util::TryStreamExt;
use std::io::Write;
use std::sync::Arc;
use tabstore_storage::StorageEngine;
use tabstore_tabular::{Row, Tabular, TabularData};

/// Streams rows `start..end` of a table to `out`.
///
/// Returns the number of rows written.
pub async fn dump<W: Write>(
    engine: &Arc<dyn StorageEngine>,
    path: &str,
    num_columns: usize,
    start: u64,
    end: Option<u64>,
    format: &str,
    out: &mut W,
) -> CliResult<u64> {
    let table = TabularData::open(Arc::clone(engine), path, num_columns).await?;
    let end = end.unwrap_or(table.num_rows()).min(table.num_rows());
    if start >= end {
        if format == "json" {
            writeln!(out, "[]")?;
        }
        return Ok(0);
    }

    let mut rows = table.stream_rows(start..end)?;
    let mut count = 0u64;
    if format == "json" {
        write!(out, "[")?;
    }
    while let Some(row) = rows.try_next().await? {
        match format {
            "json" => {
                let sep = if count == 0 { "" } else { "," };
                write!(out, "{sep}{}", serde_json::to_string(&row)?)?;
            }
            _ => writeln!(out, "{}\t{}", start + count, format_row(&row))?,
        }
        count += 1;
    }
    if format == "json" {
        writeln!(out, "]")?;
    }
    Ok(count)
}

/// Runs the dump command.
pub async fn run(
    engine: &Arc<dyn StorageEngine>,
    path: &str,
    num_columns: usize,
    start: u64,
    end: Option<u64>,
    format: &str,
) -> CliResult<()> {
    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    let count = dump(engine, path, num_columns, start, end, format, &mut out).await?;
    tracing::debug!(path, rows = count, "dump complete");
    Ok(())
}

fn format_row(row: &Row) -> String {
    row.iter()
        .map(f64::to_string)
        .collect::<Vec<_>>()
        .join("\t")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tabstore_storage::StorageConfig;

    async fn sample() -> Arc<dyn StorageEngine> {
        let engine = StorageConfig::Memory.build();
        let table = TabularData::open(Arc::clone(&engine), "d.bin", 2).await.unwrap();
        for i in 0..4 {
            table.push(&[f64::from(i), 1.5]).await.unwrap();
        }
        engine
    }

    #[tokio::test]
    async fn text_rows_are_numbered() {
        let engine = sample().await;
        let mut out = Vec::new();
        let count = dump(&engine, "d.bin", 2, 1, Some(3), "text", &mut out).await.unwrap();
        assert_eq!(count, 2);
        assert_eq!(String::from_utf8(out).unwrap(), "1\t1\t1.5\n2\t2\t1.5\n");
    }

    #[tokio::test]
    async fn json_rows() {
        let engine = sample().await;
        let mut out = Vec::new();
        dump(&engine, "d.bin", 2, 2, None, "json", &mut out).await.unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "[[2.0,1.5],[3.0,1.5]]\n");
    }

    #[tokio::test]
    async fn end_is_clamped() {
        let engine = sample().await;
        let mut out = Vec::new();
        let count = dump(&engine, "d.bin", 2, 0, Some(100), "text", &mut out).await.unwrap();
        assert_eq!(count, 4);

        let mut out = Vec::new();
        let count = dump(&engine, "d.bin", 2, 9, None, "json", &mut out).await.unwrap();
        assert_eq!(count, 0);
        assert_eq!(String::from_utf8(out).unwrap(), "[]\n");
    }
}
