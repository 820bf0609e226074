//! Inspect command implementation.

use crate::error::CliResult;
use serde::Serialize;
use std::sync::Arc;
use tabstore_storage::StorageEngine;
use tabstore_tabular::{row_width, Tabular, TabularData};

/// Table inspection result.
#[derive(Debug, Serialize)]
pub struct InspectResult {
    /// Engine description.
    pub engine: String,
    /// Table path.
    pub path: String,
    /// Whether the backing object exists.
    pub exists: bool,
    /// Object size in bytes.
    pub size: u64,
    /// Number of columns.
    pub num_columns: usize,
    /// Number of rows.
    pub num_rows: u64,
    /// Bytes per row.
    pub row_width: usize,
}

/// Collects the inspection result for one table.
pub async fn inspect(
    engine: &Arc<dyn StorageEngine>,
    path: &str,
    num_columns: usize,
) -> CliResult<InspectResult> {
    let exists = engine.exists(path).await?;
    let size = if exists { engine.size(path).await? } else { 0 };
    let table = TabularData::open(Arc::clone(engine), path, num_columns).await?;

    Ok(InspectResult {
        engine: engine.describe(),
        path: path.to_string(),
        exists,
        size,
        num_columns,
        num_rows: table.num_rows(),
        row_width: row_width(num_columns),
    })
}

/// Runs the inspect command.
pub async fn run(
    engine: &Arc<dyn StorageEngine>,
    path: &str,
    num_columns: usize,
    format: &str,
) -> CliResult<()> {
    let result = inspect(engine, path, num_columns).await?;

    match format {
        "json" => {
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        _ => {
            print_text_output(&result);
        }
    }

    Ok(())
}

fn print_text_output(result: &InspectResult) {
    println!("Tabstore Table Inspection");
    println!("=========================");
    println!();
    println!("Engine: {}", result.engine);
    println!("Path:   {}", result.path);
    if !result.exists {
        println!("(object does not exist yet)");
    }
    println!();
    println!("Storage:");
    println!("  Size:      {}", format_size(result.size));
    println!("  Row width: {} bytes", result.row_width);
    println!();
    println!("Shape:");
    println!("  Columns: {}", result.num_columns);
    println!("  Rows:    {}", result.num_rows);
}

fn format_size(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} bytes", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else if bytes < 1024 * 1024 * 1024 {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    } else {
        format!("{:.1} GB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CliError;
    use bytes::Bytes;
    use tabstore_storage::StorageConfig;
    use tabstore_tabular::TabularError;

    #[tokio::test]
    async fn inspects_existing_table() {
        let engine = StorageConfig::Memory.build();
        engine.write("t.bin", Bytes::from(vec![0u8; 48])).await.unwrap();

        let result = inspect(&engine, "t.bin", 3).await.unwrap();
        assert!(result.exists);
        assert_eq!(result.size, 48);
        assert_eq!(result.num_rows, 2);
        assert_eq!(result.row_width, 24);
        assert_eq!(result.engine, "memory");
    }

    #[tokio::test]
    async fn missing_table_is_empty() {
        let engine = StorageConfig::Memory.build();
        let result = inspect(&engine, "none.bin", 3).await.unwrap();
        assert!(!result.exists);
        assert_eq!(result.num_rows, 0);
    }

    #[tokio::test]
    async fn corrupted_size_is_reported() {
        let engine = StorageConfig::Memory.build();
        engine.write("bad.bin", Bytes::from(vec![0u8; 10])).await.unwrap();
        let err = inspect(&engine, "bad.bin", 3).await.unwrap_err();
        assert!(matches!(err, CliError::Tabular(TabularError::Corrupted { .. })));
    }

    #[test]
    fn sizes_are_human_readable() {
        assert_eq!(format_size(12), "12 bytes");
        assert_eq!(format_size(2048), "2.0 KB");
    }
}
