//! Append command implementation.

use crate::error::CliResult;
use std::sync::Arc;
use tabstore_storage::StorageEngine;
use tabstore_tabular::{Tabular, TabularData};

/// Appends `values` as one row and returns the new row count.
pub async fn append(
    engine: &Arc<dyn StorageEngine>,
    path: &str,
    num_columns: usize,
    values: &[f64],
) -> CliResult<u64> {
    let table = TabularData::open(Arc::clone(engine), path, num_columns).await?;
    table.push(values).await?;
    Ok(table.num_rows())
}

/// Runs the append command.
pub async fn run(
    engine: &Arc<dyn StorageEngine>,
    path: &str,
    num_columns: usize,
    values: &[f64],
) -> CliResult<()> {
    let num_rows = append(engine, path, num_columns, values).await?;
    println!("{path}: {num_rows} rows");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CliError;
    use tabstore_storage::StorageConfig;
    use tabstore_tabular::TabularError;

    #[tokio::test]
    async fn appends_rows() {
        let engine = StorageConfig::Memory.build();
        assert_eq!(append(&engine, "a.bin", 2, &[1.0, -2.0]).await.unwrap(), 1);
        assert_eq!(append(&engine, "a.bin", 2, &[3.0, 4.0]).await.unwrap(), 2);
        assert_eq!(engine.size("a.bin").await.unwrap(), 32);
    }

    #[tokio::test]
    async fn rejects_wrong_width() {
        let engine = StorageConfig::Memory.build();
        let err = append(&engine, "a.bin", 3, &[1.0]).await.unwrap_err();
        assert!(matches!(
            err,
            CliError::Tabular(TabularError::ColumnMismatch { expected: 3, actual: 1 })
        ));
    }
}
