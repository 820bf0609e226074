//! In-memory mutable tables.

use crate::error::{TabularError, TabularResult};
use crate::layout::check_row_range;
use crate::{Row, Tabular};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::ops::Range;

/// A table held as a vector of rows.
///
/// Use it while building a table; prefer [`TabularData`](crate::TabularData)
/// or [`TableBuffer`](crate::TableBuffer) for reading. The column count is
/// taken from the first row, and every later row must match it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MutableTable {
    rows: Vec<Row>,
}

impl MutableTable {
    /// Creates an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a table from existing rows.
    ///
    /// # Errors
    ///
    /// Returns [`TabularError::ColumnMismatch`] if the rows differ in length.
    pub fn from_rows(rows: Vec<Row>) -> TabularResult<Self> {
        if let Some(first) = rows.first() {
            let expected = first.len();
            if let Some(bad) = rows.iter().find(|row| row.len() != expected) {
                return Err(TabularError::ColumnMismatch {
                    expected,
                    actual: bad.len(),
                });
            }
        }
        Ok(Self { rows })
    }

    /// Copies every row of another table.
    ///
    /// # Errors
    ///
    /// Propagates errors from reading `source`.
    pub async fn from_table(source: &dyn Tabular) -> TabularResult<Self> {
        Ok(Self {
            rows: source.all_rows().await?,
        })
    }

    /// Appends a row.
    ///
    /// # Errors
    ///
    /// Returns [`TabularError::ColumnMismatch`] if the row length differs
    /// from the table's.
    pub fn push(&mut self, row: Row) -> TabularResult<&mut Self> {
        self.check(&row)?;
        self.rows.push(row);
        Ok(self)
    }

    /// Prepends a row.
    ///
    /// # Errors
    ///
    /// Returns [`TabularError::ColumnMismatch`] if the row length differs
    /// from the table's.
    pub fn unshift(&mut self, row: Row) -> TabularResult<&mut Self> {
        self.check(&row)?;
        self.rows.insert(0, row);
        Ok(self)
    }

    /// Borrows the rows.
    #[must_use]
    pub fn as_rows(&self) -> &[Row] {
        &self.rows
    }

    /// Iterates over the rows.
    pub fn iter(&self) -> std::slice::Iter<'_, Row> {
        self.rows.iter()
    }

    fn check(&self, row: &[f64]) -> TabularResult<()> {
        match self.rows.first() {
            Some(first) if first.len() != row.len() => Err(TabularError::ColumnMismatch {
                expected: first.len(),
                actual: row.len(),
            }),
            _ => Ok(()),
        }
    }
}

impl<'a> IntoIterator for &'a MutableTable {
    type Item = &'a Row;
    type IntoIter = std::slice::Iter<'a, Row>;

    fn into_iter(self) -> Self::IntoIter {
        self.rows.iter()
    }
}

impl IntoIterator for MutableTable {
    type Item = Row;
    type IntoIter = std::vec::IntoIter<Row>;

    fn into_iter(self) -> Self::IntoIter {
        self.rows.into_iter()
    }
}

#[async_trait]
impl Tabular for MutableTable {
    fn num_rows(&self) -> u64 {
        self.rows.len() as u64
    }

    fn num_columns(&self) -> usize {
        self.rows.first().map_or(0, Vec::len)
    }

    async fn rows(&self, range: Range<u64>) -> TabularResult<Vec<Row>> {
        if self.rows.is_empty() {
            return Ok(Vec::new());
        }
        check_row_range(&range, self.num_rows())?;
        // Bounded by `rows.len()`, so the casts are lossless.
        Ok(self.rows[range.start as usize..range.end as usize].to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn push_and_unshift() {
        let mut table = MutableTable::new();
        assert_eq!(table.num_columns(), 0);
        table.push(vec![2.0, 2.0]).unwrap().push(vec![3.0, 3.0]).unwrap();
        table.unshift(vec![1.0, 1.0]).unwrap();

        assert_eq!(table.num_rows(), 3);
        assert_eq!(table.num_columns(), 2);
        assert_eq!(table.row(0).await.unwrap(), vec![1.0, 1.0]);
        assert_eq!(
            table.rows(1..3).await.unwrap(),
            vec![vec![2.0, 2.0], vec![3.0, 3.0]]
        );
        assert!(table.push(vec![1.0]).is_err());
        assert!(table.unshift(vec![]).is_err());
        assert_eq!(table.num_rows(), 3);
    }

    #[test]
    fn from_rows_checks_widths() {
        assert!(MutableTable::from_rows(vec![vec![1.0], vec![2.0, 3.0]]).is_err());
        let table = MutableTable::from_rows(vec![vec![1.0], vec![2.0]]).unwrap();
        let values: Vec<f64> = table.into_iter().flatten().collect();
        assert_eq!(values, vec![1.0, 2.0]);
    }

    #[tokio::test]
    async fn empty_table_reads_nothing() {
        let table = MutableTable::new();
        assert!(table.rows(5..1).await.unwrap().is_empty());
        assert!(table.row(0).await.is_err());
    }

    #[test]
    fn serializes_as_nested_arrays() {
        let table = MutableTable::from_rows(vec![vec![1.0, 2.5]]).unwrap();
        let json = serde_json::to_string(&table).unwrap();
        assert_eq!(json, "[[1.0,2.5]]");
    }
}
