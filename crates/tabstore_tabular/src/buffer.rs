//! Flat immutable table buffers.

use crate::error::{TabularError, TabularResult};
use crate::layout::{check_row_range, row_index_to_element_index, rows_in, ELEMENT_SIZE};
use crate::{Row, Tabular};
use async_trait::async_trait;
use bytes::{Buf, BufMut, Bytes, BytesMut};
use serde::{Deserialize, Serialize};
use std::ops::Range;

/// A table stored as one flat row-major `f64` buffer.
///
/// This is the in-memory twin of the on-storage layout: [`TableBuffer::to_bytes`]
/// produces exactly the bytes a [`TabularData`](crate::TabularData) object
/// holds, so a whole table can be written with one
/// [`StorageEngine::write`](tabstore_storage::StorageEngine::write).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableBuffer {
    num_columns: usize,
    data: Vec<f64>,
}

impl TableBuffer {
    /// Wraps flat row-major values.
    ///
    /// # Errors
    ///
    /// Returns [`TabularError::Corrupted`] unless `data` holds whole rows.
    pub fn new(data: Vec<f64>, num_columns: usize) -> TabularResult<Self> {
        let whole_rows = if num_columns == 0 {
            data.is_empty()
        } else {
            data.len() % num_columns == 0
        };
        if !whole_rows {
            return Err(TabularError::corrupted(format!(
                "{} values do not form rows of {num_columns}",
                data.len()
            )));
        }
        Ok(Self { num_columns, data })
    }

    /// Decodes the on-storage byte layout.
    ///
    /// # Errors
    ///
    /// Returns [`TabularError::Corrupted`] unless `bytes` holds whole rows.
    pub fn from_bytes(bytes: &[u8], num_columns: usize) -> TabularResult<Self> {
        if num_columns == 0 && !bytes.is_empty() {
            return Err(TabularError::corrupted("a table without columns cannot hold data"));
        }
        rows_in(bytes.len() as u64, num_columns)?;
        let data = bytes
            .chunks_exact(ELEMENT_SIZE)
            .map(|mut element| element.get_f64_le())
            .collect();
        Ok(Self { num_columns, data })
    }

    /// Copies every row of another table.
    ///
    /// # Errors
    ///
    /// Propagates errors from reading `source`.
    pub async fn from_table(source: &dyn Tabular) -> TabularResult<Self> {
        let num_columns = source.num_columns();
        let data = source.all_rows().await?.into_iter().flatten().collect();
        Self::new(data, num_columns)
    }

    /// Encodes the buffer in the on-storage layout.
    #[must_use]
    pub fn to_bytes(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(self.data.len() * ELEMENT_SIZE);
        for value in &self.data {
            buf.put_f64_le(*value);
        }
        buf.freeze()
    }

    /// Size of [`TableBuffer::to_bytes`] in bytes.
    #[must_use]
    pub fn byte_len(&self) -> usize {
        self.data.len() * ELEMENT_SIZE
    }

    /// The flat values.
    #[must_use]
    pub fn values(&self) -> &[f64] {
        &self.data
    }

    /// Iterates over rows without copying.
    pub fn iter(&self) -> impl Iterator<Item = &[f64]> {
        self.data.chunks_exact(self.num_columns.max(1))
    }
}

#[async_trait]
impl Tabular for TableBuffer {
    fn num_rows(&self) -> u64 {
        if self.num_columns == 0 {
            return 0;
        }
        (self.data.len() / self.num_columns) as u64
    }

    fn num_columns(&self) -> usize {
        self.num_columns
    }

    async fn rows(&self, range: Range<u64>) -> TabularResult<Vec<Row>> {
        let num_rows = self.num_rows();
        if num_rows == 0 {
            return Ok(Vec::new());
        }
        check_row_range(&range, num_rows)?;
        // Bounded by `data.len()`, so the casts are lossless.
        let start = row_index_to_element_index(range.start, self.num_columns) as usize;
        let end = row_index_to_element_index(range.end, self.num_columns) as usize;
        Ok(self.data[start..end]
            .chunks_exact(self.num_columns)
            .map(<[f64]>::to_vec)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MutableTable;
    use crate::table::TabularData;
    use std::sync::Arc;
    use tabstore_storage::{MemoryStorageEngine, StorageEngine};

    #[tokio::test]
    async fn rows_from_flat_values() {
        let buffer = TableBuffer::new(vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0], 3).unwrap();
        assert_eq!(buffer.num_rows(), 2);
        assert_eq!(buffer.row(1).await.unwrap(), vec![4.0, 5.0, 6.0]);
        assert_eq!(buffer.iter().count(), 2);
        assert_eq!(buffer.byte_len(), 48);
    }

    #[test]
    fn rejects_partial_rows() {
        assert!(TableBuffer::new(vec![1.0, 2.0], 3).is_err());
        assert!(TableBuffer::new(vec![1.0], 0).is_err());
        assert!(TableBuffer::from_bytes(&[0; 12], 1).is_err());
        assert!(TableBuffer::from_bytes(&[0; 8], 0).is_err());
        assert_eq!(TableBuffer::new(Vec::new(), 0).unwrap().num_rows(), 0);
    }

    #[tokio::test]
    async fn bytes_match_storage_layout() {
        let engine: Arc<dyn StorageEngine> = Arc::new(MemoryStorageEngine::new());
        let table = TabularData::open(engine.clone(), "t.bin", 2).await.unwrap();
        table.push(&[1.0, -1.0]).await.unwrap();
        table.push(&[0.5, 8.0]).await.unwrap();

        let buffer = TableBuffer::from_table(&table).await.unwrap();
        let stored = engine.read_file("t.bin").await.unwrap();
        assert_eq!(buffer.to_bytes(), stored);
        assert_eq!(TableBuffer::from_bytes(&stored, 2).unwrap(), buffer);
    }

    #[tokio::test]
    async fn converts_between_representations() {
        let mut mutable = MutableTable::new();
        mutable.push(vec![1.0, 2.0]).unwrap().push(vec![3.0, 4.0]).unwrap();
        let buffer = TableBuffer::from_table(&mutable).await.unwrap();
        assert_eq!(buffer.values(), &[1.0, 2.0, 3.0, 4.0]);

        let back = MutableTable::from_table(&buffer).await.unwrap();
        assert_eq!(back, mutable);
    }
}
