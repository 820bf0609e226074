//! Storage-backed tables.

use crate::decoder::decode_rows;
use crate::encoder::encode_row;
use crate::error::{TabularError, TabularResult};
use crate::layout::{check_row_range, row_byte_offset, row_width, rows_in};
use crate::reader::RowStream;
use crate::writer::TableWriter;
use crate::{Row, Tabular};
use async_trait::async_trait;
use std::ops::Range;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tabstore_storage::{
    join_segments, ReadOptions, ReadStreamOptions, StorageEngine, WriteStreamOptions,
};
use tracing::{debug, warn};

/// A table stored as one object on a [`StorageEngine`].
///
/// Rows are read straight from storage with a single ranged read; the whole
/// object is never loaded unless asked for. Instances behave like file
/// handles: cloning one shares the row counter, so rows written through any
/// clone are visible to all of them.
///
/// A writer counts a row as soon as it accepts it, before its bytes are
/// durable. A read racing a writer therefore returns only the rows already
/// stored, which may be fewer than the range asked for.
#[derive(Debug, Clone)]
pub struct TabularData {
    engine: Arc<dyn StorageEngine>,
    path: String,
    num_columns: usize,
    num_rows: Arc<AtomicU64>,
}

impl TabularData {
    /// Opens the table at `path`.
    ///
    /// A missing object is an empty table; it is created by the first write.
    ///
    /// # Errors
    ///
    /// Returns [`TabularError::Corrupted`] if the object size is not a whole
    /// number of rows, or any storage error other than not-found.
    pub async fn open(
        engine: Arc<dyn StorageEngine>,
        path: impl Into<String>,
        num_columns: usize,
    ) -> TabularResult<Self> {
        let path = path.into();
        let size = match engine.size(&path).await {
            Ok(size) => size,
            Err(e) if e.is_not_found() => 0,
            Err(e) => return Err(e.into()),
        };
        let num_rows = rows_in(size, num_columns).inspect_err(|e| {
            warn!(path = %path, size, num_columns, error = %e, "table size check failed");
        })?;
        debug!(path = %path, num_columns, num_rows, engine = %engine.describe(), "opened table");

        Ok(Self {
            engine,
            path,
            num_columns,
            num_rows: Arc::new(AtomicU64::new(num_rows)),
        })
    }

    /// Opens the table whose path is given as segments.
    ///
    /// # Errors
    ///
    /// See [`TabularData::open`].
    pub async fn open_segments<S: AsRef<str>>(
        engine: Arc<dyn StorageEngine>,
        segments: &[S],
        num_columns: usize,
    ) -> TabularResult<Self> {
        Self::open(engine, join_segments(segments), num_columns).await
    }

    /// Path of the backing object.
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    /// The engine the table is stored on.
    #[must_use]
    pub fn engine(&self) -> &Arc<dyn StorageEngine> {
        &self.engine
    }

    /// Streams rows in `range` as they arrive from storage.
    ///
    /// # Errors
    ///
    /// Returns [`TabularError::InvalidRowRange`] for a range outside the table.
    /// Storage errors are yielded by the stream.
    pub fn stream_rows(&self, range: Range<u64>) -> TabularResult<RowStream> {
        if self.num_rows() == 0 {
            return Ok(RowStream::empty(self.num_columns));
        }
        check_row_range(&range, self.num_rows())?;
        let start = row_byte_offset(range.start, self.num_columns);
        let end = row_byte_offset(range.end, self.num_columns) - 1;
        let source = self
            .engine
            .create_read_stream(&self.path, ReadStreamOptions::range(start, end));
        Ok(RowStream::new(source, self.num_columns))
    }

    /// Streams every row currently in the backing object.
    ///
    /// Unlike [`TabularData::stream_rows`] this does not consult the row
    /// counter, so a table that was never written yields a not-found error.
    #[must_use]
    pub fn iter_rows(&self) -> RowStream {
        if self.num_columns == 0 {
            return RowStream::empty(0);
        }
        let source = self
            .engine
            .create_read_stream(&self.path, ReadStreamOptions::new());
        RowStream::new(source, self.num_columns)
    }

    /// Opens a write stream appending to the table.
    ///
    /// # Panics
    ///
    /// Panics outside a tokio runtime, like
    /// [`StorageEngine::create_write_stream`].
    #[must_use]
    pub fn create_writer(&self) -> TableWriter {
        let sink = self
            .engine
            .create_write_stream(&self.path, WriteStreamOptions::append());
        TableWriter::new(sink, self.num_columns, Arc::clone(&self.num_rows))
    }

    /// Appends a single row without opening a write stream.
    ///
    /// # Errors
    ///
    /// Returns [`TabularError::ColumnMismatch`] for a row of the wrong length,
    /// or the storage error from the append.
    pub async fn push(&self, row: &[f64]) -> TabularResult<()> {
        if row.len() != self.num_columns {
            return Err(TabularError::ColumnMismatch {
                expected: self.num_columns,
                actual: row.len(),
            });
        }
        self.engine.append(&self.path, encode_row(row)).await?;
        self.num_rows.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[async_trait]
impl Tabular for TabularData {
    fn num_rows(&self) -> u64 {
        if self.num_columns == 0 {
            return 0;
        }
        self.num_rows.load(Ordering::SeqCst)
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

        let position = row_byte_offset(range.start, self.num_columns);
        let length = usize::try_from(row_byte_offset(range.end, self.num_columns) - position)
            .map_err(|_| TabularError::InvalidRowRange {
                start: range.start,
                end: range.end,
                num_rows,
            })?;

        let outcome = match self
            .engine
            .read(&self.path, ReadOptions::new().position(position).length(length))
            .await
        {
            Ok(outcome) => outcome,
            // Rows counted by a writer whose first bytes have not landed yet.
            Err(e) if e.is_not_found() => {
                debug!(path = %self.path, num_rows, "table object not written yet");
                return Ok(Vec::new());
            }
            Err(e) => return Err(e.into()),
        };

        // Only whole rows that are already durable are returned.
        let durable = outcome.bytes_read - outcome.bytes_read % row_width(self.num_columns);
        if durable != length {
            debug!(
                path = %self.path,
                requested = length,
                durable,
                "row read ends at the durable prefix"
            );
        }
        decode_rows(&outcome.filled()[..durable], self.num_columns)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::writer::WriterState;
    use bytes::Bytes;
    use futures_util::StreamExt;
    use proptest::prelude::*;
    use tabstore_storage::{FileSystemStorageEngine, MemoryStorageEngine};

    fn memory() -> Arc<dyn StorageEngine> {
        Arc::new(MemoryStorageEngine::new())
    }

    async fn write_all(table: &TabularData, rows: &[Row]) {
        let mut writer = table.create_writer();
        for row in rows {
            writer.write_row(row).await.unwrap();
        }
        writer.done().await.unwrap();
    }

    #[tokio::test]
    async fn two_rows_of_three() {
        let engine = memory();
        let table = TabularData::open(engine.clone(), "table.bin", 3).await.unwrap();
        write_all(&table, &[vec![1.0, 2.0, 3.0], vec![4.0, 5.0, 6.0]]).await;

        assert_eq!(engine.size("table.bin").await.unwrap(), 48);
        assert_eq!(table.row(0).await.unwrap(), vec![1.0, 2.0, 3.0]);
        assert_eq!(table.row(1).await.unwrap(), vec![4.0, 5.0, 6.0]);

        let streamed = table.iter_rows().collect_rows().await.unwrap();
        assert_eq!(streamed, vec![vec![1.0, 2.0, 3.0], vec![4.0, 5.0, 6.0]]);

        let reopened = TabularData::open(engine, "table.bin", 3).await.unwrap();
        assert_eq!(reopened.num_rows(), 2);
    }

    #[tokio::test]
    async fn columnless_table_has_no_rows() {
        let engine = memory();
        engine
            .write("zero.bin", Bytes::from_static(&[1, 2, 3, 4, 5]))
            .await
            .unwrap();
        let table = TabularData::open(engine, "zero.bin", 0).await.unwrap();
        assert_eq!(table.num_rows(), 0);
        assert!(table.rows(0..10).await.unwrap().is_empty());
        assert!(table.iter_rows().collect_rows().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn missing_object_is_empty_table() {
        let engine = memory();
        let table = TabularData::open(engine.clone(), "new.bin", 2).await.unwrap();
        assert_eq!(table.num_rows(), 0);
        assert!(table.rows(0..1).await.unwrap().is_empty());
        assert!(table.stream_rows(0..1).unwrap().collect_rows().await.unwrap().is_empty());

        let err = table.iter_rows().collect_rows().await.unwrap_err();
        assert!(err.is_not_found());
        assert!(engine.size("new.bin").await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn size_must_be_whole_rows() {
        let engine = memory();
        engine.write("odd.bin", Bytes::from(vec![0u8; 20])).await.unwrap();
        let err = TabularData::open(engine, "odd.bin", 3).await.unwrap_err();
        assert!(matches!(err, TabularError::Corrupted { .. }));
    }

    #[tokio::test]
    async fn invalid_ranges() {
        let engine = memory();
        let table = TabularData::open(engine, "r.bin", 1).await.unwrap();
        write_all(&table, &[vec![1.0], vec![2.0]]).await;

        assert!(matches!(
            table.rows(1..1).await,
            Err(TabularError::InvalidRowRange { .. })
        ));
        assert!(matches!(
            table.rows(0..3).await,
            Err(TabularError::InvalidRowRange { .. })
        ));
        assert!(table.row(2).await.is_err());
        assert!(table.stream_rows(2..1).is_err());
    }

    #[tokio::test]
    async fn push_appends_single_rows() {
        let engine = memory();
        let table = TabularData::open(engine.clone(), "p.bin", 2).await.unwrap();
        table.push(&[1.0, 2.0]).await.unwrap();
        table.push(&[3.0, 4.0]).await.unwrap();
        assert!(matches!(
            table.push(&[5.0]).await,
            Err(TabularError::ColumnMismatch { .. })
        ));
        assert_eq!(table.num_rows(), 2);
        assert_eq!(engine.size("p.bin").await.unwrap(), 32);
    }

    #[tokio::test]
    async fn writers_append_to_existing_rows() {
        let engine = memory();
        let table = TabularData::open(engine.clone(), "a.bin", 1).await.unwrap();
        write_all(&table, &[vec![1.0]]).await;
        write_all(&table, &[vec![2.0], vec![3.0]]).await;

        let reopened = TabularData::open(engine, "a.bin", 1).await.unwrap();
        assert_eq!(reopened.num_rows(), 3);
        assert_eq!(
            reopened.all_rows().await.unwrap(),
            vec![vec![1.0], vec![2.0], vec![3.0]]
        );
    }

    #[tokio::test]
    async fn rows_stop_at_durable_prefix() {
        let engine = memory();
        let table = TabularData::open(engine.clone(), "s.bin", 2).await.unwrap();
        write_all(&table, &[vec![1.0, 2.0], vec![3.0, 4.0]]).await;

        // One whole row plus half of the next is all that is stored.
        let mut stored = encode_row(&[1.0, 2.0]).to_vec();
        stored.extend_from_slice(&encode_row(&[3.0, 4.0])[..8]);
        engine.write("s.bin", Bytes::from(stored)).await.unwrap();

        assert_eq!(table.num_rows(), 2);
        assert_eq!(table.rows(0..2).await.unwrap(), vec![vec![1.0, 2.0]]);
        assert!(table.rows(1..2).await.unwrap().is_empty());
        assert!(matches!(
            table.row(1).await,
            Err(TabularError::InvalidRowRange { .. })
        ));
    }

    #[tokio::test]
    async fn counted_rows_before_the_object_exists() {
        let engine = memory();
        let table = TabularData::open(engine.clone(), "late.bin", 2).await.unwrap();
        let mut writer = table.create_writer();
        writer.write_row(&[1.0, 2.0]).await.unwrap();
        assert_eq!(table.num_rows(), 1);

        // Whatever has landed so far must be a prefix of what was written.
        let seen = table.rows(0..1).await.unwrap();
        assert!(seen.is_empty() || seen == vec![vec![1.0, 2.0]], "{seen:?}");

        writer.done().await.unwrap();
        assert_eq!(table.rows(0..1).await.unwrap(), vec![vec![1.0, 2.0]]);
    }

    #[tokio::test]
    async fn reads_during_a_write_see_a_prefix() {
        let engine = memory();
        let table = TabularData::open(engine.clone(), "busy.bin", 3).await.unwrap();
        let rows: Vec<Row> = (0..64).map(|i| vec![f64::from(i); 3]).collect();

        let mut writer = table.create_writer();
        for row in &rows {
            writer.write_row(row).await.unwrap();
            let counted = table.num_rows();
            let seen = table.rows(0..counted).await.unwrap();
            assert!(seen.len() as u64 <= counted);
            assert_eq!(seen, rows[..seen.len()].to_vec());
        }
        writer.done().await.unwrap();
        assert_eq!(table.all_rows().await.unwrap(), rows);
    }

    #[tokio::test]
    async fn small_chunks_match_contiguous_write() {
        let engine = memory();
        let rows: Vec<Row> = (0..9)
            .map(|i| vec![f64::from(i), f64::from(i * i), -0.25])
            .collect();

        let contiguous = TabularData::open(engine.clone(), "one.bin", 3).await.unwrap();
        write_all(&contiguous, &rows).await;

        let stream = engine.create_read_stream("one.bin", ReadStreamOptions::new().chunk_size(12));
        let chunked = RowStream::new(stream, 3).collect_rows().await.unwrap();
        assert_eq!(chunked, rows);
        assert_eq!(contiguous.iter_rows().collect_rows().await.unwrap(), rows);
    }

    #[tokio::test]
    async fn stream_sub_range() {
        let engine = memory();
        let table = TabularData::open(engine, "sub.bin", 2).await.unwrap();
        let rows: Vec<Row> = (0..6).map(|i| vec![f64::from(i), 0.5]).collect();
        write_all(&table, &rows).await;

        let mut stream = table.stream_rows(2..5).unwrap();
        let mut seen = Vec::new();
        while let Some(row) = stream.next().await {
            seen.push(row.unwrap());
        }
        assert_eq!(seen, rows[2..5].to_vec());
    }

    #[tokio::test]
    async fn filesystem_backed_table() {
        let dir = tempfile::tempdir().unwrap();
        let engine: Arc<dyn StorageEngine> = Arc::new(FileSystemStorageEngine::new(dir.path()));
        let table = TabularData::open_segments(engine.clone(), &["nested", "fs.bin"], 2)
            .await
            .unwrap();
        let mut writer = table.create_writer();
        writer.write_row(&[1.5, 2.5]).await.unwrap();
        writer.end_with_row(&[3.5, 4.5]).await.unwrap();
        writer.done().await.unwrap();
        assert_eq!(writer.state(), WriterState::Completed);

        assert!(dir.path().join("nested").join("fs.bin").exists());
        assert_eq!(table.rows(1..2).await.unwrap(), vec![vec![3.5, 4.5]]);
        assert_eq!(engine.size(table.path()).await.unwrap(), 32);
    }

    fn table_shape() -> impl Strategy<Value = (usize, Vec<Row>)> {
        (1usize..5).prop_flat_map(|cols| {
            let row = prop::collection::vec(any::<f64>().prop_filter("not NaN", |v| !v.is_nan()), cols);
            (Just(cols), prop::collection::vec(row, 1..20))
        })
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        #[test]
        fn sub_ranges_equal_slices((cols, rows) in table_shape(), a in 0usize..20, b in 0usize..20) {
            let runtime = tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap();
            runtime.block_on(async {
                let engine = memory();
                let table = TabularData::open(engine.clone(), "prop.bin", cols).await.unwrap();
                write_all(&table, &rows).await;

                let n = rows.len();
                prop_assert_eq!(engine.size("prop.bin").await.unwrap(), (n * cols * 8) as u64);
                prop_assert_eq!(table.num_rows(), n as u64);

                let (start, end) = (a.min(b) % n, a.max(b) % n + 1);
                if start < end {
                    let got = table.rows(start as u64..end as u64).await.unwrap();
                    prop_assert_eq!(got, rows[start..end].to_vec());
                }
                let index = a % n;
                prop_assert_eq!(table.row(index as u64).await.unwrap(), rows[index].clone());
                Ok(())
            })?;
        }
    }
}
