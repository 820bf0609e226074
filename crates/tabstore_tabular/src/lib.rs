//! # Tabstore Tabular
//!
//! Fixed-width numeric tables stored on any [`StorageEngine`].
//!
//! A table is a `num_rows × num_columns` matrix of `f64` values persisted as
//! one flat, row-major byte object:
//!
//! ```text
//! ┌──────────────── row 0 ────────────────┬──────── row 1 ────────┬ ...
//! │ f64 LE │ f64 LE │ ... (num_columns)   │ f64 LE │ ...          │
//! └─────────────────────────────────────────────────────────────────────
//! ```
//!
//! There is no header: the column count is supplied by the caller when the
//! table is opened, and the row count follows from the object size.
//!
//! ## Table types
//!
//! - [`TabularData`] - reads rows straight from storage, appends through a
//!   [`TableWriter`]
//! - [`MutableTable`] - rows held in memory, for building tables
//! - [`TableBuffer`] - one flat immutable buffer in the on-storage layout
//!
//! All three implement [`Tabular`].
//!
//! ## Example
//!
//! ```rust
//! use tabstore_storage::StorageConfig;
//! use tabstore_tabular::{Tabular, TabularData};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let engine = StorageConfig::Memory.build();
//! let table = TabularData::open(engine, "points.bin", 3).await.unwrap();
//!
//! let mut writer = table.create_writer();
//! writer.write_row(&[1.0, 2.0, 3.0]).await.unwrap();
//! writer.end_with_row(&[4.0, 5.0, 6.0]).await.unwrap();
//! writer.done().await.unwrap();
//!
//! assert_eq!(table.num_rows(), 2);
//! assert_eq!(table.row(1).await.unwrap(), vec![4.0, 5.0, 6.0]);
//! # }
//! ```
//!
//! [`StorageEngine`]: tabstore_storage::StorageEngine

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod buffer;
mod decoder;
mod encoder;
mod error;
mod layout;
mod memory;
mod reader;
mod table;
mod writer;

use async_trait::async_trait;
use std::ops::Range;

pub use buffer::TableBuffer;
pub use decoder::{decode_rows, RowDecoder};
pub use encoder::{encode_row, RowEncoder};
pub use error::{TabularError, TabularResult};
pub use layout::{
    check_row_range, row_byte_offset, row_index_to_element_index, row_width, rows_in,
    ELEMENT_SIZE,
};
pub use memory::MutableTable;
pub use reader::RowStream;
pub use table::TabularData;
pub use writer::{TableWriter, WriterState};

/// One table row: a value per column.
pub type Row = Vec<f64>;

/// Read access shared by every table representation.
#[async_trait]
pub trait Tabular: Send + Sync {
    /// Number of rows.
    fn num_rows(&self) -> u64;

    /// Number of values in each row.
    fn num_columns(&self) -> usize;

    /// Rows `range.start` (inclusive) to `range.end` (exclusive).
    ///
    /// An empty table returns no rows for any range.
    ///
    /// # Errors
    ///
    /// Returns [`TabularError::InvalidRowRange`] unless
    /// `range.start < range.end <= num_rows`.
    async fn rows(&self, range: Range<u64>) -> TabularResult<Vec<Row>>;

    /// The row at `index`. Same as `rows(index..index + 1)[0]`.
    ///
    /// # Errors
    ///
    /// Returns [`TabularError::InvalidRowRange`] if `index` is out of bounds.
    async fn row(&self, index: u64) -> TabularResult<Row> {
        let range = index..index.saturating_add(1);
        let mut rows = self.rows(range.clone()).await?;
        rows.pop().ok_or(TabularError::InvalidRowRange {
            start: range.start,
            end: range.end,
            num_rows: self.num_rows(),
        })
    }

    /// Every row of the table.
    ///
    /// # Errors
    ///
    /// Propagates errors from [`Tabular::rows`].
    async fn all_rows(&self) -> TabularResult<Vec<Row>> {
        let num_rows = self.num_rows();
        if num_rows == 0 {
            return Ok(Vec::new());
        }
        self.rows(0..num_rows).await
    }
}
