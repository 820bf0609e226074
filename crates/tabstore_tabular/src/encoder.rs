//! Row encoder.

use crate::error::{TabularError, TabularResult};
use crate::layout::row_width;
use bytes::{BufMut, Bytes, BytesMut};

/// Encode one row as consecutive little-endian f64 values.
///
/// The row length is not checked; use [`RowEncoder`] when it must match a
/// column count.
#[must_use]
pub fn encode_row(row: &[f64]) -> Bytes {
    let mut buf = BytesMut::with_capacity(row_width(row.len()));
    for value in row {
        buf.put_f64_le(*value);
    }
    buf.freeze()
}

/// Accumulates validated rows into one contiguous buffer.
///
/// ```
/// use tabstore_tabular::RowEncoder;
///
/// let mut encoder = RowEncoder::new(2);
/// encoder.push(&[1.0, 2.0]).unwrap();
/// assert!(encoder.push(&[3.0]).is_err());
/// assert_eq!(encoder.num_rows(), 1);
/// assert_eq!(encoder.into_bytes().len(), 16);
/// ```
#[derive(Debug, Clone)]
pub struct RowEncoder {
    num_columns: usize,
    num_rows: u64,
    buffer: BytesMut,
}

impl RowEncoder {
    /// Create an encoder for rows of `num_columns` values.
    #[must_use]
    pub fn new(num_columns: usize) -> Self {
        Self::with_capacity(num_columns, 0)
    }

    /// Create an encoder with room for `rows` rows.
    #[must_use]
    pub fn with_capacity(num_columns: usize, rows: usize) -> Self {
        Self {
            num_columns,
            num_rows: 0,
            buffer: BytesMut::with_capacity(row_width(num_columns) * rows),
        }
    }

    /// Append one row.
    ///
    /// # Errors
    ///
    /// Returns [`TabularError::ColumnMismatch`] if the row length differs from
    /// the column count. The encoder is left unchanged.
    pub fn push(&mut self, row: &[f64]) -> TabularResult<()> {
        if row.len() != self.num_columns {
            return Err(TabularError::ColumnMismatch {
                expected: self.num_columns,
                actual: row.len(),
            });
        }
        for value in row {
            self.buffer.put_f64_le(*value);
        }
        self.num_rows += 1;
        Ok(())
    }

    /// Number of rows encoded so far.
    #[must_use]
    pub fn num_rows(&self) -> u64 {
        self.num_rows
    }

    /// Get a reference to the encoded bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.buffer
    }

    /// Consume the encoder and return the encoded bytes.
    #[must_use]
    pub fn into_bytes(self) -> Bytes {
        self.buffer.freeze()
    }
}
