//! Row decoder.

use crate::error::{TabularError, TabularResult};
use crate::layout::{row_width, ELEMENT_SIZE};
use crate::Row;
use bytes::{Buf, BytesMut};

/// Decode a buffer holding whole rows.
///
/// # Errors
///
/// Returns [`TabularError::Corrupted`] if the buffer ends mid-row.
pub fn decode_rows(bytes: &[u8], num_columns: usize) -> TabularResult<Vec<Row>> {
    let mut decoder = RowDecoder::new(num_columns);
    let rows = decoder.push(bytes)?;
    decoder.finish()?;
    Ok(rows)
}

fn read_row(bytes: &[u8]) -> Row {
    // Copies each value out, so the input may start at any alignment.
    bytes
        .chunks_exact(ELEMENT_SIZE)
        .map(|mut element| element.get_f64_le())
        .collect()
}

/// Reassembles rows from arbitrarily sized chunks.
///
/// Storage streams chunk data without regard for the row width, so a chunk
/// may end in the middle of a row or even of a value. Trailing bytes are held
/// back and prepended to the next chunk.
///
/// ```
/// use tabstore_tabular::{encode_row, RowDecoder};
///
/// let bytes = encode_row(&[1.0, 2.0]);
/// let mut decoder = RowDecoder::new(2);
/// assert!(decoder.push(&bytes[..5]).unwrap().is_empty());
/// assert_eq!(decoder.push(&bytes[5..]).unwrap(), vec![vec![1.0, 2.0]]);
/// decoder.finish().unwrap();
/// ```
#[derive(Debug, Clone)]
pub struct RowDecoder {
    num_columns: usize,
    pending: BytesMut,
}

impl RowDecoder {
    /// Create a decoder for rows of `num_columns` values.
    #[must_use]
    pub fn new(num_columns: usize) -> Self {
        Self {
            num_columns,
            pending: BytesMut::new(),
        }
    }

    /// Number of bytes held back waiting for the rest of a row.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    /// Feed the next chunk and return every row it completes.
    ///
    /// # Errors
    ///
    /// Returns [`TabularError::Corrupted`] if data arrives for a columnless table.
    pub fn push(&mut self, chunk: &[u8]) -> TabularResult<Vec<Row>> {
        if self.num_columns == 0 {
            if chunk.is_empty() {
                return Ok(Vec::new());
            }
            return Err(TabularError::corrupted("a table without columns cannot hold data"));
        }
        let width = row_width(self.num_columns);

        if self.pending.is_empty() {
            let whole = chunk.len() - chunk.len() % width;
            let rows = chunk[..whole].chunks_exact(width).map(read_row).collect();
            self.pending.extend_from_slice(&chunk[whole..]);
            return Ok(rows);
        }

        self.pending.extend_from_slice(chunk);
        let whole = self.pending.len() - self.pending.len() % width;
        let complete = self.pending.split_to(whole);
        Ok(complete.chunks_exact(width).map(read_row).collect())
    }

    /// Signal the end of input.
    ///
    /// # Errors
    ///
    /// Returns [`TabularError::Corrupted`] if a partial row is left over.
    pub fn finish(&mut self) -> TabularResult<()> {
        if self.pending.is_empty() {
            Ok(())
        } else {
            let leftover = self.pending.len();
            self.pending.clear();
            Err(TabularError::corrupted(format!(
                "stream ended with {leftover} bytes of an incomplete row"
            )))
        }
    }
}
