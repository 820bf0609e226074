//! On-storage layout arithmetic.
//!
//! A table is a flat, row-major sequence of 8-byte floats with no header.
//! Row `i` starts at element `i * num_columns` and byte
//! `i * num_columns * 8`.

use crate::error::{TabularError, TabularResult};
use std::ops::Range;

/// Size of one stored value in bytes.
pub const ELEMENT_SIZE: usize = std::mem::size_of::<f64>();

/// Width of one row in bytes.
#[must_use]
pub const fn row_width(num_columns: usize) -> usize {
    num_columns * ELEMENT_SIZE
}

/// Flat index of the first value of row `row_index`.
#[must_use]
pub const fn row_index_to_element_index(row_index: u64, num_columns: usize) -> u64 {
    row_index * num_columns as u64
}

/// Byte offset of row `row_index`.
#[must_use]
pub const fn row_byte_offset(row_index: u64, num_columns: usize) -> u64 {
    row_index_to_element_index(row_index, num_columns) * ELEMENT_SIZE as u64
}

/// Number of whole rows in `size` bytes.
///
/// A columnless table never holds rows.
///
/// # Errors
///
/// Returns [`TabularError::Corrupted`] if `size` is not a multiple of the row
/// width.
pub fn rows_in(size: u64, num_columns: usize) -> TabularResult<u64> {
    if num_columns == 0 {
        return Ok(0);
    }
    let width = row_width(num_columns) as u64;
    if size % width != 0 {
        return Err(TabularError::corrupted(format!(
            "size {size} is not a multiple of the row width {width}"
        )));
    }
    Ok(size / width)
}

/// Checks `0 <= start < end <= num_rows`.
///
/// # Errors
///
/// Returns [`TabularError::InvalidRowRange`] otherwise.
pub fn check_row_range(range: &Range<u64>, num_rows: u64) -> TabularResult<()> {
    if range.start < range.end && range.end <= num_rows {
        Ok(())
    } else {
        Err(TabularError::InvalidRowRange {
            start: range.start,
            end: range.end,
            num_rows,
        })
    }
}
