//! Property-based test generators using proptest.
//!
//! Provides strategies for generating tables that maintain the layout
//! invariants.

use proptest::prelude::*;
use tabstore_tabular::Row;

/// Finite values, so generated tables compare equal to themselves.
pub fn value_strategy() -> impl Strategy<Value = f64> {
    prop_oneof![
        4 => -1.0e12f64..1.0e12,
        1 => Just(0.0),
        1 => Just(-0.0),
        1 => Just(f64::MAX),
        1 => Just(f64::MIN_POSITIVE),
    ]
}

/// Strategy for generating column counts.
pub fn num_columns_strategy() -> impl Strategy<Value = usize> {
    1usize..8
}

/// Strategy for generating a row of exactly `num_columns` values.
pub fn row_strategy(num_columns: usize) -> impl Strategy<Value = Row> {
    prop::collection::vec(value_strategy(), num_columns)
}

/// Strategy for generating a column count with up to `max_rows` rows of
/// that width.
pub fn table_strategy(max_rows: usize) -> impl Strategy<Value = (usize, Vec<Row>)> {
    num_columns_strategy().prop_flat_map(move |num_columns| {
        (
            Just(num_columns),
            prop::collection::vec(row_strategy(num_columns), 0..=max_rows),
        )
    })
}

/// Strategy for generating read-stream chunk sizes, biased toward sizes that
/// don't divide a row.
pub fn chunk_size_strategy() -> impl Strategy<Value = usize> {
    prop_oneof![1usize..16, Just(12), 17usize..4096]
}

/// Strategy for generating a row range within a non-empty table of
/// `num_rows` rows.
pub fn row_range_strategy(num_rows: u64) -> impl Strategy<Value = std::ops::Range<u64>> {
    (0..num_rows).prop_flat_map(move |start| (Just(start), start + 1..=num_rows))
        .prop_map(|(start, end)| start..end)
}

#[cfg(test)]
mod tests {
    use super::*;

    proptest! {
        #[test]
        fn tables_are_rectangular((num_columns, rows) in table_strategy(16)) {
            prop_assert!(rows.iter().all(|row| row.len() == num_columns));
        }

        #[test]
        fn ranges_fit(range in row_range_strategy(10)) {
            prop_assert!(range.start < range.end);
            prop_assert!(range.end <= 10);
        }

        #[test]
        fn values_are_finite(value in value_strategy()) {
            prop_assert!(value.is_finite());
        }
    }
}
