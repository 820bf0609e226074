//! Benchmark utilities.

use rand::Rng;
use tabstore_tabular::{Row, RowEncoder};

/// Generate random bytes of the specified size.
pub fn random_data(size: usize) -> Vec<u8> {
    let mut rng = rand::thread_rng();
    (0..size).map(|_| rng.gen()).collect()
}

/// Generate `count` rows of `num_columns` random values.
pub fn random_rows(count: usize, num_columns: usize) -> Vec<Row> {
    let mut rng = rand::thread_rng();
    (0..count)
        .map(|_| (0..num_columns).map(|_| rng.gen_range(-1.0e6..1.0e6)).collect())
        .collect()
}

/// Encode rows into the on-storage layout.
pub fn encoded_rows(rows: &[Row], num_columns: usize) -> Vec<u8> {
    let mut encoder = RowEncoder::with_capacity(num_columns, rows.len());
    for row in rows {
        encoder
            .push(row)
            .expect("generated rows have the requested width");
    }
    encoder.into_bytes().to_vec()
}

/// A current-thread runtime for async benchmarks.
pub fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .expect("Failed to build tokio runtime")
}
