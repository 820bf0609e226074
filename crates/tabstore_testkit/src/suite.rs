//! Storage engine conformance suite.
//!
//! Every engine must pass the same checks, so backend differences can only
//! show up where the contract allows them (whether removing a missing object
//! is an error, and what an aborted write leaves behind). Each check uses its
//! own paths and can run on its own; [`run_storage_engine_suite`] and
//! [`run_tabular_suite`] run them all.
//!
//! Checks panic on failure, like any other assertion helper.

use bytes::Bytes;
use futures_util::StreamExt;
use std::sync::Arc;
use tabstore_storage::{
    ReadOptions, ReadStreamOptions, StorageEngine, StorageError, WriteStreamOptions,
};
use tabstore_tabular::{RowStream, Tabular, TabularData};

use crate::fixtures::{alphabet, unique_path};

type Engine = Arc<dyn StorageEngine>;

/// Runs every storage engine check against `engine`.
pub async fn run_storage_engine_suite(engine: &Engine) {
    check_write_then_read_file(engine).await;
    check_positioned_reads(engine).await;
    check_concurrent_reads(engine).await;
    check_append(engine).await;
    check_overwrite(engine).await;
    check_missing_target(engine).await;
    check_remove(engine).await;
    check_rename(engine).await;
    check_read_stream_ranges(engine).await;
    check_read_stream_early_drop(engine).await;
    check_extreme_ranges(engine).await;
    check_write_stream(engine).await;
    check_write_stream_append(engine).await;
    check_write_stream_abort(engine).await;
}

/// Runs every table check against `engine`.
pub async fn run_tabular_suite(engine: &Engine) {
    check_table_scenario(engine).await;
    check_table_reopen(engine).await;
    check_table_chunk_reassembly(engine).await;
    check_missing_table(engine).await;
}

fn assert_not_found<T: std::fmt::Debug>(result: Result<T, StorageError>, operation: &str) {
    match result {
        Err(e) if e.is_not_found() => {}
        other => panic!("{operation}: expected NotFound, got {other:?}"),
    }
}

/// A written object reads back unchanged.
pub async fn check_write_then_read_file(engine: &Engine) {
    let path = unique_path("write");
    let data = alphabet(100);
    engine.write(&path, Bytes::from(data.clone())).await.expect("write");

    assert_eq!(engine.read_file(&path).await.expect("read_file"), data);
    assert_eq!(engine.size(&path).await.expect("size"), 100);
    assert!(engine.exists(&path).await.expect("exists"));
}

/// Reads honour position and length, clamp at end of file and keep no cursor.
pub async fn check_positioned_reads(engine: &Engine) {
    let path = unique_path("positioned");
    engine.write(&path, Bytes::from(alphabet(26))).await.expect("write");

    let outcome = engine
        .read(&path, ReadOptions::new().position(3).length(4))
        .await
        .expect("read");
    assert_eq!(outcome.filled(), b"defg");

    // Same call again: no cursor was advanced.
    let again = engine
        .read(&path, ReadOptions::new().position(3).length(4))
        .await
        .expect("read");
    assert_eq!(again.filled(), b"defg");

    let outcome = engine
        .read(&path, ReadOptions::new().position(20).buffer(vec![0; 10]))
        .await
        .expect("read into buffer");
    assert_eq!(outcome.bytes_read, 6);
    assert_eq!(outcome.filled(), b"uvwxyz");
    assert_eq!(outcome.buffer.len(), 10);

    let outcome = engine
        .read(&path, ReadOptions::new().position(26).length(5))
        .await
        .expect("read at end of file");
    assert_eq!(outcome.bytes_read, 0);

    let outcome = engine
        .read(&path, ReadOptions::new().position(100).length(5))
        .await
        .expect("read past end of file");
    assert_eq!(outcome.bytes_read, 0);

    let outcome = engine.read(&path, ReadOptions::new()).await.expect("default read");
    assert_eq!(outcome.filled(), alphabet(26));
}

/// Overlapping reads on one path don't disturb each other.
pub async fn check_concurrent_reads(engine: &Engine) {
    let path = unique_path("concurrent");
    let data = alphabet(4096);
    engine.write(&path, Bytes::from(data.clone())).await.expect("write");

    let reads = (0..16u64).map(|i| {
        let engine = Arc::clone(engine);
        let path = path.clone();
        async move {
            let position = i * 200;
            let outcome = engine
                .read(&path, ReadOptions::new().position(position).length(100))
                .await
                .expect("read");
            (position, outcome.into_filled())
        }
    });
    for (position, bytes) in futures_util::future::join_all(reads).await {
        let start = position as usize;
        assert_eq!(bytes, &data[start..start + 100]);
    }
}

/// Append creates a missing object and extends an existing one.
pub async fn check_append(engine: &Engine) {
    let path = unique_path("append");
    engine.append(&path, Bytes::from_static(b"abc")).await.expect("append");
    engine.append(&path, Bytes::from_static(b"def")).await.expect("append");
    engine.append(&path, Bytes::new()).await.expect("empty append");

    assert_eq!(engine.read_file(&path).await.expect("read_file"), &b"abcdef"[..]);
    assert_eq!(engine.size(&path).await.expect("size"), 6);
}

/// Write replaces the whole object, shrinking it if needed.
pub async fn check_overwrite(engine: &Engine) {
    let path = unique_path("overwrite");
    engine.write(&path, Bytes::from(alphabet(50))).await.expect("write");
    engine.write(&path, Bytes::from_static(b"xyz")).await.expect("overwrite");

    assert_eq!(engine.size(&path).await.expect("size"), 3);
    assert_eq!(engine.read_file(&path).await.expect("read_file"), &b"xyz"[..]);
}

/// Every operation on a missing object reports `NotFound`.
pub async fn check_missing_target(engine: &Engine) {
    let path = unique_path("missing");

    assert_not_found(engine.size(&path).await, "size");
    assert_not_found(engine.read(&path, ReadOptions::new()).await, "read");
    assert_not_found(engine.read_file(&path).await, "read_file");
    assert_not_found(
        engine.rename(&path, &unique_path("missing-target")).await,
        "rename",
    );
    assert!(!engine.exists(&path).await.expect("exists"));

    let mut stream = engine.create_read_stream(&path, ReadStreamOptions::new());
    let first = stream.next().await.expect("stream yields the error");
    assert_not_found(first, "create_read_stream");
}

/// Removed objects are gone; removing a missing one is NotFound or a no-op.
pub async fn check_remove(engine: &Engine) {
    let path = unique_path("remove");
    engine.write(&path, Bytes::from_static(b"gone soon")).await.expect("write");
    engine.remove(&path).await.expect("remove");
    assert!(!engine.exists(&path).await.expect("exists"));

    match engine.remove(&path).await {
        Ok(()) => {}
        Err(e) => assert!(e.is_not_found(), "second remove: {e}"),
    }
}

/// Rename moves content and removes the source.
pub async fn check_rename(engine: &Engine) {
    let from = unique_path("rename-from");
    let to = unique_path("rename-to");
    engine.write(&from, Bytes::from(alphabet(40))).await.expect("write");
    engine.rename(&from, &to).await.expect("rename");

    assert!(!engine.exists(&from).await.expect("exists"));
    assert_eq!(engine.read_file(&to).await.expect("read_file"), alphabet(40));

    // Renaming onto an existing object replaces it.
    engine.write(&from, Bytes::from_static(b"new")).await.expect("write");
    engine.rename(&from, &to).await.expect("rename over");
    assert_eq!(engine.read_file(&to).await.expect("read_file"), &b"new"[..]);
}

async fn collect(engine: &Engine, path: &str, options: ReadStreamOptions) -> Vec<Bytes> {
    engine
        .create_read_stream(path, options)
        .map(|chunk| chunk.expect("stream chunk"))
        .collect()
        .await
}

/// Read streams cover inclusive ranges and respect the chunk size.
pub async fn check_read_stream_ranges(engine: &Engine) {
    let path = unique_path("stream");
    let data = alphabet(1000);
    engine.write(&path, Bytes::from(data.clone())).await.expect("write");

    let whole: Vec<u8> = collect(engine, &path, ReadStreamOptions::new())
        .await
        .concat();
    assert_eq!(whole, data);

    let ranged = collect(engine, &path, ReadStreamOptions::range(2, 11)).await.concat();
    assert_eq!(ranged, &data[2..=11]);

    let single = collect(engine, &path, ReadStreamOptions::range(5, 5)).await.concat();
    assert_eq!(single, &data[5..6]);

    let tail = collect(engine, &path, ReadStreamOptions::from_offset(990)).await.concat();
    assert_eq!(tail, &data[990..]);

    let clamped = collect(engine, &path, ReadStreamOptions::range(995, 5000)).await.concat();
    assert_eq!(clamped, &data[995..]);

    let chunks = collect(engine, &path, ReadStreamOptions::new().chunk_size(64)).await;
    assert!(chunks.iter().all(|chunk| chunk.len() <= 64));
    assert_eq!(chunks.concat(), data);

    let empty_path = unique_path("stream-empty");
    engine.write(&empty_path, Bytes::new()).await.expect("write empty");
    assert!(collect(engine, &empty_path, ReadStreamOptions::new()).await.is_empty());
}

/// Dropping a read stream early leaves the object usable.
pub async fn check_read_stream_early_drop(engine: &Engine) {
    let path = unique_path("early-drop");
    engine.write(&path, Bytes::from(alphabet(4096))).await.expect("write");

    let mut stream = engine.create_read_stream(&path, ReadStreamOptions::new().chunk_size(16));
    let first = stream.next().await.expect("first chunk").expect("chunk");
    assert_eq!(first, &alphabet(16)[..]);
    drop(stream);

    engine.remove(&path).await.expect("remove after early drop");
    assert!(!engine.exists(&path).await.expect("exists"));
}

/// Dropping a partly read stream releases what it held.
///
/// `held` reports the engine's outstanding read resources (see
/// [`TestEngine::held_read_resources`](crate::fixtures::TestEngine::held_read_resources)).
pub async fn check_read_stream_release(engine: &Engine, held: impl Fn() -> usize) {
    let path = unique_path("release");
    engine.write(&path, Bytes::from(alphabet(4096))).await.expect("write");
    assert_eq!(held(), 0, "resources held before reading");

    let mut stream = engine.create_read_stream(&path, ReadStreamOptions::new().chunk_size(16));
    stream.next().await.expect("first chunk").expect("chunk");
    assert!(held() > 0, "a stream being read should hold its source");
    drop(stream);
    assert_eq!(held(), 0, "dropped stream kept its source");

    // Same for a ranged stream that was never polled past its first chunk.
    let mut stream =
        engine.create_read_stream(&path, ReadStreamOptions::range(100, 3000).chunk_size(8));
    stream.next().await.expect("first chunk").expect("chunk");
    drop(stream);
    assert_eq!(held(), 0, "dropped ranged stream kept its source");

    // A stream read to the end releases on its own.
    let whole = engine
        .create_read_stream(&path, ReadStreamOptions::new())
        .collect_bytes()
        .await
        .expect("collect");
    assert_eq!(whole.len(), 4096);
    assert_eq!(held(), 0, "finished stream kept its source");
}

/// Ranges and positions at the top of the `u64` space read cleanly.
pub async fn check_extreme_ranges(engine: &Engine) {
    let path = unique_path("extreme");
    engine.write(&path, Bytes::from(alphabet(26))).await.expect("write");

    let whole = engine
        .create_read_stream(&path, ReadStreamOptions::range(0, u64::MAX))
        .collect_bytes()
        .await
        .expect("open-ended range");
    assert_eq!(whole, alphabet(26));

    let beyond = engine
        .create_read_stream(&path, ReadStreamOptions::range(u64::MAX, u64::MAX))
        .collect_bytes()
        .await
        .expect("range past the end");
    assert!(beyond.is_empty());

    let outcome = engine
        .read(&path, ReadOptions::new().position(u64::MAX).length(4))
        .await
        .expect("read at u64::MAX");
    assert_eq!(outcome.bytes_read, 0);

    let outcome = engine
        .read(&path, ReadOptions::new().position(u64::MAX - 2).length(16))
        .await
        .expect("read straddling u64::MAX");
    assert_eq!(outcome.bytes_read, 0);
}

/// Data written through a sink is durable once `done` resolves.
pub async fn check_write_stream(engine: &Engine) {
    let path = unique_path("sink");
    let data = alphabet(1000);

    let mut sink = engine.create_write_stream(&path, WriteStreamOptions::new());
    for chunk in data.chunks(7) {
        sink.write(Bytes::copy_from_slice(chunk)).await.expect("sink write");
    }
    sink.close().await.expect("close");
    sink.done().await.expect("done");

    assert_eq!(engine.size(&path).await.expect("size"), 1000);
    assert_eq!(engine.read_file(&path).await.expect("read_file"), data);

    // A second truncating stream replaces the object.
    let mut sink = engine.create_write_stream(&path, WriteStreamOptions::new());
    sink.write(Bytes::from_static(b"short")).await.expect("sink write");
    sink.finish().await.expect("finish");
    assert_eq!(engine.read_file(&path).await.expect("read_file"), &b"short"[..]);

    // Nothing written still produces an empty object.
    let empty = unique_path("sink-empty");
    engine
        .create_write_stream(&empty, WriteStreamOptions::new())
        .finish()
        .await
        .expect("empty finish");
    assert_eq!(engine.size(&empty).await.expect("size"), 0);
}

/// Append-mode sinks keep existing content.
pub async fn check_write_stream_append(engine: &Engine) {
    let path = unique_path("sink-append");
    engine.write(&path, Bytes::from_static(b"head-")).await.expect("write");

    let mut sink = engine.create_write_stream(&path, WriteStreamOptions::append());
    sink.write(Bytes::from_static(b"tail")).await.expect("sink write");
    sink.finish().await.expect("finish");
    assert_eq!(engine.read_file(&path).await.expect("read_file"), &b"head-tail"[..]);

    let fresh = unique_path("sink-append-fresh");
    let mut sink = engine.create_write_stream(&fresh, WriteStreamOptions::append());
    sink.write(Bytes::from_static(b"only")).await.expect("sink write");
    sink.finish().await.expect("finish");
    assert_eq!(engine.read_file(&fresh).await.expect("read_file"), &b"only"[..]);
}

/// An aborted sink settles, and the path can be written again afterwards.
pub async fn check_write_stream_abort(engine: &Engine) {
    let path = unique_path("sink-abort");
    let mut sink = engine.create_write_stream(&path, WriteStreamOptions::new());
    sink.write(Bytes::from(alphabet(100))).await.expect("sink write");
    sink.abort().await;

    engine.write(&path, Bytes::from_static(b"after")).await.expect("write");
    assert_eq!(engine.read_file(&path).await.expect("read_file"), &b"after"[..]);
}

/// Two rows of three columns: the canonical layout example.
pub async fn check_table_scenario(engine: &Engine) {
    let path = unique_path("table");
    let table = TabularData::open(Arc::clone(engine), path.clone(), 3)
        .await
        .expect("open");
    let mut writer = table.create_writer();
    writer.write_row(&[1.0, 2.0, 3.0]).await.expect("write_row");
    writer.write_row(&[4.0, 5.0, 6.0]).await.expect("write_row");
    writer.done().await.expect("done");

    assert_eq!(engine.size(&path).await.expect("size"), 48);
    assert_eq!(table.row(0).await.expect("row"), vec![1.0, 2.0, 3.0]);
    assert_eq!(table.row(1).await.expect("row"), vec![4.0, 5.0, 6.0]);
    assert_eq!(
        table.iter_rows().collect_rows().await.expect("iterate"),
        vec![vec![1.0, 2.0, 3.0], vec![4.0, 5.0, 6.0]]
    );
}

/// Row count and content survive reopening.
pub async fn check_table_reopen(engine: &Engine) {
    let path = unique_path("table-reopen");
    let rows: Vec<Vec<f64>> = (0..25)
        .map(|i| vec![f64::from(i), f64::from(i) / 3.0])
        .collect();

    let table = TabularData::open(Arc::clone(engine), path.clone(), 2)
        .await
        .expect("open");
    let mut writer = table.create_writer();
    for row in &rows {
        writer.write_row(row).await.expect("write_row");
    }
    writer.finish().await.expect("finish");

    let reopened = TabularData::open(Arc::clone(engine), path.clone(), 2)
        .await
        .expect("reopen");
    assert_eq!(reopened.num_rows(), 25);
    assert_eq!(engine.size(&path).await.expect("size"), 25 * 2 * 8);
    assert_eq!(reopened.all_rows().await.expect("rows"), rows);
    assert_eq!(reopened.rows(10..12).await.expect("rows"), rows[10..12].to_vec());
}

/// Rows streamed in 12-byte chunks match rows read in one piece.
pub async fn check_table_chunk_reassembly(engine: &Engine) {
    let path = unique_path("table-chunks");
    let table = TabularData::open(Arc::clone(engine), path.clone(), 3)
        .await
        .expect("open");
    for i in 0..10 {
        table
            .push(&[f64::from(i), -f64::from(i), 0.125])
            .await
            .expect("push");
    }

    let contiguous = table.all_rows().await.expect("rows");
    let stream = engine.create_read_stream(&path, ReadStreamOptions::new().chunk_size(12));
    let chunked = RowStream::new(stream, 3).collect_rows().await.expect("stream rows");
    assert_eq!(chunked, contiguous);
}

/// A table that was never written is empty, but iterating its object fails.
pub async fn check_missing_table(engine: &Engine) {
    let path = unique_path("table-missing");
    let table = TabularData::open(Arc::clone(engine), path, 4)
        .await
        .expect("open");
    assert_eq!(table.num_rows(), 0);
    assert!(table.rows(0..1).await.expect("rows").is_empty());

    let err = table
        .iter_rows()
        .collect_rows()
        .await
        .expect_err("iterating a missing table");
    assert!(err.is_not_found(), "unexpected error: {err}");
}
