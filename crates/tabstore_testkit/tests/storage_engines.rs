//! Runs the conformance suite against every engine.

use bytes::Bytes;
use proptest::prelude::*;
use std::sync::Arc;
use tabstore_storage::{
    FileSystemStorageEngine, ReadOptions, ReadStreamOptions, ReverseReadOptions, StorageEngine,
};
use tabstore_tabular::{RowStream, Tabular, TabularData};
use tabstore_testkit::prelude::*;
use tabstore_testkit::suite;

#[tokio::test]
async fn filesystem_engine() {
    let fixture = TestEngine::filesystem();
    run_storage_engine_suite(&fixture.engine).await;
    run_tabular_suite(&fixture.engine).await;
    suite::check_read_stream_release(&fixture.engine, || {
        fixture.held_read_resources().unwrap()
    })
    .await;
}

#[tokio::test]
async fn memory_engine() {
    let fixture = TestEngine::memory();
    run_storage_engine_suite(&fixture.engine).await;
    run_tabular_suite(&fixture.engine).await;
}

#[tokio::test]
async fn r2_engine() {
    let fixture = TestEngine::r2();
    run_storage_engine_suite(&fixture.engine).await;
    run_tabular_suite(&fixture.engine).await;
    suite::check_read_stream_release(&fixture.engine, || {
        fixture.held_read_resources().unwrap()
    })
    .await;

    let bucket = fixture.r2_bucket().unwrap();
    assert_eq!(bucket.pending_uploads(), 0);
    assert!(bucket.completed_uploads() > 0);
}

#[tokio::test]
async fn s3_engine() {
    let Some(fixture) = TestEngine::s3_from_env() else {
        eprintln!("S3_* environment variables not set; skipping");
        return;
    };
    run_storage_engine_suite(&fixture.engine).await;
    run_tabular_suite(&fixture.engine).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn filesystem_engine_on_multi_thread_runtime() {
    let fixture = TestEngine::filesystem();
    suite::check_concurrent_reads(&fixture.engine).await;
    suite::check_read_stream_early_drop(&fixture.engine).await;
    suite::check_read_stream_release(&fixture.engine, || {
        fixture.held_read_resources().unwrap()
    })
    .await;
    suite::check_write_stream(&fixture.engine).await;
}

#[tokio::test]
async fn filesystem_reverse_read_of_alphabet() {
    let dir = tempfile::tempdir().unwrap();
    let engine = FileSystemStorageEngine::new(dir.path());
    engine.write("abc.txt", Bytes::from(alphabet(26))).await.unwrap();

    let outcome = engine
        .read_reverse("abc.txt", ReadOptions::new().length(10))
        .await
        .unwrap();
    assert_eq!(outcome.filled(), b"zyxwvutsrq");

    let outcome = engine
        .read_reverse("abc.txt", ReadOptions::new().position(26).length(10))
        .await
        .unwrap();
    assert_eq!(outcome.bytes_read, 0);

    let reversed = engine
        .create_reverse_read_stream("abc.txt", ReverseReadOptions::new().chunk_size(7))
        .collect_bytes()
        .await
        .unwrap();
    let mut expected = alphabet(26);
    expected.reverse();
    assert_eq!(reversed, expected);
}

#[tokio::test]
async fn tables_move_between_engines() {
    let source = TestEngine::filesystem();
    let target = TestEngine::r2();

    let table = TabularData::open(Arc::clone(&source.engine), "src.bin", 2).await.unwrap();
    for i in 0..40 {
        table.push(&[f64::from(i), f64::from(i) * 0.5]).await.unwrap();
    }

    let mut sink = target.create_write_stream("copy.bin", Default::default());
    let mut stream = source.create_read_stream("src.bin", ReadStreamOptions::new().chunk_size(5));
    while let Some(chunk) = futures_util::StreamExt::next(&mut stream).await {
        sink.write(chunk.unwrap()).await.unwrap();
    }
    sink.finish().await.unwrap();

    let copy = TabularData::open(Arc::clone(&target.engine), "copy.bin", 2).await.unwrap();
    assert_eq!(copy.num_rows(), 40);
    assert_eq!(copy.all_rows().await.unwrap(), table.all_rows().await.unwrap());
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn written_tables_read_back_exactly(
        (num_columns, rows) in table_strategy(40),
        chunk_size in chunk_size_strategy(),
    ) {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        runtime.block_on(async {
            let fixture = TestEngine::filesystem();
            let path = unique_path("prop");
            let table = TabularData::open(Arc::clone(&fixture.engine), path.clone(), num_columns)
                .await
                .unwrap();
            let mut writer = table.create_writer();
            for row in &rows {
                writer.write_row(row).await.unwrap();
            }
            writer.done().await.unwrap();

            let expected_size = (rows.len() * num_columns * 8) as u64;
            let size = if rows.is_empty() {
                fixture.size(&path).await.unwrap_or(0)
            } else {
                fixture.size(&path).await.unwrap()
            };
            prop_assert_eq!(size, expected_size);

            let reopened = TabularData::open(Arc::clone(&fixture.engine), path.clone(), num_columns)
                .await
                .unwrap();
            prop_assert_eq!(reopened.num_rows(), rows.len() as u64);
            prop_assert_eq!(&reopened.all_rows().await.unwrap(), &rows);

            if !rows.is_empty() {
                let stream = fixture
                    .create_read_stream(&path, ReadStreamOptions::new().chunk_size(chunk_size));
                let streamed = RowStream::new(stream, num_columns).collect_rows().await.unwrap();
                prop_assert_eq!(&streamed, &rows);
            }
            Ok(())
        })?;
    }
}
