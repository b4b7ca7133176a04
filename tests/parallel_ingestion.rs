use delimited_ingestion::ingestion::{
    read_csv_str, CancellationToken, MalformedRowPolicy, ParallelOptions, ReadOptions,
};
use delimited_ingestion::types::{ColumnType, Value};
use delimited_ingestion::IngestionError;

fn chunked(chunks: usize) -> ReadOptions {
    ReadOptions {
        parallel: ParallelOptions {
            num_threads: Some(4),
            min_chunk_bytes: 1,
            target_chunks: Some(chunks),
        },
        ..Default::default()
    }
}

fn single_chunk() -> ReadOptions {
    ReadOptions {
        parse_parallel: false,
        ..Default::default()
    }
}

/// 10,000 rows with quoted multi-line fields scattered through the body.
fn large_input() -> String {
    let mut text = String::from("id,name,score,note,day\n");
    for i in 0..10_000 {
        let score = if i == 9_000 { "7.25".to_string() } else { (i % 97).to_string() };
        let note = if i % 250 == 0 {
            format!("\"multi\nline, {i}\"")
        } else if i % 333 == 0 {
            "NA".to_string()
        } else {
            format!("note {i}")
        };
        text.push_str(&format!("{i},\"name {i}\",{score},{note},2024-01-{:02}\n", i % 28 + 1));
    }
    text
}

#[test]
fn parallel_read_matches_single_chunk_read() {
    let text = large_input();
    let expected = read_csv_str(&text, &single_chunk()).unwrap();
    assert_eq!(expected.row_count(), 10_000);

    for chunks in [2, 3, 8, 64] {
        let table = read_csv_str(&text, &chunked(chunks)).unwrap();
        assert_eq!(table, expected, "chunks={chunks}");
    }

    let ty = |name: &str| expected.column(name).unwrap().data_type();
    assert_eq!(ty("id"), ColumnType::Integer);
    assert_eq!(ty("score"), ColumnType::Double);
    assert_eq!(ty("note"), ColumnType::String);
    assert_eq!(ty("day"), ColumnType::LocalDate);
    assert_eq!(
        expected.column("note").unwrap().get(250),
        Some(&Value::String("multi\nline, 250".to_string()))
    );
}

#[test]
fn parallel_read_on_global_pool() {
    let text = large_input();
    let opts = ReadOptions {
        parallel: ParallelOptions {
            num_threads: None,
            min_chunk_bytes: 4096,
            target_chunks: Some(6),
        },
        ..Default::default()
    };
    let table = read_csv_str(&text, &opts).unwrap();
    assert_eq!(table, read_csv_str(&text, &single_chunk()).unwrap());
}

#[test]
fn sampled_inference_widens_identically_across_chunks() {
    let mut text = String::from("v\n");
    for i in 0..2_000 {
        text.push_str(&format!("{i}\n"));
    }
    text.push_str("oops\n");

    let sampled = |mut opts: ReadOptions| {
        opts.inference.sample_rows = Some(100);
        opts
    };
    let seq = read_csv_str(&text, &sampled(single_chunk())).unwrap();
    let par = read_csv_str(&text, &sampled(chunked(5))).unwrap();
    assert_eq!(seq, par);
    assert_eq!(par.column("v").unwrap().data_type(), ColumnType::String);
}

#[test]
fn first_error_in_input_order_is_reported() {
    let mut text = String::from("a,b\n");
    for i in 0..1_000 {
        if i == 100 || i == 900 {
            text.push_str("short\n");
        } else {
            text.push_str(&format!("{i},{i}\n"));
        }
    }
    let opts = ReadOptions {
        allow_missing_columns: false,
        ..chunked(8)
    };
    let err = read_csv_str(&text, &opts).unwrap_err();
    match err {
        IngestionError::MalformedRecord { line, .. } => assert_eq!(line, 102),
        other => panic!("unexpected error: {other:?}"),
    }
}

#[test]
fn skipped_rows_are_dropped_in_every_chunk() {
    let mut text = String::from("a,b\n");
    for i in 0..1_000 {
        if i % 100 == 0 {
            text.push_str("short\n");
        } else {
            text.push_str(&format!("{i},{i}\n"));
        }
    }
    let opts = ReadOptions {
        allow_missing_columns: false,
        on_malformed: MalformedRowPolicy::Skip,
        ..chunked(8)
    };
    let table = read_csv_str(&text, &opts).unwrap();
    assert_eq!(table.row_count(), 990);
}

#[test]
fn cancelled_read_returns_cancelled() {
    let token = CancellationToken::new();
    token.cancel();
    let opts = ReadOptions {
        cancellation: Some(token),
        ..chunked(4)
    };
    let err = read_csv_str(&large_input(), &opts).unwrap_err();
    assert!(matches!(err, IngestionError::Cancelled));
}
