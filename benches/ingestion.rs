use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use delimited_ingestion::ingestion::{read_csv_str, ParallelOptions, ReadOptions};

fn synthetic_csv(rows: usize) -> String {
    let mut text = String::from("id,name,score,active,joined\n");
    for i in 0..rows {
        text.push_str(&format!(
            "{i},\"user {i}\",{}.{},{},2024-{:02}-{:02}\n",
            i % 100,
            i % 10,
            i % 2 == 0,
            i % 12 + 1,
            i % 28 + 1
        ));
    }
    text
}

fn bench_read_csv(c: &mut Criterion) {
    let text = synthetic_csv(100_000);
    let mut group = c.benchmark_group("read_csv");
    group.throughput(Throughput::Bytes(text.len() as u64));
    group.sample_size(20);

    let sequential = ReadOptions {
        parse_parallel: false,
        ..Default::default()
    };
    group.bench_function("sequential", |b| {
        b.iter(|| read_csv_str(black_box(&text), &sequential).unwrap())
    });

    for chunks in [2usize, 4, 8] {
        let opts = ReadOptions {
            parallel: ParallelOptions {
                num_threads: Some(chunks),
                min_chunk_bytes: 64 * 1024,
                target_chunks: Some(chunks),
            },
            ..Default::default()
        };
        group.bench_with_input(BenchmarkId::new("parallel", chunks), &opts, |b, opts| {
            b.iter(|| read_csv_str(black_box(&text), opts).unwrap())
        });
    }
    group.finish();
}

criterion_group!(benches, bench_read_csv);
criterion_main!(benches);
