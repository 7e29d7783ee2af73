//! Engine-level benchmarks: record reads, seeks, and expression evaluation.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use dbfkit_bench::random_table;
use dbfkit_engine::{Engine, EngineSettings, FileEngine, OpenRequest, SeekKey, TagSpec};
use tempfile::tempdir;

/// Benchmark reading every record's fields in natural order.
fn bench_scan(c: &mut Criterion) {
    let mut group = c.benchmark_group("scan");

    for count in [1_000, 10_000].iter() {
        group.throughput(Throughput::Elements(*count as u64));
        group.bench_with_input(BenchmarkId::from_parameter(count), count, |b, &count| {
            let dir = tempdir().unwrap();
            let path = random_table(dir.path(), "cust", count, 0.0);
            let mut engine = FileEngine::new(EngineSettings::default());
            let table = engine.open_table(&OpenRequest::new(&path, "CUST")).unwrap();

            b.iter(|| {
                let mut position = engine.top(table).unwrap();
                while !position.eof {
                    black_box(engine.field_value(table, "BALANCE").unwrap());
                    position = engine.skip(table, 1).unwrap();
                }
            });
        });
    }
    group.finish();
}

/// Benchmark index seeks on a character tag.
fn bench_seek(c: &mut Criterion) {
    let dir = tempdir().unwrap();
    let path = random_table(dir.path(), "cust", 10_000, 0.0);
    let mut engine = FileEngine::new(EngineSettings::default());
    let table = engine
        .open_table(&OpenRequest::new(&path, "CUST").exclusive(true))
        .unwrap();
    let index = engine
        .create_index(table, &dir.path().join("seek.dbi"), &[TagSpec::new("NAME", "NAME")])
        .unwrap();
    let tag = engine.index_tag(index, "NAME").unwrap();
    engine.select_tag(table, tag).unwrap();
    let keys: Vec<SeekKey> = ["A", "KM", "QRS", "ZZZZ"]
        .iter()
        .map(|k| SeekKey::Char((*k).to_string()))
        .collect();

    c.bench_function("seek_char_prefix", |b| {
        b.iter(|| {
            for key in &keys {
                black_box(engine.seek(table, key).unwrap());
            }
        });
    });
}

/// Benchmark compiled expression evaluation against the current record.
fn bench_eval(c: &mut Criterion) {
    let dir = tempdir().unwrap();
    let path = random_table(dir.path(), "cust", 10, 0.0);
    let mut engine = FileEngine::new(EngineSettings::default());
    let table = engine.open_table(&OpenRequest::new(&path, "CUST")).unwrap();
    let expr = engine
        .compile(table, "BALANCE > 0 .AND. UPPER(NAME) >= 'M'")
        .unwrap();

    c.bench_function("eval_bool", |b| {
        b.iter(|| black_box(engine.eval_bool(expr).unwrap()));
    });
}

criterion_group!(benches, bench_scan, bench_seek, bench_eval);
criterion_main!(benches);
