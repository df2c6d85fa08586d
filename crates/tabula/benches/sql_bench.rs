//! SQL benchmarks for Tabula.
//!
//! - Parsing
//! - Planning against a registered table
//! - Execution over in-memory and Parquet sources

use std::sync::Arc;

use arrow::array::{Float64Array, Int64Array, StringArray};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use tabula::{ParquetReadOptions, SessionContext};
use tabula_core::query::parse_sql;
use tempfile::TempDir;

fn queries() -> Vec<(&'static str, &'static str)> {
    vec![
        ("select_literal", "SELECT 1"),
        ("select_star", "SELECT * FROM events"),
        ("select_where", "SELECT id, score FROM events WHERE id > 500 AND score < 0.5"),
        (
            "group_by",
            "SELECT kind, COUNT(*), AVG(score) FROM events GROUP BY kind ORDER BY kind",
        ),
        (
            "self_join",
            "SELECT a.id FROM events a JOIN events b ON a.id = b.id WHERE b.kind = 'click'",
        ),
        ("order_limit", "SELECT * FROM events ORDER BY score DESC LIMIT 10"),
    ]
}

fn events(rows: i64) -> RecordBatch {
    let schema = Arc::new(Schema::new(vec![
        Field::new("id", DataType::Int64, false),
        Field::new("kind", DataType::Utf8, false),
        Field::new("score", DataType::Float64, true),
    ]));
    let kinds = ["click", "view", "purchase"];
    RecordBatch::try_new(
        schema,
        vec![
            Arc::new(Int64Array::from_iter_values(0..rows)),
            Arc::new(StringArray::from_iter_values(
                (0..rows).map(|i| kinds[i as usize % kinds.len()]),
            )),
            Arc::new(Float64Array::from_iter_values(
                (0..rows).map(|i| (i % 100) as f64 / 100.0),
            )),
        ],
    )
    .expect("Failed to build events batch")
}

fn session(rows: i64) -> SessionContext {
    let mut ctx = SessionContext::new();
    ctx.register_record_batch("events", events(rows))
        .expect("Failed to register events");
    ctx
}

fn bench_parse(c: &mut Criterion) {
    let mut group = c.benchmark_group("sql/parse");
    for (name, sql) in queries() {
        group.bench_with_input(BenchmarkId::new("query", name), &sql, |b, sql| {
            b.iter(|| black_box(parse_sql(black_box(sql))))
        });
    }
    group.finish();
}

fn bench_plan(c: &mut Criterion) {
    let mut group = c.benchmark_group("sql/plan");
    let ctx = session(10);
    for (name, sql) in queries() {
        group.bench_with_input(BenchmarkId::new("query", name), &sql, |b, sql| {
            b.iter(|| black_box(ctx.sql(black_box(sql))))
        });
    }
    group.finish();
}

fn bench_execute(c: &mut Criterion) {
    let mut group = c.benchmark_group("sql/execute");
    group.sample_size(20);
    for rows in [1_000, 10_000] {
        let ctx = session(rows);
        for (name, sql) in queries() {
            let df = ctx.sql(sql).expect("Failed to plan");
            group.bench_with_input(BenchmarkId::new(name, rows), &df, |b, df| {
                b.iter(|| black_box(df.count()))
            });
        }
    }
    group.finish();
}

fn bench_parquet_scan(c: &mut Criterion) {
    let mut group = c.benchmark_group("sql/parquet");
    group.sample_size(20);

    let dir = TempDir::new().expect("Failed to create temp dir");
    let source = session(50_000);
    source
        .table("events")
        .and_then(|df| df.write_parquet(dir.path(), None))
        .expect("Failed to write parquet");

    let mut ctx = SessionContext::new();
    ctx.register_parquet("events", dir.path(), &ParquetReadOptions::new())
        .expect("Failed to register parquet");

    for (name, sql) in [
        ("full_scan", "SELECT COUNT(*) FROM events"),
        ("filtered", "SELECT COUNT(*) FROM events WHERE id >= 49000"),
    ] {
        let df = ctx.sql(sql).expect("Failed to plan");
        group.bench_function(name, |b| b.iter(|| black_box(df.count())));
    }
    group.finish();
}

criterion_group!(
    benches,
    bench_parse,
    bench_plan,
    bench_execute,
    bench_parquet_scan
);
criterion_main!(benches);
