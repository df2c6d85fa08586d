// Parquet source and writer tests: row groups, nulls, pruning

mod common;

use std::fs;
use std::fs::File;

use arrow::datatypes::{DataType, Field};
use common::{int, orders_batch, query_rows, text, users_and_orders, users_batch, FileFixture};
use parquet::file::reader::{FileReader, SerializedFileReader};
use tabula::{
    Compression, ErrorCode, ParquetReadOptions, SessionConfig, SessionContext, Table,
    WriterProperties,
};

fn row_groups(path: &std::path::Path) -> usize {
    let reader = SerializedFileReader::new(File::open(path).unwrap()).unwrap();
    reader.metadata().num_row_groups()
}

#[test]
fn test_row_group_size() {
    let fixture = FileFixture::new();
    let ctx = users_and_orders();
    let df = ctx.sql("SELECT id FROM users WHERE id < 4").unwrap();

    let mut props = WriterProperties::new();
    props.set_max_row_group_size(1);
    let path = df.write_parquet(fixture.path().join("small"), Some(&props)).unwrap();
    assert_eq!(path.file_name().unwrap(), "part-0.parquet");
    assert_eq!(row_groups(&path), 3);

    let path = df.write_parquet(fixture.path().join("default"), None).unwrap();
    assert_eq!(row_groups(&path), 1);
}

#[test]
fn test_round_trip_keeps_nulls_and_types() {
    let fixture = FileFixture::new();
    let ctx = users_and_orders();

    let mut props = WriterProperties::new();
    props.set_compression(Compression::Zstd);
    ctx.table("users")
        .unwrap()
        .write_parquet(fixture.path().join("users"), Some(&props))
        .unwrap();

    let mut other = SessionContext::new();
    other
        .register_parquet("users", fixture.path().join("users"), &ParquetReadOptions::new())
        .unwrap();
    let table = other.table("users").unwrap().to_table().unwrap();
    assert_eq!(table, Table::from_batch(users_batch()));
    assert_eq!(
        query_rows(&other, "SELECT name FROM users WHERE age IS NULL"),
        vec![vec![text("Carol")]]
    );
}

#[test]
fn test_write_alias_and_created_by() {
    let fixture = FileFixture::new();
    let ctx = users_and_orders();

    let mut props = WriterProperties::new();
    props.set_created_by("tabula tests");
    let path = ctx
        .table("orders")
        .unwrap()
        .write(fixture.path().join("orders"), Some(&props))
        .unwrap();

    let reader = SerializedFileReader::new(File::open(&path).unwrap()).unwrap();
    assert_eq!(
        reader.metadata().file_metadata().created_by(),
        Some("tabula tests")
    );
    assert_eq!(reader.metadata().file_metadata().num_rows(), 4);
}

#[test]
fn test_zero_row_group_size_is_plan_error() {
    let fixture = FileFixture::new();
    let ctx = users_and_orders();

    let mut props = WriterProperties::new();
    props.set_max_row_group_size(0);
    let target = fixture.path().join("never");
    let err = ctx
        .table("users")
        .unwrap()
        .write_parquet(&target, Some(&props))
        .unwrap_err();
    assert_eq!(err.find_root().code(), ErrorCode::Plan);
    assert!(!target.exists());
}

#[test]
fn test_uncreatable_directory_is_io_error() {
    let fixture = FileFixture::new();
    let blocker = fixture.write("blocker", "a plain file");
    let ctx = users_and_orders();
    let err = ctx
        .table("users")
        .unwrap()
        .write_parquet(blocker.join("out"), None)
        .unwrap_err();
    assert_eq!(err.find_root().code(), ErrorCode::Io);
    assert!(err.to_string().starts_with("[data-frame][write-parquet]"));
}

#[test]
fn test_mismatched_files_are_schema_errors() {
    let fixture = FileFixture::new();
    let ctx = users_and_orders();
    ctx.table("users")
        .unwrap()
        .write_parquet(fixture.path().join("mixed/a"), None)
        .unwrap();
    ctx.table("orders")
        .unwrap()
        .write_parquet(fixture.path().join("mixed/b"), None)
        .unwrap();

    let mut other = SessionContext::new();
    let err = other
        .register_parquet("mixed", fixture.path().join("mixed"), &ParquetReadOptions::new())
        .unwrap_err();
    assert_eq!(err.find_root().code(), ErrorCode::Schema);
}

/// Writes `orders` once per year under `root/year=<year>/`.
fn write_years(ctx: &SessionContext, root: &std::path::Path, years: &[i64]) {
    for year in years {
        ctx.sql(&format!("SELECT order_id, amount FROM orders WHERE order_id > {}", 100 + year % 3))
            .unwrap()
            .write_parquet(root.join(format!("year={}", year)), None)
            .unwrap();
    }
}

#[test]
fn test_partitioned_directory() {
    let fixture = FileFixture::new();
    let ctx = users_and_orders();
    let root = fixture.path().join("sales");
    write_years(&ctx, &root, &[2023, 2024]);

    let mut options = ParquetReadOptions::new();
    options.set_table_partition_columns(vec![Field::new("year", DataType::Int64, false)]);

    let mut other = SessionContext::new();
    other.register_parquet("sales", &root, &options).unwrap();
    // 2023 % 3 == 1 keeps three orders, 2024 % 3 == 2 keeps two.
    assert_eq!(
        query_rows(&other, "SELECT year, COUNT(*) FROM sales GROUP BY year ORDER BY year"),
        vec![vec![int(2023), int(3)], vec![int(2024), int(2)]]
    );
}

#[test]
fn test_pruning_tri_state() {
    let fixture = FileFixture::new();
    let ctx = users_and_orders();
    let root = fixture.path().join("sales");
    write_years(&ctx, &root, &[2023, 2024]);

    let register = |config: SessionConfig, pruning: Option<bool>| {
        let mut options = ParquetReadOptions::new();
        options.set_table_partition_column_names(&["year"]);
        if let Some(pruning) = pruning {
            options.set_pruning(pruning);
        }
        let mut session = SessionContext::with_config(config);
        session.register_parquet("sales", &root, &options).unwrap();
        session
    };

    let enabled = register(SessionConfig::new(), Some(true));
    let disabled = register(SessionConfig::new(), Some(false));
    let unset_on = register(SessionConfig::new(), None);
    let unset_off = register(SessionConfig::new().with_parquet_pruning(false), None);

    // A file listed at registration goes missing; only pruned scans avoid it.
    fs::remove_file(root.join("year=2023").join("part-0.parquet")).unwrap();

    let sql = "SELECT COUNT(*) FROM sales WHERE year = '2024'";
    assert_eq!(query_rows(&enabled, sql), vec![vec![int(2)]]);
    assert_eq!(query_rows(&unset_on, sql), vec![vec![int(2)]]);

    for session in [&disabled, &unset_off] {
        let err = session.sql(sql).unwrap().collect().unwrap_err();
        assert_eq!(err.find_root().code(), ErrorCode::Io);
    }
}

#[test]
fn test_row_group_pruning_reads_fewer_rows() {
    let fixture = FileFixture::new();
    let mut ctx = SessionContext::new();
    ctx.register_record_batch("orders", orders_batch()).unwrap();

    let mut props = WriterProperties::new();
    props.set_max_row_group_size(2);
    ctx.sql("SELECT * FROM orders ORDER BY order_id")
        .unwrap()
        .write_parquet(fixture.path().join("orders"), Some(&props))
        .unwrap();

    let mut other = SessionContext::new();
    other
        .register_parquet("orders", fixture.path().join("orders"), &ParquetReadOptions::new())
        .unwrap();
    // Pruning never changes results, only how much is read.
    assert_eq!(
        query_rows(&other, "SELECT order_id FROM orders WHERE order_id >= 103 ORDER BY order_id"),
        vec![vec![int(103)], vec![int(104)]]
    );
    assert_eq!(
        query_rows(&other, "SELECT COUNT(*) FROM orders WHERE order_id > 1000"),
        vec![vec![int(0)]]
    );
}
