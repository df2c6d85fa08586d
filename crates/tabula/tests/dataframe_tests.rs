// DataFrame output tests: rendering, counting, export, explain

mod common;

use arrow::array::{Array, StructArray};
use arrow::ffi::from_ffi;
use common::{assert_table, run, users_and_orders};
use tabula::ErrorCode;

#[test]
fn test_render_with_nulls() {
    let ctx = users_and_orders();
    assert_table(
        &run(&ctx, "SELECT name, age FROM users ORDER BY id"),
        &[
            "+-------+-----+",
            "| name  | age |",
            "+-------+-----+",
            "| Alice | 30  |",
            "| Bob   | 25  |",
            "| Carol |     |",
            "| Dave  | 41  |",
            "+-------+-----+",
        ],
    );
}

#[test]
fn test_render_empty_result_keeps_header() {
    let ctx = users_and_orders();
    assert_table(
        &run(&ctx, "SELECT id FROM users WHERE id < 0"),
        &["+----+", "| id |", "+----+", "+----+"],
    );
}

#[test]
fn test_show_variants() {
    let ctx = users_and_orders();
    let df = ctx.sql("SELECT * FROM orders").unwrap();
    df.show().unwrap();
    df.show_limit(2).unwrap();
    df.show_limit(0).unwrap();

    let err = ctx.sql("SELECT id / 0 FROM users").unwrap().show().unwrap_err();
    assert_eq!(err.find_root().code(), ErrorCode::Execution);
    assert!(err.to_string().starts_with("[data-frame][show]"));
}

#[test]
fn test_count_matches_collect() {
    let ctx = users_and_orders();
    let df = ctx
        .sql("SELECT u.name FROM users u JOIN orders o ON u.id = o.user_id")
        .unwrap();
    let collected: usize = df.collect().unwrap().iter().map(|b| b.num_rows()).sum();
    assert_eq!(df.count().unwrap(), collected);
    assert_eq!(collected, 3);
}

#[test]
fn test_export_round_trip() {
    let ctx = users_and_orders();
    let df = ctx.sql("SELECT id, name FROM users WHERE id <= 2").unwrap();
    let exported = df.export().unwrap();
    assert_eq!(exported.num_rows, 2);
    assert_eq!(exported.num_arrays(), 1);

    let mut arrays = exported.arrays;
    let array = arrays.pop().unwrap();
    let data = unsafe { from_ffi(array, &exported.schema) }.unwrap();
    let structs = StructArray::from(data);
    assert_eq!(structs.len(), 2);
    assert_eq!(structs.num_columns(), 2);
}

#[test]
fn test_export_empty_result() {
    let ctx = users_and_orders();
    let exported = ctx
        .sql("SELECT id FROM users WHERE id > 10")
        .unwrap()
        .export()
        .unwrap();
    assert_eq!(exported.num_rows, 0);
    assert_eq!(exported.num_arrays(), 0);
}

#[test]
fn test_explain_lists_operators() {
    let ctx = users_and_orders();
    let plan = ctx
        .sql("SELECT user_id, COUNT(*) FROM orders WHERE amount > 5 GROUP BY user_id ORDER BY user_id LIMIT 2")
        .unwrap()
        .explain();
    for operator in ["Limit", "Sort", "Aggregate", "TableScan"] {
        assert!(plan.contains(operator), "{} missing from\n{}", operator, plan);
    }
}

#[test]
fn test_clone_runs_independently() {
    let ctx = users_and_orders();
    let df = ctx.sql("SELECT * FROM users").unwrap();
    let copy = df.clone();
    drop(df);
    assert_eq!(copy.count().unwrap(), 4);
}
