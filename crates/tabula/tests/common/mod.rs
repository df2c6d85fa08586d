// Common fixtures for Tabula integration tests

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use arrow::array::{Float64Array, Int32Array, Int64Array, StringArray};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use tabula::{DataFrame, SessionContext};
use tabula_core::query::executor::batch_to_rows;
use tabula_core::Value;
use tempfile::TempDir;

/// Scratch directory for file sources and writes
pub struct FileFixture {
    pub temp_dir: TempDir,
}

impl FileFixture {
    pub fn new() -> Self {
        Self {
            temp_dir: TempDir::new().expect("Failed to create temp dir"),
        }
    }

    pub fn path(&self) -> &Path {
        self.temp_dir.path()
    }

    /// Writes `contents` to `relative`, creating parent directories.
    pub fn write(&self, relative: &str, contents: &str) -> PathBuf {
        let path = self.temp_dir.path().join(relative);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("Failed to create directory");
        }
        fs::write(&path, contents).expect("Failed to write file");
        path
    }
}

impl Default for FileFixture {
    fn default() -> Self {
        Self::new()
    }
}

/// id | name | age (age has a NULL)
#[allow(dead_code)]
pub fn users_batch() -> RecordBatch {
    let schema = Arc::new(Schema::new(vec![
        Field::new("id", DataType::Int64, false),
        Field::new("name", DataType::Utf8, false),
        Field::new("age", DataType::Int32, true),
    ]));
    RecordBatch::try_new(
        schema,
        vec![
            Arc::new(Int64Array::from(vec![1, 2, 3, 4])),
            Arc::new(StringArray::from(vec!["Alice", "Bob", "Carol", "Dave"])),
            Arc::new(Int32Array::from(vec![Some(30), Some(25), None, Some(41)])),
        ],
    )
    .expect("Failed to build users batch")
}

/// order_id | user_id | amount
#[allow(dead_code)]
pub fn orders_batch() -> RecordBatch {
    let schema = Arc::new(Schema::new(vec![
        Field::new("order_id", DataType::Int64, false),
        Field::new("user_id", DataType::Int64, false),
        Field::new("amount", DataType::Float64, false),
    ]));
    RecordBatch::try_new(
        schema,
        vec![
            Arc::new(Int64Array::from(vec![101, 102, 103, 104])),
            Arc::new(Int64Array::from(vec![1, 1, 2, 9])),
            Arc::new(Float64Array::from(vec![10.0, 20.5, 7.25, 99.0])),
        ],
    )
    .expect("Failed to build orders batch")
}

/// Session with `users` and `orders` registered in memory
#[allow(dead_code)]
pub fn users_and_orders() -> SessionContext {
    let mut ctx = SessionContext::new();
    ctx.register_record_batch("users", users_batch())
        .expect("Failed to register users");
    ctx.register_record_batch("orders", orders_batch())
        .expect("Failed to register orders");
    ctx
}

/// Runs `sql` and renders the result as an ASCII table.
#[allow(dead_code)]
pub fn run(ctx: &SessionContext, sql: &str) -> String {
    ctx.sql(sql)
        .unwrap_or_else(|e| panic!("planning `{}` failed: {}", sql, e))
        .to_string_pretty()
        .unwrap_or_else(|e| panic!("executing `{}` failed: {}", sql, e))
}

/// Runs the data frame and decodes every row.
#[allow(dead_code)]
pub fn rows(df: &DataFrame) -> Vec<Vec<Value>> {
    df.collect()
        .expect("Failed to collect")
        .iter()
        .flat_map(|batch| batch_to_rows(batch).expect("Failed to decode batch"))
        .collect()
}

/// Plans and runs `sql`, returning its rows.
#[allow(dead_code)]
pub fn query_rows(ctx: &SessionContext, sql: &str) -> Vec<Vec<Value>> {
    let df = ctx
        .sql(sql)
        .unwrap_or_else(|e| panic!("planning `{}` failed: {}", sql, e));
    rows(&df)
}

#[allow(dead_code)]
pub fn int(v: i64) -> Value {
    Value::Integer(v)
}

#[allow(dead_code)]
pub fn text(s: &str) -> Value {
    Value::String(s.to_string())
}

/// Asserts a rendered table line by line.
#[allow(dead_code)]
pub fn assert_table(actual: &str, expected: &[&str]) {
    let lines: Vec<&str> = actual.lines().collect();
    assert_eq!(lines, expected, "\nactual:\n{}\n", actual);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixture_writes_nested_files() {
        let fixture = FileFixture::new();
        let path = fixture.write("a/b/c.csv", "x\n1\n");
        assert!(path.exists());
    }
}
