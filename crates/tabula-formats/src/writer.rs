//! Writing query results to Parquet and CSV.
//!
//! Both writers create the target directory and produce a single
//! `part-0.<ext>` file inside it. A write that fails part way removes the
//! file it started.

use std::fs::{self, File};
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use ::parquet::arrow::ArrowWriter;
use ::parquet::file::properties::WriterProperties as ParquetWriterProperties;
use arrow::datatypes::SchemaRef;
use arrow::record_batch::RecordBatch;
use tabula_core::{Error, Result, Value};
use tracing::{info, warn};

use crate::options::WriterProperties;

/// File name written by [`write_parquet`]
pub const PARQUET_PART_FILE: &str = "part-0.parquet";

/// File name written by [`write_csv`]
pub const CSV_PART_FILE: &str = "part-0.csv";

/// Writes `batches` to `dir/part-0.parquet` and returns the file path.
pub fn write_parquet(
    dir: impl AsRef<Path>,
    schema: &SchemaRef,
    batches: &[RecordBatch],
    props: &WriterProperties,
) -> Result<PathBuf> {
    if props.max_row_group_size() == 0 {
        return Err(Error::plan("max_row_group_size must be greater than zero"));
    }
    let dir = dir.as_ref();
    fs::create_dir_all(dir)?;
    let path = dir.join(PARQUET_PART_FILE);

    let parquet_props = ParquetWriterProperties::builder()
        .set_max_row_group_size(props.max_row_group_size())
        .set_compression(props.compression().to_parquet())
        .set_created_by(props.created_by().to_string())
        .build();
    let result = File::create(&path)
        .map_err(Error::from)
        .and_then(|file| {
            let mut writer = ArrowWriter::try_new(file, schema.clone(), Some(parquet_props))?;
            for batch in batches {
                writer.write(batch)?;
            }
            writer.close()?;
            Ok(())
        });
    finish(&path, result, batches)
}

/// Writes `batches` to `dir/part-0.csv` with a header row and returns the
/// file path. NULL is written as an empty field.
pub fn write_csv(
    dir: impl AsRef<Path>,
    schema: &SchemaRef,
    batches: &[RecordBatch],
) -> Result<PathBuf> {
    let dir = dir.as_ref();
    fs::create_dir_all(dir)?;
    let path = dir.join(CSV_PART_FILE);

    let result = File::create(&path)
        .map_err(Error::from)
        .and_then(|file| {
            let mut writer = ::csv::Writer::from_writer(BufWriter::new(file));
            writer.write_record(schema.fields().iter().map(|f| f.name().as_str()))?;
            let mut record = Vec::with_capacity(schema.fields().len());
            for batch in batches {
                for row in 0..batch.num_rows() {
                    record.clear();
                    for column in batch.columns() {
                        record.push(csv_field(&Value::from_array(column.as_ref(), row)?));
                    }
                    writer.write_record(&record)?;
                }
            }
            writer.flush()?;
            Ok(())
        });
    finish(&path, result, batches)
}

fn finish(path: &Path, result: Result<()>, batches: &[RecordBatch]) -> Result<PathBuf> {
    match result {
        Ok(()) => {
            let rows: usize = batches.iter().map(|b| b.num_rows()).sum();
            info!(file = %path.display(), rows, "Wrote file");
            Ok(path.to_path_buf())
        }
        Err(err) => {
            warn!(file = %path.display(), error = %err, "Write failed, removing partial file");
            let _ = fs::remove_file(path);
            Err(err)
        }
    }
}

/// Floats keep a fractional part so they read back as floats.
fn csv_field(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::Float(f) if f.is_finite() && f.fract() == 0.0 => format!("{:.1}", f),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ::parquet::file::reader::{FileReader, SerializedFileReader};
    use arrow::array::{Float64Array, Int64Array, StringArray};
    use arrow::datatypes::{DataType, Field, Schema};
    use std::sync::Arc;
    use tabula_core::ErrorCode;
    use tempfile::TempDir;

    fn sample() -> (SchemaRef, RecordBatch) {
        let schema = Arc::new(Schema::new(vec![
            Field::new("id", DataType::Int64, false),
            Field::new("name", DataType::Utf8, true),
            Field::new("score", DataType::Float64, true),
        ]));
        let batch = RecordBatch::try_new(
            schema.clone(),
            vec![
                Arc::new(Int64Array::from(vec![1, 2, 3])),
                Arc::new(StringArray::from(vec![Some("a"), None, Some("c,d")])),
                Arc::new(Float64Array::from(vec![Some(1.0), Some(2.5), None])),
            ],
        )
        .unwrap();
        (schema, batch)
    }

    #[test]
    fn test_parquet_row_group_cap() {
        let dir = TempDir::new().unwrap();
        let (schema, batch) = sample();
        let mut props = WriterProperties::default();
        props.set_max_row_group_size(1);
        let path = write_parquet(dir.path().join("out"), &schema, &[batch], &props).unwrap();
        assert!(path.ends_with("out/part-0.parquet"));

        let reader = SerializedFileReader::new(File::open(&path).unwrap()).unwrap();
        assert_eq!(reader.metadata().num_row_groups(), 3);
    }

    #[test]
    fn test_zero_row_group_size_is_plan_error() {
        let dir = TempDir::new().unwrap();
        let (schema, batch) = sample();
        let mut props = WriterProperties::default();
        props.set_max_row_group_size(0);
        let err = write_parquet(dir.path().join("out"), &schema, &[batch], &props).unwrap_err();
        assert_eq!(err.code(), ErrorCode::Plan);
        assert!(!dir.path().join("out").exists());
    }

    #[test]
    fn test_uncreatable_dir_is_io_error() {
        let dir = TempDir::new().unwrap();
        let blocker = dir.path().join("file");
        File::create(&blocker).unwrap();
        let (schema, batch) = sample();
        let props = WriterProperties::default();
        let err = write_parquet(blocker.join("out"), &schema, &[batch], &props).unwrap_err();
        assert_eq!(err.code(), ErrorCode::Io);
    }

    #[test]
    fn test_csv_output() {
        let dir = TempDir::new().unwrap();
        let (schema, batch) = sample();
        let path = write_csv(dir.path(), &schema, &[batch]).unwrap();
        let contents = fs::read_to_string(path).unwrap();
        assert_eq!(contents, "id,name,score\n1,a,1.0\n2,,2.5\n3,\"c,d\",\n");
    }
}
