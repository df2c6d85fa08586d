//! Parquet reading with row-group pruning.

use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use ::parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use ::parquet::file::metadata::RowGroupMetaData;
use ::parquet::file::statistics::Statistics;
use arrow::datatypes::{DataType, Schema, SchemaRef};
use arrow::error::ArrowError;
use arrow::record_batch::RecordBatch;
use tabula_core::value::is_string_type;
use tabula_core::{Error, Result, ScanPredicate, Value};
use tracing::debug;

use super::FileFormat;

/// Parquet files. With pruning on, row groups whose statistics prove a
/// filter false are never decoded.
#[derive(Debug, Clone, Copy)]
pub struct ParquetFormat {
    pruning: bool,
}

impl ParquetFormat {
    /// Creates the format with row-group pruning on or off.
    pub fn new(pruning: bool) -> Self {
        Self { pruning }
    }

    /// Whether row-group pruning is on
    pub fn pruning(&self) -> bool {
        self.pruning
    }

    fn file_schema(path: &Path) -> Result<SchemaRef> {
        let file = File::open(path)?;
        let builder = ParquetRecordBatchReaderBuilder::try_new(file)?;
        // Drop the embedded `ARROW:schema` metadata so schemas compare by fields.
        Ok(Arc::new(Schema::new(builder.schema().fields().clone())))
    }
}

impl FileFormat for ParquetFormat {
    fn kind(&self) -> &'static str {
        "ParquetFormat"
    }

    fn infer_schema(&self, files: &[PathBuf]) -> Result<SchemaRef> {
        let Some((first, rest)) = files.split_first() else {
            return Ok(Arc::new(Schema::empty()));
        };
        let schema = Self::file_schema(first)?;
        for path in rest {
            let other = Self::file_schema(path)?;
            if other.fields() != schema.fields() {
                return Err(Error::schema(format!(
                    "Parquet file {} has schema {:?}, expected {:?}",
                    path.display(),
                    other.fields(),
                    schema.fields()
                )));
            }
        }
        Ok(schema)
    }

    fn read(
        &self,
        path: &Path,
        file_schema: &SchemaRef,
        filters: &[ScanPredicate],
        batch_size: usize,
    ) -> Result<Vec<RecordBatch>> {
        let file = File::open(path)?;
        let builder =
            ParquetRecordBatchReaderBuilder::try_new(file)?.with_batch_size(batch_size.max(1));
        let metadata = builder.metadata().clone();
        let total = metadata.num_row_groups();

        // Statistics map to arrow fields by position only for flat schemas.
        let flat =
            metadata.file_metadata().schema_descr().num_columns() == file_schema.fields().len();
        let row_groups: Vec<usize> = if self.pruning && flat && !filters.is_empty() {
            (0..total)
                .filter(|&i| !row_group_excluded(metadata.row_group(i), file_schema, filters))
                .collect()
        } else {
            (0..total).collect()
        };
        debug!(
            file = %path.display(),
            row_groups = total,
            read = row_groups.len(),
            "Reading parquet file"
        );

        let reader = builder.with_row_groups(row_groups).build()?;
        let batches = reader.collect::<std::result::Result<Vec<_>, ArrowError>>()?;
        Ok(batches)
    }
}

fn row_group_excluded(
    row_group: &RowGroupMetaData,
    file_schema: &Schema,
    filters: &[ScanPredicate],
) -> bool {
    filters.iter().any(|filter| {
        if filter.column >= file_schema.fields().len() {
            return false;
        }
        let data_type = file_schema.field(filter.column).data_type();
        row_group
            .column(filter.column)
            .statistics()
            .and_then(|stats| statistics_bounds(stats, data_type))
            .is_some_and(|(min, max)| filter.excludes_range(&min, &max))
    })
}

/// Min/max of a column chunk as values of the column's arrow type.
fn statistics_bounds(stats: &Statistics, data_type: &DataType) -> Option<(Value, Value)> {
    let unsigned = data_type.is_unsigned_integer();
    let bounds = match stats {
        Statistics::Boolean(s) => (
            Value::Boolean(*s.min_opt()?),
            Value::Boolean(*s.max_opt()?),
        ),
        Statistics::Int32(s) if unsigned => (
            Value::UInteger(*s.min_opt()? as u32 as u64),
            Value::UInteger(*s.max_opt()? as u32 as u64),
        ),
        Statistics::Int32(s) => (
            Value::Integer(*s.min_opt()? as i64),
            Value::Integer(*s.max_opt()? as i64),
        ),
        Statistics::Int64(s) if unsigned => (
            Value::UInteger(*s.min_opt()? as u64),
            Value::UInteger(*s.max_opt()? as u64),
        ),
        Statistics::Int64(s) => (Value::Integer(*s.min_opt()?), Value::Integer(*s.max_opt()?)),
        Statistics::Float(s) => (
            Value::Float(*s.min_opt()? as f64),
            Value::Float(*s.max_opt()? as f64),
        ),
        Statistics::Double(s) => (Value::Float(*s.min_opt()?), Value::Float(*s.max_opt()?)),
        Statistics::ByteArray(s) if is_string_type(data_type) => (
            Value::String(s.min_opt()?.as_utf8().ok()?.to_string()),
            Value::String(s.max_opt()?.as_utf8().ok()?.to_string()),
        ),
        _ => return None,
    };
    Some(bounds)
}
