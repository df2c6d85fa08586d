//! Materialized query results

use std::fmt;

use arrow::array::ArrayRef;
use arrow::compute::concat_batches;
use arrow::datatypes::SchemaRef;
use arrow::record_batch::RecordBatch;
use arrow::util::pretty::pretty_format_batches;

use tabula_core::{Error, Result};

/// An immutable, fully buffered table.
///
/// Equality is logical: two tables are equal when their fields match and
/// their concatenated contents match, however the rows are chunked into
/// batches.
#[derive(Debug, Clone)]
pub struct Table {
    schema: SchemaRef,
    batches: Vec<RecordBatch>,
}

impl Table {
    /// Creates a table from batches that all share `schema`'s fields.
    pub fn try_new(schema: SchemaRef, batches: Vec<RecordBatch>) -> Result<Self> {
        if let Some(batch) = batches
            .iter()
            .find(|b| b.schema().fields() != schema.fields())
        {
            return Err(Error::schema(format!(
                "Batch schema {:?} does not match table schema {:?}",
                batch.schema().fields(),
                schema.fields()
            )));
        }
        Ok(Self { schema, batches })
    }

    /// Creates a table holding a single batch.
    pub fn from_batch(batch: RecordBatch) -> Self {
        Self {
            schema: batch.schema(),
            batches: vec![batch],
        }
    }

    /// Schema of the table
    pub fn schema(&self) -> SchemaRef {
        self.schema.clone()
    }

    /// The buffered batches, in order
    pub fn batches(&self) -> &[RecordBatch] {
        &self.batches
    }

    /// Total number of rows
    pub fn num_rows(&self) -> usize {
        self.batches.iter().map(|b| b.num_rows()).sum()
    }

    /// Number of columns
    pub fn num_columns(&self) -> usize {
        self.schema.fields().len()
    }

    /// All rows as one batch.
    pub fn to_record_batch(&self) -> Result<RecordBatch> {
        Ok(concat_batches(&self.schema, &self.batches)?)
    }

    /// Column `index` across all batches.
    pub fn column(&self, index: usize) -> Result<ArrayRef> {
        if index >= self.num_columns() {
            return Err(Error::plan(format!(
                "Column index {} out of bounds for table with {} columns",
                index,
                self.num_columns()
            )));
        }
        Ok(self.to_record_batch()?.column(index).clone())
    }
}

impl PartialEq for Table {
    fn eq(&self, other: &Self) -> bool {
        if self.schema.fields() != other.schema.fields() || self.num_rows() != other.num_rows() {
            return false;
        }
        match (self.to_record_batch(), other.to_record_batch()) {
            (Ok(a), Ok(b)) => a.columns() == b.columns(),
            _ => false,
        }
    }
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rendered = if self.batches.is_empty() {
            pretty_format_batches(&[RecordBatch::new_empty(self.schema.clone())])
        } else {
            pretty_format_batches(&self.batches)
        };
        match rendered {
            Ok(table) => write!(f, "{}", table),
            Err(_) => Err(fmt::Error),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::array::{Int32Array, StringArray};
    use arrow::datatypes::{DataType, Field, Schema};
    use std::sync::Arc;

    fn schema() -> SchemaRef {
        Arc::new(Schema::new(vec![
            Field::new("id", DataType::Int32, false),
            Field::new("name", DataType::Utf8, true),
        ]))
    }

    fn batch(ids: Vec<i32>, names: Vec<Option<&str>>) -> RecordBatch {
        RecordBatch::try_new(
            schema(),
            vec![
                Arc::new(Int32Array::from(ids)),
                Arc::new(StringArray::from(names)),
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_equality_ignores_chunking() {
        let whole = Table::from_batch(batch(vec![1, 2, 3], vec![Some("a"), None, Some("c")]));
        let split = Table::try_new(
            schema(),
            vec![
                batch(vec![1], vec![Some("a")]),
                batch(vec![2, 3], vec![None, Some("c")]),
            ],
        )
        .unwrap();
        assert_eq!(whole, split);
        assert_eq!(split.num_rows(), 3);
    }

    #[test]
    fn test_inequality() {
        let a = Table::from_batch(batch(vec![1], vec![Some("a")]));
        let b = Table::from_batch(batch(vec![1], vec![None]));
        assert_ne!(a, b);
    }

    #[test]
    fn test_column_out_of_bounds() {
        let table = Table::from_batch(batch(vec![1], vec![Some("a")]));
        assert!(table.column(2).is_err());
        assert_eq!(table.column(0).unwrap().len(), 1);
    }

    #[test]
    fn test_display_empty_table_keeps_header() {
        let table = Table::try_new(schema(), vec![]).unwrap();
        let rendered = table.to_string();
        assert!(rendered.contains("| id | name |"));
    }
}
