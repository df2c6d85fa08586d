//! Table providers: the sources a plan scans.

use std::cmp::Ordering;
use std::fmt;

use arrow::datatypes::SchemaRef;
use arrow::record_batch::RecordBatch;

use crate::error::{Error, Result};
use crate::value::{is_supported_type, Value};

/// Comparison used by a [`ScanPredicate`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComparisonOp {
    /// `=`
    Eq,
    /// `!=` or `<>`
    NotEq,
    /// `<`
    Lt,
    /// `<=`
    LtEq,
    /// `>`
    Gt,
    /// `>=`
    GtEq,
}

impl ComparisonOp {
    /// The operator with its operands swapped (`1 < a` is `a > 1`).
    pub fn swap(self) -> Self {
        match self {
            ComparisonOp::Eq => ComparisonOp::Eq,
            ComparisonOp::NotEq => ComparisonOp::NotEq,
            ComparisonOp::Lt => ComparisonOp::Gt,
            ComparisonOp::LtEq => ComparisonOp::GtEq,
            ComparisonOp::Gt => ComparisonOp::Lt,
            ComparisonOp::GtEq => ComparisonOp::LtEq,
        }
    }

    /// Applies the operator to an ordering between left and right operand.
    pub fn matches(self, ordering: Ordering) -> bool {
        match self {
            ComparisonOp::Eq => ordering == Ordering::Equal,
            ComparisonOp::NotEq => ordering != Ordering::Equal,
            ComparisonOp::Lt => ordering == Ordering::Less,
            ComparisonOp::LtEq => ordering != Ordering::Greater,
            ComparisonOp::Gt => ordering == Ordering::Greater,
            ComparisonOp::GtEq => ordering != Ordering::Less,
        }
    }
}

impl fmt::Display for ComparisonOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ComparisonOp::Eq => "=",
            ComparisonOp::NotEq => "!=",
            ComparisonOp::Lt => "<",
            ComparisonOp::LtEq => "<=",
            ComparisonOp::Gt => ">",
            ComparisonOp::GtEq => ">=",
        };
        f.write_str(s)
    }
}

/// `column <op> literal`, handed to providers so they can skip data.
///
/// Pruning is inexact: the plan re-applies the full WHERE clause above the
/// scan, so a provider may ignore predicates freely.
#[derive(Debug, Clone, PartialEq)]
pub struct ScanPredicate {
    /// Index into the provider's schema
    pub column: usize,
    /// How the column compares to `value`
    pub op: ComparisonOp,
    /// Literal right-hand side
    pub value: Value,
}

impl ScanPredicate {
    /// Evaluates the predicate against one value. `None` means unknown (NULL).
    pub fn evaluate(&self, value: &Value) -> Option<bool> {
        value.compare(&self.value).map(|ord| self.op.matches(ord))
    }

    /// True if no value in `[min, max]` can satisfy the predicate.
    pub fn excludes_range(&self, min: &Value, max: &Value) -> bool {
        let (Some(lo), Some(hi)) = (min.compare(&self.value), max.compare(&self.value)) else {
            return false;
        };
        match self.op {
            ComparisonOp::Eq => lo == Ordering::Greater || hi == Ordering::Less,
            ComparisonOp::NotEq => lo == Ordering::Equal && hi == Ordering::Equal,
            ComparisonOp::Lt => lo != Ordering::Less,
            ComparisonOp::LtEq => lo == Ordering::Greater,
            ComparisonOp::Gt => hi != Ordering::Greater,
            ComparisonOp::GtEq => hi == Ordering::Less,
        }
    }
}

impl fmt::Display for ScanPredicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{} {} {}", self.column, self.op, self.value)
    }
}

/// A named tabular source that can be scanned.
pub trait TableProvider: fmt::Debug + Send + Sync {
    /// Schema of every batch returned by [`TableProvider::scan`].
    fn schema(&self) -> SchemaRef;

    /// Reads the whole source.
    ///
    /// `filters` may be used to skip data; `batch_size` is a hint for the
    /// maximum number of rows per returned batch.
    fn scan(&self, filters: &[ScanPredicate], batch_size: usize) -> Result<Vec<RecordBatch>>;

    /// Short label used when displaying plans.
    fn kind(&self) -> &'static str;
}

/// In-memory record batches.
#[derive(Debug, Clone)]
pub struct MemTable {
    schema: SchemaRef,
    batches: Vec<RecordBatch>,
}

impl MemTable {
    /// Creates a table from batches that all share `schema`.
    pub fn try_new(schema: SchemaRef, batches: Vec<RecordBatch>) -> Result<Self> {
        for field in schema.fields() {
            if !is_supported_type(field.data_type()) {
                return Err(Error::not_implemented(format!(
                    "Unsupported data type {} for column {}",
                    field.data_type(),
                    field.name()
                )));
            }
        }
        for (i, batch) in batches.iter().enumerate() {
            if batch.schema().fields() != schema.fields() {
                return Err(Error::schema(format!(
                    "Mismatch between schema and batches: batch {} has schema {:?}, expected {:?}",
                    i,
                    batch.schema().fields(),
                    schema.fields()
                )));
            }
        }
        Ok(Self { schema, batches })
    }

    /// Number of rows across all batches.
    pub fn num_rows(&self) -> usize {
        self.batches.iter().map(|b| b.num_rows()).sum()
    }
}

impl TableProvider for MemTable {
    fn schema(&self) -> SchemaRef {
        self.schema.clone()
    }

    fn scan(&self, _filters: &[ScanPredicate], _batch_size: usize) -> Result<Vec<RecordBatch>> {
        Ok(self.batches.clone())
    }

    fn kind(&self) -> &'static str {
        "MemTable"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::array::Int64Array;
    use arrow::datatypes::{DataType, Field, Schema};
    use std::sync::Arc;

    fn predicate(op: ComparisonOp, v: i64) -> ScanPredicate {
        ScanPredicate {
            column: 0,
            op,
            value: Value::Integer(v),
        }
    }

    #[test]
    fn test_excludes_range() {
        let (min, max) = (Value::Integer(10), Value::Integer(20));
        assert!(predicate(ComparisonOp::Eq, 5).excludes_range(&min, &max));
        assert!(!predicate(ComparisonOp::Eq, 15).excludes_range(&min, &max));
        assert!(predicate(ComparisonOp::Gt, 20).excludes_range(&min, &max));
        assert!(!predicate(ComparisonOp::GtEq, 20).excludes_range(&min, &max));
        assert!(predicate(ComparisonOp::Lt, 10).excludes_range(&min, &max));
        assert!(!predicate(ComparisonOp::NotEq, 10).excludes_range(&min, &max));
        assert!(!predicate(ComparisonOp::Eq, 5).excludes_range(&Value::Null, &max));
    }

    #[test]
    fn test_memtable_rejects_mismatched_batches() {
        let schema = Arc::new(Schema::new(vec![Field::new("a", DataType::Int64, true)]));
        let other = Arc::new(Schema::new(vec![Field::new("b", DataType::Int64, true)]));
        let batch =
            RecordBatch::try_new(other, vec![Arc::new(Int64Array::from(vec![1, 2]))]).unwrap();
        let err = MemTable::try_new(schema, vec![batch]).unwrap_err();
        assert_eq!(err.code(), crate::ErrorCode::Schema);
    }
}
