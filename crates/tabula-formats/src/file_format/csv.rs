//! CSV reading and schema inference.
//!
//! Inference samples records across the listed files in order and assigns
//! each column the narrowest type of this lattice that holds every
//! non-empty sample:
//!
//! ```text
//!   Boolean   Int64
//!      \        |
//!       \    Float64
//!        \     /
//!         Utf8
//! ```

use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use ::csv::{Reader, ReaderBuilder, StringRecord};
use arrow::datatypes::{DataType, Field, Schema, SchemaRef};
use arrow::record_batch::{RecordBatch, RecordBatchOptions};
use tabula_core::value::build_array;
use tabula_core::{Error, Result, ScanPredicate, Value};
use tracing::debug;

use super::FileFormat;
use crate::options::DEFAULT_SCHEMA_INFER_MAX_RECORDS;

/// CSV files with an optional header line.
#[derive(Debug, Clone)]
pub struct CsvFormat {
    has_header: bool,
    delimiter: u8,
    schema: Option<SchemaRef>,
    schema_infer_max_records: usize,
}

impl Default for CsvFormat {
    fn default() -> Self {
        Self {
            has_header: true,
            delimiter: b',',
            schema: None,
            schema_infer_max_records: DEFAULT_SCHEMA_INFER_MAX_RECORDS,
        }
    }
}

impl CsvFormat {
    /// Whether the first line of each file is a header
    pub fn with_has_header(mut self, has_header: bool) -> Self {
        self.has_header = has_header;
        self
    }

    /// Field delimiter byte
    pub fn with_delimiter(mut self, delimiter: u8) -> Self {
        self.delimiter = delimiter;
        self
    }

    /// Explicit schema; `None` means infer
    pub fn with_schema(mut self, schema: Option<SchemaRef>) -> Self {
        self.schema = schema;
        self
    }

    /// Records sampled for inference
    pub fn with_schema_infer_max_records(mut self, max_records: usize) -> Self {
        self.schema_infer_max_records = max_records;
        self
    }

    fn open(&self, path: &Path) -> Result<Reader<BufReader<File>>> {
        let file = File::open(path)?;
        Ok(ReaderBuilder::new()
            .has_headers(self.has_header)
            .delimiter(self.delimiter)
            .from_reader(BufReader::new(file)))
    }

    fn infer(&self, files: &[PathBuf]) -> Result<SchemaRef> {
        let mut names: Option<Vec<String>> = None;
        let mut types: Vec<InferredType> = Vec::new();
        let mut remaining = self.schema_infer_max_records;

        for path in files {
            let mut reader = self.open(path)?;
            let headers = reader.headers()?.clone();
            match &names {
                None => {
                    names = Some(self.column_names(&headers));
                    types = vec![InferredType::Unknown; headers.len()];
                }
                Some(existing) if existing.len() != headers.len() && !headers.is_empty() => {
                    return Err(Error::schema(format!(
                        "CSV file {} has {} columns, expected {}",
                        path.display(),
                        headers.len(),
                        existing.len()
                    )));
                }
                Some(_) => {}
            }
            if remaining == 0 {
                break;
            }
            for record in reader.records() {
                let record = record?;
                for (ty, field) in types.iter_mut().zip(record.iter()) {
                    *ty = ty.merge(InferredType::classify(field));
                }
                remaining -= 1;
                if remaining == 0 {
                    break;
                }
            }
        }

        let names = names.unwrap_or_default();
        let fields: Vec<Field> = names
            .into_iter()
            .zip(types)
            .map(|(name, ty)| Field::new(name, ty.data_type(), true))
            .collect();
        debug!(files = files.len(), columns = fields.len(), "Inferred CSV schema");
        Ok(Arc::new(Schema::new(fields)))
    }

    fn column_names(&self, headers: &StringRecord) -> Vec<String> {
        if self.has_header {
            headers.iter().map(str::to_string).collect()
        } else {
            (1..=headers.len()).map(|i| format!("column_{}", i)).collect()
        }
    }
}

impl FileFormat for CsvFormat {
    fn kind(&self) -> &'static str {
        "CsvFormat"
    }

    fn infer_schema(&self, files: &[PathBuf]) -> Result<SchemaRef> {
        match &self.schema {
            Some(schema) => Ok(schema.clone()),
            None => self.infer(files),
        }
    }

    fn validate(&self, files: &[PathBuf], file_schema: &SchemaRef) -> Result<()> {
        // Inferred schemas hold every sampled value by construction.
        if self.schema.is_none() {
            return Ok(());
        }
        for path in files {
            self.read(path, file_schema, &[], usize::MAX)?;
        }
        Ok(())
    }

    fn read(
        &self,
        path: &Path,
        file_schema: &SchemaRef,
        _filters: &[ScanPredicate],
        batch_size: usize,
    ) -> Result<Vec<RecordBatch>> {
        let mut reader = self.open(path)?;
        let width = reader.headers()?.len();
        let expected = file_schema.fields().len();
        if width != 0 && width != expected {
            return Err(Error::schema(format!(
                "CSV file {} has {} columns but the schema declares {}",
                path.display(),
                width,
                expected
            )));
        }

        let batch_size = batch_size.max(1);
        let mut batches = Vec::new();
        let mut columns: Vec<Vec<Value>> = vec![Vec::new(); expected];
        let mut rows = 0;
        for record in reader.records() {
            let record = record?;
            let line = record.position().map_or(0, |p| p.line());
            for (i, field) in file_schema.fields().iter().enumerate() {
                let raw = record.get(i).unwrap_or_default();
                columns[i].push(parse_field(raw, field, line)?);
            }
            rows += 1;
            if rows == batch_size {
                batches.push(finish_batch(file_schema, &mut columns, rows)?);
                rows = 0;
            }
        }
        if rows > 0 {
            batches.push(finish_batch(file_schema, &mut columns, rows)?);
        }
        Ok(batches)
    }
}

/// Empty fields are NULL for every type.
fn parse_field(raw: &str, field: &Field, line: u64) -> Result<Value> {
    if raw.is_empty() {
        if !field.is_nullable() {
            return Err(Error::schema(format!(
                "Empty value for non-nullable column {} at line {}",
                field.name(),
                line
            )));
        }
        return Ok(Value::Null);
    }
    Value::String(raw.to_string())
        .cast_to(field.data_type())
        .map_err(|_| {
            Error::schema(format!(
                "Error while parsing value '{}' as type {} for column {} at line {}",
                raw,
                field.data_type(),
                field.name(),
                line
            ))
        })
}

fn finish_batch(
    schema: &SchemaRef,
    columns: &mut [Vec<Value>],
    rows: usize,
) -> Result<RecordBatch> {
    let arrays = schema
        .fields()
        .iter()
        .zip(columns.iter_mut())
        .map(|(field, values)| {
            let array = build_array(field.data_type(), values.iter());
            values.clear();
            array
        })
        .collect::<Result<Vec<_>>>()?;
    let options = RecordBatchOptions::new().with_row_count(Some(rows));
    Ok(RecordBatch::try_new_with_options(
        schema.clone(),
        arrays,
        &options,
    )?)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum InferredType {
    /// Only empty samples so far
    Unknown,
    Boolean,
    Int64,
    Float64,
    Utf8,
}

impl InferredType {
    fn classify(raw: &str) -> Self {
        if raw.is_empty() {
            InferredType::Unknown
        } else if raw.eq_ignore_ascii_case("true") || raw.eq_ignore_ascii_case("false") {
            InferredType::Boolean
        } else if raw.parse::<i64>().is_ok() {
            InferredType::Int64
        } else if is_integer_literal(raw) {
            // Out of i64 range; Float64 would silently round it.
            InferredType::Utf8
        } else if raw.bytes().any(|b| b.is_ascii_digit()) && raw.parse::<f64>().is_ok() {
            InferredType::Float64
        } else {
            InferredType::Utf8
        }
    }

    fn merge(self, other: Self) -> Self {
        use InferredType::*;
        match (self, other) {
            (Unknown, t) | (t, Unknown) => t,
            (a, b) if a == b => a,
            (Int64, Float64) | (Float64, Int64) => Float64,
            _ => Utf8,
        }
    }

    fn data_type(self) -> DataType {
        match self {
            InferredType::Unknown | InferredType::Utf8 => DataType::Utf8,
            InferredType::Boolean => DataType::Boolean,
            InferredType::Int64 => DataType::Int64,
            InferredType::Float64 => DataType::Float64,
        }
    }
}

fn is_integer_literal(raw: &str) -> bool {
    let digits = raw.strip_prefix(&['+', '-'][..]).unwrap_or(raw);
    !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit())
}
