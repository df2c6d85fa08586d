//! File formats a listing table can read.
//!
//! A [`FileFormat`] knows how to derive a schema from a set of files and how
//! to turn one file into record batches. Listing, partition columns and
//! parallelism live in [`crate::listing`].

mod csv;
mod parquet;

use std::fmt;
use std::path::{Path, PathBuf};

use arrow::datatypes::SchemaRef;
use arrow::record_batch::RecordBatch;
use tabula_core::{Result, ScanPredicate};

pub use self::csv::CsvFormat;
pub use self::parquet::ParquetFormat;

/// Reader for one on-disk file format.
pub trait FileFormat: fmt::Debug + Send + Sync {
    /// Label shown in plans, such as `CsvFormat`.
    fn kind(&self) -> &'static str;

    /// Derives the schema shared by `files`, which are sorted and non-empty
    /// unless the source directory held no matching files.
    fn infer_schema(&self, files: &[PathBuf]) -> Result<SchemaRef>;

    /// Checks every file against `file_schema` at registration time.
    fn validate(&self, _files: &[PathBuf], _file_schema: &SchemaRef) -> Result<()> {
        Ok(())
    }

    /// Reads one file. `filters` reference columns of `file_schema` (any
    /// index past its end belongs to a partition column and must be ignored)
    /// and may be used to skip data.
    fn read(
        &self,
        path: &Path,
        file_schema: &SchemaRef,
        filters: &[ScanPredicate],
        batch_size: usize,
    ) -> Result<Vec<RecordBatch>>;
}
