//! Listing tables: a file or a directory tree read through a [`FileFormat`].
//!
//! Directories are listed once, at registration, recursively and in sorted
//! order. Path segments of the form `key=value` below the root supply
//! partition columns:
//!
//! ```text
//! root/
//!   year=2023/month=12/part-0.parquet   -> year = 2023, month = 12
//!   year=2024/month=01/part-0.parquet   -> year = 2024, month = 1
//!   README.parquet                      -> skipped (no `year`)
//! ```

use std::fs;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use arrow::datatypes::{Field, SchemaRef};
use arrow::record_batch::RecordBatch;
use rayon::prelude::*;
use rayon::ThreadPool;
use tabula_core::value::build_array;
use tabula_core::{Error, Result, ScanPredicate, TableProvider, Value};
use tracing::{debug, info};

use crate::file_format::FileFormat;
use crate::options::table_schema;

/// How a [`ListingTable`] reads its files.
#[derive(Debug, Clone)]
pub struct ListingOptions {
    /// Format of every listed file
    pub format: Arc<dyn FileFormat>,
    /// Suffix a file must have to be listed; empty lists every file
    pub file_extension: String,
    /// Columns taken from `key=value` path segments
    pub table_partition_columns: Vec<Field>,
    /// Skip files whose partition values make a scan filter false
    pub prune_partitions: bool,
}

/// One listed file and the values of its partition columns.
#[derive(Debug, Clone)]
pub struct PartitionedFile {
    /// Location on disk
    pub path: PathBuf,
    /// One value per declared partition column, in declaration order
    pub partition_values: Vec<Value>,
}

/// A table provider over files on the local filesystem.
#[derive(Debug)]
pub struct ListingTable {
    root: PathBuf,
    files: Vec<PartitionedFile>,
    file_schema: SchemaRef,
    schema: SchemaRef,
    options: ListingOptions,
    pool: Arc<ThreadPool>,
}

impl ListingTable {
    /// Lists `root`, resolves partition values and derives the schema.
    ///
    /// Fails with an I/O error when `root` cannot be read, and with a schema
    /// error when a file or partition value does not fit the schema.
    pub fn try_new(
        root: impl AsRef<Path>,
        options: ListingOptions,
        pool: Arc<ThreadPool>,
    ) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        let paths = list_files(&root, &options.file_extension)?;

        let mut files = Vec::with_capacity(paths.len());
        for path in paths {
            match partition_values(&root, &path, &options.table_partition_columns)? {
                Some(partition_values) => files.push(PartitionedFile {
                    path,
                    partition_values,
                }),
                None => debug!(file = %path.display(), "Skipping file outside partition layout"),
            }
        }

        let listed: Vec<PathBuf> = files.iter().map(|f| f.path.clone()).collect();
        let file_schema = options.format.infer_schema(&listed)?;
        options.format.validate(&listed, &file_schema)?;
        for column in &options.table_partition_columns {
            if file_schema.field_with_name(column.name()).is_ok() {
                return Err(Error::schema(format!(
                    "Partition column {} is also a file column",
                    column.name()
                )));
            }
        }
        let schema = table_schema(&file_schema, &options.table_partition_columns);

        info!(
            root = %root.display(),
            format = options.format.kind(),
            files = files.len(),
            columns = schema.fields().len(),
            "Listed table files"
        );
        Ok(Self {
            root,
            files,
            file_schema,
            schema,
            options,
            pool,
        })
    }

    /// Registered root path
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Files the table reads, in scan order
    pub fn files(&self) -> &[PartitionedFile] {
        &self.files
    }

    /// Schema of the file columns alone
    pub fn file_schema(&self) -> SchemaRef {
        self.file_schema.clone()
    }

    fn partition_pruned(&self, file: &PartitionedFile, filters: &[ScanPredicate]) -> bool {
        let width = self.file_schema.fields().len();
        filters.iter().any(|filter| {
            filter.column >= width
                && file
                    .partition_values
                    .get(filter.column - width)
                    .and_then(|value| filter.evaluate(value))
                    == Some(false)
        })
    }

    fn read_file(
        &self,
        file: &PartitionedFile,
        filters: &[ScanPredicate],
        batch_size: usize,
    ) -> Result<Vec<RecordBatch>> {
        let batches = self
            .options
            .format
            .read(&file.path, &self.file_schema, filters, batch_size)?;
        if self.options.table_partition_columns.is_empty() {
            return Ok(batches);
        }

        let partition_fields = &self.schema.fields()[self.file_schema.fields().len()..];
        batches
            .into_iter()
            .map(|batch| {
                let mut columns = batch.columns().to_vec();
                for (field, value) in partition_fields.iter().zip(&file.partition_values) {
                    let values = std::iter::repeat(value).take(batch.num_rows());
                    columns.push(build_array(field.data_type(), values)?);
                }
                Ok(RecordBatch::try_new(self.schema.clone(), columns)?)
            })
            .collect()
    }
}

impl TableProvider for ListingTable {
    fn schema(&self) -> SchemaRef {
        self.schema.clone()
    }

    fn scan(&self, filters: &[ScanPredicate], batch_size: usize) -> Result<Vec<RecordBatch>> {
        let files: Vec<&PartitionedFile> = if self.options.prune_partitions {
            self.files
                .iter()
                .filter(|file| !self.partition_pruned(file, filters))
                .collect()
        } else {
            self.files.iter().collect()
        };
        debug!(
            root = %self.root.display(),
            files = files.len(),
            pruned = self.files.len() - files.len(),
            "Scanning listing table"
        );

        // Collecting into a Vec keeps file order regardless of which worker
        // finishes first.
        let per_file: Vec<Vec<RecordBatch>> = self.pool.install(|| {
            files
                .par_iter()
                .map(|file| self.read_file(file, filters, batch_size))
                .collect::<Result<Vec<_>>>()
        })?;
        Ok(per_file.into_iter().flatten().collect())
    }

    fn kind(&self) -> &'static str {
        self.options.format.kind()
    }
}

/// Sorted files under `root` (or `root` itself) ending in `extension`.
fn list_files(root: &Path, extension: &str) -> Result<Vec<PathBuf>> {
    let metadata = fs::metadata(root)?;
    if metadata.is_file() {
        return Ok(vec![root.to_path_buf()]);
    }
    let mut files = Vec::new();
    let mut pending = vec![root.to_path_buf()];
    while let Some(dir) = pending.pop() {
        for entry in fs::read_dir(&dir)? {
            let path = entry?.path();
            if path.is_dir() {
                pending.push(path);
            } else if path.to_string_lossy().ends_with(extension) {
                files.push(path);
            }
        }
    }
    files.sort();
    Ok(files)
}

/// Partition values for `path`, or `None` when a declared key is missing.
fn partition_values(root: &Path, path: &Path, columns: &[Field]) -> Result<Option<Vec<Value>>> {
    if columns.is_empty() {
        return Ok(Some(Vec::new()));
    }
    let relative = path.strip_prefix(root).unwrap_or(path);
    let segments: Vec<(&str, &str)> = relative
        .parent()
        .into_iter()
        .flat_map(|dir| dir.components())
        .filter_map(|component| match component {
            Component::Normal(segment) => segment.to_str()?.split_once('='),
            _ => None,
        })
        .collect();

    let mut values = Vec::with_capacity(columns.len());
    for column in columns {
        let Some((_, raw)) = segments.iter().find(|(key, _)| *key == column.name()) else {
            return Ok(None);
        };
        let value = Value::String(raw.to_string())
            .cast_to(column.data_type())
            .map_err(|_| {
                Error::schema(format!(
                    "Invalid partition value '{}' for column {} of type {} in {}",
                    raw,
                    column.name(),
                    column.data_type(),
                    path.display()
                ))
            })?;
        values.push(value);
    }
    Ok(Some(values))
}
