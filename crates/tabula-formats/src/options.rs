//! Read options for file sources and properties for file writes.
//!
//! All option types follow the same builder idiom: a `Default` with the
//! documented defaults plus a get/set pair per field.

use std::sync::Arc;

use arrow::datatypes::{DataType, Field, Schema, SchemaRef};
use serde::{Deserialize, Serialize};

use crate::file_format::{CsvFormat, FileFormat, ParquetFormat};
use crate::listing::ListingOptions;

/// Default number of records sampled when inferring a CSV schema
pub const DEFAULT_SCHEMA_INFER_MAX_RECORDS: usize = 1000;

/// Default row group cap for Parquet writes
pub const DEFAULT_MAX_ROW_GROUP_SIZE: usize = 1024 * 1024;

/// Options for registering CSV files.
#[derive(Debug, Clone)]
pub struct CsvReadOptions {
    has_header: bool,
    delimiter: u8,
    schema: Option<SchemaRef>,
    schema_infer_max_records: usize,
    file_extension: String,
    table_partition_columns: Option<Vec<Field>>,
}

impl Default for CsvReadOptions {
    fn default() -> Self {
        Self {
            has_header: true,
            delimiter: b',',
            schema: None,
            schema_infer_max_records: DEFAULT_SCHEMA_INFER_MAX_RECORDS,
            file_extension: ".csv".to_string(),
            table_partition_columns: None,
        }
    }
}

impl CsvReadOptions {
    /// Creates options with the defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the first line of each file is a header
    pub fn has_header(&self) -> bool {
        self.has_header
    }

    /// Sets whether the first line of each file is a header
    pub fn set_has_header(&mut self, has_header: bool) -> &mut Self {
        self.has_header = has_header;
        self
    }

    /// Field delimiter byte
    pub fn delimiter(&self) -> u8 {
        self.delimiter
    }

    /// Sets the field delimiter byte
    pub fn set_delimiter(&mut self, delimiter: u8) -> &mut Self {
        self.delimiter = delimiter;
        self
    }

    /// Explicit schema, if one was set
    pub fn schema(&self) -> Option<&SchemaRef> {
        self.schema.as_ref()
    }

    /// Sets an explicit schema. This disables inference.
    pub fn set_schema(&mut self, schema: impl Into<SchemaRef>) -> &mut Self {
        self.schema = Some(schema.into());
        self
    }

    /// Removes the explicit schema so it is inferred again.
    pub fn unset_schema(&mut self) -> &mut Self {
        self.schema = None;
        self
    }

    /// Number of records sampled for inference
    pub fn schema_infer_max_records(&self) -> usize {
        self.schema_infer_max_records
    }

    /// Sets the number of records sampled for inference
    pub fn set_schema_infer_max_records(&mut self, max_records: usize) -> &mut Self {
        self.schema_infer_max_records = max_records;
        self
    }

    /// Suffix a file must have to be read from a directory
    pub fn file_extension(&self) -> &str {
        &self.file_extension
    }

    /// Sets the file suffix used when listing directories
    pub fn set_file_extension(&mut self, extension: impl Into<String>) -> &mut Self {
        self.file_extension = extension.into();
        self
    }

    /// Declared partition columns
    pub fn table_partition_columns(&self) -> Option<&[Field]> {
        self.table_partition_columns.as_deref()
    }

    /// Declares typed partition columns
    pub fn set_table_partition_columns(&mut self, columns: Vec<Field>) -> &mut Self {
        self.table_partition_columns = Some(columns);
        self
    }

    /// Declares partition columns by name, typed Utf8
    pub fn set_table_partition_column_names<S: AsRef<str>>(&mut self, names: &[S]) -> &mut Self {
        self.table_partition_columns = Some(utf8_columns(names));
        self
    }

    /// Builds the listing options for a CSV source. Partition pruning is
    /// always on for CSV.
    pub fn to_listing_options(&self) -> ListingOptions {
        let format = CsvFormat::default()
            .with_has_header(self.has_header)
            .with_delimiter(self.delimiter)
            .with_schema(self.schema.clone())
            .with_schema_infer_max_records(self.schema_infer_max_records);
        ListingOptions {
            format: Arc::new(format) as Arc<dyn FileFormat>,
            file_extension: self.file_extension.clone(),
            table_partition_columns: self.table_partition_columns.clone().unwrap_or_default(),
            prune_partitions: true,
        }
    }
}

/// Tri-state pruning flag. `Unset` defers to the session default.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Pruning {
    /// Use the session's `parquet_pruning` setting
    #[default]
    Unset,
    /// Skip partitions and row groups that cannot match a filter
    Enabled,
    /// Read every listed file and row group
    Disabled,
}

/// Options for registering Parquet files.
#[derive(Debug, Clone)]
pub struct ParquetReadOptions {
    file_extension: String,
    table_partition_columns: Option<Vec<Field>>,
    pruning: Pruning,
}

impl Default for ParquetReadOptions {
    fn default() -> Self {
        Self {
            file_extension: ".parquet".to_string(),
            table_partition_columns: None,
            pruning: Pruning::Unset,
        }
    }
}

impl ParquetReadOptions {
    /// Creates options with the defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Suffix a file must have to be read from a directory
    pub fn file_extension(&self) -> &str {
        &self.file_extension
    }

    /// Sets the file suffix used when listing directories
    pub fn set_file_extension(&mut self, extension: impl Into<String>) -> &mut Self {
        self.file_extension = extension.into();
        self
    }

    /// Declared partition columns
    pub fn table_partition_columns(&self) -> Option<&[Field]> {
        self.table_partition_columns.as_deref()
    }

    /// Declares typed partition columns
    pub fn set_table_partition_columns(&mut self, columns: Vec<Field>) -> &mut Self {
        self.table_partition_columns = Some(columns);
        self
    }

    /// Declares partition columns by name, typed Utf8
    pub fn set_table_partition_column_names<S: AsRef<str>>(&mut self, names: &[S]) -> &mut Self {
        self.table_partition_columns = Some(utf8_columns(names));
        self
    }

    /// Forces pruning on or off.
    pub fn set_pruning(&mut self, pruning: bool) -> &mut Self {
        self.pruning = if pruning {
            Pruning::Enabled
        } else {
            Pruning::Disabled
        };
        self
    }

    /// Returns pruning to the session default.
    pub fn unset_pruning(&mut self) -> &mut Self {
        self.pruning = Pruning::Unset;
        self
    }

    /// True unless pruning is [`Pruning::Unset`]
    pub fn is_pruning_set(&self) -> bool {
        self.pruning != Pruning::Unset
    }

    /// The raw tri-state flag
    pub fn pruning_state(&self) -> Pruning {
        self.pruning
    }

    /// Effective pruning flag; unset reads as enabled.
    pub fn pruning(&self) -> bool {
        self.pruning_or(true)
    }

    /// Effective pruning flag with `default` standing in for unset.
    pub fn pruning_or(&self, default: bool) -> bool {
        match self.pruning {
            Pruning::Unset => default,
            Pruning::Enabled => true,
            Pruning::Disabled => false,
        }
    }

    /// Builds the listing options for a Parquet source. `default_pruning`
    /// applies when pruning is unset.
    pub fn to_listing_options(&self, default_pruning: bool) -> ListingOptions {
        let pruning = self.pruning_or(default_pruning);
        ListingOptions {
            format: Arc::new(ParquetFormat::new(pruning)) as Arc<dyn FileFormat>,
            file_extension: self.file_extension.clone(),
            table_partition_columns: self.table_partition_columns.clone().unwrap_or_default(),
            prune_partitions: pruning,
        }
    }
}

fn utf8_columns<S: AsRef<str>>(names: &[S]) -> Vec<Field> {
    names
        .iter()
        .map(|name| Field::new(name.as_ref(), DataType::Utf8, false))
        .collect()
}

/// Parquet column compression.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Compression {
    /// Plain pages
    #[default]
    Uncompressed,
    /// Snappy codec
    Snappy,
    /// Zstandard at its default level
    Zstd,
}

impl Compression {
    pub(crate) fn to_parquet(self) -> parquet::basic::Compression {
        match self {
            Compression::Uncompressed => parquet::basic::Compression::UNCOMPRESSED,
            Compression::Snappy => parquet::basic::Compression::SNAPPY,
            Compression::Zstd => parquet::basic::Compression::ZSTD(Default::default()),
        }
    }
}

/// Properties applied when writing Parquet files.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WriterProperties {
    max_row_group_size: usize,
    compression: Compression,
    created_by: String,
}

impl Default for WriterProperties {
    fn default() -> Self {
        Self {
            max_row_group_size: DEFAULT_MAX_ROW_GROUP_SIZE,
            compression: Compression::default(),
            created_by: format!("tabula version {}", env!("CARGO_PKG_VERSION")),
        }
    }
}

impl WriterProperties {
    /// Creates properties with the defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Maximum rows per row group
    pub fn max_row_group_size(&self) -> usize {
        self.max_row_group_size
    }

    /// Caps the rows per row group. Zero is rejected when the write runs.
    pub fn set_max_row_group_size(&mut self, size: usize) -> &mut Self {
        self.max_row_group_size = size;
        self
    }

    /// Column compression
    pub fn compression(&self) -> Compression {
        self.compression
    }

    /// Sets the column compression
    pub fn set_compression(&mut self, compression: Compression) -> &mut Self {
        self.compression = compression;
        self
    }

    /// Value written to the file footer's `created_by`
    pub fn created_by(&self) -> &str {
        &self.created_by
    }

    /// Sets the footer's `created_by`
    pub fn set_created_by(&mut self, created_by: impl Into<String>) -> &mut Self {
        self.created_by = created_by.into();
        self
    }
}

/// Appends partition columns to a file schema.
pub(crate) fn table_schema(file_schema: &Schema, partition_columns: &[Field]) -> SchemaRef {
    let mut fields: Vec<Field> = file_schema
        .fields()
        .iter()
        .map(|f| f.as_ref().clone())
        .collect();
    fields.extend(
        partition_columns
            .iter()
            .map(|f| f.clone().with_nullable(false)),
    );
    Arc::new(Schema::new(fields))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_csv_defaults() {
        let options = CsvReadOptions::new();
        assert!(options.has_header());
        assert_eq!(options.delimiter(), b',');
        assert!(options.schema().is_none());
        assert_eq!(options.schema_infer_max_records(), 1000);
        assert_eq!(options.file_extension(), ".csv");
        assert!(options.table_partition_columns().is_none());
    }

    #[test]
    fn test_csv_partition_column_names_are_utf8() {
        let mut options = CsvReadOptions::new();
        options.set_table_partition_column_names(&["year", "month"]);
        let columns = options.table_partition_columns().unwrap();
        assert_eq!(columns.len(), 2);
        assert_eq!(columns[1].name(), "month");
        assert_eq!(columns[1].data_type(), &DataType::Utf8);
    }

    #[test]
    fn test_parquet_pruning_tri_state() {
        let mut options = ParquetReadOptions::new();
        assert!(!options.is_pruning_set());
        assert!(options.pruning());
        assert!(!options.pruning_or(false));

        options.set_pruning(false);
        assert!(options.is_pruning_set());
        assert!(!options.pruning());
        assert_eq!(options.pruning_state(), Pruning::Disabled);

        options.set_pruning(true);
        assert!(options.pruning_or(false));

        options.unset_pruning();
        assert!(!options.is_pruning_set());
        assert!(options.pruning());
    }

    #[test]
    fn test_writer_properties_defaults() {
        let props = WriterProperties::default();
        assert_eq!(props.max_row_group_size(), 1024 * 1024);
        assert_eq!(props.compression(), Compression::Uncompressed);
        assert!(props.created_by().starts_with("tabula"));
    }

    #[test]
    fn test_table_schema_appends_non_nullable_partitions() {
        let file = Schema::new(vec![Field::new("a", DataType::Int64, true)]);
        let schema = table_schema(&file, &[Field::new("year", DataType::Int32, true)]);
        assert_eq!(schema.fields().len(), 2);
        assert_eq!(schema.field(1).name(), "year");
        assert!(!schema.field(1).is_nullable());
    }
}
