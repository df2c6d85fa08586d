//! The session: a registry of named sources plus the SQL entry point.

use std::path::Path;
use std::sync::Arc;

use arrow::record_batch::RecordBatch;
use rayon::{ThreadPool, ThreadPoolBuilder};
use tracing::{debug, info, warn};

use tabula_core::query::Planner;
use tabula_core::{Catalog, Error, MemTable, Result, TableProvider};
use tabula_formats::{CsvReadOptions, ListingOptions, ListingTable, ParquetReadOptions};

use crate::config::SessionConfig;
use crate::dataframe::DataFrame;
use crate::table::Table;

/// A query session.
///
/// Registration takes `&mut self` and queries take `&self`, so the borrow
/// checker serializes registry changes against planning.
///
/// # Examples
///
/// ```rust
/// use std::sync::Arc;
/// use arrow::array::Int32Array;
/// use arrow::datatypes::{DataType, Field, Schema};
/// use arrow::record_batch::RecordBatch;
/// use tabula::SessionContext;
///
/// let schema = Arc::new(Schema::new(vec![Field::new("a", DataType::Int32, false)]));
/// let batch = RecordBatch::try_new(schema, vec![Arc::new(Int32Array::from(vec![1, 2, 3]))])?;
///
/// let mut ctx = SessionContext::new();
/// ctx.register_record_batch("t", batch)?;
/// let df = ctx.sql("SELECT a FROM t WHERE a > 1")?;
/// assert_eq!(df.count()?, 2);
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
#[derive(Debug)]
pub struct SessionContext {
    config: SessionConfig,
    catalog: Catalog,
    /// Scan pool for file sources, built on first file registration
    pool: Option<Arc<ThreadPool>>,
}

impl Default for SessionContext {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionContext {
    /// Creates a session with [`SessionConfig::default`]
    pub fn new() -> Self {
        Self::with_config(SessionConfig::default())
    }

    /// Creates a session with the given configuration
    pub fn with_config(config: SessionConfig) -> Self {
        let catalog = Catalog::new(
            config.default_catalog.clone(),
            config.default_schema.clone(),
        )
        .with_information_schema(config.information_schema);
        Self {
            config,
            catalog,
            pool: None,
        }
    }

    /// The session configuration
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Plans `sql` against the current registry.
    ///
    /// Syntax and planning errors surface here; execution waits for an
    /// output operation on the returned [`DataFrame`].
    pub fn sql(&self, sql: &str) -> Result<DataFrame> {
        match Planner::new(&self.catalog).plan_sql(sql) {
            Ok(plan) => {
                debug!(sql, "Planned query");
                Ok(DataFrame::new(plan, self.config.batch_size))
            }
            Err(err) => {
                warn!(sql, error = %err, "Query planning failed");
                Err(err.context("[session-context][sql]"))
            }
        }
    }

    /// Registers a single in-memory batch
    pub fn register_record_batch(&mut self, name: &str, batch: RecordBatch) -> Result<()> {
        let schema = batch.schema();
        MemTable::try_new(schema, vec![batch])
            .and_then(|table| self.catalog.register_table(name, Arc::new(table)))
            .map_err(|e| e.context("[session-context][register-record-batch]"))
    }

    /// Registers in-memory batches sharing one schema
    pub fn register_record_batches(&mut self, name: &str, batches: Vec<RecordBatch>) -> Result<()> {
        let Some(first) = batches.first() else {
            return Err(Error::plan(format!("No record batches given for table {}", name))
                .context("[session-context][register-record-batches]"));
        };
        let schema = first.schema();
        MemTable::try_new(schema, batches)
            .and_then(|table| self.catalog.register_table(name, Arc::new(table)))
            .map_err(|e| e.context("[session-context][register-record-batches]"))
    }

    /// Registers a buffered [`Table`]
    pub fn register_table(&mut self, name: &str, table: &Table) -> Result<()> {
        MemTable::try_new(table.schema(), table.batches().to_vec())
            .and_then(|table| self.catalog.register_table(name, Arc::new(table)))
            .map_err(|e| e.context("[session-context][register-table]"))
    }

    /// Registers any provider under `name`
    pub fn register_provider(
        &mut self,
        name: &str,
        provider: Arc<dyn TableProvider>,
    ) -> Result<()> {
        self.catalog
            .register_table(name, provider)
            .map_err(|e| e.context("[session-context][register-provider]"))
    }

    /// Registers a CSV file or a directory of CSV files
    pub fn register_csv(
        &mut self,
        name: &str,
        path: impl AsRef<Path>,
        options: &CsvReadOptions,
    ) -> Result<()> {
        self.register_listing(name, path.as_ref(), options.to_listing_options())
            .map_err(|e| e.context("[session-context][register-csv]"))
    }

    /// Registers a Parquet file or a directory of Parquet files
    pub fn register_parquet(
        &mut self,
        name: &str,
        path: impl AsRef<Path>,
        options: &ParquetReadOptions,
    ) -> Result<()> {
        let listing = options.to_listing_options(self.config.parquet_pruning);
        self.register_listing(name, path.as_ref(), listing)
            .map_err(|e| e.context("[session-context][register-parquet]"))
    }

    fn register_listing(&mut self, name: &str, path: &Path, options: ListingOptions) -> Result<()> {
        if self.catalog.table_exist(name) {
            return Err(Error::plan(format!("The table {} already exists", name)));
        }
        let pool = self.scan_pool()?;
        let table = ListingTable::try_new(path, options, pool)?;
        info!(
            table = name,
            path = %path.display(),
            files = table.files().len(),
            "Registered file source"
        );
        self.catalog.register_table(name, Arc::new(table))
    }

    fn scan_pool(&mut self) -> Result<Arc<ThreadPool>> {
        if let Some(pool) = &self.pool {
            return Ok(pool.clone());
        }
        let pool = ThreadPoolBuilder::new()
            .num_threads(self.config.target_partitions.max(1))
            .thread_name(|i| format!("tabula-scan-{}", i))
            .build()
            .map_err(Error::external)?;
        let pool = Arc::new(pool);
        self.pool = Some(pool.clone());
        Ok(pool)
    }

    /// Removes a registration. DataFrames planned earlier keep working.
    pub fn deregister(&mut self, name: &str) -> Result<()> {
        self.catalog
            .deregister_table(name)
            .map(|_| ())
            .map_err(|e| e.context("[session-context][deregister]"))
    }

    /// A DataFrame scanning every column of `name`
    pub fn table(&self, name: &str) -> Result<DataFrame> {
        let quoted = format!("\"{}\"", name.replace('"', "\"\""));
        match Planner::new(&self.catalog).plan_sql(&format!("SELECT * FROM {}", quoted)) {
            Ok(plan) => Ok(DataFrame::new(plan, self.config.batch_size)),
            Err(err) => Err(err.context("[session-context][table]")),
        }
    }

    /// True if `name` is registered
    pub fn table_exist(&self, name: &str) -> bool {
        self.catalog.table_exist(name)
    }

    /// Registered names in sorted order
    pub fn table_names(&self) -> Vec<String> {
        self.catalog.table_names()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::array::Int64Array;
    use arrow::datatypes::{DataType, Field, Schema};
    use tabula_core::ErrorCode;

    fn batch() -> RecordBatch {
        let schema = Arc::new(Schema::new(vec![Field::new("v", DataType::Int64, true)]));
        RecordBatch::try_new(schema, vec![Arc::new(Int64Array::from(vec![1, 2]))]).unwrap()
    }

    #[test]
    fn test_duplicate_registration() {
        let mut ctx = SessionContext::new();
        ctx.register_record_batch("t", batch()).unwrap();
        let err = ctx.register_record_batch("t", batch()).unwrap_err();
        assert_eq!(err.find_root().code(), ErrorCode::Plan);
        assert_eq!(
            err.to_string(),
            "[session-context][register-record-batch] Error during planning: The table t already exists"
        );
    }

    #[test]
    fn test_deregister_missing() {
        let mut ctx = SessionContext::new();
        let err = ctx.deregister("nope").unwrap_err();
        assert_eq!(err.find_root().code(), ErrorCode::Plan);
        assert!(err.to_string().ends_with("'tabula.public.nope' not found"));
    }

    #[test]
    fn test_custom_catalog_label() {
        let config = SessionConfig::new().with_default_catalog_and_schema("lake", "raw");
        let ctx = SessionContext::with_config(config);
        let err = ctx.sql("SELECT * FROM missing").unwrap_err();
        assert_eq!(
            err.to_string(),
            "[session-context][sql] Error during planning: 'lake.raw.missing' not found"
        );
    }

    #[test]
    fn test_table_quotes_name() {
        let mut ctx = SessionContext::new();
        ctx.register_record_batch("odd \"name\"", batch()).unwrap();
        assert_eq!(ctx.table("odd \"name\"").unwrap().count().unwrap(), 2);
    }

    #[test]
    fn test_empty_batches_rejected() {
        let mut ctx = SessionContext::new();
        let err = ctx.register_record_batches("t", vec![]).unwrap_err();
        assert_eq!(err.find_root().code(), ErrorCode::Plan);
        assert!(!ctx.table_exist("t"));
    }
}
