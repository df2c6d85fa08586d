//! Lazily evaluated query results
//!
//! A [`DataFrame`] owns an immutable plan snapshot. Nothing runs until an
//! output operation is called, and every output operation runs the plan
//! again from the sources.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use arrow::datatypes::SchemaRef;
use arrow::record_batch::RecordBatch;
use arrow::util::pretty::pretty_format_batches;
use tracing::debug;

use tabula_core::query::{ExecutionContext, Executor, PhysicalPlan};
use tabula_core::{Error, Result};
use tabula_formats::{write_csv, write_parquet, WriterProperties};

use crate::export::ExportedData;
use crate::table::Table;

/// A planned query.
///
/// Cheap to clone and safe to share between threads; the plan holds its
/// sources by `Arc`, so a `DataFrame` stays usable after the session that
/// produced it is dropped or the table is deregistered.
///
/// # Examples
///
/// ```rust
/// use tabula::SessionContext;
///
/// let ctx = SessionContext::new();
/// let df = ctx.sql("SELECT 1 + 2 AS three")?;
/// assert_eq!(df.count()?, 1);
/// # Ok::<(), tabula::Error>(())
/// ```
#[derive(Debug, Clone)]
pub struct DataFrame {
    plan: Arc<PhysicalPlan>,
    batch_size: usize,
}

impl DataFrame {
    pub(crate) fn new(plan: PhysicalPlan, batch_size: usize) -> Self {
        Self {
            plan: Arc::new(plan),
            batch_size,
        }
    }

    /// Output schema, known without running the plan
    pub fn schema(&self) -> SchemaRef {
        self.plan.schema.clone()
    }

    /// Run the plan and return its batches, each at most `batch_size` rows
    pub fn collect(&self) -> Result<Vec<RecordBatch>> {
        self.execute().map_err(|e| e.context("[data-frame][collect]"))
    }

    fn execute(&self) -> Result<Vec<RecordBatch>> {
        let executor = Executor::new(ExecutionContext::new(self.batch_size));
        let batches = executor.execute(&self.plan)?;
        debug!(batches = batches.len(), "Collected data frame");
        Ok(batches)
    }

    /// Run the plan and buffer the result
    pub fn to_table(&self) -> Result<Table> {
        self.execute()
            .and_then(|batches| Table::try_new(self.schema(), batches))
            .map_err(|e| e.context("[data-frame][to-table]"))
    }

    /// Number of result rows
    pub fn count(&self) -> Result<usize> {
        let batches = self
            .execute()
            .map_err(|e| e.context("[data-frame][count]"))?;
        Ok(batches.iter().map(|b| b.num_rows()).sum())
    }

    /// Render the whole result as an ASCII table
    pub fn to_string_pretty(&self) -> Result<String> {
        self.render(None)
            .map_err(|e| e.context("[data-frame][to-string]"))
    }

    /// Print the whole result to stdout
    pub fn show(&self) -> Result<()> {
        let rendered = self
            .render(None)
            .map_err(|e| e.context("[data-frame][show]"))?;
        println!("{}", rendered);
        Ok(())
    }

    /// Print the first `limit` rows to stdout
    pub fn show_limit(&self, limit: usize) -> Result<()> {
        let rendered = self
            .render(Some(limit))
            .map_err(|e| e.context("[data-frame][show]"))?;
        println!("{}", rendered);
        Ok(())
    }

    fn render(&self, limit: Option<usize>) -> Result<String> {
        let mut batches = self.execute()?;
        if let Some(limit) = limit {
            batches = take_rows(batches, limit);
        }
        if batches.is_empty() {
            batches.push(RecordBatch::new_empty(self.schema()));
        }
        Ok(pretty_format_batches(&batches)?.to_string())
    }

    /// Run the plan and write `dir/part-0.parquet`
    ///
    /// `None` uses [`WriterProperties::default`].
    pub fn write_parquet(
        &self,
        dir: impl AsRef<Path>,
        props: Option<&WriterProperties>,
    ) -> Result<PathBuf> {
        let default_props = WriterProperties::default();
        let props = props.unwrap_or(&default_props);
        // Reject bad properties before running the plan.
        if props.max_row_group_size() == 0 {
            return Err(Error::plan("max_row_group_size must be greater than zero")
                .context("[data-frame][write-parquet]"));
        }
        self.execute()
            .and_then(|batches| write_parquet(dir, &self.schema(), &batches, props))
            .map_err(|e| e.context("[data-frame][write-parquet]"))
    }

    /// Alias of [`DataFrame::write_parquet`]
    pub fn write(
        &self,
        path: impl AsRef<Path>,
        props: Option<&WriterProperties>,
    ) -> Result<PathBuf> {
        self.write_parquet(path, props)
    }

    /// Run the plan and write `dir/part-0.csv` with a header row
    pub fn write_csv(&self, dir: impl AsRef<Path>) -> Result<PathBuf> {
        self.execute()
            .and_then(|batches| write_csv(dir, &self.schema(), &batches))
            .map_err(|e| e.context("[data-frame][write-csv]"))
    }

    /// Run the plan and export the result through the Arrow C data interface
    pub fn export(&self) -> Result<ExportedData> {
        self.execute()
            .and_then(|batches| ExportedData::try_new(&self.schema(), batches))
            .map_err(|e| e.context("[data-frame][export]"))
    }

    /// The physical plan as an indented tree
    pub fn explain(&self) -> String {
        self.plan.to_string()
    }
}

fn take_rows(batches: Vec<RecordBatch>, limit: usize) -> Vec<RecordBatch> {
    let mut remaining = limit;
    let mut taken = Vec::new();
    for batch in batches {
        if remaining == 0 {
            break;
        }
        let len = batch.num_rows().min(remaining);
        taken.push(batch.slice(0, len));
        remaining -= len;
    }
    taken
}
