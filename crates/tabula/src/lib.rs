//! # Tabula
//!
//! An embeddable SQL query session over in-memory Arrow data, CSV and
//! Parquet files.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use tabula::{CsvReadOptions, SessionContext};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut ctx = SessionContext::new();
//!
//!     // Register a CSV file (or a directory of them) under a table name
//!     ctx.register_csv("trips", "./data/trips.csv", &CsvReadOptions::new())?;
//!
//!     // Planning happens here; nothing is read yet
//!     let df = ctx.sql("SELECT city, COUNT(*) AS n FROM trips GROUP BY city ORDER BY n DESC")?;
//!
//!     // Run the plan and print the result
//!     df.show()?;
//!
//!     // Or write it out
//!     df.write_parquet("./out", None)?;
//!     Ok(())
//! }
//! ```
//!
//! ## Sources
//!
//! - **In-memory**: [`SessionContext::register_record_batch`],
//!   [`SessionContext::register_record_batches`], [`SessionContext::register_table`]
//! - **CSV**: [`SessionContext::register_csv`] with schema inference or an
//!   explicit schema
//! - **Parquet**: [`SessionContext::register_parquet`] with partition and
//!   row-group pruning
//!
//! Directories are listed recursively; `key=value` path segments become
//! partition columns when declared in the read options.
//!
//! ## Errors
//!
//! Every fallible call returns [`Error`]. Session and DataFrame operations
//! label their errors (`[session-context][sql] ...`); use
//! [`Error::find_root`] to branch on the underlying [`ErrorCode`].

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod context;
pub mod dataframe;
pub mod export;
pub mod logging;
pub mod table;

pub use config::SessionConfig;
pub use context::SessionContext;
pub use dataframe::DataFrame;
pub use export::ExportedData;
pub use table::Table;

// Re-export core types
pub use tabula_core::{Error, ErrorCode, Result, TableProvider};

// File source options and writer properties
pub use tabula_formats::{
    Compression, CsvReadOptions, ParquetReadOptions, Pruning, WriterProperties,
};

// Version information
/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
