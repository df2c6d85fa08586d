//! # Tabula Formats
//!
//! CSV and Parquet sources for Tabula.
//!
//! ## ⚠️ Internal Implementation Detail
//!
//! **This crate is an internal implementation detail of Tabula.**
//!
//! Users should depend on the main [`tabula`](https://crates.io/crates/tabula) crate
//! instead, which provides the stable public API. This crate's API may change
//! without notice between minor versions.
//!
//! ---
//!
//! This crate provides:
//!
//! - **Read options**: [`CsvReadOptions`] and [`ParquetReadOptions`]
//! - **File formats**: CSV schema inference and parsing, Parquet reading with
//!   row-group pruning
//! - **Listing tables**: recursive directory listing, `key=value` partition
//!   columns and parallel scans on a rayon pool
//! - **Writers**: single-file Parquet and CSV output
//!
//! ## Architecture
//!
//! ```text
//! register_csv / register_parquet
//!        ↓
//!   ListingTable ── lists files, resolves partitions, infers schema
//!        ↓ scan(filters)
//!   prune partitions → FileFormat::read per file (rayon) → RecordBatches
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod file_format;
pub mod listing;
pub mod options;
pub mod writer;

pub use file_format::{CsvFormat, FileFormat, ParquetFormat};
pub use listing::{ListingOptions, ListingTable, PartitionedFile};
pub use options::{
    Compression, CsvReadOptions, ParquetReadOptions, Pruning, WriterProperties,
    DEFAULT_MAX_ROW_GROUP_SIZE, DEFAULT_SCHEMA_INFER_MAX_RECORDS,
};
pub use writer::{write_csv, write_parquet, CSV_PART_FILE, PARQUET_PART_FILE};
