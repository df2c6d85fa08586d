//! # Tabula Core
//!
//! Error model, scalar values, table providers, the session catalog and the
//! SQL query engine (lexer, parser, planner and executor) behind Tabula.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod catalog;
pub mod error;
pub mod provider;
pub mod query;
#[allow(missing_docs)]
pub mod value;

pub use catalog::{Catalog, TableReference};
pub use error::{Error, ErrorCode, Result};
pub use provider::{ComparisonOp, MemTable, ScanPredicate, TableProvider};
pub use value::Value;
