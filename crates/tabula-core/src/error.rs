//! Error types for Tabula.

use std::fmt;

use arrow::error::ArrowError;
use parquet::errors::ParquetError;
use thiserror::Error;

use crate::query::parser::ParseError;

/// Stable category of an [`Error`].
///
/// Callers branch on the code, never on the message text.
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum ErrorCode {
    Arrow = 0,
    Parquet = 1,
    Avro = 2,
    ObjectStore = 3,
    Io = 4,
    Sql = 5,
    NotImplemented = 6,
    Internal = 7,
    Plan = 8,
    Schema = 9,
    Execution = 10,
    ResourcesExhausted = 11,
    External = 12,
    Jit = 13,
    Context = 14,
    Substrait = 15,
}

impl ErrorCode {
    /// Short lowercase name of the category.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::Arrow => "arrow",
            ErrorCode::Parquet => "parquet",
            ErrorCode::Avro => "avro",
            ErrorCode::ObjectStore => "object-store",
            ErrorCode::Io => "io",
            ErrorCode::Sql => "sql",
            ErrorCode::NotImplemented => "not-implemented",
            ErrorCode::Internal => "internal",
            ErrorCode::Plan => "plan",
            ErrorCode::Schema => "schema",
            ErrorCode::Execution => "execution",
            ErrorCode::ResourcesExhausted => "resources-exhausted",
            ErrorCode::External => "external",
            ErrorCode::Jit => "jit",
            ErrorCode::Context => "context",
            ErrorCode::Substrait => "substrait",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The main error type for Tabula operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Error from the Arrow columnar layer
    #[error("Arrow error: {0}")]
    Arrow(#[from] ArrowError),

    /// Error from the Parquet codec
    #[error("Parquet error: {0}")]
    Parquet(#[from] ParquetError),

    /// Error from an Avro source
    #[error("Avro error: {0}")]
    Avro(String),

    /// Error from an object store
    #[error("Object Store error: {0}")]
    ObjectStore(String),

    /// I/O error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Lexing or parsing of SQL text failed
    #[error("SQL error: {0}")]
    Sql(#[from] ParseError),

    /// Valid request the engine does not support
    #[error("This feature is not implemented: {0}")]
    NotImplemented(String),

    /// Broken internal invariant
    #[error("Internal error: {0}")]
    Internal(String),

    /// Planning failed (unknown relation, unknown column, type mismatch)
    #[error("Error during planning: {0}")]
    Plan(String),

    /// Schema mismatch or unparseable data for a declared schema
    #[error("Schema error: {0}")]
    Schema(String),

    /// Runtime failure while executing a plan
    #[error("Execution error: {0}")]
    Execution(String),

    /// A resource limit was hit
    #[error("Resources exhausted: {0}")]
    ResourcesExhausted(String),

    /// Error raised by a foreign component
    #[error("External error: {0}")]
    External(Box<dyn std::error::Error + Send + Sync>),

    /// Error from a code generator
    #[error("JIT error: {0}")]
    Jit(String),

    /// Another error annotated with a label describing where it happened
    #[error("{0} {1}")]
    Context(String, Box<Error>),

    /// Error from a Substrait plan
    #[error("Substrait error: {0}")]
    Substrait(String),
}

impl Error {
    /// Creates a planning error.
    pub fn plan(message: impl Into<String>) -> Self {
        Error::Plan(message.into())
    }

    /// Creates an execution error.
    pub fn execution(message: impl Into<String>) -> Self {
        Error::Execution(message.into())
    }

    /// Creates a schema error.
    pub fn schema(message: impl Into<String>) -> Self {
        Error::Schema(message.into())
    }

    /// Creates an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Error::Internal(message.into())
    }

    /// Creates a not-implemented error.
    pub fn not_implemented(message: impl Into<String>) -> Self {
        Error::NotImplemented(message.into())
    }

    /// Wraps an arbitrary foreign error.
    pub fn external<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Error::External(Box::new(err))
    }

    /// Returns the category of this error.
    ///
    /// Context labels are transparent here: a wrapped error reports the
    /// code of the error it wraps.
    pub fn code(&self) -> ErrorCode {
        match self {
            Error::Arrow(_) => ErrorCode::Arrow,
            Error::Parquet(_) => ErrorCode::Parquet,
            Error::Avro(_) => ErrorCode::Avro,
            Error::ObjectStore(_) => ErrorCode::ObjectStore,
            Error::Io(_) => ErrorCode::Io,
            Error::Sql(_) => ErrorCode::Sql,
            Error::NotImplemented(_) => ErrorCode::NotImplemented,
            Error::Internal(_) => ErrorCode::Internal,
            Error::Plan(_) => ErrorCode::Plan,
            Error::Schema(_) => ErrorCode::Schema,
            Error::Execution(_) => ErrorCode::Execution,
            Error::ResourcesExhausted(_) => ErrorCode::ResourcesExhausted,
            Error::External(_) => ErrorCode::External,
            Error::Jit(_) => ErrorCode::Jit,
            Error::Context(_, inner) => inner.code(),
            Error::Substrait(_) => ErrorCode::Substrait,
        }
    }

    /// Returns the human-readable message, including any context labels.
    pub fn message(&self) -> String {
        self.to_string()
    }

    /// Prefixes this error with a label such as `[session-context][sql]`.
    pub fn context(self, label: impl Into<String>) -> Self {
        Error::Context(label.into(), Box::new(self))
    }

    /// Strips every context layer and returns the underlying error.
    pub fn find_root(&self) -> &Error {
        let mut current = self;
        while let Error::Context(_, inner) = current {
            current = inner;
        }
        current
    }
}

impl From<csv::Error> for Error {
    fn from(err: csv::Error) -> Self {
        if !err.is_io_error() {
            if let csv::ErrorKind::UnequalLengths { pos, expected_len, len } = err.kind() {
                let line = pos.as_ref().map_or(0, |p| p.line());
                return Error::schema(format!(
                    "Unequal lengths in CSV line {line}: expected {expected_len} fields, found {len}"
                ));
            }
            return Error::external(err);
        }
        match err.into_kind() {
            csv::ErrorKind::Io(io) => Error::Io(io),
            other => Error::internal(format!("unexpected CSV error kind: {other:?}")),
        }
    }
}

/// A specialized `Result` type for Tabula operations.
pub type Result<T, E = Error> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plan_error_display() {
        let err = Error::plan("'tabula.public.data' not found");
        assert_eq!(err.code(), ErrorCode::Plan);
        assert_eq!(
            err.to_string(),
            "Error during planning: 'tabula.public.data' not found"
        );
    }

    #[test]
    fn test_context_wraps_message_and_keeps_root() {
        let err = Error::plan("'tabula.public.data' not found").context("[session-context][sql]");
        assert_eq!(err.code(), ErrorCode::Plan);
        assert_eq!(
            err.message(),
            "[session-context][sql] Error during planning: 'tabula.public.data' not found"
        );
        assert_eq!(err.find_root().code(), ErrorCode::Plan);
    }

    #[test]
    fn test_io_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing.csv");
        let err: Error = io.into();
        assert_eq!(err.code(), ErrorCode::Io);
    }

    #[test]
    fn test_csv_unequal_lengths_is_schema() {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .from_reader("a,b\n1\n".as_bytes());
        let err = reader.records().find_map(|r| r.err()).unwrap();
        assert_eq!(Error::from(err).code(), ErrorCode::Schema);
    }

    #[test]
    fn test_codes_are_stable() {
        assert_eq!(ErrorCode::Arrow as i32, 0);
        assert_eq!(ErrorCode::Plan as i32, 8);
        assert_eq!(ErrorCode::Substrait as i32, 15);
        assert_eq!(ErrorCode::ResourcesExhausted.to_string(), "resources-exhausted");
    }
}
