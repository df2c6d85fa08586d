//! Query engine module
//!
//! SQL parsing, planning, and execution.

/// Abstract Syntax Tree types
#[allow(missing_docs)]
pub mod ast;
/// Query executor
#[allow(missing_docs)]
pub mod executor;
/// Bound physical expressions
#[allow(missing_docs)]
pub mod expr;
/// SQL lexer
#[allow(missing_docs)]
pub mod lexer;
/// SQL parser
#[allow(missing_docs)]
pub mod parser;
/// Query planner
#[allow(missing_docs)]
pub mod planner;

// Re-export main types
pub use ast::*;
pub use executor::{ExecutionContext, Executor, Row, DEFAULT_BATCH_SIZE};
pub use expr::{AggregateExpr, AggregateFunction, PhysicalExpr, ScalarFunction, SortExpr};
pub use lexer::{Lexer, LexerError, Token};
pub use parser::{parse_sql, ParseError, Parser};
pub use planner::{PhysicalOperator, PhysicalPlan, PlanField, PlanSchema, Planner};
