/// Physical expressions
///
/// Bound, typed expressions evaluated row by row by the executor. Column
/// references are resolved to positions in the input row.
use std::fmt;

use arrow::datatypes::DataType;

use super::ast::{BinaryOperator, LogicalOperator};
use crate::error::{Error, Result};
use crate::provider::ComparisonOp;
use crate::value::Value;

/// Scalar functions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScalarFunction {
    Abs,
    Lower,
    Upper,
    Length,
    Coalesce,
}

impl ScalarFunction {
    /// Looks up a function by its upper-cased SQL name.
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "ABS" => Some(ScalarFunction::Abs),
            "LOWER" => Some(ScalarFunction::Lower),
            "UPPER" => Some(ScalarFunction::Upper),
            "LENGTH" | "CHAR_LENGTH" => Some(ScalarFunction::Length),
            "COALESCE" => Some(ScalarFunction::Coalesce),
            _ => None,
        }
    }
}

impl fmt::Display for ScalarFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScalarFunction::Abs => write!(f, "abs"),
            ScalarFunction::Lower => write!(f, "lower"),
            ScalarFunction::Upper => write!(f, "upper"),
            ScalarFunction::Length => write!(f, "length"),
            ScalarFunction::Coalesce => write!(f, "coalesce"),
        }
    }
}

/// A bound expression over the rows of an operator's input.
#[derive(Debug, Clone, PartialEq)]
pub enum PhysicalExpr {
    /// Input column at `index`
    Column { index: usize, name: String },
    Literal(Value),
    /// Arithmetic or comparison
    Binary {
        left: Box<PhysicalExpr>,
        op: BinaryOperator,
        right: Box<PhysicalExpr>,
    },
    /// Three-valued AND/OR
    Logical {
        left: Box<PhysicalExpr>,
        op: LogicalOperator,
        right: Box<PhysicalExpr>,
    },
    Not(Box<PhysicalExpr>),
    Negative(Box<PhysicalExpr>),
    IsNull {
        expr: Box<PhysicalExpr>,
        negated: bool,
    },
    Like {
        expr: Box<PhysicalExpr>,
        pattern: String,
        negated: bool,
    },
    InList {
        expr: Box<PhysicalExpr>,
        list: Vec<PhysicalExpr>,
        negated: bool,
    },
    Between {
        expr: Box<PhysicalExpr>,
        low: Box<PhysicalExpr>,
        high: Box<PhysicalExpr>,
        negated: bool,
    },
    Cast {
        expr: Box<PhysicalExpr>,
        data_type: DataType,
    },
    ScalarFunction {
        func: ScalarFunction,
        args: Vec<PhysicalExpr>,
    },
}

impl PhysicalExpr {
    /// Evaluates the expression against one input row.
    pub fn evaluate(&self, row: &[Value]) -> Result<Value> {
        match self {
            PhysicalExpr::Column { index, name } => row.get(*index).cloned().ok_or_else(|| {
                Error::internal(format!(
                    "Column {} at index {} is out of bounds for a row of {} values",
                    name,
                    index,
                    row.len()
                ))
            }),
            PhysicalExpr::Literal(value) => Ok(value.clone()),
            PhysicalExpr::Binary { left, op, right } => {
                let l = left.evaluate(row)?;
                let r = right.evaluate(row)?;
                match comparison_op(*op) {
                    Some(cmp) => Ok(compare_values(&l, cmp, &r)),
                    None => arithmetic(&l, *op, &r),
                }
            }
            PhysicalExpr::Logical { left, op, right } => {
                let l = as_bool(&left.evaluate(row)?)?;
                // Short-circuit on the dominating value.
                match (op, l) {
                    (LogicalOperator::And, Some(false)) => return Ok(Value::Boolean(false)),
                    (LogicalOperator::Or, Some(true)) => return Ok(Value::Boolean(true)),
                    _ => {}
                }
                let r = as_bool(&right.evaluate(row)?)?;
                let result = match op {
                    LogicalOperator::And => match (l, r) {
                        (_, Some(false)) => Some(false),
                        (Some(true), Some(true)) => Some(true),
                        _ => None,
                    },
                    LogicalOperator::Or => match (l, r) {
                        (_, Some(true)) => Some(true),
                        (Some(false), Some(false)) => Some(false),
                        _ => None,
                    },
                };
                Ok(from_bool(result))
            }
            PhysicalExpr::Not(expr) => {
                let value = as_bool(&expr.evaluate(row)?)?;
                Ok(from_bool(value.map(|b| !b)))
            }
            PhysicalExpr::Negative(expr) => match expr.evaluate(row)? {
                Value::Null => Ok(Value::Null),
                Value::Integer(i) => i
                    .checked_neg()
                    .map(Value::Integer)
                    .ok_or_else(|| Error::execution(format!("Overflow while negating {}", i))),
                Value::Float(f) => Ok(Value::Float(-f)),
                other => Err(Error::execution(format!("Cannot negate {}", other))),
            },
            PhysicalExpr::IsNull { expr, negated } => {
                let is_null = expr.evaluate(row)?.is_null();
                Ok(Value::Boolean(is_null != *negated))
            }
            PhysicalExpr::Like {
                expr,
                pattern,
                negated,
            } => match expr.evaluate(row)? {
                Value::Null => Ok(Value::Null),
                Value::String(s) => Ok(Value::Boolean(like_match(&s, pattern) != *negated)),
                other => Err(Error::execution(format!(
                    "LIKE requires a string, got {}",
                    other
                ))),
            },
            PhysicalExpr::InList {
                expr,
                list,
                negated,
            } => {
                let value = expr.evaluate(row)?;
                if value.is_null() {
                    return Ok(Value::Null);
                }
                let mut saw_null = false;
                for item in list {
                    match value.compare(&item.evaluate(row)?) {
                        Some(std::cmp::Ordering::Equal) => return Ok(Value::Boolean(!negated)),
                        None => saw_null = true,
                        Some(_) => {}
                    }
                }
                if saw_null {
                    Ok(Value::Null)
                } else {
                    Ok(Value::Boolean(*negated))
                }
            }
            PhysicalExpr::Between {
                expr,
                low,
                high,
                negated,
            } => {
                let value = expr.evaluate(row)?;
                let above = compare_values(&value, ComparisonOp::GtEq, &low.evaluate(row)?);
                let below = compare_values(&value, ComparisonOp::LtEq, &high.evaluate(row)?);
                let inside = match (as_bool(&above)?, as_bool(&below)?) {
                    (Some(false), _) | (_, Some(false)) => Some(false),
                    (Some(true), Some(true)) => Some(true),
                    _ => None,
                };
                Ok(from_bool(inside.map(|b| b != *negated)))
            }
            PhysicalExpr::Cast { expr, data_type } => expr.evaluate(row)?.cast_to(data_type),
            PhysicalExpr::ScalarFunction { func, args } => {
                let values = args
                    .iter()
                    .map(|arg| arg.evaluate(row))
                    .collect::<Result<Vec<_>>>()?;
                call_function(*func, values)
            }
        }
    }

    /// Evaluates a predicate; only TRUE passes.
    pub fn evaluate_predicate(&self, row: &[Value]) -> Result<bool> {
        Ok(as_bool(&self.evaluate(row)?)? == Some(true))
    }
}

/// Maps a comparison operator of the AST to its scan-level counterpart.
pub fn comparison_op(op: BinaryOperator) -> Option<ComparisonOp> {
    match op {
        BinaryOperator::Eq => Some(ComparisonOp::Eq),
        BinaryOperator::Ne => Some(ComparisonOp::NotEq),
        BinaryOperator::Lt => Some(ComparisonOp::Lt),
        BinaryOperator::Le => Some(ComparisonOp::LtEq),
        BinaryOperator::Gt => Some(ComparisonOp::Gt),
        BinaryOperator::Ge => Some(ComparisonOp::GtEq),
        _ => None,
    }
}

fn compare_values(left: &Value, op: ComparisonOp, right: &Value) -> Value {
    match left.compare(right) {
        Some(ordering) => Value::Boolean(op.matches(ordering)),
        None => Value::Null,
    }
}

fn as_bool(value: &Value) -> Result<Option<bool>> {
    match value {
        Value::Null => Ok(None),
        Value::Boolean(b) => Ok(Some(*b)),
        other => Err(Error::execution(format!(
            "Expected a boolean value, got {}",
            other
        ))),
    }
}

fn from_bool(value: Option<bool>) -> Value {
    value.map_or(Value::Null, Value::Boolean)
}

fn divide_by_zero() -> Error {
    Error::execution("Divide by zero error")
}

/// Checked arithmetic; integer results keep the signedness of their inputs.
fn arithmetic(left: &Value, op: BinaryOperator, right: &Value) -> Result<Value> {
    if left.is_null() || right.is_null() {
        return Ok(Value::Null);
    }

    if matches!(left, Value::Float(_)) || matches!(right, Value::Float(_)) {
        let (a, b) = match (left.as_f64(), right.as_f64()) {
            (Some(a), Some(b)) => (a, b),
            _ => return Err(invalid_operands(left, op, right)),
        };
        let result = match op {
            BinaryOperator::Plus => a + b,
            BinaryOperator::Minus => a - b,
            BinaryOperator::Multiply => a * b,
            BinaryOperator::Divide => a / b,
            BinaryOperator::Modulo => a % b,
            _ => return Err(invalid_operands(left, op, right)),
        };
        return Ok(Value::Float(result));
    }

    let (a, b) = match (left.as_i128(), right.as_i128()) {
        (Some(a), Some(b)) => (a, b),
        _ => return Err(invalid_operands(left, op, right)),
    };
    let result = match op {
        BinaryOperator::Plus => a + b,
        BinaryOperator::Minus => a - b,
        BinaryOperator::Multiply => a
            .checked_mul(b)
            .ok_or_else(|| overflow(left, op, right))?,
        BinaryOperator::Divide => {
            if b == 0 {
                return Err(divide_by_zero());
            }
            a / b
        }
        BinaryOperator::Modulo => {
            if b == 0 {
                return Err(divide_by_zero());
            }
            a % b
        }
        _ => return Err(invalid_operands(left, op, right)),
    };

    match (left, right) {
        (Value::Integer(_), Value::Integer(_)) => i64::try_from(result)
            .map(Value::Integer)
            .map_err(|_| overflow(left, op, right)),
        (Value::UInteger(_), Value::UInteger(_)) => u64::try_from(result)
            .map(Value::UInteger)
            .map_err(|_| overflow(left, op, right)),
        _ => i64::try_from(result)
            .map(Value::Integer)
            .map_err(|_| overflow(left, op, right)),
    }
}

fn overflow(left: &Value, op: BinaryOperator, right: &Value) -> Error {
    Error::execution(format!(
        "Arithmetic overflow: {} {} {}",
        left, op, right
    ))
}

fn invalid_operands(left: &Value, op: BinaryOperator, right: &Value) -> Error {
    Error::execution(format!(
        "Cannot apply {} to {} and {}",
        op, left, right
    ))
}

fn call_function(func: ScalarFunction, args: Vec<Value>) -> Result<Value> {
    if func == ScalarFunction::Coalesce {
        return Ok(args
            .into_iter()
            .find(|v| !v.is_null())
            .unwrap_or(Value::Null));
    }

    let arg = args.into_iter().next().unwrap_or(Value::Null);
    match (func, arg) {
        (_, Value::Null) => Ok(Value::Null),
        (ScalarFunction::Abs, Value::Integer(i)) => i
            .checked_abs()
            .map(Value::Integer)
            .ok_or_else(|| Error::execution(format!("Overflow in abs({})", i))),
        (ScalarFunction::Abs, Value::UInteger(u)) => Ok(Value::UInteger(u)),
        (ScalarFunction::Abs, Value::Float(f)) => Ok(Value::Float(f.abs())),
        (ScalarFunction::Lower, Value::String(s)) => Ok(Value::String(s.to_lowercase())),
        (ScalarFunction::Upper, Value::String(s)) => Ok(Value::String(s.to_uppercase())),
        (ScalarFunction::Length, Value::String(s)) => Ok(Value::Integer(s.chars().count() as i64)),
        (func, other) => Err(Error::execution(format!(
            "Invalid argument {} for {}",
            other, func
        ))),
    }
}

/// SQL LIKE: `%` matches any run of characters, `_` exactly one.
pub fn like_match(text: &str, pattern: &str) -> bool {
    let text: Vec<char> = text.chars().collect();
    let pattern: Vec<char> = pattern.chars().collect();

    let (mut t, mut p) = (0, 0);
    // Position of the last `%` and the text index it was tried at
    let mut backtrack: Option<(usize, usize)> = None;

    while t < text.len() {
        if p < pattern.len() && (pattern[p] == '_' || pattern[p] == text[t]) && pattern[p] != '%' {
            t += 1;
            p += 1;
        } else if p < pattern.len() && pattern[p] == '%' {
            backtrack = Some((p, t));
            p += 1;
        } else if let Some((star, matched)) = backtrack {
            p = star + 1;
            t = matched + 1;
            backtrack = Some((star, matched + 1));
        } else {
            return false;
        }
    }

    pattern[p..].iter().all(|&c| c == '%')
}

/// Canonical output name of a literal.
pub fn literal_name(value: &Value) -> String {
    match value {
        Value::Null => "NULL".to_string(),
        Value::Boolean(b) => format!("Boolean({})", b),
        Value::Integer(i) => format!("Int64({})", i),
        Value::UInteger(u) => format!("UInt64({})", u),
        Value::Float(f) => format!("Float64({})", f),
        Value::String(s) => format!("Utf8(\"{}\")", s),
    }
}

fn write_args(f: &mut fmt::Formatter<'_>, args: &[PhysicalExpr]) -> fmt::Result {
    for (i, arg) in args.iter().enumerate() {
        if i > 0 {
            write!(f, ", ")?;
        }
        write!(f, "{}", arg)?;
    }
    Ok(())
}

/// Renders the canonical name used for unaliased output columns.
impl fmt::Display for PhysicalExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PhysicalExpr::Column { name, .. } => write!(f, "{}", name),
            PhysicalExpr::Literal(value) => write!(f, "{}", literal_name(value)),
            PhysicalExpr::Binary { left, op, right } => write!(f, "{} {} {}", left, op, right),
            PhysicalExpr::Logical { left, op, right } => write!(f, "{} {} {}", left, op, right),
            PhysicalExpr::Not(expr) => write!(f, "NOT {}", expr),
            PhysicalExpr::Negative(expr) => write!(f, "(- {})", expr),
            PhysicalExpr::IsNull { expr, negated } => {
                if *negated {
                    write!(f, "{} IS NOT NULL", expr)
                } else {
                    write!(f, "{} IS NULL", expr)
                }
            }
            PhysicalExpr::Like {
                expr,
                pattern,
                negated,
            } => {
                let not = if *negated { " NOT" } else { "" };
                write!(f, "{}{} LIKE Utf8(\"{}\")", expr, not, pattern)
            }
            PhysicalExpr::InList {
                expr,
                list,
                negated,
            } => {
                let not = if *negated { " NOT" } else { "" };
                write!(f, "{}{} IN ([", expr, not)?;
                write_args(f, list)?;
                write!(f, "])")
            }
            PhysicalExpr::Between {
                expr,
                low,
                high,
                negated,
            } => {
                let not = if *negated { " NOT" } else { "" };
                write!(f, "{}{} BETWEEN {} AND {}", expr, not, low, high)
            }
            PhysicalExpr::Cast { expr, data_type } => write!(f, "CAST({} AS {})", expr, data_type),
            PhysicalExpr::ScalarFunction { func, args } => {
                write!(f, "{}(", func)?;
                write_args(f, args)?;
                write!(f, ")")
            }
        }
    }
}

/// Aggregate functions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregateFunction {
    Count,
    Sum,
    Avg,
    Min,
    Max,
}

impl AggregateFunction {
    /// Looks up an aggregate by its upper-cased SQL name.
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "COUNT" => Some(AggregateFunction::Count),
            "SUM" => Some(AggregateFunction::Sum),
            "AVG" | "MEAN" => Some(AggregateFunction::Avg),
            "MIN" => Some(AggregateFunction::Min),
            "MAX" => Some(AggregateFunction::Max),
            _ => None,
        }
    }
}

impl fmt::Display for AggregateFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AggregateFunction::Count => write!(f, "COUNT"),
            AggregateFunction::Sum => write!(f, "SUM"),
            AggregateFunction::Avg => write!(f, "AVG"),
            AggregateFunction::Min => write!(f, "MIN"),
            AggregateFunction::Max => write!(f, "MAX"),
        }
    }
}

/// An aggregate call bound to the aggregate's input rows.
#[derive(Debug, Clone, PartialEq)]
pub struct AggregateExpr {
    pub func: AggregateFunction,
    /// `None` for `COUNT(*)`
    pub arg: Option<PhysicalExpr>,
    pub distinct: bool,
    /// Output type
    pub data_type: DataType,
}

impl fmt::Display for AggregateExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(", self.func)?;
        if self.distinct {
            write!(f, "DISTINCT ")?;
        }
        match &self.arg {
            Some(arg) => write!(f, "{})", arg),
            None => write!(f, "*)"),
        }
    }
}

/// One ORDER BY key.
#[derive(Debug, Clone, PartialEq)]
pub struct SortExpr {
    pub expr: PhysicalExpr,
    pub descending: bool,
}

impl fmt::Display for SortExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let direction = if self.descending { "DESC" } else { "ASC" };
        write!(f, "{} {}", self.expr, direction)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn col(index: usize) -> Box<PhysicalExpr> {
        Box::new(PhysicalExpr::Column {
            index,
            name: format!("c{}", index),
        })
    }

    fn lit(value: Value) -> Box<PhysicalExpr> {
        Box::new(PhysicalExpr::Literal(value))
    }

    fn binary(left: Box<PhysicalExpr>, op: BinaryOperator, right: Box<PhysicalExpr>) -> PhysicalExpr {
        PhysicalExpr::Binary { left, op, right }
    }

    #[test]
    fn test_like_match() {
        assert!(like_match("hello", "h%o"));
        assert!(like_match("hello", "h_llo"));
        assert!(like_match("hello", "%"));
        assert!(like_match("", "%"));
        assert!(!like_match("hello", "h_o"));
        assert!(like_match("abcabc", "%abc"));
        assert!(!like_match("abcab", "%abc"));
    }

    #[test]
    fn test_comparison_with_null_is_null() {
        let expr = binary(col(0), BinaryOperator::Gt, lit(Value::Integer(1)));
        assert_eq!(expr.evaluate(&[Value::Null]).unwrap(), Value::Null);
        assert!(!expr.evaluate_predicate(&[Value::Null]).unwrap());
        assert!(expr.evaluate_predicate(&[Value::Integer(2)]).unwrap());
    }

    #[test]
    fn test_three_valued_logic() {
        let and = PhysicalExpr::Logical {
            left: col(0),
            op: LogicalOperator::And,
            right: col(1),
        };
        let or = PhysicalExpr::Logical {
            left: col(0),
            op: LogicalOperator::Or,
            right: col(1),
        };
        let row = [Value::Null, Value::Boolean(false)];
        assert_eq!(and.evaluate(&row).unwrap(), Value::Boolean(false));
        assert_eq!(or.evaluate(&row).unwrap(), Value::Null);

        let row = [Value::Null, Value::Boolean(true)];
        assert_eq!(and.evaluate(&row).unwrap(), Value::Null);
        assert_eq!(or.evaluate(&row).unwrap(), Value::Boolean(true));
    }

    #[test]
    fn test_divide_by_zero() {
        let expr = binary(col(0), BinaryOperator::Divide, lit(Value::Integer(0)));
        let err = expr.evaluate(&[Value::Integer(1)]).unwrap_err();
        assert_eq!(err.to_string(), "Execution error: Divide by zero error");
    }

    #[test]
    fn test_overflow_is_checked() {
        let expr = binary(col(0), BinaryOperator::Plus, lit(Value::Integer(1)));
        let err = expr.evaluate(&[Value::Integer(i64::MAX)]).unwrap_err();
        assert_eq!(err.code(), crate::ErrorCode::Execution);

        let expr = binary(col(0), BinaryOperator::Minus, lit(Value::UInteger(2)));
        assert!(expr.evaluate(&[Value::UInteger(1)]).is_err());
    }

    #[test]
    fn test_mixed_arithmetic() {
        let expr = binary(col(0), BinaryOperator::Multiply, lit(Value::Float(0.5)));
        assert_eq!(expr.evaluate(&[Value::Integer(3)]).unwrap(), Value::Float(1.5));

        let expr = binary(col(0), BinaryOperator::Modulo, lit(Value::Integer(3)));
        assert_eq!(expr.evaluate(&[Value::Integer(-7)]).unwrap(), Value::Integer(-1));
    }

    #[test]
    fn test_in_list_with_null() {
        let expr = PhysicalExpr::InList {
            expr: col(0),
            list: vec![PhysicalExpr::Literal(Value::Integer(1)), PhysicalExpr::Literal(Value::Null)],
            negated: false,
        };
        assert_eq!(expr.evaluate(&[Value::Integer(1)]).unwrap(), Value::Boolean(true));
        assert_eq!(expr.evaluate(&[Value::Integer(2)]).unwrap(), Value::Null);
    }

    #[test]
    fn test_functions() {
        let coalesce = PhysicalExpr::ScalarFunction {
            func: ScalarFunction::Coalesce,
            args: vec![*col(0), *lit(Value::String("x".into()))],
        };
        assert_eq!(
            coalesce.evaluate(&[Value::Null]).unwrap(),
            Value::String("x".into())
        );

        let length = PhysicalExpr::ScalarFunction {
            func: ScalarFunction::Length,
            args: vec![*col(0)],
        };
        assert_eq!(
            length.evaluate(&[Value::String("héllo".into())]).unwrap(),
            Value::Integer(5)
        );
    }

    #[test]
    fn test_canonical_names() {
        let expr = binary(lit(Value::Integer(1)), BinaryOperator::Plus, col(2));
        assert_eq!(expr.to_string(), "Int64(1) + c2");
        assert_eq!(literal_name(&Value::Float(1.5)), "Float64(1.5)");
        assert_eq!(literal_name(&Value::String("a".into())), "Utf8(\"a\")");

        let cast = PhysicalExpr::Cast {
            expr: col(0),
            data_type: DataType::Int8,
        };
        assert_eq!(cast.to_string(), "CAST(c0 AS Int8)");
    }
}
