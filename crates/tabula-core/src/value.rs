//! Scalar values flowing through the row-oriented executor.
//!
//! Arrow arrays are decoded into [`Value`]s at scan time and re-encoded
//! into arrays of the planned output type once a plan has run.

use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

use arrow::array::{
    Array, ArrayRef, AsArray, BooleanBuilder, Float32Builder, Float64Builder, Int16Builder,
    Int32Builder, Int64Builder, Int8Builder, LargeStringBuilder, NullArray, StringBuilder,
    UInt16Builder, UInt32Builder, UInt64Builder, UInt8Builder,
};
use arrow::datatypes::{
    DataType, Float32Type, Float64Type, Int16Type, Int32Type, Int64Type, Int8Type, UInt16Type,
    UInt32Type, UInt64Type, UInt8Type,
};

use crate::error::{Error, Result};

/// A single (possibly null) cell value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Boolean(bool),
    /// Any signed integer width
    Integer(i64),
    /// Any unsigned integer width
    UInteger(u64),
    /// Float32 or Float64
    Float(f64),
    String(String),
}

/// Returns true if the executor can decode and encode columns of this type.
pub fn is_supported_type(data_type: &DataType) -> bool {
    matches!(
        data_type,
        DataType::Null
            | DataType::Boolean
            | DataType::Int8
            | DataType::Int16
            | DataType::Int32
            | DataType::Int64
            | DataType::UInt8
            | DataType::UInt16
            | DataType::UInt32
            | DataType::UInt64
            | DataType::Float32
            | DataType::Float64
            | DataType::Utf8
            | DataType::LargeUtf8
    )
}

/// Integer types, signed or not.
pub fn is_integer_type(data_type: &DataType) -> bool {
    data_type.is_integer()
}

/// Integer or floating point types.
pub fn is_numeric_type(data_type: &DataType) -> bool {
    data_type.is_integer() || data_type.is_floating()
}

/// UTF-8 string types.
pub fn is_string_type(data_type: &DataType) -> bool {
    matches!(data_type, DataType::Utf8 | DataType::LargeUtf8)
}

impl Value {
    /// Returns true for SQL NULL.
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// The natural Arrow type of this value when used as a literal.
    pub fn data_type(&self) -> DataType {
        match self {
            Value::Null => DataType::Null,
            Value::Boolean(_) => DataType::Boolean,
            Value::Integer(_) => DataType::Int64,
            Value::UInteger(_) => DataType::UInt64,
            Value::Float(_) => DataType::Float64,
            Value::String(_) => DataType::Utf8,
        }
    }

    /// Integer payload widened to `i128`.
    pub fn as_i128(&self) -> Option<i128> {
        match self {
            Value::Integer(i) => Some(*i as i128),
            Value::UInteger(u) => Some(*u as i128),
            _ => None,
        }
    }

    /// Numeric payload as `f64`.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Integer(i) => Some(*i as f64),
            Value::UInteger(u) => Some(*u as f64),
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }

    /// Narrows a wide integer result back into a value, failing on overflow.
    pub fn from_i128(v: i128) -> Result<Value> {
        if let Ok(i) = i64::try_from(v) {
            Ok(Value::Integer(i))
        } else if let Ok(u) = u64::try_from(v) {
            Ok(Value::UInteger(u))
        } else {
            Err(Error::execution(format!("Integer overflow: {} is out of range", v)))
        }
    }

    /// Reads the value at `row` from an Arrow array.
    pub fn from_array(array: &dyn Array, row: usize) -> Result<Value> {
        if array.is_null(row) {
            return Ok(Value::Null);
        }
        let value = match array.data_type() {
            DataType::Null => Value::Null,
            DataType::Boolean => Value::Boolean(array.as_boolean().value(row)),
            DataType::Int8 => Value::Integer(array.as_primitive::<Int8Type>().value(row) as i64),
            DataType::Int16 => Value::Integer(array.as_primitive::<Int16Type>().value(row) as i64),
            DataType::Int32 => Value::Integer(array.as_primitive::<Int32Type>().value(row) as i64),
            DataType::Int64 => Value::Integer(array.as_primitive::<Int64Type>().value(row)),
            DataType::UInt8 => {
                Value::UInteger(array.as_primitive::<UInt8Type>().value(row) as u64)
            }
            DataType::UInt16 => {
                Value::UInteger(array.as_primitive::<UInt16Type>().value(row) as u64)
            }
            DataType::UInt32 => {
                Value::UInteger(array.as_primitive::<UInt32Type>().value(row) as u64)
            }
            DataType::UInt64 => Value::UInteger(array.as_primitive::<UInt64Type>().value(row)),
            DataType::Float32 => {
                Value::Float(array.as_primitive::<Float32Type>().value(row) as f64)
            }
            DataType::Float64 => Value::Float(array.as_primitive::<Float64Type>().value(row)),
            DataType::Utf8 => Value::String(array.as_string::<i32>().value(row).to_string()),
            DataType::LargeUtf8 => Value::String(array.as_string::<i64>().value(row).to_string()),
            other => {
                return Err(Error::not_implemented(format!(
                    "Unsupported data type {}",
                    other
                )))
            }
        };
        Ok(value)
    }

    /// Converts the value to `data_type`, as `CAST` does.
    pub fn cast_to(&self, data_type: &DataType) -> Result<Value> {
        if self.is_null() {
            return Ok(Value::Null);
        }
        match data_type {
            DataType::Null => Err(self.cast_error(data_type)),
            DataType::Boolean => match self {
                Value::Boolean(b) => Ok(Value::Boolean(*b)),
                Value::Integer(_) | Value::UInteger(_) => {
                    Ok(Value::Boolean(self.as_i128() != Some(0)))
                }
                Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
                    "true" | "t" | "1" => Ok(Value::Boolean(true)),
                    "false" | "f" | "0" => Ok(Value::Boolean(false)),
                    _ => Err(self.cast_error(data_type)),
                },
                _ => Err(self.cast_error(data_type)),
            },
            dt if dt.is_integer() => {
                let wide = match self {
                    Value::Integer(_) | Value::UInteger(_) => self.as_i128(),
                    Value::Float(f) if f.is_finite() => Some(f.trunc() as i128),
                    Value::Boolean(b) => Some(*b as i128),
                    Value::String(s) => s.trim().parse::<i128>().ok(),
                    _ => None,
                };
                let wide = wide.ok_or_else(|| self.cast_error(data_type))?;
                if !integer_fits(wide, dt) {
                    return Err(self.cast_error(data_type));
                }
                if dt.is_signed_integer() {
                    Ok(Value::Integer(wide as i64))
                } else {
                    Ok(Value::UInteger(wide as u64))
                }
            }
            DataType::Float32 | DataType::Float64 => {
                let f = match self {
                    Value::String(s) => s.trim().parse::<f64>().ok(),
                    Value::Boolean(b) => Some(if *b { 1.0 } else { 0.0 }),
                    other => other.as_f64(),
                };
                let f = f.ok_or_else(|| self.cast_error(data_type))?;
                if *data_type == DataType::Float32 {
                    Ok(Value::Float(f as f32 as f64))
                } else {
                    Ok(Value::Float(f))
                }
            }
            DataType::Utf8 | DataType::LargeUtf8 => Ok(Value::String(self.to_string())),
            other => Err(Error::not_implemented(format!(
                "Unsupported CAST to {}",
                other
            ))),
        }
    }

    fn cast_error(&self, data_type: &DataType) -> Error {
        match self {
            Value::String(s) => Error::execution(format!(
                "Cannot cast string '{}' to value of {} type",
                s, data_type
            )),
            other => Error::execution(format!(
                "Cannot cast value {} to {} type",
                other, data_type
            )),
        }
    }

    /// SQL comparison. `None` when either side is NULL or the types are
    /// incomparable.
    pub fn compare(&self, other: &Value) -> Option<Ordering> {
        match (self, other) {
            (Value::Null, _) | (_, Value::Null) => None,
            (Value::Boolean(a), Value::Boolean(b)) => Some(a.cmp(b)),
            (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
            (Value::Float(_), _) | (_, Value::Float(_)) => {
                let (a, b) = (self.as_f64()?, other.as_f64()?);
                a.partial_cmp(&b)
            }
            _ => {
                let (a, b) = (self.as_i128()?, other.as_i128()?);
                Some(a.cmp(&b))
            }
        }
    }

    /// Total order used by ORDER BY: NULL sorts after every other value.
    pub fn sort_cmp(&self, other: &Value) -> Ordering {
        match (self, other) {
            (Value::Null, Value::Null) => Ordering::Equal,
            (Value::Null, _) => Ordering::Greater,
            (_, Value::Null) => Ordering::Less,
            (Value::Float(a), Value::Float(b)) => a.total_cmp(b),
            _ => self.compare(other).unwrap_or(Ordering::Equal),
        }
    }

    /// Appends a hashable encoding of this value to `buf`.
    ///
    /// Equal integers encode identically whatever their signedness.
    pub fn encode_key(&self, buf: &mut Vec<u8>) {
        match self {
            Value::Null => buf.push(0),
            Value::Boolean(b) => {
                buf.push(1);
                buf.push(*b as u8);
            }
            Value::Integer(_) | Value::UInteger(_) => {
                buf.push(2);
                buf.extend_from_slice(&self.as_i128().unwrap_or_default().to_le_bytes());
            }
            Value::Float(f) => {
                buf.push(3);
                let normalized = if *f == 0.0 { 0.0f64 } else { *f };
                buf.extend_from_slice(&normalized.to_bits().to_le_bytes());
            }
            Value::String(s) => {
                buf.push(4);
                buf.extend_from_slice(&(s.len() as u64).to_le_bytes());
                buf.extend_from_slice(s.as_bytes());
            }
        }
    }
}

fn integer_fits(v: i128, data_type: &DataType) -> bool {
    let (min, max): (i128, i128) = match data_type {
        DataType::Int8 => (i8::MIN as i128, i8::MAX as i128),
        DataType::Int16 => (i16::MIN as i128, i16::MAX as i128),
        DataType::Int32 => (i32::MIN as i128, i32::MAX as i128),
        DataType::Int64 => (i64::MIN as i128, i64::MAX as i128),
        DataType::UInt8 => (0, u8::MAX as i128),
        DataType::UInt16 => (0, u16::MAX as i128),
        DataType::UInt32 => (0, u32::MAX as i128),
        DataType::UInt64 => (0, u64::MAX as i128),
        _ => return false,
    };
    v >= min && v <= max
}

fn out_of_range(value: &Value, data_type: &DataType) -> Error {
    Error::execution(format!(
        "Value {} is not representable as {}",
        value, data_type
    ))
}

macro_rules! build_integer_array {
    ($builder:ty, $native:ty, $data_type:expr, $values:expr) => {{
        let mut builder = <$builder>::new();
        for value in $values {
            match value {
                Value::Null => builder.append_null(),
                other => {
                    let wide = other
                        .as_i128()
                        .ok_or_else(|| out_of_range(other, $data_type))?;
                    let native =
                        <$native>::try_from(wide).map_err(|_| out_of_range(other, $data_type))?;
                    builder.append_value(native);
                }
            }
        }
        Arc::new(builder.finish()) as ArrayRef
    }};
}

/// Encodes a column of values as an Arrow array of `data_type`.
pub fn build_array<'a, I>(data_type: &DataType, values: I) -> Result<ArrayRef>
where
    I: IntoIterator<Item = &'a Value>,
{
    let array = match data_type {
        DataType::Null => {
            let mut len = 0;
            for value in values {
                if !value.is_null() {
                    return Err(out_of_range(value, data_type));
                }
                len += 1;
            }
            Arc::new(NullArray::new(len)) as ArrayRef
        }
        DataType::Boolean => {
            let mut builder = BooleanBuilder::new();
            for value in values {
                match value {
                    Value::Null => builder.append_null(),
                    Value::Boolean(b) => builder.append_value(*b),
                    other => return Err(out_of_range(other, data_type)),
                }
            }
            Arc::new(builder.finish()) as ArrayRef
        }
        DataType::Int8 => build_integer_array!(Int8Builder, i8, data_type, values),
        DataType::Int16 => build_integer_array!(Int16Builder, i16, data_type, values),
        DataType::Int32 => build_integer_array!(Int32Builder, i32, data_type, values),
        DataType::Int64 => build_integer_array!(Int64Builder, i64, data_type, values),
        DataType::UInt8 => build_integer_array!(UInt8Builder, u8, data_type, values),
        DataType::UInt16 => build_integer_array!(UInt16Builder, u16, data_type, values),
        DataType::UInt32 => build_integer_array!(UInt32Builder, u32, data_type, values),
        DataType::UInt64 => build_integer_array!(UInt64Builder, u64, data_type, values),
        DataType::Float32 => {
            let mut builder = Float32Builder::new();
            for value in values {
                match value.as_f64() {
                    Some(f) => builder.append_value(f as f32),
                    None if value.is_null() => builder.append_null(),
                    None => return Err(out_of_range(value, data_type)),
                }
            }
            Arc::new(builder.finish()) as ArrayRef
        }
        DataType::Float64 => {
            let mut builder = Float64Builder::new();
            for value in values {
                match value.as_f64() {
                    Some(f) => builder.append_value(f),
                    None if value.is_null() => builder.append_null(),
                    None => return Err(out_of_range(value, data_type)),
                }
            }
            Arc::new(builder.finish()) as ArrayRef
        }
        DataType::Utf8 => {
            let mut builder = StringBuilder::new();
            for value in values {
                match value {
                    Value::Null => builder.append_null(),
                    Value::String(s) => builder.append_value(s),
                    other => builder.append_value(other.to_string()),
                }
            }
            Arc::new(builder.finish()) as ArrayRef
        }
        DataType::LargeUtf8 => {
            let mut builder = LargeStringBuilder::new();
            for value in values {
                match value {
                    Value::Null => builder.append_null(),
                    Value::String(s) => builder.append_value(s),
                    other => builder.append_value(other.to_string()),
                }
            }
            Arc::new(builder.finish()) as ArrayRef
        }
        other => {
            return Err(Error::not_implemented(format!(
                "Unsupported data type {}",
                other
            )))
        }
    };
    Ok(array)
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "NULL"),
            Value::Boolean(b) => write!(f, "{}", b),
            Value::Integer(i) => write!(f, "{}", i),
            Value::UInteger(u) => write!(f, "{}", u),
            Value::Float(fl) => write!(f, "{}", fl),
            Value::String(s) => write!(f, "{}", s),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::array::{Int8Array, StringArray};

    #[test]
    fn test_compare_mixed_numerics() {
        assert_eq!(
            Value::Integer(2).compare(&Value::Float(2.5)),
            Some(Ordering::Less)
        );
        assert_eq!(
            Value::UInteger(u64::MAX).compare(&Value::Integer(-1)),
            Some(Ordering::Greater)
        );
        assert_eq!(Value::Integer(1).compare(&Value::Null), None);
        assert_eq!(
            Value::String("a".into()).compare(&Value::Integer(1)),
            None
        );
    }

    #[test]
    fn test_nulls_sort_last() {
        let mut values = vec![Value::Null, Value::Integer(3), Value::Integer(1)];
        values.sort_by(|a, b| a.sort_cmp(b));
        assert_eq!(values, vec![Value::Integer(1), Value::Integer(3), Value::Null]);
    }

    #[test]
    fn test_build_array_checks_range() {
        let ok = build_array(&DataType::Int8, &[Value::Integer(1), Value::Null]).unwrap();
        let ok = ok.as_any().downcast_ref::<Int8Array>().unwrap();
        assert_eq!(ok.value(0), 1);
        assert!(ok.is_null(1));

        let err = build_array(&DataType::Int8, &[Value::Integer(300)]).unwrap_err();
        assert_eq!(err.code(), crate::ErrorCode::Execution);
    }

    #[test]
    fn test_from_array_reads_nulls() {
        let array = StringArray::from(vec![Some("x"), None]);
        assert_eq!(
            Value::from_array(&array, 0).unwrap(),
            Value::String("x".into())
        );
        assert_eq!(Value::from_array(&array, 1).unwrap(), Value::Null);
    }

    #[test]
    fn test_cast() {
        assert_eq!(
            Value::String(" 42 ".into()).cast_to(&DataType::Int16).unwrap(),
            Value::Integer(42)
        );
        assert_eq!(
            Value::Float(3.9).cast_to(&DataType::Int64).unwrap(),
            Value::Integer(3)
        );
        assert!(Value::Integer(-1).cast_to(&DataType::UInt8).is_err());
        assert!(Value::String("abc".into()).cast_to(&DataType::Int64).is_err());
        assert_eq!(
            Value::Integer(7).cast_to(&DataType::Utf8).unwrap(),
            Value::String("7".into())
        );
    }

    #[test]
    fn test_key_encoding_ignores_signedness() {
        let mut a = Vec::new();
        let mut b = Vec::new();
        Value::Integer(5).encode_key(&mut a);
        Value::UInteger(5).encode_key(&mut b);
        assert_eq!(a, b);
    }
}
