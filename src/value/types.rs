//! Scalar column types and value coercion.
//!
//! Every physical column carries a [`ScalarType`]. Values supplied by callers are
//! coerced to the column type before they enter a column map, so that `1i32`,
//! `1i64` and `1u8` all produce the same `Value` for an `integer` column.
//!
//! Supported mappings:
//! - boolean: `Value::Bool`
//! - small_integer / integer / big_integer: `Value::SmallInt` / `Value::Int` / `Value::BigInt`
//! - float / double: `Value::Float` / `Value::Double`
//! - text: `Value::String` (also accepts `Value::Char`)
//! - bytes: `Value::Bytes`
//! - json, uuid, timestamp, decimal: passed through when the variant matches

use crate::error::OrmError;
use sea_query::Value;
use serde::{Deserialize, Serialize};

/// Type of a physical column
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScalarType {
    #[serde(alias = "bool")]
    Boolean,
    #[serde(alias = "smallint")]
    SmallInteger,
    #[serde(alias = "int")]
    Integer,
    #[serde(alias = "bigint")]
    BigInteger,
    Float,
    Double,
    #[serde(alias = "string")]
    Text,
    Bytes,
    Json,
    Uuid,
    Timestamp,
    Decimal,
}

impl ScalarType {
    /// Type name used in error messages and DDL comments
    pub fn name(self) -> &'static str {
        match self {
            ScalarType::Boolean => "boolean",
            ScalarType::SmallInteger => "small_integer",
            ScalarType::Integer => "integer",
            ScalarType::BigInteger => "big_integer",
            ScalarType::Float => "float",
            ScalarType::Double => "double",
            ScalarType::Text => "text",
            ScalarType::Bytes => "bytes",
            ScalarType::Json => "json",
            ScalarType::Uuid => "uuid",
            ScalarType::Timestamp => "timestamp",
            ScalarType::Decimal => "decimal",
        }
    }

    /// Typed SQL NULL for this column type
    pub fn null_value(self) -> Value {
        match self {
            ScalarType::Boolean => Value::Bool(None),
            ScalarType::SmallInteger => Value::SmallInt(None),
            ScalarType::Integer => Value::Int(None),
            ScalarType::BigInteger => Value::BigInt(None),
            ScalarType::Float => Value::Float(None),
            ScalarType::Double => Value::Double(None),
            ScalarType::Text => Value::String(None),
            ScalarType::Bytes => Value::Bytes(None),
            ScalarType::Json => Value::Json(None),
            ScalarType::Uuid => Value::Uuid(None),
            ScalarType::Timestamp => Value::ChronoDateTimeUtc(None),
            ScalarType::Decimal => Value::Decimal(None),
        }
    }

    /// Coerce `value` into this column type
    ///
    /// Nulls of any variant become the typed null of this column. Integers are
    /// narrowed or widened when the value fits; anything else that does not
    /// match fails with [`OrmError::InvalidValueType`].
    pub fn coerce(self, column: &str, value: Value) -> Result<Value, OrmError> {
        if is_null(&value) {
            return Ok(self.null_value());
        }

        let actual = value_type_name(&value);
        let coerced = match self {
            ScalarType::Boolean => match value {
                Value::Bool(_) => Some(value),
                _ => None,
            },
            ScalarType::SmallInteger => as_i64(&value)
                .and_then(|i| i16::try_from(i).ok())
                .map(|i| Value::SmallInt(Some(i))),
            ScalarType::Integer => as_i64(&value)
                .and_then(|i| i32::try_from(i).ok())
                .map(|i| Value::Int(Some(i))),
            ScalarType::BigInteger => as_i64(&value).map(|i| Value::BigInt(Some(i))),
            ScalarType::Float => match value {
                Value::Float(_) => Some(value),
                Value::Double(Some(d)) => Some(Value::Float(Some(d as f32))),
                other => as_i64(&other).map(|i| Value::Float(Some(i as f32))),
            },
            ScalarType::Double => match value {
                Value::Double(_) => Some(value),
                Value::Float(Some(f)) => Some(Value::Double(Some(f64::from(f)))),
                other => as_i64(&other).map(|i| Value::Double(Some(i as f64))),
            },
            ScalarType::Text => match value {
                Value::String(_) => Some(value),
                Value::Char(Some(c)) => Some(Value::String(Some(c.to_string()))),
                _ => None,
            },
            ScalarType::Bytes => match value {
                Value::Bytes(_) => Some(value),
                _ => None,
            },
            ScalarType::Json => match value {
                Value::Json(_) => Some(value),
                _ => None,
            },
            ScalarType::Uuid => match value {
                Value::Uuid(_) => Some(value),
                _ => None,
            },
            ScalarType::Timestamp => match value {
                Value::ChronoDateTimeUtc(_) | Value::ChronoDateTime(_) => Some(value),
                _ => None,
            },
            ScalarType::Decimal => match value {
                Value::Decimal(_) => Some(value),
                _ => None,
            },
        };

        coerced.ok_or_else(|| OrmError::InvalidValueType {
            column: column.to_string(),
            expected: self.name().to_string(),
            actual: actual.to_string(),
        })
    }
}

/// Whether `value` is SQL NULL, regardless of variant
pub fn is_null(value: &Value) -> bool {
    matches!(
        value,
        Value::Bool(None)
            | Value::TinyInt(None)
            | Value::SmallInt(None)
            | Value::Int(None)
            | Value::BigInt(None)
            | Value::TinyUnsigned(None)
            | Value::SmallUnsigned(None)
            | Value::Unsigned(None)
            | Value::BigUnsigned(None)
            | Value::Float(None)
            | Value::Double(None)
            | Value::String(None)
            | Value::Char(None)
            | Value::Bytes(None)
            | Value::Json(None)
            | Value::Uuid(None)
            | Value::ChronoDateTimeUtc(None)
            | Value::ChronoDateTime(None)
            | Value::Decimal(None)
    )
}

/// Short name of the variant carried by `value`
pub fn value_type_name(value: &Value) -> &'static str {
    match value {
        Value::Bool(_) => "boolean",
        Value::TinyInt(_) => "tiny_integer",
        Value::SmallInt(_) => "small_integer",
        Value::Int(_) => "integer",
        Value::BigInt(_) => "big_integer",
        Value::TinyUnsigned(_) => "tiny_unsigned",
        Value::SmallUnsigned(_) => "small_unsigned",
        Value::Unsigned(_) => "unsigned",
        Value::BigUnsigned(_) => "big_unsigned",
        Value::Float(_) => "float",
        Value::Double(_) => "double",
        Value::String(_) => "text",
        Value::Char(_) => "char",
        Value::Bytes(_) => "bytes",
        Value::Json(_) => "json",
        Value::Uuid(_) => "uuid",
        Value::ChronoDateTimeUtc(_) | Value::ChronoDateTime(_) => "timestamp",
        Value::Decimal(_) => "decimal",
        _ => "unsupported",
    }
}

fn as_i64(value: &Value) -> Option<i64> {
    match value {
        Value::TinyInt(Some(v)) => Some(i64::from(*v)),
        Value::SmallInt(Some(v)) => Some(i64::from(*v)),
        Value::Int(Some(v)) => Some(i64::from(*v)),
        Value::BigInt(Some(v)) => Some(*v),
        Value::TinyUnsigned(Some(v)) => Some(i64::from(*v)),
        Value::SmallUnsigned(Some(v)) => Some(i64::from(*v)),
        Value::Unsigned(Some(v)) => Some(i64::from(*v)),
        Value::BigUnsigned(Some(v)) => i64::try_from(*v).ok(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_integer_widths_coerce_to_column_type() {
        let expected = Value::Int(Some(20));
        assert_eq!(ScalarType::Integer.coerce("id", Value::BigInt(Some(20))).unwrap(), expected);
        assert_eq!(ScalarType::Integer.coerce("id", Value::TinyUnsigned(Some(20))).unwrap(), expected);
        assert_eq!(ScalarType::Integer.coerce("id", Value::Int(Some(20))).unwrap(), expected);
        assert_eq!(
            ScalarType::BigInteger.coerce("id", Value::Int(Some(7))).unwrap(),
            Value::BigInt(Some(7))
        );
    }

    #[test]
    fn test_out_of_range_integer_is_rejected() {
        let err = ScalarType::SmallInteger
            .coerce("n", Value::BigInt(Some(i64::from(i16::MAX) + 1)))
            .unwrap_err();
        assert!(matches!(err, OrmError::InvalidValueType { ref column, .. } if column == "n"));
    }

    #[test]
    fn test_nulls_become_typed_nulls() {
        assert_eq!(
            ScalarType::Integer.coerce("id", Value::String(None)).unwrap(),
            Value::Int(None)
        );
        assert_eq!(ScalarType::Text.null_value(), Value::String(None));
    }

    #[test]
    fn test_text_rejects_numbers() {
        let err = ScalarType::Text.coerce("name", Value::Int(Some(1))).unwrap_err();
        assert!(matches!(
            err,
            OrmError::InvalidValueType { ref expected, .. } if expected == "text"
        ));
    }

    #[test]
    fn test_char_becomes_text() {
        assert_eq!(
            ScalarType::Text.coerce("code", Value::Char(Some('x'))).unwrap(),
            Value::String(Some("x".to_string()))
        );
    }

    #[test]
    fn test_is_null() {
        assert!(is_null(&Value::BigInt(None)));
        assert!(is_null(&Value::Uuid(None)));
        assert!(!is_null(&Value::Int(Some(0))));
    }

    #[test]
    fn test_scalar_type_deserializes_aliases() {
        let ty: ScalarType = serde_json::from_str("\"int\"").unwrap();
        assert_eq!(ty, ScalarType::Integer);
        let ty: ScalarType = serde_json::from_str("\"big_integer\"").unwrap();
        assert_eq!(ty, ScalarType::BigInteger);
    }
}
