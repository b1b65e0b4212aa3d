//! Value types exchanged between records and the database
//!
//! Every storable field converts to and from a [`Value`] through [`FieldValue`].

use chrono::{DateTime, NaiveDateTime, Utc};
use std::fmt;
use uuid::Uuid;

/// Storage class of a field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldKind {
    Integer,
    Real,
    Text,
    Blob,
}

impl FieldKind {
    /// SQL type name used when the store owns the DDL
    pub fn sql_type(self) -> &'static str {
        match self {
            FieldKind::Integer => "INTEGER",
            FieldKind::Real => "REAL",
            FieldKind::Text => "TEXT",
            FieldKind::Blob => "BLOB",
        }
    }
}

/// A single cell value
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
    Blob(Vec<u8>),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn kind(&self) -> Option<FieldKind> {
        match self {
            Value::Null => None,
            Value::Integer(_) => Some(FieldKind::Integer),
            Value::Real(_) => Some(FieldKind::Real),
            Value::Text(_) => Some(FieldKind::Text),
            Value::Blob(_) => Some(FieldKind::Blob),
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Integer(v) => Some(*v),
            _ => None,
        }
    }

    fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "NULL",
            Value::Integer(_) => "INTEGER",
            Value::Real(_) => "REAL",
            Value::Text(_) => "TEXT",
            Value::Blob(_) => "BLOB",
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "NULL"),
            Value::Integer(v) => write!(f, "{}", v),
            Value::Real(v) => write!(f, "{}", v),
            Value::Text(v) => write!(f, "'{}'", v),
            Value::Blob(v) => write!(f, "<{} bytes>", v.len()),
        }
    }
}

/// Conversion failure between a [`Value`] and a field type
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ValueError {
    #[error("unexpected NULL")]
    UnexpectedNull,

    #[error("expected {expected}, found {found}")]
    TypeMismatch {
        expected: &'static str,
        found: &'static str,
    },

    #[error("integer {0} out of range")]
    OutOfRange(i64),

    #[error("invalid {kind}: {message}")]
    Parse { kind: &'static str, message: String },
}

impl ValueError {
    fn mismatch(expected: FieldKind, found: &Value) -> Self {
        ValueError::TypeMismatch {
            expected: expected.sql_type(),
            found: found.type_name(),
        }
    }
}

/// Conversion contract for a single record field
pub trait FieldValue: Sized {
    const KIND: FieldKind;

    fn to_value(&self) -> Value;

    fn from_value(value: Value) -> Result<Self, ValueError>;
}

impl FieldValue for i64 {
    const KIND: FieldKind = FieldKind::Integer;

    fn to_value(&self) -> Value {
        Value::Integer(*self)
    }

    fn from_value(value: Value) -> Result<Self, ValueError> {
        match value {
            Value::Integer(v) => Ok(v),
            Value::Null => Err(ValueError::UnexpectedNull),
            other => Err(ValueError::mismatch(Self::KIND, &other)),
        }
    }
}

macro_rules! narrow_integer {
    ($($t:ty),*) => {
        $(
            impl FieldValue for $t {
                const KIND: FieldKind = FieldKind::Integer;

                fn to_value(&self) -> Value {
                    Value::Integer(i64::from(*self))
                }

                fn from_value(value: Value) -> Result<Self, ValueError> {
                    let wide = i64::from_value(value)?;
                    <$t>::try_from(wide).map_err(|_| ValueError::OutOfRange(wide))
                }
            }
        )*
    };
}

narrow_integer!(i8, i16, i32, u8, u16, u32);

impl FieldValue for bool {
    const KIND: FieldKind = FieldKind::Integer;

    fn to_value(&self) -> Value {
        Value::Integer(i64::from(*self))
    }

    fn from_value(value: Value) -> Result<Self, ValueError> {
        Ok(i64::from_value(value)? != 0)
    }
}

impl FieldValue for f64 {
    const KIND: FieldKind = FieldKind::Real;

    fn to_value(&self) -> Value {
        Value::Real(*self)
    }

    fn from_value(value: Value) -> Result<Self, ValueError> {
        match value {
            Value::Real(v) => Ok(v),
            // REAL affinity may hand back whole numbers as integers
            Value::Integer(v) => Ok(v as f64),
            Value::Null => Err(ValueError::UnexpectedNull),
            other => Err(ValueError::mismatch(Self::KIND, &other)),
        }
    }
}

impl FieldValue for f32 {
    const KIND: FieldKind = FieldKind::Real;

    fn to_value(&self) -> Value {
        Value::Real(f64::from(*self))
    }

    fn from_value(value: Value) -> Result<Self, ValueError> {
        f64::from_value(value).map(|v| v as f32)
    }
}

impl FieldValue for String {
    const KIND: FieldKind = FieldKind::Text;

    fn to_value(&self) -> Value {
        Value::Text(self.clone())
    }

    fn from_value(value: Value) -> Result<Self, ValueError> {
        match value {
            Value::Text(v) => Ok(v),
            Value::Null => Err(ValueError::UnexpectedNull),
            other => Err(ValueError::mismatch(Self::KIND, &other)),
        }
    }
}

impl FieldValue for Vec<u8> {
    const KIND: FieldKind = FieldKind::Blob;

    fn to_value(&self) -> Value {
        Value::Blob(self.clone())
    }

    fn from_value(value: Value) -> Result<Self, ValueError> {
        match value {
            Value::Blob(v) => Ok(v),
            Value::Text(v) => Ok(v.into_bytes()),
            Value::Null => Err(ValueError::UnexpectedNull),
            other => Err(ValueError::mismatch(Self::KIND, &other)),
        }
    }
}

impl FieldValue for Uuid {
    const KIND: FieldKind = FieldKind::Text;

    fn to_value(&self) -> Value {
        Value::Text(self.hyphenated().to_string())
    }

    fn from_value(value: Value) -> Result<Self, ValueError> {
        match value {
            Value::Text(v) => Uuid::parse_str(&v).map_err(|e| ValueError::Parse {
                kind: "uuid",
                message: e.to_string(),
            }),
            Value::Blob(v) => Uuid::from_slice(&v).map_err(|e| ValueError::Parse {
                kind: "uuid",
                message: e.to_string(),
            }),
            Value::Null => Err(ValueError::UnexpectedNull),
            other => Err(ValueError::mismatch(Self::KIND, &other)),
        }
    }
}

impl FieldValue for DateTime<Utc> {
    const KIND: FieldKind = FieldKind::Text;

    fn to_value(&self) -> Value {
        Value::Text(self.to_rfc3339())
    }

    fn from_value(value: Value) -> Result<Self, ValueError> {
        let text = String::from_value(value)?;
        if let Ok(parsed) = DateTime::parse_from_rfc3339(&text) {
            return Ok(parsed.with_timezone(&Utc));
        }
        // CURRENT_TIMESTAMP format
        NaiveDateTime::parse_from_str(&text, "%Y-%m-%d %H:%M:%S")
            .map(|naive| naive.and_utc())
            .map_err(|e| ValueError::Parse {
                kind: "timestamp",
                message: e.to_string(),
            })
    }
}

impl<T: FieldValue> FieldValue for Option<T> {
    const KIND: FieldKind = T::KIND;

    fn to_value(&self) -> Value {
        match self {
            Some(v) => v.to_value(),
            None => Value::Null,
        }
    }

    fn from_value(value: Value) -> Result<Self, ValueError> {
        match value {
            Value::Null => Ok(None),
            other => T::from_value(other).map(Some),
        }
    }
}
