//! Cell values decoded from Druid responses.

use chrono::{DateTime, Utc};

/// One decoded cell, tagged by the native type it carried on the wire.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// JSON/Smile boolean
    Bool(bool),
    /// JSON/Smile string
    String(String),
    /// Integer that fits in 64 bits
    Int(i64),
    /// Any other number
    Float(f64),
    /// Explicit null
    Null,
    /// Nested array, object or big number; carries the kind name.
    Unsupported(&'static str),
}

impl Value {
    /// Name of the variant, used in scan errors.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Bool(_) => "bool",
            Value::String(_) => "string",
            Value::Int(_) => "int64",
            Value::Float(_) => "float64",
            Value::Null => "null",
            Value::Unsupported(kind) => *kind,
        }
    }

    /// Try to get as string.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Try to get as integer.
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Check if null.
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }
}

impl From<&serde_json::Value> for Value {
    fn from(v: &serde_json::Value) -> Self {
        match v {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(*b),
            serde_json::Value::String(s) => Value::String(s.clone()),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Value::Int(i),
                // u64 beyond i64::MAX and fractional numbers both land here
                None => n.as_f64().map_or(Value::Unsupported("number"), Value::Float),
            },
            serde_json::Value::Array(_) => Value::Unsupported("array"),
            serde_json::Value::Object(_) => Value::Unsupported("object"),
        }
    }
}

/// A scanned value written into a caller-supplied destination slot.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Datum {
    #[default]
    Null,
    Bool(bool),
    String(String),
    Int(i64),
    Float(f64),
    /// Value of the configured date field.
    Timestamp(DateTime<Utc>),
}

impl Datum {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Datum::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Datum::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            Datum::Float(f) => Some(*f),
            Datum::Int(i) => Some(*i as f64),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Datum::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_timestamp(&self) -> Option<DateTime<Utc>> {
        match self {
            Datum::Timestamp(t) => Some(*t),
            _ => None,
        }
    }
}
