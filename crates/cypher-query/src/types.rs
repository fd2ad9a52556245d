//! Semantic value types and constant values.
//!
//! Every expression node carries a `ValueType`. Comparisons require exact
//! type equality after nullable widening, so the distinction between
//! `Int32` and `Nullable(Int32)` matters throughout the binder.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use serde_json::Value as JsonValue;
use std::fmt;

/// Semantic type of an expression.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub enum ValueType {
    Bool,
    Int32,
    Int64,
    Float64,
    String,
    DateTime,
    /// Named enumeration stored as its underlying primitive
    Enum {
        name: String,
        underlying: Box<ValueType>,
    },
    Nullable(Box<ValueType>),
    /// A mapped entity (node) type
    Entity(String),
    /// Widened, type-erased value
    Object,
    /// Fixed-length ordered list of member expressions (tuple/record equality)
    MemberSequence,
}

impl ValueType {
    /// Nullable wrapper around `inner`. Already-nullable types are returned as is.
    pub fn nullable(inner: ValueType) -> Self {
        match inner {
            ValueType::Nullable(_) => inner,
            other => ValueType::Nullable(Box::new(other)),
        }
    }

    /// Enumeration type backed by `underlying`
    pub fn enumeration(name: impl Into<String>, underlying: ValueType) -> Self {
        ValueType::Enum {
            name: name.into(),
            underlying: Box::new(underlying),
        }
    }

    pub fn is_nullable(&self) -> bool {
        matches!(self, ValueType::Nullable(_))
    }

    /// Strip one nullable layer.
    pub fn unwrap_nullable(&self) -> &ValueType {
        match self {
            ValueType::Nullable(inner) => inner,
            other => other,
        }
    }

    /// Underlying primitive of an enumeration, otherwise self.
    pub fn unwrap_enum(&self) -> &ValueType {
        match self {
            ValueType::Enum { underlying, .. } => underlying,
            other => other,
        }
    }

    /// Primitive type used to look up a literal mapping.
    pub fn storage_type(&self) -> &ValueType {
        self.unwrap_nullable().unwrap_enum()
    }

    pub fn is_bool(&self) -> bool {
        matches!(self.unwrap_nullable(), ValueType::Bool)
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValueType::Bool => write!(f, "bool"),
            ValueType::Int32 => write!(f, "int32"),
            ValueType::Int64 => write!(f, "int64"),
            ValueType::Float64 => write!(f, "float64"),
            ValueType::String => write!(f, "string"),
            ValueType::DateTime => write!(f, "datetime"),
            ValueType::Enum { name, .. } => write!(f, "{}", name),
            ValueType::Nullable(inner) => write!(f, "{}?", inner),
            ValueType::Entity(name) => write!(f, "{}", name),
            ValueType::Object => write!(f, "object"),
            ValueType::MemberSequence => write!(f, "member[]"),
        }
    }
}

/// A constant value.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Value {
    Null,
    Bool(bool),
    Int32(i32),
    Int64(i64),
    Float64(f64),
    String(String),
    DateTime(DateTime<Utc>),
    /// Enumeration member, carried as its underlying integer
    Enum { type_name: String, value: i64 },
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Runtime type of the value. `None` for null.
    pub fn runtime_type(&self) -> Option<ValueType> {
        match self {
            Value::Null => None,
            Value::Bool(_) => Some(ValueType::Bool),
            Value::Int32(_) => Some(ValueType::Int32),
            Value::Int64(_) => Some(ValueType::Int64),
            Value::Float64(_) => Some(ValueType::Float64),
            Value::String(_) => Some(ValueType::String),
            Value::DateTime(_) => Some(ValueType::DateTime),
            Value::Enum { type_name, .. } => Some(ValueType::enumeration(
                type_name.clone(),
                ValueType::Int64,
            )),
        }
    }

    /// Replace an enumeration member by its underlying primitive.
    ///
    /// The primitive width follows `underlying` when given, so an enum backed
    /// by `Int32` renders through the 32-bit mapping.
    pub fn unwrap_enum(&self, underlying: Option<&ValueType>) -> Value {
        match self {
            Value::Enum { value, .. } => match underlying {
                Some(ValueType::Int32) => match i32::try_from(*value) {
                    Ok(narrow) => Value::Int32(narrow),
                    Err(_) => Value::Int64(*value),
                },
                _ => Value::Int64(*value),
            },
            other => other.clone(),
        }
    }

    /// JSON form for the parameter table.
    pub fn to_json(&self) -> JsonValue {
        match self {
            Value::Null => JsonValue::Null,
            Value::Bool(b) => JsonValue::Bool(*b),
            Value::Int32(i) => JsonValue::from(*i),
            Value::Int64(i) => JsonValue::from(*i),
            Value::Float64(f) => serde_json::Number::from_f64(*f)
                .map(JsonValue::Number)
                .unwrap_or(JsonValue::Null),
            Value::String(s) => JsonValue::String(s.clone()),
            Value::DateTime(dt) => {
                JsonValue::String(dt.to_rfc3339_opts(SecondsFormat::AutoSi, true))
            }
            Value::Enum { value, .. } => JsonValue::from(*value),
        }
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Value::Int32(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Int64(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Float64(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::String(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::String(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nullable_is_idempotent() {
        let once = ValueType::nullable(ValueType::Int32);
        let twice = ValueType::nullable(once.clone());

        assert_eq!(once, twice);
        assert_eq!(twice.unwrap_nullable(), &ValueType::Int32);
    }

    #[test]
    fn test_storage_type_unwraps_nullable_enum() {
        let status = ValueType::nullable(ValueType::enumeration("Status", ValueType::Int32));
        assert_eq!(status.storage_type(), &ValueType::Int32);
    }

    #[test]
    fn test_enum_value_narrows_to_underlying() {
        let value = Value::Enum {
            type_name: "Status".to_string(),
            value: 2,
        };

        assert_eq!(value.unwrap_enum(Some(&ValueType::Int32)), Value::Int32(2));
        assert_eq!(value.unwrap_enum(None), Value::Int64(2));
    }

    #[test]
    fn test_to_json() {
        assert_eq!(Value::Null.to_json(), JsonValue::Null);
        assert_eq!(Value::from(100).to_json(), serde_json::json!(100));
        assert_eq!(Value::from("Ant").to_json(), serde_json::json!("Ant"));
        assert_eq!(Value::Float64(f64::NAN).to_json(), JsonValue::Null);
    }

    #[test]
    fn test_display() {
        assert_eq!(ValueType::nullable(ValueType::Int32).to_string(), "int32?");
        assert_eq!(ValueType::Entity("Warehouse".into()).to_string(), "Warehouse");
    }
}
