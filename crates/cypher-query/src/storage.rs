//! Literal formatting and identifier delimiting.
//!
//! The generator never escapes text itself; it asks a `TypeMapper` for the
//! mapping that formats a value and a `GenerationHelper` for quoted names.

use crate::metadata::PropertyRef;
use crate::types::{Value, ValueType};
use chrono::SecondsFormat;

/// How one family of values is written as a literal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LiteralKind {
    Boolean,
    Integer,
    Float,
    String,
    /// Temporal value wrapped in a constructor function, e.g. `date('...')`
    Temporal(&'static str),
}

/// A literal mapping for one store type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeMapping {
    pub store_type: &'static str,
    pub kind: LiteralKind,
}

impl TypeMapping {
    pub const BOOLEAN: TypeMapping = TypeMapping {
        store_type: "BOOLEAN",
        kind: LiteralKind::Boolean,
    };
    pub const INTEGER: TypeMapping = TypeMapping {
        store_type: "INTEGER",
        kind: LiteralKind::Integer,
    };
    pub const FLOAT: TypeMapping = TypeMapping {
        store_type: "FLOAT",
        kind: LiteralKind::Float,
    };
    pub const STRING: TypeMapping = TypeMapping {
        store_type: "STRING",
        kind: LiteralKind::String,
    };
    pub const DATETIME: TypeMapping = TypeMapping {
        store_type: "DATETIME",
        kind: LiteralKind::Temporal("datetime"),
    };
    pub const LOCAL_DATETIME: TypeMapping = TypeMapping {
        store_type: "LOCALDATETIME",
        kind: LiteralKind::Temporal("localdatetime"),
    };
    pub const DATE: TypeMapping = TypeMapping {
        store_type: "DATE",
        kind: LiteralKind::Temporal("date"),
    };

    /// Whether a runtime value can be written through this mapping.
    pub fn accepts(&self, value: &Value) -> bool {
        match (self.kind, value) {
            (_, Value::Null) => true,
            (LiteralKind::Boolean, Value::Bool(_)) => true,
            (LiteralKind::Integer, Value::Int32(_) | Value::Int64(_)) => true,
            (LiteralKind::Float, Value::Float64(_)) => true,
            (LiteralKind::String, Value::String(_)) => true,
            (LiteralKind::Temporal(_), Value::DateTime(_) | Value::String(_)) => true,
            _ => false,
        }
    }

    /// Format `value` as a literal. Returns `None` when the value does not
    /// fit this mapping.
    pub fn generate_literal(&self, value: &Value) -> Option<String> {
        if value.is_null() {
            return Some("null".to_string());
        }

        match (self.kind, value) {
            (LiteralKind::Boolean, Value::Bool(b)) => Some(b.to_string()),
            (LiteralKind::Integer, Value::Int32(i)) => Some(i.to_string()),
            (LiteralKind::Integer, Value::Int64(i)) => Some(i.to_string()),
            (LiteralKind::Float, Value::Float64(f)) => Some(format_float(*f)),
            (LiteralKind::String, Value::String(s)) => Some(quote_string(s)),
            (LiteralKind::Temporal(func), Value::DateTime(dt)) => Some(format!(
                "{}({})",
                func,
                quote_string(&dt.to_rfc3339_opts(SecondsFormat::AutoSi, true))
            )),
            (LiteralKind::Temporal(func), Value::String(s)) => {
                Some(format!("{}({})", func, quote_string(s)))
            }
            _ => None,
        }
    }
}

fn format_float(value: f64) -> String {
    let text = value.to_string();
    if value.is_finite() && !text.contains(['.', 'e', 'E']) {
        format!("{}.0", text)
    } else {
        text
    }
}

fn quote_string(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('\'');
    for c in value.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\'' => out.push_str("\\'"),
            _ => out.push(c),
        }
    }
    out.push('\'');
    out
}

/// Value/type to literal mapping lookup.
pub trait TypeMapper: Send + Sync {
    /// Mapping for a semantic type (after nullable/enum unwrapping by the caller)
    fn find_mapping(&self, value_type: &ValueType) -> Option<TypeMapping>;

    /// Mapping selected by a value's runtime type
    fn mapping_for_value(&self, value: &Value) -> Option<TypeMapping> {
        value
            .runtime_type()
            .and_then(|t| self.find_mapping(t.storage_type()))
    }

    /// Storage representation of a property
    fn mapping_for_property(&self, property: &PropertyRef) -> Option<TypeMapping>;
}

/// Mappings for the primitive value types.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultTypeMapper;

impl TypeMapper for DefaultTypeMapper {
    fn find_mapping(&self, value_type: &ValueType) -> Option<TypeMapping> {
        match value_type.storage_type() {
            ValueType::Bool => Some(TypeMapping::BOOLEAN),
            ValueType::Int32 | ValueType::Int64 => Some(TypeMapping::INTEGER),
            ValueType::Float64 => Some(TypeMapping::FLOAT),
            ValueType::String => Some(TypeMapping::STRING),
            ValueType::DateTime => Some(TypeMapping::DATETIME),
            _ => None,
        }
    }

    fn mapping_for_property(&self, property: &PropertyRef) -> Option<TypeMapping> {
        match property.property.store_type.as_deref() {
            Some(store) if store.eq_ignore_ascii_case("date") => Some(TypeMapping::DATE),
            Some(store) if store.eq_ignore_ascii_case("datetime") => Some(TypeMapping::DATETIME),
            Some(store) if store.eq_ignore_ascii_case("localdatetime") => {
                Some(TypeMapping::LOCAL_DATETIME)
            }
            _ => self.find_mapping(property.value_type()),
        }
    }
}

/// Identifier quoting.
pub trait GenerationHelper: Send + Sync {
    fn delimit_identifier(&self, name: &str) -> String;
}

/// Wraps identifiers in a quote character, doubling embedded quotes.
#[derive(Debug, Clone, Copy)]
pub struct DefaultGenerationHelper {
    quote: char,
}

impl DefaultGenerationHelper {
    pub fn new(quote: char) -> Self {
        Self { quote }
    }
}

impl Default for DefaultGenerationHelper {
    fn default() -> Self {
        Self::new('"')
    }
}

impl GenerationHelper for DefaultGenerationHelper {
    fn delimit_identifier(&self, name: &str) -> String {
        let mut out = String::with_capacity(name.len() + 2);
        out.push(self.quote);
        for c in name.chars() {
            if c == self.quote {
                out.push(c);
            }
            out.push(c);
        }
        out.push(self.quote);
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::Property;
    use chrono::{TimeZone, Utc};
    use test_case::test_case;

    #[test_case(Value::Bool(true), "true" ; "boolean")]
    #[test_case(Value::Int32(100), "100" ; "int32")]
    #[test_case(Value::Int64(-7), "-7" ; "int64")]
    #[test_case(Value::Float64(2.0), "2.0" ; "whole float")]
    #[test_case(Value::Float64(0.25), "0.25" ; "fractional float")]
    #[test_case(Value::from("Giant"), "'Giant'" ; "string")]
    #[test_case(Value::from("it's"), "'it\\'s'" ; "string with quote")]
    #[test_case(Value::from("a\\b"), "'a\\\\b'" ; "string with backslash")]
    fn test_literal_by_runtime_type(value: Value, expected: &str) {
        let mapping = DefaultTypeMapper.mapping_for_value(&value).unwrap();
        assert_eq!(mapping.generate_literal(&value).unwrap(), expected);
    }

    #[test]
    fn test_datetime_literal() {
        let value = Value::DateTime(Utc.with_ymd_and_hms(2020, 1, 2, 3, 4, 5).unwrap());
        let mapping = DefaultTypeMapper.mapping_for_value(&value).unwrap();

        assert_eq!(
            mapping.generate_literal(&value).unwrap(),
            "datetime('2020-01-02T03:04:05Z')"
        );
    }

    #[test]
    fn test_property_store_type_override() {
        let property = PropertyRef {
            entity: "Order".to_string(),
            property: Property::new("Placed", ValueType::String).with_store_type("date"),
        };

        let mapping = DefaultTypeMapper.mapping_for_property(&property).unwrap();
        assert_eq!(mapping, TypeMapping::DATE);
        assert_eq!(
            mapping.generate_literal(&Value::from("2020-01-01")).unwrap(),
            "date('2020-01-01')"
        );
    }

    #[test]
    fn test_no_mapping_for_entities() {
        assert!(DefaultTypeMapper
            .find_mapping(&ValueType::Entity("Warehouse".into()))
            .is_none());
        assert!(DefaultTypeMapper.find_mapping(&ValueType::Object).is_none());
    }

    #[test]
    fn test_mapping_rejects_mismatched_value() {
        assert!(!TypeMapping::INTEGER.accepts(&Value::from("x")));
        assert!(TypeMapping::INTEGER.generate_literal(&Value::from("x")).is_none());
    }

    #[test]
    fn test_delimit_identifier() {
        let helper = DefaultGenerationHelper::default();

        assert_eq!(helper.delimit_identifier("Location"), "\"Location\"");
        assert_eq!(helper.delimit_identifier("a\"b"), "\"a\"\"b\"");
        assert_eq!(
            DefaultGenerationHelper::new('`').delimit_identifier("Size"),
            "`Size`"
        );
    }
}
