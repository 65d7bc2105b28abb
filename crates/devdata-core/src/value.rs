//! ---
//! devdata_section: "01-core-functionality"
//! devdata_subsection: "module"
//! devdata_type: "source"
//! devdata_scope: "code"
//! devdata_description: "Typed scalar values carried by device data elements."
//! devdata_version: "v0.0.0-prealpha"
//! devdata_owner: "tbd"
//! ---
use std::fmt;

use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumIter, EnumString};

/// Type tag attached to every [`Value`].
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
    EnumIter,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ValueType {
    /// Signed integer.
    Integer,
    /// Double precision floating point.
    Float,
    /// UTF-8 string.
    String,
    /// Boolean flag.
    Boolean,
}

impl ValueType {
    /// Value an element of this type holds before anything has been read or written.
    pub fn default_value(self) -> Value {
        match self {
            ValueType::Integer => Value::Integer(0),
            ValueType::Float => Value::Float(0.0),
            ValueType::String => Value::String(String::new()),
            ValueType::Boolean => Value::Boolean(false),
        }
    }
}

/// Scalar value exchanged between callers, elements, and native drivers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
pub enum Value {
    /// Signed integer payload.
    Integer(i64),
    /// Floating point payload.
    Float(f64),
    /// String payload.
    String(String),
    /// Boolean payload.
    Boolean(bool),
}

impl Value {
    /// Type tag of the payload.
    pub fn value_type(&self) -> ValueType {
        match self {
            Value::Integer(_) => ValueType::Integer,
            Value::Float(_) => ValueType::Float,
            Value::String(_) => ValueType::String,
            Value::Boolean(_) => ValueType::Boolean,
        }
    }

    /// Whether this value may be stored in an element declared with `ty`.
    pub fn is_compatible(&self, ty: ValueType) -> bool {
        self.value_type() == ty
    }

    /// Integer payload, if any.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Integer(v) => Some(*v),
            _ => None,
        }
    }

    /// Float payload, if any.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Float(v) => Some(*v),
            _ => None,
        }
    }

    /// String payload, if any.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(v) => Some(v.as_str()),
            _ => None,
        }
    }

    /// Boolean payload, if any.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Boolean(v) => Some(*v),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Integer(v) => write!(f, "{v}"),
            Value::Float(v) => write!(f, "{v}"),
            Value::String(v) => write!(f, "{v:?}"),
            Value::Boolean(v) => write!(f, "{v}"),
        }
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Integer(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Value::Integer(value.into())
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Float(value)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Boolean(value)
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::String(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::String(value.to_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strum::IntoEnumIterator;

    #[test]
    fn default_values_carry_their_type() {
        for ty in ValueType::iter() {
            assert_eq!(ty.default_value().value_type(), ty);
        }
    }

    #[test]
    fn type_tags_parse_from_lowercase_names() {
        assert_eq!("float".parse::<ValueType>().unwrap(), ValueType::Float);
        assert_eq!("boolean".parse::<ValueType>().unwrap(), ValueType::Boolean);
        assert!("double".parse::<ValueType>().is_err());
        assert_eq!(ValueType::Integer.to_string(), "integer");
    }

    #[test]
    fn integer_and_float_are_not_compatible() {
        let value = Value::from(10);
        assert!(value.is_compatible(ValueType::Integer));
        assert!(!value.is_compatible(ValueType::Float));
        assert_eq!(value.as_f64(), None);
    }

    #[test]
    fn values_serialize_with_their_tag() {
        let json = serde_json::to_value(Value::from(22.5)).unwrap();
        assert_eq!(json, serde_json::json!({"type": "float", "value": 22.5}));
        let back: Value = serde_json::from_value(json).unwrap();
        assert_eq!(back, Value::Float(22.5));
    }
}
