//! Attribute values.
//!
//! Attributes are dynamically typed on the wire but read through explicit,
//! failing accessors: asking for an int where a string is stored is an error,
//! never a silent conversion.

use crate::error::AttributeError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Scalar stored under an attribute name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Value {
    Str(String),
    Int(i64),
    Double(f64),
}

impl Value {
    /// Name of the variant, used in mismatch errors.
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Str(_) => "str",
            Value::Int(_) => "int",
            Value::Double(_) => "double",
        }
    }

    pub fn as_str(&self) -> Result<&str, AttributeError> {
        match self {
            Value::Str(s) => Ok(s),
            other => Err(AttributeError::TypeMismatch {
                expected: "str",
                found: other.kind(),
            }),
        }
    }

    pub fn as_int(&self) -> Result<i64, AttributeError> {
        match self {
            Value::Int(i) => Ok(*i),
            other => Err(AttributeError::TypeMismatch {
                expected: "int",
                found: other.kind(),
            }),
        }
    }

    pub fn as_double(&self) -> Result<f64, AttributeError> {
        match self {
            Value::Double(d) => Ok(*d),
            other => Err(AttributeError::TypeMismatch {
                expected: "double",
                found: other.kind(),
            }),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Str(s) => f.write_str(s),
            Value::Int(i) => write!(f, "{i}"),
            Value::Double(d) => write!(f, "{d}"),
        }
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Str(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::Str(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Value::Int(value as i64)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Int(value)
    }
}

impl From<u32> for Value {
    fn from(value: u32) -> Self {
        Value::Int(value as i64)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Double(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_typed_accessors_fail_on_mismatch() {
        let value = Value::from("1");
        assert_eq!(value.as_str().unwrap(), "1");

        let err = value.as_int().unwrap_err();
        assert!(matches!(
            err,
            AttributeError::TypeMismatch { expected: "int", found: "str" }
        ));
        assert!(Value::from(2).as_double().is_err());
        assert_eq!(Value::from(2.5).as_double().unwrap(), 2.5);
    }

    #[test]
    fn test_wire_shape_is_tagged() {
        let json = serde_json::to_value(Value::from(100)).unwrap();
        assert_eq!(json, serde_json::json!({ "type": "int", "value": 100 }));

        let back: Value = serde_json::from_value(json).unwrap();
        assert_eq!(back, Value::Int(100));
    }
}
