//! Named, typed values used for keys and columns.
//!
//! A [`Field`] pairs a name with a [`Value`]. The value is a one-of over
//! boolean, integer, double, string, binary and null. Null travels as a
//! fixed sentinel byte string under its own tag, so an explicit null never
//! collapses into a missing value, an empty string or zero.
//!
//! Typed callers build values with the explicit constructors or `From`
//! impls. Dynamic input (JSON) goes through [`Value::infer`], which maps
//! each JSON shape to exactly one variant and rejects the rest.

use serde::{Deserialize, Serialize};
use serde_bytes::ByteBuf;

use crate::error::{ApolloError, Result};

/// Bytes carried by a null value on the wire.
pub const NULL_SENTINEL: &[u8] = &[0x00];

/// Field value one-of.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(into = "WireValue", try_from = "WireValue")]
pub enum Value {
    /// Boolean.
    Boolean(bool),
    /// Signed integer.
    Int(i64),
    /// Double precision float.
    Double(f64),
    /// UTF-8 string.
    String(String),
    /// Raw bytes.
    Binary(Vec<u8>),
    /// Explicit null.
    Null,
}

/// On-the-wire shape of [`Value`].
#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
enum WireValue {
    Boolean(bool),
    Int(i64),
    Double(f64),
    String(String),
    Binary(ByteBuf),
    Null(ByteBuf),
}

impl From<Value> for WireValue {
    fn from(value: Value) -> Self {
        match value {
            Value::Boolean(b) => WireValue::Boolean(b),
            Value::Int(i) => WireValue::Int(i),
            Value::Double(d) => WireValue::Double(d),
            Value::String(s) => WireValue::String(s),
            Value::Binary(b) => WireValue::Binary(ByteBuf::from(b)),
            Value::Null => WireValue::Null(ByteBuf::from(NULL_SENTINEL.to_vec())),
        }
    }
}

impl TryFrom<WireValue> for Value {
    type Error = String;

    fn try_from(wire: WireValue) -> std::result::Result<Self, Self::Error> {
        Ok(match wire {
            WireValue::Boolean(b) => Value::Boolean(b),
            WireValue::Int(i) => Value::Int(i),
            WireValue::Double(d) => Value::Double(d),
            WireValue::String(s) => Value::String(s),
            WireValue::Binary(b) => Value::Binary(b.into_vec()),
            WireValue::Null(sentinel) if sentinel.as_slice() == NULL_SENTINEL => Value::Null,
            WireValue::Null(other) => {
                return Err(format!("null field carries unexpected bytes {:02X?}", other.as_slice()))
            }
        })
    }
}

impl Value {
    /// Map a dynamically typed JSON value onto a field variant.
    ///
    /// | JSON | Value |
    /// |---|---|
    /// | `true`/`false` | `Boolean` |
    /// | integral number within `i64` | `Int` |
    /// | any other finite number | `Double` |
    /// | string | `String` |
    /// | `null` | `Null` |
    ///
    /// Arrays, objects and integers outside `i64` are rejected.
    pub fn infer(json: serde_json::Value) -> Result<Self> {
        match json {
            serde_json::Value::Bool(b) => Ok(Value::Boolean(b)),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Ok(Value::Int(i))
                } else if n.is_u64() {
                    Err(ApolloError::InvalidValue(format!(
                        "integer {} does not fit a signed 64-bit field",
                        n
                    )))
                } else {
                    n.as_f64().map(Value::Double).ok_or_else(|| {
                        ApolloError::InvalidValue(format!("number {} is not representable", n))
                    })
                }
            }
            serde_json::Value::String(s) => Ok(Value::String(s)),
            serde_json::Value::Null => Ok(Value::Null),
            serde_json::Value::Array(_) => Err(ApolloError::InvalidValue(
                "arrays cannot be stored in a field".to_string(),
            )),
            serde_json::Value::Object(_) => Err(ApolloError::InvalidValue(
                "objects cannot be stored in a field".to_string(),
            )),
        }
    }

    /// Whether this is the explicit null.
    #[inline]
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// String contents, if this is a string.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Integer contents, if this is an integer.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Double contents, if this is a double.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Double(d) => Some(*d),
            _ => None,
        }
    }

    /// Boolean contents, if this is a boolean.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    /// Byte contents, if this is binary.
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Value::Binary(b) => Some(b),
            _ => None,
        }
    }

    /// Variant name for diagnostics.
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Boolean(_) => "boolean",
            Value::Int(_) => "int",
            Value::Double(_) => "double",
            Value::String(_) => "string",
            Value::Binary(_) => "binary",
            Value::Null => "null",
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Boolean(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(i64::from(v))
    }
}

impl From<u32> for Value {
    fn from(v: u32) -> Self {
        Value::Int(i64::from(v))
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Double(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Value::Binary(v)
    }
}

impl From<&[u8]> for Value {
    fn from(v: &[u8]) -> Self {
        Value::Binary(v.to_vec())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Null, Into::into)
    }
}

/// A named value: one key part or one column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Field {
    /// Column or key name.
    pub name: String,
    /// Typed value.
    pub value: Value,
}

impl Field {
    /// Create a field from anything convertible into a [`Value`].
    pub fn new(name: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }

    /// String field.
    pub fn string(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self::new(name, Value::String(value.into()))
    }

    /// Integer field.
    pub fn int(name: impl Into<String>, value: i64) -> Self {
        Self::new(name, Value::Int(value))
    }

    /// Double field.
    pub fn double(name: impl Into<String>, value: f64) -> Self {
        Self::new(name, Value::Double(value))
    }

    /// Boolean field.
    pub fn boolean(name: impl Into<String>, value: bool) -> Self {
        Self::new(name, Value::Boolean(value))
    }

    /// Binary field.
    pub fn binary(name: impl Into<String>, value: impl Into<Vec<u8>>) -> Self {
        Self::new(name, Value::Binary(value.into()))
    }

    /// Null field.
    pub fn null(name: impl Into<String>) -> Self {
        Self::new(name, Value::Null)
    }

    /// Field from a dynamically typed JSON value; see [`Value::infer`].
    pub fn infer(name: impl Into<String>, json: serde_json::Value) -> Result<Self> {
        Ok(Self {
            name: name.into(),
            value: Value::infer(json)?,
        })
    }

    /// Fields from a JSON key or column list.
    ///
    /// Accepts an array of single-entry objects, which keeps order
    /// (`[{"id": "0001"}, {"ts": 1690000000}]`), or a flat object whose
    /// entries come back sorted by name.
    pub fn list_from_json(json: serde_json::Value) -> Result<Vec<Field>> {
        match json {
            serde_json::Value::Array(items) => items
                .into_iter()
                .map(|item| match item {
                    serde_json::Value::Object(map) if map.len() == 1 => {
                        let (name, value) = map.into_iter().next().ok_or_else(|| {
                            ApolloError::InvalidValue("empty field entry".to_string())
                        })?;
                        Field::infer(name, value)
                    }
                    other => Err(ApolloError::InvalidValue(format!(
                        "expected a single-entry object, got {}",
                        other
                    ))),
                })
                .collect(),
            serde_json::Value::Object(map) => map
                .into_iter()
                .map(|(name, value)| Field::infer(name, value))
                .collect(),
            other => Err(ApolloError::InvalidValue(format!(
                "expected an array or object of fields, got {}",
                other
            ))),
        }
    }
}
