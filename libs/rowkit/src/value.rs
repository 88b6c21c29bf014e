//! Column values as seen by materializers.
//!
//! Drivers decode their native column types into [`Value`]; anything a driver
//! cannot express as a plain scalar (JSON documents, vendor object types) is
//! carried as a [`TypedValue`]: the vendor type name plus its textual form.

use std::fmt;

use crate::cursor::CursorError;

/// A single column value.
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Bytes(Vec<u8>),
    Typed(TypedValue),
}

impl Value {
    /// SQL `NULL`, untyped or carrying a vendor type name.
    #[must_use]
    pub fn is_null(&self) -> bool {
        match self {
            Value::Null => true,
            Value::Typed(t) => t.value().is_none(),
            _ => false,
        }
    }

    /// Short name of the variant, used in error messages.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Text(_) => "text",
            Value::Bytes(_) => "bytes",
            Value::Typed(_) => "typed",
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
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

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_owned())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Value::Bytes(v)
    }
}

impl From<TypedValue> for Value {
    fn from(v: TypedValue) -> Self {
        Value::Typed(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Null, Into::into)
    }
}

/// A vendor-typed value: type name plus optional textual representation.
///
/// Postgres `json`/`jsonb` columns decode into `TypedValue { type_name: "jsonb", .. }`.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct TypedValue {
    type_name: String,
    value: Option<String>,
}

impl TypedValue {
    #[must_use]
    pub fn new(type_name: impl Into<String>, value: Option<String>) -> Self {
        Self {
            type_name: type_name.into(),
            value,
        }
    }

    #[must_use]
    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    #[must_use]
    pub fn value(&self) -> Option<&str> {
        self.value.as_deref()
    }

    /// Whether the type is one of the JSON document types.
    #[must_use]
    pub fn is_json(&self) -> bool {
        self.type_name.eq_ignore_ascii_case("json") || self.type_name.eq_ignore_ascii_case("jsonb")
    }
}

impl fmt::Display for TypedValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.value {
            Some(v) => write!(f, "{}({v})", self.type_name),
            None => write!(f, "{}(null)", self.type_name),
        }
    }
}

/// Typed extraction out of a [`Value`].
pub trait FromValue: Sized {
    /// # Errors
    /// Returns `CursorError::Decode` if the value has an incompatible kind.
    fn from_value(value: &Value) -> Result<Self, CursorError>;
}

fn mismatch(expected: &'static str, value: &Value) -> CursorError {
    CursorError::Decode {
        expected,
        found: value.kind(),
    }
}

impl FromValue for Value {
    fn from_value(value: &Value) -> Result<Self, CursorError> {
        Ok(value.clone())
    }
}

impl FromValue for bool {
    fn from_value(value: &Value) -> Result<Self, CursorError> {
        match value {
            Value::Bool(b) => Ok(*b),
            // SQLite and MySQL store booleans as integers
            Value::Int(i) => Ok(*i != 0),
            other => Err(mismatch("bool", other)),
        }
    }
}

impl FromValue for i64 {
    fn from_value(value: &Value) -> Result<Self, CursorError> {
        match value {
            Value::Int(i) => Ok(*i),
            other => Err(mismatch("int", other)),
        }
    }
}

impl FromValue for i32 {
    fn from_value(value: &Value) -> Result<Self, CursorError> {
        let wide = i64::from_value(value)?;
        i32::try_from(wide).map_err(|_| CursorError::Decode {
            expected: "int32",
            found: "int64 out of range",
        })
    }
}

impl FromValue for f64 {
    fn from_value(value: &Value) -> Result<Self, CursorError> {
        match value {
            Value::Float(f) => Ok(*f),
            other => Err(mismatch("float", other)),
        }
    }
}

impl FromValue for String {
    fn from_value(value: &Value) -> Result<Self, CursorError> {
        match value {
            Value::Text(s) => Ok(s.clone()),
            Value::Typed(t) => t
                .value()
                .map(ToOwned::to_owned)
                .ok_or_else(|| mismatch("text", value)),
            other => Err(mismatch("text", other)),
        }
    }
}

impl FromValue for Vec<u8> {
    fn from_value(value: &Value) -> Result<Self, CursorError> {
        match value {
            Value::Bytes(b) => Ok(b.clone()),
            other => Err(mismatch("bytes", other)),
        }
    }
}

impl FromValue for TypedValue {
    fn from_value(value: &Value) -> Result<Self, CursorError> {
        match value {
            Value::Typed(t) => Ok(t.clone()),
            other => Err(mismatch("typed", other)),
        }
    }
}

impl<T: FromValue> FromValue for Option<T> {
    fn from_value(value: &Value) -> Result<Self, CursorError> {
        if value.is_null() {
            Ok(None)
        } else {
            T::from_value(value).map(Some)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn option_maps_null_to_none() {
        let v: Option<i64> = FromValue::from_value(&Value::Null).unwrap();
        assert_eq!(v, None);
        let v: Option<i64> = FromValue::from_value(&Value::Int(4)).unwrap();
        assert_eq!(v, Some(4));
    }

    #[test]
    fn integer_backed_booleans_decode() {
        assert!(bool::from_value(&Value::Int(1)).unwrap());
        assert!(!bool::from_value(&Value::Int(0)).unwrap());
    }

    #[test]
    fn kind_mismatch_names_both_sides() {
        let err = i64::from_value(&Value::Text("x".to_owned())).unwrap_err();
        assert_eq!(err.to_string(), "cannot decode text as int");
    }

    #[test]
    fn typed_value_reads_as_text() {
        let v = Value::Typed(TypedValue::new("jsonb", Some("{}".to_owned())));
        assert_eq!(String::from_value(&v).unwrap(), "{}");
    }

    #[test]
    fn out_of_range_int32_is_rejected() {
        assert!(i32::from_value(&Value::Int(i64::MAX)).is_err());
    }
}
