//! Custom value conversions between domain types and column values.
//!
//! Vendor-specific column types (Postgres `json`/`jsonb`) have no natural Rust
//! scalar. Domain code keeps them in small holder types such as [`JsonHolder`]
//! and registers a writing/reading converter pair in [`CustomConversions`].

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::hub::TypeKey;
use crate::value::{TypedValue, Value};

#[derive(Debug, thiserror::Error)]
pub enum ConversionError {
    #[error("no {direction} converter registered for {type_key}")]
    NotFound {
        direction: &'static str,
        type_key: TypeKey,
    },

    #[error("cannot convert {found} into {target}")]
    Incompatible {
        target: TypeKey,
        found: &'static str,
    },

    #[error("malformed value for {target}: {source}")]
    Malformed {
        target: TypeKey,
        #[source]
        source: anyhow::Error,
    },
}

/// Domain value to column value.
pub trait WritingConverter<S>: Send + Sync {
    /// # Errors
    /// Returns `ConversionError::Malformed` if `source` cannot be represented.
    fn write(&self, source: &S) -> Result<Value, ConversionError>;
}

/// Column value to domain value.
pub trait ReadingConverter<T>: Send + Sync {
    /// # Errors
    /// Returns `ConversionError` if `value` has an unexpected kind or content.
    fn read(&self, value: &Value) -> Result<T, ConversionError>;
}

type Boxed = Box<dyn Any + Send + Sync>;

/// User converters keyed by domain type.
#[derive(Default)]
pub struct CustomConversions {
    writers: HashMap<TypeKey, Boxed>,
    readers: HashMap<TypeKey, Boxed>,
}

impl fmt::Debug for CustomConversions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CustomConversions")
            .field("writers", &self.writers.keys().collect::<Vec<_>>())
            .field("readers", &self.readers.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl CustomConversions {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Conversions with the JSON holder pair registered.
    #[must_use]
    pub fn with_json_holder() -> Self {
        Self::new()
            .with_writer::<JsonHolder>(Arc::new(JsonHolderWriter::json()))
            .with_reader::<JsonHolder>(Arc::new(JsonHolderReader))
    }

    #[must_use]
    pub fn with_writer<S: 'static>(mut self, converter: Arc<dyn WritingConverter<S>>) -> Self {
        self.writers.insert(TypeKey::of::<S>(), Box::new(converter));
        self
    }

    #[must_use]
    pub fn with_reader<T: 'static>(mut self, converter: Arc<dyn ReadingConverter<T>>) -> Self {
        self.readers.insert(TypeKey::of::<T>(), Box::new(converter));
        self
    }

    #[must_use]
    pub fn has_writer<S: 'static>(&self) -> bool {
        self.writers.contains_key(&TypeKey::of::<S>())
    }

    #[must_use]
    pub fn has_reader<T: 'static>(&self) -> bool {
        self.readers.contains_key(&TypeKey::of::<T>())
    }

    /// Convert a domain value into a column value.
    ///
    /// # Errors
    /// Returns `ConversionError::NotFound` if no writer is registered for `S`.
    pub fn write<S: 'static>(&self, source: &S) -> Result<Value, ConversionError> {
        let writer = self
            .writers
            .get(&TypeKey::of::<S>())
            .and_then(|b| b.downcast_ref::<Arc<dyn WritingConverter<S>>>())
            .ok_or_else(|| ConversionError::NotFound {
                direction: "writing",
                type_key: TypeKey::of::<S>(),
            })?;
        writer.write(source)
    }

    /// Convert a column value into a domain value.
    ///
    /// # Errors
    /// Returns `ConversionError::NotFound` if no reader is registered for `T`.
    pub fn read<T: 'static>(&self, value: &Value) -> Result<T, ConversionError> {
        let reader = self
            .readers
            .get(&TypeKey::of::<T>())
            .and_then(|b| b.downcast_ref::<Arc<dyn ReadingConverter<T>>>())
            .ok_or_else(|| ConversionError::NotFound {
                direction: "reading",
                type_key: TypeKey::of::<T>(),
            })?;
        reader.read(value)
    }

    /// Like [`Self::read`], mapping SQL `NULL` to `None`.
    ///
    /// # Errors
    /// Same as [`Self::read`].
    pub fn read_optional<T: 'static>(&self, value: &Value) -> Result<Option<T>, ConversionError> {
        if value.is_null() {
            return Ok(None);
        }
        self.read(value).map(Some)
    }
}

/// Holder for a JSON document kept as its original text.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JsonHolder {
    content: String,
}

impl JsonHolder {
    #[must_use]
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
        }
    }

    #[must_use]
    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn set_content(&mut self, content: impl Into<String>) {
        self.content = content.into();
    }

    /// Parse the content.
    ///
    /// # Errors
    /// Returns the `serde_json` error for invalid JSON.
    pub fn parse(&self) -> Result<serde_json::Value, serde_json::Error> {
        serde_json::from_str(&self.content)
    }
}

/// Writes a [`JsonHolder`] as a typed JSON value, leaving the text untouched.
#[derive(Clone, Debug)]
pub struct JsonHolderWriter {
    type_name: &'static str,
}

impl JsonHolderWriter {
    #[must_use]
    pub fn json() -> Self {
        Self { type_name: "json" }
    }

    #[must_use]
    pub fn jsonb() -> Self {
        Self { type_name: "jsonb" }
    }
}

impl WritingConverter<JsonHolder> for JsonHolderWriter {
    fn write(&self, source: &JsonHolder) -> Result<Value, ConversionError> {
        // validate only, the stored text is the caller's original
        serde_json::from_str::<serde::de::IgnoredAny>(&source.content).map_err(|e| {
            ConversionError::Malformed {
                target: TypeKey::of::<TypedValue>(),
                source: e.into(),
            }
        })?;
        Ok(Value::Typed(TypedValue::new(
            self.type_name,
            Some(source.content.clone()),
        )))
    }
}

/// Reads a [`JsonHolder`] from a typed JSON value or plain text.
#[derive(Clone, Copy, Debug, Default)]
pub struct JsonHolderReader;

impl ReadingConverter<JsonHolder> for JsonHolderReader {
    fn read(&self, value: &Value) -> Result<JsonHolder, ConversionError> {
        match value {
            // SQL NULL; JSON `null` arrives as the text "null"
            Value::Typed(t) if t.is_json() => {
                t.value()
                    .map(JsonHolder::new)
                    .ok_or(ConversionError::Incompatible {
                        target: TypeKey::of::<JsonHolder>(),
                        found: "null",
                    })
            }
            Value::Text(s) => Ok(JsonHolder::new(s.as_str())),
            other => Err(ConversionError::Incompatible {
                target: TypeKey::of::<JsonHolder>(),
                found: other.kind(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_holder_round_trips_unchanged() {
        let conversions = CustomConversions::with_json_holder();
        for text in [r#"{"hello": "world"}"#, "[1,2,  3]", "\"s\"", "null"] {
            let holder = JsonHolder::new(text);
            let written = conversions.write(&holder).unwrap();
            let read: JsonHolder = conversions.read(&written).unwrap();
            assert_eq!(read, holder);
            assert_eq!(read.content(), text);
        }
    }

    #[test]
    fn writer_tags_the_json_type() {
        let v = JsonHolderWriter::jsonb().write(&JsonHolder::new("{}")).unwrap();
        let Value::Typed(t) = v else {
            panic!("expected typed value");
        };
        assert_eq!(t.type_name(), "jsonb");
        assert_eq!(t.value(), Some("{}"));
    }

    #[test]
    fn malformed_json_is_wrapped() {
        let err = CustomConversions::with_json_holder()
            .write(&JsonHolder::new("{not json"))
            .unwrap_err();
        assert!(matches!(err, ConversionError::Malformed { .. }));
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn missing_converter_is_not_found() {
        let err = CustomConversions::new().read::<JsonHolder>(&Value::Null).unwrap_err();
        assert!(matches!(err, ConversionError::NotFound { direction: "reading", .. }));
    }

    #[test]
    fn reader_rejects_non_json_values() {
        let err = JsonHolderReader.read(&Value::Int(3)).unwrap_err();
        assert!(matches!(err, ConversionError::Incompatible { found: "int", .. }));
    }

    #[test]
    fn optional_read_maps_null() {
        let conversions = CustomConversions::with_json_holder();
        assert_eq!(conversions.read_optional::<JsonHolder>(&Value::Null).unwrap(), None);
    }

    #[test]
    fn typed_null_is_not_json_null() {
        let conversions = CustomConversions::with_json_holder();
        let sql_null = Value::Typed(TypedValue::new("json", None));
        let json_null = Value::Typed(TypedValue::new("json", Some("null".to_owned())));

        let err = conversions.read::<JsonHolder>(&sql_null).unwrap_err();
        assert!(matches!(err, ConversionError::Incompatible { found: "null", .. }));
        assert_eq!(conversions.read_optional::<JsonHolder>(&sql_null).unwrap(), None);
        assert_eq!(
            conversions.read_optional::<JsonHolder>(&json_null).unwrap(),
            Some(JsonHolder::new("null"))
        );
    }
}
