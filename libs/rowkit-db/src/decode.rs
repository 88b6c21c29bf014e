//! `SQLx` rows to [`rowkit::Value`]s.
//!
//! Rows are decoded lazily, one per `next_row` call. Column metadata comes
//! from the first row, so an empty result has no columns.

use std::sync::Arc;

#[cfg(any(feature = "pg", feature = "mysql"))]
use rowkit::TypedValue;
use rowkit::{Column, CursorError, Row, RowCursor, Value};
use sqlx::Column as _;
use sqlx::Row as _;
use sqlx::TypeInfo as _;
use sqlx::ValueRef as _;
#[cfg(any(feature = "pg", feature = "mysql"))]
use serde_json::value::RawValue;
#[cfg(any(feature = "pg", feature = "mysql"))]
use sqlx::types::Json;

/// Per-engine decoding of a single column.
pub trait DecodeRow: sqlx::Row + Send {
    fn decode_at(&self, index: usize, column: &Column) -> Result<Value, CursorError>;
}

pub struct SqlxCursor<R> {
    columns: Arc<[Column]>,
    rows: std::vec::IntoIter<R>,
    position: usize,
}

impl<R: DecodeRow> SqlxCursor<R> {
    #[must_use]
    pub fn new(rows: Vec<R>) -> Self {
        let columns: Vec<Column> = rows.first().map(column_meta).unwrap_or_default();
        Self {
            columns: columns.into(),
            rows: rows.into_iter(),
            position: 0,
        }
    }
}

fn column_meta<R: sqlx::Row>(row: &R) -> Vec<Column> {
    row.columns()
        .iter()
        .map(|c| Column::new(c.name(), c.type_info().name()))
        .collect()
}

impl<R: DecodeRow> RowCursor for SqlxCursor<R> {
    fn columns(&self) -> &[Column] {
        &self.columns
    }

    fn next_row(&mut self) -> Result<Option<Row>, CursorError> {
        let Some(raw) = self.rows.next() else {
            return Ok(None);
        };
        let values = self
            .columns
            .iter()
            .enumerate()
            .map(|(i, c)| raw.decode_at(i, c))
            .collect::<Result<Vec<_>, _>>()?;
        self.position += 1;
        Ok(Some(Row::new(Arc::clone(&self.columns), values)))
    }

    fn position(&self) -> usize {
        self.position
    }
}

fn driver(e: sqlx::Error) -> CursorError {
    CursorError::Driver(e.into())
}

#[cfg(any(feature = "pg", feature = "mysql"))]
fn is_null<R: sqlx::Row>(row: &R, index: usize) -> Result<bool, CursorError>
where
    usize: sqlx::ColumnIndex<R>,
{
    Ok(row.try_get_raw(index).map_err(driver)?.is_null())
}

#[cfg(any(feature = "pg", feature = "mysql"))]
fn typed_json(column: &Column, json: &Json<Box<RawValue>>) -> Value {
    Value::Typed(TypedValue::new(
        column.type_name().to_lowercase(),
        Some(json.0.get().to_owned()),
    ))
}

#[cfg(any(feature = "pg", feature = "mysql"))]
fn unsupported(column: &Column) -> CursorError {
    CursorError::UnsupportedType {
        column: column.name().to_owned(),
        type_name: column.type_name().to_owned(),
    }
}

#[cfg(feature = "pg")]
impl DecodeRow for sqlx::postgres::PgRow {
    fn decode_at(&self, i: usize, column: &Column) -> Result<Value, CursorError> {
        if is_null(self, i)? {
            return Ok(Value::Null);
        }
        let v = match column.type_name() {
            "BOOL" => Value::Bool(self.try_get(i).map_err(driver)?),
            "INT2" => Value::Int(i64::from(self.try_get::<i16, _>(i).map_err(driver)?)),
            "INT4" => Value::Int(i64::from(self.try_get::<i32, _>(i).map_err(driver)?)),
            "INT8" => Value::Int(self.try_get(i).map_err(driver)?),
            "FLOAT4" => Value::Float(f64::from(self.try_get::<f32, _>(i).map_err(driver)?)),
            "FLOAT8" => Value::Float(self.try_get(i).map_err(driver)?),
            "TEXT" | "VARCHAR" | "BPCHAR" | "NAME" => Value::Text(self.try_get(i).map_err(driver)?),
            "BYTEA" => Value::Bytes(self.try_get(i).map_err(driver)?),
            "JSON" | "JSONB" => typed_json(column, &self.try_get(i).map_err(driver)?),
            "UUID" => Value::Text(
                self.try_get::<sqlx::types::Uuid, _>(i)
                    .map_err(driver)?
                    .to_string(),
            ),
            "TIMESTAMPTZ" => Value::Text(
                self.try_get::<chrono::DateTime<chrono::Utc>, _>(i)
                    .map_err(driver)?
                    .to_rfc3339(),
            ),
            "TIMESTAMP" => Value::Text(
                self.try_get::<chrono::NaiveDateTime, _>(i)
                    .map_err(driver)?
                    .to_string(),
            ),
            "DATE" => Value::Text(
                self.try_get::<chrono::NaiveDate, _>(i)
                    .map_err(driver)?
                    .to_string(),
            ),
            _ => return Err(unsupported(column)),
        };
        Ok(v)
    }
}

#[cfg(feature = "mysql")]
impl DecodeRow for sqlx::mysql::MySqlRow {
    fn decode_at(&self, i: usize, column: &Column) -> Result<Value, CursorError> {
        if is_null(self, i)? {
            return Ok(Value::Null);
        }
        let ty = column.type_name();
        let v = match ty {
            "BOOLEAN" => Value::Bool(self.try_get(i).map_err(driver)?),
            "TINYINT" | "SMALLINT" | "MEDIUMINT" | "INT" | "BIGINT" => {
                Value::Int(self.try_get_unchecked::<i64, _>(i).map_err(driver)?)
            }
            _ if ty.ends_with(" UNSIGNED") => {
                let n = self.try_get_unchecked::<u64, _>(i).map_err(driver)?;
                Value::Int(i64::try_from(n).map_err(|_| CursorError::Decode {
                    expected: "int",
                    found: "unsigned bigint",
                })?)
            }
            "FLOAT" => Value::Float(f64::from(self.try_get::<f32, _>(i).map_err(driver)?)),
            "DOUBLE" => Value::Float(self.try_get(i).map_err(driver)?),
            "CHAR" | "VARCHAR" | "TINYTEXT" | "TEXT" | "MEDIUMTEXT" | "LONGTEXT" | "ENUM"
            | "SET" => Value::Text(self.try_get_unchecked(i).map_err(driver)?),
            "BINARY" | "VARBINARY" | "TINYBLOB" | "BLOB" | "MEDIUMBLOB" | "LONGBLOB" => {
                Value::Bytes(self.try_get_unchecked(i).map_err(driver)?)
            }
            "JSON" => typed_json(column, &self.try_get(i).map_err(driver)?),
            "DATETIME" => Value::Text(
                self.try_get::<chrono::NaiveDateTime, _>(i)
                    .map_err(driver)?
                    .to_string(),
            ),
            "TIMESTAMP" => Value::Text(
                self.try_get::<chrono::DateTime<chrono::Utc>, _>(i)
                    .map_err(driver)?
                    .to_rfc3339(),
            ),
            "DATE" => Value::Text(
                self.try_get::<chrono::NaiveDate, _>(i)
                    .map_err(driver)?
                    .to_string(),
            ),
            _ => return Err(unsupported(column)),
        };
        Ok(v)
    }
}

#[cfg(feature = "sqlite")]
impl DecodeRow for sqlx::sqlite::SqliteRow {
    // SQLite is dynamically typed: the storage class of the value decides,
    // the declared column type only marks booleans.
    fn decode_at(&self, i: usize, column: &Column) -> Result<Value, CursorError> {
        let raw = self.try_get_raw(i).map_err(driver)?;
        if raw.is_null() {
            return Ok(Value::Null);
        }
        let storage = raw.type_info().name().to_owned();
        let v = match (storage.as_str(), column.type_name()) {
            (_, "BOOLEAN") => Value::Bool(self.try_get_unchecked(i).map_err(driver)?),
            ("INTEGER" | "BIGINT" | "INT4" | "INT8", _) => {
                Value::Int(self.try_get_unchecked(i).map_err(driver)?)
            }
            ("REAL", _) => Value::Float(self.try_get_unchecked(i).map_err(driver)?),
            ("BLOB", _) => Value::Bytes(self.try_get_unchecked(i).map_err(driver)?),
            _ => Value::Text(self.try_get_unchecked(i).map_err(driver)?),
        };
        Ok(v)
    }
}

#[cfg(all(test, any(feature = "pg", feature = "mysql")))]
mod typed_tests {
    use super::*;

    #[test]
    fn json_column_keeps_text_and_lowercases_type() {
        let column = Column::new("body", "JSONB");
        let raw = RawValue::from_string("[1,2,  3]".to_owned()).unwrap();
        let Value::Typed(t) = typed_json(&column, &Json(raw)) else {
            panic!("expected typed value");
        };
        assert_eq!(t.type_name(), "jsonb");
        assert_eq!(t.value(), Some("[1,2,  3]"));
    }

    #[test]
    fn unknown_column_type_names_the_column() {
        let err = unsupported(&Column::new("shape", "POINT"));
        assert!(matches!(
            err,
            CursorError::UnsupportedType { ref column, ref type_name } if column == "shape" && type_name == "POINT"
        ));
    }
}
