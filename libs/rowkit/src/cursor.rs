//! Tabular cursor model consumed by materializers.

use std::sync::Arc;

use crate::value::{FromValue, Value};

/// Errors raised while reading a cursor.
#[derive(Debug, thiserror::Error)]
pub enum CursorError {
    #[error("column index {index} out of range (row has {len} columns)")]
    IndexOutOfRange { index: usize, len: usize },

    #[error("unknown column '{0}'")]
    UnknownColumn(String),

    #[error("cannot decode {found} as {expected}")]
    Decode {
        expected: &'static str,
        found: &'static str,
    },

    #[error("unsupported column type '{type_name}' for column '{column}'")]
    UnsupportedType { column: String, type_name: String },

    #[error(transparent)]
    Driver(#[from] anyhow::Error),
}

/// Column metadata.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Column {
    name: String,
    type_name: String,
}

impl Column {
    #[must_use]
    pub fn new(name: impl Into<String>, type_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            type_name: type_name.into(),
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Vendor type name as reported by the driver (e.g. `INT8`, `TEXT`, `JSONB`).
    #[must_use]
    pub fn type_name(&self) -> &str {
        &self.type_name
    }
}

/// One row. Columns are shared by every row of a cursor.
#[derive(Clone, Debug)]
pub struct Row {
    columns: Arc<[Column]>,
    values: Vec<Value>,
}

impl Row {
    /// # Panics
    /// Panics in debug builds if `values` and `columns` differ in length.
    #[must_use]
    pub fn new(columns: Arc<[Column]>, values: Vec<Value>) -> Self {
        debug_assert_eq!(columns.len(), values.len());
        Self { columns, values }
    }

    #[must_use]
    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Raw value at `index`.
    ///
    /// # Errors
    /// Returns `CursorError::IndexOutOfRange` for a bad index.
    pub fn value(&self, index: usize) -> Result<&Value, CursorError> {
        self.values.get(index).ok_or(CursorError::IndexOutOfRange {
            index,
            len: self.values.len(),
        })
    }

    /// Position of a column, matched case-insensitively as most vendors fold
    /// unquoted identifiers.
    #[must_use]
    pub fn position(&self, name: &str) -> Option<usize> {
        self.columns
            .iter()
            .position(|c| c.name.eq_ignore_ascii_case(name))
    }

    /// Typed value at `index`.
    ///
    /// # Errors
    /// Returns an error for a bad index or an incompatible value.
    pub fn get<T: FromValue>(&self, index: usize) -> Result<T, CursorError> {
        T::from_value(self.value(index)?)
    }

    /// Typed value of the named column.
    ///
    /// # Errors
    /// Returns `CursorError::UnknownColumn` or a decode error.
    pub fn get_by_name<T: FromValue>(&self, name: &str) -> Result<T, CursorError> {
        let index = self
            .position(name)
            .ok_or_else(|| CursorError::UnknownColumn(name.to_owned()))?;
        self.get(index)
    }

    #[must_use]
    pub fn into_values(self) -> Vec<Value> {
        self.values
    }
}

/// Forward-only cursor over a query result.
///
/// Materializers receive `&mut dyn RowCursor` for the duration of a single call;
/// the borrow guarantees the cursor cannot be retained past it.
pub trait RowCursor: Send {
    fn columns(&self) -> &[Column];

    /// Advance and return the next row, or `None` once exhausted. Calls after
    /// exhaustion keep returning `None`.
    ///
    /// # Errors
    /// Returns a driver or decode error for the row being read.
    fn next_row(&mut self) -> Result<Option<Row>, CursorError>;

    /// Number of rows returned so far.
    fn position(&self) -> usize;
}

/// Cursor over rows already held in memory.
#[derive(Debug)]
pub struct VecCursor {
    columns: Arc<[Column]>,
    rows: std::vec::IntoIter<Vec<Value>>,
    position: usize,
}

impl VecCursor {
    #[must_use]
    pub fn new(columns: Vec<Column>, rows: Vec<Vec<Value>>) -> Self {
        Self {
            columns: columns.into(),
            rows: rows.into_iter(),
            position: 0,
        }
    }

    /// Cursor with text-typed columns named after `names`.
    #[must_use]
    pub fn with_names(names: &[&str], rows: Vec<Vec<Value>>) -> Self {
        let columns = names.iter().map(|n| Column::new(*n, "TEXT")).collect();
        Self::new(columns, rows)
    }

    #[must_use]
    pub fn empty() -> Self {
        Self::new(Vec::new(), Vec::new())
    }
}

impl RowCursor for VecCursor {
    fn columns(&self) -> &[Column] {
        &self.columns
    }

    fn next_row(&mut self) -> Result<Option<Row>, CursorError> {
        let Some(values) = self.rows.next() else {
            return Ok(None);
        };
        if values.len() != self.columns.len() {
            return Err(CursorError::IndexOutOfRange {
                index: values.len(),
                len: self.columns.len(),
            });
        }
        self.position += 1;
        Ok(Some(Row::new(Arc::clone(&self.columns), values)))
    }

    fn position(&self) -> usize {
        self.position
    }
}
