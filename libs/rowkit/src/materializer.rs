//! Materialization strategies: turning a cursor into domain values.
//!
//! Two shapes are supported:
//! - [`ResultExtractor`] consumes the whole cursor and produces one value
//!   (which is often itself a collection).
//! - [`RowMapper`] is applied once per row by the driver loop in
//!   [`Materializer::materialize`], producing one value per row.

use std::fmt;
use std::sync::Arc;

use crate::cursor::{Row, RowCursor};
use crate::error::{MaterializeError, Result};

/// Consumes a full cursor and produces a single value.
pub trait ResultExtractor<T>: Send + Sync {
    /// Read the cursor. Implementations must not keep it past the call.
    ///
    /// # Errors
    /// Returns `MaterializeError` on cursor failures or strategy-specific errors.
    fn extract(&self, cursor: &mut dyn RowCursor) -> Result<T>;
}

/// Maps a single row; `row_num` is zero-based.
pub trait RowMapper<T>: Send + Sync {
    /// # Errors
    /// Returns `MaterializeError` on decode failures or strategy-specific errors.
    fn map_row(&self, row: &Row, row_num: usize) -> Result<T>;
}

/// Shape of a registered strategy.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Shape {
    Extractor,
    RowMapper,
}

/// A resolved strategy producing values of type `T`.
pub enum Materializer<T> {
    Extract(Arc<dyn ResultExtractor<T>>),
    MapRows(Arc<dyn RowMapper<T>>),
}

impl<T> Clone for Materializer<T> {
    fn clone(&self) -> Self {
        match self {
            Materializer::Extract(e) => Materializer::Extract(Arc::clone(e)),
            Materializer::MapRows(m) => Materializer::MapRows(Arc::clone(m)),
        }
    }
}

impl<T> fmt::Debug for Materializer<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Materializer").field(&self.shape()).finish()
    }
}

impl<T> Materializer<T> {
    #[must_use]
    pub fn shape(&self) -> Shape {
        match self {
            Materializer::Extract(_) => Shape::Extractor,
            Materializer::MapRows(_) => Shape::RowMapper,
        }
    }

    /// Run the strategy over `cursor`, reading it exactly once.
    ///
    /// # Errors
    /// Propagates errors from the cursor or the strategy.
    pub fn materialize(&self, cursor: &mut dyn RowCursor) -> Result<Materialized<T>> {
        match self {
            Materializer::Extract(extractor) => extractor.extract(cursor).map(Materialized::Single),
            Materializer::MapRows(mapper) => map_all(mapper.as_ref(), cursor).map(Materialized::Rows),
        }
    }
}

fn map_all<T>(mapper: &dyn RowMapper<T>, cursor: &mut dyn RowCursor) -> Result<Vec<T>> {
    let mut out = Vec::new();
    while let Some(row) = cursor.next_row()? {
        let row_num = out.len();
        out.push(mapper.map_row(&row, row_num)?);
    }
    Ok(out)
}

/// Outcome of [`Materializer::materialize`].
#[derive(Clone, Debug, PartialEq)]
pub enum Materialized<T> {
    Single(T),
    Rows(Vec<T>),
}

impl<T> Materialized<T> {
    /// Number of produced values: 1 for `Single`, N for `Rows`.
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Materialized::Single(_) => 1,
            Materialized::Rows(rows) => rows.len(),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The single value of an extractor, or the first row of a mapper.
    ///
    /// # Errors
    /// Returns `MaterializeError::EmptyResult` for an empty row set.
    pub fn into_single(self) -> Result<T> {
        match self {
            Materialized::Single(v) => Ok(v),
            Materialized::Rows(rows) => rows.into_iter().next().ok_or(MaterializeError::EmptyResult),
        }
    }

    #[must_use]
    pub fn into_rows(self) -> Vec<T> {
        match self {
            Materialized::Single(v) => vec![v],
            Materialized::Rows(rows) => rows,
        }
    }
}

/// Extractor that drives a row mapper over every row and collects the results.
pub struct RowMapperExtractor<T> {
    mapper: Arc<dyn RowMapper<T>>,
}

impl<T> RowMapperExtractor<T> {
    #[must_use]
    pub fn new(mapper: Arc<dyn RowMapper<T>>) -> Self {
        Self { mapper }
    }

    #[must_use]
    pub fn mapper(&self) -> &Arc<dyn RowMapper<T>> {
        &self.mapper
    }
}

impl<T> From<Arc<dyn RowMapper<T>>> for RowMapperExtractor<T> {
    fn from(mapper: Arc<dyn RowMapper<T>>) -> Self {
        Self::new(mapper)
    }
}

impl<T: Send + Sync> ResultExtractor<Vec<T>> for RowMapperExtractor<T> {
    fn extract(&self, cursor: &mut dyn RowCursor) -> Result<Vec<T>> {
        map_all(self.mapper.as_ref(), cursor)
    }
}

/// Row mapper backed by a closure.
pub struct FnRowMapper<F>(F);

impl<T, F> RowMapper<T> for FnRowMapper<F>
where
    F: Fn(&Row, usize) -> Result<T> + Send + Sync,
{
    fn map_row(&self, row: &Row, row_num: usize) -> Result<T> {
        (self.0)(row, row_num)
    }
}

/// Extractor backed by a closure.
pub struct FnExtractor<F>(F);

impl<T, F> ResultExtractor<T> for FnExtractor<F>
where
    F: Fn(&mut dyn RowCursor) -> Result<T> + Send + Sync,
{
    fn extract(&self, cursor: &mut dyn RowCursor) -> Result<T> {
        (self.0)(cursor)
    }
}

/// Wrap a closure as a shared row mapper.
pub fn row_mapper_fn<T, F>(f: F) -> Arc<dyn RowMapper<T>>
where
    T: 'static,
    F: Fn(&Row, usize) -> Result<T> + Send + Sync + 'static,
{
    Arc::new(FnRowMapper(f))
}

/// Wrap a closure as a shared extractor.
pub fn extractor_fn<T, F>(f: F) -> Arc<dyn ResultExtractor<T>>
where
    T: 'static,
    F: Fn(&mut dyn RowCursor) -> Result<T> + Send + Sync + 'static,
{
    Arc::new(FnExtractor(f))
}

/// Maps the first column of each row to `T`.
pub struct SingleColumnMapper<T>(std::marker::PhantomData<fn() -> T>);

impl<T> SingleColumnMapper<T> {
    #[must_use]
    pub fn new() -> Self {
        Self(std::marker::PhantomData)
    }
}

impl<T> Default for SingleColumnMapper<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: crate::value::FromValue> RowMapper<T> for SingleColumnMapper<T> {
    fn map_row(&self, row: &Row, _row_num: usize) -> Result<T> {
        Ok(row.get(0)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cursor::VecCursor;
    use crate::value::Value;

    fn words() -> VecCursor {
        VecCursor::with_names(
            &["word"],
            vec![vec!["abc".into()], vec!["de".into()], vec![Value::Null]],
        )
    }

    #[test]
    fn row_mapper_yields_one_value_per_row() {
        let mapper = row_mapper_fn(|row: &Row, n| {
            let w: Option<String> = row.get(0)?;
            Ok(format!("{n}:{}", w.unwrap_or_default()))
        });
        let out = Materializer::MapRows(mapper).materialize(&mut words()).unwrap();
        assert_eq!(
            out,
            Materialized::Rows(vec!["0:abc".to_owned(), "1:de".to_owned(), "2:".to_owned()])
        );
    }

    #[test]
    fn extractor_yields_single_value() {
        let count = extractor_fn(|cursor: &mut dyn RowCursor| {
            let mut n = 0_usize;
            while cursor.next_row()?.is_some() {
                n += 1;
            }
            Ok(n)
        });
        let out = Materializer::Extract(count).materialize(&mut words()).unwrap();
        assert_eq!(out, Materialized::Single(3));
        assert_eq!(out.len(), 1);
    }

    #[test]
    fn row_mapper_extractor_collects_rows() {
        let ext = RowMapperExtractor::new(Arc::new(SingleColumnMapper::<Option<String>>::new()));
        let out = ext.extract(&mut words()).unwrap();
        assert_eq!(out, vec![Some("abc".to_owned()), Some("de".to_owned()), None]);
    }

    #[test]
    fn into_single_on_empty_rows_is_error() {
        let out: Materialized<i64> = Materialized::Rows(Vec::new());
        assert!(out.is_empty());
        assert!(matches!(out.into_single(), Err(MaterializeError::EmptyResult)));
    }

    #[test]
    fn mapper_error_stops_iteration() {
        let mapper = row_mapper_fn(|row: &Row, _| Ok(row.get::<String>(0)?));
        let err = Materializer::MapRows(mapper).materialize(&mut words()).unwrap_err();
        assert!(matches!(err, MaterializeError::Cursor(_)));
    }
}
