//! Query mapping configuration and string-based query methods.
//!
//! A [`QueryMethod`] is a SQL string plus optional references to a result
//! extractor and a row mapper. [`QueryMappingConfiguration`] holds the default
//! row mapper per entity type and decides which strategy a method ends up with.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::cursor::RowCursor;
use crate::error::{MaterializeError, Result};
use crate::hub::TypeKey;
use crate::materializer::{Materializer, ResultExtractor, RowMapper, RowMapperExtractor, extractor_fn};
use crate::registry::{MaterializerKey, MaterializerRegistry};

/// A query declared by SQL text and optional strategy references.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct QueryMethod {
    sql: String,
    result_extractor: Option<MaterializerKey>,
    row_mapper: Option<MaterializerKey>,
}

impl QueryMethod {
    #[must_use]
    pub fn new(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            result_extractor: None,
            row_mapper: None,
        }
    }

    #[must_use]
    pub fn with_result_extractor(mut self, key: impl Into<MaterializerKey>) -> Self {
        self.result_extractor = Some(key.into());
        self
    }

    /// Reference an extractor registered by its type.
    #[must_use]
    pub fn with_result_extractor_type<E: 'static>(self) -> Self {
        self.with_result_extractor(MaterializerKey::of::<E>())
    }

    #[must_use]
    pub fn with_row_mapper(mut self, key: impl Into<MaterializerKey>) -> Self {
        self.row_mapper = Some(key.into());
        self
    }

    #[must_use]
    pub fn sql(&self) -> &str {
        &self.sql
    }

    #[must_use]
    pub fn result_extractor(&self) -> Option<&MaterializerKey> {
        self.result_extractor.as_ref()
    }

    #[must_use]
    pub fn row_mapper(&self) -> Option<&MaterializerKey> {
        self.row_mapper.as_ref()
    }
}

/// Default row mappers keyed by entity type.
#[derive(Default)]
pub struct QueryMappingConfiguration {
    // Always `Arc<dyn RowMapper<E>>` keyed by `TypeKey::of::<E>()`.
    mappers: HashMap<TypeKey, Box<dyn Any + Send + Sync>>,
}

impl fmt::Debug for QueryMappingConfiguration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueryMappingConfiguration")
            .field("entities", &self.mappers.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl QueryMappingConfiguration {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the default row mapper for entity type `E`, replacing any previous one.
    #[must_use]
    pub fn with_row_mapper<E: 'static>(mut self, mapper: Arc<dyn RowMapper<E>>) -> Self {
        self.mappers.insert(TypeKey::of::<E>(), Box::new(mapper));
        self
    }

    /// Default row mapper for `E`, if configured.
    #[must_use]
    pub fn row_mapper_for<E: 'static>(&self) -> Option<Arc<dyn RowMapper<E>>> {
        self.mappers
            .get(&TypeKey::of::<E>())
            .and_then(|b| b.downcast_ref::<Arc<dyn RowMapper<E>>>())
            .cloned()
    }

    /// Build an extractor that wraps the default row mapper of `E`.
    ///
    /// # Errors
    /// Returns `MaterializeError::NoStrategy` if `E` has no default mapper.
    pub fn extractor_with_default_mapper<X, E, T>(&self) -> Result<Materializer<T>>
    where
        X: ResultExtractor<T> + From<Arc<dyn RowMapper<E>>> + 'static,
        E: 'static,
        T: 'static,
    {
        let mapper = self
            .row_mapper_for::<E>()
            .ok_or_else(|| MaterializeError::NoStrategy(TypeKey::of::<E>()))?;
        Ok(Materializer::Extract(Arc::new(X::from(mapper))))
    }

    /// Pick the per-row strategy for a method returning a list of `E`.
    ///
    /// Precedence: a referenced row mapper, then the default mapper for `E`.
    ///
    /// # Errors
    /// Returns `MaterializeError::ExtractorReferenced` if the method names an
    /// extractor (use [`Self::resolve_list`]), `MaterializeError::NoStrategy`
    /// if nothing applies, or a registry error for a bad reference.
    pub fn resolve_rows<E: 'static>(
        &self,
        method: &QueryMethod,
        registry: &MaterializerRegistry,
    ) -> Result<Materializer<E>> {
        if let Some(key) = method.result_extractor() {
            return Err(MaterializeError::ExtractorReferenced(key.clone()));
        }
        if let Some(key) = method.row_mapper() {
            return registry.resolve::<E>(key);
        }
        self.row_mapper_for::<E>()
            .map(Materializer::MapRows)
            .ok_or_else(|| MaterializeError::NoStrategy(TypeKey::of::<E>()))
    }

    /// Pick the strategy for a method returning a list of `E`, as one value.
    ///
    /// Precedence: a referenced extractor producing `Vec<E>`, then a
    /// referenced row mapper, then the default mapper for `E`.
    ///
    /// # Errors
    /// Returns `MaterializeError::NoStrategy` if nothing applies, or a
    /// registry error for a bad reference.
    pub fn resolve_list<E: Send + Sync + 'static>(
        &self,
        method: &QueryMethod,
        registry: &MaterializerRegistry,
    ) -> Result<Materializer<Vec<E>>> {
        if let Some(key) = method.result_extractor() {
            return registry.resolve::<Vec<E>>(key);
        }
        let list: Arc<dyn ResultExtractor<Vec<E>>> = match self.resolve_rows::<E>(method, registry)? {
            Materializer::MapRows(mapper) => Arc::new(RowMapperExtractor::from(mapper)),
            Materializer::Extract(single) => {
                extractor_fn(move |cursor: &mut dyn RowCursor| Ok(vec![single.extract(cursor)?]))
            }
        };
        Ok(Materializer::Extract(list))
    }

    /// Pick the strategy for a method whose whole result is `T`.
    ///
    /// Precedence: a referenced extractor, then a referenced row mapper
    /// producing `T` per row.
    ///
    /// # Errors
    /// Returns `MaterializeError::NoStrategy` if the method references neither.
    pub fn resolve_extractor<T: 'static>(
        &self,
        method: &QueryMethod,
        registry: &MaterializerRegistry,
    ) -> Result<Materializer<T>> {
        if let Some(key) = method.result_extractor() {
            return registry.resolve::<T>(key);
        }
        if let Some(key) = method.row_mapper() {
            return registry.resolve::<T>(key);
        }
        Err(MaterializeError::NoStrategy(TypeKey::of::<T>()))
    }
}
