//! Materializer registry.
//!
//! Strategies are registered once through [`MaterializerRegistryBuilder`] and
//! resolved per query by [`MaterializerKey`]. The built registry is immutable, so
//! a key can only ever resolve to one strategy for the registry's lifetime.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::error::{MaterializeError, Result};
use crate::hub::{ComponentHub, FromComponents, TypeKey};
use crate::materializer::{Materializer, ResultExtractor, RowMapper, Shape};

/// Identifier of a registered strategy: a logical name or a declared type.
#[derive(Clone, PartialEq, Eq, Hash)]
pub enum MaterializerKey {
    Named(Arc<str>),
    Type(TypeKey),
}

impl MaterializerKey {
    #[must_use]
    pub fn named(name: impl Into<Arc<str>>) -> Self {
        MaterializerKey::Named(name.into())
    }

    /// Key of a strategy registered by its own type.
    #[must_use]
    pub fn of<S: ?Sized + 'static>() -> Self {
        MaterializerKey::Type(TypeKey::of::<S>())
    }
}

impl fmt::Debug for MaterializerKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

impl fmt::Display for MaterializerKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MaterializerKey::Named(n) => write!(f, "name '{n}'"),
            MaterializerKey::Type(t) => write!(f, "type {t}"),
        }
    }
}

impl From<&str> for MaterializerKey {
    fn from(name: &str) -> Self {
        MaterializerKey::named(name)
    }
}

struct Entry {
    shape: Shape,
    output: TypeKey,
    // Always a `Materializer<T>` where `TypeKey::of::<T>() == output`.
    materializer: Box<dyn Any + Send + Sync>,
}

/// Summary of a registered strategy.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Registration {
    pub key: MaterializerKey,
    pub shape: Shape,
    pub output: TypeKey,
}

/// Collects strategies before they are frozen into a [`MaterializerRegistry`].
pub struct MaterializerRegistryBuilder {
    hub: Arc<ComponentHub>,
    entries: HashMap<MaterializerKey, Entry>,
}

impl MaterializerRegistryBuilder {
    /// `hub` supplies collaborators for strategies registered by type.
    #[must_use]
    pub fn new(hub: Arc<ComponentHub>) -> Self {
        Self {
            hub,
            entries: HashMap::new(),
        }
    }

    fn insert<T: 'static>(&mut self, key: MaterializerKey, materializer: Materializer<T>) -> Result<&mut Self> {
        if self.entries.contains_key(&key) {
            return Err(MaterializeError::DuplicateKey(key));
        }
        tracing::debug!(%key, shape = ?materializer.shape(), output = std::any::type_name::<T>(), "registering materializer");
        self.entries.insert(
            key,
            Entry {
                shape: materializer.shape(),
                output: TypeKey::of::<T>(),
                materializer: Box::new(materializer),
            },
        );
        Ok(self)
    }

    /// Register an extractor instance under `key`.
    ///
    /// # Errors
    /// Returns `MaterializeError::DuplicateKey` if `key` is taken.
    pub fn register_extractor<T: 'static>(
        &mut self,
        key: impl Into<MaterializerKey>,
        extractor: Arc<dyn ResultExtractor<T>>,
    ) -> Result<&mut Self> {
        self.insert(key.into(), Materializer::Extract(extractor))
    }

    /// Register a row mapper instance under `key`.
    ///
    /// # Errors
    /// Returns `MaterializeError::DuplicateKey` if `key` is taken.
    pub fn register_row_mapper<T: 'static>(
        &mut self,
        key: impl Into<MaterializerKey>,
        mapper: Arc<dyn RowMapper<T>>,
    ) -> Result<&mut Self> {
        self.insert(key.into(), Materializer::MapRows(mapper))
    }

    /// Build an extractor of type `E` from the hub and register it under its type key.
    ///
    /// # Errors
    /// Returns `MaterializeError::Component` if a collaborator is missing, or
    /// `MaterializeError::DuplicateKey`.
    pub fn register_extractor_type<E, T>(&mut self) -> Result<&mut Self>
    where
        E: ResultExtractor<T> + FromComponents + 'static,
        T: 'static,
    {
        let extractor = E::from_components(&self.hub)?;
        self.insert(MaterializerKey::of::<E>(), Materializer::Extract(Arc::new(extractor)))
    }

    /// Build an extractor of type `E` from the hub and register it under `name`.
    ///
    /// # Errors
    /// Same as [`Self::register_extractor_type`].
    pub fn register_extractor_bean<E, T>(&mut self, name: &str) -> Result<&mut Self>
    where
        E: ResultExtractor<T> + FromComponents + 'static,
        T: 'static,
    {
        let extractor = E::from_components(&self.hub)?;
        self.insert(MaterializerKey::named(name), Materializer::Extract(Arc::new(extractor)))
    }

    /// Build a row mapper of type `M` from the hub and register it under its type key.
    ///
    /// # Errors
    /// Same as [`Self::register_extractor_type`].
    pub fn register_row_mapper_type<M, T>(&mut self) -> Result<&mut Self>
    where
        M: RowMapper<T> + FromComponents + 'static,
        T: 'static,
    {
        let mapper = M::from_components(&self.hub)?;
        self.insert(MaterializerKey::of::<M>(), Materializer::MapRows(Arc::new(mapper)))
    }

    /// Build a row mapper of type `M` from the hub and register it under `name`.
    ///
    /// # Errors
    /// Same as [`Self::register_extractor_type`].
    pub fn register_row_mapper_bean<M, T>(&mut self, name: &str) -> Result<&mut Self>
    where
        M: RowMapper<T> + FromComponents + 'static,
        T: 'static,
    {
        let mapper = M::from_components(&self.hub)?;
        self.insert(MaterializerKey::named(name), Materializer::MapRows(Arc::new(mapper)))
    }

    #[must_use]
    pub fn build(self) -> MaterializerRegistry {
        MaterializerRegistry {
            entries: self.entries,
        }
    }
}

/// Immutable set of strategies, shared behind an `Arc`.
pub struct MaterializerRegistry {
    entries: HashMap<MaterializerKey, Entry>,
}

impl fmt::Debug for MaterializerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MaterializerRegistry")
            .field("keys", &self.entries.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl Default for MaterializerRegistry {
    /// A registry with nothing registered.
    fn default() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }
}

impl MaterializerRegistry {
    #[must_use]
    pub fn builder(hub: Arc<ComponentHub>) -> MaterializerRegistryBuilder {
        MaterializerRegistryBuilder::new(hub)
    }

    /// Resolve the strategy registered under `key` producing `T`.
    ///
    /// # Errors
    /// Returns `MaterializeError::NotFound` for an unknown key and
    /// `MaterializeError::TypeMismatch` when the strategy produces another type.
    pub fn resolve<T: 'static>(&self, key: &MaterializerKey) -> Result<Materializer<T>> {
        let entry = self
            .entries
            .get(key)
            .ok_or_else(|| MaterializeError::NotFound(key.clone()))?;

        entry
            .materializer
            .downcast_ref::<Materializer<T>>()
            .cloned()
            .ok_or_else(|| MaterializeError::TypeMismatch {
                key: key.clone(),
                registered: entry.output.clone(),
                requested: TypeKey::of::<T>(),
            })
    }

    /// Resolve by name.
    ///
    /// # Errors
    /// Same as [`Self::resolve`].
    pub fn resolve_named<T: 'static>(&self, name: &str) -> Result<Materializer<T>> {
        self.resolve(&MaterializerKey::named(name))
    }

    /// Resolve a strategy registered by its type `S`.
    ///
    /// # Errors
    /// Same as [`Self::resolve`].
    pub fn resolve_type<S: ?Sized + 'static, T: 'static>(&self) -> Result<Materializer<T>> {
        self.resolve(&MaterializerKey::of::<S>())
    }

    #[must_use]
    pub fn contains(&self, key: &MaterializerKey) -> bool {
        self.entries.contains_key(key)
    }

    /// Registered strategies, in no particular order.
    #[must_use]
    pub fn registrations(&self) -> Vec<Registration> {
        self.entries
            .iter()
            .map(|(key, e)| Registration {
                key: key.clone(),
                shape: e.shape,
                output: e.output.clone(),
            })
            .collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cursor::{Row, RowCursor, VecCursor};
    use crate::hub::HubError;
    use crate::materializer::{Materialized, row_mapper_fn};

    fn hub() -> Arc<ComponentHub> {
        Arc::new(ComponentHub::new())
    }

    fn upper() -> Arc<dyn RowMapper<String>> {
        row_mapper_fn(|row: &Row, _| Ok(row.get::<String>(0)?.to_uppercase()))
    }

    #[test]
    #[tracing_test::traced_test]
    fn upper_scenario() {
        let mut b = MaterializerRegistry::builder(hub());
        b.register_row_mapper("upper", upper()).unwrap();
        let registry = b.build();

        let m = registry.resolve_named::<String>("upper").unwrap();
        let mut cursor = VecCursor::with_names(&["s"], vec![vec!["abc".into()]]);
        let out = m.materialize(&mut cursor).unwrap();
        assert_eq!(out, Materialized::Rows(vec!["ABC".to_owned()]));
        assert!(logs_contain("registering materializer"));
    }

    #[test]
    fn unknown_key_is_not_found() {
        let registry = MaterializerRegistry::builder(hub()).build();
        for key in ["a", "b", ""] {
            let err = registry.resolve_named::<String>(key).unwrap_err();
            assert!(matches!(err, MaterializeError::NotFound(_)), "{key}");
        }
    }

    #[test]
    fn duplicate_registration_is_rejected() {
        let mut b = MaterializerRegistry::builder(hub());
        b.register_row_mapper("upper", upper()).unwrap();
        let err = b.register_row_mapper("upper", upper()).err().unwrap();
        assert!(matches!(err, MaterializeError::DuplicateKey(_)));
    }

    #[test]
    fn wrong_output_type_is_mismatch() {
        let mut b = MaterializerRegistry::builder(hub());
        b.register_row_mapper("upper", upper()).unwrap();
        let registry = b.build();

        let err = registry.resolve_named::<i64>("upper").unwrap_err();
        assert!(matches!(err, MaterializeError::TypeMismatch { .. }));
    }

    trait Suffix: Send + Sync {
        fn suffix(&self) -> &str;
    }

    struct Bang;
    impl Suffix for Bang {
        fn suffix(&self) -> &str {
            "!"
        }
    }

    struct Shout {
        suffix: Arc<dyn Suffix>,
    }

    impl FromComponents for Shout {
        fn from_components(hub: &ComponentHub) -> std::result::Result<Self, HubError> {
            Ok(Self {
                suffix: hub.get::<dyn Suffix>()?,
            })
        }
    }

    impl ResultExtractor<String> for Shout {
        fn extract(&self, cursor: &mut dyn RowCursor) -> Result<String> {
            let mut out = String::new();
            while let Some(row) = cursor.next_row()? {
                out.push_str(&row.get::<String>(0)?);
            }
            out.push_str(self.suffix.suffix());
            Ok(out)
        }
    }

    #[test]
    fn type_registration_injects_collaborators() {
        let hub = hub();
        hub.register::<dyn Suffix>(Arc::new(Bang));
        let mut b = MaterializerRegistry::builder(hub);
        b.register_extractor_type::<Shout, String>().unwrap();
        let registry = b.build();

        let m = registry.resolve_type::<Shout, String>().unwrap();
        let mut cursor = VecCursor::with_names(&["s"], vec![vec!["a".into()], vec!["b".into()]]);
        assert_eq!(m.materialize(&mut cursor).unwrap().into_single().unwrap(), "ab!");
        assert_eq!(registry.registrations()[0].shape, Shape::Extractor);
    }

    #[test]
    fn type_registration_without_collaborator_fails() {
        let mut b = MaterializerRegistry::builder(hub());
        let err = b.register_extractor_type::<Shout, String>().err().unwrap();
        assert!(matches!(err, MaterializeError::Component(HubError::NotFound { .. })));
    }
}
