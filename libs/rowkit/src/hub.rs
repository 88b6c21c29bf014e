//! Minimalistic, type-safe component hub.
//!
//! Collaborators (services, default mappers, clocks...) are registered once at
//! composition time and resolved either by *interface type* or by a stable
//! *name*. Strategies built by the materializer registry pull their
//! dependencies from here instead of reaching for globals.
//!
//! Entries are keyed by `(type_name::<T>() or component name, scope)` and hold
//! a boxed `Arc<T>`, so `T = dyn Trait` works. Registering the same key again
//! replaces the entry; `Arc`s already handed out stay valid.

use parking_lot::RwLock;
use std::{any::Any, collections::HashMap, fmt, sync::Arc};

/// Scope used by the unscoped `register`/`get` calls.
pub const GLOBAL_SCOPE: &str = "global";

/// Stable type key for trait objects, uses fully-qualified `type_name::<T>()`.
#[derive(Clone, Eq, PartialEq, Hash)]
pub struct TypeKey(&'static str);

impl TypeKey {
    #[inline]
    #[must_use]
    pub fn of<T: ?Sized + 'static>() -> Self {
        TypeKey(std::any::type_name::<T>())
    }

    #[must_use]
    pub fn as_str(&self) -> &'static str {
        self.0
    }
}

impl fmt::Debug for TypeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0)
    }
}

impl fmt::Display for TypeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0)
    }
}

/// What a component is registered under.
#[derive(Clone, Eq, PartialEq, Hash)]
pub enum ComponentKey {
    Type(TypeKey),
    Name(Arc<str>),
}

impl fmt::Debug for ComponentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ComponentKey::Type(t) => write!(f, "type={t:?}"),
            ComponentKey::Name(n) => write!(f, "name={n}"),
        }
    }
}

/// Scope name (e.g., `global`, `postgres`, `oracle`).
#[derive(Clone, Eq, PartialEq, Hash)]
pub struct ScopeKey(Arc<str>);

impl fmt::Debug for ScopeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum HubError {
    #[error("component not found: {key:?}, scope={scope:?}")]
    NotFound { key: ComponentKey, scope: ScopeKey },

    #[error("type mismatch in hub for {key:?}, scope={scope:?}: expected {expected}")]
    TypeMismatch {
        key: ComponentKey,
        scope: ScopeKey,
        expected: TypeKey,
    },
}

type Boxed = Box<dyn Any + Send + Sync>;

type ComponentMap = HashMap<(ComponentKey, ScopeKey), Boxed>;

/// Registry of collaborators keyed by (interface type or name, scope).
pub struct ComponentHub {
    map: RwLock<ComponentMap>,
}

impl ComponentHub {
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self {
            map: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for ComponentHub {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ComponentHub {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let r = self.map.read();
        f.debug_struct("ComponentHub")
            .field("keys", &r.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl ComponentHub {
    /// Register a component in the *global* scope under the interface type `T`.
    /// `T` can be a trait object like `dyn my_crate::CustomerService`.
    pub fn register<T>(&self, component: Arc<T>)
    where
        T: ?Sized + Send + Sync + 'static,
    {
        self.register_scoped::<T>(GLOBAL_SCOPE, component);
    }

    /// Register a component in a *named* scope under the interface type `T`.
    pub fn register_scoped<T>(&self, scope: impl Into<Arc<str>>, component: Arc<T>)
    where
        T: ?Sized + Send + Sync + 'static,
    {
        self.insert::<T>(ComponentKey::Type(TypeKey::of::<T>()), scope, component);
    }

    /// Register a component in the *global* scope under a stable name.
    pub fn register_named<T>(&self, name: impl Into<Arc<str>>, component: Arc<T>)
    where
        T: ?Sized + Send + Sync + 'static,
    {
        self.insert::<T>(ComponentKey::Name(name.into()), GLOBAL_SCOPE, component);
    }

    fn insert<T>(&self, key: ComponentKey, scope: impl Into<Arc<str>>, component: Arc<T>)
    where
        T: ?Sized + Send + Sync + 'static,
    {
        tracing::trace!(?key, "registering component");
        let mut w = self.map.write();
        w.insert((key, ScopeKey(scope.into())), Box::new(component));
    }

    /// Fetch a component from the *global* scope by interface type `T`.
    ///
    /// # Errors
    /// Returns `HubError::NotFound` if nothing is registered for `T`.
    pub fn get<T>(&self) -> Result<Arc<T>, HubError>
    where
        T: ?Sized + Send + Sync + 'static,
    {
        self.get_scoped::<T>(GLOBAL_SCOPE)
    }

    /// Fetch a component from a *named* scope by interface type `T`.
    ///
    /// # Errors
    /// Returns `HubError::NotFound` if nothing is registered for `T` in `scope`.
    pub fn get_scoped<T>(&self, scope: impl Into<Arc<str>>) -> Result<Arc<T>, HubError>
    where
        T: ?Sized + Send + Sync + 'static,
    {
        self.lookup::<T>(ComponentKey::Type(TypeKey::of::<T>()), scope)
    }

    /// Fetch a component registered under `name`.
    ///
    /// # Errors
    /// Returns `HubError::NotFound` if the name is unknown, or
    /// `HubError::TypeMismatch` if it was registered with another type.
    pub fn get_named<T>(&self, name: &str) -> Result<Arc<T>, HubError>
    where
        T: ?Sized + Send + Sync + 'static,
    {
        self.lookup::<T>(ComponentKey::Name(Arc::from(name)), GLOBAL_SCOPE)
    }

    fn lookup<T>(&self, key: ComponentKey, scope: impl Into<Arc<str>>) -> Result<Arc<T>, HubError>
    where
        T: ?Sized + Send + Sync + 'static,
    {
        let scope_key = ScopeKey(scope.into());
        let r = self.map.read();

        let boxed = r
            .get(&(key.clone(), scope_key.clone()))
            .ok_or_else(|| HubError::NotFound {
                key: key.clone(),
                scope: scope_key.clone(),
            })?;

        // Stored value is exactly `Arc<T>` when the types agree.
        if let Some(arc_t) = boxed.downcast_ref::<Arc<T>>() {
            return Ok(Arc::clone(arc_t));
        }
        Err(HubError::TypeMismatch {
            key,
            scope: scope_key,
            expected: TypeKey::of::<T>(),
        })
    }

    /// Whether something is registered for `T` in the global scope.
    #[must_use]
    pub fn contains<T>(&self) -> bool
    where
        T: ?Sized + Send + Sync + 'static,
    {
        let key = (
            ComponentKey::Type(TypeKey::of::<T>()),
            ScopeKey(Arc::from(GLOBAL_SCOPE)),
        );
        self.map.read().contains_key(&key)
    }

    /// Drop every registration.
    pub fn clear(&self) {
        self.map.write().clear();
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.map.read().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.map.read().is_empty()
    }
}

/// Construction of a component from the hub.
///
/// This is how strategies declare their collaborators: the registry calls
/// `from_components` once at composition time.
pub trait FromComponents: Sized {
    /// # Errors
    /// Returns `HubError` if a required collaborator is missing.
    fn from_components(hub: &ComponentHub) -> Result<Self, HubError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    trait Greeter: Send + Sync {
        fn greet(&self) -> String;
    }

    struct Hello(&'static str);
    impl Greeter for Hello {
        fn greet(&self) -> String {
            format!("hello {}", self.0)
        }
    }

    #[test]
    fn register_and_get_dyn_trait_global() {
        let hub = ComponentHub::new();
        let api: Arc<dyn Greeter> = Arc::new(Hello("a"));
        hub.register::<dyn Greeter>(api.clone());

        let got = hub.get::<dyn Greeter>().unwrap();
        assert_eq!(got.greet(), "hello a");
        assert!(Arc::ptr_eq(&api, &got));
    }

    #[test]
    fn scopes_are_independent() {
        let hub = ComponentHub::new();
        hub.register_scoped::<dyn Greeter>("oracle", Arc::new(Hello("o")));
        hub.register_scoped::<dyn Greeter>("db2", Arc::new(Hello("d")));

        assert_eq!(hub.get_scoped::<dyn Greeter>("oracle").unwrap().greet(), "hello o");
        assert_eq!(hub.get_scoped::<dyn Greeter>("db2").unwrap().greet(), "hello d");
        assert!(hub.get::<dyn Greeter>().is_err());
    }

    #[test]
    fn named_components_resolve_by_name() {
        let hub = ComponentHub::new();
        hub.register_named::<dyn Greeter>("greeter", Arc::new(Hello("n")));

        assert_eq!(hub.get_named::<dyn Greeter>("greeter").unwrap().greet(), "hello n");
        assert!(matches!(
            hub.get_named::<dyn Greeter>("other"),
            Err(HubError::NotFound { .. })
        ));
    }

    #[test]
    fn named_component_with_wrong_type_is_mismatch() {
        let hub = ComponentHub::new();
        hub.register_named::<String>("value", Arc::new("x".to_owned()));

        let err = hub.get_named::<dyn Greeter>("value").err().unwrap();
        assert!(matches!(err, HubError::TypeMismatch { .. }));
    }

    #[test]
    fn re_registering_keeps_old_arcs_valid() {
        let hub = ComponentHub::new();
        hub.register::<dyn Greeter>(Arc::new(Hello("1")));
        let first = hub.get::<dyn Greeter>().unwrap();
        hub.register::<dyn Greeter>(Arc::new(Hello("2")));

        assert_eq!(first.greet(), "hello 1");
        assert_eq!(hub.get::<dyn Greeter>().unwrap().greet(), "hello 2");
        assert_eq!(hub.len(), 1);
    }

    #[test]
    fn clear_empties_the_hub() {
        let hub = ComponentHub::new();
        hub.register::<dyn Greeter>(Arc::new(Hello("1")));
        assert!(hub.contains::<dyn Greeter>());
        hub.clear();
        assert!(hub.is_empty());
        assert!(!hub.contains::<dyn Greeter>());
    }
}
