//! Named constructors for components referenced by properties.
//!
//! Properties name components (`encoder: json-encoder`). A name is first looked
//! up in the client scope; when the scope has no such component the catalog
//! default-constructs one.

use parking_lot::RwLock;
use std::{any::Any, collections::HashMap, fmt, sync::Arc};

use crate::scope::TypeKey;

type Constructor = Arc<dyn Fn() -> Box<dyn Any + Send + Sync> + Send + Sync>;

/// Registry of default constructors keyed by (component type, name).
pub struct ComponentCatalog {
    constructors: RwLock<HashMap<(TypeKey, String), Constructor>>,
}

impl ComponentCatalog {
    /// Empty catalog.
    #[must_use]
    pub fn new() -> Self {
        Self {
            constructors: RwLock::new(HashMap::new()),
        }
    }

    /// Catalog pre-populated with the built-in components.
    #[must_use]
    pub fn with_builtins() -> Self {
        let catalog = Self::new();
        crate::components::register_builtin_constructors(&catalog);
        catalog
    }

    /// Register a constructor producing `T` for `name`.
    pub fn register<T, F>(&self, name: impl Into<String>, constructor: F)
    where
        T: ?Sized + Send + Sync + 'static,
        F: Fn() -> Arc<T> + Send + Sync + 'static,
    {
        let ctor: Constructor =
            Arc::new(move || -> Box<dyn Any + Send + Sync> { Box::new(constructor()) });
        self.constructors
            .write()
            .insert((TypeKey::of::<T>(), name.into()), ctor);
    }

    /// Construct a new `T` registered under `name`.
    #[must_use]
    pub fn instantiate<T>(&self, name: &str) -> Option<Arc<T>>
    where
        T: ?Sized + Send + Sync + 'static,
    {
        let ctor = {
            let r = self.constructors.read();
            Arc::clone(r.get(&(TypeKey::of::<T>(), name.to_owned()))?)
        };
        ctor().downcast::<Arc<T>>().ok().map(|b| *b)
    }

    #[must_use]
    pub fn contains<T>(&self, name: &str) -> bool
    where
        T: ?Sized + Send + Sync + 'static,
    {
        self.constructors
            .read()
            .contains_key(&(TypeKey::of::<T>(), name.to_owned()))
    }
}

impl Default for ComponentCatalog {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ComponentCatalog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComponentCatalog")
            .field("constructors", &self.constructors.read().len())
            .finish()
    }
}
