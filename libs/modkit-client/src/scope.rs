//! Per-client component scopes.
//!
//! Every client gets its own [`Scope`] keyed by its context id. All child scopes
//! share one parent (the application scope); lookups either stop at the local
//! scope or walk the parent chain.
//!
//! Implementation details:
//! - Key = (type name, component name). We use `type_name::<T>()`, which works for `T = dyn Trait`.
//! - Value = `Arc<T>` stored as `Box<dyn Any + Send + Sync>` (downcast on read).
//! - Children keep a `Weak` reference to the parent; the parent never points back.
//! - Re-registering the same (type, name) replaces the previous entry and moves it to the end,
//!   so "last registered wins" for single-instance lookups.

use dashmap::DashMap;
use parking_lot::RwLock;
use std::{
    any::Any,
    collections::{HashMap, HashSet},
    fmt,
    ops::Deref,
    sync::{Arc, Weak},
};

use crate::catalog::ComponentCatalog;
use crate::error::ScopeError;

/// Name of the shared parent scope.
pub const APPLICATION_SCOPE: &str = "application";

/// Prefix of configuration names applied to every client scope.
pub const DEFAULT_CONFIGURATION_PREFIX: &str = "default.";

/// Order assigned to components registered without an explicit order.
pub const DEFAULT_ORDER: i32 = 0;

/// Stable type key for trait objects: uses fully-qualified `type_name::<T>()`.
#[derive(Clone, Copy, Eq, PartialEq, Hash)]
pub struct TypeKey(&'static str);

impl TypeKey {
    #[inline]
    #[must_use]
    pub fn of<T: ?Sized + 'static>() -> Self {
        TypeKey(std::any::type_name::<T>())
    }

    #[must_use]
    pub fn name(&self) -> &'static str {
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

/// A component resolved from a scope: the instance plus the name and order it
/// was registered with.
pub struct Component<T: ?Sized> {
    name: Arc<str>,
    order: i32,
    instance: Arc<T>,
}

impl<T: ?Sized> Component<T> {
    #[must_use]
    pub fn new(name: impl Into<Arc<str>>, instance: Arc<T>) -> Self {
        Self {
            name: name.into(),
            order: DEFAULT_ORDER,
            instance,
        }
    }

    #[must_use]
    pub fn with_order(mut self, order: i32) -> Self {
        self.order = order;
        self
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn order(&self) -> i32 {
        self.order
    }

    #[must_use]
    pub fn instance(&self) -> &Arc<T> {
        &self.instance
    }

    #[must_use]
    pub fn into_instance(self) -> Arc<T> {
        self.instance
    }
}

impl<T: ?Sized> Clone for Component<T> {
    fn clone(&self) -> Self {
        Self {
            name: Arc::clone(&self.name),
            order: self.order,
            instance: Arc::clone(&self.instance),
        }
    }
}

impl<T: ?Sized> Deref for Component<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.instance
    }
}

impl<T: ?Sized> fmt::Debug for Component<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Component")
            .field("name", &self.name)
            .field("order", &self.order)
            .finish_non_exhaustive()
    }
}

type Boxed = Box<dyn Any + Send + Sync>;

struct Entry {
    type_key: TypeKey,
    name: Arc<str>,
    order: i32,
    value: Boxed,
}

impl Entry {
    fn component<T>(&self) -> Option<Component<T>>
    where
        T: ?Sized + Send + Sync + 'static,
    {
        if self.type_key != TypeKey::of::<T>() {
            return None;
        }
        // Stored value is exactly `Arc<T>` for this type key.
        let instance = self.value.downcast_ref::<Arc<T>>()?;
        Some(Component {
            name: Arc::clone(&self.name),
            order: self.order,
            instance: Arc::clone(instance),
        })
    }
}

/// Type-safe component container for one client (or the shared parent).
pub struct Scope {
    name: Arc<str>,
    parent: Option<Weak<Scope>>,
    entries: RwLock<Vec<Entry>>,
}

impl Scope {
    /// Create a scope without a parent.
    #[must_use]
    pub fn root(name: impl Into<Arc<str>>) -> Arc<Self> {
        Arc::new(Self {
            name: name.into(),
            parent: None,
            entries: RwLock::new(Vec::new()),
        })
    }

    /// Create a scope whose lookups may fall back to `parent`.
    #[must_use]
    pub fn child(parent: &Arc<Scope>, name: impl Into<Arc<str>>) -> Arc<Self> {
        Arc::new(Self {
            name: name.into(),
            parent: Some(Arc::downgrade(parent)),
            entries: RwLock::new(Vec::new()),
        })
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The parent scope, if it is still alive.
    #[must_use]
    pub fn parent(&self) -> Option<Arc<Scope>> {
        self.parent.as_ref().and_then(Weak::upgrade)
    }

    /// Register `instance` as `T` under `name`.
    /// `T` can be a trait object like `dyn modkit_client::Encoder`.
    pub fn register<T>(&self, name: impl Into<Arc<str>>, instance: Arc<T>)
    where
        T: ?Sized + Send + Sync + 'static,
    {
        self.register_ordered::<T>(name, DEFAULT_ORDER, instance);
    }

    /// Register `instance` as `T` under `name` with an explicit order
    /// (lower runs first when several instances are collected).
    pub fn register_ordered<T>(&self, name: impl Into<Arc<str>>, order: i32, instance: Arc<T>)
    where
        T: ?Sized + Send + Sync + 'static,
    {
        let type_key = TypeKey::of::<T>();
        let name = name.into();
        let mut w = self.entries.write();
        w.retain(|e| !(e.type_key == type_key && e.name == name));
        w.push(Entry {
            type_key,
            name,
            order,
            value: Box::new(instance),
        });
    }

    /// Register `instance` as `T` under the type name of its concrete type `C`.
    ///
    /// This is how fallbacks are registered: the descriptor refers to the
    /// fallback by its concrete type, the client resolves it as the capability.
    pub fn register_as<T, C>(&self, instance: Arc<T>)
    where
        T: ?Sized + Send + Sync + 'static,
        C: 'static,
    {
        self.register::<T>(std::any::type_name::<C>(), instance);
    }

    /// Most recently registered `T` in this scope only.
    #[must_use]
    pub fn find_local<T>(&self) -> Option<Component<T>>
    where
        T: ?Sized + Send + Sync + 'static,
    {
        let r = self.entries.read();
        r.iter().rev().find_map(Entry::component::<T>)
    }

    /// Most recently registered `T`, searching this scope then its ancestors.
    #[must_use]
    pub fn find<T>(&self) -> Option<Component<T>>
    where
        T: ?Sized + Send + Sync + 'static,
    {
        if let Some(found) = self.find_local::<T>() {
            return Some(found);
        }
        let mut current = self.parent();
        while let Some(scope) = current {
            if let Some(found) = scope.find_local::<T>() {
                return Some(found);
            }
            current = scope.parent();
        }
        None
    }

    /// All `T` in this scope, in registration order.
    #[must_use]
    pub fn find_all_local<T>(&self) -> Vec<Component<T>>
    where
        T: ?Sized + Send + Sync + 'static,
    {
        let r = self.entries.read();
        r.iter().filter_map(Entry::component::<T>).collect()
    }

    /// All `T` in this scope and its ancestors. Local entries come first; an
    /// ancestor entry is skipped when a nearer scope has one with the same name.
    #[must_use]
    pub fn find_all<T>(&self) -> Vec<Component<T>>
    where
        T: ?Sized + Send + Sync + 'static,
    {
        let mut found = self.find_all_local::<T>();
        let mut seen: HashSet<Arc<str>> = found.iter().map(|c| Arc::clone(&c.name)).collect();
        let mut current = self.parent();
        while let Some(scope) = current {
            for component in scope.find_all_local::<T>() {
                if seen.insert(Arc::clone(&component.name)) {
                    found.push(component);
                }
            }
            current = scope.parent();
        }
        found
    }

    /// `T` registered under `name`, searching this scope then its ancestors.
    ///
    /// # Errors
    /// `TypeMismatch` when the name exists only under another type,
    /// `NotFound` when the name is not registered at all.
    pub fn find_named<T>(&self, name: &str) -> Result<Component<T>, ScopeError>
    where
        T: ?Sized + Send + Sync + 'static,
    {
        let mut mismatch: Option<ScopeError> = None;
        if let Some(found) = self.find_named_local::<T>(name, &mut mismatch) {
            return Ok(found);
        }
        let mut current = self.parent();
        while let Some(scope) = current {
            if let Some(found) = scope.find_named_local::<T>(name, &mut mismatch) {
                return Ok(found);
            }
            current = scope.parent();
        }

        Err(mismatch.unwrap_or_else(|| ScopeError::NotFound {
            type_name: TypeKey::of::<T>().name(),
            name: name.to_owned(),
            scope: self.name.to_string(),
        }))
    }

    fn find_named_local<T>(&self, name: &str, mismatch: &mut Option<ScopeError>) -> Option<Component<T>>
    where
        T: ?Sized + Send + Sync + 'static,
    {
        let r = self.entries.read();
        for e in r.iter().rev().filter(|e| &*e.name == name) {
            if let Some(component) = e.component::<T>() {
                return Some(component);
            }
            if mismatch.is_none() {
                *mismatch = Some(ScopeError::TypeMismatch {
                    requested: TypeKey::of::<T>().name(),
                    registered: e.type_key.name(),
                    name: name.to_owned(),
                    scope: self.name.to_string(),
                });
            }
        }
        None
    }

    /// Remove the `T` registered under `name`; returns it if it was present.
    #[must_use]
    pub fn remove<T>(&self, name: &str) -> Option<Arc<T>>
    where
        T: ?Sized + Send + Sync + 'static,
    {
        let type_key = TypeKey::of::<T>();
        let mut w = self.entries.write();
        let idx = w
            .iter()
            .position(|e| e.type_key == type_key && &*e.name == name)?;
        let entry = w.remove(idx);
        entry.value.downcast::<Arc<T>>().ok().map(|b| *b)
    }

    /// Clear everything (useful in tests).
    pub fn clear(&self) {
        self.entries.write().clear();
    }

    /// Introspection: number of local entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

impl fmt::Debug for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scope")
            .field("name", &self.name)
            .field("entries", &self.len())
            .finish_non_exhaustive()
    }
}

/// Populates a scope with components. Registered per client (or for all
/// clients via a `default.`-prefixed name) and applied when the scope is created.
pub trait ScopeConfiguration: Send + Sync {
    fn configure(&self, scope: &Scope);
}

impl<F> ScopeConfiguration for F
where
    F: Fn(&Scope) + Send + Sync,
{
    fn configure(&self, scope: &Scope) {
        self(scope);
    }
}

/// Registry of per-client scopes keyed by context id, sharing one parent scope.
pub struct NamedScope {
    parent: Arc<Scope>,
    children: DashMap<String, Arc<Scope>>,
    defaults: RwLock<Vec<Arc<dyn ScopeConfiguration>>>,
    configurations: RwLock<HashMap<String, Vec<Arc<dyn ScopeConfiguration>>>>,
    catalog: ComponentCatalog,
}

impl NamedScope {
    /// Empty registry with the built-in component catalog and no default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self {
            parent: Scope::root(APPLICATION_SCOPE),
            children: DashMap::new(),
            defaults: RwLock::new(Vec::new()),
            configurations: RwLock::new(HashMap::new()),
            catalog: ComponentCatalog::with_builtins(),
        }
    }

    /// Add a configuration applied first to every client scope.
    #[must_use]
    pub fn with_default_configuration(self, configuration: impl ScopeConfiguration + 'static) -> Self {
        self.defaults.write().push(Arc::new(configuration));
        self
    }

    /// The shared parent scope. Components registered here are visible to every
    /// client that inherits from its parent.
    #[must_use]
    pub fn parent(&self) -> &Arc<Scope> {
        &self.parent
    }

    #[must_use]
    pub fn catalog(&self) -> &ComponentCatalog {
        &self.catalog
    }

    /// Register a configuration under `name` (a context id, or a `default.`-prefixed
    /// name to target every client). Scopes that already exist are configured immediately.
    #[allow(clippy::needless_pass_by_value)] // the registry keeps its own clone
    pub fn add_configuration(&self, name: &str, configuration: Arc<dyn ScopeConfiguration>) {
        self.configurations
            .write()
            .entry(name.to_owned())
            .or_default()
            .push(Arc::clone(&configuration));

        let existing: Vec<Arc<Scope>> = if name.starts_with(DEFAULT_CONFIGURATION_PREFIX) {
            self.children.iter().map(|e| Arc::clone(e.value())).collect()
        } else {
            self.children
                .get(name)
                .map(|e| Arc::clone(e.value()))
                .into_iter()
                .collect()
        };
        for child in existing {
            tracing::debug!(context_id = child.name(), "configuring already created client scope");
            configuration.configure(&child);
        }
    }

    /// Replace every configuration registered under `context_id` and drop its
    /// scope; the scope is rebuilt from the new configurations on next use.
    pub fn replace_configurations(&self, context_id: &str, configurations: Vec<Arc<dyn ScopeConfiguration>>) {
        {
            let mut registered = self.configurations.write();
            if configurations.is_empty() {
                registered.remove(context_id);
            } else {
                registered.insert(context_id.to_owned(), configurations);
            }
        }
        if self.children.remove(context_id).is_some() {
            tracing::debug!(context_id, "dropped client scope, rebuilding on next use");
        }
    }

    /// Scope for `context_id`, created and configured on first use.
    ///
    /// Configurations run without any registry lock held, so they may look up
    /// other scopes. When two threads create the same scope at once, one result
    /// is kept and returned to both.
    #[must_use]
    pub fn scope(&self, context_id: &str) -> Arc<Scope> {
        if let Some(existing) = self.children.get(context_id) {
            return Arc::clone(existing.value());
        }
        let created = self.create_scope(context_id);
        let entry = self.children.entry(context_id.to_owned()).or_insert(created);
        Arc::clone(entry.value())
    }

    #[must_use]
    pub fn contains(&self, context_id: &str) -> bool {
        self.children.contains_key(context_id)
    }

    /// Context ids of all scopes created so far, sorted.
    #[must_use]
    pub fn context_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.children.iter().map(|e| e.key().clone()).collect();
        ids.sort();
        ids
    }

    /// Most recently registered `T` visible from the client scope (with ancestors).
    #[must_use]
    pub fn instance<T>(&self, context_id: &str) -> Option<Component<T>>
    where
        T: ?Sized + Send + Sync + 'static,
    {
        self.scope(context_id).find::<T>()
    }

    /// Most recently registered `T` in the client scope only.
    #[must_use]
    pub fn instance_without_ancestors<T>(&self, context_id: &str) -> Option<Component<T>>
    where
        T: ?Sized + Send + Sync + 'static,
    {
        self.scope(context_id).find_local::<T>()
    }

    #[must_use]
    pub fn instances<T>(&self, context_id: &str) -> Vec<Component<T>>
    where
        T: ?Sized + Send + Sync + 'static,
    {
        self.scope(context_id).find_all::<T>()
    }

    #[must_use]
    pub fn instances_without_ancestors<T>(&self, context_id: &str) -> Vec<Component<T>>
    where
        T: ?Sized + Send + Sync + 'static,
    {
        self.scope(context_id).find_all_local::<T>()
    }

    /// `T` registered under `name`, visible from the client scope.
    ///
    /// # Errors
    /// See [`Scope::find_named`].
    pub fn named_instance<T>(&self, context_id: &str, name: &str) -> Result<Component<T>, ScopeError>
    where
        T: ?Sized + Send + Sync + 'static,
    {
        self.scope(context_id).find_named::<T>(name)
    }

    fn create_scope(&self, context_id: &str) -> Arc<Scope> {
        let scope = Scope::child(&self.parent, context_id);

        let mut ordered: Vec<Arc<dyn ScopeConfiguration>> = self.defaults.read().clone();
        {
            let configurations = self.configurations.read();
            let mut shared: Vec<&String> = configurations
                .keys()
                .filter(|k| k.starts_with(DEFAULT_CONFIGURATION_PREFIX))
                .collect();
            shared.sort();
            for key in shared {
                ordered.extend(configurations[key].iter().cloned());
            }
            if let Some(own) = configurations.get(context_id) {
                ordered.extend(own.iter().cloned());
            }
        }
        for configuration in &ordered {
            configuration.configure(&scope);
        }

        tracing::debug!(context_id, components = scope.len(), "created client scope");
        scope
    }
}

impl Default for NamedScope {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for NamedScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NamedScope")
            .field("parent", &self.parent)
            .field("children", &self.context_ids())
            .finish_non_exhaustive()
    }
}
