use std::{fmt, sync::Arc};

use crate::components::BuilderCustomizer;
use crate::scope::ScopeConfiguration;

/// Whether a type can be instantiated or only names a capability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TypeShape {
    Concrete,
    Interface,
}

/// Name and shape of a type referenced by a descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TypeRef {
    name: Arc<str>,
    shape: TypeShape,
}

impl TypeRef {
    /// Reference to a concrete (sized) type.
    #[must_use]
    pub fn of<T: 'static>() -> Self {
        Self {
            name: std::any::type_name::<T>().into(),
            shape: TypeShape::Concrete,
        }
    }

    /// Reference to a capability type, usually `dyn Trait`.
    #[must_use]
    pub fn interface<T: ?Sized + 'static>() -> Self {
        Self {
            name: std::any::type_name::<T>().into(),
            shape: TypeShape::Interface,
        }
    }

    /// Reference known only by name, e.g. from generated registration code.
    #[must_use]
    pub fn late_bound(name: impl Into<Arc<str>>, shape: TypeShape) -> Self {
        Self {
            name: name.into(),
            shape,
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn shape(&self) -> TypeShape {
        self.shape
    }

    #[must_use]
    pub fn is_interface(&self) -> bool {
        self.shape == TypeShape::Interface
    }
}

impl fmt::Display for TypeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// Fallback behavior of a client. At most one mechanism is set.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum FallbackSpec {
    #[default]
    None,
    /// Delegate implementing the capability, resolved by type name
    Delegate(TypeRef),
    /// Factory producing a delegate from the failure, resolved by type name
    Factory(TypeRef),
}

/// Validated, immutable description of one declared client.
///
/// Produced by [`ClientRegistrar`](crate::ClientRegistrar); `context_id` is the
/// key of the client's scope and of its property entry.
#[derive(Clone)]
pub struct ClientDescriptor {
    pub(crate) client_type: TypeRef,
    pub(crate) name: String,
    pub(crate) context_id: String,
    pub(crate) url: Option<String>,
    pub(crate) path: String,
    pub(crate) decode404: bool,
    pub(crate) fallback: FallbackSpec,
    pub(crate) qualifiers: Vec<String>,
    pub(crate) primary: bool,
    pub(crate) configurations: Vec<Arc<dyn ScopeConfiguration>>,
    pub(crate) customizers: Vec<Arc<dyn BuilderCustomizer>>,
}

impl ClientDescriptor {
    #[must_use]
    pub fn client_type(&self) -> &TypeRef {
        &self.client_type
    }

    /// Service name; the host part of the routing URL when no fixed URL is set.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn context_id(&self) -> &str {
        &self.context_id
    }

    /// Fixed URL; `None` routes through the load balancer.
    #[must_use]
    pub fn url(&self) -> Option<&str> {
        self.url.as_deref()
    }

    /// Normalized path prefix, empty when not set.
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    #[must_use]
    pub fn decode404(&self) -> bool {
        self.decode404
    }

    #[must_use]
    pub fn fallback_spec(&self) -> &FallbackSpec {
        &self.fallback
    }

    #[must_use]
    pub fn fallback(&self) -> Option<&TypeRef> {
        match &self.fallback {
            FallbackSpec::Delegate(ty) => Some(ty),
            _ => None,
        }
    }

    #[must_use]
    pub fn fallback_factory(&self) -> Option<&TypeRef> {
        match &self.fallback {
            FallbackSpec::Factory(ty) => Some(ty),
            _ => None,
        }
    }

    #[must_use]
    pub fn qualifiers(&self) -> &[String] {
        &self.qualifiers
    }

    #[must_use]
    pub fn is_primary(&self) -> bool {
        self.primary
    }

    /// Scope configurations declared with the client (already registered under `context_id`).
    #[must_use]
    pub fn configurations(&self) -> &[Arc<dyn ScopeConfiguration>] {
        &self.configurations
    }

    /// Builder customizers applied after every other configuration source.
    #[must_use]
    pub fn customizers(&self) -> &[Arc<dyn BuilderCustomizer>] {
        &self.customizers
    }
}

impl fmt::Debug for ClientDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientDescriptor")
            .field("client_type", &self.client_type)
            .field("name", &self.name)
            .field("context_id", &self.context_id)
            .field("url", &self.url)
            .field("path", &self.path)
            .field("decode404", &self.decode404)
            .field("fallback", &self.fallback)
            .field("qualifiers", &self.qualifiers)
            .field("primary", &self.primary)
            .field("configurations", &self.configurations.len())
            .field("customizers", &self.customizers.len())
            .finish()
    }
}

/// Where a built client sends its requests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutingTarget {
    client_type: TypeRef,
    name: String,
    url: String,
}

impl RoutingTarget {
    #[must_use]
    pub fn new(client_type: TypeRef, name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            client_type,
            name: name.into(),
            url: url.into(),
        }
    }

    #[must_use]
    pub fn client_type(&self) -> &TypeRef {
        &self.client_type
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }
}
