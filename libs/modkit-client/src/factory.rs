use dashmap::DashMap;
use parking_lot::RwLock;
use std::{any::Any, collections::HashMap, fmt, sync::Arc};

use crate::client::Capability;
use crate::config::EffectiveConfiguration;
use crate::descriptor::{ClientDescriptor, RoutingTarget};
use crate::error::ClientFactoryError;
use crate::normalize::has_http_scheme;
use crate::properties::PropertySource;
use crate::registrar::{ClientDeclaration, ClientRegistrar, EnvironmentResolver, PlaceholderResolver};
use crate::resolver::ConfigurationResolver;
use crate::scope::{Component, DEFAULT_CONFIGURATION_PREFIX, NamedScope, ScopeConfiguration};
use crate::targeter::Targeter;
use crate::transport::{TransportClient, unwrap_client_chain};

/// Entry point: registered client descriptors, their scopes, and the built clients.
///
/// ```ignore
/// let factory = ClientFactory::new(
///     NamedScope::new().with_default_configuration(DefaultClientConfiguration::plain()),
///     ClientProperties::from_figment(&figment)?,
/// );
/// factory.scopes().parent().register::<TransportClient>("http", Arc::new(transport));
/// factory.register(ClientDeclaration::for_capability::<dyn UsersApi>().name("users").url("users.local"))?;
///
/// let users: Arc<dyn UsersApi> = factory.get("users")?;
/// ```
pub struct ClientFactory {
    scopes: Arc<NamedScope>,
    properties: Arc<dyn PropertySource>,
    placeholders: Arc<dyn PlaceholderResolver>,
    targeter: Targeter,
    descriptors: RwLock<HashMap<String, Arc<ClientDescriptor>>>,
    clients: DashMap<String, Arc<dyn Any + Send + Sync>>,
}

impl ClientFactory {
    /// Factory over `scopes` reading property layers from `properties`.
    /// Placeholders resolve against the process environment.
    #[must_use]
    pub fn new(scopes: NamedScope, properties: impl PropertySource + 'static) -> Self {
        Self {
            scopes: Arc::new(scopes),
            properties: Arc::new(properties),
            placeholders: Arc::new(EnvironmentResolver::from_env()),
            targeter: Targeter,
            descriptors: RwLock::new(HashMap::new()),
            clients: DashMap::new(),
        }
    }

    #[must_use]
    pub fn with_placeholder_resolver(mut self, resolver: impl PlaceholderResolver + 'static) -> Self {
        self.placeholders = Arc::new(resolver);
        self
    }

    #[must_use]
    pub fn scopes(&self) -> &Arc<NamedScope> {
        &self.scopes
    }

    /// Validate and register a client.
    ///
    /// The declaration's configurations are registered for its context id.
    /// Registering the same context id again replaces the descriptor and its
    /// configurations, and drops the client scope and any client already built for it.
    ///
    /// # Errors
    /// Any validation error from [`ClientRegistrar::descriptor`].
    pub fn register(&self, declaration: ClientDeclaration) -> Result<Arc<ClientDescriptor>, ClientFactoryError> {
        let descriptor = Arc::new(ClientRegistrar::new(self.placeholders.as_ref()).descriptor(declaration)?);
        let context_id = descriptor.context_id().to_owned();

        if self.descriptors.read().contains_key(&context_id) {
            self.scopes
                .replace_configurations(&context_id, descriptor.configurations().to_vec());
        } else {
            for configuration in descriptor.configurations() {
                self.scopes.add_configuration(&context_id, Arc::clone(configuration));
            }
        }

        let previous = self
            .descriptors
            .write()
            .insert(context_id.clone(), Arc::clone(&descriptor));
        if previous.is_some() {
            tracing::warn!(context_id, "client registered twice, replacing previous descriptor");
            self.clients.remove(&context_id);
        }
        tracing::debug!(
            context_id,
            client_type = descriptor.client_type().name(),
            "registered client"
        );
        Ok(descriptor)
    }

    /// Apply `configuration` to every client scope, under `default.{name}`.
    pub fn register_default_configuration(&self, name: &str, configuration: Arc<dyn ScopeConfiguration>) {
        let key = format!("{DEFAULT_CONFIGURATION_PREFIX}{name}");
        self.scopes.add_configuration(&key, configuration);
    }

    #[must_use]
    pub fn descriptor(&self, context_id: &str) -> Option<Arc<ClientDescriptor>> {
        self.descriptors.read().get(context_id).cloned()
    }

    #[must_use]
    pub fn descriptor_by_qualifier(&self, qualifier: &str) -> Option<Arc<ClientDescriptor>> {
        let descriptors = self.descriptors.read();
        let mut matching: Vec<&Arc<ClientDescriptor>> = descriptors
            .values()
            .filter(|d| d.qualifiers().iter().any(|q| q == qualifier))
            .collect();
        matching.sort_by(|a, b| a.context_id().cmp(b.context_id()));
        matching.first().copied().cloned()
    }

    /// The primary descriptor declared for capability `T`.
    ///
    /// When several are primary the one with the smallest context id wins.
    #[must_use]
    pub fn primary_descriptor<T: ?Sized + 'static>(&self) -> Option<Arc<ClientDescriptor>> {
        let type_name = std::any::type_name::<T>();
        let descriptors = self.descriptors.read();
        let mut primaries: Vec<&Arc<ClientDescriptor>> = descriptors
            .values()
            .filter(|d| d.is_primary() && d.client_type().name() == type_name)
            .collect();
        primaries.sort_by(|a, b| a.context_id().cmp(b.context_id()));
        if primaries.len() > 1 {
            tracing::warn!(
                capability = type_name,
                count = primaries.len(),
                "several primary clients declared, using the first by context id"
            );
        }
        primaries.first().copied().cloned()
    }

    /// Effective configuration of a registered client. Never builds or caches a client.
    ///
    /// # Errors
    /// `UnknownClient` if `context_id` is not registered, otherwise resolution errors.
    pub fn resolve(&self, context_id: &str) -> Result<EffectiveConfiguration, ClientFactoryError> {
        let descriptor = self.require(context_id)?;
        let builder = ConfigurationResolver::new(&self.scopes, self.properties.as_ref()).resolve(&descriptor)?;
        Ok(builder.effective())
    }

    /// Client for `context_id`, built on first use and shared afterwards.
    ///
    /// # Errors
    /// `UnknownClient`, `CapabilityMismatch`, or any resolution/construction error.
    pub fn get<T>(&self, context_id: &str) -> Result<Arc<T>, ClientFactoryError>
    where
        T: Capability + ?Sized,
    {
        if let Some(cached) = self.clients.get(context_id) {
            return self.downcast::<T>(context_id, cached.value());
        }

        let client = self.create::<T>(context_id)?;
        let stored = Arc::clone(
            self.clients
                .entry(context_id.to_owned())
                .or_insert_with(|| Arc::new(client) as Arc<dyn Any + Send + Sync>)
                .value(),
        );
        self.downcast::<T>(context_id, &stored)
    }

    /// Client for the descriptor carrying `qualifier`.
    ///
    /// # Errors
    /// `UnknownClient` if no descriptor carries the qualifier, else as [`get`](Self::get).
    pub fn get_qualified<T>(&self, qualifier: &str) -> Result<Arc<T>, ClientFactoryError>
    where
        T: Capability + ?Sized,
    {
        let descriptor = self
            .descriptor_by_qualifier(qualifier)
            .ok_or_else(|| ClientFactoryError::UnknownClient {
                context_id: qualifier.to_owned(),
            })?;
        self.get::<T>(descriptor.context_id())
    }

    /// Client of the primary descriptor for `T`.
    ///
    /// # Errors
    /// `UnknownClient` if no primary descriptor exists for `T`, else as [`get`](Self::get).
    pub fn get_primary<T>(&self) -> Result<Arc<T>, ClientFactoryError>
    where
        T: Capability + ?Sized,
    {
        let descriptor = self
            .primary_descriptor::<T>()
            .ok_or_else(|| ClientFactoryError::UnknownClient {
                context_id: std::any::type_name::<T>().to_owned(),
            })?;
        self.get::<T>(descriptor.context_id())
    }

    /// Build a new client for `context_id`, bypassing the cache.
    ///
    /// Without a fixed URL the client routes through the scope's `TransportClient`
    /// (kept load-balanced) to `http://{name}{path}`. With a fixed URL any
    /// load-balancing decorators around the scope's `TransportClient` are removed.
    ///
    /// # Errors
    /// `UnknownClient`, `CapabilityMismatch`, `MissingComponent`, fallback errors.
    pub fn create<T>(&self, context_id: &str) -> Result<Arc<T>, ClientFactoryError>
    where
        T: Capability + ?Sized,
    {
        let descriptor = self.require(context_id)?;
        let requested = std::any::type_name::<T>();
        if descriptor.client_type().name() != requested {
            return Err(ClientFactoryError::CapabilityMismatch {
                context_id: context_id.to_owned(),
                declared: descriptor.client_type().name().to_owned(),
                requested: requested.to_owned(),
            });
        }

        let mut builder = ConfigurationResolver::new(&self.scopes, self.properties.as_ref()).resolve(&descriptor)?;
        let transport = self.scopes.instance::<TransportClient>(context_id);
        if transport.is_none() && builder.transport_client().is_none() {
            return Err(ClientFactoryError::MissingComponent {
                component: "TransportClient".to_owned(),
                context_id: context_id.to_owned(),
            });
        }

        let target = if let Some(url) = descriptor.url() {
            let target = RoutingTarget::new(
                descriptor.client_type().clone(),
                descriptor.name(),
                format!("{url}{}", descriptor.path()),
            );
            if let Some(transport) = transport {
                let direct = unwrap_client_chain(transport.instance().as_ref().clone(), &target);
                builder = builder.transport(Component::new(transport.name(), Arc::new(direct)));
            }
            target
        } else {
            let name = descriptor.name();
            let url = if has_http_scheme(name) {
                format!("{name}{}", descriptor.path())
            } else {
                format!("http://{name}{}", descriptor.path())
            };
            if let Some(transport) = transport {
                builder = builder.transport(transport);
            }
            RoutingTarget::new(descriptor.client_type().clone(), name, url)
        };

        self.targeter.target::<T>(&descriptor, builder, &self.scopes, target)
    }

    fn require(&self, context_id: &str) -> Result<Arc<ClientDescriptor>, ClientFactoryError> {
        self.descriptor(context_id)
            .ok_or_else(|| ClientFactoryError::UnknownClient {
                context_id: context_id.to_owned(),
            })
    }

    fn downcast<T>(&self, context_id: &str, stored: &Arc<dyn Any + Send + Sync>) -> Result<Arc<T>, ClientFactoryError>
    where
        T: Capability + ?Sized,
    {
        stored
            .downcast_ref::<Arc<T>>()
            .cloned()
            .ok_or_else(|| ClientFactoryError::CapabilityMismatch {
                context_id: context_id.to_owned(),
                declared: self
                    .descriptor(context_id)
                    .map(|d| d.client_type().name().to_owned())
                    .unwrap_or_default(),
                requested: std::any::type_name::<T>().to_owned(),
            })
    }
}

impl fmt::Debug for ClientFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut ids: Vec<String> = self.descriptors.read().keys().cloned().collect();
        ids.sort();
        f.debug_struct("ClientFactory")
            .field("clients", &ids)
            .field("built", &self.clients.len())
            .finish_non_exhaustive()
    }
}
