#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
#![warn(warnings)]

//! Declarative HTTP clients for `ModKit`
//!
//! A client is declared once (capability type, service name, optional fixed
//! URL and path, optional fallback) and built on demand from layered
//! configuration:
//!
//! - components registered in per-client scopes, which inherit from a shared
//!   parent scope ([`NamedScope`]),
//! - a default property entry and a per-client property entry
//!   ([`ClientProperties`], loaded with `figment`).
//!
//! The precedence between the layers is controlled by `default_to_properties`.
//! Fault-tolerant clients delegate failed calls to a fallback, or to a delegate
//! produced by a fallback factory from the triggering error.
//!
//! # Example
//!
//! ```ignore
//! use modkit_client::{
//!     ClientDeclaration, ClientFactory, ClientProperties, DefaultClientConfiguration, NamedScope,
//!     TransportClient,
//! };
//!
//! let factory = ClientFactory::new(
//!     NamedScope::new().with_default_configuration(DefaultClientConfiguration::fault_tolerant()),
//!     ClientProperties::from_figment(&figment)?,
//! );
//! factory
//!     .scopes()
//!     .parent()
//!     .register::<TransportClient>("http", Arc::new(TransportClient::direct(my_transport)));
//!
//! factory.register(
//!     ClientDeclaration::for_capability::<dyn UsersApi>()
//!         .name("users")
//!         .url("${users.url:http://localhost:8080}")
//!         .fallback::<UsersFallback>()
//!         .configuration(|scope: &Scope| {
//!             scope.register_as::<dyn UsersApi, UsersFallback>(Arc::new(UsersFallback));
//!         }),
//! )?;
//!
//! let users: Arc<dyn UsersApi> = factory.get("users")?;
//! let user = users.get_user(42).await?;
//! ```
//!
//! Properties (YAML):
//!
//! ```yaml
//! clients:
//!   default_to_properties: true
//!   config:
//!     default:
//!       connect_timeout_ms: 2000
//!       logger_level: basic
//!     users:
//!       read_timeout_ms: 500
//!       retryer: default-retryer
//!       default_request_headers:
//!         x-tenant: [acme]
//! ```

mod builder;
mod catalog;
mod client;
mod components;
mod config;
mod descriptor;
mod error;
mod factory;
mod normalize;
mod properties;
mod registrar;
mod request;
mod resolver;
mod scope;
mod targeter;
mod transport;

pub use builder::ClientBuilder;
pub use catalog::ComponentCatalog;
pub use client::{Capability, Client, Fallback, FallbackFactory, WIRE_TARGET};
pub use components::{
    BUILDER_TEMPLATE, BuilderCustomizer, ClientConfigurer, CommandSetter, Contract, DEFAULT_CONTRACT,
    DEFAULT_ERROR_DECODER, DEFAULT_HEADERS_INTERCEPTOR, DEFAULT_QUERY_INTERCEPTOR, DEFAULT_RETRYER,
    Decoder, DefaultClientConfiguration, DefaultContract, DefaultErrorDecoder, DefaultSetterFactory,
    Encoder, ErrorDecoder, ErrorDecoderFactory, FIELD_QUERY_MAP_ENCODER, FieldQueryMapEncoder,
    HeadersInterceptor, JSON_DECODER, JSON_ENCODER, JsonDecoder, JsonEncoder, NEVER_RETRY,
    QueryMapEncoder, QueryParametersInterceptor, RequestInterceptor, SetterFactory,
    StaticClientConfigurer,
};
pub use config::{
    BuilderTemplate, DEFAULT_CONNECT_TIMEOUT, DEFAULT_READ_TIMEOUT, EffectiveConfiguration,
    ExceptionPolicy, ExponentialBackoff, LoggerLevel, RequestOptions, RetryPolicy,
};
pub use descriptor::{ClientDescriptor, FallbackSpec, RoutingTarget, TypeRef, TypeShape};
pub use error::{
    BoxError, ClientError, ClientFactoryError, FallbackMechanism, ScopeError, TransportError,
};
pub use factory::ClientFactory;
pub use normalize::{normalize_path, normalize_url, validate_name};
pub use properties::{
    CLIENTS_SECTION, ClientProperties, ConfigurationSource, DEFAULT_CONFIG_NAME, PropertySource,
};
pub use registrar::{
    ClientDeclaration, ClientRegistrar, DEFAULT_QUALIFIER_SUFFIX, EnvironmentResolver,
    PlaceholderResolver,
};
pub use request::{Body, RequestTemplate};
pub use resolver::ConfigurationResolver;
pub use scope::{
    APPLICATION_SCOPE, Component, DEFAULT_CONFIGURATION_PREFIX, DEFAULT_ORDER, NamedScope, Scope,
    ScopeConfiguration, TypeKey,
};
pub use targeter::Targeter;
pub use transport::{
    LoadBalancerKind, Request, Response, Transport, TransportClient, unwrap_client_chain,
};
