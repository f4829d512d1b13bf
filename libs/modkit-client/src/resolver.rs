//! Layered configuration resolution.
//!
//! A client is configured from up to three layers, each applied on top of the
//! previous one and overwriting only what it defines:
//!
//! - in-descriptor declarations: components found in the client scope
//!   (and its ancestors unless the client is isolated),
//! - the default property entry shared by every client,
//! - the client's own property entry.
//!
//! With `default_to_properties` the declarations come first and properties
//! win; otherwise properties come first and declarations win. An isolated
//! client (a [`ClientConfigurer`] answering `false`) only gets its own
//! declarations.

use std::sync::Arc;

use crate::builder::ClientBuilder;
use crate::components::{
    BuilderCustomizer, ClientConfigurer, Contract, DEFAULT_HEADERS_INTERCEPTOR, DEFAULT_QUERY_INTERCEPTOR,
    Decoder, Encoder, ErrorDecoder, ErrorDecoderFactory, HeadersInterceptor, QueryMapEncoder,
    QueryParametersInterceptor, RequestInterceptor,
};
use crate::config::{BuilderTemplate, ExceptionPolicy, LoggerLevel, RequestOptions, RetryPolicy};
use crate::descriptor::ClientDescriptor;
use crate::error::ClientFactoryError;
use crate::properties::{ConfigurationSource, PropertySource};
use crate::scope::{Component, NamedScope, Scope};

/// Turns a descriptor into a fully configured [`ClientBuilder`].
pub struct ConfigurationResolver<'a> {
    scopes: &'a NamedScope,
    properties: &'a dyn PropertySource,
}

impl<'a> ConfigurationResolver<'a> {
    #[must_use]
    pub fn new(scopes: &'a NamedScope, properties: &'a dyn PropertySource) -> Self {
        Self { scopes, properties }
    }

    /// Resolve the builder for `descriptor`.
    ///
    /// # Errors
    /// `MissingComponent` if a required component (builder template, encoder,
    /// decoder, contract) is absent, or a property names an unknown component.
    pub fn resolve(&self, descriptor: &ClientDescriptor) -> Result<ClientBuilder, ClientFactoryError> {
        let context_id = descriptor.context_id();
        let scope = self.scopes.scope(context_id);

        let template = required::<BuilderTemplate>(&scope, context_id, "BuilderTemplate")?;
        let mut builder = ClientBuilder::new(
            *template,
            required::<dyn Encoder>(&scope, context_id, "Encoder")?,
            required::<dyn Decoder>(&scope, context_id, "Decoder")?,
            required::<dyn Contract>(&scope, context_id, "Contract")?,
        );

        let inherit = scope
            .find::<dyn ClientConfigurer>()
            .is_none_or(|c| c.inherit_parent_configuration());

        if inherit {
            let defaults = self.properties.default_config();
            let own = self.properties.client_config(context_id);
            if self.properties.default_to_properties() {
                builder = apply_declarations(builder, &scope, descriptor, true);
                builder = self.apply_optional_properties(builder, defaults, &scope, context_id)?;
                builder = self.apply_optional_properties(builder, own, &scope, context_id)?;
            } else {
                builder = self.apply_optional_properties(builder, defaults, &scope, context_id)?;
                builder = self.apply_optional_properties(builder, own, &scope, context_id)?;
                builder = apply_declarations(builder, &scope, descriptor, true);
            }
        } else {
            tracing::debug!(context_id, "client scope is isolated, skipping inherited layers");
            builder = apply_declarations(builder, &scope, descriptor, false);
        }

        Ok(customize(builder, &scope, descriptor, inherit))
    }

    fn apply_optional_properties(
        &self,
        builder: ClientBuilder,
        source: Option<&ConfigurationSource>,
        scope: &Scope,
        context_id: &str,
    ) -> Result<ClientBuilder, ClientFactoryError> {
        if let Some(source) = source {
            self.apply_properties(builder, source, scope, context_id)
        } else {
            Ok(builder)
        }
    }

    fn apply_properties(
        &self,
        mut builder: ClientBuilder,
        source: &ConfigurationSource,
        scope: &Scope,
        context_id: &str,
    ) -> Result<ClientBuilder, ClientFactoryError> {
        tracing::debug!(context_id, "applying client properties");

        if let Some(level) = source.logger_level {
            builder = builder.logger_level(level);
        }
        let options = builder.request_options().merge(
            source.connect_timeout_ms,
            source.read_timeout_ms,
            source.follow_redirects,
        );
        builder = builder.options(options);

        if let Some(name) = &source.retryer {
            builder = builder.retry(self.named::<RetryPolicy>(scope, context_id, name)?);
        }
        if let Some(name) = &source.error_decoder {
            builder = builder.error_decoder(self.named::<dyn ErrorDecoder>(scope, context_id, name)?);
        }
        for name in &source.request_interceptors {
            builder = builder.request_interceptor(self.named::<dyn RequestInterceptor>(scope, context_id, name)?);
        }
        if source.decode404 == Some(true) {
            builder = builder.decode404();
        }
        if let Some(name) = &source.encoder {
            builder = builder.encoder(self.named::<dyn Encoder>(scope, context_id, name)?);
        }
        if !source.default_request_headers.is_empty() {
            builder = builder.request_interceptor(Component::new(
                DEFAULT_HEADERS_INTERCEPTOR,
                Arc::new(HeadersInterceptor::new(&source.default_request_headers)),
            ));
        }
        if !source.default_query_parameters.is_empty() {
            builder = builder.request_interceptor(Component::new(
                DEFAULT_QUERY_INTERCEPTOR,
                Arc::new(QueryParametersInterceptor::new(source.default_query_parameters.clone())),
            ));
        }
        if let Some(name) = &source.decoder {
            builder = builder.decoder(self.named::<dyn Decoder>(scope, context_id, name)?);
        }
        if let Some(name) = &source.contract {
            builder = builder.contract(self.named::<dyn Contract>(scope, context_id, name)?);
        }
        if let Some(policy) = source.exception_propagation_policy {
            builder = builder.exception_policy(policy);
        }
        Ok(builder)
    }

    /// Component registered under `name`, else a fresh one from the catalog.
    fn named<T>(&self, scope: &Scope, context_id: &str, name: &str) -> Result<Component<T>, ClientFactoryError>
    where
        T: ?Sized + Send + Sync + 'static,
    {
        if let Ok(component) = scope.find_named::<T>(name) {
            return Ok(component);
        }
        let Some(instance) = self.scopes.catalog().instantiate::<T>(name) else {
            return Err(ClientFactoryError::MissingComponent {
                component: name.to_owned(),
                context_id: context_id.to_owned(),
            });
        };
        tracing::debug!(context_id, component = name, "instantiated component from catalog");
        Ok(Component::new(name, instance))
    }
}

fn required<T>(scope: &Scope, context_id: &str, component: &str) -> Result<Component<T>, ClientFactoryError>
where
    T: ?Sized + Send + Sync + 'static,
{
    scope.find::<T>().ok_or_else(|| ClientFactoryError::MissingComponent {
        component: component.to_owned(),
        context_id: context_id.to_owned(),
    })
}

fn lookup<T>(scope: &Scope, inherit: bool) -> Option<Component<T>>
where
    T: ?Sized + Send + Sync + 'static,
{
    if inherit { scope.find::<T>() } else { scope.find_local::<T>() }
}

fn lookup_all<T>(scope: &Scope, inherit: bool) -> Vec<Component<T>>
where
    T: ?Sized + Send + Sync + 'static,
{
    let mut all = if inherit {
        scope.find_all::<T>()
    } else {
        scope.find_all_local::<T>()
    };
    all.sort_by_key(Component::order);
    all
}

fn apply_declarations(
    mut builder: ClientBuilder,
    scope: &Scope,
    descriptor: &ClientDescriptor,
    inherit: bool,
) -> ClientBuilder {
    tracing::debug!(context_id = descriptor.context_id(), inherit, "applying scope declarations");

    if let Some(level) = lookup::<LoggerLevel>(scope, inherit) {
        builder = builder.logger_level(*level);
    }
    if let Some(retry) = lookup::<RetryPolicy>(scope, inherit) {
        builder = builder.retry(retry);
    }
    if let Some(decoder) = lookup::<dyn ErrorDecoder>(scope, inherit) {
        builder = builder.error_decoder(decoder);
    } else if let Some(factory) = lookup::<dyn ErrorDecoderFactory>(scope, inherit) {
        let decoder = factory.create(descriptor.client_type());
        builder = builder.error_decoder(Component::new(factory.name(), decoder));
    }
    if let Some(options) = lookup::<RequestOptions>(scope, inherit) {
        builder = builder.options(*options);
    }
    let interceptors = lookup_all::<dyn RequestInterceptor>(scope, inherit);
    if !interceptors.is_empty() {
        builder = builder.request_interceptors(interceptors);
    }
    if let Some(encoder) = lookup::<dyn QueryMapEncoder>(scope, inherit) {
        builder = builder.query_map_encoder(encoder);
    }
    if let Some(policy) = lookup::<ExceptionPolicy>(scope, inherit) {
        builder = builder.exception_policy(*policy);
    }
    if descriptor.decode404() {
        builder = builder.decode404();
    }
    builder
}

fn customize(builder: ClientBuilder, scope: &Scope, descriptor: &ClientDescriptor, inherit: bool) -> ClientBuilder {
    let scoped = lookup_all::<dyn BuilderCustomizer>(scope, inherit);
    let builder = scoped.iter().fold(builder, |b, c| c.customize(b));
    descriptor.customizers().iter().fold(builder, |b, c| c.customize(b))
}
