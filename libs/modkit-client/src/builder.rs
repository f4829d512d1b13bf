use std::{fmt, sync::Arc, time::Duration};

use crate::client::{Capability, Client, Fallback, MethodHandler};
use crate::components::{
    Contract, DEFAULT_ERROR_DECODER, Decoder, DefaultErrorDecoder, Encoder, ErrorDecoder,
    FIELD_QUERY_MAP_ENCODER, FieldQueryMapEncoder, NEVER_RETRY, QueryMapEncoder,
    RequestInterceptor, SetterFactory,
};
use crate::config::{
    BuilderTemplate, EffectiveConfiguration, ExceptionPolicy, LoggerLevel, RequestOptions,
    RetryPolicy,
};
use crate::descriptor::RoutingTarget;
use crate::error::ClientFactoryError;
use crate::scope::Component;
use crate::transport::TransportClient;

/// Builder for a client of one capability.
///
/// The configuration resolver creates it from the required scope components,
/// then threads it through every configuration source. Each setter consumes
/// the builder and returns the updated one.
///
/// Request interceptors are kept in two groups: the scope-resident group
/// (replaced as a whole by [`request_interceptors`](Self::request_interceptors))
/// and the appended group ([`request_interceptor`](Self::request_interceptor)).
/// The built client runs the scope-resident group first.
pub struct ClientBuilder {
    template: BuilderTemplate,
    logger_level: LoggerLevel,
    options: RequestOptions,
    retry: Component<RetryPolicy>,
    decode404: bool,
    exception_policy: ExceptionPolicy,
    encoder: Component<dyn Encoder>,
    decoder: Component<dyn Decoder>,
    contract: Component<dyn Contract>,
    error_decoder: Component<dyn ErrorDecoder>,
    query_map_encoder: Component<dyn QueryMapEncoder>,
    scope_interceptors: Vec<Component<dyn RequestInterceptor>>,
    appended_interceptors: Vec<Component<dyn RequestInterceptor>>,
    transport: Option<Component<TransportClient>>,
    setter_factory: Option<Component<dyn SetterFactory>>,
}

impl ClientBuilder {
    /// Create a builder from the required components; everything else starts at its default.
    #[must_use]
    pub fn new(
        template: BuilderTemplate,
        encoder: Component<dyn Encoder>,
        decoder: Component<dyn Decoder>,
        contract: Component<dyn Contract>,
    ) -> Self {
        Self {
            template,
            logger_level: LoggerLevel::default(),
            options: RequestOptions::default(),
            retry: Component::new(NEVER_RETRY, Arc::new(RetryPolicy::never())),
            decode404: false,
            exception_policy: ExceptionPolicy::default(),
            encoder,
            decoder,
            contract,
            error_decoder: Component::new(DEFAULT_ERROR_DECODER, Arc::new(DefaultErrorDecoder)),
            query_map_encoder: Component::new(FIELD_QUERY_MAP_ENCODER, Arc::new(FieldQueryMapEncoder)),
            scope_interceptors: Vec::new(),
            appended_interceptors: Vec::new(),
            transport: None,
            setter_factory: None,
        }
    }

    #[must_use]
    pub fn logger_level(mut self, level: LoggerLevel) -> Self {
        self.logger_level = level;
        self
    }

    /// Replace the request options
    #[must_use]
    pub fn options(mut self, options: RequestOptions) -> Self {
        self.options = options;
        self
    }

    #[must_use]
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.options.connect_timeout = timeout;
        self
    }

    #[must_use]
    pub fn read_timeout(mut self, timeout: Duration) -> Self {
        self.options.read_timeout = timeout;
        self
    }

    #[must_use]
    pub fn retry(mut self, retry: Component<RetryPolicy>) -> Self {
        self.retry = retry;
        self
    }

    /// Decode 404 responses with the decoder instead of the error decoder.
    /// There is no way to turn it back off.
    #[must_use]
    pub fn decode404(mut self) -> Self {
        self.decode404 = true;
        self
    }

    #[must_use]
    pub fn exception_policy(mut self, policy: ExceptionPolicy) -> Self {
        self.exception_policy = policy;
        self
    }

    #[must_use]
    pub fn encoder(mut self, encoder: Component<dyn Encoder>) -> Self {
        self.encoder = encoder;
        self
    }

    #[must_use]
    pub fn decoder(mut self, decoder: Component<dyn Decoder>) -> Self {
        self.decoder = decoder;
        self
    }

    #[must_use]
    pub fn contract(mut self, contract: Component<dyn Contract>) -> Self {
        self.contract = contract;
        self
    }

    #[must_use]
    pub fn error_decoder(mut self, error_decoder: Component<dyn ErrorDecoder>) -> Self {
        self.error_decoder = error_decoder;
        self
    }

    #[must_use]
    pub fn query_map_encoder(mut self, encoder: Component<dyn QueryMapEncoder>) -> Self {
        self.query_map_encoder = encoder;
        self
    }

    /// Replace the scope-resident interceptor group. Appended interceptors are kept.
    #[must_use]
    pub fn request_interceptors(mut self, interceptors: Vec<Component<dyn RequestInterceptor>>) -> Self {
        self.scope_interceptors = interceptors;
        self
    }

    /// Append one interceptor after everything configured so far.
    #[must_use]
    pub fn request_interceptor(mut self, interceptor: Component<dyn RequestInterceptor>) -> Self {
        self.appended_interceptors.push(interceptor);
        self
    }

    #[must_use]
    pub fn transport(mut self, client: Component<TransportClient>) -> Self {
        self.transport = Some(client);
        self
    }

    #[must_use]
    pub fn setter_factory(mut self, factory: Component<dyn SetterFactory>) -> Self {
        self.setter_factory = Some(factory);
        self
    }

    #[must_use]
    pub fn template(&self) -> BuilderTemplate {
        self.template
    }

    /// Whether [`Targeter`](crate::Targeter) wires fallbacks into clients from this builder.
    #[must_use]
    pub fn supports_fallback(&self) -> bool {
        self.template == BuilderTemplate::FaultTolerant
    }

    #[must_use]
    pub fn request_options(&self) -> RequestOptions {
        self.options
    }

    #[must_use]
    pub fn transport_client(&self) -> Option<&Component<TransportClient>> {
        self.transport.as_ref()
    }

    /// Interceptors in execution order.
    pub fn interceptors(&self) -> impl Iterator<Item = &Component<dyn RequestInterceptor>> {
        self.scope_interceptors.iter().chain(&self.appended_interceptors)
    }

    /// Snapshot of the current configuration.
    #[must_use]
    pub fn effective(&self) -> EffectiveConfiguration {
        EffectiveConfiguration {
            template: self.template,
            logger_level: self.logger_level,
            connect_timeout_ms: duration_ms(self.options.connect_timeout),
            read_timeout_ms: duration_ms(self.options.read_timeout),
            follow_redirects: self.options.follow_redirects,
            retryer: self.retry.name().to_owned(),
            max_attempts: self.retry.max_attempts,
            decode404: self.decode404,
            exception_policy: self.exception_policy,
            encoder: self.encoder.name().to_owned(),
            decoder: self.decoder.name().to_owned(),
            contract: self.contract.name().to_owned(),
            error_decoder: self.error_decoder.name().to_owned(),
            query_map_encoder: self.query_map_encoder.name().to_owned(),
            request_interceptors: self.interceptors().map(|c| c.name().to_owned()).collect(),
            transport: self.transport.as_ref().map(|c| c.name().to_owned()),
        }
    }

    /// Build a client for `target` without fallback wiring.
    ///
    /// # Errors
    /// Returns `MissingComponent` if no transport client has been set.
    pub fn build<T>(self, target: RoutingTarget) -> Result<Arc<T>, ClientFactoryError>
    where
        T: Capability + ?Sized,
    {
        self.build_with_fallback(target, Fallback::None)
    }

    pub(crate) fn build_with_fallback<T>(
        self,
        target: RoutingTarget,
        fallback: Fallback<T>,
    ) -> Result<Arc<T>, ClientFactoryError>
    where
        T: Capability + ?Sized,
    {
        let Some(transport) = self.transport else {
            return Err(ClientFactoryError::MissingComponent {
                component: "TransportClient".to_owned(),
                context_id: target.name().to_owned(),
            });
        };

        let interceptors = self
            .scope_interceptors
            .into_iter()
            .chain(self.appended_interceptors)
            .map(Component::into_instance)
            .collect();

        let handler = MethodHandler {
            logger_level: self.logger_level,
            options: self.options,
            retry: self.retry.instance().as_ref().clone(),
            decode404: self.decode404,
            exception_policy: self.exception_policy,
            encoder: self.encoder.into_instance(),
            decoder: self.decoder.into_instance(),
            contract: self.contract.into_instance(),
            error_decoder: self.error_decoder.into_instance(),
            query_map_encoder: self.query_map_encoder.into_instance(),
            interceptors,
            transport: transport.instance().as_ref().clone(),
            setter_factory: self.setter_factory.map(Component::into_instance),
        };

        tracing::info!(
            client = target.name(),
            url = target.url(),
            client_type = target.client_type().name(),
            fallback = fallback.kind(),
            "built client"
        );
        Ok(T::bind(Client::new(target, Arc::new(handler), fallback)))
    }
}

fn duration_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

impl fmt::Debug for ClientBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientBuilder")
            .field("configuration", &self.effective())
            .finish_non_exhaustive()
    }
}
