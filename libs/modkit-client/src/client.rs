//! The callable produced by [`ClientBuilder`](crate::ClientBuilder).
//!
//! A capability (`dyn UsersApi`) is bound to a [`Client`] through
//! [`Capability::bind`]; each method of the capability builds a
//! [`RequestTemplate`] and hands it to [`Client::execute`] or
//! [`Client::execute_or_fallback`].
//!
//! ```ignore
//! struct UsersHttp(Client<dyn UsersApi>);
//!
//! #[async_trait]
//! impl UsersApi for UsersHttp {
//!     async fn get_user(&self, id: u64) -> Result<User, ClientError> {
//!         self.0
//!             .execute_or_fallback("UsersApi#get_user", RequestTemplate::get(format!("/users/{id}")),
//!                 move |fallback| async move { fallback.get_user(id).await })
//!             .await
//!     }
//! }
//!
//! impl Capability for dyn UsersApi {
//!     fn bind(client: Client<Self>) -> Arc<Self> {
//!         Arc::new(UsersHttp(client))
//!     }
//! }
//! ```

use bytes::Bytes;
use http::StatusCode;
use serde::de::DeserializeOwned;
use std::{fmt, future::Future, sync::Arc, time::Instant};
use tracing::Instrument;

use crate::components::{
    Contract, Decoder, Encoder, ErrorDecoder, QueryMapEncoder, RequestInterceptor, SetterFactory,
};
use crate::config::{ExceptionPolicy, LoggerLevel, RequestOptions, RetryPolicy};
use crate::descriptor::RoutingTarget;
use crate::error::{BoxError, ClientError};
use crate::request::{Body, RequestTemplate};
use crate::transport::{Request, Response, TransportClient};

/// Tracing target for request/response logging.
pub const WIRE_TARGET: &str = "modkit_client::wire";

/// A capability type that can be implemented on top of a [`Client`].
///
/// Implemented for the capability trait object, e.g. `impl Capability for dyn UsersApi`.
pub trait Capability: Send + Sync + 'static {
    fn bind(client: Client<Self>) -> Arc<Self>;
}

/// Produces a fallback delegate from the failure that triggered it.
pub trait FallbackFactory<T: ?Sized>: Send + Sync {
    fn create(&self, cause: &ClientError) -> Arc<T>;
}

impl<T, F> FallbackFactory<T> for F
where
    T: ?Sized,
    F: Fn(&ClientError) -> Arc<T> + Send + Sync,
{
    fn create(&self, cause: &ClientError) -> Arc<T> {
        self(cause)
    }
}

/// Fallback wiring of a built client.
pub enum Fallback<T: ?Sized> {
    None,
    Delegate(Arc<T>),
    Factory(Arc<dyn FallbackFactory<T>>),
}

impl<T: ?Sized> Fallback<T> {
    #[must_use]
    pub fn is_none(&self) -> bool {
        matches!(self, Self::None)
    }

    pub(crate) fn kind(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Delegate(_) => "delegate",
            Self::Factory(_) => "factory",
        }
    }
}

impl<T: ?Sized> Clone for Fallback<T> {
    fn clone(&self) -> Self {
        match self {
            Self::None => Self::None,
            Self::Delegate(d) => Self::Delegate(Arc::clone(d)),
            Self::Factory(f) => Self::Factory(Arc::clone(f)),
        }
    }
}

impl<T: ?Sized> fmt::Debug for Fallback<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.kind())
    }
}

/// Everything a client needs to execute a call, frozen at build time.
pub struct MethodHandler {
    pub(crate) logger_level: LoggerLevel,
    pub(crate) options: RequestOptions,
    pub(crate) retry: RetryPolicy,
    pub(crate) decode404: bool,
    pub(crate) exception_policy: ExceptionPolicy,
    pub(crate) encoder: Arc<dyn Encoder>,
    pub(crate) decoder: Arc<dyn Decoder>,
    pub(crate) contract: Arc<dyn Contract>,
    pub(crate) error_decoder: Arc<dyn ErrorDecoder>,
    pub(crate) query_map_encoder: Arc<dyn QueryMapEncoder>,
    pub(crate) interceptors: Vec<Arc<dyn RequestInterceptor>>,
    pub(crate) transport: TransportClient,
    pub(crate) setter_factory: Option<Arc<dyn SetterFactory>>,
}

impl MethodHandler {
    async fn invoke(
        &self,
        target: &RoutingTarget,
        method_key: &str,
        template: RequestTemplate,
    ) -> Result<serde_json::Value, ClientError> {
        let mut attempt: u32 = 1;
        loop {
            let err = match self.attempt(target, method_key, template.clone()).await {
                Ok(value) => return Ok(value),
                Err(err) => err,
            };
            if !err.is_retryable() {
                return Err(err);
            }
            if attempt >= self.retry.max_attempts {
                return Err(self.give_up(method_key, attempt, err));
            }

            let delay = err
                .retry_after()
                .unwrap_or_else(|| self.retry.backoff.delay_for(attempt));
            tracing::debug!(
                client = target.name(),
                method_key,
                attempt,
                delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                error = %err,
                "retrying call"
            );
            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }

    fn give_up(&self, method_key: &str, attempts: u32, err: ClientError) -> ClientError {
        if attempts <= 1 || self.exception_policy == ExceptionPolicy::Unwrap {
            return err;
        }
        ClientError::RetriesExhausted {
            method_key: method_key.to_owned(),
            attempts,
            source: Box::new(err),
        }
    }

    async fn attempt(
        &self,
        target: &RoutingTarget,
        method_key: &str,
        mut template: RequestTemplate,
    ) -> Result<serde_json::Value, ClientError> {
        if let Some(query_map) = template.take_query_map() {
            for (name, value) in self.query_map_encoder.encode(&query_map) {
                template.add_query(name, value);
            }
        }
        if let Body::Value(value) = template.body() {
            let value = value.clone();
            self.encoder
                .encode(&value, &mut template)
                .map_err(|source| ClientError::Encode {
                    method_key: method_key.to_owned(),
                    source,
                })?;
        }
        for interceptor in &self.interceptors {
            interceptor.apply(&mut template);
        }
        self.contract
            .validate(target, &template)
            .map_err(ClientError::Contract)?;

        let request = to_request(target, method_key, &template)?;
        self.log_request(target, method_key, &request);

        let started = Instant::now();
        let response = match self.transport.send(request, &self.options).await {
            Ok(response) => response,
            Err(source) => {
                if self.logger_level != LoggerLevel::None {
                    tracing::debug!(
                        target: WIRE_TARGET,
                        client = target.name(),
                        method_key,
                        elapsed_ms = elapsed_ms(started),
                        error = %source,
                        "<--- ERROR"
                    );
                }
                return Err(ClientError::Transport {
                    method_key: method_key.to_owned(),
                    source,
                });
            }
        };
        self.log_response(target, method_key, &response, started);
        self.decode(method_key, &response)
    }

    fn decode(&self, method_key: &str, response: &Response) -> Result<serde_json::Value, ClientError> {
        let status = response.status;
        if status.is_success() || (status == StatusCode::NOT_FOUND && self.decode404) {
            return self
                .decoder
                .decode(response)
                .map_err(|source| ClientError::Decode {
                    method_key: method_key.to_owned(),
                    source,
                });
        }
        Err(self.error_decoder.decode(method_key, response))
    }

    fn log_request(&self, target: &RoutingTarget, method_key: &str, request: &Request) {
        if self.logger_level == LoggerLevel::None {
            return;
        }
        tracing::debug!(
            target: WIRE_TARGET,
            client = target.name(),
            method_key,
            method = %request.method,
            url = %request.url,
            "---> request"
        );
        if self.logger_level.logs_headers() {
            for (name, value) in &request.headers {
                tracing::debug!(target: WIRE_TARGET, method_key, header = %name, value = ?value, "---> header");
            }
        }
        if self.logger_level.logs_bodies() && !request.body.is_empty() {
            tracing::debug!(
                target: WIRE_TARGET,
                method_key,
                bytes = request.body.len(),
                body = %String::from_utf8_lossy(&request.body),
                "---> body"
            );
        }
    }

    fn log_response(&self, target: &RoutingTarget, method_key: &str, response: &Response, started: Instant) {
        if self.logger_level == LoggerLevel::None {
            return;
        }
        tracing::debug!(
            target: WIRE_TARGET,
            client = target.name(),
            method_key,
            status = response.status.as_u16(),
            elapsed_ms = elapsed_ms(started),
            "<--- response"
        );
        if self.logger_level.logs_headers() {
            for (name, value) in &response.headers {
                tracing::debug!(target: WIRE_TARGET, method_key, header = %name, value = ?value, "<--- header");
            }
        }
        if self.logger_level.logs_bodies() && !response.body.is_empty() {
            tracing::debug!(
                target: WIRE_TARGET,
                method_key,
                bytes = response.body.len(),
                body = %String::from_utf8_lossy(&response.body),
                "<--- body"
            );
        }
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}

fn to_request(target: &RoutingTarget, method_key: &str, template: &RequestTemplate) -> Result<Request, ClientError> {
    let url = template.resolve_url(target.url())?;
    let body = match template.body() {
        Body::Empty => Bytes::new(),
        Body::Raw(bytes) => bytes.clone(),
        Body::Value(_) => {
            return Err(ClientError::Encode {
                method_key: method_key.to_owned(),
                source: BoxError::from("encoder left the body unencoded"),
            });
        }
    };
    Ok(Request {
        method: template.method().clone(),
        url,
        headers: template.headers().clone(),
        body,
    })
}

/// A built client bound to one routing target.
pub struct Client<T: ?Sized> {
    target: RoutingTarget,
    handler: Arc<MethodHandler>,
    fallback: Fallback<T>,
}

impl<T: ?Sized> Clone for Client<T> {
    fn clone(&self) -> Self {
        Self {
            target: self.target.clone(),
            handler: Arc::clone(&self.handler),
            fallback: self.fallback.clone(),
        }
    }
}

impl<T: ?Sized> fmt::Debug for Client<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client")
            .field("target", &self.target)
            .field("fallback", &self.fallback)
            .finish_non_exhaustive()
    }
}

impl<T: ?Sized> Client<T> {
    pub(crate) fn new(target: RoutingTarget, handler: Arc<MethodHandler>, fallback: Fallback<T>) -> Self {
        Self {
            target,
            handler,
            fallback,
        }
    }

    #[must_use]
    pub fn target(&self) -> &RoutingTarget {
        &self.target
    }

    #[must_use]
    pub fn has_fallback(&self) -> bool {
        !self.fallback.is_none()
    }

    #[must_use]
    pub fn options(&self) -> RequestOptions {
        self.handler.options
    }

    #[must_use]
    pub fn logger_level(&self) -> LoggerLevel {
        self.handler.logger_level
    }

    /// Execute the call and decode the result.
    ///
    /// # Errors
    /// Transport, status, contract and decoding failures after the retry policy gave up.
    pub async fn execute<R>(&self, method_key: &str, template: RequestTemplate) -> Result<R, ClientError>
    where
        R: DeserializeOwned,
    {
        let value = self.handler.invoke(&self.target, method_key, template).await?;
        serde_json::from_value(value).map_err(|e| ClientError::Decode {
            method_key: method_key.to_owned(),
            source: Box::new(e),
        })
    }

    /// Execute the call; on failure delegate to the fallback, if one is wired.
    ///
    /// `fallback` receives the delegate (the registered fallback, or the one a
    /// fallback factory produced for this failure) and performs the matching call.
    ///
    /// # Errors
    /// The call's error when no fallback is wired, otherwise whatever the fallback returns.
    pub async fn execute_or_fallback<R, F, Fut>(
        &self,
        method_key: &str,
        template: RequestTemplate,
        fallback: F,
    ) -> Result<R, ClientError>
    where
        R: DeserializeOwned,
        F: FnOnce(Arc<T>) -> Fut,
        Fut: Future<Output = Result<R, ClientError>>,
    {
        let span = if let Some(factory) = &self.handler.setter_factory {
            let setter = factory.create(&self.target, method_key);
            tracing::debug_span!(
                "client_command",
                group = %setter.group_key,
                command = %setter.command_key
            )
        } else {
            tracing::Span::none()
        };

        async move {
            let err = match self.execute::<R>(method_key, template).await {
                Ok(value) => return Ok(value),
                Err(err) => err,
            };
            let delegate = match &self.fallback {
                Fallback::None => return Err(err),
                Fallback::Delegate(delegate) => Arc::clone(delegate),
                Fallback::Factory(factory) => factory.create(&err),
            };
            tracing::warn!(
                client = self.target.name(),
                method_key,
                error = %err,
                "call failed, delegating to fallback"
            );
            fallback(delegate).await
        }
        .instrument(span)
        .await
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use crate::builder::ClientBuilder;
    use crate::components::{
        DEFAULT_CONTRACT, DefaultContract, JSON_DECODER, JSON_ENCODER, JsonDecoder, JsonEncoder,
    };
    use crate::config::{BuilderTemplate, ExponentialBackoff};
    use crate::descriptor::TypeRef;
    use crate::error::TransportError;
    use crate::scope::Component;
    use crate::transport::Transport;
    use async_trait::async_trait;
    use http::{HeaderValue, header};
    use parking_lot::Mutex;
    use serde::Deserialize;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Debug, Deserialize, PartialEq)]
    struct User {
        id: u64,
        name: String,
    }

    #[async_trait]
    trait UsersApi: Send + Sync {
        async fn get_user(&self, id: u64) -> Result<User, ClientError>;
        async fn find_user(&self, id: u64) -> Result<Option<User>, ClientError>;
    }

    struct UsersHttp(Client<dyn UsersApi>);

    #[async_trait]
    impl UsersApi for UsersHttp {
        async fn get_user(&self, id: u64) -> Result<User, ClientError> {
            self.0
                .execute_or_fallback(
                    "UsersApi#get_user",
                    RequestTemplate::get(format!("/users/{id}")),
                    move |fallback| async move { fallback.get_user(id).await },
                )
                .await
        }

        async fn find_user(&self, id: u64) -> Result<Option<User>, ClientError> {
            self.0
                .execute("UsersApi#find_user", RequestTemplate::get(format!("/users/{id}")))
                .await
        }
    }

    impl Capability for dyn UsersApi {
        fn bind(client: Client<Self>) -> Arc<Self> {
            Arc::new(UsersHttp(client))
        }
    }

    /// Replays scripted responses and records every request.
    #[derive(Default)]
    struct Scripted {
        responses: Mutex<VecDeque<Result<Response, TransportError>>>,
        requests: Mutex<Vec<Request>>,
    }

    impl Scripted {
        fn new(responses: Vec<Result<Response, TransportError>>) -> Arc<Self> {
            Arc::new(Self {
                responses: Mutex::new(responses.into()),
                requests: Mutex::new(Vec::new()),
            })
        }

        fn calls(&self) -> usize {
            self.requests.lock().len()
        }
    }

    #[async_trait]
    impl Transport for Scripted {
        async fn send(&self, request: Request, _options: &RequestOptions) -> Result<Response, TransportError> {
            self.requests.lock().push(request);
            self.responses
                .lock()
                .pop_front()
                .unwrap_or_else(|| Err(TransportError::NoInstance("script exhausted".to_owned())))
        }
    }

    fn ok_user() -> Result<Response, TransportError> {
        Ok(Response::new(StatusCode::OK).with_body(r#"{"id":7,"name":"ann"}"#))
    }

    fn unavailable() -> Result<Response, TransportError> {
        Err(TransportError::Connection("connection refused".into()))
    }

    fn builder(transport: Arc<Scripted>) -> ClientBuilder {
        ClientBuilder::new(
            BuilderTemplate::FaultTolerant,
            Component::new(JSON_ENCODER, Arc::new(JsonEncoder)),
            Component::new(JSON_DECODER, Arc::new(JsonDecoder)),
            Component::new(DEFAULT_CONTRACT, Arc::new(DefaultContract)),
        )
        .transport(Component::new(
            "scripted",
            Arc::new(TransportClient::direct(transport)),
        ))
    }

    fn target() -> RoutingTarget {
        RoutingTarget::new(
            TypeRef::interface::<dyn UsersApi>(),
            "users",
            "http://users.local/api",
        )
    }

    fn fast_retry(max_attempts: u32) -> Component<RetryPolicy> {
        Component::new(
            "fast",
            Arc::new(
                RetryPolicy::never()
                    .with_max_attempts(max_attempts)
                    .with_backoff(ExponentialBackoff::fast()),
            ),
        )
    }

    struct StaticUsers;

    #[async_trait]
    impl UsersApi for StaticUsers {
        async fn get_user(&self, id: u64) -> Result<User, ClientError> {
            Ok(User {
                id,
                name: "fallback".to_owned(),
            })
        }

        async fn find_user(&self, _id: u64) -> Result<Option<User>, ClientError> {
            Ok(None)
        }
    }

    #[tokio::test]
    async fn successful_call_is_decoded() {
        let transport = Scripted::new(vec![ok_user()]);
        let api: Arc<dyn UsersApi> = builder(Arc::clone(&transport)).build(target()).unwrap();

        let user = api.get_user(7).await.unwrap();
        assert_eq!(user, User { id: 7, name: "ann".to_owned() });

        let requests = transport.requests.lock();
        assert_eq!(requests[0].url.as_str(), "http://users.local/api/users/7");
        assert_eq!(requests[0].method, http::Method::GET);
    }

    #[tokio::test]
    async fn transport_failure_without_fallback_surfaces() {
        let transport = Scripted::new(vec![unavailable()]);
        let api: Arc<dyn UsersApi> = builder(transport).build(target()).unwrap();

        let err = api.get_user(7).await.unwrap_err();
        assert!(matches!(err, ClientError::Transport { .. }));
    }

    #[tokio::test]
    async fn fallback_delegate_replaces_failure() {
        let transport = Scripted::new(vec![unavailable()]);
        let api: Arc<dyn UsersApi> = builder(transport)
            .build_with_fallback(target(), Fallback::Delegate(Arc::new(StaticUsers) as Arc<dyn UsersApi>))
            .unwrap();

        let user = api.get_user(3).await.unwrap();
        assert_eq!(user.name, "fallback");
        assert_eq!(user.id, 3);
    }

    #[tokio::test]
    async fn fallback_factory_sees_the_cause() {
        let seen = Arc::new(AtomicUsize::new(0));
        let seen_in_factory = Arc::clone(&seen);
        let factory = move |cause: &ClientError| -> Arc<dyn UsersApi> {
            if cause.status() == Some(StatusCode::BAD_GATEWAY) {
                seen_in_factory.fetch_add(1, Ordering::SeqCst);
            }
            Arc::new(StaticUsers)
        };

        let transport = Scripted::new(vec![Ok(Response::new(StatusCode::BAD_GATEWAY))]);
        let api: Arc<dyn UsersApi> = builder(transport)
            .build_with_fallback(target(), Fallback::Factory(Arc::new(factory)))
            .unwrap();

        assert_eq!(api.get_user(1).await.unwrap().name, "fallback");
        assert_eq!(seen.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn retryable_failures_are_retried_until_success() {
        let transport = Scripted::new(vec![unavailable(), unavailable(), ok_user()]);
        let api: Arc<dyn UsersApi> = builder(Arc::clone(&transport))
            .retry(fast_retry(3))
            .build(target())
            .unwrap();

        assert_eq!(api.get_user(7).await.unwrap().id, 7);
        assert_eq!(transport.calls(), 3);
    }

    #[tokio::test]
    async fn exhausted_retries_follow_exception_policy() {
        let transport = Scripted::new(vec![unavailable(), unavailable()]);
        let api: Arc<dyn UsersApi> = builder(Arc::clone(&transport))
            .retry(fast_retry(2))
            .build(target())
            .unwrap();
        match api.get_user(7).await.unwrap_err() {
            ClientError::RetriesExhausted { attempts, source, .. } => {
                assert_eq!(attempts, 2);
                assert!(matches!(*source, ClientError::Transport { .. }));
            }
            other => panic!("unexpected error: {other}"),
        }

        let transport = Scripted::new(vec![unavailable(), unavailable()]);
        let api: Arc<dyn UsersApi> = builder(transport)
            .retry(fast_retry(2))
            .exception_policy(ExceptionPolicy::Unwrap)
            .build(target())
            .unwrap();
        assert!(matches!(
            api.get_user(7).await.unwrap_err(),
            ClientError::Transport { .. }
        ));
    }

    #[tokio::test]
    async fn non_retryable_status_is_not_retried() {
        let transport = Scripted::new(vec![Ok(Response::new(StatusCode::BAD_REQUEST)), ok_user()]);
        let api: Arc<dyn UsersApi> = builder(Arc::clone(&transport))
            .retry(fast_retry(3))
            .build(target())
            .unwrap();

        let err = api.get_user(7).await.unwrap_err();
        assert_eq!(err.status(), Some(StatusCode::BAD_REQUEST));
        assert_eq!(transport.calls(), 1);
    }

    #[tokio::test]
    async fn decode404_turns_not_found_into_value() {
        let transport = Scripted::new(vec![Ok(Response::new(StatusCode::NOT_FOUND))]);
        let api: Arc<dyn UsersApi> = builder(transport).decode404().build(target()).unwrap();
        assert_eq!(api.find_user(9).await.unwrap(), None);

        let transport = Scripted::new(vec![Ok(Response::new(StatusCode::NOT_FOUND))]);
        let api: Arc<dyn UsersApi> = builder(transport).build(target()).unwrap();
        let err = api.find_user(9).await.unwrap_err();
        assert_eq!(err.status(), Some(StatusCode::NOT_FOUND));
    }

    #[tokio::test]
    async fn interceptors_run_in_builder_order() {
        struct Header(&'static str);
        impl RequestInterceptor for Header {
            fn apply(&self, template: &mut RequestTemplate) {
                template
                    .headers_mut()
                    .append("x-order", HeaderValue::from_static(self.0));
            }
        }

        let transport = Scripted::new(vec![ok_user()]);
        let api: Arc<dyn UsersApi> = builder(Arc::clone(&transport))
            .request_interceptor(Component::new("c", Arc::new(Header("c"))))
            .request_interceptors(vec![
                Component::new("b", Arc::new(Header("b"))),
                Component::new("a", Arc::new(Header("a"))),
            ])
            .build(target())
            .unwrap();
        api.get_user(7).await.unwrap();

        let requests = transport.requests.lock();
        let order: Vec<&str> = requests[0]
            .headers
            .get_all("x-order")
            .iter()
            .map(|v| v.to_str().unwrap())
            .collect();
        assert_eq!(order, vec!["b", "a", "c"]);
    }

    #[tokio::test]
    async fn json_bodies_are_encoded() {
        let transport = Scripted::new(vec![Ok(Response::new(StatusCode::NO_CONTENT))]);
        let client = Client::<dyn UsersApi>::new(
            target(),
            Arc::new(handler_for(Arc::clone(&transport))),
            Fallback::None,
        );
        let template = RequestTemplate::post("/users").json(serde_json::json!({ "name": "ann" }));
        client.execute::<()>("UsersApi#create", template).await.unwrap();

        let requests = transport.requests.lock();
        assert_eq!(requests[0].body, Bytes::from_static(br#"{"name":"ann"}"#));
        assert_eq!(requests[0].headers[header::CONTENT_TYPE], "application/json");
    }

    #[tokio::test]
    async fn contract_violations_never_reach_the_transport() {
        let transport = Scripted::new(vec![ok_user()]);
        let client = Client::<dyn UsersApi>::new(
            target(),
            Arc::new(handler_for(Arc::clone(&transport))),
            Fallback::None,
        );
        let err = client
            .execute::<User>("UsersApi#get", RequestTemplate::get("http://evil/users"))
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::Contract(_)));
        assert_eq!(transport.calls(), 0);
    }

    #[tokio::test]
    async fn missing_transport_is_a_missing_component() {
        let err = ClientBuilder::new(
            BuilderTemplate::Plain,
            Component::new(JSON_ENCODER, Arc::new(JsonEncoder)),
            Component::new(JSON_DECODER, Arc::new(JsonDecoder)),
            Component::new(DEFAULT_CONTRACT, Arc::new(DefaultContract)),
        )
        .build::<dyn UsersApi>(target())
        .err().unwrap();
        assert!(matches!(
            err,
            crate::ClientFactoryError::MissingComponent { ref component, .. } if component == "TransportClient"
        ));
    }

    #[tracing_test::traced_test]
    #[tokio::test]
    async fn wire_logging_follows_logger_level() {
        let transport = Scripted::new(vec![ok_user()]);
        let api: Arc<dyn UsersApi> = builder(transport)
            .logger_level(LoggerLevel::Full)
            .build(target())
            .unwrap();
        api.get_user(7).await.unwrap();

        assert!(logs_contain("---> request"));
        assert!(logs_contain("<--- response"));
        assert!(logs_contain("<--- body"));
    }

    fn handler_for(transport: Arc<Scripted>) -> MethodHandler {
        MethodHandler {
            logger_level: LoggerLevel::None,
            options: RequestOptions::default(),
            retry: RetryPolicy::never(),
            decode404: false,
            exception_policy: ExceptionPolicy::None,
            encoder: Arc::new(JsonEncoder),
            decoder: Arc::new(JsonDecoder),
            contract: Arc::new(DefaultContract),
            error_decoder: Arc::new(crate::components::DefaultErrorDecoder),
            query_map_encoder: Arc::new(crate::components::FieldQueryMapEncoder),
            interceptors: Vec::new(),
            transport: TransportClient::direct(transport),
            setter_factory: None,
        }
    }

    #[test]
    fn fallback_kinds() {
        let none: Fallback<dyn UsersApi> = Fallback::None;
        assert!(none.is_none());
        let delegate: Fallback<dyn UsersApi> = Fallback::Delegate(Arc::new(StaticUsers));
        assert_eq!(delegate.kind(), "delegate");
        assert!(!delegate.is_none());
    }
}
