#![allow(clippy::unwrap_used, clippy::expect_used)]
#![allow(dead_code)]

use async_trait::async_trait;
use http::{HeaderValue, StatusCode};
use modkit_client::{
    Capability, Client, ClientError, ClientFactory, ClientProperties, DefaultClientConfiguration,
    FallbackFactory, NamedScope, Request, RequestInterceptor, RequestOptions, RequestTemplate,
    Response, Transport, TransportClient, TransportError,
};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: u64,
    pub name: String,
}

#[async_trait]
pub trait UsersApi: Send + Sync {
    async fn get_user(&self, id: u64) -> Result<User, ClientError>;
    async fn search(&self, name: &str) -> Result<Vec<User>, ClientError>;
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

    async fn search(&self, name: &str) -> Result<Vec<User>, ClientError> {
        let owned = name.to_owned();
        self.0
            .execute_or_fallback(
                "UsersApi#search",
                RequestTemplate::get("/users").query_map(serde_json::json!({ "name": name })),
                move |fallback| async move { fallback.search(&owned).await },
            )
            .await
    }
}

impl Capability for dyn UsersApi {
    fn bind(client: Client<Self>) -> Arc<Self> {
        Arc::new(UsersHttp(client))
    }
}

/// Fallback answering every call with a fixed user.
pub struct StaticUsers;

#[async_trait]
impl UsersApi for StaticUsers {
    async fn get_user(&self, id: u64) -> Result<User, ClientError> {
        Ok(User {
            id,
            name: "fallback".to_owned(),
        })
    }

    async fn search(&self, _name: &str) -> Result<Vec<User>, ClientError> {
        Ok(Vec::new())
    }
}

/// Fallback factory remembering the error it was created for.
#[derive(Default)]
pub struct CauseRecordingFactory {
    pub causes: Mutex<Vec<String>>,
}

impl FallbackFactory<dyn UsersApi> for CauseRecordingFactory {
    fn create(&self, cause: &ClientError) -> Arc<dyn UsersApi> {
        self.causes.lock().push(cause.to_string());
        Arc::new(StaticUsers)
    }
}

/// Transport answering every request with the same response, recording what it saw.
pub struct RecordingTransport {
    status: StatusCode,
    body: &'static str,
    pub requests: Mutex<Vec<Request>>,
    pub options: Mutex<Vec<RequestOptions>>,
}

impl RecordingTransport {
    pub fn responding(status: StatusCode, body: &'static str) -> Arc<Self> {
        Arc::new(Self {
            status,
            body,
            requests: Mutex::new(Vec::new()),
            options: Mutex::new(Vec::new()),
        })
    }

    pub fn ok_user() -> Arc<Self> {
        Self::responding(StatusCode::OK, r#"{"id":7,"name":"ann"}"#)
    }

    pub fn calls(&self) -> usize {
        self.requests.lock().len()
    }

    pub fn urls(&self) -> Vec<String> {
        self.requests.lock().iter().map(|r| r.url.to_string()).collect()
    }

    pub fn header_values(&self, index: usize, name: &str) -> Vec<String> {
        self.requests.lock()[index]
            .headers
            .get_all(name)
            .iter()
            .map(|v| v.to_str().unwrap().to_owned())
            .collect()
    }
}

#[async_trait]
impl Transport for RecordingTransport {
    async fn send(&self, request: Request, options: &RequestOptions) -> Result<Response, TransportError> {
        self.requests.lock().push(request);
        self.options.lock().push(*options);
        Ok(Response::new(self.status).with_body(self.body))
    }
}

/// Transport that refuses every connection.
#[derive(Default)]
pub struct FailingTransport {
    pub attempts: AtomicUsize,
}

impl FailingTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Transport for FailingTransport {
    async fn send(&self, _request: Request, _options: &RequestOptions) -> Result<Response, TransportError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        Err(TransportError::Connection("connection refused".into()))
    }
}

/// Interceptor appending its tag to the `x-tag` header.
pub struct Tag(pub &'static str);

impl RequestInterceptor for Tag {
    fn apply(&self, template: &mut RequestTemplate) {
        template
            .headers_mut()
            .append("x-tag", HeaderValue::from_static(self.0));
    }
}

pub fn fault_tolerant_scopes() -> NamedScope {
    NamedScope::new().with_default_configuration(DefaultClientConfiguration::fault_tolerant())
}

pub fn plain_scopes() -> NamedScope {
    NamedScope::new().with_default_configuration(DefaultClientConfiguration::plain())
}

/// Factory whose parent scope routes every client through `transport`.
pub fn factory_with(scopes: NamedScope, properties: ClientProperties, transport: Arc<dyn Transport>) -> ClientFactory {
    let factory = ClientFactory::new(scopes, properties);
    factory
        .scopes()
        .parent()
        .register::<TransportClient>("test-transport", Arc::new(TransportClient::direct(transport)));
    factory
}
