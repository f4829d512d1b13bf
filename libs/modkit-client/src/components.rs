//! Pluggable client components and their built-in implementations.
//!
//! Components live in client scopes as trait objects (`Arc<dyn Encoder>`, ...)
//! and are picked up by the configuration resolver. Properties refer to them
//! by the names they are registered under; the built-in names are the
//! constants in this module.

use bytes::Bytes;
use http::{HeaderName, HeaderValue, header};
use std::{collections::BTreeMap, sync::Arc, time::Duration};

use crate::builder::ClientBuilder;
use crate::catalog::ComponentCatalog;
use crate::config::{BuilderTemplate, RetryPolicy};
use crate::descriptor::{RoutingTarget, TypeRef};
use crate::error::{BoxError, ClientError};
use crate::request::{Body, RequestTemplate};
use crate::scope::{Scope, ScopeConfiguration};
use crate::transport::Response;

pub const BUILDER_TEMPLATE: &str = "builder-template";
pub const JSON_ENCODER: &str = "json-encoder";
pub const JSON_DECODER: &str = "json-decoder";
pub const DEFAULT_CONTRACT: &str = "default-contract";
pub const DEFAULT_ERROR_DECODER: &str = "default-error-decoder";
pub const FIELD_QUERY_MAP_ENCODER: &str = "field-query-map-encoder";
pub const DEFAULT_RETRYER: &str = "default-retryer";
pub const NEVER_RETRY: &str = "never-retry";
pub const DEFAULT_HEADERS_INTERCEPTOR: &str = "default-request-headers";
pub const DEFAULT_QUERY_INTERCEPTOR: &str = "default-query-parameters";

const BODY_PREVIEW_LIMIT: usize = 256;

/// Turns a structured request body into bytes on the template.
pub trait Encoder: Send + Sync {
    /// # Errors
    /// Returns an error if `body` cannot be represented by this encoder.
    fn encode(&self, body: &serde_json::Value, template: &mut RequestTemplate) -> Result<(), BoxError>;
}

/// Turns a successful (or decoded 404) response into a structured value.
pub trait Decoder: Send + Sync {
    /// # Errors
    /// Returns an error if the body is not valid for this decoder.
    fn decode(&self, response: &Response) -> Result<serde_json::Value, BoxError>;
}

/// Decides which request templates a client accepts.
pub trait Contract: Send + Sync {
    /// # Errors
    /// Returns a description of the violation.
    fn validate(&self, target: &RoutingTarget, template: &RequestTemplate) -> Result<(), String>;
}

/// Maps a non-success response to an error.
pub trait ErrorDecoder: Send + Sync {
    fn decode(&self, method_key: &str, response: &Response) -> ClientError;
}

/// Creates an error decoder for a given client type. Consulted only when no
/// error decoder is registered.
pub trait ErrorDecoderFactory: Send + Sync {
    fn create(&self, client_type: &TypeRef) -> Arc<dyn ErrorDecoder>;
}

/// Mutates every outgoing request template.
pub trait RequestInterceptor: Send + Sync {
    fn apply(&self, template: &mut RequestTemplate);
}

/// Expands a query map value into query parameters.
pub trait QueryMapEncoder: Send + Sync {
    fn encode(&self, value: &serde_json::Value) -> Vec<(String, String)>;
}

/// Last-mile adjustment of a fully configured builder.
pub trait BuilderCustomizer: Send + Sync {
    fn customize(&self, builder: ClientBuilder) -> ClientBuilder;
}

impl<F> BuilderCustomizer for F
where
    F: Fn(ClientBuilder) -> ClientBuilder + Send + Sync,
{
    fn customize(&self, builder: ClientBuilder) -> ClientBuilder {
        self(builder)
    }
}

/// Scope-resident switch controlling how a client scope is resolved.
pub trait ClientConfigurer: Send + Sync {
    /// When false, lookups stay in the client's own scope and property layers are skipped.
    fn inherit_parent_configuration(&self) -> bool {
        true
    }
}

/// [`ClientConfigurer`] with a fixed answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StaticClientConfigurer {
    inherit_parent: bool,
}

impl StaticClientConfigurer {
    #[must_use]
    pub fn inheriting() -> Self {
        Self { inherit_parent: true }
    }

    #[must_use]
    pub fn isolated() -> Self {
        Self { inherit_parent: false }
    }
}

impl ClientConfigurer for StaticClientConfigurer {
    fn inherit_parent_configuration(&self) -> bool {
        self.inherit_parent
    }
}

/// Command metadata attached to fault-tolerant invocations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSetter {
    pub group_key: String,
    pub command_key: String,
}

/// Derives command metadata for each method of a fault-tolerant client.
pub trait SetterFactory: Send + Sync {
    fn create(&self, target: &RoutingTarget, method_key: &str) -> CommandSetter;
}

/// Groups commands by client name and keys them by method.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultSetterFactory;

impl SetterFactory for DefaultSetterFactory {
    fn create(&self, target: &RoutingTarget, method_key: &str) -> CommandSetter {
        CommandSetter {
            group_key: target.name().to_owned(),
            command_key: method_key.to_owned(),
        }
    }
}

/// Encodes bodies as JSON and sets `Content-Type` when the caller has not.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonEncoder;

impl Encoder for JsonEncoder {
    fn encode(&self, body: &serde_json::Value, template: &mut RequestTemplate) -> Result<(), BoxError> {
        let bytes = serde_json::to_vec(body)?;
        template.set_body(Body::Raw(Bytes::from(bytes)));
        template
            .headers_mut()
            .entry(header::CONTENT_TYPE)
            .or_insert(HeaderValue::from_static("application/json"));
        Ok(())
    }
}

/// Decodes JSON bodies; an empty body decodes to `null`.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonDecoder;

impl Decoder for JsonDecoder {
    fn decode(&self, response: &Response) -> Result<serde_json::Value, BoxError> {
        if response.body.is_empty() {
            return Ok(serde_json::Value::Null);
        }
        Ok(serde_json::from_slice(&response.body)?)
    }
}

/// Requires relative paths, and no body on `GET`/`HEAD`.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultContract;

impl Contract for DefaultContract {
    fn validate(&self, target: &RoutingTarget, template: &RequestTemplate) -> Result<(), String> {
        if template.path().contains("://") {
            return Err(format!(
                "{}: path '{}' must be relative to the client url",
                target.name(),
                template.path()
            ));
        }
        let method = template.method();
        if (method == http::Method::GET || method == http::Method::HEAD) && !template.body().is_empty() {
            return Err(format!("{}: {method} requests cannot carry a body", target.name()));
        }
        Ok(())
    }
}

/// Status errors; responses carrying a numeric `Retry-After` become retryable.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultErrorDecoder;

impl ErrorDecoder for DefaultErrorDecoder {
    fn decode(&self, method_key: &str, response: &Response) -> ClientError {
        let retry_after = response
            .headers
            .get(header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<u64>().ok())
            .map(Duration::from_secs);

        if retry_after.is_some() {
            return ClientError::RetryableStatus {
                method_key: method_key.to_owned(),
                status: response.status,
                retry_after,
            };
        }

        let preview = String::from_utf8_lossy(&response.body);
        let body_preview: String = preview.chars().take(BODY_PREVIEW_LIMIT).collect();
        ClientError::Status {
            method_key: method_key.to_owned(),
            status: response.status,
            body_preview,
        }
    }
}

/// Expands each field of an object; arrays become repeated parameters and nulls are skipped.
#[derive(Debug, Clone, Copy, Default)]
pub struct FieldQueryMapEncoder;

impl QueryMapEncoder for FieldQueryMapEncoder {
    fn encode(&self, value: &serde_json::Value) -> Vec<(String, String)> {
        let Some(fields) = value.as_object() else {
            return Vec::new();
        };
        let mut pairs = Vec::new();
        for (name, field) in fields {
            match field {
                serde_json::Value::Null => {}
                serde_json::Value::Array(items) => {
                    pairs.extend(
                        items
                            .iter()
                            .filter(|v| !v.is_null())
                            .map(|v| (name.clone(), scalar_to_string(v))),
                    );
                }
                other => pairs.push((name.clone(), scalar_to_string(other))),
            }
        }
        pairs
    }
}

fn scalar_to_string(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Sets configured headers on every request, replacing existing values.
#[derive(Debug, Clone, Default)]
pub struct HeadersInterceptor {
    headers: Vec<(HeaderName, Vec<HeaderValue>)>,
}

impl HeadersInterceptor {
    /// Entries with an invalid header name or value are dropped with a warning.
    #[must_use]
    pub fn new(headers: &BTreeMap<String, Vec<String>>) -> Self {
        let mut valid = Vec::with_capacity(headers.len());
        for (name, values) in headers {
            let Ok(header_name) = HeaderName::try_from(name.as_str()) else {
                tracing::warn!(header = %name, "dropping default header with invalid name");
                continue;
            };
            let mut header_values = Vec::with_capacity(values.len());
            for value in values {
                match HeaderValue::try_from(value.as_str()) {
                    Ok(v) => header_values.push(v),
                    Err(_) => tracing::warn!(header = %name, "dropping invalid default header value"),
                }
            }
            valid.push((header_name, header_values));
        }
        Self { headers: valid }
    }
}

impl RequestInterceptor for HeadersInterceptor {
    fn apply(&self, template: &mut RequestTemplate) {
        let headers = template.headers_mut();
        for (name, values) in &self.headers {
            headers.remove(name);
            for value in values {
                headers.append(name.clone(), value.clone());
            }
        }
    }
}

/// Sets configured query parameters on every request, replacing existing values.
#[derive(Debug, Clone, Default)]
pub struct QueryParametersInterceptor {
    parameters: BTreeMap<String, Vec<String>>,
}

impl QueryParametersInterceptor {
    #[must_use]
    pub fn new(parameters: BTreeMap<String, Vec<String>>) -> Self {
        Self { parameters }
    }
}

impl RequestInterceptor for QueryParametersInterceptor {
    fn apply(&self, template: &mut RequestTemplate) {
        for (name, values) in &self.parameters {
            template.set_query(name, values);
        }
    }
}

/// Registers the required components every client needs: builder template,
/// JSON encoder and decoder, and the default contract.
///
/// Install it with [`NamedScope::with_default_configuration`](crate::NamedScope::with_default_configuration).
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultClientConfiguration {
    template: BuilderTemplate,
}

impl DefaultClientConfiguration {
    #[must_use]
    pub fn plain() -> Self {
        Self {
            template: BuilderTemplate::Plain,
        }
    }

    #[must_use]
    pub fn fault_tolerant() -> Self {
        Self {
            template: BuilderTemplate::FaultTolerant,
        }
    }
}

impl ScopeConfiguration for DefaultClientConfiguration {
    fn configure(&self, scope: &Scope) {
        scope.register::<BuilderTemplate>(BUILDER_TEMPLATE, Arc::new(self.template));
        scope.register::<dyn Encoder>(JSON_ENCODER, Arc::new(JsonEncoder));
        scope.register::<dyn Decoder>(JSON_DECODER, Arc::new(JsonDecoder));
        scope.register::<dyn Contract>(DEFAULT_CONTRACT, Arc::new(DefaultContract));
        if self.template == BuilderTemplate::FaultTolerant {
            scope.register::<dyn SetterFactory>("default-setter-factory", Arc::new(DefaultSetterFactory));
        }
    }
}

/// Constructors for every built-in component name.
pub fn register_builtin_constructors(catalog: &ComponentCatalog) {
    catalog.register::<dyn Encoder, _>(JSON_ENCODER, || Arc::new(JsonEncoder) as Arc<dyn Encoder>);
    catalog.register::<dyn Decoder, _>(JSON_DECODER, || Arc::new(JsonDecoder) as Arc<dyn Decoder>);
    catalog.register::<dyn Contract, _>(DEFAULT_CONTRACT, || Arc::new(DefaultContract) as Arc<dyn Contract>);
    catalog.register::<dyn ErrorDecoder, _>(DEFAULT_ERROR_DECODER, || {
        Arc::new(DefaultErrorDecoder) as Arc<dyn ErrorDecoder>
    });
    catalog.register::<dyn QueryMapEncoder, _>(FIELD_QUERY_MAP_ENCODER, || {
        Arc::new(FieldQueryMapEncoder) as Arc<dyn QueryMapEncoder>
    });
    catalog.register::<RetryPolicy, _>(DEFAULT_RETRYER, || Arc::new(RetryPolicy::standard()));
    catalog.register::<RetryPolicy, _>(NEVER_RETRY, || Arc::new(RetryPolicy::never()));
}
