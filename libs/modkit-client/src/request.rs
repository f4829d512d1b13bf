use bytes::Bytes;
use http::{HeaderMap, HeaderName, HeaderValue, Method};
use url::Url;

use crate::error::ClientError;

/// Request body before encoding.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum Body {
    #[default]
    Empty,
    /// Already encoded bytes, sent as-is
    Raw(Bytes),
    /// Structured value, turned into bytes by the configured encoder
    Value(serde_json::Value),
}

impl Body {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Empty => true,
            Self::Raw(bytes) => bytes.is_empty(),
            Self::Value(_) => false,
        }
    }
}

/// Description of one call relative to the client's routing target.
///
/// Capability implementations build a template per method; interceptors and
/// encoders then mutate it before it is turned into a transport request.
///
/// # Example
///
/// ```ignore
/// let template = RequestTemplate::get("/users/{id}")
///     .query("expand", "profile")
///     .header(http::header::ACCEPT, HeaderValue::from_static("application/json"));
/// ```
#[derive(Debug, Clone)]
pub struct RequestTemplate {
    method: Method,
    path: String,
    queries: Vec<(String, String)>,
    headers: HeaderMap,
    body: Body,
    query_map: Option<serde_json::Value>,
}

impl RequestTemplate {
    #[must_use]
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            queries: Vec::new(),
            headers: HeaderMap::new(),
            body: Body::Empty,
            query_map: None,
        }
    }

    #[must_use]
    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    #[must_use]
    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    #[must_use]
    pub fn put(path: impl Into<String>) -> Self {
        Self::new(Method::PUT, path)
    }

    #[must_use]
    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::DELETE, path)
    }

    #[must_use]
    pub fn query(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.add_query(name, value);
        self
    }

    #[must_use]
    pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.append(name, value);
        self
    }

    /// Structured body, encoded by the client's encoder.
    #[must_use]
    pub fn json(mut self, value: serde_json::Value) -> Self {
        self.body = Body::Value(value);
        self
    }

    /// Pre-encoded body.
    #[must_use]
    pub fn raw(mut self, bytes: impl Into<Bytes>) -> Self {
        self.body = Body::Raw(bytes.into());
        self
    }

    /// Object whose fields are expanded into query parameters by the query map encoder.
    #[must_use]
    pub fn query_map(mut self, value: serde_json::Value) -> Self {
        self.query_map = Some(value);
        self
    }

    #[must_use]
    pub fn method(&self) -> &Method {
        &self.method
    }

    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    #[must_use]
    pub fn queries(&self) -> &[(String, String)] {
        &self.queries
    }

    #[must_use]
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    #[must_use]
    pub fn body(&self) -> &Body {
        &self.body
    }

    pub fn set_body(&mut self, body: Body) {
        self.body = body;
    }

    pub fn add_query(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.queries.push((name.into(), value.into()));
    }

    /// Replace every value of `name` with `values`.
    pub fn set_query(&mut self, name: &str, values: &[String]) {
        self.queries.retain(|(n, _)| n != name);
        self.queries
            .extend(values.iter().map(|v| (name.to_owned(), v.clone())));
    }

    #[must_use]
    pub fn has_query(&self, name: &str) -> bool {
        self.queries.iter().any(|(n, _)| n == name)
    }

    pub fn take_query_map(&mut self) -> Option<serde_json::Value> {
        self.query_map.take()
    }

    /// Join the template onto `base` (the routing target URL).
    pub(crate) fn resolve_url(&self, base: &str) -> Result<Url, ClientError> {
        let raw = join_path(base, &self.path);
        let mut url = Url::parse(&raw).map_err(|source| ClientError::InvalidUrl { url: raw, source })?;
        if !self.queries.is_empty() {
            let mut pairs = url.query_pairs_mut();
            for (name, value) in &self.queries {
                pairs.append_pair(name, value);
            }
        }
        Ok(url)
    }
}

fn join_path(base: &str, path: &str) -> String {
    if path.is_empty() {
        return base.to_owned();
    }
    let base = base.trim_end_matches('/');
    if path.starts_with('/') {
        format!("{base}{path}")
    } else {
        format!("{base}/{path}")
    }
}
