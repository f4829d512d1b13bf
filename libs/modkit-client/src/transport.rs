//! Transport seam and load-balancer unwrapping.
//!
//! The HTTP transport itself lives outside this crate; clients talk to it
//! through [`Transport`]. A [`TransportClient`] is either a direct transport
//! or a load-balancing decorator around another client.

use async_trait::async_trait;
use bytes::Bytes;
use http::{HeaderMap, Method, StatusCode};
use std::{fmt, sync::Arc};
use url::Url;

use crate::config::RequestOptions;
use crate::descriptor::RoutingTarget;
use crate::error::TransportError;

/// Fully built request handed to the transport.
#[derive(Debug, Clone)]
pub struct Request {
    pub method: Method,
    pub url: Url,
    pub headers: HeaderMap,
    pub body: Bytes,
}

/// Raw response returned by the transport.
#[derive(Debug, Clone)]
pub struct Response {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl Response {
    #[must_use]
    pub fn new(status: StatusCode) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            body: Bytes::new(),
        }
    }

    #[must_use]
    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    #[must_use]
    pub fn with_header(mut self, name: http::HeaderName, value: http::HeaderValue) -> Self {
        self.headers.append(name, value);
        self
    }
}

/// Sends one request. Implementations enforce the timeouts in `options`.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: Request, options: &RequestOptions) -> Result<Response, TransportError>;
}

/// Flavour of a load-balancing decorator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum LoadBalancerKind {
    Legacy,
    Blocking,
    RetryableBlocking,
}

/// The client a routing target is dispatched through.
#[derive(Clone)]
pub enum TransportClient {
    /// Sends straight to the request URL
    Direct(Arc<dyn Transport>),
    /// Resolves the service name to an instance, then sends through `delegate`
    LoadBalanced {
        kind: LoadBalancerKind,
        balancer: Arc<dyn Transport>,
        delegate: Box<TransportClient>,
    },
}

impl TransportClient {
    #[must_use]
    pub fn direct(transport: Arc<dyn Transport>) -> Self {
        Self::Direct(transport)
    }

    #[must_use]
    pub fn load_balanced(kind: LoadBalancerKind, balancer: Arc<dyn Transport>, delegate: TransportClient) -> Self {
        Self::LoadBalanced {
            kind,
            balancer,
            delegate: Box::new(delegate),
        }
    }

    #[must_use]
    pub fn is_direct(&self) -> bool {
        matches!(self, Self::Direct(_))
    }

    /// Outermost load-balancer kind, if any.
    #[must_use]
    pub fn kind(&self) -> Option<LoadBalancerKind> {
        match self {
            Self::Direct(_) => None,
            Self::LoadBalanced { kind, .. } => Some(*kind),
        }
    }

    /// Strip every load-balancing layer, leaving the direct transport.
    #[must_use]
    pub fn into_direct(self) -> Self {
        let mut current = self;
        loop {
            match current {
                Self::Direct(_) => return current,
                Self::LoadBalanced { delegate, .. } => current = *delegate,
            }
        }
    }

    /// Send through this client. Load-balanced clients dispatch through their
    /// balancer, which owns instance selection and delegation.
    ///
    /// # Errors
    /// Whatever the underlying transport reports.
    pub async fn send(&self, request: Request, options: &RequestOptions) -> Result<Response, TransportError> {
        match self {
            Self::Direct(transport) => transport.send(request, options).await,
            Self::LoadBalanced { balancer, .. } => balancer.send(request, options).await,
        }
    }
}

impl fmt::Debug for TransportClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Direct(_) => f.write_str("Direct"),
            Self::LoadBalanced { kind, delegate, .. } => f
                .debug_struct("LoadBalanced")
                .field("kind", kind)
                .field("delegate", delegate)
                .finish_non_exhaustive(),
        }
    }
}

/// With a fixed URL there is nothing to balance: return the direct transport
/// underneath any load-balancing layers. A direct client is returned unchanged.
#[must_use]
pub fn unwrap_client_chain(client: TransportClient, target: &RoutingTarget) -> TransportClient {
    if let Some(kind) = client.kind() {
        tracing::debug!(
            client = target.name(),
            url = target.url(),
            ?kind,
            "fixed url configured, bypassing load balancer"
        );
    }
    client.into_direct()
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use crate::descriptor::TypeRef;

    struct Fixed(StatusCode);

    #[async_trait]
    impl Transport for Fixed {
        async fn send(&self, _request: Request, _options: &RequestOptions) -> Result<Response, TransportError> {
            Ok(Response::new(self.0))
        }
    }

    fn request() -> Request {
        Request {
            method: Method::GET,
            url: Url::parse("http://users/ping").unwrap(),
            headers: HeaderMap::new(),
            body: Bytes::new(),
        }
    }

    fn target() -> RoutingTarget {
        RoutingTarget::new(TypeRef::late_bound("app::UsersApi", crate::TypeShape::Interface), "users", "http://localhost:8080")
    }

    #[tokio::test]
    async fn unwrapping_nested_balancers_reaches_direct_transport() {
        let direct: Arc<dyn Transport> = Arc::new(Fixed(StatusCode::OK));
        let balancer: Arc<dyn Transport> = Arc::new(Fixed(StatusCode::SERVICE_UNAVAILABLE));
        let chain = TransportClient::load_balanced(
            LoadBalancerKind::RetryableBlocking,
            Arc::clone(&balancer),
            TransportClient::load_balanced(LoadBalancerKind::Blocking, balancer, TransportClient::direct(direct)),
        );

        let options = RequestOptions::default();
        assert_eq!(
            chain.send(request(), &options).await.unwrap().status,
            StatusCode::SERVICE_UNAVAILABLE
        );

        let unwrapped = unwrap_client_chain(chain, &target());
        assert!(unwrapped.is_direct());
        assert_eq!(unwrapped.send(request(), &options).await.unwrap().status, StatusCode::OK);
    }

    #[test]
    fn direct_client_is_returned_unchanged() {
        let direct: Arc<dyn Transport> = Arc::new(Fixed(StatusCode::OK));
        let client = TransportClient::direct(Arc::clone(&direct));
        match unwrap_client_chain(client, &target()) {
            TransportClient::Direct(inner) => assert!(Arc::ptr_eq(&inner, &direct)),
            TransportClient::LoadBalanced { .. } => panic!("expected direct client"),
        }
    }

    #[test]
    fn every_kind_is_unwrapped() {
        for kind in [
            LoadBalancerKind::Legacy,
            LoadBalancerKind::Blocking,
            LoadBalancerKind::RetryableBlocking,
        ] {
            let balancer: Arc<dyn Transport> = Arc::new(Fixed(StatusCode::OK));
            let client = TransportClient::load_balanced(
                kind,
                Arc::clone(&balancer),
                TransportClient::direct(Arc::new(Fixed(StatusCode::OK))),
            );
            assert_eq!(client.kind(), Some(kind));
            assert!(unwrap_client_chain(client, &target()).is_direct());
        }
    }
}
