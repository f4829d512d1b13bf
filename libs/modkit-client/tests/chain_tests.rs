#![allow(clippy::unwrap_used, clippy::expect_used)]

//! Tests for load-balanced routing and decorator unwrapping.

mod common;

use bytes::Bytes;
use common::{RecordingTransport, UsersApi, plain_scopes};
use http::{HeaderMap, Method};
use modkit_client::{
    ClientDeclaration, ClientFactory, ClientProperties, LoadBalancerKind, Request, RequestOptions,
    RoutingTarget, TransportClient, TypeRef, unwrap_client_chain,
};
use std::sync::Arc;
use url::Url;

fn target() -> RoutingTarget {
    RoutingTarget::new(TypeRef::interface::<dyn UsersApi>(), "users", "http://users.local:8080")
}

fn request() -> Request {
    Request {
        method: Method::GET,
        url: Url::parse("http://users.local:8080/users/1").unwrap(),
        headers: HeaderMap::new(),
        body: Bytes::new(),
    }
}

#[tokio::test]
async fn test_unwrapped_blocking_client_sends_directly() {
    let balancer = RecordingTransport::ok_user();
    let direct = RecordingTransport::ok_user();
    let chain = TransportClient::load_balanced(
        LoadBalancerKind::Blocking,
        balancer.clone(),
        TransportClient::direct(direct.clone()),
    );

    let unwrapped = unwrap_client_chain(chain, &target());
    assert!(unwrapped.is_direct());
    assert!(unwrapped.kind().is_none());

    unwrapped.send(request(), &RequestOptions::default()).await.unwrap();
    assert_eq!(direct.calls(), 1);
    assert_eq!(balancer.calls(), 0);
}

#[tokio::test]
async fn test_nested_decorators_are_all_removed() {
    let outer = RecordingTransport::ok_user();
    let inner = RecordingTransport::ok_user();
    let direct = RecordingTransport::ok_user();
    let chain = TransportClient::load_balanced(
        LoadBalancerKind::RetryableBlocking,
        outer.clone(),
        TransportClient::load_balanced(
            LoadBalancerKind::Legacy,
            inner.clone(),
            TransportClient::direct(direct.clone()),
        ),
    );
    assert_eq!(chain.kind(), Some(LoadBalancerKind::RetryableBlocking));

    let unwrapped = unwrap_client_chain(chain, &target());
    assert!(unwrapped.is_direct());

    unwrapped.send(request(), &RequestOptions::default()).await.unwrap();
    assert_eq!(direct.calls(), 1);
    assert_eq!(inner.calls() + outer.calls(), 0);
}

#[tokio::test]
async fn test_load_balanced_client_sends_through_balancer() {
    let balancer = RecordingTransport::ok_user();
    let direct = RecordingTransport::ok_user();
    let chain = TransportClient::load_balanced(
        LoadBalancerKind::Legacy,
        balancer.clone(),
        TransportClient::direct(direct.clone()),
    );

    chain.send(request(), &RequestOptions::default()).await.unwrap();
    assert_eq!(balancer.calls(), 1);
    assert_eq!(direct.calls(), 0);
}

#[tokio::test]
async fn test_direct_client_is_left_alone() {
    let direct = RecordingTransport::ok_user();
    let unwrapped = unwrap_client_chain(TransportClient::direct(direct.clone()), &target());
    assert!(unwrapped.is_direct());

    unwrapped.send(request(), &RequestOptions::default()).await.unwrap();
    assert_eq!(direct.calls(), 1);
}

fn balanced_factory(balancer: Arc<RecordingTransport>, direct: Arc<RecordingTransport>) -> ClientFactory {
    let factory = ClientFactory::new(plain_scopes(), ClientProperties::default());
    factory.scopes().parent().register::<TransportClient>(
        "balanced-transport",
        Arc::new(TransportClient::load_balanced(
            LoadBalancerKind::Blocking,
            balancer,
            TransportClient::direct(direct),
        )),
    );
    factory
}

#[tokio::test]
async fn test_fixed_url_bypasses_the_balancer() {
    let balancer = RecordingTransport::ok_user();
    let direct = RecordingTransport::ok_user();
    let factory = balanced_factory(balancer.clone(), direct.clone());
    factory
        .register(
            ClientDeclaration::for_capability::<dyn UsersApi>()
                .name("users")
                .url("users.local:8080")
                .path("api"),
        )
        .unwrap();

    let client: Arc<dyn UsersApi> = factory.get("users").unwrap();
    client.get_user(7).await.unwrap();

    assert_eq!(direct.urls(), vec!["http://users.local:8080/api/users/7"]);
    assert_eq!(balancer.calls(), 0);
}

#[tokio::test]
async fn test_service_name_routes_through_the_balancer() {
    let balancer = RecordingTransport::ok_user();
    let direct = RecordingTransport::ok_user();
    let factory = balanced_factory(balancer.clone(), direct.clone());
    factory
        .register(ClientDeclaration::for_capability::<dyn UsersApi>().name("users"))
        .unwrap();

    let client: Arc<dyn UsersApi> = factory.get("users").unwrap();
    client.get_user(7).await.unwrap();

    assert_eq!(balancer.urls(), vec!["http://users/users/7"]);
    assert_eq!(direct.calls(), 0);
}

#[tokio::test]
async fn test_service_name_starting_with_http_gets_a_scheme() {
    let balancer = RecordingTransport::ok_user();
    let direct = RecordingTransport::ok_user();
    let factory = balanced_factory(balancer.clone(), direct.clone());
    factory
        .register(ClientDeclaration::for_capability::<dyn UsersApi>().name("httpbin"))
        .unwrap();

    let client: Arc<dyn UsersApi> = factory.get("httpbin").unwrap();
    client.get_user(7).await.unwrap();

    assert_eq!(balancer.urls(), vec!["http://httpbin/users/7"]);
    assert_eq!(direct.calls(), 0);
}
