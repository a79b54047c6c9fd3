//! Access Control Integration Tests
//!
//! Drives a real gateway over TCP with the generated clients and checks which
//! calls are admitted and which are refused.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::time::Duration;

use tokio::time::timeout;
use tonic::transport::Channel;
use tonic::{Code, Request};

use acl_gateway::{
    CONSUMER_METADATA_KEY, Gateway, GatewayOptions,
    proto::{Nothing, admin_client::AdminClient, biz_client::BizClient},
};

/// Start a gateway on a random port and return it with its address.
async fn start_gateway(acl: &str) -> (Gateway, String, tokio::task::JoinHandle<()>) {
    let gateway = Gateway::from_acl_json(acl, GatewayOptions::default()).unwrap();

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = format!("http://{}", listener.local_addr().unwrap());

    let server = gateway.clone();
    let handle = tokio::spawn(async move {
        server.serve(listener).await.unwrap();
    });

    // Give server time to start
    tokio::time::sleep(Duration::from_millis(50)).await;

    (gateway, addr, handle)
}

async fn biz_client(addr: &str) -> BizClient<Channel> {
    BizClient::connect(addr.to_string()).await.unwrap()
}

fn as_consumer<T>(message: T, consumer: &str) -> Request<T> {
    let mut request = Request::new(message);
    request
        .metadata_mut()
        .insert(CONSUMER_METADATA_KEY, consumer.parse().unwrap());
    request
}

fn nothing() -> Nothing {
    Nothing { dummy: true }
}

async fn stop(gateway: Gateway, handle: tokio::task::JoinHandle<()>) {
    gateway.shutdown();
    timeout(Duration::from_secs(5), handle).await.unwrap().unwrap();
}

// =============================================================================
// Exact Patterns
// =============================================================================

#[tokio::test]
async fn test_exact_pattern_admits_only_that_method() {
    let (gateway, addr, handle) =
        start_gateway(r#"{"alice": ["/gateway.v1.Biz/Check"]}"#).await;
    let mut client = biz_client(&addr).await;

    let reply = client.check(as_consumer(nothing(), "alice")).await.unwrap();
    assert!(reply.into_inner().dummy);

    let status = client.add(as_consumer(nothing(), "alice")).await.unwrap_err();
    assert_eq!(status.code(), Code::Unauthenticated);
    assert_eq!(
        status.message(),
        "not authorized: alice cannot call /gateway.v1.Biz/Add"
    );

    stop(gateway, handle).await;
}

// =============================================================================
// Wildcard Patterns
// =============================================================================

#[tokio::test]
async fn test_wildcard_pattern_admits_every_method_of_service() {
    let (gateway, addr, handle) = start_gateway(r#"{"admin": ["/gateway.v1.Biz/*"]}"#).await;
    let mut client = biz_client(&addr).await;

    assert!(client.check(as_consumer(nothing(), "admin")).await.is_ok());
    assert!(client.add(as_consumer(nothing(), "admin")).await.is_ok());
    assert!(client.test(as_consumer(nothing(), "admin")).await.is_ok());

    stop(gateway, handle).await;
}

#[tokio::test]
async fn test_wildcard_does_not_cross_services() {
    let (gateway, addr, handle) = start_gateway(r#"{"admin": ["/gateway.v1.Biz/*"]}"#).await;
    let mut admin = AdminClient::connect(addr.clone()).await.unwrap();

    let status = admin
        .logging(as_consumer(Nothing { dummy: false }, "admin"))
        .await
        .unwrap_err();
    assert_eq!(status.code(), Code::Unauthenticated);

    stop(gateway, handle).await;
}

// =============================================================================
// Consumer Identity
// =============================================================================

#[tokio::test]
async fn test_missing_consumer_is_refused() {
    let (gateway, addr, handle) =
        start_gateway(r#"{"alice": ["/gateway.v1.Biz/Check"]}"#).await;
    let mut client = biz_client(&addr).await;

    let status = client.check(Request::new(nothing())).await.unwrap_err();
    assert_eq!(status.code(), Code::Unauthenticated);
    assert_eq!(status.message(), "missing consumer");

    stop(gateway, handle).await;
}

#[tokio::test]
async fn test_unknown_consumer_is_refused() {
    let (gateway, addr, handle) =
        start_gateway(r#"{"alice": ["/gateway.v1.Biz/Check"]}"#).await;
    let mut client = biz_client(&addr).await;

    let status = client
        .check(as_consumer(nothing(), "mallory"))
        .await
        .unwrap_err();
    assert_eq!(status.code(), Code::Unauthenticated);
    assert_eq!(status.message(), "unknown consumer: mallory");

    stop(gateway, handle).await;
}

#[tokio::test]
async fn test_consumer_with_empty_list_is_refused_everything() {
    let (gateway, addr, handle) = start_gateway(r#"{"nobody": []}"#).await;
    let mut client = biz_client(&addr).await;

    let status = client.check(as_consumer(nothing(), "nobody")).await.unwrap_err();
    assert_eq!(status.code(), Code::Unauthenticated);

    stop(gateway, handle).await;
}

// =============================================================================
// Streaming Calls
// =============================================================================

#[tokio::test]
async fn test_streaming_call_is_checked_before_handler() {
    let (gateway, addr, handle) = start_gateway(
        r#"{
            "biz": ["/gateway.v1.Biz/*"],
            "admin": ["/gateway.v1.Admin/*"]
        }"#,
    )
    .await;
    let mut admin = AdminClient::connect(addr.clone()).await.unwrap();

    let status = admin
        .logging(as_consumer(Nothing { dummy: false }, "biz"))
        .await
        .unwrap_err();
    assert_eq!(status.code(), Code::Unauthenticated);

    // A refused stream never registers a subscriber.
    assert_eq!(gateway.hub().stats().log_subscribers, 0);

    let stream = admin
        .logging(as_consumer(Nothing { dummy: false }, "admin"))
        .await
        .unwrap();
    assert_eq!(gateway.hub().stats().log_subscribers, 1);
    drop(stream);

    stop(gateway, handle).await;
}
