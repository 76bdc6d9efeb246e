// Copyright (c) 2025 - Cowboy AI, Inc.
//! HTTP Response Channel Tests
//!
//! Exercises the reqwest transport against local axum servers: the callback
//! listener itself and small capture servers.

mod fixtures;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::routing::put;
use axum::Router;
use fixtures::*;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use cim_provisioning::channel::ResponseTransport;
use cim_provisioning::{
    CallbackConfig, CallbackListener, DeliveryError, HttpTransport, LifecycleEvent,
    LifecycleResponse, Properties, RequestType, ResponseChannel, RetryPolicy,
};

#[derive(Default)]
struct Captured {
    content_length: Option<String>,
    content_type: Option<String>,
    body: Vec<u8>,
}

async fn serve(router: Router) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    addr
}

fn transport() -> HttpTransport {
    HttpTransport::new(Duration::from_secs(5)).unwrap()
}

fn response_for(address: &str) -> (LifecycleEvent, LifecycleResponse) {
    let event = LifecycleEvent::new(
        RequestType::Create,
        STACK_ID,
        "PostgisExtension",
        Properties::new(),
        None,
        address,
    );
    let response = LifecycleResponse::success(
        &event,
        "postgis-extension-PostgisExtension",
        "postgis extension installed (version 3.4.2)",
        Properties::new(),
    );
    (event, response)
}

#[tokio::test]
async fn test_put_sets_exact_content_length_and_empty_content_type() {
    let captured = Arc::new(Mutex::new(Captured::default()));
    let router = Router::new()
        .route(
            "/hook",
            put(
                |State(captured): State<Arc<Mutex<Captured>>>, headers: HeaderMap, body: Bytes| async move {
                    let header = |name: &str| {
                        headers
                            .get(name)
                            .map(|v| String::from_utf8_lossy(v.as_bytes()).into_owned())
                    };
                    let mut slot = captured.lock().unwrap();
                    slot.content_length = header("content-length");
                    slot.content_type = header("content-type");
                    slot.body = body.to_vec();
                    StatusCode::OK
                },
            ),
        )
        .with_state(captured.clone());
    let addr = serve(router).await;
    let address = format!("http://{}/hook", addr);

    let (_, response) = response_for(&address);
    let channel = ResponseChannel::new(Arc::new(transport()), RetryPolicy::none());
    assert_eq!(channel.send(&address, &response).await.unwrap(), 1);

    let captured = captured.lock().unwrap();
    let expected = serde_json::to_vec(&response).unwrap();
    assert_eq!(captured.body, expected);
    assert_eq!(captured.content_length, Some(expected.len().to_string()));
    assert_eq!(captured.content_type.as_deref(), Some(""));
}

#[tokio::test]
async fn test_server_errors_are_retried() {
    let calls = Arc::new(AtomicU32::new(0));
    let router = Router::new()
        .route(
            "/hook",
            put(|State(calls): State<Arc<AtomicU32>>| async move {
                if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                    StatusCode::SERVICE_UNAVAILABLE
                } else {
                    StatusCode::OK
                }
            }),
        )
        .with_state(calls.clone());
    let addr = serve(router).await;
    let address = format!("http://{}/hook", addr);

    let (_, response) = response_for(&address);
    let channel = ResponseChannel::new(Arc::new(transport()), fast_retry(5));

    assert_eq!(channel.send(&address, &response).await.unwrap(), 3);
    assert_eq!(calls.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_callback_listener_accepts_one_response() {
    let listener = CallbackListener::bind(&CallbackConfig::default())
        .await
        .unwrap();
    let registry = listener.registry();
    let ticket = registry.register("PostgisExtension").await;
    assert!(ticket
        .address
        .starts_with(&format!("http://{}/callbacks/", listener.local_addr())));

    let (event, response) = response_for(&ticket.address);
    let channel = ResponseChannel::new(Arc::new(transport()), RetryPolicy::none());

    channel.send(&ticket.address, &response).await.unwrap();
    let received = ticket.receiver.await.unwrap();
    assert_eq!(received, response);
    assert!(received.answers(&event));

    let second = channel.send(&ticket.address, &response).await.unwrap_err();
    match second {
        DeliveryError::Exhausted { attempts, last_error } => {
            assert_eq!(attempts, 1);
            assert!(last_error.contains("404"), "{}", last_error);
        }
        other => panic!("expected exhausted delivery, got {:?}", other),
    }

    listener.shutdown().await;
}

#[tokio::test]
async fn test_callback_listener_rejects_malformed_body() {
    let listener = CallbackListener::bind(&CallbackConfig::default())
        .await
        .unwrap();
    let ticket = listener.registry().register("PostgisExtension").await;

    let err = transport()
        .put(&ticket.address, b"{\"status\": \"MAYBE\"}")
        .await
        .unwrap_err();
    assert!(matches!(err, DeliveryError::Rejected { status: 400, .. }));
    assert_eq!(listener.registry().pending_count().await, 1);

    listener.shutdown().await;
}

#[tokio::test]
async fn test_callback_listener_rejects_foreign_logical_id() {
    let listener = CallbackListener::bind(&CallbackConfig::default())
        .await
        .unwrap();
    let ticket = listener.registry().register("PostgisExtension").await;
    let foreign = ticket.address.replace("/PostgisExtension/", "/SatelliteImageDb/");

    let (_, response) = response_for(&foreign);
    let err = transport()
        .put(&foreign, &serde_json::to_vec(&response).unwrap())
        .await
        .unwrap_err();
    assert!(matches!(err, DeliveryError::Rejected { status: 400, .. }));

    listener.shutdown().await;
}
