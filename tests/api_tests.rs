mod common;

use std::sync::Arc;

use anyhow::Result;
use axum::{
    Router,
    body::{Body, to_bytes},
    http::{Method, Request, StatusCode},
};
use serde_json::{Value, json};
use settlement_service::{
    api::{AppState, router},
    clients::health::HealthChecker,
    config::StatusQueueConfig,
    models::instruction::Environment,
    services::{
        dispatcher::OutboundDispatcher, message_builder::MessageBuilder,
        poller::QueueStateRegistry,
    },
};
use tower::ServiceExt;

use common::{FakeGateway, OUTBOUND_QUEUE, REMOTE_EXCHANGE, harness};

const STATUS_QUEUE: &str = "csd.status.sese";

struct TestApp {
    router: Router,
    gateway: Arc<FakeGateway>,
    registry: Arc<QueueStateRegistry>,
}

async fn test_app() -> TestApp {
    let h = harness().await;
    let registry = Arc::new(QueueStateRegistry::new(&[StatusQueueConfig {
        name: STATUS_QUEUE.to_string(),
        enabled: true,
    }]));

    let dispatcher = Arc::new(OutboundDispatcher::new(
        h.gateway.clone(),
        Arc::clone(&h.store),
        Arc::clone(&h.templates),
        Some(REMOTE_EXCHANGE.to_string()),
    ));

    let state = Arc::new(AppState {
        health_checker: HealthChecker::new(
            h.repository.clone(),
            h.gateway.clone(),
            Arc::clone(&registry),
        ),
        registry: Arc::clone(&registry),
        dispatcher,
        store: Arc::clone(&h.store),
        builder: MessageBuilder::new(),
        outbound_queue_name: OUTBOUND_QUEUE.to_string(),
        default_environment: Environment::Local,
    });

    TestApp {
        router: router(state),
        gateway: h.gateway,
        registry,
    }
}

async fn call(router: &Router, method: Method, uri: &str, body: Option<Value>) -> Result<(StatusCode, Value)> {
    let request = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(body) => request
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))?,
        None => request.body(Body::empty())?,
    };

    let response = router.clone().oneshot(request).await?;
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await?;

    Ok((status, serde_json::from_slice(&bytes)?))
}

fn pair_body(key: &str) -> Value {
    json!({
        "kind": "securities_transfer",
        "security_id": "KRA0000000001",
        "quantity": "1500",
        "seller_account": "SELL-ACC-001",
        "seller_participant": "PART001",
        "buyer_account": "BUY-ACC-002",
        "buyer_participant": "PART002",
        "trade_date": "2024-03-04",
        "settlement_date": "2024-03-06",
        "correlation_key": key,
        "transaction_id": "240304120000001",
        "template_name": "transfer"
    })
}

/// Test: Health reports every dependency and poller
#[tokio::test]
async fn test_health_endpoint() -> Result<()> {
    let app = test_app().await;

    let (status, body) = call(&app.router, Method::GET, "/health", None).await?;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["pollers"][0]["queue_name"], STATUS_QUEUE);
    assert_eq!(body["pollers"][0]["state"], "RUNNING");

    Ok(())
}

/// Test: Pollers can be stopped and restarted over HTTP
#[tokio::test]
async fn test_poller_start_stop() -> Result<()> {
    let app = test_app().await;

    let uri = format!("/api/v1/pollers/{}/stop", STATUS_QUEUE);
    let (status, body) = call(&app.router, Method::POST, &uri, None).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"][0]["state"], "STOPPED");
    assert!(!app.registry.is_running(STATUS_QUEUE));

    let (_, health) = call(&app.router, Method::GET, "/health", None).await?;
    assert_eq!(health["status"], "degraded");

    let uri = format!("/api/v1/pollers/{}/start", STATUS_QUEUE);
    let (status, _) = call(&app.router, Method::POST, &uri, None).await?;
    assert_eq!(status, StatusCode::OK);
    assert!(app.registry.is_running(STATUS_QUEUE));

    let (status, body) = call(&app.router, Method::GET, "/api/v1/pollers", None).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"][0]["state"], "RUNNING");

    Ok(())
}

/// Test: Unknown poller queues are 404
#[tokio::test]
async fn test_unknown_poller_not_found() -> Result<()> {
    let app = test_app().await;

    let (status, body) = call(
        &app.router,
        Method::POST,
        "/api/v1/pollers/not.configured/start",
        None,
    )
    .await?;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["success"], false);

    Ok(())
}

/// Test: A pair request dispatches both legs and can be looked up
#[tokio::test]
async fn test_dispatch_and_lookup_pair() -> Result<()> {
    let app = test_app().await;

    let (status, body) = call(
        &app.router,
        Method::POST,
        "/api/v1/pairs",
        Some(pair_body("6APITEST1")),
    )
    .await?;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "SUCCESS");
    assert_eq!(body["data"]["correlation_key"], "6APITEST1");
    assert_eq!(body["data"]["leg_a"]["transaction_id"], "240304120000001A");
    assert_eq!(body["data"]["leg_b"]["send_status"], "SENT");
    assert_eq!(app.gateway.sent().len(), 2);

    let (status, body) = call(&app.router, Method::GET, "/api/v1/pairs/6APITEST1", None).await?;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"].as_array().map(Vec::len), Some(2));
    assert_eq!(body["data"][0]["processing_status"], "PENDING");

    Ok(())
}

/// Test: A pair whose legs failed returns 502 and the failed leg can be resent
#[tokio::test]
async fn test_failed_dispatch_and_resend() -> Result<()> {
    let app = test_app().await;
    app.gateway
        .refuse_bodies_containing("<TxId>240304120000001B</TxId>");

    let (status, body) = call(
        &app.router,
        Method::POST,
        "/api/v1/pairs",
        Some(pair_body("6APITEST2")),
    )
    .await?;

    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(body["message"], "PARTIAL_FAILURE");

    app.gateway.clear_send_behaviour();

    let (status, body) = call(
        &app.router,
        Method::POST,
        "/api/v1/instructions/240304120000001B/resend",
        None,
    )
    .await?;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["send_status"], "SENT");

    Ok(())
}

/// Test: Invalid pair requests are rejected with 400
#[tokio::test]
async fn test_invalid_pair_rejected() -> Result<()> {
    let app = test_app().await;

    let mut body = pair_body("6APITEST3");
    body["quantity"] = json!("0");

    let (status, response) = call(&app.router, Method::POST, "/api/v1/pairs", Some(body)).await?;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(response["success"], false);
    assert!(app.gateway.sent().is_empty());

    Ok(())
}

/// Test: Unknown pairs are 404
#[tokio::test]
async fn test_unknown_pair_not_found() -> Result<()> {
    let app = test_app().await;

    let (status, _) = call(&app.router, Method::GET, "/api/v1/pairs/0MISSING0", None).await?;

    assert_eq!(status, StatusCode::NOT_FOUND);

    Ok(())
}
