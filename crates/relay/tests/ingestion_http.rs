mod common;

use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::routing::post;
use axum::{Json, Router};
use codetrack_core::domain::{DeliveryResult, IngestionClient, UserId};
use serde_json::{Value, json};
use submission_relay::storage::USER_ID_KEY;
use submission_relay::{
    EventBroadcaster, HttpIngestionClient, InboundMessage, MemoryStore, MessageRouter,
    OutboundResponse, RelayController, RelayEvent, StateEntries,
};

use common::two_sum;

#[derive(Clone, Default)]
struct Captured {
    bodies: Arc<Mutex<Vec<Value>>>,
    content_types: Arc<Mutex<Vec<String>>>,
}

async fn spawn_server(app: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind test listener");
    let addr = listener.local_addr().expect("listener address");
    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("test server");
    });
    format!("http://{addr}")
}

async fn accepting_server() -> (String, Captured) {
    let captured = Captured::default();
    let app = Router::new()
        .route(
            "/submissions",
            post(
                |State(captured): State<Captured>, headers: HeaderMap, Json(body): Json<Value>| async move {
                    let content_type = headers
                        .get("content-type")
                        .and_then(|value| value.to_str().ok())
                        .unwrap_or_default()
                        .to_string();
                    captured.content_types.lock().expect("lock").push(content_type);
                    captured.bodies.lock().expect("lock").push(body);
                    (StatusCode::CREATED, Json(json!({"id": "rec-7"})))
                },
            ),
        )
        .with_state(captured.clone());

    (spawn_server(app).await, captured)
}

async fn unused_address() -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind scratch listener");
    let addr = listener.local_addr().expect("scratch address");
    drop(listener);
    format!("http://{addr}")
}

#[tokio::test]
async fn test_delivered_with_server_id() {
    let (base, captured) = accepting_server().await;
    let client = HttpIngestionClient::new(&format!("{base}/"), Duration::from_secs(5))
        .expect("client should build");

    let before = chrono::Utc::now().timestamp_millis();
    let result = client.send(&two_sum(), &UserId::new("abc")).await;
    let after = chrono::Utc::now().timestamp_millis();

    assert_eq!(result, DeliveryResult::delivered(Some("rec-7".to_string())));

    let bodies = captured.bodies.lock().expect("lock").clone();
    assert_eq!(bodies.len(), 1);
    let body = &bodies[0];
    assert_eq!(body["userId"], "abc");
    assert_eq!(body["problemTitle"], "Two Sum");
    assert_eq!(body["platform"], "leetcode");
    assert_eq!(body["difficulty"], "easy");
    assert_eq!(body["status"], "accepted");
    assert_eq!(body["language"], "python");
    let timestamp = body["timestamp"].as_i64().expect("timestamp should be a number");
    assert!(before <= timestamp && timestamp <= after);

    let content_types = captured.content_types.lock().expect("lock").clone();
    assert_eq!(content_types, vec!["application/json".to_string()]);
}

#[tokio::test]
async fn test_non_success_status_is_failure() {
    let app = Router::new().route(
        "/submissions",
        post(|| async {
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({"code": "down", "message": "maintenance"})),
            )
        }),
    );
    let base = spawn_server(app).await;
    let client = HttpIngestionClient::new(&base, Duration::from_secs(5)).expect("client");

    let result = client.send(&two_sum(), &UserId::new("abc")).await;

    assert_eq!(result, DeliveryResult::failed("http status 503: maintenance"));
}

#[tokio::test]
async fn test_non_json_body_is_failure() {
    let app = Router::new().route("/submissions", post(|| async { "stored" }));
    let base = spawn_server(app).await;
    let client = HttpIngestionClient::new(&base, Duration::from_secs(5)).expect("client");

    let result = client.send(&two_sum(), &UserId::new("abc")).await;

    match result {
        DeliveryResult::Failed { reason } => assert!(reason.starts_with("invalid response body")),
        other => panic!("expected Failed, got: {other:?}"),
    }
}

#[tokio::test]
async fn test_timeout_is_failure() {
    let app = Router::new().route(
        "/submissions",
        post(|| async {
            tokio::time::sleep(Duration::from_secs(3)).await;
            Json(json!({}))
        }),
    );
    let base = spawn_server(app).await;
    let client = HttpIngestionClient::new(&base, Duration::from_millis(200)).expect("client");

    let result = client.send(&two_sum(), &UserId::new("abc")).await;

    assert_eq!(result, DeliveryResult::failed("request timed out"));
}

#[tokio::test]
async fn test_connection_refused_is_failure() {
    let base = unused_address().await;
    let client = HttpIngestionClient::new(&base, Duration::from_secs(2)).expect("client");

    let result = client.send(&two_sum(), &UserId::new("abc")).await;

    assert!(!result.is_ok());
}

async fn identified_router(base: &str) -> (MessageRouter<RelayController>, submission_relay::EventStream) {
    let store = Arc::new(MemoryStore::with_entries(StateEntries::from([(
        USER_ID_KEY.to_string(),
        json!("abc"),
    )])));
    let client = HttpIngestionClient::new(base, Duration::from_secs(2)).expect("client");
    let controller = RelayController::hydrate(
        store,
        Arc::new(client),
        Arc::new(EventBroadcaster::new(32)),
    )
    .await;
    let events = controller.subscribe_events();
    (MessageRouter::new(controller), events)
}

#[tokio::test]
async fn test_end_to_end_delivery_through_router() {
    let (base, captured) = accepting_server().await;
    let (mut router, _events) = identified_router(&base).await;

    let response = router
        .request(InboundMessage::SubmissionDetected { data: two_sum() })
        .await;
    assert_eq!(response, OutboundResponse::Ok);

    router.handler_mut().drain().await;
    let bodies = captured.bodies.lock().expect("lock").clone();
    assert_eq!(bodies.len(), 1);
    assert_eq!(bodies[0]["userId"], "abc");
    assert!(bodies[0]["timestamp"].is_i64());
}

#[tokio::test]
async fn test_network_error_still_answers_success() {
    let base = unused_address().await;
    let (mut router, mut events) = identified_router(&base).await;

    let response = router
        .request(InboundMessage::SubmissionDetected { data: two_sum() })
        .await;
    assert_eq!(response, OutboundResponse::Ok);

    router.handler_mut().drain().await;

    let mut saw_failure = false;
    while let Ok(event) = events.try_recv() {
        if let RelayEvent::DeliveryFailed { .. } = event {
            saw_failure = true;
        }
    }
    assert!(saw_failure);
}
