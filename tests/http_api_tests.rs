// Integration tests for the HTTP control API
//
// Requests go straight into the router via tower's `oneshot`, backed by the
// same fake collaborators as the lifecycle tests.

mod common;

use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use axum::Router;
use common::Harness;
use companion_voice::{create_router, AppState, SessionConfig};
use serde_json::{json, Value};
use std::sync::atomic::Ordering;
use std::time::Duration;
use tower::ServiceExt;

fn router(harness: &Harness) -> Router {
    create_router(AppState::new(
        SessionConfig::default(),
        harness.collaborators(),
    ))
}

async fn call(router: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let request = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(body) => request
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => request.body(Body::empty()).unwrap(),
    };

    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, value)
}

#[tokio::test]
async fn test_health_check() {
    let harness = Harness::new(60);
    let router = router(&harness);

    let response = router
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    assert_eq!(&body[..], b"OK");
}

#[tokio::test(start_paused = true)]
async fn test_session_round_trip() {
    let harness = Harness::new(60);
    let router = router(&harness);

    let (status, started) = call(&router, "POST", "/voice/u1/start", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(started["status"], "active");
    let session_id = started["session_id"].as_str().unwrap().to_string();

    let (status, _) = call(&router, "POST", "/voice/u1/start", None).await;
    assert_eq!(status, StatusCode::CONFLICT);

    tokio::time::sleep(Duration::from_millis(1500)).await;

    let (status, stats) = call(&router, "GET", "/voice/u1/status", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(stats["session_id"], session_id.as_str());
    assert_eq!(stats["state"], "active");
    assert_eq!(stats["elapsed_seconds"], 1);
    assert_eq!(stats["remaining_budget_seconds"], 59);

    let (status, _) = call(
        &router,
        "POST",
        "/voice/u1/text",
        Some(json!({ "text": "tell me a joke" })),
    )
    .await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    assert_eq!(harness.transports.last().sent_frames().len(), 2);

    let (status, stopped) = call(&router, "POST", "/voice/u1/stop", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(stopped["status"], "stopped");
    assert_eq!(stopped["stats"]["state"], "ended");
    assert_eq!(stopped["stats"]["end_reason"]["reason"], "stopped");

    let (status, stopped_again) = call(&router, "POST", "/voice/u1/stop", None).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(stopped_again["kind"], "not_active");

    let (status, stats) = call(&router, "GET", "/voice/u1/status", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(stats["state"], "ended");
}

#[tokio::test(start_paused = true)]
async fn test_transcript_collects_final_utterances() {
    let harness = Harness::new(60);
    let router = router(&harness);

    let (status, _) = call(&router, "POST", "/voice/u1/start", None).await;
    assert_eq!(status, StatusCode::OK);

    let transport = harness.transports.last();
    transport
        .inject_frame(r#"{"type":"conversation.item.input_audio_transcription.delta","item_id":"u1","delta":"hi"}"#)
        .await;
    transport
        .inject_frame(r#"{"type":"conversation.item.input_audio_transcription.completed","item_id":"u1","transcript":"Hi!"}"#)
        .await;
    transport
        .inject_frame(r#"{"type":"response.audio_transcript.done","item_id":"a1","transcript":"Hello, friend."}"#)
        .await;
    tokio::time::sleep(Duration::from_millis(50)).await;

    let (status, transcript) = call(&router, "GET", "/voice/u1/transcript", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(transcript["user_id"], "u1");

    let utterances = transcript["utterances"].as_array().unwrap();
    assert_eq!(utterances.len(), 2);
    assert_eq!(utterances[0]["speaker"], "user");
    assert_eq!(utterances[0]["text"], "Hi!");
    assert_eq!(utterances[1]["speaker"], "assistant");
    assert_eq!(utterances[1]["text"], "Hello, friend.");

    // A new session starts with an empty transcript
    call(&router, "POST", "/voice/u1/stop", None).await;
    call(&router, "POST", "/voice/u1/start", None).await;
    tokio::time::sleep(Duration::from_millis(50)).await;

    let (_, transcript) = call(&router, "GET", "/voice/u1/transcript", None).await;
    assert!(transcript["utterances"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_unknown_user_is_not_found() {
    let harness = Harness::new(60);
    let router = router(&harness);

    for (method, uri) in [
        ("GET", "/voice/ghost/status"),
        ("GET", "/voice/ghost/transcript"),
        ("POST", "/voice/ghost/stop"),
    ] {
        let (status, _) = call(&router, method, uri, None).await;
        assert_eq!(status, StatusCode::NOT_FOUND, "{} {}", method, uri);
    }
}

#[tokio::test]
async fn test_budget_exhausted_is_429() {
    let harness = Harness::new(0);
    let router = router(&harness);

    let (status, body) = call(&router, "POST", "/voice/u1/start", None).await;

    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(body["kind"], "budget_exhausted");
}

#[tokio::test]
async fn test_media_permission_is_403() {
    let harness = Harness::new(60);
    harness.media.deny.store(true, Ordering::SeqCst);
    let router = router(&harness);

    let (status, body) = call(&router, "POST", "/voice/u1/start", None).await;

    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["kind"], "media_permission");
}

#[tokio::test]
async fn test_remote_rejection_is_502() {
    let harness = Harness::new(60);
    *harness.negotiator.reject.lock().unwrap() = Some(401);
    let router = router(&harness);

    let (status, body) = call(&router, "POST", "/voice/u1/start", None).await;

    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(body["kind"], "remote_rejection");
    assert_eq!(harness.media.open_captures(), 0);
}

#[tokio::test]
async fn test_text_without_session_is_conflict() {
    let harness = Harness::new(60);
    let router = router(&harness);

    // The manager exists but its session has ended
    let (status, _) = call(&router, "POST", "/voice/u1/start", None).await;
    assert_eq!(status, StatusCode::OK);
    call(&router, "POST", "/voice/u1/stop", None).await;

    let (status, body) = call(
        &router,
        "POST",
        "/voice/u1/text",
        Some(json!({ "text": "anyone there?" })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["kind"], "not_active");
}

#[tokio::test(start_paused = true)]
async fn test_evict_releases_idle_user() {
    let harness = Harness::new(60);
    let router = router(&harness);

    call(&router, "POST", "/voice/u1/start", None).await;

    // Live sessions are never evicted
    let (status, body) = call(&router, "DELETE", "/voice/u1", None).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["kind"], "invalid_state");

    call(&router, "POST", "/voice/u1/stop", None).await;

    let (status, _) = call(&router, "DELETE", "/voice/u1", None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, _) = call(&router, "GET", "/voice/u1/status", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, _) = call(&router, "DELETE", "/voice/u1", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    // A fresh manager is created on the next start
    let (status, _) = call(&router, "POST", "/voice/u1/start", None).await;
    assert_eq!(status, StatusCode::OK);
}
