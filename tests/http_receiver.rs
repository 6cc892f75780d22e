//! HTTP receiver tests, driven through the router without binding a socket.
#![cfg(feature = "networking")]

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use chrono::{DateTime, Utc};
use http_body_util::BodyExt;
use serde_json::Value;
use std::time::Duration;
use swing_daq::mock::MockSwingSource;
use swing_daq::server::router;
use swing_daq::SwingSession;
use tower::ServiceExt;

fn start() -> DateTime<Utc> {
    DateTime::<Utc>::from_timestamp(1_700_000_000, 0).unwrap()
}

async fn send(app: &Router, method: &str, uri: &str, body: Body) -> (StatusCode, Value) {
    let request = Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(body)
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, json)
}

async fn post(app: &Router, uri: &str) -> (StatusCode, Value) {
    send(app, "POST", uri, Body::empty()).await
}

async fn get(app: &Router, uri: &str) -> (StatusCode, Value) {
    send(app, "GET", uri, Body::empty()).await
}

#[tokio::test]
async fn test_health() {
    let app = router(SwingSession::new(400, 5, None));
    let (status, body) = get(&app, "/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["recording"], false);
}

#[tokio::test]
async fn test_full_recording_cycle() {
    let app = router(SwingSession::new(400, 5, None));
    let mut source = MockSwingSource::starting_at(12, start());

    let (status, body) = post(&app, "/recording/start").await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["recording_id"].is_string());

    for batch in MockSwingSource::batches(source.swing(), 100) {
        let message = source.envelope(&batch).to_string();
        let (status, body) = send(&app, "POST", "/data", Body::from(message)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "success");
    }

    let (status, body) = post(&app, "/recording/stop").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "analyzing");
    assert!(body["samples"].as_u64().unwrap() > 0);
    let job_id = body["job_id"].as_str().unwrap().to_string();

    let completed = tokio::time::timeout(Duration::from_secs(10), async {
        loop {
            let (status, body) = get(&app, &format!("/jobs/{}", job_id)).await;
            assert_eq!(status, StatusCode::OK);
            if body["status"] != "pending" {
                return body;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();

    assert_eq!(completed["status"], "completed");
    let recording = &completed["recording"];
    assert_eq!(recording["metrics"]["swing_feedback"], "GOOD SEQUENCE");
    assert!(recording["signals"]["time"][0].is_string());

    // Result handed out once
    let (status, _) = get(&app, &format!("/jobs/{}", job_id)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, body) = get(&app, "/recordings").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_control_conflicts() {
    let app = router(SwingSession::new(400, 5, None));

    let (status, body) = post(&app, "/recording/stop").await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "CONFLICT");

    post(&app, "/recording/start").await;
    let (status, _) = post(&app, "/recording/start").await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, body) = post(&app, "/recording/stop").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "no_data");
}

#[tokio::test]
async fn test_bad_requests() {
    let app = router(SwingSession::new(400, 5, None));

    let (status, _) = send(&app, "POST", "/data", Body::from("{oops")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(&app, "POST", "/data", Body::from(r#"{"messageId": 1}"#)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = get(&app, "/jobs/not-a-uuid").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = get(&app, "/jobs/00000000-0000-0000-0000-000000000000").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_live_snapshot() {
    let app = router(SwingSession::new(20, 5, None));
    let mut source = MockSwingSource::starting_at(4, start());
    let samples = source.idle(500);
    let message = source.envelope(&samples).to_string();
    send(&app, "POST", "/data", Body::from(message)).await;

    let (status, body) = get(&app, "/live").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["capacity"], 20);
    assert_eq!(body["signals"]["time"].as_array().unwrap().len(), 20);
    assert_eq!(body["magnitudes"]["gyro"].as_array().unwrap().len(), 20);
}
