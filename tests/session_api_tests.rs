// SPDX-License-Identifier: MIT

//! Live session tests over the HTTP API.
//!
//! Most cases run against the offline mock motion client. The end-to-end
//! polling tests stand up a scripted motion service on a local port so the
//! worker's destructive-read polling and flushing run against real HTTP.

use axum::{
    body::Body,
    extract::State,
    http::{header, Request, StatusCode},
    routing::{get, post},
    Json, Router,
};
use motion4good::config::Config;
use motion4good::db::ChallengeStore;
use motion4good::routes::create_router;
use motion4good::services::{MotionClient, SessionService};
use motion4good::AppState;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tower::ServiceExt;

mod common;

async fn body_json(response: axum::response::Response) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), 1024 * 1024)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

fn authed(method: &str, uri: &str, token: &str) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::AUTHORIZATION, format!("Bearer {}", token))
        .body(Body::empty())
        .unwrap()
}

fn authed_json(method: &str, uri: &str, token: &str, body: serde_json::Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .header(header::AUTHORIZATION, format!("Bearer {}", token))
        .body(Body::from(body.to_string()))
        .unwrap()
}

/// Scripted motion service: hands out queued rep batches one per poll,
/// mimicking the real service's reset-on-read counters.
#[derive(Clone, Default)]
struct ScriptedMotion {
    batches: Arc<Mutex<VecDeque<HashMap<String, u64>>>>,
}

async fn scripted_reps(State(motion): State<ScriptedMotion>) -> Json<HashMap<String, u64>> {
    let batch = motion.batches.lock().unwrap().pop_front().unwrap_or_default();
    Json(batch)
}

async fn scripted_target(Json(body): Json<serde_json::Value>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "success": true,
        "target": body["target"],
    }))
}

async fn scripted_health() -> StatusCode {
    StatusCode::OK
}

/// Bind the scripted service on an ephemeral port and return its base URL.
async fn spawn_motion_service(batches: Vec<HashMap<String, u64>>) -> String {
    let motion = ScriptedMotion {
        batches: Arc::new(Mutex::new(batches.into())),
    };
    let router = Router::new()
        .route("/reps/process", get(scripted_reps))
        .route("/target", post(scripted_target))
        .route("/health", get(scripted_health))
        .with_state(motion);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{}", addr)
}

/// Test app wired to a live motion service URL, with fast poll intervals.
fn create_live_app(motion_url: &str) -> (axum::Router, Arc<AppState>) {
    let config = Config {
        motion_service_url: motion_url.to_string(),
        rep_poll_interval_ms: 20,
        availability_poll_interval_secs: 1,
        ..Config::default()
    };
    let store = ChallengeStore::new();
    let motion = MotionClient::new(motion_url);
    let sessions = SessionService::new(store.clone(), motion.clone(), &config);

    let state = Arc::new(AppState {
        config,
        store,
        motion,
        sessions,
    });
    (create_router(state.clone()), state)
}

/// Seed an enrolled user and an active challenge, return (challenge_id, token).
fn seed_enrolled(state: &AppState) -> (String, String) {
    let (user_id, token) = common::seed_user(state, "ada", "ada@example.com");
    let body = common::challenge_body("Squats", &["squats"], 1000);
    let request: motion4good::models::CreateChallengeRequest =
        serde_json::from_value(body).unwrap();
    let id = state.store.next_challenge_id().unwrap();
    state.store.create_challenge(request.into_challenge(
        id.clone(),
        user_id.clone(),
        chrono::Utc::now(),
    ));
    state.store.enroll(&id, &user_id).unwrap();
    (id, token)
}

#[tokio::test]
async fn test_start_session_requires_enrollment() {
    let (app, state) = common::create_test_app();
    let (_user_id, token) = common::seed_user(&state, "ada", "ada@example.com");

    let body = common::challenge_body("Squats", &["squats"], 1000);
    let request: motion4good::models::CreateChallengeRequest =
        serde_json::from_value(body).unwrap();
    let id = state.store.next_challenge_id().unwrap();
    state.store.create_challenge(request.into_challenge(
        id.clone(),
        "someone_else".to_string(),
        chrono::Utc::now(),
    ));

    let response = app
        .oneshot(authed("POST", &format!("/challenges/{}/sessions", id), &token))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_unknown_session_is_not_found() {
    let (app, state) = common::create_test_app();
    let (_user_id, token) = common::seed_user(&state, "ada", "ada@example.com");

    let response = app
        .oneshot(authed("GET", "/sessions/deadbeef", &token))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_session_snapshot_with_offline_motion() {
    let (app, state) = common::create_test_app();
    let (id, token) = seed_enrolled(&state);

    let response = app
        .clone()
        .oneshot(authed("POST", &format!("/challenges/{}/sessions", id), &token))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let session_id = body_json(response).await["session_id"]
        .as_str()
        .unwrap()
        .to_string();

    let response = app
        .clone()
        .oneshot(authed("GET", &format!("/sessions/{}", session_id), &token))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let snapshot = body_json(response).await;
    assert_eq!(snapshot["challengeId"], id.as_str());
    assert_eq!(snapshot["motionAvailable"], false);
    assert_eq!(snapshot["sessionContribution"], 0.0);

    // Offline motion service: selecting a target is refused up front
    let response = app
        .clone()
        .oneshot(authed_json(
            "POST",
            &format!("/sessions/{}/target", session_id),
            &token,
            serde_json::json!({"target": "squats"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);

    let response = app
        .oneshot(authed("DELETE", &format!("/sessions/{}", session_id), &token))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_session_belongs_to_its_owner() {
    let (app, state) = common::create_test_app();
    let (id, token) = seed_enrolled(&state);
    let (_bob_id, bob_token) = common::seed_user(&state, "bob", "bob@example.com");

    let response = app
        .clone()
        .oneshot(authed("POST", &format!("/challenges/{}/sessions", id), &token))
        .await
        .unwrap();
    let session_id = body_json(response).await["session_id"]
        .as_str()
        .unwrap()
        .to_string();

    let response = app
        .oneshot(authed("GET", &format!("/sessions/{}", session_id), &bob_token))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_session_polls_and_flushes_to_store() {
    let url = spawn_motion_service(vec![
        HashMap::from([("squats".to_string(), 30)]),
        HashMap::from([("squats".to_string(), 25)]),
    ])
    .await;
    let (app, state) = create_live_app(&url);
    let (id, token) = seed_enrolled(&state);

    let response = app
        .clone()
        .oneshot(authed("POST", &format!("/challenges/{}/sessions", id), &token))
        .await
        .unwrap();
    let session_id = body_json(response).await["session_id"]
        .as_str()
        .unwrap()
        .to_string();

    // Let the worker consume both scripted batches
    tokio::time::sleep(Duration::from_millis(300)).await;

    let response = app
        .clone()
        .oneshot(authed("DELETE", &format!("/sessions/{}", session_id), &token))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let closed = body_json(response).await;

    assert_eq!(closed["session"]["repCounts"]["squats"], 55);
    assert_eq!(closed["session"]["flushFailures"], 0);
    // 55 reps at 1 per 50: one full batch
    assert_eq!(closed["session"]["sessionContribution"], 1.0);
    assert_eq!(closed["progress"]["totalContribution"], 1.0);

    // The flushes landed in the challenge store, not just the session
    let challenge = state.store.get_challenge(&id).unwrap();
    let by_user: u64 = challenge
        .contributions
        .values()
        .map(|record| record.get("squats").copied().unwrap_or(0))
        .sum();
    assert_eq!(by_user, 55);
}

#[tokio::test]
async fn test_set_target_against_live_service() {
    let url = spawn_motion_service(vec![]).await;
    let (app, state) = create_live_app(&url);
    let (id, token) = seed_enrolled(&state);

    let response = app
        .clone()
        .oneshot(authed("POST", &format!("/challenges/{}/sessions", id), &token))
        .await
        .unwrap();
    let session_id = body_json(response).await["session_id"]
        .as_str()
        .unwrap()
        .to_string();

    // Wait for the availability probe to flip
    tokio::time::sleep(Duration::from_millis(150)).await;

    let response = app
        .clone()
        .oneshot(authed_json(
            "POST",
            &format!("/sessions/{}/target", session_id),
            &token,
            serde_json::json!({"target": "squats"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let result = body_json(response).await;
    assert_eq!(result["success"], true);
    assert_eq!(result["target"], "squats");

    // Exercises outside the challenge's enabled set never reach the service
    let response = app
        .oneshot(authed_json(
            "POST",
            &format!("/sessions/{}/target", session_id),
            &token,
            serde_json::json!({"target": "pushups"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}
