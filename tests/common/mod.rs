// SPDX-License-Identifier: MIT

use motion4good::config::Config;
use motion4good::db::ChallengeStore;
use motion4good::middleware::auth::create_jwt;
use motion4good::routes::create_router;
use motion4good::services::{MotionClient, SessionService};
use motion4good::AppState;
use std::sync::Arc;

/// Create a test app with an offline mock motion client.
/// Returns the router and the shared state.
#[allow(dead_code)]
pub fn create_test_app() -> (axum::Router, Arc<AppState>) {
    let config = Config::default();
    let store = ChallengeStore::new();
    let motion = MotionClient::new_mock();
    let sessions = SessionService::new(store.clone(), motion.clone(), &config);

    let state = Arc::new(AppState {
        config,
        store,
        motion,
        sessions,
    });

    (create_router(state.clone()), state)
}

/// Seed a user directly in the store and mint a token for them.
#[allow(dead_code)]
pub fn seed_user(state: &AppState, username: &str, email: &str) -> (String, String) {
    let hash = motion4good::services::password::hash_password("correct horse").unwrap();
    let user_id = state
        .store
        .create_user(username.to_string(), email.to_string(), hash)
        .unwrap();
    let token = create_jwt(&user_id, &state.config.jwt_signing_key).unwrap();
    (user_id, token)
}

/// A well-formed challenge creation body with the given exercises, one goal
/// and reward entry per exercise.
#[allow(dead_code)]
pub fn challenge_body(name: &str, exercises: &[&str], goal: u64) -> serde_json::Value {
    let goals: serde_json::Map<String, serde_json::Value> = exercises
        .iter()
        .map(|e| (e.to_string(), serde_json::json!(goal)))
        .collect();
    let rewards: serde_json::Map<String, serde_json::Value> = exercises
        .iter()
        .map(|e| {
            (
                e.to_string(),
                serde_json::json!({"amount": 1.0, "perReps": 50}),
            )
        })
        .collect();

    serde_json::json!({
        "name": name,
        "description": "integration test challenge",
        "enabled_exercises": exercises,
        "rep_goal": goals,
        "rep_reward": rewards,
        "rep_reward_type": "trees planted",
        "completion_reward": "a forest",
        "start_date": "2025-01-01T00:00:00Z",
        "end_date": "2099-01-01T00:00:00Z",
    })
}
