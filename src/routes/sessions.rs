// SPDX-License-Identifier: MIT

//! Live session routes. All require authentication.

use crate::error::Result;
use crate::middleware::auth::AuthUser;
use crate::services::{ClosedSession, SessionSnapshot};
use crate::AppState;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Extension, Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/challenges/{id}/sessions", post(start_session))
        .route(
            "/sessions/{session_id}",
            get(get_session).delete(close_session),
        )
        .route("/sessions/{session_id}/target", post(set_target))
}

#[derive(Serialize)]
pub struct StartSessionResponse {
    pub session_id: String,
}

/// Start a live tracking session against a challenge.
async fn start_session(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<String>,
) -> Result<(StatusCode, Json<StartSessionResponse>)> {
    let session_id = state.sessions.start_session(&id, &user.user_id)?;
    Ok((
        StatusCode::CREATED,
        Json(StartSessionResponse { session_id }),
    ))
}

/// Current session snapshot: local rep counts, contribution preview,
/// motion-service availability.
async fn get_session(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(session_id): Path<String>,
) -> Result<Json<SessionSnapshot>> {
    let snapshot = state.sessions.snapshot(&session_id, &user.user_id).await?;
    Ok(Json(snapshot))
}

#[derive(Deserialize)]
pub struct SetTargetRequest {
    pub target: String,
}

#[derive(Serialize)]
pub struct SetTargetResult {
    pub success: bool,
    pub target: String,
}

/// Select the exercise the motion service should count for this session.
async fn set_target(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(session_id): Path<String>,
    Json(request): Json<SetTargetRequest>,
) -> Result<Json<SetTargetResult>> {
    let response = state
        .sessions
        .set_target(&session_id, &user.user_id, &request.target)
        .await?;
    Ok(Json(SetTargetResult {
        success: response.success,
        target: response.target,
    }))
}

/// Close a session: drain pending increments and return the reconciled
/// challenge progress.
async fn close_session(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(session_id): Path<String>,
) -> Result<Json<ClosedSession>> {
    let closed = state.sessions.close(&session_id, &user.user_id).await?;
    Ok(Json(closed))
}
