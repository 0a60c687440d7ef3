// SPDX-License-Identifier: MIT

//! Challenge routes: lifecycle, enrollment, contributions and the
//! reward-engine views (progress, leaderboard).

use crate::error::{AppError, Result};
use crate::middleware::auth::AuthUser;
use crate::models::{Challenge, CreateChallengeRequest};
use crate::services::leaderboard::{self, RankScope, SortKey, SortOrder, TOP_N};
use crate::services::rewards::{self, ChallengeProgress};
use crate::services::{ContributorRank, LeaderboardPage};
use crate::AppState;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{delete, get, post},
    Extension, Json, Router,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use validator::Validate;

/// Routes available without authentication.
pub fn public_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/challenges", get(list_challenges))
        .route("/challenges/{id}", get(get_challenge))
        .route("/challenges/{id}/progress", get(get_progress))
        .route("/challenges/{id}/leaderboard", get(get_leaderboard))
        .route(
            "/challenges/{id}/contributions/{user_id}",
            get(get_contributions),
        )
}

/// Routes that require authentication (auth middleware applied in
/// routes/mod.rs).
pub fn protected_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/challenges", post(create_challenge))
        .route("/challenges/my", get(list_my_challenges))
        .route("/challenges/enrolled", get(list_enrolled_challenges))
        .route("/challenges/{id}", delete(delete_challenge))
        .route("/challenges/{id}/enroll", post(enroll))
        .route("/challenges/{id}/unenroll", post(unenroll))
        .route(
            "/challenges/{id}/contributions/increment",
            post(increment_contributions),
        )
}

// ─── Lifecycle ───────────────────────────────────────────────

#[derive(Serialize)]
pub struct CreateChallengeResponse {
    pub challenge_id: String,
}

/// Create a challenge. Goal/reward misconfiguration is rejected here so it
/// never reaches the reward computations.
async fn create_challenge(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Json(request): Json<CreateChallengeRequest>,
) -> Result<(StatusCode, Json<CreateChallengeResponse>)> {
    request
        .validate()
        .map_err(|e| AppError::BadRequest(e.to_string()))?;
    request
        .check_invariants()
        .map_err(AppError::BadRequest)?;

    let id = state.store.next_challenge_id()?;
    let challenge = request.into_challenge(id.clone(), user.user_id.clone(), chrono::Utc::now());
    state.store.create_challenge(challenge);

    tracing::info!(challenge_id = %id, creator = %user.user_id, "Challenge created");
    Ok((
        StatusCode::CREATED,
        Json(CreateChallengeResponse { challenge_id: id }),
    ))
}

#[derive(Serialize)]
pub struct ChallengesResponse {
    pub challenges: Vec<Challenge>,
}

async fn list_challenges(State(state): State<Arc<AppState>>) -> Json<ChallengesResponse> {
    Json(ChallengesResponse {
        challenges: state.store.list_challenges(),
    })
}

/// Challenges created by the user or where the user participates.
async fn list_my_challenges(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
) -> Json<ChallengesResponse> {
    Json(ChallengesResponse {
        challenges: state.store.list_mine(&user.user_id),
    })
}

async fn list_enrolled_challenges(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
) -> Json<ChallengesResponse> {
    Json(ChallengesResponse {
        challenges: state.store.list_enrolled(&user.user_id),
    })
}

async fn get_challenge(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Challenge>> {
    Ok(Json(state.store.get_challenge(&id)?))
}

#[derive(Serialize)]
pub struct SuccessResponse {
    pub success: bool,
}

async fn delete_challenge(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<String>,
) -> Result<Json<SuccessResponse>> {
    state.store.delete_challenge(&id, &user.user_id)?;
    Ok(Json(SuccessResponse { success: true }))
}

// ─── Enrollment ──────────────────────────────────────────────

async fn enroll(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<String>,
) -> Result<Json<SuccessResponse>> {
    state.store.enroll(&id, &user.user_id)?;
    tracing::info!(challenge_id = %id, user_id = %user.user_id, "User enrolled");
    Ok(Json(SuccessResponse { success: true }))
}

async fn unenroll(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<String>,
) -> Result<Json<SuccessResponse>> {
    state.store.unenroll(&id, &user.user_id)?;
    tracing::info!(challenge_id = %id, user_id = %user.user_id, "User unenrolled");
    Ok(Json(SuccessResponse { success: true }))
}

// ─── Contributions ───────────────────────────────────────────

#[derive(Deserialize)]
pub struct IncrementRequest {
    pub increments: HashMap<String, u64>,
}

#[derive(Serialize)]
pub struct IncrementResponse {
    /// Deltas applied, per enabled exercise
    pub increments: HashMap<String, u64>,
    #[serde(skip_serializing_if = "HashMap::is_empty")]
    pub ignored: HashMap<String, u64>,
    /// Whether this increment completed the challenge
    pub completed: bool,
}

async fn increment_contributions(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<String>,
    Json(request): Json<IncrementRequest>,
) -> Result<Json<IncrementResponse>> {
    let outcome = state
        .store
        .increment_contributions(&id, &user.user_id, &request.increments)?;

    Ok(Json(IncrementResponse {
        increments: outcome.applied,
        ignored: outcome.ignored,
        completed: outcome.completed_now,
    }))
}

async fn get_contributions(
    State(state): State<Arc<AppState>>,
    Path((id, user_id)): Path<(String, String)>,
) -> Result<Json<HashMap<String, u64>>> {
    Ok(Json(state.store.get_contributions(&id, &user_id)?))
}

// ─── Reward-engine views ─────────────────────────────────────

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressResponse {
    #[serde(flatten)]
    pub progress: ChallengeProgress,
    pub top_contributors: Vec<ContributorRank>,
}

/// Aggregated progress for a challenge: per-exercise capped/actual reps,
/// contributions, completion status and the top-3 contributors.
async fn get_progress(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<ProgressResponse>> {
    let challenge = state.store.get_challenge(&id)?;
    let progress = rewards::progress(&challenge, chrono::Utc::now());
    let mut top = leaderboard::top_contributors(&challenge, RankScope::AllRecorded, TOP_N);
    resolve_usernames(&state, &mut top);

    Ok(Json(ProgressResponse {
        progress,
        top_contributors: top,
    }))
}

#[derive(Deserialize)]
struct LeaderboardQuery {
    #[serde(default = "default_page")]
    page: usize,
    filter: Option<String>,
    /// "total" (default) or an enabled exercise name
    sort_by: Option<String>,
    /// "asc" or "desc" (default)
    order: Option<String>,
    /// "all_recorded" (default) or "enabled_only"
    scope: Option<String>,
}

fn default_page() -> usize {
    1
}

/// Full paginated leaderboard (fixed page size of 10).
async fn get_leaderboard(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Query(params): Query<LeaderboardQuery>,
) -> Result<Json<LeaderboardPage>> {
    let challenge = state.store.get_challenge(&id)?;

    let scope = match params.scope.as_deref() {
        None | Some("all_recorded") => RankScope::AllRecorded,
        Some("enabled_only") => RankScope::EnabledOnly,
        Some(other) => {
            return Err(AppError::BadRequest(format!(
                "Invalid scope '{}': expected all_recorded or enabled_only",
                other
            )))
        }
    };

    let sort_key = match params.sort_by.as_deref() {
        None | Some("total") => SortKey::Total,
        Some(exercise) => {
            if !challenge.enabled_exercises.iter().any(|e| e == exercise) {
                return Err(AppError::BadRequest(format!(
                    "Cannot sort by '{}': not an enabled exercise",
                    exercise
                )));
            }
            SortKey::Exercise(exercise.to_string())
        }
    };

    let order = match params.order.as_deref() {
        None | Some("desc") => SortOrder::Descending,
        Some("asc") => SortOrder::Ascending,
        Some(other) => {
            return Err(AppError::BadRequest(format!(
                "Invalid order '{}': expected asc or desc",
                other
            )))
        }
    };

    let mut ranked = leaderboard::rank_contributors(&challenge, scope);
    resolve_usernames(&state, &mut ranked);

    Ok(Json(leaderboard::paginate(
        ranked,
        params.filter.as_deref(),
        &sort_key,
        order,
        params.page,
    )))
}

/// Attach display names to ranked entries where the user still exists.
fn resolve_usernames(state: &AppState, entries: &mut [ContributorRank]) {
    for entry in entries {
        entry.username = state.store.get_user(&entry.user_id).map(|u| u.username);
    }
}
