// SPDX-License-Identifier: MIT

//! Registration and login routes.

use crate::error::{AppError, Result};
use crate::middleware::auth::create_jwt;
use crate::services::password;
use crate::AppState;
use axum::{extract::State, http::StatusCode, routing::post, Json, Router};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use validator::Validate;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/users", post(register))
        .route("/auth/login", post(login))
        .route("/auth/logout", post(logout))
}

#[derive(Deserialize, Validate)]
pub struct RegisterRequest {
    #[validate(length(min = 1, max = 50))]
    pub username: String,
    #[validate(email)]
    pub email: String,
    #[validate(length(min = 8, max = 128))]
    pub password: String,
}

#[derive(Serialize)]
pub struct RegisterResponse {
    pub user_id: String,
}

/// Create a new account.
async fn register(
    State(state): State<Arc<AppState>>,
    Json(request): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<RegisterResponse>)> {
    request
        .validate()
        .map_err(|e| AppError::BadRequest(e.to_string()))?;

    let password_hash = password::hash_password(&request.password)?;
    let user_id = state
        .store
        .create_user(request.username, request.email, password_hash)?;

    tracing::info!(user_id, "User registered");
    Ok((StatusCode::CREATED, Json(RegisterResponse { user_id })))
}

#[derive(Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Serialize)]
pub struct LoginResponse {
    pub user_id: String,
    pub token: String,
}

/// Exchange email + password for a session token.
async fn login(
    State(state): State<Arc<AppState>>,
    Json(request): Json<LoginRequest>,
) -> Result<Json<LoginResponse>> {
    let user = state
        .store
        .find_user_by_email(&request.email)
        .ok_or(AppError::Unauthorized)?;

    if !password::verify_password(&request.password, &user.password_hash) {
        return Err(AppError::Unauthorized);
    }

    let token = create_jwt(&user.id, &state.config.jwt_signing_key)?;
    Ok(Json(LoginResponse {
        user_id: user.id,
        token,
    }))
}

#[derive(Serialize)]
pub struct LogoutResponse {
    pub success: bool,
}

/// Stateless logout: the client discards its token.
async fn logout() -> Json<LogoutResponse> {
    Json(LogoutResponse { success: true })
}
