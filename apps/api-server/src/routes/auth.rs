//! Login, the caller's own account, and account creation.

use std::sync::Arc;

use apothecary_core::{Action, User};
use apothecary_db::NewUser;
use axum::{extract::State, http::StatusCode, Json};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{ApiError, ApiResult};
use crate::{Actor, AppState};

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub access_token: String,
    pub token_type: &'static str,
    pub expires_in: i64,
    pub user: User,
}

pub async fn login(
    State(state): State<Arc<AppState>>,
    Json(request): Json<LoginRequest>,
) -> ApiResult<Json<LoginResponse>> {
    let user = state
        .db
        .users()
        .verify_credentials(&request.username, &request.password)
        .await?
        .ok_or_else(|| ApiError::Unauthorized("Invalid username or password".to_string()))?;

    let access_token = state.jwt.issue(&user)?;
    info!(user = %user.username, role = %user.role, "Logged in");

    Ok(Json(LoginResponse {
        access_token,
        token_type: "Bearer",
        expires_in: state.jwt.access_lifetime_secs(),
        user,
    }))
}

/// The account behind the token.
pub async fn me(State(state): State<Arc<AppState>>, actor: Actor) -> ApiResult<Json<User>> {
    state
        .db
        .users()
        .get_by_id(&actor.user_id)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::not_found("User", &actor.user_id))
}

#[derive(Debug, Deserialize)]
pub struct ChangePasswordRequest {
    pub old_password: String,
    pub new_password: String,
}

pub async fn change_password(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    Json(request): Json<ChangePasswordRequest>,
) -> ApiResult<StatusCode> {
    state
        .db
        .users()
        .change_password(&actor.user_id, &request.old_password, &request.new_password)
        .await?;

    info!(user = %actor.username, "Password changed");
    Ok(StatusCode::NO_CONTENT)
}

pub async fn create_user(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    Json(request): Json<NewUser>,
) -> ApiResult<(StatusCode, Json<User>)> {
    actor.require(Action::ManageUsers)?;

    let user = state.db.users().create(request).await?;
    Ok((StatusCode::CREATED, Json(user)))
}
