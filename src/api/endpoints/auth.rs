//! Login, logout and the caller's own account.
//!
//! `POST /api/auth/login` — Unprotected
//! `POST /api/auth/logout`, `GET /api/auth/me`, `POST /api/auth/password` — Protected

use axum::extract::State;
use axum::http::StatusCode;
use axum::{Extension, Json};
use serde::{Deserialize, Serialize};

use crate::api::error::ApiError;
use crate::api::types::{ApiContext, AuthContext};
use crate::auth;
use crate::db::repository;
use crate::models::User;

#[derive(Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Serialize)]
pub struct LoginResponse {
    pub token: String,
    pub expires_in_secs: u64,
    pub user: User,
}

/// `POST /api/auth/login` — exchange credentials for a session token.
pub async fn login(
    State(ctx): State<ApiContext>,
    Json(request): Json<LoginRequest>,
) -> Result<Json<LoginResponse>, ApiError> {
    let conn = ctx.state.open_db()?;
    let outcome = auth::login(
        &conn,
        ctx.state.session_store(),
        request.email.trim(),
        &request.password,
    )?;

    Ok(Json(LoginResponse {
        token: outcome.token,
        expires_in_secs: outcome.expires_in_secs,
        user: outcome.user,
    }))
}

/// `POST /api/auth/logout` — revoke the presented token.
pub async fn logout(
    State(ctx): State<ApiContext>,
    Extension(caller): Extension<AuthContext>,
) -> Result<StatusCode, ApiError> {
    auth::logout(ctx.state.session_store(), &caller.token)?;
    tracing::info!(user_id = %caller.user_id, "User logged out");
    Ok(StatusCode::NO_CONTENT)
}

/// `GET /api/auth/me` — the calling user.
pub async fn me(
    State(ctx): State<ApiContext>,
    Extension(caller): Extension<AuthContext>,
) -> Result<Json<User>, ApiError> {
    let conn = ctx.state.open_db()?;
    let user = repository::get_user(&conn, &caller.centre_id, &caller.user_id)?
        .ok_or(ApiError::Unauthorized)?;
    Ok(Json(user))
}

#[derive(Deserialize)]
pub struct ChangePasswordRequest {
    pub current_password: String,
    pub new_password: String,
}

/// `POST /api/auth/password` — change own password and revoke every session of the user.
pub async fn change_password(
    State(ctx): State<ApiContext>,
    Extension(caller): Extension<AuthContext>,
    Json(request): Json<ChangePasswordRequest>,
) -> Result<StatusCode, ApiError> {
    let conn = ctx.state.open_db()?;
    auth::change_password(
        &conn,
        &caller.centre_id,
        &caller.user_id,
        &request.current_password,
        &request.new_password,
    )?;

    ctx.state.lock_sessions()?.revoke_user(&caller.user_id);
    Ok(StatusCode::NO_CONTENT)
}
