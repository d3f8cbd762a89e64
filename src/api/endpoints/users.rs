//! Staff accounts of the caller's centre (admin only).

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::{Extension, Json};
use serde::Deserialize;

use super::parse_id;
use crate::api::error::ApiError;
use crate::api::types::{ApiContext, AuthContext};
use crate::auth::{self, NewUser, UserUpdate};
use crate::authorization::Permission;
use crate::db::repository;
use crate::models::User;

/// `GET /api/users`
pub async fn list(
    State(ctx): State<ApiContext>,
    Extension(caller): Extension<AuthContext>,
) -> Result<Json<Vec<User>>, ApiError> {
    caller.require(Permission::ManageUsers)?;
    let conn = ctx.state.open_db()?;
    Ok(Json(repository::list_users(&conn, &caller.centre_id)?))
}

/// `POST /api/users`
pub async fn create(
    State(ctx): State<ApiContext>,
    Extension(caller): Extension<AuthContext>,
    Json(input): Json<NewUser>,
) -> Result<(StatusCode, Json<User>), ApiError> {
    caller.require(Permission::ManageUsers)?;
    let conn = ctx.state.open_db()?;
    let user = auth::create_user(&conn, &caller.centre_id, input)?;
    Ok((StatusCode::CREATED, Json(user)))
}

/// `PUT /api/users/:id` — role changes revoke the user's sessions.
pub async fn update(
    State(ctx): State<ApiContext>,
    Extension(caller): Extension<AuthContext>,
    Path(id): Path<String>,
    Json(update): Json<UserUpdate>,
) -> Result<Json<User>, ApiError> {
    caller.require(Permission::ManageUsers)?;
    let id = parse_id(&id, "user")?;
    let conn = ctx.state.open_db()?;
    let role_changed = update.role.is_some();
    let user = auth::update_user(&conn, &caller.centre_id, &id, update)?;
    if role_changed {
        ctx.state.lock_sessions()?.revoke_user(&id);
    }
    Ok(Json(user))
}

#[derive(Deserialize)]
pub struct SetPasswordRequest {
    pub password: String,
}

/// `POST /api/users/:id/password` — admin reset.
pub async fn set_password(
    State(ctx): State<ApiContext>,
    Extension(caller): Extension<AuthContext>,
    Path(id): Path<String>,
    Json(request): Json<SetPasswordRequest>,
) -> Result<StatusCode, ApiError> {
    caller.require(Permission::ManageUsers)?;
    let id = parse_id(&id, "user")?;
    let conn = ctx.state.open_db()?;
    auth::set_password(&conn, &caller.centre_id, &id, &request.password)?;
    ctx.state.lock_sessions()?.revoke_user(&id);
    Ok(StatusCode::NO_CONTENT)
}

/// `DELETE /api/users/:id`
pub async fn delete(
    State(ctx): State<ApiContext>,
    Extension(caller): Extension<AuthContext>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    caller.require(Permission::ManageUsers)?;
    let id = parse_id(&id, "user")?;
    let conn = ctx.state.open_db()?;
    auth::delete_user(&conn, &caller.centre_id, &caller.user_id, &id)?;
    ctx.state.lock_sessions()?.revoke_user(&id);
    Ok(StatusCode::NO_CONTENT)
}
