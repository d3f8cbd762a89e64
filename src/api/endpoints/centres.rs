//! Tenant bootstrap and the caller's centre.

use axum::extract::State;
use axum::http::StatusCode;
use axum::{Extension, Json};
use serde::Serialize;

use crate::api::error::ApiError;
use crate::api::types::{ApiContext, AuthContext};
use crate::auth::{self, BootstrapRequest};
use crate::db::repository;
use crate::models::{Centre, User};

#[derive(Serialize)]
pub struct BootstrapResponse {
    pub centre: Centre,
    pub admin: User,
}

/// `POST /api/centres` — Unprotected: create a centre and its first admin.
pub async fn bootstrap(
    State(ctx): State<ApiContext>,
    Json(request): Json<BootstrapRequest>,
) -> Result<(StatusCode, Json<BootstrapResponse>), ApiError> {
    let conn = ctx.state.open_db()?;
    let (centre, admin) = auth::bootstrap_centre(&conn, &request)?;
    Ok((StatusCode::CREATED, Json(BootstrapResponse { centre, admin })))
}

/// `GET /api/centre` — the caller's centre.
pub async fn current(
    State(ctx): State<ApiContext>,
    Extension(caller): Extension<AuthContext>,
) -> Result<Json<Centre>, ApiError> {
    let conn = ctx.state.open_db()?;
    let centre = repository::get_centre(&conn, &caller.centre_id)?
        .ok_or_else(|| ApiError::NotFound("Centre not found".into()))?;
    Ok(Json(centre))
}
