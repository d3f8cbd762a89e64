//! Therapist roster endpoints.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::{Extension, Json};
use serde::Deserialize;

use super::parse_id;
use crate::api::error::ApiError;
use crate::api::types::{ApiContext, AuthContext};
use crate::authorization::Permission;
use crate::models::Therapist;
use crate::therapists::{self, TherapistInput};

#[derive(Deserialize)]
pub struct ListQuery {
    #[serde(default)]
    pub active_only: bool,
}

/// `GET /api/therapists?active_only=`
pub async fn list(
    State(ctx): State<ApiContext>,
    Extension(caller): Extension<AuthContext>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Vec<Therapist>>, ApiError> {
    caller.require(Permission::ViewSessions)?;
    let conn = ctx.state.open_db()?;
    Ok(Json(therapists::list_therapists(&conn, &caller.centre_id, query.active_only)?))
}

/// `POST /api/therapists`
pub async fn create(
    State(ctx): State<ApiContext>,
    Extension(caller): Extension<AuthContext>,
    Json(input): Json<TherapistInput>,
) -> Result<(StatusCode, Json<Therapist>), ApiError> {
    caller.require(Permission::ManageUsers)?;
    let conn = ctx.state.open_db()?;
    let therapist = therapists::create_therapist(&conn, &caller.centre_id, input)?;
    Ok((StatusCode::CREATED, Json(therapist)))
}

/// `GET /api/therapists/:id`
pub async fn get(
    State(ctx): State<ApiContext>,
    Extension(caller): Extension<AuthContext>,
    Path(id): Path<String>,
) -> Result<Json<Therapist>, ApiError> {
    caller.require(Permission::ViewSessions)?;
    let id = parse_id(&id, "therapist")?;
    let conn = ctx.state.open_db()?;
    Ok(Json(therapists::get_therapist(&conn, &caller.centre_id, &id)?))
}

/// `PUT /api/therapists/:id`
pub async fn update(
    State(ctx): State<ApiContext>,
    Extension(caller): Extension<AuthContext>,
    Path(id): Path<String>,
    Json(input): Json<TherapistInput>,
) -> Result<Json<Therapist>, ApiError> {
    caller.require(Permission::ManageUsers)?;
    let id = parse_id(&id, "therapist")?;
    let conn = ctx.state.open_db()?;
    Ok(Json(therapists::update_therapist(&conn, &caller.centre_id, &id, input)?))
}

/// `DELETE /api/therapists/:id` — deactivates; history is kept.
pub async fn deactivate(
    State(ctx): State<ApiContext>,
    Extension(caller): Extension<AuthContext>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    caller.require(Permission::ManageUsers)?;
    let id = parse_id(&id, "therapist")?;
    let conn = ctx.state.open_db()?;
    therapists::deactivate_therapist(&conn, &caller.centre_id, &id)?;
    Ok(StatusCode::NO_CONTENT)
}
