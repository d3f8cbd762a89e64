//! Patient registry endpoints.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::{Extension, Json};

use super::parse_id;
use crate::api::error::ApiError;
use crate::api::types::{ApiContext, AuthContext};
use crate::authorization::Permission;
use crate::models::{Patient, PatientFilter};
use crate::patients::{self, PatientHistory, PatientInput};

/// `GET /api/patients?search=&limit=&offset=`
pub async fn list(
    State(ctx): State<ApiContext>,
    Extension(caller): Extension<AuthContext>,
    Query(filter): Query<PatientFilter>,
) -> Result<Json<Vec<Patient>>, ApiError> {
    caller.require(Permission::ViewPatients)?;
    let conn = ctx.state.open_db()?;
    Ok(Json(patients::search_patients(&conn, &caller.centre_id, &filter)?))
}

/// `POST /api/patients`
pub async fn create(
    State(ctx): State<ApiContext>,
    Extension(caller): Extension<AuthContext>,
    Json(input): Json<PatientInput>,
) -> Result<(StatusCode, Json<Patient>), ApiError> {
    caller.require(Permission::ManagePatients)?;
    let conn = ctx.state.open_db()?;
    let patient = patients::create_patient(&conn, &caller.centre_id, input)?;
    Ok((StatusCode::CREATED, Json(patient)))
}

/// `GET /api/patients/:id`
pub async fn get(
    State(ctx): State<ApiContext>,
    Extension(caller): Extension<AuthContext>,
    Path(id): Path<String>,
) -> Result<Json<Patient>, ApiError> {
    caller.require(Permission::ViewPatients)?;
    let id = parse_id(&id, "patient")?;
    let conn = ctx.state.open_db()?;
    Ok(Json(patients::get_patient(&conn, &caller.centre_id, &id)?))
}

/// `PUT /api/patients/:id`
pub async fn update(
    State(ctx): State<ApiContext>,
    Extension(caller): Extension<AuthContext>,
    Path(id): Path<String>,
    Json(input): Json<PatientInput>,
) -> Result<Json<Patient>, ApiError> {
    caller.require(Permission::ManagePatients)?;
    let id = parse_id(&id, "patient")?;
    let conn = ctx.state.open_db()?;
    Ok(Json(patients::update_patient(&conn, &caller.centre_id, &id, input)?))
}

/// `DELETE /api/patients/:id` — refused once the patient has history.
pub async fn delete(
    State(ctx): State<ApiContext>,
    Extension(caller): Extension<AuthContext>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    caller.require(Permission::ManagePatients)?;
    let id = parse_id(&id, "patient")?;
    let conn = ctx.state.open_db()?;
    patients::delete_patient(&conn, &caller.centre_id, &id)?;
    Ok(StatusCode::NO_CONTENT)
}

/// `GET /api/patients/:id/history` — sales, sessions and bills in one view.
pub async fn history(
    State(ctx): State<ApiContext>,
    Extension(caller): Extension<AuthContext>,
    Path(id): Path<String>,
) -> Result<Json<PatientHistory>, ApiError> {
    caller.require(Permission::ViewPatients)?;
    let id = parse_id(&id, "patient")?;
    let conn = ctx.state.open_db()?;
    Ok(Json(patients::patient_history(&conn, &caller.centre_id, &id)?))
}
