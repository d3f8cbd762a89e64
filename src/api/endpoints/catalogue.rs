//! Treatment and package catalogue endpoints.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::{Extension, Json};
use serde::Deserialize;

use super::parse_id;
use crate::api::error::ApiError;
use crate::api::types::{ApiContext, AuthContext};
use crate::authorization::Permission;
use crate::catalogue::{self, PackageInput, TreatmentInput};
use crate::models::{PackageDef, Treatment};

#[derive(Deserialize)]
pub struct ListQuery {
    #[serde(default)]
    pub active_only: bool,
}

// ═══════════════════════════════════════════════════════════
// Treatments
// ═══════════════════════════════════════════════════════════

/// `GET /api/treatments?active_only=`
pub async fn list_treatments(
    State(ctx): State<ApiContext>,
    Extension(caller): Extension<AuthContext>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Vec<Treatment>>, ApiError> {
    caller.require(Permission::ViewCatalogue)?;
    let conn = ctx.state.open_db()?;
    Ok(Json(catalogue::list_treatments(&conn, &caller.centre_id, query.active_only)?))
}

/// `POST /api/treatments`
pub async fn create_treatment(
    State(ctx): State<ApiContext>,
    Extension(caller): Extension<AuthContext>,
    Json(input): Json<TreatmentInput>,
) -> Result<(StatusCode, Json<Treatment>), ApiError> {
    caller.require(Permission::ManageCatalogue)?;
    let conn = ctx.state.open_db()?;
    let treatment = catalogue::create_treatment(&conn, &caller.centre_id, input)?;
    Ok((StatusCode::CREATED, Json(treatment)))
}

/// `GET /api/treatments/:id`
pub async fn get_treatment(
    State(ctx): State<ApiContext>,
    Extension(caller): Extension<AuthContext>,
    Path(id): Path<String>,
) -> Result<Json<Treatment>, ApiError> {
    caller.require(Permission::ViewCatalogue)?;
    let id = parse_id(&id, "treatment")?;
    let conn = ctx.state.open_db()?;
    Ok(Json(catalogue::get_treatment(&conn, &caller.centre_id, &id)?))
}

/// `PUT /api/treatments/:id`
pub async fn update_treatment(
    State(ctx): State<ApiContext>,
    Extension(caller): Extension<AuthContext>,
    Path(id): Path<String>,
    Json(input): Json<TreatmentInput>,
) -> Result<Json<Treatment>, ApiError> {
    caller.require(Permission::ManageCatalogue)?;
    let id = parse_id(&id, "treatment")?;
    let conn = ctx.state.open_db()?;
    Ok(Json(catalogue::update_treatment(&conn, &caller.centre_id, &id, input)?))
}

/// `DELETE /api/treatments/:id`
pub async fn delete_treatment(
    State(ctx): State<ApiContext>,
    Extension(caller): Extension<AuthContext>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    caller.require(Permission::ManageCatalogue)?;
    let id = parse_id(&id, "treatment")?;
    let conn = ctx.state.open_db()?;
    catalogue::delete_treatment(&conn, &caller.centre_id, &id)?;
    Ok(StatusCode::NO_CONTENT)
}

// ═══════════════════════════════════════════════════════════
// Packages
// ═══════════════════════════════════════════════════════════

/// `GET /api/packages?active_only=`
pub async fn list_packages(
    State(ctx): State<ApiContext>,
    Extension(caller): Extension<AuthContext>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Vec<PackageDef>>, ApiError> {
    caller.require(Permission::ViewCatalogue)?;
    let conn = ctx.state.open_db()?;
    Ok(Json(catalogue::list_packages(&conn, &caller.centre_id, query.active_only)?))
}

/// `POST /api/packages`
pub async fn create_package(
    State(ctx): State<ApiContext>,
    Extension(caller): Extension<AuthContext>,
    Json(input): Json<PackageInput>,
) -> Result<(StatusCode, Json<PackageDef>), ApiError> {
    caller.require(Permission::ManageCatalogue)?;
    let conn = ctx.state.open_db()?;
    let package = catalogue::create_package(&conn, &caller.centre_id, input)?;
    Ok((StatusCode::CREATED, Json(package)))
}

/// `GET /api/packages/:id`
pub async fn get_package(
    State(ctx): State<ApiContext>,
    Extension(caller): Extension<AuthContext>,
    Path(id): Path<String>,
) -> Result<Json<PackageDef>, ApiError> {
    caller.require(Permission::ViewCatalogue)?;
    let id = parse_id(&id, "package")?;
    let conn = ctx.state.open_db()?;
    Ok(Json(catalogue::get_package(&conn, &caller.centre_id, &id)?))
}

/// `PUT /api/packages/:id`
pub async fn update_package(
    State(ctx): State<ApiContext>,
    Extension(caller): Extension<AuthContext>,
    Path(id): Path<String>,
    Json(input): Json<PackageInput>,
) -> Result<Json<PackageDef>, ApiError> {
    caller.require(Permission::ManageCatalogue)?;
    let id = parse_id(&id, "package")?;
    let conn = ctx.state.open_db()?;
    Ok(Json(catalogue::update_package(&conn, &caller.centre_id, &id, input)?))
}

/// `DELETE /api/packages/:id` — deactivates; sold packages stay readable.
pub async fn deactivate_package(
    State(ctx): State<ApiContext>,
    Extension(caller): Extension<AuthContext>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    caller.require(Permission::ManageCatalogue)?;
    let id = parse_id(&id, "package")?;
    let conn = ctx.state.open_db()?;
    catalogue::deactivate_package(&conn, &caller.centre_id, &id)?;
    Ok(StatusCode::NO_CONTENT)
}
