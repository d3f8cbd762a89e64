//! Questionnaire and examination template endpoints.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::{Extension, Json};
use serde::Deserialize;

use super::parse_id;
use crate::api::error::ApiError;
use crate::api::types::{ApiContext, AuthContext};
use crate::authorization::Permission;
use crate::models::{FormTemplate, TemplateKind};
use crate::templates::{self, TemplateInput};

#[derive(Deserialize)]
pub struct ListQuery {
    pub kind: Option<TemplateKind>,
}

/// `GET /api/templates?kind=questionnaire|examination`
pub async fn list(
    State(ctx): State<ApiContext>,
    Extension(caller): Extension<AuthContext>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Vec<FormTemplate>>, ApiError> {
    caller.require(Permission::ViewCatalogue)?;
    let conn = ctx.state.open_db()?;
    Ok(Json(templates::list_templates(&conn, &caller.centre_id, query.kind)?))
}

/// `POST /api/templates`
pub async fn create(
    State(ctx): State<ApiContext>,
    Extension(caller): Extension<AuthContext>,
    Json(input): Json<TemplateInput>,
) -> Result<(StatusCode, Json<FormTemplate>), ApiError> {
    caller.require(Permission::ManageCatalogue)?;
    let conn = ctx.state.open_db()?;
    let template = templates::create_template(&conn, &caller.centre_id, input)?;
    Ok((StatusCode::CREATED, Json(template)))
}

/// `GET /api/templates/:id`
pub async fn get(
    State(ctx): State<ApiContext>,
    Extension(caller): Extension<AuthContext>,
    Path(id): Path<String>,
) -> Result<Json<FormTemplate>, ApiError> {
    caller.require(Permission::ViewCatalogue)?;
    let id = parse_id(&id, "template")?;
    let conn = ctx.state.open_db()?;
    Ok(Json(templates::get_template(&conn, &caller.centre_id, &id)?))
}

/// `PUT /api/templates/:id`
pub async fn update(
    State(ctx): State<ApiContext>,
    Extension(caller): Extension<AuthContext>,
    Path(id): Path<String>,
    Json(input): Json<TemplateInput>,
) -> Result<Json<FormTemplate>, ApiError> {
    caller.require(Permission::ManageCatalogue)?;
    let id = parse_id(&id, "template")?;
    let conn = ctx.state.open_db()?;
    Ok(Json(templates::update_template(&conn, &caller.centre_id, &id, input)?))
}

/// `DELETE /api/templates/:id`
pub async fn delete(
    State(ctx): State<ApiContext>,
    Extension(caller): Extension<AuthContext>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    caller.require(Permission::ManageCatalogue)?;
    let id = parse_id(&id, "template")?;
    let conn = ctx.state.open_db()?;
    templates::delete_template(&conn, &caller.centre_id, &id)?;
    Ok(StatusCode::NO_CONTENT)
}
