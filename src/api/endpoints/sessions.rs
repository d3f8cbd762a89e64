//! Treatment session endpoints.
//!
//! Therapists only reach sessions assigned to them; other roles see the
//! whole centre.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::{Extension, Json};
use rusqlite::Connection;
use serde::Deserialize;
use uuid::Uuid;

use super::{own_therapist, parse_id};
use crate::api::error::ApiError;
use crate::api::types::{ApiContext, AuthContext};
use crate::authorization::{AccessLevel, Permission};
use crate::models::{Session, SessionFilter, SessionStatus};
use crate::scheduling::{self, BookSessionRequest, NotesUpdate, RescheduleRequest};

/// Load a session, enforcing own-record access for therapists.
fn load_accessible(
    conn: &Connection,
    caller: &AuthContext,
    access: AccessLevel,
    id: &Uuid,
) -> Result<Session, ApiError> {
    let session = scheduling::get_session(conn, &caller.centre_id, id)?;
    if access == AccessLevel::OwnRecords {
        let therapist = own_therapist(conn, caller)?;
        if session.therapist_id != therapist.id {
            return Err(ApiError::Forbidden("Session is assigned to another therapist".into()));
        }
    }
    Ok(session)
}

/// `GET /api/sessions?from=&to=&therapist_id=&patient_id=&status=&package_sale_id=`
pub async fn list(
    State(ctx): State<ApiContext>,
    Extension(caller): Extension<AuthContext>,
    Query(mut filter): Query<SessionFilter>,
) -> Result<Json<Vec<Session>>, ApiError> {
    let access = caller.require(Permission::ViewSessions)?;
    let conn = ctx.state.open_db()?;
    if access == AccessLevel::OwnRecords {
        filter.therapist_id = Some(own_therapist(&conn, &caller)?.id);
    }
    Ok(Json(scheduling::list_sessions(&conn, &caller.centre_id, &filter)?))
}

/// `POST /api/sessions` — book a single session.
pub async fn book(
    State(ctx): State<ApiContext>,
    Extension(caller): Extension<AuthContext>,
    Json(request): Json<BookSessionRequest>,
) -> Result<(StatusCode, Json<Session>), ApiError> {
    caller.require(Permission::ManageSessions)?;
    let conn = ctx.state.open_db()?;
    let session = scheduling::book_session(&conn, &caller.centre_id, request)?;
    Ok((StatusCode::CREATED, Json(session)))
}

/// `GET /api/sessions/:id`
pub async fn get(
    State(ctx): State<ApiContext>,
    Extension(caller): Extension<AuthContext>,
    Path(id): Path<String>,
) -> Result<Json<Session>, ApiError> {
    let access = caller.require(Permission::ViewSessions)?;
    let id = parse_id(&id, "session")?;
    let conn = ctx.state.open_db()?;
    Ok(Json(load_accessible(&conn, &caller, access, &id)?))
}

/// `PUT /api/sessions/:id/schedule` — move a scheduled session.
pub async fn reschedule(
    State(ctx): State<ApiContext>,
    Extension(caller): Extension<AuthContext>,
    Path(id): Path<String>,
    Json(request): Json<RescheduleRequest>,
) -> Result<Json<Session>, ApiError> {
    caller.require(Permission::ManageSessions)?;
    let id = parse_id(&id, "session")?;
    let conn = ctx.state.open_db()?;
    Ok(Json(scheduling::reschedule_session(&conn, &caller.centre_id, &id, request)?))
}

#[derive(Deserialize)]
pub struct StatusRequest {
    pub status: SessionStatus,
}

/// `POST /api/sessions/:id/status`
pub async fn update_status(
    State(ctx): State<ApiContext>,
    Extension(caller): Extension<AuthContext>,
    Path(id): Path<String>,
    Json(request): Json<StatusRequest>,
) -> Result<Json<Session>, ApiError> {
    let access = caller.require(Permission::UpdateSessions)?;
    let id = parse_id(&id, "session")?;
    let conn = ctx.state.open_db()?;
    load_accessible(&conn, &caller, access, &id)?;
    Ok(Json(scheduling::update_session_status(&conn, &caller.centre_id, &id, request.status)?))
}

/// `PUT /api/sessions/:id/notes` — notes, treatment and template answers.
pub async fn update_notes(
    State(ctx): State<ApiContext>,
    Extension(caller): Extension<AuthContext>,
    Path(id): Path<String>,
    Json(update): Json<NotesUpdate>,
) -> Result<Json<Session>, ApiError> {
    let access = caller.require(Permission::UpdateSessions)?;
    let id = parse_id(&id, "session")?;
    let conn = ctx.state.open_db()?;
    load_accessible(&conn, &caller, access, &id)?;
    Ok(Json(scheduling::update_session_notes(&conn, &caller.centre_id, &id, update)?))
}

/// `DELETE /api/sessions/:id` — scheduled or cancelled sessions only.
pub async fn delete(
    State(ctx): State<ApiContext>,
    Extension(caller): Extension<AuthContext>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    caller.require(Permission::ManageSessions)?;
    let id = parse_id(&id, "session")?;
    let conn = ctx.state.open_db()?;
    scheduling::delete_session(&conn, &caller.centre_id, &id)?;
    Ok(StatusCode::NO_CONTENT)
}
