//! Role dashboards and the audit trail.

use axum::extract::{Query, State};
use axum::{Extension, Json};
use serde::Deserialize;
use uuid::Uuid;

use super::{own_therapist, today};
use crate::api::error::ApiError;
use crate::api::types::{ApiContext, AuthContext};
use crate::authorization::Permission;
use crate::dashboard::{self, AdminDashboard, ReceptionDashboard, TherapistDashboard};
use crate::db::repository::{self, AuditRecord};
use crate::models::Role;
use crate::scheduling;

/// `GET /api/dashboard/admin`
pub async fn admin(
    State(ctx): State<ApiContext>,
    Extension(caller): Extension<AuthContext>,
) -> Result<Json<AdminDashboard>, ApiError> {
    caller.require(Permission::ViewAdminDashboard)?;
    let conn = ctx.state.open_db()?;
    let today = today();
    scheduling::refresh_expired_sales(&conn, &caller.centre_id, today)?;
    Ok(Json(dashboard::admin_dashboard(&conn, &caller.centre_id, today)?))
}

/// `GET /api/dashboard/reception`
pub async fn reception(
    State(ctx): State<ApiContext>,
    Extension(caller): Extension<AuthContext>,
) -> Result<Json<ReceptionDashboard>, ApiError> {
    caller.require(Permission::ViewReceptionDashboard)?;
    let conn = ctx.state.open_db()?;
    let today = today();
    scheduling::refresh_expired_sales(&conn, &caller.centre_id, today)?;
    Ok(Json(dashboard::reception_dashboard(&conn, &caller.centre_id, today)?))
}

#[derive(Deserialize)]
pub struct TherapistQuery {
    /// Admins may look at any therapist; therapists always get their own.
    pub therapist_id: Option<Uuid>,
}

/// `GET /api/dashboard/therapist?therapist_id=`
pub async fn therapist(
    State(ctx): State<ApiContext>,
    Extension(caller): Extension<AuthContext>,
    Query(query): Query<TherapistQuery>,
) -> Result<Json<TherapistDashboard>, ApiError> {
    caller.require(Permission::ViewTherapistDashboard)?;
    let conn = ctx.state.open_db()?;
    let therapist_id = match (caller.role, query.therapist_id) {
        (Role::Admin, Some(id)) => id,
        _ => own_therapist(&conn, &caller)?.id,
    };
    let today = today();
    scheduling::refresh_expired_sales(&conn, &caller.centre_id, today)?;
    Ok(Json(dashboard::therapist_dashboard(&conn, &caller.centre_id, &therapist_id, today)?))
}

const DEFAULT_AUDIT_DAYS: i64 = 7;
const MAX_AUDIT_DAYS: i64 = 90;

#[derive(Deserialize)]
pub struct AuditQuery {
    pub days: Option<i64>,
}

/// `GET /api/audit?days=` — access log of the caller's centre, newest first.
pub async fn audit(
    State(ctx): State<ApiContext>,
    Extension(caller): Extension<AuthContext>,
    Query(query): Query<AuditQuery>,
) -> Result<Json<Vec<AuditRecord>>, ApiError> {
    caller.require(Permission::ViewAuditLog)?;
    let conn = ctx.state.open_db()?;
    ctx.state.audit().flush_to_db(&conn)?;
    let days = query.days.unwrap_or(DEFAULT_AUDIT_DAYS).clamp(1, MAX_AUDIT_DAYS);
    let records = repository::query_audit_by_centre(&conn, &caller.centre_id.to_string(), days)?;
    Ok(Json(records))
}
