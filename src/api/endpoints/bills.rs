//! Billing endpoints.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::{Extension, Json};
use chrono::NaiveDate;
use serde::Deserialize;

use super::parse_id;
use crate::api::error::ApiError;
use crate::api::types::{ApiContext, AuthContext};
use crate::authorization::Permission;
use crate::billing::{self, CreateBillRequest, RevenueSummary};
use crate::models::{Bill, BillFilter};

/// `GET /api/bills?patient_id=&status=&created_from=&created_to=`
pub async fn list(
    State(ctx): State<ApiContext>,
    Extension(caller): Extension<AuthContext>,
    Query(filter): Query<BillFilter>,
) -> Result<Json<Vec<Bill>>, ApiError> {
    caller.require(Permission::ManageBills)?;
    let conn = ctx.state.open_db()?;
    Ok(Json(billing::list_bills(&conn, &caller.centre_id, &filter)?))
}

/// `POST /api/bills`
pub async fn create(
    State(ctx): State<ApiContext>,
    Extension(caller): Extension<AuthContext>,
    Json(request): Json<CreateBillRequest>,
) -> Result<(StatusCode, Json<Bill>), ApiError> {
    caller.require(Permission::ManageBills)?;
    let conn = ctx.state.open_db()?;
    let bill = billing::create_bill(&conn, &caller.centre_id, request)?;
    Ok((StatusCode::CREATED, Json(bill)))
}

/// `GET /api/bills/:id`
pub async fn get(
    State(ctx): State<ApiContext>,
    Extension(caller): Extension<AuthContext>,
    Path(id): Path<String>,
) -> Result<Json<Bill>, ApiError> {
    caller.require(Permission::ManageBills)?;
    let id = parse_id(&id, "bill")?;
    let conn = ctx.state.open_db()?;
    Ok(Json(billing::get_bill(&conn, &caller.centre_id, &id)?))
}

/// `POST /api/bills/:id/pay`
pub async fn pay(
    State(ctx): State<ApiContext>,
    Extension(caller): Extension<AuthContext>,
    Path(id): Path<String>,
) -> Result<Json<Bill>, ApiError> {
    caller.require(Permission::ManageBills)?;
    let id = parse_id(&id, "bill")?;
    let conn = ctx.state.open_db()?;
    Ok(Json(billing::mark_paid(&conn, &caller.centre_id, &id)?))
}

/// `POST /api/bills/:id/void`
pub async fn void(
    State(ctx): State<ApiContext>,
    Extension(caller): Extension<AuthContext>,
    Path(id): Path<String>,
) -> Result<Json<Bill>, ApiError> {
    caller.require(Permission::ManageBills)?;
    let id = parse_id(&id, "bill")?;
    let conn = ctx.state.open_db()?;
    Ok(Json(billing::void_bill(&conn, &caller.centre_id, &id)?))
}

#[derive(Deserialize)]
pub struct RevenueQuery {
    pub from: NaiveDate,
    pub to: NaiveDate,
}

/// `GET /api/bills/revenue?from=&to=` — admin only.
pub async fn revenue(
    State(ctx): State<ApiContext>,
    Extension(caller): Extension<AuthContext>,
    Query(query): Query<RevenueQuery>,
) -> Result<Json<RevenueSummary>, ApiError> {
    caller.require(Permission::ViewAdminDashboard)?;
    let conn = ctx.state.open_db()?;
    Ok(Json(billing::revenue_summary(&conn, &caller.centre_id, query.from, query.to)?))
}
