//! Package sales: selling a package schedules its sessions.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::{Extension, Json};
use serde::Serialize;

use super::{parse_id, today};
use crate::api::error::ApiError;
use crate::api::types::{ApiContext, AuthContext};
use crate::authorization::Permission;
use crate::models::{PackageSale, PackageSaleFilter, Session, SessionFilter};
use crate::scheduling::{self, SaleOutcome, SellPackageRequest};

/// `GET /api/sales?patient_id=&status=&expires_before=`
pub async fn list(
    State(ctx): State<ApiContext>,
    Extension(caller): Extension<AuthContext>,
    Query(filter): Query<PackageSaleFilter>,
) -> Result<Json<Vec<PackageSale>>, ApiError> {
    caller.require(Permission::SellPackages)?;
    let conn = ctx.state.open_db()?;
    scheduling::refresh_expired_sales(&conn, &caller.centre_id, today())?;
    Ok(Json(scheduling::list_package_sales(&conn, &caller.centre_id, &filter)?))
}

/// `POST /api/sales` — sell a package and auto-schedule its sessions.
pub async fn sell(
    State(ctx): State<ApiContext>,
    Extension(caller): Extension<AuthContext>,
    Json(request): Json<SellPackageRequest>,
) -> Result<(StatusCode, Json<SaleOutcome>), ApiError> {
    caller.require(Permission::SellPackages)?;
    let conn = ctx.state.open_db()?;
    scheduling::refresh_expired_sales(&conn, &caller.centre_id, today())?;
    let outcome = scheduling::sell_package(&conn, &caller.centre_id, &request)?;
    Ok((StatusCode::CREATED, Json(outcome)))
}

#[derive(Serialize)]
pub struct SaleDetail {
    pub sale: PackageSale,
    pub sessions: Vec<Session>,
}

/// `GET /api/sales/:id` — the sale with every session generated for it.
pub async fn get(
    State(ctx): State<ApiContext>,
    Extension(caller): Extension<AuthContext>,
    Path(id): Path<String>,
) -> Result<Json<SaleDetail>, ApiError> {
    caller.require(Permission::SellPackages)?;
    let id = parse_id(&id, "package sale")?;
    let conn = ctx.state.open_db()?;
    scheduling::refresh_expired_sales(&conn, &caller.centre_id, today())?;
    let sale = scheduling::get_package_sale(&conn, &caller.centre_id, &id)?;
    let sessions = scheduling::list_sessions(
        &conn,
        &caller.centre_id,
        &SessionFilter {
            package_sale_id: Some(id),
            ..Default::default()
        },
    )?;
    Ok(Json(SaleDetail { sale, sessions }))
}
