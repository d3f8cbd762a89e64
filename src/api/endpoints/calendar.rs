//! `GET /api/calendar?view=month|week|day&date=YYYY-MM-DD&therapist_id=&include_cancelled=`

use axum::extract::{Query, State};
use axum::{Extension, Json};

use super::own_therapist;
use crate::api::error::ApiError;
use crate::api::types::{ApiContext, AuthContext};
use crate::authorization::{AccessLevel, Permission};
use crate::calendar::{self, Calendar, CalendarQuery, DayWindow};

pub async fn view(
    State(ctx): State<ApiContext>,
    Extension(caller): Extension<AuthContext>,
    Query(mut query): Query<CalendarQuery>,
) -> Result<Json<Calendar>, ApiError> {
    let access = caller.require(Permission::ViewSessions)?;
    let conn = ctx.state.open_db()?;
    if access == AccessLevel::OwnRecords {
        query.therapist_id = Some(own_therapist(&conn, &caller)?.id);
    }
    let calendar = calendar::build_calendar(&conn, &caller.centre_id, &query, DayWindow::default())?;
    Ok(Json(calendar))
}
