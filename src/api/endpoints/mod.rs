//! API endpoint handlers.
//!
//! Each module covers one resource. Handlers check the caller's
//! permission, open a connection and delegate to the domain modules.

pub mod auth;
pub mod bills;
pub mod calendar;
pub mod catalogue;
pub mod centres;
pub mod dashboard;
pub mod health;
pub mod patients;
pub mod sales;
pub mod sessions;
pub mod templates;
pub mod therapists;
pub mod users;

use chrono::NaiveDate;
use rusqlite::Connection;
use uuid::Uuid;

use crate::api::error::ApiError;
use crate::api::types::AuthContext;
use crate::models::Therapist;

/// Parse a path id, answering 400 on malformed input.
pub(crate) fn parse_id(raw: &str, what: &str) -> Result<Uuid, ApiError> {
    Uuid::parse_str(raw).map_err(|e| ApiError::BadRequest(format!("Invalid {what} ID: {e}")))
}

/// Centre-local calendar date.
pub(crate) fn today() -> NaiveDate {
    chrono::Local::now().date_naive()
}

/// Therapist profile linked to the calling user, for own-record access.
pub(crate) fn own_therapist(conn: &Connection, auth: &AuthContext) -> Result<Therapist, ApiError> {
    crate::therapists::therapist_for_user(conn, &auth.centre_id, &auth.user_id)?
        .ok_or_else(|| ApiError::Forbidden("No therapist profile is linked to this user".into()))
}
