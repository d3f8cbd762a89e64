//! Therapist records and their weekly working hours.

use chrono::{Datelike, NaiveDateTime};
use rusqlite::Connection;
use serde::Deserialize;
use uuid::Uuid;

use crate::db::repository::{self, now_timestamp};
use crate::db::DatabaseError;
use crate::models::*;
use crate::validation::{ValidationError, Validator};

#[derive(Debug, thiserror::Error)]
pub enum TherapistError {
    #[error("Therapist not found: {0}")]
    NotFound(Uuid),
    #[error("User {0} cannot be linked: {1}")]
    InvalidUserLink(Uuid, &'static str),
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TherapistInput {
    pub name: String,
    #[serde(default)]
    pub user_id: Option<Uuid>,
    #[serde(default)]
    pub working_hours: Vec<WorkingHours>,
    #[serde(default)]
    pub active: Option<bool>,
}

/// Every window must end after it starts and windows on the same weekday
/// must not overlap.
pub fn validate_working_hours(hours: &[WorkingHours]) -> Result<(), ValidationError> {
    let mut v = Validator::new();
    for (i, w) in hours.iter().enumerate() {
        v.check(
            &format!("working_hours[{i}]"),
            w.end > w.start,
            "end must be after start",
        );
        let clash = hours[..i]
            .iter()
            .any(|o| o.weekday == w.weekday && o.start < w.end && w.start < o.end);
        v.check(
            &format!("working_hours[{i}]"),
            !clash,
            "overlaps another window on the same day",
        );
    }
    v.finish()
}

/// Whether `[start, end)` lies inside one working window. Inactive
/// therapists never work and slots may not cross midnight.
pub fn is_working(therapist: &Therapist, start: NaiveDateTime, end: NaiveDateTime) -> bool {
    if !therapist.active || end <= start || start.date() != end.date() {
        return false;
    }
    let weekday = start.weekday();
    therapist
        .working_hours
        .iter()
        .any(|w| w.weekday == weekday && w.start <= start.time() && end.time() <= w.end)
}

fn validate(input: &TherapistInput) -> Result<(), ValidationError> {
    let mut errors = match validate_working_hours(&input.working_hours) {
        Ok(()) => Vec::new(),
        Err(e) => e.errors,
    };
    if let Err(e) = Validator::new().required("name", &input.name).finish() {
        errors.extend(e.errors);
    }
    if errors.is_empty() {
        Ok(())
    } else {
        Err(ValidationError { errors })
    }
}

/// A linked user must belong to the centre, hold the therapist role and
/// not already be linked to someone else.
fn check_user_link(
    conn: &Connection,
    centre_id: &Uuid,
    user_id: &Uuid,
    therapist_id: &Uuid,
) -> Result<(), TherapistError> {
    let user = repository::get_user(conn, centre_id, user_id)?
        .ok_or(TherapistError::InvalidUserLink(*user_id, "no such user"))?;
    if user.role != Role::Therapist {
        return Err(TherapistError::InvalidUserLink(*user_id, "user is not a therapist"));
    }
    if let Some(existing) = repository::find_therapist_by_user(conn, centre_id, user_id)? {
        if existing.id != *therapist_id {
            return Err(TherapistError::InvalidUserLink(*user_id, "already linked"));
        }
    }
    Ok(())
}

pub fn create_therapist(
    conn: &Connection,
    centre_id: &Uuid,
    input: TherapistInput,
) -> Result<Therapist, TherapistError> {
    validate(&input)?;
    let id = Uuid::new_v4();
    if let Some(user_id) = &input.user_id {
        check_user_link(conn, centre_id, user_id, &id)?;
    }

    let therapist = Therapist {
        id,
        centre_id: *centre_id,
        name: input.name.trim().to_string(),
        user_id: input.user_id,
        working_hours: input.working_hours,
        active: input.active.unwrap_or(true),
        created_at: now_timestamp(),
    };
    repository::insert_therapist(conn, &therapist)?;
    tracing::info!(therapist_id = %therapist.id, "Therapist created");
    Ok(therapist)
}

pub fn get_therapist(conn: &Connection, centre_id: &Uuid, id: &Uuid) -> Result<Therapist, TherapistError> {
    repository::get_therapist(conn, centre_id, id)?.ok_or(TherapistError::NotFound(*id))
}

pub fn list_therapists(
    conn: &Connection,
    centre_id: &Uuid,
    active_only: bool,
) -> Result<Vec<Therapist>, TherapistError> {
    Ok(repository::list_therapists(conn, centre_id, active_only)?)
}

/// `active: None` keeps the current flag.
pub fn update_therapist(
    conn: &Connection,
    centre_id: &Uuid,
    id: &Uuid,
    input: TherapistInput,
) -> Result<Therapist, TherapistError> {
    validate(&input)?;
    let mut therapist = get_therapist(conn, centre_id, id)?;
    if let Some(user_id) = &input.user_id {
        check_user_link(conn, centre_id, user_id, id)?;
    }

    therapist.name = input.name.trim().to_string();
    therapist.user_id = input.user_id;
    therapist.working_hours = input.working_hours;
    if let Some(active) = input.active {
        therapist.active = active;
    }
    repository::update_therapist(conn, &therapist)?;
    Ok(therapist)
}

/// Therapists keep their session history, so removal only deactivates.
pub fn deactivate_therapist(conn: &Connection, centre_id: &Uuid, id: &Uuid) -> Result<(), TherapistError> {
    let mut therapist = get_therapist(conn, centre_id, id)?;
    therapist.active = false;
    repository::update_therapist(conn, &therapist)?;
    tracing::info!(therapist_id = %id, "Therapist deactivated");
    Ok(())
}

/// Therapist record linked to a user account, if any.
pub fn therapist_for_user(
    conn: &Connection,
    centre_id: &Uuid,
    user_id: &Uuid,
) -> Result<Option<Therapist>, TherapistError> {
    Ok(repository::find_therapist_by_user(conn, centre_id, user_id)?)
}
