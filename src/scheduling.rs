//! Package sales and the session registry.
//!
//! Selling a package writes the sale, every generated session and the
//! patient's active-sale link in one transaction. Sessions are spread
//! over the candidate therapists round-robin; a therapist only takes a
//! slot inside their working hours and free of other non-cancelled
//! sessions.

use chrono::{Duration, NaiveDate, NaiveDateTime};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::db::repository::{self, now_timestamp};
use crate::db::DatabaseError;
use crate::models::*;
use crate::templates;
use crate::therapists::is_working;
use crate::validation::{clean_optional, ValidationError, Validator};

#[derive(Debug, thiserror::Error)]
pub enum SchedulingError {
    #[error("Patient not found: {0}")]
    PatientNotFound(Uuid),
    #[error("Therapist not found: {0}")]
    TherapistNotFound(Uuid),
    #[error("Package not found: {0}")]
    PackageNotFound(Uuid),
    #[error("Package sale not found: {0}")]
    SaleNotFound(Uuid),
    #[error("Session not found: {0}")]
    SessionNotFound(Uuid),
    #[error("Treatment not found: {0}")]
    TreatmentNotFound(Uuid),
    #[error("Template not found: {0}")]
    TemplateNotFound(Uuid),
    #[error("Package {0} is no longer sold")]
    PackageInactive(Uuid),
    #[error("Patient already has an active package sale {0}")]
    ActivePackageExists(Uuid),
    #[error("Package sale {0} is not active")]
    SaleNotActive(Uuid),
    #[error("Package sale {0} has no sessions left")]
    PackageExhausted(Uuid),
    #[error("No therapists are available to assign")]
    NoCandidates,
    #[error("No therapist is available at {0}")]
    NoTherapistAvailable(NaiveDateTime),
    #[error("Therapist is not working at {0}")]
    OutsideWorkingHours(NaiveDateTime),
    #[error("Therapist already has a session overlapping {0}")]
    Conflict(NaiveDateTime),
    #[error("Session at {start} falls after the package expiry on {expires_on}")]
    BeyondExpiry {
        start: NaiveDateTime,
        expires_on: NaiveDate,
    },
    #[error("Cannot move a session from {from} to {to}")]
    InvalidTransition {
        from: SessionStatus,
        to: SessionStatus,
    },
    #[error("Session is {0} and can no longer be changed this way")]
    NotEditable(SessionStatus),
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),
}

impl From<rusqlite::Error> for SchedulingError {
    fn from(err: rusqlite::Error) -> Self {
        SchedulingError::Database(DatabaseError::Sqlite(err))
    }
}

// ─── Requests / results ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
pub struct SellPackageRequest {
    pub patient_id: Uuid,
    pub package_id: Uuid,
    /// Start of the first session; later sessions keep its time of day.
    pub first_start: NaiveDateTime,
    /// Restrict and order the round-robin candidates.
    #[serde(default)]
    pub therapist_ids: Option<Vec<Uuid>>,
    #[serde(default)]
    pub interval_days: Option<u32>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SaleOutcome {
    pub sale: PackageSale,
    pub sessions: Vec<Session>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BookSessionRequest {
    pub patient_id: Uuid,
    pub therapist_id: Uuid,
    pub start_at: NaiveDateTime,
    /// Falls back to the treatment's, then the package's session duration.
    #[serde(default)]
    pub duration_minutes: Option<u32>,
    #[serde(default)]
    pub treatment_id: Option<Uuid>,
    #[serde(default)]
    pub package_sale_id: Option<Uuid>,
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RescheduleRequest {
    pub start_at: NaiveDateTime,
    /// Keep the current therapist when absent.
    #[serde(default)]
    pub therapist_id: Option<Uuid>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NotesUpdate {
    pub notes: Option<String>,
    pub treatment_id: Option<Uuid>,
    pub template_id: Option<Uuid>,
    pub answers: Option<TemplateAnswers>,
}

// ─── Package sales ────────────────────────────────────────────────────────────

/// Sell a package and generate its sessions.
pub fn sell_package(
    conn: &Connection,
    centre_id: &Uuid,
    req: &SellPackageRequest,
) -> Result<SaleOutcome, SchedulingError> {
    let patient = repository::get_patient(conn, centre_id, &req.patient_id)?
        .ok_or(SchedulingError::PatientNotFound(req.patient_id))?;
    let package = repository::get_package(conn, centre_id, &req.package_id)?
        .ok_or(SchedulingError::PackageNotFound(req.package_id))?;
    if !package.active {
        return Err(SchedulingError::PackageInactive(package.id));
    }
    if let Some(existing) = patient.active_package_sale_id {
        if let Some(sale) = repository::get_package_sale(conn, centre_id, &existing)? {
            if sale.status == PackageSaleStatus::Active {
                return Err(SchedulingError::ActivePackageExists(existing));
            }
        }
    }

    let interval_days = req.interval_days.unwrap_or(package.interval_days);
    Validator::new()
        .positive("interval_days", i64::from(interval_days))
        .finish()?;

    let candidates = candidate_therapists(conn, centre_id, req.therapist_ids.as_deref())?;
    if candidates.is_empty() {
        return Err(SchedulingError::NoCandidates);
    }

    let now = now_timestamp();
    let start_date = req.first_start.date();
    let sale = PackageSale {
        id: Uuid::new_v4(),
        centre_id: *centre_id,
        patient_id: patient.id,
        package_id: package.id,
        sessions_total: package.session_count,
        sessions_used: 0,
        sessions_remaining: package.session_count,
        price_cents: package.price_cents,
        start_date,
        expires_on: start_date + Duration::days(i64::from(package.validity_days)),
        status: PackageSaleStatus::Active,
        created_at: now,
    };

    let tx = conn.unchecked_transaction()?;
    repository::insert_package_sale(&tx, &sale)?;

    let length = Duration::minutes(i64::from(package.session_duration_minutes));
    let mut cursor = 0usize;
    let mut sessions = Vec::with_capacity(package.session_count as usize);
    for k in 0..package.session_count {
        let start = req.first_start + Duration::days(i64::from(k) * i64::from(interval_days));
        let end = start + length;
        if start.date() >= sale.expires_on {
            return Err(SchedulingError::BeyondExpiry {
                start,
                expires_on: sale.expires_on,
            });
        }

        let idx = next_available(&tx, &candidates, cursor, start, end)?
            .ok_or(SchedulingError::NoTherapistAvailable(start))?;
        cursor = idx + 1;

        let session = Session {
            id: Uuid::new_v4(),
            centre_id: *centre_id,
            patient_id: patient.id,
            therapist_id: candidates[idx].id,
            start_at: start,
            end_at: end,
            status: SessionStatus::Scheduled,
            package_sale_id: Some(sale.id),
            treatment_id: None,
            notes: None,
            template_id: None,
            answers: None,
            created_at: now,
            updated_at: now,
        };
        repository::insert_session(&tx, &session)?;
        sessions.push(session);
    }

    repository::set_active_package_sale(&tx, centre_id, &patient.id, Some(&sale.id))?;
    tx.commit()?;

    tracing::info!(
        sale_id = %sale.id,
        patient_id = %patient.id,
        sessions = sessions.len(),
        "Package sold"
    );
    Ok(SaleOutcome { sale, sessions })
}

/// Requested therapists in the given order, or all active ones by name.
fn candidate_therapists(
    conn: &Connection,
    centre_id: &Uuid,
    requested: Option<&[Uuid]>,
) -> Result<Vec<Therapist>, SchedulingError> {
    match requested {
        Some(ids) if !ids.is_empty() => {
            let mut out: Vec<Therapist> = Vec::with_capacity(ids.len());
            for id in ids {
                let t = repository::get_therapist(conn, centre_id, id)?
                    .ok_or(SchedulingError::TherapistNotFound(*id))?;
                if t.active && !out.iter().any(|o| o.id == t.id) {
                    out.push(t);
                }
            }
            Ok(out)
        }
        _ => Ok(repository::list_therapists(conn, centre_id, true)?),
    }
}

/// Index of the first therapist, walking from `cursor`, who can take `[start, end)`.
fn next_available(
    conn: &Connection,
    candidates: &[Therapist],
    cursor: usize,
    start: NaiveDateTime,
    end: NaiveDateTime,
) -> Result<Option<usize>, SchedulingError> {
    let n = candidates.len();
    for step in 0..n {
        let idx = (cursor + step) % n;
        let t = &candidates[idx];
        if is_working(t, start, end)
            && repository::find_overlapping_sessions(conn, &t.id, start, end, None)?.is_empty()
        {
            return Ok(Some(idx));
        }
    }
    Ok(None)
}

pub fn get_package_sale(
    conn: &Connection,
    centre_id: &Uuid,
    id: &Uuid,
) -> Result<PackageSale, SchedulingError> {
    repository::get_package_sale(conn, centre_id, id)?.ok_or(SchedulingError::SaleNotFound(*id))
}

pub fn list_package_sales(
    conn: &Connection,
    centre_id: &Uuid,
    filter: &PackageSaleFilter,
) -> Result<Vec<PackageSale>, SchedulingError> {
    Ok(repository::list_package_sales(conn, centre_id, filter)?)
}

/// Expire active sales whose validity ended before `today`, cancel their
/// still-scheduled sessions and unlink them from the patient. Returns the
/// number of sales expired.
pub fn refresh_expired_sales(
    conn: &Connection,
    centre_id: &Uuid,
    today: NaiveDate,
) -> Result<usize, SchedulingError> {
    let lapsed = repository::list_lapsed_active_sales(conn, centre_id, today)?;
    if lapsed.is_empty() {
        return Ok(0);
    }

    let now = now_timestamp();
    let tx = conn.unchecked_transaction()?;
    for mut sale in lapsed.iter().cloned() {
        sale.status = PackageSaleStatus::Expired;
        repository::update_package_sale_usage(&tx, &sale)?;
        let cancelled = repository::cancel_scheduled_sessions_for_sale(&tx, &sale.id, now)?;
        repository::clear_active_package_sale_if(&tx, centre_id, &sale.patient_id, &sale.id)?;
        tracing::info!(sale_id = %sale.id, cancelled, "Package sale expired");
    }
    tx.commit()?;
    Ok(lapsed.len())
}

// ─── Session registry ─────────────────────────────────────────────────────────

pub fn get_session(conn: &Connection, centre_id: &Uuid, id: &Uuid) -> Result<Session, SchedulingError> {
    repository::get_session(conn, centre_id, id)?.ok_or(SchedulingError::SessionNotFound(*id))
}

pub fn list_sessions(
    conn: &Connection,
    centre_id: &Uuid,
    filter: &SessionFilter,
) -> Result<Vec<Session>, SchedulingError> {
    Ok(repository::list_sessions(conn, centre_id, filter)?)
}

/// Working-hours and overlap check for one therapist slot.
fn ensure_slot_free(
    conn: &Connection,
    therapist: &Therapist,
    start: NaiveDateTime,
    end: NaiveDateTime,
    exclude: Option<&Uuid>,
) -> Result<(), SchedulingError> {
    if !is_working(therapist, start, end) {
        return Err(SchedulingError::OutsideWorkingHours(start));
    }
    if !repository::find_overlapping_sessions(conn, &therapist.id, start, end, exclude)?.is_empty() {
        return Err(SchedulingError::Conflict(start));
    }
    Ok(())
}

/// Book a single session outside of a package sale, or against an active one.
/// A sale never carries more open sessions than it has sessions remaining.
pub fn book_session(
    conn: &Connection,
    centre_id: &Uuid,
    req: BookSessionRequest,
) -> Result<Session, SchedulingError> {
    repository::get_patient(conn, centre_id, &req.patient_id)?
        .ok_or(SchedulingError::PatientNotFound(req.patient_id))?;
    let therapist = repository::get_therapist(conn, centre_id, &req.therapist_id)?
        .ok_or(SchedulingError::TherapistNotFound(req.therapist_id))?;

    let treatment = match req.treatment_id {
        Some(id) => Some(
            repository::get_treatment(conn, centre_id, &id)?
                .ok_or(SchedulingError::TreatmentNotFound(id))?,
        ),
        None => None,
    };

    let mut package_minutes = None;
    if let Some(sale_id) = req.package_sale_id {
        let sale = repository::get_package_sale(conn, centre_id, &sale_id)?
            .ok_or(SchedulingError::SaleNotFound(sale_id))?;
        if sale.patient_id != req.patient_id || sale.status != PackageSaleStatus::Active {
            return Err(SchedulingError::SaleNotActive(sale_id));
        }
        if req.start_at.date() >= sale.expires_on {
            return Err(SchedulingError::BeyondExpiry {
                start: req.start_at,
                expires_on: sale.expires_on,
            });
        }
        let open = repository::count_open_sessions_for_sale(conn, centre_id, &sale_id)?;
        if open >= i64::from(sale.sessions_remaining) {
            return Err(SchedulingError::PackageExhausted(sale_id));
        }
        package_minutes = repository::get_package(conn, centre_id, &sale.package_id)?
            .map(|p| p.session_duration_minutes);
    }

    let minutes = req
        .duration_minutes
        .or(treatment.as_ref().map(|t| t.duration_minutes))
        .or(package_minutes)
        .unwrap_or(0);
    Validator::new()
        .positive("duration_minutes", i64::from(minutes))
        .finish()?;

    let start = req.start_at;
    let end = start + Duration::minutes(i64::from(minutes));
    ensure_slot_free(conn, &therapist, start, end, None)?;

    let now = now_timestamp();
    let session = Session {
        id: Uuid::new_v4(),
        centre_id: *centre_id,
        patient_id: req.patient_id,
        therapist_id: therapist.id,
        start_at: start,
        end_at: end,
        status: SessionStatus::Scheduled,
        package_sale_id: req.package_sale_id,
        treatment_id: req.treatment_id,
        notes: clean_optional(req.notes),
        template_id: None,
        answers: None,
        created_at: now,
        updated_at: now,
    };
    repository::insert_session(conn, &session)?;
    tracing::info!(session_id = %session.id, therapist_id = %therapist.id, "Session booked");
    Ok(session)
}

/// Move a scheduled session, keeping its length.
pub fn reschedule_session(
    conn: &Connection,
    centre_id: &Uuid,
    id: &Uuid,
    req: RescheduleRequest,
) -> Result<Session, SchedulingError> {
    let mut session = get_session(conn, centre_id, id)?;
    if session.status != SessionStatus::Scheduled {
        return Err(SchedulingError::NotEditable(session.status));
    }

    let therapist_id = req.therapist_id.unwrap_or(session.therapist_id);
    let therapist = repository::get_therapist(conn, centre_id, &therapist_id)?
        .ok_or(SchedulingError::TherapistNotFound(therapist_id))?;

    if let Some(sale_id) = session.package_sale_id {
        if let Some(sale) = repository::get_package_sale(conn, centre_id, &sale_id)? {
            if req.start_at.date() >= sale.expires_on {
                return Err(SchedulingError::BeyondExpiry {
                    start: req.start_at,
                    expires_on: sale.expires_on,
                });
            }
        }
    }

    let length = session.end_at - session.start_at;
    let end = req.start_at + length;
    ensure_slot_free(conn, &therapist, req.start_at, end, Some(id))?;

    session.therapist_id = therapist.id;
    session.start_at = req.start_at;
    session.end_at = end;
    session.updated_at = now_timestamp();
    repository::update_session_schedule(conn, &session)?;
    Ok(session)
}

/// Allowed moves of the session lifecycle.
pub fn can_transition(from: SessionStatus, to: SessionStatus) -> bool {
    use SessionStatus::*;
    matches!(
        (from, to),
        (Scheduled, CheckedIn)
            | (Scheduled, Cancelled)
            | (Scheduled, NoShow)
            | (CheckedIn, Completed)
            | (CheckedIn, Cancelled)
    )
}

/// Apply a status transition. Completed and no-show sessions linked to a
/// package sale consume one of its sessions; the sale completes when none
/// remain.
pub fn update_session_status(
    conn: &Connection,
    centre_id: &Uuid,
    id: &Uuid,
    to: SessionStatus,
) -> Result<Session, SchedulingError> {
    let mut session = get_session(conn, centre_id, id)?;
    if !can_transition(session.status, to) {
        return Err(SchedulingError::InvalidTransition {
            from: session.status,
            to,
        });
    }

    let now = now_timestamp();
    let tx = conn.unchecked_transaction()?;
    repository::update_session_status(&tx, centre_id, id, to, now)?;

    if matches!(to, SessionStatus::Completed | SessionStatus::NoShow) {
        if let Some(sale_id) = session.package_sale_id {
            consume_package_session(&tx, centre_id, &sale_id)?;
        }
    }
    tx.commit()?;

    tracing::info!(session_id = %id, from = %session.status, to = %to, "Session status changed");
    session.status = to;
    session.updated_at = now;
    Ok(session)
}

fn consume_package_session(
    conn: &Connection,
    centre_id: &Uuid,
    sale_id: &Uuid,
) -> Result<(), SchedulingError> {
    let Some(mut sale) = repository::get_package_sale(conn, centre_id, sale_id)? else {
        return Err(SchedulingError::SaleNotFound(*sale_id));
    };
    if sale.sessions_remaining == 0 {
        return Err(SchedulingError::PackageExhausted(sale.id));
    }

    sale.sessions_used += 1;
    sale.sessions_remaining -= 1;
    if sale.sessions_remaining == 0 && sale.status == PackageSaleStatus::Active {
        sale.status = PackageSaleStatus::Completed;
        repository::clear_active_package_sale_if(conn, centre_id, &sale.patient_id, &sale.id)?;
        tracing::info!(sale_id = %sale.id, "Package sale completed");
    }
    repository::update_package_sale_usage(conn, &sale)?;
    Ok(())
}

/// Update free-text notes, treatment and template answers. Absent fields
/// keep their stored value; an empty `notes` string clears the notes.
/// Answers are validated against the effective template whenever either
/// changes; answers without a template are refused.
pub fn update_session_notes(
    conn: &Connection,
    centre_id: &Uuid,
    id: &Uuid,
    update: NotesUpdate,
) -> Result<Session, SchedulingError> {
    let mut session = get_session(conn, centre_id, id)?;
    if session.status == SessionStatus::Cancelled {
        return Err(SchedulingError::NotEditable(session.status));
    }

    if let Some(treatment_id) = update.treatment_id {
        repository::get_treatment(conn, centre_id, &treatment_id)?
            .ok_or(SchedulingError::TreatmentNotFound(treatment_id))?;
    }

    let template_changed = update.template_id.is_some() || update.answers.is_some();
    let template_id = update.template_id.or(session.template_id);
    let answers = update.answers.or(session.answers.take()).filter(|a| !a.is_empty());

    if template_changed {
        match (template_id, &answers) {
            (Some(template_id), answers) => {
                let template = repository::get_template(conn, centre_id, &template_id)?
                    .ok_or(SchedulingError::TemplateNotFound(template_id))?;
                templates::validate_answers(&template, answers.as_ref().unwrap_or(&TemplateAnswers::new()))?;
            }
            (None, Some(_)) => {
                return Err(ValidationError::single("template_id", "is required when answers are given").into());
            }
            (None, None) => {}
        }
    }

    if let Some(notes) = update.notes {
        session.notes = clean_optional(Some(notes));
    }
    if let Some(treatment_id) = update.treatment_id {
        session.treatment_id = Some(treatment_id);
    }
    session.template_id = template_id;
    session.answers = answers;
    session.updated_at = now_timestamp();
    repository::update_session_notes(conn, &session)?;
    Ok(session)
}

/// Only scheduled or cancelled sessions may be deleted.
pub fn delete_session(conn: &Connection, centre_id: &Uuid, id: &Uuid) -> Result<(), SchedulingError> {
    let session = get_session(conn, centre_id, id)?;
    if !matches!(session.status, SessionStatus::Scheduled | SessionStatus::Cancelled) {
        return Err(SchedulingError::NotEditable(session.status));
    }
    repository::delete_session(conn, centre_id, id)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveTime, Weekday};
    use serde_json::json;

    use crate::db::repository::test_support::*;
    use crate::db::sqlite::open_memory_database;

    fn dt(s: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S").unwrap()
    }

    struct Clinic {
        conn: Connection,
        centre: Uuid,
        patient: Uuid,
        package: Uuid,
    }

    fn clinic(sessions: u32) -> Clinic {
        let conn = open_memory_database().unwrap();
        let centre = seed_centre(&conn, "North");
        let patient = seed_patient(&conn, &centre, "Maria Lopez");
        let package = seed_package(&conn, &centre, "Rehab", sessions, 30000, 10.0);
        Clinic { conn, centre, patient, package }
    }

    fn sell(c: &Clinic, first: &str) -> Result<SaleOutcome, SchedulingError> {
        sell_package(
            &c.conn,
            &c.centre,
            &SellPackageRequest {
                patient_id: c.patient,
                package_id: c.package,
                first_start: dt(first),
                therapist_ids: None,
                interval_days: None,
            },
        )
    }

    #[test]
    fn sale_generates_weekly_sessions_round_robin() {
        let c = clinic(4);
        let bea = seed_therapist(&c.conn, &c.centre, "Bea");
        let zoe = seed_therapist(&c.conn, &c.centre, "Zoe");

        // 2026-03-02 is a Monday
        let outcome = sell(&c, "2026-03-02 09:00:00").unwrap();
        let starts: Vec<_> = outcome.sessions.iter().map(|s| s.start_at).collect();
        assert_eq!(
            starts,
            vec![
                dt("2026-03-02 09:00:00"),
                dt("2026-03-09 09:00:00"),
                dt("2026-03-16 09:00:00"),
                dt("2026-03-23 09:00:00"),
            ]
        );
        let assigned: Vec<_> = outcome.sessions.iter().map(|s| s.therapist_id).collect();
        assert_eq!(assigned, vec![bea, zoe, bea, zoe]);
        assert!(outcome.sessions.iter().all(|s| s.duration_minutes() == 45));

        let patient = repository::get_patient(&c.conn, &c.centre, &c.patient).unwrap().unwrap();
        assert_eq!(patient.active_package_sale_id, Some(outcome.sale.id));
        assert_eq!(outcome.sale.expires_on, NaiveDate::from_ymd_opt(2026, 5, 31).unwrap());
    }

    #[test]
    fn busy_therapist_is_skipped() {
        let c = clinic(2);
        let bea = seed_therapist(&c.conn, &c.centre, "Bea");
        let zoe = seed_therapist(&c.conn, &c.centre, "Zoe");
        let other = seed_patient(&c.conn, &c.centre, "John Smith");
        seed_session(&c.conn, &c.centre, &other, &bea, "2026-03-02 09:30:00", 30, SessionStatus::Scheduled);

        let outcome = sell(&c, "2026-03-02 09:00:00").unwrap();
        // Bea is busy for the first slot, so Zoe takes it and the cursor wraps back to Bea
        assert_eq!(outcome.sessions[0].therapist_id, zoe);
        assert_eq!(outcome.sessions[1].therapist_id, bea);
    }

    #[test]
    fn nobody_available_rolls_back_everything() {
        let c = clinic(3);
        let only = seed_therapist(&c.conn, &c.centre, "Bea");
        // Third weekly slot (2026-03-16) is taken
        let other = seed_patient(&c.conn, &c.centre, "John Smith");
        seed_session(&c.conn, &c.centre, &other, &only, "2026-03-16 09:00:00", 60, SessionStatus::Scheduled);

        let err = sell(&c, "2026-03-02 09:00:00").unwrap_err();
        assert!(matches!(err, SchedulingError::NoTherapistAvailable(t) if t == dt("2026-03-16 09:00:00")));

        assert!(repository::list_package_sales(&c.conn, &c.centre, &PackageSaleFilter::default()).unwrap().is_empty());
        let sessions = repository::list_sessions(
            &c.conn,
            &c.centre,
            &SessionFilter { patient_id: Some(c.patient), ..Default::default() },
        )
        .unwrap();
        assert!(sessions.is_empty());
        let patient = repository::get_patient(&c.conn, &c.centre, &c.patient).unwrap().unwrap();
        assert!(patient.active_package_sale_id.is_none());
    }

    #[test]
    fn weekend_start_finds_nobody() {
        let c = clinic(1);
        seed_therapist(&c.conn, &c.centre, "Bea");
        let err = sell(&c, "2026-03-07 09:00:00").unwrap_err();
        assert!(matches!(err, SchedulingError::NoTherapistAvailable(_)));
    }

    #[test]
    fn requested_therapists_restrict_and_order() {
        let c = clinic(3);
        let bea = seed_therapist(&c.conn, &c.centre, "Bea");
        let zoe = seed_therapist(&c.conn, &c.centre, "Zoe");
        seed_therapist(&c.conn, &c.centre, "Max");

        let outcome = sell_package(
            &c.conn,
            &c.centre,
            &SellPackageRequest {
                patient_id: c.patient,
                package_id: c.package,
                first_start: dt("2026-03-02 10:00:00"),
                therapist_ids: Some(vec![zoe, bea]),
                interval_days: Some(2),
            },
        )
        .unwrap();
        let assigned: Vec<_> = outcome.sessions.iter().map(|s| s.therapist_id).collect();
        assert_eq!(assigned, vec![zoe, bea, zoe]);
        assert_eq!(outcome.sessions[2].start_at, dt("2026-03-06 10:00:00"));
    }

    #[test]
    fn second_active_sale_is_refused() {
        let c = clinic(1);
        seed_therapist(&c.conn, &c.centre, "Bea");
        sell(&c, "2026-03-02 09:00:00").unwrap();
        let err = sell(&c, "2026-03-03 09:00:00").unwrap_err();
        assert!(matches!(err, SchedulingError::ActivePackageExists(_)));
    }

    #[test]
    fn completing_sessions_consumes_and_completes_sale() {
        let c = clinic(2);
        seed_therapist(&c.conn, &c.centre, "Bea");
        let outcome = sell(&c, "2026-03-02 09:00:00").unwrap();
        let (first, second) = (outcome.sessions[0].id, outcome.sessions[1].id);

        update_session_status(&c.conn, &c.centre, &first, SessionStatus::CheckedIn).unwrap();
        update_session_status(&c.conn, &c.centre, &first, SessionStatus::Completed).unwrap();
        let sale = get_package_sale(&c.conn, &c.centre, &outcome.sale.id).unwrap();
        assert_eq!((sale.sessions_used, sale.sessions_remaining), (1, 1));
        assert_eq!(sale.status, PackageSaleStatus::Active);

        update_session_status(&c.conn, &c.centre, &second, SessionStatus::NoShow).unwrap();
        let sale = get_package_sale(&c.conn, &c.centre, &outcome.sale.id).unwrap();
        assert_eq!((sale.sessions_used, sale.sessions_remaining), (2, 0));
        assert_eq!(sale.status, PackageSaleStatus::Completed);
        let patient = repository::get_patient(&c.conn, &c.centre, &c.patient).unwrap().unwrap();
        assert!(patient.active_package_sale_id.is_none());
    }

    #[test]
    fn cancelling_does_not_consume() {
        let c = clinic(2);
        seed_therapist(&c.conn, &c.centre, "Bea");
        let outcome = sell(&c, "2026-03-02 09:00:00").unwrap();
        update_session_status(&c.conn, &c.centre, &outcome.sessions[0].id, SessionStatus::Cancelled).unwrap();
        let sale = get_package_sale(&c.conn, &c.centre, &outcome.sale.id).unwrap();
        assert_eq!(sale.sessions_remaining, 2);
    }

    #[test]
    fn transition_table() {
        use SessionStatus::*;
        assert!(can_transition(Scheduled, CheckedIn));
        assert!(can_transition(Scheduled, NoShow));
        assert!(can_transition(CheckedIn, Completed));
        assert!(can_transition(CheckedIn, Cancelled));
        assert!(!can_transition(Scheduled, Completed));
        assert!(!can_transition(CheckedIn, NoShow));
        assert!(!can_transition(Completed, Cancelled));
        assert!(!can_transition(Cancelled, Scheduled));
    }

    #[test]
    fn invalid_transition_is_reported() {
        let c = clinic(1);
        let t = seed_therapist(&c.conn, &c.centre, "Bea");
        let id = seed_session(&c.conn, &c.centre, &c.patient, &t, "2026-03-02 09:00:00", 45, SessionStatus::Scheduled);
        let err = update_session_status(&c.conn, &c.centre, &id, SessionStatus::Completed).unwrap_err();
        assert!(matches!(
            err,
            SchedulingError::InvalidTransition { from: SessionStatus::Scheduled, to: SessionStatus::Completed }
        ));
    }

    #[test]
    fn booking_checks_conflicts_and_hours() {
        let c = clinic(1);
        let bea = seed_therapist(&c.conn, &c.centre, "Bea");
        let book = |start: &str| {
            book_session(
                &c.conn,
                &c.centre,
                BookSessionRequest {
                    patient_id: c.patient,
                    therapist_id: bea,
                    start_at: dt(start),
                    duration_minutes: Some(60),
                    treatment_id: None,
                    package_sale_id: None,
                    notes: None,
                },
            )
        };

        book("2026-03-02 09:00:00").unwrap();
        assert!(matches!(book("2026-03-02 09:30:00"), Err(SchedulingError::Conflict(_))));
        book("2026-03-02 10:00:00").unwrap();
        assert!(matches!(book("2026-03-02 17:30:00"), Err(SchedulingError::OutsideWorkingHours(_))));
    }

    #[test]
    fn booking_uses_treatment_duration() {
        let c = clinic(1);
        let bea = seed_therapist(&c.conn, &c.centre, "Bea");
        let treatment = seed_treatment(&c.conn, &c.centre, "Massage", 5000);
        let s = book_session(
            &c.conn,
            &c.centre,
            BookSessionRequest {
                patient_id: c.patient,
                therapist_id: bea,
                start_at: dt("2026-03-02 09:00:00"),
                duration_minutes: None,
                treatment_id: Some(treatment),
                package_sale_id: None,
                notes: Some("  first visit ".into()),
            },
        )
        .unwrap();
        assert_eq!(s.duration_minutes(), 45);
        assert_eq!(s.notes.as_deref(), Some("first visit"));
    }

    #[test]
    fn reschedule_only_while_scheduled() {
        let c = clinic(1);
        let bea = seed_therapist(&c.conn, &c.centre, "Bea");
        let zoe = seed_therapist(&c.conn, &c.centre, "Zoe");
        let id = seed_session(&c.conn, &c.centre, &c.patient, &bea, "2026-03-02 09:00:00", 45, SessionStatus::Scheduled);

        // moving within its own slot does not conflict with itself
        let moved = reschedule_session(
            &c.conn,
            &c.centre,
            &id,
            RescheduleRequest { start_at: dt("2026-03-02 09:15:00"), therapist_id: Some(zoe) },
        )
        .unwrap();
        assert_eq!(moved.therapist_id, zoe);
        assert_eq!(moved.end_at, dt("2026-03-02 10:00:00"));

        update_session_status(&c.conn, &c.centre, &id, SessionStatus::CheckedIn).unwrap();
        let err = reschedule_session(
            &c.conn,
            &c.centre,
            &id,
            RescheduleRequest { start_at: dt("2026-03-02 11:00:00"), therapist_id: None },
        )
        .unwrap_err();
        assert!(matches!(err, SchedulingError::NotEditable(SessionStatus::CheckedIn)));
    }

    #[test]
    fn notes_answers_are_validated() {
        let c = clinic(1);
        let bea = seed_therapist(&c.conn, &c.centre, "Bea");
        let id = seed_session(&c.conn, &c.centre, &c.patient, &bea, "2026-03-02 09:00:00", 45, SessionStatus::CheckedIn);
        let template = templates::create_template(
            &c.conn,
            &c.centre,
            templates::TemplateInput {
                kind: TemplateKind::Examination,
                name: "Back".into(),
                fields: vec![TemplateField {
                    key: "pain".into(),
                    label: "Pain".into(),
                    field_type: FieldType::Number,
                    required: true,
                    min: Some(0.0),
                    max: Some(10.0),
                    options: vec![],
                }],
            },
        )
        .unwrap();

        let bad = update_session_notes(
            &c.conn,
            &c.centre,
            &id,
            NotesUpdate {
                template_id: Some(template.id),
                answers: Some(serde_json::from_value(json!({"pain": 11})).unwrap()),
                ..Default::default()
            },
        )
        .unwrap_err();
        assert!(matches!(bad, SchedulingError::Validation(_)));

        let orphan = update_session_notes(
            &c.conn,
            &c.centre,
            &id,
            NotesUpdate {
                answers: Some(serde_json::from_value(json!({"pain": 3})).unwrap()),
                ..Default::default()
            },
        )
        .unwrap_err();
        assert!(matches!(orphan, SchedulingError::Validation(ref v) if v.has_field("template_id")));

        let ok = update_session_notes(
            &c.conn,
            &c.centre,
            &id,
            NotesUpdate {
                notes: Some("Improving".into()),
                template_id: Some(template.id),
                answers: Some(serde_json::from_value(json!({"pain": 3})).unwrap()),
                ..Default::default()
            },
        )
        .unwrap();
        assert_eq!(ok.answers.unwrap()["pain"], json!(3));
    }

    #[test]
    fn notes_update_keeps_fields_it_does_not_name() {
        let c = clinic(1);
        let bea = seed_therapist(&c.conn, &c.centre, "Bea");
        let treatment = seed_treatment(&c.conn, &c.centre, "Massage", 5000);
        let id = seed_session(&c.conn, &c.centre, &c.patient, &bea, "2026-03-02 09:00:00", 45, SessionStatus::CheckedIn);
        let template = templates::create_template(
            &c.conn,
            &c.centre,
            templates::TemplateInput {
                kind: TemplateKind::Examination,
                name: "Back".into(),
                fields: vec![TemplateField {
                    key: "pain".into(),
                    label: "Pain".into(),
                    field_type: FieldType::Number,
                    required: true,
                    min: Some(0.0),
                    max: Some(10.0),
                    options: vec![],
                }],
            },
        )
        .unwrap();

        update_session_notes(
            &c.conn,
            &c.centre,
            &id,
            NotesUpdate {
                notes: Some("Lower back".into()),
                treatment_id: Some(treatment),
                template_id: Some(template.id),
                answers: Some(serde_json::from_value(json!({"pain": 6})).unwrap()),
            },
        )
        .unwrap();

        let edited = update_session_notes(
            &c.conn,
            &c.centre,
            &id,
            NotesUpdate { notes: Some("Improving".into()), ..Default::default() },
        )
        .unwrap();
        assert_eq!(edited.notes.as_deref(), Some("Improving"));

        let stored = get_session(&c.conn, &c.centre, &id).unwrap();
        assert_eq!(stored.notes.as_deref(), Some("Improving"));
        assert_eq!(stored.treatment_id, Some(treatment));
        assert_eq!(stored.template_id, Some(template.id));
        assert_eq!(stored.answers.unwrap()["pain"], json!(6));

        // new answers are checked against the stored template
        let bad = update_session_notes(
            &c.conn,
            &c.centre,
            &id,
            NotesUpdate {
                answers: Some(serde_json::from_value(json!({"pain": 12})).unwrap()),
                ..Default::default()
            },
        )
        .unwrap_err();
        assert!(matches!(bad, SchedulingError::Validation(_)));

        let cleared = update_session_notes(
            &c.conn,
            &c.centre,
            &id,
            NotesUpdate { notes: Some("  ".into()), ..Default::default() },
        )
        .unwrap();
        assert!(cleared.notes.is_none());
        assert_eq!(cleared.treatment_id, Some(treatment));
    }

    #[test]
    fn booking_against_a_sale_is_capped_by_sessions_remaining() {
        let c = clinic(2);
        let bea = seed_therapist(&c.conn, &c.centre, "Bea");
        let sale = seed_package_sale(&c.conn, &c.centre, &c.patient, &c.package, 2, "2026-03-01", "2026-06-01");
        let book = |start: &str| {
            book_session(
                &c.conn,
                &c.centre,
                BookSessionRequest {
                    patient_id: c.patient,
                    therapist_id: bea,
                    start_at: dt(start),
                    duration_minutes: None,
                    treatment_id: None,
                    package_sale_id: Some(sale),
                    notes: None,
                },
            )
        };

        let first = book("2026-03-02 09:00:00").unwrap();
        book("2026-03-03 09:00:00").unwrap();
        let err = book("2026-03-04 09:00:00").unwrap_err();
        assert!(matches!(err, SchedulingError::PackageExhausted(id) if id == sale));

        // a cancelled session frees its place again
        update_session_status(&c.conn, &c.centre, &first.id, SessionStatus::Cancelled).unwrap();
        book("2026-03-04 09:00:00").unwrap();
    }

    #[test]
    fn sold_out_package_refuses_extra_bookings_and_consumption() {
        let c = clinic(1);
        let bea = seed_therapist(&c.conn, &c.centre, "Bea");
        let outcome = sell(&c, "2026-03-02 09:00:00").unwrap();

        let extra = book_session(
            &c.conn,
            &c.centre,
            BookSessionRequest {
                patient_id: c.patient,
                therapist_id: bea,
                start_at: dt("2026-03-03 09:00:00"),
                duration_minutes: None,
                treatment_id: None,
                package_sale_id: Some(outcome.sale.id),
                notes: None,
            },
        )
        .unwrap_err();
        assert!(matches!(extra, SchedulingError::PackageExhausted(_)));

        let only = outcome.sessions[0].id;
        update_session_status(&c.conn, &c.centre, &only, SessionStatus::CheckedIn).unwrap();
        update_session_status(&c.conn, &c.centre, &only, SessionStatus::Completed).unwrap();
        let sale = get_package_sale(&c.conn, &c.centre, &outcome.sale.id).unwrap();
        assert_eq!((sale.sessions_used, sale.sessions_remaining), (1, 0));

        // a session linked behind the cap's back cannot draw on the sale
        let stray = seed_session(&c.conn, &c.centre, &c.patient, &bea, "2026-03-04 09:00:00", 45, SessionStatus::CheckedIn);
        c.conn
            .execute(
                "UPDATE sessions SET package_sale_id = ?1 WHERE id = ?2",
                rusqlite::params![outcome.sale.id.to_string(), stray.to_string()],
            )
            .unwrap();
        let err = update_session_status(&c.conn, &c.centre, &stray, SessionStatus::Completed).unwrap_err();
        assert!(matches!(err, SchedulingError::PackageExhausted(_)));
        let stored = get_session(&c.conn, &c.centre, &stray).unwrap();
        assert_eq!(stored.status, SessionStatus::CheckedIn);
    }

    #[test]
    fn delete_only_scheduled_or_cancelled() {
        let c = clinic(1);
        let bea = seed_therapist(&c.conn, &c.centre, "Bea");
        let done = seed_session(&c.conn, &c.centre, &c.patient, &bea, "2026-03-02 09:00:00", 45, SessionStatus::Completed);
        let open = seed_session(&c.conn, &c.centre, &c.patient, &bea, "2026-03-02 11:00:00", 45, SessionStatus::Scheduled);
        assert!(matches!(delete_session(&c.conn, &c.centre, &done), Err(SchedulingError::NotEditable(_))));
        delete_session(&c.conn, &c.centre, &open).unwrap();
    }

    #[test]
    fn expired_sales_cancel_remaining_sessions() {
        let c = clinic(3);
        seed_therapist(&c.conn, &c.centre, "Bea");
        let outcome = sell(&c, "2026-03-02 09:00:00").unwrap();
        update_session_status(&c.conn, &c.centre, &outcome.sessions[0].id, SessionStatus::CheckedIn).unwrap();

        assert_eq!(refresh_expired_sales(&c.conn, &c.centre, outcome.sale.expires_on).unwrap(), 0);
        let day_after = outcome.sale.expires_on + Duration::days(1);
        assert_eq!(refresh_expired_sales(&c.conn, &c.centre, day_after).unwrap(), 1);

        let sale = get_package_sale(&c.conn, &c.centre, &outcome.sale.id).unwrap();
        assert_eq!(sale.status, PackageSaleStatus::Expired);
        let sessions = list_sessions(
            &c.conn,
            &c.centre,
            &SessionFilter { package_sale_id: Some(sale.id), ..Default::default() },
        )
        .unwrap();
        assert_eq!(sessions[0].status, SessionStatus::CheckedIn);
        assert!(sessions[1..].iter().all(|s| s.status == SessionStatus::Cancelled));
        let patient = repository::get_patient(&c.conn, &c.centre, &c.patient).unwrap().unwrap();
        assert!(patient.active_package_sale_id.is_none());
    }

    #[test]
    fn split_shift_therapist_is_used_in_second_window() {
        let c = clinic(1);
        let t = crate::therapists::create_therapist(
            &c.conn,
            &c.centre,
            crate::therapists::TherapistInput {
                name: "Split".into(),
                working_hours: vec![
                    WorkingHours {
                        weekday: Weekday::Mon,
                        start: NaiveTime::from_hms_opt(8, 0, 0).unwrap(),
                        end: NaiveTime::from_hms_opt(12, 0, 0).unwrap(),
                    },
                    WorkingHours {
                        weekday: Weekday::Mon,
                        start: NaiveTime::from_hms_opt(14, 0, 0).unwrap(),
                        end: NaiveTime::from_hms_opt(18, 0, 0).unwrap(),
                    },
                ],
                ..Default::default()
            },
        )
        .unwrap();
        let outcome = sell(&c, "2026-03-02 14:00:00").unwrap();
        assert_eq!(outcome.sessions[0].therapist_id, t.id);
        assert!(matches!(sell(&c, "2026-03-02 12:30:00"), Err(SchedulingError::ActivePackageExists(_))));
    }
}
